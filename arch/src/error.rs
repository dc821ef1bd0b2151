use thiserror::Error;

use crate::schema::OperandKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Relative jump out of range: {0}")]
    RelativeOutOfRange(i64),

    #[error("Immediate `{value}` does not fit in {size} byte(s)")]
    ImmediateOutOfRange { value: i64, size: usize },

    #[error("Expected {expected} operand(s), found {found}")]
    OperandCount { expected: usize, found: usize },

    #[error("Operand {0} does not match {1:?}")]
    OperandKind(usize, OperandKind),
}
