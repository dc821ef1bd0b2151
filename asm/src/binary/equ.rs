use crate::ast::Equ;
use crate::error::Error;
use crate::expr::{Eval, Lookup};

/// Named constant. The value lives in the constant table, the blob only
/// keeps the declaration in address order.
#[derive(Debug, Clone, Copy)]
pub struct BinaryEqu<'a> {
    pub equ: &'a Equ,
}

impl<'a> BinaryEqu<'a> {
    pub fn new(equ: &'a Equ) -> Self {
        BinaryEqu { equ }
    }

    pub fn name(&self) -> &str {
        &self.equ.name
    }

    /// `None` while the expression waits for a symbol.
    pub fn resolve(&self, env: &impl Lookup) -> Result<Option<i64>, Error> {
        Ok(match self.equ.expr.eval(env)? {
            Eval::Value(v) => Some(v),
            Eval::Pending(_) => None,
        })
    }
}
