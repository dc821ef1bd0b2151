use arch::{Mode, TargetCpu};

use crate::ast::Times;
use crate::error::Error;
use crate::expr::{Eval, Lookup};

/// A `times` statement. Until its count is known it holds one byte; once
/// expanded it stays in the offset map as a zero-byte marker in front of
/// its copies.
#[derive(Debug, Clone)]
pub struct BinaryRepeated<'a> {
    pub times: &'a Times,
    pub mode: Mode,
    pub target: TargetCpu,
    /// Labels declared before the statement
    pub labels_before: usize,
    /// Count the copies were laid out with
    pub expanded: Option<i64>,
}

impl<'a> BinaryRepeated<'a> {
    pub fn new(times: &'a Times, mode: Mode, target: TargetCpu, labels_before: usize) -> Self {
        BinaryRepeated {
            times,
            mode,
            target,
            labels_before,
            expanded: None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self.expanded {
            Some(_) => &[],
            None => &[0],
        }
    }

    pub fn count(&self, env: &impl Lookup) -> Result<Eval, Error> {
        match self.times.count.eval(env)? {
            Eval::Value(n) if n < 0 => Err(Error::IncorrectTimesValue(n)),
            eval => Ok(eval),
        }
    }
}
