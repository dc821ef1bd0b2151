use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Pos,
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    And,
    Xor,
    Or,
}

/// Assembly-time integer expression. `$` and `$$` are symbols too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Num(i64),
    Symbol(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// Result of one evaluation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eval {
    Value(i64),
    /// Depends on a symbol with no value yet, retry on a later pass.
    Pending(String),
}

impl Eval {
    pub fn value(&self) -> Option<i64> {
        match self {
            Eval::Value(v) => Some(*v),
            Eval::Pending(_) => None,
        }
    }
}

/// Symbol values seen by an expression.
pub trait Lookup {
    /// `Ok(None)` when the symbol exists but has no value yet.
    fn lookup(&self, name: &str) -> Result<Option<i64>, Error>;
}

/// Knows no symbol at all.
pub struct NoSymbols;

impl Lookup for NoSymbols {
    fn lookup(&self, _: &str) -> Result<Option<i64>, Error> {
        Ok(None)
    }
}

impl Expr {
    pub fn eval(&self, env: &impl Lookup) -> Result<Eval, Error> {
        match self {
            Expr::Num(n) => Ok(Eval::Value(*n)),
            Expr::Symbol(name) => Ok(match env.lookup(name)? {
                Some(v) => Eval::Value(v),
                None => Eval::Pending(name.clone()),
            }),
            Expr::Unary(op, expr) => {
                let v = match expr.eval(env)? {
                    Eval::Value(v) => v,
                    pending => return Ok(pending),
                };
                Ok(Eval::Value(match op {
                    UnaryOp::Pos => v,
                    UnaryOp::Neg => v.wrapping_neg(),
                    UnaryOp::Not => !v,
                }))
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = match lhs.eval(env)? {
                    Eval::Value(v) => v,
                    pending => return Ok(pending),
                };
                let r = match rhs.eval(env)? {
                    Eval::Value(v) => v,
                    pending => return Ok(pending),
                };
                Ok(Eval::Value(match op {
                    BinaryOp::Mul => l.wrapping_mul(r),
                    BinaryOp::Div => l.checked_div(r).ok_or(Error::DivisionByZero)?,
                    BinaryOp::Mod => l.checked_rem(r).ok_or(Error::DivisionByZero)?,
                    BinaryOp::Add => l.wrapping_add(r),
                    BinaryOp::Sub => l.wrapping_sub(r),
                    BinaryOp::Shl => shift_amount(r).map_or(0, |s| l << s),
                    BinaryOp::Shr => shift_amount(r).map_or(l >> 63, |s| l >> s),
                    BinaryOp::And => l & r,
                    BinaryOp::Xor => l ^ r,
                    BinaryOp::Or => l | r,
                }))
            }
        }
    }

    /// Whether the value depends on any symbol.
    pub fn is_symbolic(&self) -> bool {
        match self {
            Expr::Num(_) => false,
            Expr::Symbol(_) => true,
            Expr::Unary(_, expr) => expr.is_symbolic(),
            Expr::Binary(_, lhs, rhs) => lhs.is_symbolic() || rhs.is_symbolic(),
        }
    }
}

fn shift_amount(r: i64) -> Option<u32> {
    u32::try_from(r).ok().filter(|s| *s < 64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Table(HashMap<&'static str, Option<i64>>);

    impl Lookup for Table {
        fn lookup(&self, name: &str) -> Result<Option<i64>, Error> {
            self.0
                .get(name)
                .copied()
                .ok_or_else(|| Error::UnknownLabel(name.to_string()))
        }
    }

    fn sym(name: &str) -> Box<Expr> {
        Box::new(Expr::Symbol(name.to_string()))
    }

    fn num(n: i64) -> Box<Expr> {
        Box::new(Expr::Num(n))
    }

    #[test]
    fn constant_folding() {
        let expr = Expr::Binary(
            BinaryOp::Sub,
            num(510),
            Box::new(Expr::Binary(BinaryOp::Shl, num(1), num(4))),
        );
        assert_eq!(expr.eval(&NoSymbols).unwrap(), Eval::Value(494));
        assert!(!expr.is_symbolic());
        let not = Expr::Unary(UnaryOp::Not, num(0));
        assert_eq!(not.eval(&NoSymbols).unwrap(), Eval::Value(-1));
    }

    #[test]
    fn three_way_result() {
        let table = Table(HashMap::from([("a", Some(5)), ("b", None)]));

        let ok = Expr::Binary(BinaryOp::Add, sym("a"), num(1));
        assert_eq!(ok.eval(&table).unwrap(), Eval::Value(6));

        let pending = Expr::Binary(BinaryOp::Add, sym("a"), sym("b"));
        assert_eq!(pending.eval(&table).unwrap(), Eval::Pending("b".into()));
        assert!(pending.is_symbolic());

        let unknown = Expr::Unary(UnaryOp::Neg, sym("c"));
        assert!(matches!(unknown.eval(&table), Err(Error::UnknownLabel(name)) if name == "c"));

        let div = Expr::Binary(BinaryOp::Div, sym("a"), num(0));
        assert!(matches!(div.eval(&table), Err(Error::DivisionByZero)));
    }
}
