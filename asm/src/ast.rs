use arch::{Mnemonic, Reg};

use crate::expr::Expr;

/// 1-based position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Loc {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub loc: Loc,
}

impl Node {
    pub fn new(kind: NodeKind, loc: Loc) -> Self {
        Node { kind, loc }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    CompilerOption(CompilerOption),
    Times(Times),
    Instruction(Instruction),
    Definition(Definition),
    Equ(Equ),
    Label(Label),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompilerOption {
    /// `[org expr]`
    Org(Expr),
    /// `[bits expr]`
    Bits(Expr),
    /// `[target name]`
    Target(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Times {
    pub count: Expr,
    pub node: Box<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub args: Vec<InstructionArg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstructionArg {
    Reg(Reg),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefSize {
    Db,
    Dw,
    Dd,
    Dq,
    Dt,
}

impl DefSize {
    pub fn parse(s: &str) -> Option<DefSize> {
        match s.to_ascii_lowercase().as_str() {
            "db" => Some(DefSize::Db),
            "dw" => Some(DefSize::Dw),
            "dd" => Some(DefSize::Dd),
            "dq" => Some(DefSize::Dq),
            "dt" => Some(DefSize::Dt),
            _ => None,
        }
    }

    pub fn byte_size(&self) -> usize {
        match self {
            DefSize::Db => 1,
            DefSize::Dw => 2,
            DefSize::Dd => 4,
            DefSize::Dq => 8,
            DefSize::Dt => 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub size: DefSize,
    pub args: Vec<DefArg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefArg {
    Expr(Expr),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Equ {
    pub name: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub name: String,
}
