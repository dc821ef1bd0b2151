//! Compiled output units. Every blob owns the bytes of one node at one
//! address; zero-footprint constants that share the address ride along as
//! slaves.

mod definition;
mod equ;
mod instruction;
mod repeated;

pub use definition::BinaryDefinition;
pub use equ::BinaryEqu;
pub use instruction::BinaryInstruction;
pub use repeated::BinaryRepeated;

use crate::ast::Node;

#[derive(Debug, Clone)]
pub enum BlobKind<'a> {
    Instruction(BinaryInstruction<'a>),
    Definition(BinaryDefinition<'a>),
    Equ(BinaryEqu<'a>),
    Repeated(BinaryRepeated<'a>),
}

#[derive(Debug, Clone)]
pub struct Blob<'a> {
    pub node: &'a Node,
    /// Index of the top-level node this blob comes from
    pub index: usize,
    pub kind: BlobKind<'a>,
    pub slaves: Vec<Blob<'a>>,
}

impl<'a> Blob<'a> {
    pub fn new(node: &'a Node, index: usize, kind: BlobKind<'a>) -> Self {
        Blob {
            node,
            index,
            kind,
            slaves: Vec::new(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.kind {
            BlobKind::Instruction(inst) => inst.bytes(),
            BlobKind::Definition(def) => def.bytes(),
            BlobKind::Equ(_) => &[],
            BlobKind::Repeated(rep) => rep.bytes(),
        }
    }

    /// Footprint at the assigned address
    pub fn byte_size(&self) -> usize {
        self.bytes().len()
    }
}
