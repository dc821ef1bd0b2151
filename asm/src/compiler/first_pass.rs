use std::collections::HashMap;

use arch::{Mode, TargetCpu};

use super::resolver::{EquTable, KnownConstants};
use super::CompilerState;
use crate::ast::{CompilerOption, Node, NodeKind};
use crate::binary::{BinaryDefinition, BinaryEqu, BinaryInstruction, BinaryRepeated, Blob, BlobKind};
use crate::error::{Diagnostic, Error};
use crate::expr::{Eval, Expr, NoSymbols};
use crate::label::{is_reserved, Labels, Scopes};

/// Address and blob of one offset map entry.
pub type Entry<'a> = (i64, Blob<'a>);

/// Assigns provisional addresses with pessimistic sizes and collects the
/// label and constant tables.
pub struct FirstPass<'a> {
    pub state: CompilerState,
    pub offset: i64,
    pub entries: Vec<Entry<'a>>,
    pub labels: Labels,
    pub equ: EquTable,
    slots: HashMap<i64, usize>,
}

impl<'a> FirstPass<'a> {
    pub fn new(state: CompilerState) -> Self {
        FirstPass {
            state,
            offset: 0,
            entries: Vec::new(),
            labels: Labels::new(),
            equ: EquTable::new(),
            slots: HashMap::new(),
        }
    }

    /// Emitter for the copies of a `times` body placed from `address`.
    pub fn nested(address: i64, mode: Mode, target: TargetCpu) -> Self {
        let mut pass = FirstPass::new(CompilerState {
            origin: None,
            mode,
            target,
        });
        pass.offset = address;
        pass
    }

    fn address(&self) -> i64 {
        self.state.origin() + self.offset
    }

    pub fn run(mut self, nodes: &'a [Node], scopes: &Scopes) -> Result<Self, Diagnostic> {
        for (index, node) in nodes.iter().enumerate() {
            self.visit(node, index, scopes)
                .map_err(|error| error.at(node.loc))?;
        }
        // `org` may move later code below earlier code
        self.entries.sort_by_key(|(address, _)| *address);
        Ok(self)
    }

    fn visit(&mut self, node: &'a Node, index: usize, scopes: &Scopes) -> Result<(), Error> {
        match &node.kind {
            NodeKind::CompilerOption(option) => self.set_option(option),
            NodeKind::Times(times) => {
                if !matches!(
                    times.node.kind,
                    NodeKind::Instruction(_) | NodeKind::Definition(_)
                ) {
                    return Err(Error::UnpermittedRepeatedNode);
                }
                let repeated = BinaryRepeated::new(
                    times,
                    self.state.mode,
                    self.state.target,
                    self.labels.len(),
                );
                self.emit(Blob::new(node, index, BlobKind::Repeated(repeated)));
                Ok(())
            }
            NodeKind::Instruction(_) | NodeKind::Definition(_) => self.emit_statement(node, index),
            NodeKind::Equ(equ) => {
                self.declare(&equ.name)?;
                let blob = BinaryEqu::new(equ);
                let value = blob.resolve(&self.known())?;
                self.equ.insert(equ.name.clone(), value);
                self.emit(Blob::new(node, index, BlobKind::Equ(blob)));
                Ok(())
            }
            NodeKind::Label(label) => {
                let name = scopes.qualify(index, &label.name)?;
                self.declare(&name)?;
                self.labels.insert(name, self.address());
                Ok(())
            }
        }
    }

    /// Compile an instruction or a definition at the current address.
    pub fn emit_statement(&mut self, node: &'a Node, index: usize) -> Result<(), Error> {
        let kind = match &node.kind {
            NodeKind::Instruction(inst) => BlobKind::Instruction(BinaryInstruction::compile(
                inst,
                &NoSymbols,
                self.address(),
                self.state.mode,
                self.state.target,
            )?),
            NodeKind::Definition(def) => BlobKind::Definition(BinaryDefinition::compile(def)?),
            _ => return Err(Error::UnpermittedRepeatedNode),
        };
        self.emit(Blob::new(node, index, kind));
        Ok(())
    }

    /// Place `blob` at the current address. A constant joins the blob already
    /// there; a sized blob taking over a constant's address keeps it and its
    /// companions as slaves, in declaration order. Anything else gets an
    /// entry of its own.
    fn emit(&mut self, blob: Blob<'a>) {
        let address = self.address();
        let size = blob.byte_size() as i64;
        let is_equ = |blob: &Blob| matches!(blob.kind, BlobKind::Equ(_));
        match self.slots.get(&address).copied() {
            Some(slot) if is_equ(&blob) => self.entries[slot].1.slaves.push(blob),
            Some(slot) if size > 0 && is_equ(&self.entries[slot].1) => {
                let mut prev = std::mem::replace(&mut self.entries[slot].1, blob);
                let slaves = std::mem::take(&mut prev.slaves);
                let current = &mut self.entries[slot].1;
                current.slaves.push(prev);
                current.slaves.extend(slaves);
            }
            _ => {
                self.slots.insert(address, self.entries.len());
                self.entries.push((address, blob));
            }
        }
        self.offset += size;
    }

    fn declare(&self, name: &str) -> Result<(), Error> {
        if is_reserved(name) {
            return Err(Error::UsedReservedName(name.to_string()));
        }
        if self.labels.contains(name) {
            return Err(Error::LabelAlreadyDefined(name.to_string()));
        }
        if self.equ.contains_key(name) {
            return Err(Error::EquAlreadyDefined(name.to_string()));
        }
        Ok(())
    }

    fn known(&self) -> KnownConstants<'_> {
        KnownConstants {
            equ: &self.equ,
            origin: self.state.origin(),
            address: self.address(),
        }
    }

    /// Directive arguments must be known right away.
    fn constant(&self, expr: &Expr) -> Result<i64, Error> {
        match expr.eval(&self.known())? {
            Eval::Value(v) => Ok(v),
            Eval::Pending(name) => Err(Error::UnknownLabel(name)),
        }
    }

    fn set_option(&mut self, option: &CompilerOption) -> Result<(), Error> {
        match option {
            CompilerOption::Org(expr) => {
                if self.state.origin.is_some() {
                    return Err(Error::OriginRedefined);
                }
                let origin = self.constant(expr)?;
                self.state.origin = Some(origin);
                self.offset = 0;
            }
            CompilerOption::Bits(expr) => {
                let bits = self.constant(expr)?;
                self.state.mode = Mode::from_bits(bits).ok_or(Error::UnsupportedBits(bits))?;
            }
            CompilerOption::Target(name) => {
                self.state.target = name
                    .parse()
                    .map_err(|_| Error::UnsupportedTarget(name.clone()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn first_pass(nodes: &[Node]) -> Result<FirstPass<'_>, Diagnostic> {
        FirstPass::new(CompilerState::default()).run(nodes, &Scopes::new(nodes))
    }

    fn layout(pass: &FirstPass) -> Vec<(i64, usize, usize)> {
        pass.entries
            .iter()
            .map(|(address, blob)| (*address, blob.byte_size(), blob.slaves.len()))
            .collect()
    }

    #[test]
    fn pessimistic_offsets() {
        let nodes = parse("jmp label\nnop\nlabel: nop").unwrap();
        let pass = first_pass(&nodes).unwrap();
        assert_eq!(layout(&pass), vec![(0, 3, 0), (3, 1, 0), (4, 1, 0)]);
        assert_eq!(pass.labels.get("label"), Some(4));
    }

    #[test]
    fn zero_footprint_chaining() {
        let nodes = parse("a equ 1\nb equ a + 1\nnop\nc equ 3").unwrap();
        let pass = first_pass(&nodes).unwrap();
        assert_eq!(layout(&pass), vec![(0, 1, 2), (1, 0, 0)]);
        let names: Vec<_> = pass.entries[0]
            .1
            .slaves
            .iter()
            .map(|blob| match &blob.kind {
                BlobKind::Equ(equ) => equ.name().to_string(),
                _ => panic!("not a constant"),
            })
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(pass.equ.get("b"), Some(&Some(2)));
    }

    #[test]
    fn empty_definition_keeps_its_entry() {
        let nodes = parse("nop\nmsg db ''\nk equ 1\nnop").unwrap();
        let pass = first_pass(&nodes).unwrap();
        assert_eq!(layout(&pass), vec![(0, 1, 0), (1, 0, 1), (1, 1, 0)]);
        assert!(matches!(pass.entries[1].1.kind, BlobKind::Definition(_)));
        assert_eq!(pass.labels.get("msg"), Some(1));
    }

    #[test]
    fn directives() {
        let nodes = parse("[bits 32]\n[target 386]\n[org 0x100]\nstart: mov eax, 1").unwrap();
        let pass = first_pass(&nodes).unwrap();
        assert_eq!(pass.state.origin, Some(0x100));
        assert_eq!(pass.state.mode, Mode::Bits32);
        assert_eq!(pass.state.target, TargetCpu::I386);
        assert_eq!(pass.labels.get("start"), Some(0x100));
        assert_eq!(layout(&pass), vec![(0x100, 5, 0)]);
    }

    #[test]
    fn times_placeholder() {
        let nodes = parse("times 3 db 0xAA\nafter: nop").unwrap();
        let pass = first_pass(&nodes).unwrap();
        assert_eq!(layout(&pass), vec![(0, 1, 0), (1, 1, 0)]);
        assert_eq!(pass.labels.get("after"), Some(1));
    }

    macro_rules! test_error {
        ($($name:ident: $source:literal => $pat:pat),*$(,)?) => {
            $(
                #[test]
                fn $name() {
                    let nodes = parse($source).unwrap();
                    let diag = first_pass(&nodes).err().expect("must fail");
                    assert!(matches!(diag.error, $pat), "{:?}", diag.error);
                }
            )*
        };
    }

    test_error! {
        origin_redefined: "[org 0]\n[org 1]" => Error::OriginRedefined,
        unsupported_bits: "[bits 64]" => Error::UnsupportedBits(64),
        unsupported_target: "[target z80]" => Error::UnsupportedTarget(_),
        forward_org: "[org start]\nstart:" => Error::UnknownLabel(_),
        duplicate_label: "foo:\nfoo:" => Error::LabelAlreadyDefined(_),
        duplicate_equ: "a equ 1\na equ 2" => Error::EquAlreadyDefined(_),
        reserved_label: "ax: nop" => Error::UsedReservedName(_),
        reserved_equ: "times equ 1" => Error::UsedReservedName(_),
        orphan_local: ".loop: nop" => Error::MissingParentLabel(_),
        repeated_label: "times 2 org 0" => Error::UnpermittedRepeatedNode,
        no_schema: "mov al, 0x1234" => Error::UnknownCompilerInstruction(_),
    }

    #[test]
    fn error_location() {
        let nodes = parse("nop\nfoo:\n  foo: nop").unwrap();
        let diag = first_pass(&nodes).err().expect("must fail");
        assert_eq!(diag.loc.map(|l| (l.line, l.column)), Some((3, 3)));
    }
}
