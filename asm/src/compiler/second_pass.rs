use arch::{Mode, TargetCpu};
use tracing::{debug, trace};

use super::first_pass::{Entry, FirstPass};
use super::resolver::Symbols;
use crate::ast::{Equ, Instruction};
use crate::binary::{BinaryInstruction, BinaryRepeated, Blob, BlobKind};
use crate::error::{Diagnostic, Error};
use crate::expr::Eval;
use crate::output::Binary;

/// What one entry needs this pass, copied out of the offset map so the map
/// can be edited freely afterwards.
enum Work<'a> {
    Skip,
    Definition,
    Equ(&'a Equ),
    Repeated(BinaryRepeated<'a>),
    Instruction {
        instruction: &'a Instruction,
        mode: Mode,
        target: TargetCpu,
        size: usize,
    },
}

enum Step {
    Clean,
    Dirty,
}

/// Relaxation loop over the offset map.
pub struct SecondPass<'a, 'c> {
    entries: Vec<Entry<'a>>,
    symbols: Symbols<'c>,
    max_passes: usize,
}

impl<'a, 'c> SecondPass<'a, 'c> {
    pub fn new(entries: Vec<Entry<'a>>, symbols: Symbols<'c>, max_passes: usize) -> Self {
        SecondPass {
            entries,
            symbols,
            max_passes,
        }
    }

    pub fn run(mut self) -> Result<Binary<'a>, Diagnostic> {
        let mut passes = 0;
        loop {
            if passes == self.max_passes {
                return Err(Error::UnableToCompile(passes).into());
            }
            passes += 1;
            debug!(pass = passes, entries = self.entries.len(), "relaxation scan");
            if !self.scan()? {
                break;
            }
        }
        debug!(passes, "fixed point reached");
        self.finalize(passes)
    }

    /// One pass over the offset map, returns whether anything moved.
    fn scan(&mut self) -> Result<bool, Diagnostic> {
        let mut dirty = false;
        let mut i = 0;
        while i < self.entries.len() {
            dirty |= self.resolve_slaves(i)?;

            let loc = self.entries[i].1.node.loc;
            if let Step::Dirty = self.visit(i).map_err(|error| error.at(loc))? {
                dirty = true;
            }
            i += 1;
        }
        Ok(dirty)
    }

    fn resolve_slaves(&mut self, i: usize) -> Result<bool, Diagnostic> {
        let address = self.entries[i].0;
        let mut dirty = false;
        for s in 0..self.entries[i].1.slaves.len() {
            let slave = &self.entries[i].1.slaves[s];
            let (loc, index) = (slave.node.loc, slave.index);
            let BlobKind::Equ(equ) = &slave.kind else {
                return Err(Error::IncorrectSlaveBlobs.at(loc));
            };
            let equ = equ.equ;
            dirty |= self
                .update_equ(equ, index, address)
                .map_err(|error| error.at(loc))?;
        }
        Ok(dirty)
    }

    fn update_equ(&mut self, equ: &'a Equ, index: usize, address: i64) -> Result<bool, Error> {
        let value = match equ.expr.eval(&self.symbols.resolver(index, address))? {
            Eval::Value(v) => Some(v),
            Eval::Pending(_) => None,
        };
        let changed = self.symbols.set_equ(&equ.name, value);
        if changed {
            trace!(name = %equ.name, ?value, "constant resolved");
        }
        Ok(changed)
    }

    fn visit(&mut self, i: usize) -> Result<Step, Error> {
        let (address, blob) = &self.entries[i];
        let (address, index) = (*address, blob.index);

        let work = match &blob.kind {
            BlobKind::Definition(def) if !def.is_resolved() => Work::Definition,
            BlobKind::Definition(_) => Work::Skip,
            BlobKind::Equ(equ) => Work::Equ(equ.equ),
            BlobKind::Repeated(rep) => Work::Repeated(rep.clone()),
            BlobKind::Instruction(inst) if inst.is_constant_size() => Work::Skip,
            BlobKind::Instruction(inst) => Work::Instruction {
                instruction: inst.instruction,
                mode: inst.mode,
                target: inst.target,
                size: inst.bytes().len(),
            },
        };

        match work {
            Work::Skip => Ok(Step::Clean),
            Work::Definition => {
                let resolver = self.symbols.resolver(index, address);
                if let BlobKind::Definition(def) = &mut self.entries[i].1.kind {
                    def.resolve(&resolver)?;
                }
                Ok(Step::Clean)
            }
            Work::Equ(equ) => Ok(if self.update_equ(equ, index, address)? {
                Step::Dirty
            } else {
                Step::Clean
            }),
            Work::Repeated(rep) => {
                // The count is checked again every pass since growth before
                // the marker moves `$`. The copies land right after the marker,
                // so the scan walks through them in this same pass.
                let count = rep.count(&self.symbols.resolver(index, address))?;
                match count {
                    Eval::Value(count) if rep.expanded != Some(count) => {
                        self.expand(i, &rep, count)?;
                        Ok(Step::Dirty)
                    }
                    _ => Ok(Step::Clean),
                }
            }
            Work::Instruction {
                instruction,
                mode,
                target,
                size,
            } => {
                let resolver = self.symbols.resolver(index, address);
                let blob = BinaryInstruction::compile(instruction, &resolver, address, mode, target)?;
                let delta = blob.bytes().len() as i64 - size as i64;
                self.entries[i].1.kind = BlobKind::Instruction(blob);
                if delta == 0 {
                    return Ok(Step::Clean);
                }
                trace!(address, delta, mnemonic = %instruction.mnemonic, "instruction resized");
                self.resize(address, delta);
                Ok(Step::Dirty)
            }
        }
    }

    /// Lay `count` copies of the body out right after the marker at entry
    /// `i`, dropping the copies of an earlier expansion.
    fn expand(&mut self, i: usize, rep: &BinaryRepeated<'a>, count: i64) -> Result<(), Error> {
        let (address, marker) = &self.entries[i];
        let (address, index) = (*address, marker.index);
        let placeholder = marker.byte_size() as i64;

        let stale = (i + 1 + rep.expanded.unwrap_or(0) as usize).min(self.entries.len());
        let stale: i64 = self
            .entries
            .drain(i + 1..stale)
            .map(|(_, blob)| blob.byte_size() as i64)
            .sum();

        let mut nested = FirstPass::nested(address, rep.mode, rep.target);
        for _ in 0..count {
            nested.emit_statement(&rep.times.node, index)?;
        }
        let copies = nested.entries;
        let size: i64 = copies.iter().map(|(_, blob)| blob.byte_size() as i64).sum();
        trace!(address, count, previous = ?rep.expanded, size, "times expanded");

        if let BlobKind::Repeated(marker) = &mut self.entries[i].1.kind {
            marker.expanded = Some(count);
        }

        // Whatever follows the marker in the map comes after the copies,
        // even when an empty expansion left it at the same address.
        let delta = size - stale - placeholder;
        self.symbols.labels.shift_from(address, rep.labels_before, delta);
        for (at, _) in &mut self.entries[i + 1..] {
            *at += delta;
        }

        self.entries.splice(i + 1..i + 1, copies);
        Ok(())
    }

    /// Shift every entry and label placed after `offset` by `delta` bytes.
    fn resize(&mut self, offset: i64, delta: i64) {
        self.symbols.labels.shift_after(offset, delta);
        for (address, _) in self.entries.iter_mut().filter(|(address, _)| *address > offset) {
            *address += delta;
        }
    }

    /// A constant still unknown at the fixed point depends on itself or on
    /// a symbol nobody links.
    fn check_constant(&self, blob: &Blob<'a>) -> Result<(), Diagnostic> {
        match &blob.kind {
            BlobKind::Equ(equ) if self.symbols.equ.get(equ.name()) == Some(&None) => {
                Err(Error::UnresolvedConstant(equ.name().to_string()).at(blob.node.loc))
            }
            _ => Ok(()),
        }
    }

    /// Re-encode everything against the converged tables.
    fn finalize(mut self, total_passes: usize) -> Result<Binary<'a>, Diagnostic> {
        for i in 0..self.entries.len() {
            let (address, blob) = &self.entries[i];
            for constant in std::iter::once(blob).chain(&blob.slaves) {
                self.check_constant(constant)?;
            }
            let (address, index, loc) = (*address, blob.index, blob.node.loc);
            let resolver = self.symbols.resolver(index, address);

            let result = match &mut self.entries[i].1.kind {
                BlobKind::Instruction(inst) => BinaryInstruction::compile_final(
                    inst.instruction,
                    &resolver,
                    address,
                    inst.mode,
                    inst.target,
                )
                .map(|blob| *inst = blob),
                BlobKind::Definition(def) => def.finalize(&resolver),
                BlobKind::Repeated(rep) => match rep.count(&resolver) {
                    Ok(Eval::Value(count)) if rep.expanded == Some(count) => Ok(()),
                    Ok(Eval::Value(_)) => Err(Error::UnableToCompile(total_passes)),
                    Ok(Eval::Pending(name)) => Err(Error::UnknownLabel(name)),
                    Err(error) => Err(error),
                },
                BlobKind::Equ(_) => Ok(()),
            };
            result.map_err(|error| error.at(loc))?;
        }

        let origin = self.symbols.origin;
        let byte_size = self
            .entries
            .iter()
            .filter(|(_, blob)| blob.byte_size() > 0)
            .map(|(address, blob)| address + blob.byte_size() as i64 - origin)
            .max()
            .unwrap_or(0)
            .max(0) as usize;

        Ok(Binary {
            origin,
            blobs: self.entries,
            labels: self.symbols.labels,
            equ: self.symbols.equ,
            byte_size,
            total_passes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile, CompilerState};
    use crate::label::Scopes;
    use crate::parser::parse;

    #[test]
    fn resize_shifts_what_follows() {
        let nodes = parse("jmp label\nnop\nlabel: nop\nk equ $").unwrap();
        let scopes = Scopes::new(&nodes);
        let first = FirstPass::new(CompilerState::default())
            .run(&nodes, &scopes)
            .unwrap();
        let symbols = Symbols {
            labels: first.labels,
            equ: first.equ,
            scopes,
            origin: 0,
            external: None,
        };
        let mut pass = SecondPass::new(first.entries, symbols, 7);

        pass.resize(0, -1);
        let addresses: Vec<i64> = pass.entries.iter().map(|(address, _)| *address).collect();
        assert_eq!(addresses, vec![0, 2, 3, 4]);
        assert_eq!(pass.symbols.labels.get("label"), Some(3));

        pass.resize(3, 2);
        let addresses: Vec<i64> = pass.entries.iter().map(|(address, _)| *address).collect();
        assert_eq!(addresses, vec![0, 2, 3, 6]);
        assert_eq!(pass.symbols.labels.get("label"), Some(3));
    }

    #[test]
    fn times_keeps_constants_on_marker() {
        let nodes = parse("k equ $\ntimes 2 nop\nafter: hlt").unwrap();
        let binary = compile(&nodes).unwrap();
        assert_eq!(binary.to_bytes(), vec![0x90, 0x90, 0xF4]);
        let (address, marker) = &binary.blobs[0];
        assert_eq!(*address, 0);
        assert!(matches!(&marker.kind, BlobKind::Repeated(rep) if rep.expanded == Some(2)));
        assert_eq!(marker.slaves.len(), 1);
        assert_eq!(binary.equ.get("k"), Some(&Some(0)));
        assert_eq!(binary.labels.get("after"), Some(2));
    }

    #[test]
    fn empty_times_keeps_constants() {
        let nodes = parse("k equ 5\ntimes n nop\nn equ 0").unwrap();
        let binary = compile(&nodes).unwrap();
        assert!(binary.to_bytes().is_empty());
        let layout: Vec<(i64, usize)> = binary
            .blobs
            .iter()
            .map(|(address, blob)| (*address, blob.slaves.len()))
            .collect();
        assert_eq!(layout, vec![(0, 1), (0, 0)]);
        assert!(matches!(&binary.blobs[1].1.kind, BlobKind::Equ(equ) if equ.name() == "n"));
        assert_eq!(binary.equ.get("k"), Some(&Some(5)));
    }

    #[test]
    fn times_count_follows_growth() {
        // `jmp` grows once the padding pushes `end` out of short range
        let nodes = parse("[org 0x7C00]\njmp end\ntimes 300-($-$$) db 0\nend: hlt").unwrap();
        let binary = compile(&nodes).unwrap();
        let bytes = binary.to_bytes();
        assert_eq!(bytes.len(), 301);
        assert_eq!(&bytes[..3], &[0xE9, 0x29, 0x01]);
        assert_eq!(bytes[300], 0xF4);
        let copies = binary
            .blobs
            .iter()
            .filter(|(_, blob)| matches!(blob.kind, BlobKind::Definition(_)))
            .count();
        assert_eq!(copies, 297);
        assert!(matches!(&binary.blobs[1].1.kind, BlobKind::Repeated(rep) if rep.expanded == Some(297)));
        assert_eq!(binary.labels.get("end"), Some(0x7C00 + 300));
    }

    #[test]
    fn cyclic_constants_fail() {
        let nodes = parse("a equ b\nb equ a\nnop").unwrap();
        let diags = compile(&nodes).unwrap_err();
        assert!(matches!(&diags[0].error, Error::UnresolvedConstant(name) if name == "a"));
        assert_eq!(diags[0].loc.map(|loc| loc.line), Some(1));
    }

    #[test]
    fn only_constants_ride_along() {
        let nodes = parse("nop\nnop").unwrap();
        let scopes = Scopes::new(&nodes);
        let mut first = FirstPass::new(CompilerState::default())
            .run(&nodes, &scopes)
            .unwrap();
        let (_, stray) = first.entries.remove(1);
        first.entries[0].1.slaves.push(stray);
        let symbols = Symbols {
            labels: first.labels,
            equ: first.equ,
            scopes,
            origin: 0,
            external: None,
        };
        let diag = SecondPass::new(first.entries, symbols, 7).run().err().expect("must fail");
        assert!(matches!(diag.error, Error::IncorrectSlaveBlobs));
        assert_eq!(diag.loc.map(|loc| loc.line), Some(2));
    }

    #[test]
    fn many_expansions_share_a_pass() {
        let source = (0..10).map(|_| "times 2 nop\n").collect::<String>();
        let nodes = parse(&source).unwrap();
        let binary = compile(&nodes).unwrap();
        assert_eq!(binary.to_bytes(), vec![0x90; 20]);
        assert_eq!(binary.total_passes, 2);
    }
}
