use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::cpu::{Mode, TargetCpu};
use crate::mnemonic::Mnemonic;

// ----------------------------------------------------------------------------
// Operand kinds

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Reg8,
    Reg16,
    Reg32,
    Imm8,
    Imm16,
    Imm32,
    /// imm8 sign-extended to the operand width
    SImm8,
    /// immediate of the current mode width
    ImmW,
    Rel8,
    /// displacement of the current mode width
    RelW,
}

impl OperandKind {
    /// Bytes this operand adds after the opcode (registers add none).
    pub fn byte_size(&self, mode: Mode) -> usize {
        match self {
            OperandKind::Reg8 | OperandKind::Reg16 | OperandKind::Reg32 => 0,
            OperandKind::Imm8 | OperandKind::SImm8 | OperandKind::Rel8 => 1,
            OperandKind::Imm16 => 2,
            OperandKind::Imm32 => 4,
            OperandKind::ImmW | OperandKind::RelW => mode.width() as usize,
        }
    }

    fn width(&self) -> Option<u8> {
        match self {
            OperandKind::Reg16 | OperandKind::Imm16 => Some(2),
            OperandKind::Reg32 | OperandKind::Imm32 => Some(4),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Schema

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    /// Opcode followed by immediates.
    Plain,
    /// Register index of operand 0 added to the last opcode byte.
    PlusReg,
    /// ModRM with `mod = 11`, `rm` = operand 0. The reg field is the
    /// extension when present, operand 1 otherwise.
    ModRm(Option<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub mnemonic: Mnemonic,
    pub opcode: Vec<u8>,
    pub form: Form,
    pub operands: Vec<OperandKind>,
    pub cpu: TargetCpu,
}

impl Schema {
    fn new(mnemonic: Mnemonic, opcode: &[u8], form: Form, operands: &[OperandKind]) -> Self {
        Schema {
            mnemonic,
            opcode: opcode.to_vec(),
            form,
            operands: operands.to_vec(),
            cpu: TargetCpu::I8086,
        }
    }

    fn since(mut self, cpu: TargetCpu) -> Self {
        self.cpu = cpu;
        self
    }

    /// Explicit operand width, `None` for byte-sized or operand-less schemas.
    pub fn operand_width(&self) -> Option<u8> {
        self.operands.iter().filter_map(|kind| kind.width()).max()
    }

    pub fn needs_size_prefix(&self, mode: Mode) -> bool {
        self.operand_width().is_some_and(|width| width != mode.width())
    }

    /// Lowest CPU able to execute this schema in `mode`.
    pub fn min_cpu(&self, mode: Mode) -> TargetCpu {
        if self.operand_width() == Some(4) || self.needs_size_prefix(mode) {
            self.cpu.max(TargetCpu::I386)
        } else {
            self.cpu
        }
    }

    /// Encoded size in bytes.
    pub fn byte_size(&self, mode: Mode) -> usize {
        let prefix = self.needs_size_prefix(mode) as usize;
        let modrm = matches!(self.form, Form::ModRm(_)) as usize;
        let operands: usize = self.operands.iter().map(|kind| kind.byte_size(mode)).sum();
        prefix + self.opcode.len() + modrm + operands
    }
}

// ----------------------------------------------------------------------------
// Table

pub(crate) static SCHEMAS: Lazy<HashMap<Mnemonic, Vec<Schema>>> = Lazy::new(|| {
    use Form::*;
    use Mnemonic::*;
    use OperandKind::*;

    let mut map: HashMap<Mnemonic, Vec<Schema>> = HashMap::new();
    let mut add = |schema: Schema| map.entry(schema.mnemonic).or_default().push(schema);

    for (mnemonic, opcode) in [
        (Nop, 0x90),
        (Hlt, 0xF4),
        (Ret, 0xC3),
        (Retf, 0xCB),
        (Int3, 0xCC),
        (Cli, 0xFA),
        (Sti, 0xFB),
        (Cld, 0xFC),
        (Std, 0xFD),
    ] {
        add(Schema::new(mnemonic, &[opcode], Plain, &[]));
    }
    add(Schema::new(Pusha, &[0x60], Plain, &[]).since(TargetCpu::I186));
    add(Schema::new(Popa, &[0x61], Plain, &[]).since(TargetCpu::I186));
    add(Schema::new(Int, &[0xCD], Plain, &[Imm8]));

    // Relative branches
    add(Schema::new(Jmp, &[0xEB], Plain, &[Rel8]));
    add(Schema::new(Jmp, &[0xE9], Plain, &[RelW]));
    add(Schema::new(Call, &[0xE8], Plain, &[RelW]));
    for mnemonic in [
        Jo, Jno, Jb, Jc, Jnae, Jae, Jnb, Jnc, Je, Jz, Jne, Jnz, Jbe, Jna, Ja, Jnbe, Js, Jns, Jp,
        Jpe, Jnp, Jpo, Jl, Jnge, Jge, Jnl, Jle, Jng, Jg, Jnle,
    ] {
        let cc = mnemonic.condition().unwrap_or_default();
        add(Schema::new(mnemonic, &[0x70 + cc], Plain, &[Rel8]));
        add(Schema::new(mnemonic, &[0x0F, 0x80 + cc], Plain, &[RelW]).since(TargetCpu::I386));
    }
    for (mnemonic, opcode) in [(Loopne, 0xE0), (Loope, 0xE1), (Loop, 0xE2), (Jcxz, 0xE3)] {
        add(Schema::new(mnemonic, &[opcode], Plain, &[Rel8]));
    }

    // Moves
    add(Schema::new(Mov, &[0x88], ModRm(None), &[Reg8, Reg8]));
    add(Schema::new(Mov, &[0x89], ModRm(None), &[Reg16, Reg16]));
    add(Schema::new(Mov, &[0x89], ModRm(None), &[Reg32, Reg32]));
    add(Schema::new(Mov, &[0xB0], PlusReg, &[Reg8, Imm8]));
    add(Schema::new(Mov, &[0xB8], PlusReg, &[Reg16, Imm16]));
    add(Schema::new(Mov, &[0xB8], PlusReg, &[Reg32, Imm32]));

    // ALU group
    for mnemonic in [Add, Or, Adc, Sbb, And, Sub, Xor, Cmp] {
        let ext = mnemonic.alu_ext().unwrap_or_default();
        add(Schema::new(mnemonic, &[ext << 3], ModRm(None), &[Reg8, Reg8]));
        add(Schema::new(mnemonic, &[(ext << 3) + 1], ModRm(None), &[Reg16, Reg16]));
        add(Schema::new(mnemonic, &[(ext << 3) + 1], ModRm(None), &[Reg32, Reg32]));
        add(Schema::new(mnemonic, &[0x80], ModRm(Some(ext)), &[Reg8, Imm8]));
        add(Schema::new(mnemonic, &[0x83], ModRm(Some(ext)), &[Reg16, SImm8]));
        add(Schema::new(mnemonic, &[0x83], ModRm(Some(ext)), &[Reg32, SImm8]));
        add(Schema::new(mnemonic, &[0x81], ModRm(Some(ext)), &[Reg16, Imm16]));
        add(Schema::new(mnemonic, &[0x81], ModRm(Some(ext)), &[Reg32, Imm32]));
    }

    // Stack
    add(Schema::new(Push, &[0x50], PlusReg, &[Reg16]));
    add(Schema::new(Push, &[0x50], PlusReg, &[Reg32]));
    add(Schema::new(Push, &[0x6A], Plain, &[SImm8]).since(TargetCpu::I186));
    add(Schema::new(Push, &[0x68], Plain, &[ImmW]).since(TargetCpu::I186));
    add(Schema::new(Pop, &[0x58], PlusReg, &[Reg16]));
    add(Schema::new(Pop, &[0x58], PlusReg, &[Reg32]));

    // Increment / decrement
    add(Schema::new(Inc, &[0xFE], ModRm(Some(0)), &[Reg8]));
    add(Schema::new(Inc, &[0x40], PlusReg, &[Reg16]));
    add(Schema::new(Inc, &[0x40], PlusReg, &[Reg32]));
    add(Schema::new(Dec, &[0xFE], ModRm(Some(1)), &[Reg8]));
    add(Schema::new(Dec, &[0x48], PlusReg, &[Reg16]));
    add(Schema::new(Dec, &[0x48], PlusReg, &[Reg32]));

    map
});

pub fn lookup(mnemonic: Mnemonic) -> &'static [Schema] {
    SCHEMAS.get(&mnemonic).map(Vec::as_slice).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mnemonic_has_a_schema() {
        for name in ["nop", "jmp", "call", "jnz", "loop", "mov", "xor", "push", "pop", "inc"] {
            let mnemonic = Mnemonic::parse(name).unwrap();
            assert!(!lookup(mnemonic).is_empty(), "{name}");
        }
    }

    #[test]
    fn byte_size_depends_on_mode() {
        let near = &lookup(Mnemonic::Jmp)[1];
        assert_eq!(near.byte_size(Mode::Bits16), 3);
        assert_eq!(near.byte_size(Mode::Bits32), 5);

        let mov = lookup(Mnemonic::Mov)
            .iter()
            .find(|s| s.operands == [OperandKind::Reg16, OperandKind::Imm16])
            .unwrap();
        assert_eq!(mov.byte_size(Mode::Bits16), 3);
        // 0x66 prefix
        assert_eq!(mov.byte_size(Mode::Bits32), 4);
        assert_eq!(mov.min_cpu(Mode::Bits32), TargetCpu::I386);
        assert_eq!(mov.min_cpu(Mode::Bits16), TargetCpu::I8086);
    }

    #[test]
    fn near_jcc_needs_386() {
        let near = &lookup(Mnemonic::Jz)[1];
        assert_eq!(near.opcode, vec![0x0F, 0x84]);
        assert_eq!(near.min_cpu(Mode::Bits16), TargetCpu::I386);
    }
}
