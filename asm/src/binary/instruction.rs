use arch::{Arg, Context, Imm, Mode, Schema, TargetCpu};

use crate::ast::{Instruction, InstructionArg};
use crate::error::Error;
use crate::expr::{Eval, Lookup};

#[derive(Debug, Clone)]
pub struct BinaryInstruction<'a> {
    pub instruction: &'a Instruction,
    pub mode: Mode,
    pub target: TargetCpu,
    pub schema: &'static Schema,
    bytes: Vec<u8>,
    constant: bool,
}

impl<'a> BinaryInstruction<'a> {
    /// Pick the best schema at `address`. Operands that cannot be evaluated
    /// yet are encoded as zeros with the pessimistic schema.
    pub fn compile(
        instruction: &'a Instruction,
        env: &impl Lookup,
        address: i64,
        mode: Mode,
        target: TargetCpu,
    ) -> Result<Self, Error> {
        let args = eval_args(instruction, env, false)?;
        Self::encode(instruction, &args, address, mode, target)
    }

    /// Like [`compile`](Self::compile) but every operand must have a value.
    pub fn compile_final(
        instruction: &'a Instruction,
        env: &impl Lookup,
        address: i64,
        mode: Mode,
        target: TargetCpu,
    ) -> Result<Self, Error> {
        let args = eval_args(instruction, env, true)?;
        Self::encode(instruction, &args, address, mode, target)
    }

    fn encode(
        instruction: &'a Instruction,
        args: &[Arg],
        address: i64,
        mode: Mode,
        target: TargetCpu,
    ) -> Result<Self, Error> {
        let ctx = Context {
            address,
            mode,
            target,
        };
        let schema = arch::schemas(instruction.mnemonic, args, &ctx)
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnknownCompilerInstruction(instruction.mnemonic.to_string()))?;
        let bytes = arch::encode(schema, args, &ctx)?;
        Ok(BinaryInstruction {
            instruction,
            mode,
            target,
            schema,
            bytes,
            constant: arch::is_constant_size(instruction.mnemonic, args),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size cannot change whatever the labels turn out to be.
    pub fn is_constant_size(&self) -> bool {
        self.constant
    }
}

fn eval_args(instruction: &Instruction, env: &impl Lookup, strict: bool) -> Result<Vec<Arg>, Error> {
    instruction
        .args
        .iter()
        .map(|arg| match arg {
            InstructionArg::Reg(reg) => Ok(Arg::Reg(*reg)),
            InstructionArg::Expr(expr) => {
                let value = match expr.eval(env)? {
                    Eval::Value(v) => Some(v),
                    Eval::Pending(name) if strict => return Err(Error::UnknownLabel(name)),
                    Eval::Pending(_) => None,
                };
                Ok(Arg::Imm(Imm {
                    value,
                    labeled: expr.is_symbolic(),
                }))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crate::expr::NoSymbols;
    use crate::parser::parse_line;

    fn instruction(line: &str) -> Instruction {
        match parse_line(1, line).unwrap().remove(0).kind {
            NodeKind::Instruction(inst) => inst,
            kind => panic!("not an instruction: {kind:?}"),
        }
    }

    #[test]
    fn pessimistic_without_symbols() {
        let inst = instruction("jmp label");
        let blob =
            BinaryInstruction::compile(&inst, &NoSymbols, 0, Mode::Bits16, TargetCpu::I486).unwrap();
        assert_eq!(blob.bytes(), &[0xE9, 0x00, 0x00]);
        assert!(!blob.is_constant_size());

        let err = BinaryInstruction::compile_final(&inst, &NoSymbols, 0, Mode::Bits16, TargetCpu::I486)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownLabel(name) if name == "label"));
    }

    #[test]
    fn constant_operands() {
        let inst = instruction("add ax, 2 * 4");
        let blob =
            BinaryInstruction::compile(&inst, &NoSymbols, 0, Mode::Bits16, TargetCpu::I486).unwrap();
        assert_eq!(blob.bytes(), &[0x83, 0xC0, 0x08]);
        assert!(blob.is_constant_size());
    }

    #[test]
    fn no_schema() {
        let inst = instruction("mov al, ax");
        assert!(matches!(
            BinaryInstruction::compile(&inst, &NoSymbols, 0, Mode::Bits16, TargetCpu::I486),
            Err(Error::UnknownCompilerInstruction(_))
        ));
    }
}
