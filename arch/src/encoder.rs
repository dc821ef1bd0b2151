use crate::cpu::{Mode, TargetCpu};
use crate::error::Error;
use crate::mnemonic::Mnemonic;
use crate::reg::Reg;
use crate::schema::{self, Form, OperandKind, Schema};

/// Immediate or branch target. `value` is `None` while the expression
/// behind it cannot be evaluated yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Imm {
    pub value: Option<i64>,
    /// The expression referenced a symbol.
    pub labeled: bool,
}

impl Imm {
    pub fn known(value: i64) -> Self {
        Imm { value: Some(value), labeled: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    Reg(Reg),
    Imm(Imm),
}

/// Where and for what the instruction is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub address: i64,
    pub mode: Mode,
    pub target: TargetCpu,
}

fn fits(value: i64, min: i64, max: i64) -> bool {
    (min..=max).contains(&value)
}

/// Truncate to `width` bytes and sign-extend back.
fn sign_normalize(value: i64, width: u8) -> i64 {
    let shift = 64 - 8 * width as u32;
    (value << shift) >> shift
}

fn operand_matches(schema: &Schema, kind: OperandKind, arg: &Arg, ctx: &Context) -> bool {
    match (kind, arg) {
        (OperandKind::Reg8, Arg::Reg(reg)) => reg.size() == 1,
        (OperandKind::Reg16, Arg::Reg(reg)) => reg.size() == 2,
        (OperandKind::Reg32, Arg::Reg(reg)) => reg.size() == 4,
        (_, Arg::Reg(_)) => false,
        (OperandKind::Reg8 | OperandKind::Reg16 | OperandKind::Reg32, Arg::Imm(_)) => false,

        (_, Arg::Imm(Imm { value: None, .. })) => true,

        (OperandKind::Imm8, Arg::Imm(Imm { value: Some(v), .. })) => fits(*v, -0x80, 0xFF),
        (OperandKind::Imm16, Arg::Imm(Imm { value: Some(v), .. })) => fits(*v, -0x8000, 0xFFFF),
        (OperandKind::Imm32, Arg::Imm(Imm { value: Some(v), .. })) => {
            fits(*v, i32::MIN as i64, u32::MAX as i64)
        }
        (OperandKind::ImmW, Arg::Imm(Imm { value: Some(v), .. })) => match ctx.mode {
            Mode::Bits16 => fits(*v, -0x8000, 0xFFFF),
            Mode::Bits32 => fits(*v, i32::MIN as i64, u32::MAX as i64),
        },
        (OperandKind::SImm8, Arg::Imm(Imm { value: Some(v), .. })) => {
            let width = schema.operand_width().unwrap_or(ctx.mode.width());
            fits(sign_normalize(*v, width), -0x80, 0x7F)
        }
        (OperandKind::Rel8, Arg::Imm(Imm { value: Some(target), .. })) => {
            let next = ctx.address + schema.byte_size(ctx.mode) as i64;
            fits(target - next, -0x80, 0x7F)
        }
        (OperandKind::RelW, Arg::Imm(Imm { value: Some(_), .. })) => true,
    }
}

fn schema_matches(schema: &Schema, args: &[Arg], ctx: &Context) -> bool {
    schema.operands.len() == args.len()
        && schema.min_cpu(ctx.mode) <= ctx.target
        && schema
            .operands
            .iter()
            .zip(args)
            .all(|(kind, arg)| operand_matches(schema, *kind, arg, ctx))
}

/// A short form guessed for an operand whose value is still unknown.
fn guesses_short_form(schema: &Schema, args: &[Arg]) -> bool {
    schema.operands.iter().zip(args).any(|(kind, arg)| {
        matches!(kind, OperandKind::SImm8 | OperandKind::Rel8)
            && matches!(arg, Arg::Imm(Imm { value: None, .. }))
    })
}

/// Candidate encodings for `mnemonic args` at `ctx`, best first.
///
/// Known operands rank by encoded size. While an operand is unknown, forms
/// that could hold any value come before short forms that may not fit, so
/// the first candidate is a pessimistic estimate.
pub fn schemas(mnemonic: Mnemonic, args: &[Arg], ctx: &Context) -> Vec<&'static Schema> {
    let mut found: Vec<&'static Schema> = schema::lookup(mnemonic)
        .iter()
        .filter(|schema| schema_matches(schema, args, ctx))
        .collect();
    found.sort_by_key(|schema| (guesses_short_form(schema, args), schema.byte_size(ctx.mode)));
    found
}

/// `true` when the encoded size of this instruction cannot change
/// whatever the addresses of the surrounding code turn out to be.
pub fn is_constant_size(mnemonic: Mnemonic, args: &[Arg]) -> bool {
    !mnemonic.is_branch()
        && args.iter().all(|arg| match arg {
            Arg::Reg(_) => true,
            Arg::Imm(imm) => imm.value.is_some() && !imm.labeled,
        })
}

fn push_le(bytes: &mut Vec<u8>, value: i64, size: usize) {
    bytes.extend_from_slice(&value.to_le_bytes()[..size]);
}

fn reg_at(args: &[Arg], idx: usize, kind: OperandKind) -> Result<Reg, Error> {
    match args.get(idx) {
        Some(Arg::Reg(reg)) => Ok(*reg),
        _ => Err(Error::OperandKind(idx, kind)),
    }
}

/// Encode with a chosen schema. Unknown values are written as zeros.
pub fn encode(schema: &Schema, args: &[Arg], ctx: &Context) -> Result<Vec<u8>, Error> {
    if schema.operands.len() != args.len() {
        return Err(Error::OperandCount {
            expected: schema.operands.len(),
            found: args.len(),
        });
    }

    let mut bytes = Vec::with_capacity(schema.byte_size(ctx.mode));
    if schema.needs_size_prefix(ctx.mode) {
        bytes.push(0x66);
    }
    bytes.extend_from_slice(&schema.opcode);

    match schema.form {
        Form::Plain => {}
        Form::PlusReg => {
            let reg = reg_at(args, 0, schema.operands[0])?;
            if let Some(last) = bytes.last_mut() {
                *last += reg.index();
            }
        }
        Form::ModRm(ext) => {
            let rm = reg_at(args, 0, schema.operands[0])?;
            let reg = match ext {
                Some(ext) => ext,
                None => reg_at(args, 1, schema.operands[1])?.index(),
            };
            bytes.push(0xC0 | (reg << 3) | rm.index());
        }
    }

    let next = ctx.address + schema.byte_size(ctx.mode) as i64;
    for (idx, (kind, arg)) in schema.operands.iter().zip(args).enumerate() {
        let imm = match (kind, arg) {
            (OperandKind::Reg8 | OperandKind::Reg16 | OperandKind::Reg32, Arg::Reg(_)) => continue,
            (OperandKind::Reg8 | OperandKind::Reg16 | OperandKind::Reg32, Arg::Imm(_))
            | (_, Arg::Reg(_)) => return Err(Error::OperandKind(idx, *kind)),
            (_, Arg::Imm(imm)) => imm,
        };
        let size = kind.byte_size(ctx.mode);
        let Some(value) = imm.value else {
            bytes.extend(std::iter::repeat(0).take(size));
            continue;
        };
        let value = match kind {
            OperandKind::Rel8 => {
                let rel = value - next;
                if !fits(rel, -0x80, 0x7F) {
                    return Err(Error::RelativeOutOfRange(rel));
                }
                rel
            }
            OperandKind::RelW => value - next,
            OperandKind::SImm8 => {
                let width = schema.operand_width().unwrap_or(ctx.mode.width());
                let normalized = sign_normalize(value, width);
                if !fits(normalized, -0x80, 0x7F) {
                    return Err(Error::ImmediateOutOfRange { value, size });
                }
                normalized
            }
            _ => {
                let min = -(1i64 << (8 * size - 1));
                let max = (1i64 << (8 * size)) - 1;
                if !fits(value, min, max) {
                    return Err(Error::ImmediateOutOfRange { value, size });
                }
                value
            }
        };
        push_le(&mut bytes, value, size);
    }

    Ok(bytes)
}
