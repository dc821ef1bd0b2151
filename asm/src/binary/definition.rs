use crate::ast::{DefArg, Definition};
use crate::error::Error;
use crate::expr::{Eval, Lookup, NoSymbols};

/// Symbolic argument and where its bytes go.
#[derive(Debug, Clone, Copy)]
struct Slot {
    arg: usize,
    offset: usize,
    resolved: bool,
}

#[derive(Debug, Clone)]
pub struct BinaryDefinition<'a> {
    pub def: &'a Definition,
    bytes: Vec<u8>,
    slots: Vec<Slot>,
}

impl<'a> BinaryDefinition<'a> {
    /// Literal arguments are encoded now, symbolic ones get zero bytes until
    /// resolved.
    pub fn compile(def: &'a Definition) -> Result<Self, Error> {
        let size = def.size.byte_size();
        let mut bytes = Vec::new();
        let mut slots = Vec::new();

        for (idx, arg) in def.args.iter().enumerate() {
            match arg {
                DefArg::Expr(expr) if expr.is_symbolic() => {
                    slots.push(Slot {
                        arg: idx,
                        offset: bytes.len(),
                        resolved: false,
                    });
                    bytes.resize(bytes.len() + size, 0);
                }
                DefArg::Expr(expr) => {
                    let value = expr.eval(&NoSymbols)?.value().unwrap_or_default();
                    bytes.extend(encode_int(value, size)?);
                }
                DefArg::Float(x) => bytes.extend(encode_float(*x, size)?),
                DefArg::Text(text) => {
                    bytes.extend(text.as_bytes());
                    let padding = (size - text.len() % size) % size;
                    bytes.resize(bytes.len() + padding, 0);
                }
            }
        }

        Ok(BinaryDefinition { def, bytes, slots })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_resolved(&self) -> bool {
        self.slots.iter().all(|slot| slot.resolved)
    }

    /// Fill what can be filled. Returns whether nothing is left unresolved.
    pub fn resolve(&mut self, env: &impl Lookup) -> Result<bool, Error> {
        let size = self.def.size.byte_size();
        for slot in self.slots.iter_mut().filter(|slot| !slot.resolved) {
            let DefArg::Expr(expr) = &self.def.args[slot.arg] else {
                continue;
            };
            if let Eval::Value(v) = expr.eval(env)? {
                self.bytes[slot.offset..slot.offset + size].copy_from_slice(&encode_int(v, size)?);
                slot.resolved = true;
            }
        }
        Ok(self.is_resolved())
    }

    /// Re-evaluate every symbolic argument; all of them must have a value.
    pub fn finalize(&mut self, env: &impl Lookup) -> Result<(), Error> {
        let size = self.def.size.byte_size();
        for slot in self.slots.iter_mut() {
            let DefArg::Expr(expr) = &self.def.args[slot.arg] else {
                continue;
            };
            match expr.eval(env)? {
                Eval::Value(v) => {
                    self.bytes[slot.offset..slot.offset + size]
                        .copy_from_slice(&encode_int(v, size)?);
                    slot.resolved = true;
                }
                Eval::Pending(name) => return Err(Error::UnknownLabel(name)),
            }
        }
        Ok(())
    }
}

/// Little-endian, accepting both signed and unsigned ranges.
fn encode_int(value: i64, size: usize) -> Result<Vec<u8>, Error> {
    if size < 8 {
        let min = -(1i64 << (8 * size - 1));
        let max = (1i64 << (8 * size)) - 1;
        if !(min..=max).contains(&value) {
            return Err(Error::DefinedDataExceedsBounds { value, size });
        }
    }
    let mut bytes = value.to_le_bytes().to_vec();
    let sign = if value < 0 { 0xFF } else { 0x00 };
    bytes.resize(size, sign);
    Ok(bytes)
}

fn encode_float(value: f64, size: usize) -> Result<Vec<u8>, Error> {
    match size {
        4 => Ok((value as f32).to_le_bytes().to_vec()),
        8 => Ok(value.to_le_bytes().to_vec()),
        10 => Ok(to_extended(value).to_vec()),
        _ => Err(Error::IncorrectFloatSize(size)),
    }
}

/// x87 80-bit extended precision, little-endian.
fn to_extended(value: f64) -> [u8; 10] {
    let bits = value.to_bits();
    let sign = (bits >> 63) as u16;
    let exp = ((bits >> 52) & 0x7FF) as i32;
    let frac = bits & ((1u64 << 52) - 1);

    let (exp, mantissa) = match (exp, frac) {
        (0, 0) => (0, 0),
        // subnormal double, normal extended
        (0, _) => {
            let shift = frac.leading_zeros();
            (16383 - 1011 - shift as i32, frac << shift)
        }
        (0x7FF, _) => (0x7FFF, (1 << 63) | (frac << 11)),
        _ => (exp - 1023 + 16383, (1 << 63) | (frac << 11)),
    };

    let mut out = [0u8; 10];
    out[..8].copy_from_slice(&mantissa.to_le_bytes());
    out[8..].copy_from_slice(&((sign << 15) | exp as u16).to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crate::parser::parse_line;

    fn definition(line: &str) -> Definition {
        match parse_line(1, line).unwrap().remove(0).kind {
            NodeKind::Definition(def) => def,
            kind => panic!("not a definition: {kind:?}"),
        }
    }

    macro_rules! test_def {
        ($($name:ident: $line:literal => [$($byte:expr),*];)*) => {
            $(
                #[test]
                fn $name() {
                    let def = definition($line);
                    let bin = BinaryDefinition::compile(&def).unwrap();
                    assert_eq!(bin.bytes(), &[$($byte),*]);
                }
            )*
        };
    }

    test_def! {
        db_bytes: "db 1, 0xFF, -1" => [0x01, 0xFF, 0xFF];
        dw_words: "dw 0x1234, -2" => [0x34, 0x12, 0xFE, 0xFF];
        db_text: "db 'hi', 0" => [b'h', b'i', 0];
        dw_text_padding: "dw 'abc'" => [b'a', b'b', b'c', 0];
        dd_float: "dd 1.0" => [0x00, 0x00, 0x80, 0x3F];
        dq_float: "dq -2.0" => [0, 0, 0, 0, 0, 0, 0, 0xC0];
        dt_float: "dt 1.0" => [0, 0, 0, 0, 0, 0, 0, 0x80, 0xFF, 0x3F];
        dt_int: "dt -1" => [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        placeholder: "dw 1, label" => [0x01, 0x00, 0x00, 0x00];
    }

    #[test]
    fn errors() {
        let def = definition("db 0x100");
        assert!(matches!(
            BinaryDefinition::compile(&def),
            Err(Error::DefinedDataExceedsBounds { value: 0x100, size: 1 })
        ));
        let def = definition("dw 1.5");
        assert!(matches!(BinaryDefinition::compile(&def), Err(Error::IncorrectFloatSize(2))));
    }

    #[test]
    fn subnormal_extended() {
        let bytes = to_extended(f64::from_bits(1));
        assert_eq!(&bytes[..8], &(1u64 << 63).to_le_bytes());
        assert_eq!(u16::from_le_bytes([bytes[8], bytes[9]]), (16383 - 1074) as u16);
    }

    struct Label(Option<i64>);

    impl Lookup for Label {
        fn lookup(&self, _: &str) -> Result<Option<i64>, Error> {
            Ok(self.0)
        }
    }

    #[test]
    fn resolve_later() {
        let def = definition("dw label, label + 1");
        let mut bin = BinaryDefinition::compile(&def).unwrap();
        assert!(!bin.is_resolved());
        assert!(!bin.resolve(&Label(None)).unwrap());
        assert!(bin.resolve(&Label(Some(0x7C00))).unwrap());
        assert_eq!(bin.bytes(), &[0x00, 0x7C, 0x01, 0x7C]);

        bin.finalize(&Label(Some(0x10))).unwrap();
        assert_eq!(bin.bytes(), &[0x10, 0x00, 0x11, 0x00]);
        assert!(matches!(bin.finalize(&Label(None)), Err(Error::UnknownLabel(_))));
    }
}
