use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[strum(ascii_case_insensitive)]
pub enum TargetCpu {
    #[strum(serialize = "8086", serialize = "i8086")]
    I8086,
    #[strum(serialize = "186", serialize = "i186")]
    I186,
    #[strum(serialize = "286", serialize = "i286")]
    I286,
    #[strum(serialize = "386", serialize = "i386")]
    I386,
    #[default]
    #[strum(serialize = "486", serialize = "i486")]
    I486,
    #[strum(serialize = "586", serialize = "i586")]
    I586,
    #[strum(serialize = "686", serialize = "i686")]
    I686,
}

/// Operand and address width in bytes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(u8)]
pub enum Mode {
    #[default]
    Bits16 = 2,
    Bits32 = 4,
}

impl Mode {
    /// `bits 16` / `bits 32`
    pub fn from_bits(bits: i64) -> Option<Mode> {
        if bits % 8 != 0 {
            return None;
        }
        u8::try_from(bits / 8)
            .ok()
            .and_then(|width| Mode::try_from(width).ok())
    }

    pub fn width(self) -> u8 {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parse() {
        assert_eq!("386".parse::<TargetCpu>(), Ok(TargetCpu::I386));
        assert_eq!("I686".parse::<TargetCpu>(), Ok(TargetCpu::I686));
        assert!("z80".parse::<TargetCpu>().is_err());
        assert!(TargetCpu::I8086 < TargetCpu::I386);
    }

    #[test]
    fn mode_from_bits() {
        assert_eq!(Mode::from_bits(16), Some(Mode::Bits16));
        assert_eq!(Mode::from_bits(32), Some(Mode::Bits32));
        assert_eq!(Mode::from_bits(64), None);
        assert_eq!(Mode::from_bits(12), None);
        assert_eq!(Mode::Bits32.width(), 4);
    }
}
