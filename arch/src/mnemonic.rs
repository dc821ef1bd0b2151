use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Mnemonic {
    Nop,
    Hlt,
    Ret,
    Retf,
    Int3,
    Cli,
    Sti,
    Cld,
    Std,
    Pusha,
    Popa,
    Int,

    Jmp,
    Call,
    Jo,
    Jno,
    Jb,
    Jc,
    Jnae,
    Jae,
    Jnb,
    Jnc,
    Je,
    Jz,
    Jne,
    Jnz,
    Jbe,
    Jna,
    Ja,
    Jnbe,
    Js,
    Jns,
    Jp,
    Jpe,
    Jnp,
    Jpo,
    Jl,
    Jnge,
    Jge,
    Jnl,
    Jle,
    Jng,
    Jg,
    Jnle,
    Loop,
    Loope,
    Loopne,
    Jcxz,

    Mov,
    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,
    Push,
    Pop,
    Inc,
    Dec,
}

impl Mnemonic {
    pub fn parse(s: &str) -> Option<Mnemonic> {
        s.parse().ok()
    }

    /// Condition nibble of a `jcc`.
    pub fn condition(&self) -> Option<u8> {
        use Mnemonic::*;
        Some(match self {
            Jo => 0x0,
            Jno => 0x1,
            Jb | Jc | Jnae => 0x2,
            Jae | Jnb | Jnc => 0x3,
            Je | Jz => 0x4,
            Jne | Jnz => 0x5,
            Jbe | Jna => 0x6,
            Ja | Jnbe => 0x7,
            Js => 0x8,
            Jns => 0x9,
            Jp | Jpe => 0xA,
            Jnp | Jpo => 0xB,
            Jl | Jnge => 0xC,
            Jge | Jnl => 0xD,
            Jle | Jng => 0xE,
            Jg | Jnle => 0xF,
            _ => return None,
        })
    }

    /// ModRM extension of the classic two-operand ALU group.
    pub fn alu_ext(&self) -> Option<u8> {
        use Mnemonic::*;
        Some(match self {
            Add => 0,
            Or => 1,
            Adc => 2,
            Sbb => 3,
            And => 4,
            Sub => 5,
            Xor => 6,
            Cmp => 7,
            _ => return None,
        })
    }

    /// Instructions whose encoding depends on the distance to the target.
    pub fn is_branch(&self) -> bool {
        use Mnemonic::*;
        self.condition().is_some() || matches!(self, Jmp | Call | Loop | Loope | Loopne | Jcxz)
    }
}

#[test]
fn test() {
    assert_eq!(Mnemonic::parse("JMP"), Some(Mnemonic::Jmp));
    assert_eq!(Mnemonic::parse("int3"), Some(Mnemonic::Int3));
    assert_eq!(Mnemonic::parse("hoge"), None);
    assert_eq!(Mnemonic::Jnz.condition(), Some(0x5));
    assert_eq!(Mnemonic::Cmp.alu_ext(), Some(7));
    assert!(Mnemonic::Loop.is_branch());
    assert!(!Mnemonic::Mov.is_branch());
    assert_eq!(Mnemonic::Loopne.to_string(), "loopne");
}
