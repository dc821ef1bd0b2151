use bimap::BiMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Reg {
    AL,
    CL,
    DL,
    BL,
    AH,
    CH,
    DH,
    BH,
    AX,
    CX,
    DX,
    BX,
    SP,
    BP,
    SI,
    DI,
    EAX,
    ECX,
    EDX,
    EBX,
    ESP,
    EBP,
    ESI,
    EDI,
}

static REG_MAP: Lazy<BiMap<&'static str, Reg>> = Lazy::new(|| {
    let mut map: BiMap<&'static str, Reg> = BiMap::new();
    map.insert("al", Reg::AL);
    map.insert("cl", Reg::CL);
    map.insert("dl", Reg::DL);
    map.insert("bl", Reg::BL);
    map.insert("ah", Reg::AH);
    map.insert("ch", Reg::CH);
    map.insert("dh", Reg::DH);
    map.insert("bh", Reg::BH);
    map.insert("ax", Reg::AX);
    map.insert("cx", Reg::CX);
    map.insert("dx", Reg::DX);
    map.insert("bx", Reg::BX);
    map.insert("sp", Reg::SP);
    map.insert("bp", Reg::BP);
    map.insert("si", Reg::SI);
    map.insert("di", Reg::DI);
    map.insert("eax", Reg::EAX);
    map.insert("ecx", Reg::ECX);
    map.insert("edx", Reg::EDX);
    map.insert("ebx", Reg::EBX);
    map.insert("esp", Reg::ESP);
    map.insert("ebp", Reg::EBP);
    map.insert("esi", Reg::ESI);
    map.insert("edi", Reg::EDI);
    map
});

impl Reg {
    /// Case-insensitive lookup, `None` for anything that is not a register.
    pub fn parse(s: &str) -> Option<Reg> {
        REG_MAP.get_by_left(s.to_ascii_lowercase().as_str()).copied()
    }

    pub fn format(&self) -> &'static str {
        REG_MAP.get_by_right(self).copied().unwrap_or("?")
    }

    /// Width in bytes.
    pub fn size(&self) -> u8 {
        match self {
            Reg::AL | Reg::CL | Reg::DL | Reg::BL | Reg::AH | Reg::CH | Reg::DH | Reg::BH => 1,
            Reg::AX | Reg::CX | Reg::DX | Reg::BX | Reg::SP | Reg::BP | Reg::SI | Reg::DI => 2,
            _ => 4,
        }
    }

    /// 3-bit register code used by ModRM and `+r` opcodes.
    pub fn index(&self) -> u8 {
        (*self as u8) % 8
    }
}

impl Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Reg::parse("AX"), Some(Reg::AX));
        assert_eq!(Reg::parse("esi"), Some(Reg::ESI));
        assert_eq!(Reg::parse("hoge"), None);
    }

    #[test]
    fn size_and_index() {
        assert_eq!((Reg::BH.size(), Reg::BH.index()), (1, 7));
        assert_eq!((Reg::SI.size(), Reg::SI.index()), (2, 6));
        assert_eq!((Reg::ECX.size(), Reg::ECX.index()), (4, 1));
        assert_eq!(Reg::DX.to_string(), "dx");
    }
}
