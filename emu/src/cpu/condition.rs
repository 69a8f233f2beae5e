/// The 4-bit condition field carried by every ARM instruction (bits 31:28)
/// and by the Thumb conditional branch. The instruction executes only if
/// the predicate over the N, Z, C, V flags holds; see
/// [`Psr::can_execute`](super::psr::Psr::can_execute).
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Condition {
    /// Z set (equal).
    EQ = 0x0,

    /// Z clear (not equal).
    NE = 0x1,

    /// C set (unsigned higher or same).
    CS = 0x2,

    /// C clear (unsigned lower).
    CC = 0x3,

    /// N set (negative).
    MI = 0x4,

    /// N clear (positive or zero).
    PL = 0x5,

    /// V set (overflow).
    VS = 0x6,

    /// V clear (no overflow).
    VC = 0x7,

    /// C set and Z clear (unsigned higher).
    HI = 0x8,

    /// C clear or Z set (unsigned lower or same).
    LS = 0x9,

    /// N equals V (signed greater or equal).
    GE = 0xA,

    /// N not equal to V (signed less than).
    LT = 0xB,

    /// Z clear and N equals V (signed greater than).
    GT = 0xC,

    /// Z set or N not equal to V (signed less than or equal).
    LE = 0xD,

    /// Always executed; the assembler suffix is usually omitted.
    AL = 0xE,

    /// Reserved encoding; treated as always on the ARM7TDMI.
    NV = 0xF,
}

impl From<u8> for Condition {
    fn from(value: u8) -> Self {
        match value {
            0x0 => Self::EQ,
            0x1 => Self::NE,
            0x2 => Self::CS,
            0x3 => Self::CC,
            0x4 => Self::MI,
            0x5 => Self::PL,
            0x6 => Self::VS,
            0x7 => Self::VC,
            0x8 => Self::HI,
            0x9 => Self::LS,
            0xA => Self::GE,
            0xB => Self::LT,
            0xC => Self::GT,
            0xD => Self::LE,
            0xE => Self::AL,
            0xF => Self::NV,
            _ => unreachable!(),
        }
    }
}
