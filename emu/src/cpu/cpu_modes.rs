//! # ARM7TDMI operating modes
//!
//! The processor runs in one of seven modes, encoded in bits 0-4 of the
//! CPSR:
//!
//! ```text
//! ┌─────────────┬──────────┬──────────────────────────────────────────────┐
//! │    Mode     │  Binary  │                  Purpose                     │
//! ├─────────────┼──────────┼──────────────────────────────────────────────┤
//! │ User        │  10000   │ Normal program execution (unprivileged)      │
//! │ FIQ         │  10001   │ Fast interrupt handling                      │
//! │ IRQ         │  10010   │ General interrupt handling                   │
//! │ Supervisor  │  10011   │ Protected mode for the BIOS (SWI)            │
//! │ Abort       │  10111   │ Memory access failures                       │
//! │ Undefined   │  11011   │ Undefined instruction handling               │
//! │ System      │  11111   │ Privileged mode sharing User registers       │
//! └─────────────┴──────────┴──────────────────────────────────────────────┘
//! ```
//!
//! Each exception mode owns banked copies of R13/R14 (FIQ additionally
//! banks R8-R12) and an SPSR slot that saves the CPSR on entry; see
//! `register_bank`. A mode change is therefore never just a bit write, it
//! swaps part of the visible register file.

use serde::{Deserialize, Serialize};

/// The CPU operating mode, stored in bits 0-4 of the CPSR/SPSR.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Mode {
    /// Normal program execution state (unprivileged). Games run here.
    User = 0b10000,

    /// Fast Interrupt Request mode. Banks R8-R14 for minimal context-save
    /// overhead. The GBA has no external FIQ source, but games can still
    /// enter it through MSR.
    Fiq = 0b10001,

    /// Interrupt Request mode, entered on VBlank/HBlank/timer/DMA IRQs.
    Irq = 0b10010,

    /// Supervisor mode, entered via Reset or the SWI instruction.
    Supervisor = 0b10011,

    /// Abort mode, entered after a failed memory access. On the GBA this
    /// normally indicates a bug since there is no virtual memory.
    Abort = 0b10111,

    /// Undefined instruction mode.
    Undefined = 0b11011,

    /// Privileged mode that shares the User register bank.
    System = 0b11111,
}

impl Mode {
    /// User and System share the unbanked register file and have no SPSR.
    pub const fn has_spsr(self) -> bool {
        !matches!(self, Self::User | Self::System)
    }
}

impl From<Mode> for u32 {
    fn from(m: Mode) -> Self {
        m as Self
    }
}

impl TryFrom<u32> for Mode {
    type Error = ();

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n & 0b11111 {
            0b10000 => Ok(Self::User),
            0b10001 => Ok(Self::Fiq),
            0b10010 => Ok(Self::Irq),
            0b10011 => Ok(Self::Supervisor),
            0b10111 => Ok(Self::Abort),
            0b11011 => Ok(Self::Undefined),
            0b11111 => Ok(Self::System),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        for mode in [
            Mode::User,
            Mode::Fiq,
            Mode::Irq,
            Mode::Supervisor,
            Mode::Abort,
            Mode::Undefined,
            Mode::System,
        ] {
            assert_eq!(Mode::try_from(mode as u32), Ok(mode));
        }
    }

    #[test]
    fn invalid_bits() {
        assert_eq!(Mode::try_from(0b00000), Err(()));
        assert_eq!(Mode::try_from(0b00110), Err(()));
    }

    #[test]
    fn spsr_ownership() {
        assert!(!Mode::User.has_spsr());
        assert!(!Mode::System.has_spsr());
        assert!(Mode::Irq.has_spsr());
        assert!(Mode::Fiq.has_spsr());
    }
}
