//! # Program Status Registers (CPSR and SPSR)
//!
//! ```text
//! 31 30 29 28 27      8 7 6 5 4   0
//! ┌──┬──┬──┬──┬────────┬─┬─┬─┬─────┐
//! │N │Z │C │V │Reserved│I│F│T│Mode │
//! └──┴──┴──┴──┴────────┴─┴─┴─┴─────┘
//! ```
//!
//! - **Flags (28-31)**: tested by the [`condition`](super::condition) field
//! - **I/F (6-7)**: IRQ/FIQ disable
//! - **T (5)**: ARM (0) or Thumb (1) state
//! - **Mode (0-4)**: see [`cpu_modes`](super::cpu_modes)
//!
//! Each exception mode has an SPSR slot that saves the CPSR on entry; the
//! slots live in [`RegisterBank`](super::register_bank::RegisterBank).

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::alu::ArithmeticOpResult;
use crate::cpu::{condition::Condition, cpu_modes::Mode};

/// Program Status Register (CPSR or SPSR).
///
/// Wraps the raw `u32` and provides type-safe accessors for each field.
#[derive(Default, Clone, Copy, Serialize, Deserialize)]
pub struct Psr(u32);

impl Psr {
    pub(crate) fn can_execute(self, cond: Condition) -> bool {
        use Condition::{AL, CC, CS, EQ, GE, GT, HI, LE, LS, LT, MI, NE, NV, PL, VC, VS};
        match cond {
            EQ => self.zero_flag(),
            NE => !self.zero_flag(),
            CS => self.carry_flag(),
            CC => !self.carry_flag(),
            MI => self.sign_flag(),
            PL => !self.sign_flag(),
            VS => self.overflow_flag(),
            VC => !self.overflow_flag(),
            HI => self.carry_flag() && !self.zero_flag(),
            LS => !self.carry_flag() || self.zero_flag(),
            GE => self.sign_flag() == self.overflow_flag(),
            LT => self.sign_flag() != self.overflow_flag(),
            GT => !self.zero_flag() && (self.sign_flag() == self.overflow_flag()),
            LE => self.zero_flag() || (self.sign_flag() != self.overflow_flag()),
            // NV is reserved; the ARM7TDMI executes it unconditionally.
            AL | NV => true,
        }
    }

    /// N => Bit 31, (0=Not Signed, 1=Signed)
    #[must_use]
    pub fn sign_flag(self) -> bool {
        self.0.get_bit(31)
    }

    /// Z => Bit 30, (0=Not Zero, 1=Zero)
    #[must_use]
    pub fn zero_flag(self) -> bool {
        self.0.get_bit(30)
    }

    /// C => Bit 29, (0=Borrow/No Carry, 1=Carry/No Borrow)
    #[must_use]
    pub fn carry_flag(self) -> bool {
        self.0.get_bit(29)
    }

    /// V => Bit 28, (0=No Overflow, 1=Overflow)
    #[must_use]
    pub fn overflow_flag(self) -> bool {
        self.0.get_bit(28)
    }

    /// I => Bit 7, (0=Enable, 1=Disable)
    #[must_use]
    pub fn irq_disable(self) -> bool {
        self.0.get_bit(7)
    }

    /// F => Bit 6, (0=Enable, 1=Disable)
    #[must_use]
    pub fn fiq_disable(self) -> bool {
        self.0.get_bit(6)
    }

    /// T => Bit 5, (0=ARM, 1=THUMB). The fetch unit keys off this bit, so
    /// it must only change through BX or a full PSR write.
    #[must_use]
    pub fn state_bit(self) -> bool {
        self.0.get_bit(5)
    }

    /// M4-M0 => Bits 4-0.
    ///
    /// The BIOS occasionally writes invalid mode patterns to an SPSR; those
    /// decode to `None` and the caller decides what to do.
    #[must_use]
    pub fn mode(self) -> Option<Mode> {
        Mode::try_from(self.0 & 0b11111).ok()
    }

    pub fn set_sign_flag(&mut self, value: bool) {
        self.0.set_bit(31, value);
    }

    pub fn set_zero_flag(&mut self, value: bool) {
        self.0.set_bit(30, value);
    }

    pub fn set_carry_flag(&mut self, value: bool) {
        self.0.set_bit(29, value);
    }

    pub fn set_overflow_flag(&mut self, value: bool) {
        self.0.set_bit(28, value);
    }

    /// Sets N, Z, C and V from an ALU result.
    pub fn set_flags(&mut self, op_result: &ArithmeticOpResult) {
        self.set_sign_flag(op_result.sign);
        self.set_zero_flag(op_result.zero);
        self.set_carry_flag(op_result.carry);
        self.set_overflow_flag(op_result.overflow);
    }

    /// Sets only N and Z from a result value, the logical-op rule.
    pub fn set_nz(&mut self, result: u32) {
        self.set_sign_flag(result.get_bit(31));
        self.set_zero_flag(result == 0);
    }

    pub fn set_irq_disable(&mut self, value: bool) {
        self.0.set_bit(7, value);
    }

    pub fn set_fiq_disable(&mut self, value: bool) {
        self.0.set_bit(6, value);
    }

    pub fn set_state_bit(&mut self, value: bool) {
        self.0.set_bit(5, value);
    }

    /// The Mode Bits M4-M0 contain the current operating mode.
    pub fn set_mode(&mut self, m: Mode) {
        self.0 = (self.0 & !0b11111) | m as u32;
    }
}

impl From<Mode> for Psr {
    fn from(m: Mode) -> Self {
        Self(m as u32)
    }
}

impl From<u32> for Psr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Psr> for u32 {
    fn from(p: Psr) -> Self {
        p.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        let mut cpsr = Psr::default();
        cpsr.set_sign_flag(true);
        assert!(cpsr.sign_flag());

        cpsr.set_zero_flag(true);
        assert!(cpsr.zero_flag());

        cpsr.set_carry_flag(true);
        assert!(cpsr.carry_flag());

        cpsr.set_overflow_flag(true);
        assert!(cpsr.overflow_flag());

        assert_eq!(u32::from(cpsr) >> 28, 0b1111);
    }

    #[test]
    fn control_bits() {
        let mut cpsr = Psr::default();
        cpsr.set_irq_disable(true);
        assert!(cpsr.irq_disable());

        cpsr.set_fiq_disable(true);
        assert!(cpsr.fiq_disable());

        cpsr.set_state_bit(true);
        assert!(cpsr.state_bit());
    }

    #[test]
    fn mode_bits() {
        let mut cpsr = Psr::default();
        cpsr.set_mode(Mode::Irq);
        assert_eq!(u32::from(cpsr) & 0b11111, 0b10010);
        assert_eq!(cpsr.mode(), Some(Mode::Irq));

        let invalid = Psr::from(0b00001_u32);
        assert_eq!(invalid.mode(), None);
    }

    #[test]
    fn conditions() {
        let mut cpsr = Psr::default();
        cpsr.set_zero_flag(true);
        assert!(cpsr.can_execute(Condition::EQ));
        assert!(!cpsr.can_execute(Condition::NE));
        assert!(cpsr.can_execute(Condition::LS));
        assert!(cpsr.can_execute(Condition::AL));

        cpsr.set_sign_flag(true);
        cpsr.set_overflow_flag(false);
        assert!(cpsr.can_execute(Condition::LT));
        assert!(!cpsr.can_execute(Condition::GE));
    }
}
