//! # ARM7TDMI register file
//!
//! Sixteen registers are visible at any time:
//!
//! ```text
//! ┌──────────┬──────────────────────────────────────────────────────────┐
//! │ Register │ Purpose                                                  │
//! ├──────────┼──────────────────────────────────────────────────────────┤
//! │ R0-R7    │ General purpose. Never banked.                           │
//! │ R8-R12   │ General purpose. Banked only in FIQ mode.                │
//! │ R13 (SP) │ Stack pointer by convention. Banked per exception mode.  │
//! │ R14 (LR) │ Link register (return address). Banked per mode.         │
//! │ R15 (PC) │ Program counter. Never banked.                           │
//! └──────────┴──────────────────────────────────────────────────────────┘
//! ```
//!
//! Which physical slot backs R8-R14 depends on the current mode; the
//! swapping happens in `Arm7tdmi::swap_mode` against the shadow storage in
//! [`RegisterBank`](super::register_bank::RegisterBank).

use serde::{Deserialize, Serialize};

/// Stack pointer register index.
pub const REG_SP: u32 = 13;

/// Link register index (return address for subroutines).
pub const REG_LR: u32 = 14;

/// Program counter register index.
pub const REG_PC: u32 = 15;

/// The live view of R0-R15.
#[derive(Default, Serialize, Deserialize)]
pub struct Registers([u32; 16]);

impl Registers {
    #[must_use]
    pub const fn program_counter(&self) -> u32 {
        self.0[REG_PC as usize]
    }

    pub const fn set_program_counter(&mut self, new_value: u32) {
        self.0[REG_PC as usize] = new_value;
    }

    #[must_use]
    pub fn register_at(&self, reg: u32) -> u32 {
        debug_assert!(reg <= 15, "invalid register index: {reg}");
        self.0[reg as usize]
    }

    pub fn set_register_at(&mut self, reg: u32, new_value: u32) {
        debug_assert!(reg <= 15, "invalid register index: {reg}");
        self.0[reg as usize] = new_value;
    }

    pub fn clear(&mut self) {
        self.0 = [0; 16];
    }
}
