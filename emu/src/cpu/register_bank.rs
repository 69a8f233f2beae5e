//! # Banked registers for exception modes
//!
//! When the CPU changes mode, part of the visible register file is swapped
//! for mode-private storage so that exception handlers get their own stack
//! pointer and return address without corrupting the interrupted code:
//!
//! ```text
//! ┌───────────┬──────────────────────────────────────────────────────────┐
//! │ Registers │ Banking behavior                                         │
//! ├───────────┼──────────────────────────────────────────────────────────┤
//! │ R0 - R7   │ Never banked.                                            │
//! │ R8 - R12  │ Banked only in FIQ mode.                                 │
//! │ R13 (SP)  │ Banked in every exception mode; User/System share one.   │
//! │ R14 (LR)  │ Banked in every exception mode; User/System share one.   │
//! │ R15 (PC)  │ Never banked.                                            │
//! │ SPSR      │ One per exception mode; User/System have none.           │
//! └───────────┴──────────────────────────────────────────────────────────┘
//! ```
//!
//! The bank only ever holds the *inactive* copies; the live values sit in
//! [`Registers`](super::registers::Registers) and are exchanged atomically
//! at the mode-transition boundary.

use serde::{Deserialize, Serialize};

use crate::cpu::psr::Psr;

/// Shadow storage for every register slot that is not currently visible.
#[derive(Default, Serialize, Deserialize)]
pub struct RegisterBank {
    /// User/System R8-R12, filled while FIQ has its own copies live.
    pub r8_user: u32,
    pub r9_user: u32,
    pub r10_user: u32,
    pub r11_user: u32,
    pub r12_user: u32,
    /// User/System SP and LR, filled while any exception mode is live.
    pub r13_user: u32,
    pub r14_user: u32,

    pub r8_fiq: u32,
    pub r9_fiq: u32,
    pub r10_fiq: u32,
    pub r11_fiq: u32,
    pub r12_fiq: u32,
    pub r13_fiq: u32,
    pub r14_fiq: u32,

    pub r13_irq: u32,
    pub r14_irq: u32,

    pub r13_svc: u32,
    pub r14_svc: u32,

    pub r13_abt: u32,
    pub r14_abt: u32,

    pub r13_und: u32,
    pub r14_und: u32,

    pub spsr_fiq: Psr,
    pub spsr_irq: Psr,
    pub spsr_svc: Psr,
    pub spsr_abt: Psr,
    pub spsr_und: Psr,
}
