//! The ARM7TDMI processor.
//!
//! A cycle-stepped interpreter without pipeline modeling: `step` fetches
//! one instruction at the PC in the current ISA, advances the PC by the
//! instruction width, executes, and counts one cycle. The prefetch the
//! real pipeline causes is folded into the handlers (reading R15 as an
//! operand yields the architectural address + 8).
//!
//! The CPU owns the [`Bus`] and with it the whole machine; the ARM and
//! Thumb instruction handlers live in the sibling `arm` and `thumb`
//! modules, the HLE BIOS calls in `swi`.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::bus::Bus;
use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::Psr;
use crate::cpu::register_bank::RegisterBank;
use crate::cpu::registers::{Registers, REG_LR, REG_SP};

/// Cartridge entry point.
const RESET_PC: u32 = 0x0800_0000;

/// Top of IWRAM minus the BIOS scratch area, the conventional boot SP.
const RESET_SP: u32 = 0x0300_7F00;

/// Hardware interrupt vector.
const IRQ_VECTOR: u32 = 0x0000_0018;

#[derive(Serialize, Deserialize)]
pub struct Arm7tdmi {
    pub bus: Bus,

    pub registers: Registers,
    pub cpsr: Psr,
    /// SPSR of the current mode; swapped with the bank on mode changes.
    pub spsr: Psr,
    pub register_bank: RegisterBank,

    cycles: u64,
}

impl Default for Arm7tdmi {
    fn default() -> Self {
        let mut cpu = Self {
            bus: Bus::default(),
            registers: Registers::default(),
            cpsr: Psr::from(Mode::System),
            spsr: Psr::default(),
            register_bank: RegisterBank::default(),
            cycles: 0,
        };
        cpu.reset();
        cpu
    }
}

impl Arm7tdmi {
    /// Power-on state: System mode, ARM state, all flags clear, PC at the
    /// cartridge entry, SP at the conventional boot stack.
    pub fn reset(&mut self) {
        self.registers.clear();
        self.cpsr = Psr::from(Mode::System);
        self.spsr = Psr::default();
        self.register_bank = RegisterBank::default();
        self.cycles = 0;

        self.registers.set_program_counter(RESET_PC);
        self.registers.set_register_at(REG_SP, RESET_SP);
    }

    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Executes exactly one instruction in the current ISA.
    pub fn step(&mut self) {
        if self.cpsr.state_bit() {
            let pc = self.registers.program_counter() & !1;
            let opcode = self.bus.fetch_half_word(pc);
            self.registers.set_program_counter(pc.wrapping_add(2));
            self.execute_thumb(opcode);
        } else {
            let pc = self.registers.program_counter() & !3;
            let opcode = self.bus.fetch_word(pc);
            self.registers.set_program_counter(pc.wrapping_add(4));
            self.execute_arm(opcode);
        }

        self.cycles += 1;
    }

    /// Takes the IRQ exception when an enabled interrupt is pending and
    /// the CPSR I bit allows it.
    pub fn check_irq(&mut self) {
        if self.cpsr.irq_disable() || !self.bus.irq_pending() {
            return;
        }

        let saved_cpsr = self.cpsr;
        self.swap_mode(Mode::Irq);
        self.spsr = saved_cpsr;

        // The handler returns with `SUBS PC, LR, #4`.
        self.registers
            .set_register_at(REG_LR, self.registers.program_counter().wrapping_add(4));
        self.cpsr.set_state_bit(false);
        self.cpsr.set_irq_disable(true);
        self.registers.set_program_counter(IRQ_VECTOR);
    }

    /// Full CPSR write, swapping register banks when the mode bits change.
    /// Invalid mode patterns keep the current mode and only update the
    /// remaining bits.
    pub(crate) fn write_cpsr(&mut self, value: u32) {
        match Mode::try_from(value) {
            Ok(new_mode) => {
                if self.cpsr.mode() != Some(new_mode) {
                    self.swap_mode(new_mode);
                }
                self.cpsr = Psr::from(value);
            }
            Err(()) => {
                tracing::debug!("CPSR write with invalid mode bits {:#07b}", value & 0x1F);
                let old_mode_bits = u32::from(self.cpsr) & 0x1F;
                self.cpsr = Psr::from((value & !0x1F) | old_mode_bits);
            }
        }
    }

    /// Swaps the banked part of the register file. FIQ banking is applied
    /// before the generic R13/R14 exchange; the order is load-bearing for
    /// transitions in and out of FIQ.
    pub(crate) fn swap_mode(&mut self, new_mode: Mode) {
        let old_mode = self.cpsr.mode().unwrap_or(Mode::System);
        if old_mode == new_mode {
            self.cpsr.set_mode(new_mode);
            return;
        }

        let r13 = self.registers.register_at(13);
        let r14 = self.registers.register_at(14);

        // Park the outgoing mode's R13/R14 and SPSR; leaving FIQ also
        // hands R8-R12 back to the shared set.
        match old_mode {
            Mode::User | Mode::System => {
                self.register_bank.r13_user = r13;
                self.register_bank.r14_user = r14;
            }
            Mode::Fiq => {
                self.register_bank.r8_fiq = self.registers.register_at(8);
                self.register_bank.r9_fiq = self.registers.register_at(9);
                self.register_bank.r10_fiq = self.registers.register_at(10);
                self.register_bank.r11_fiq = self.registers.register_at(11);
                self.register_bank.r12_fiq = self.registers.register_at(12);
                self.register_bank.r13_fiq = r13;
                self.register_bank.r14_fiq = r14;
                self.register_bank.spsr_fiq = self.spsr;

                self.registers.set_register_at(8, self.register_bank.r8_user);
                self.registers.set_register_at(9, self.register_bank.r9_user);
                self.registers.set_register_at(10, self.register_bank.r10_user);
                self.registers.set_register_at(11, self.register_bank.r11_user);
                self.registers.set_register_at(12, self.register_bank.r12_user);
            }
            Mode::Irq => {
                self.register_bank.r13_irq = r13;
                self.register_bank.r14_irq = r14;
                self.register_bank.spsr_irq = self.spsr;
            }
            Mode::Supervisor => {
                self.register_bank.r13_svc = r13;
                self.register_bank.r14_svc = r14;
                self.register_bank.spsr_svc = self.spsr;
            }
            Mode::Abort => {
                self.register_bank.r13_abt = r13;
                self.register_bank.r14_abt = r14;
                self.register_bank.spsr_abt = self.spsr;
            }
            Mode::Undefined => {
                self.register_bank.r13_und = r13;
                self.register_bank.r14_und = r14;
                self.register_bank.spsr_und = self.spsr;
            }
        }

        // Bring in the new mode's bank.
        match new_mode {
            Mode::User | Mode::System => {
                self.registers.set_register_at(13, self.register_bank.r13_user);
                self.registers.set_register_at(14, self.register_bank.r14_user);
            }
            Mode::Fiq => {
                self.register_bank.r8_user = self.registers.register_at(8);
                self.register_bank.r9_user = self.registers.register_at(9);
                self.register_bank.r10_user = self.registers.register_at(10);
                self.register_bank.r11_user = self.registers.register_at(11);
                self.register_bank.r12_user = self.registers.register_at(12);

                self.registers.set_register_at(8, self.register_bank.r8_fiq);
                self.registers.set_register_at(9, self.register_bank.r9_fiq);
                self.registers.set_register_at(10, self.register_bank.r10_fiq);
                self.registers.set_register_at(11, self.register_bank.r11_fiq);
                self.registers.set_register_at(12, self.register_bank.r12_fiq);
                self.registers.set_register_at(13, self.register_bank.r13_fiq);
                self.registers.set_register_at(14, self.register_bank.r14_fiq);
                self.spsr = self.register_bank.spsr_fiq;
            }
            Mode::Irq => {
                self.registers.set_register_at(13, self.register_bank.r13_irq);
                self.registers.set_register_at(14, self.register_bank.r14_irq);
                self.spsr = self.register_bank.spsr_irq;
            }
            Mode::Supervisor => {
                self.registers.set_register_at(13, self.register_bank.r13_svc);
                self.registers.set_register_at(14, self.register_bank.r14_svc);
                self.spsr = self.register_bank.spsr_svc;
            }
            Mode::Abort => {
                self.registers.set_register_at(13, self.register_bank.r13_abt);
                self.registers.set_register_at(14, self.register_bank.r14_abt);
                self.spsr = self.register_bank.spsr_abt;
            }
            Mode::Undefined => {
                self.registers.set_register_at(13, self.register_bank.r13_und);
                self.registers.set_register_at(14, self.register_bank.r14_und);
                self.spsr = self.register_bank.spsr_und;
            }
        }

        self.cpsr.set_mode(new_mode);
    }

    /// BX-style jump: bit 0 of the target selects the Thumb state.
    pub(crate) fn branch_to(&mut self, address: u32) {
        if address.get_bit(0) {
            self.cpsr.set_state_bit(true);
            self.registers.set_program_counter(address & !1);
        } else {
            self.cpsr.set_state_bit(false);
            self.registers.set_program_counter(address & !3);
        }
    }
}
