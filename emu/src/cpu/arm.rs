//! The 32-bit ARM instruction set.
//!
//! Decode is a priority-ordered match on fixed bit patterns. The order is
//! a correctness contract: Branch-Exchange, MRS and MSR are special forms
//! of the data-processing layout and must be recognized first, and the
//! multiply pattern shadows the halfword-transfer one.

use crate::bitwise::Bits;
use crate::cpu::alu::{self, ArithmeticOpResult, ShiftKind};
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::condition::Condition;
use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::Psr;
use crate::cpu::registers::{REG_LR, REG_PC};

impl Arm7tdmi {
    pub(crate) fn execute_arm(&mut self, opcode: u32) {
        let condition = Condition::from(opcode.get_bits(28..=31) as u8);
        if !self.cpsr.can_execute(condition) {
            return;
        }

        let bits74 = opcode.get_bits(4..=7);

        if opcode & 0x0FFF_FFF0 == 0x012F_FF10 {
            self.branch_and_exchange(opcode);
        } else if opcode & 0x0FBF_0FFF == 0x010F_0000 {
            self.mrs(opcode);
        } else if opcode & 0x0FB0_FFF0 == 0x0120_F000 {
            self.msr_register(opcode);
        } else if opcode & 0x0FB0_F000 == 0x0320_F000 {
            self.msr_immediate(opcode);
        } else if opcode & 0x0E00_0000 == 0x0A00_0000 {
            self.branch(opcode);
        } else if opcode & 0x0FC0_00F0 == 0x0000_0090 {
            self.multiply(opcode);
        } else if opcode & 0x0C00_0000 == 0x0400_0000 {
            self.single_data_transfer(opcode);
        } else if opcode & 0x0E00_0090 == 0x0000_0090 && matches!(bits74, 0xB | 0xD | 0xF) {
            self.halfword_data_transfer(opcode);
        } else if opcode & 0x0E00_0000 == 0x0800_0000 {
            self.block_data_transfer(opcode);
        } else if opcode & 0x0F00_0000 == 0x0F00_0000 {
            self.handle_swi((opcode.get_bits(16..=23)) as u8);
        } else if opcode & 0x0C00_0000 == 0 {
            self.data_processing(opcode);
        } else {
            tracing::debug!("unknown ARM opcode {opcode:#010X}");
        }
    }

    /// Resolves operand 2 of a data-processing instruction through the
    /// barrel shifter, updating the shifter carry in place.
    fn shifter_operand(&self, opcode: u32, shifter_carry: &mut bool) -> u32 {
        if opcode.get_bit(25) {
            // 8-bit immediate rotated right by twice the 4-bit amount.
            let rotate = opcode.get_bits(8..=11) * 2;
            let value = alu::rotate_right(opcode.get_bits(0..=7), rotate);
            if rotate != 0 {
                *shifter_carry = value.get_bit(31);
            }
            return value;
        }

        let rm = opcode.get_bits(0..=3);
        let mut rm_value = self.registers.register_at(rm);
        if rm == REG_PC {
            rm_value = rm_value.wrapping_add(4);
        }

        let kind = ShiftKind::from(opcode.get_bits(5..=6));
        let out = if opcode.get_bit(4) {
            // Shift amount from the low byte of a register, taken
            // literally: zero means no shift.
            let rs = opcode.get_bits(8..=11);
            let amount = self.registers.register_at(rs) & 0xFF;
            alu::shift(kind, amount, rm_value, *shifter_carry)
        } else {
            let amount = opcode.get_bits(7..=11);
            match (kind, amount) {
                // Immediate 0 encodes the by-32 forms and RRX.
                (ShiftKind::Lsr | ShiftKind::Asr, 0) => {
                    alu::shift(kind, 32, rm_value, *shifter_carry)
                }
                (ShiftKind::Ror, 0) => alu::rrx(rm_value, *shifter_carry),
                _ => alu::shift(kind, amount, rm_value, *shifter_carry),
            }
        };

        *shifter_carry = out.carry;
        out.result
    }

    fn data_processing(&mut self, opcode: u32) {
        let alu_op = opcode.get_bits(21..=24);
        let set_conditions = opcode.get_bit(20);
        let rn = opcode.get_bits(16..=19);
        let rd = opcode.get_bits(12..=15);

        let mut op1 = self.registers.register_at(rn);
        if rn == REG_PC {
            op1 = op1.wrapping_add(4);
        }

        let mut shifter_carry = self.cpsr.carry_flag();
        let op2 = self.shifter_operand(opcode, &mut shifter_carry);
        let carry_in = self.cpsr.carry_flag();

        let mut arithmetic: Option<ArithmeticOpResult> = None;
        let arith = |r: ArithmeticOpResult, out: &mut Option<ArithmeticOpResult>| {
            *out = Some(r);
            r.result
        };

        let (result, writes_result) = match alu_op {
            0x0 => (op1 & op2, true),
            0x1 => (op1 ^ op2, true),
            0x2 => (arith(alu::sub(op1, op2), &mut arithmetic), true),
            0x3 => (arith(alu::sub(op2, op1), &mut arithmetic), true),
            0x4 => (arith(alu::add(op1, op2), &mut arithmetic), true),
            0x5 => (arith(alu::adc(op1, op2, carry_in), &mut arithmetic), true),
            0x6 => (arith(alu::sbc(op1, op2, carry_in), &mut arithmetic), true),
            0x7 => (arith(alu::sbc(op2, op1, carry_in), &mut arithmetic), true),
            0x8 => (op1 & op2, false),
            0x9 => (op1 ^ op2, false),
            0xA => (arith(alu::sub(op1, op2), &mut arithmetic), false),
            0xB => (arith(alu::add(op1, op2), &mut arithmetic), false),
            0xC => (op1 | op2, true),
            0xD => (op2, true),
            0xE => (op1 & !op2, true),
            0xF => (!op2, true),
            _ => unreachable!(),
        };

        if writes_result {
            self.registers.set_register_at(rd, result);

            if rd == REG_PC && set_conditions {
                // Exception return: SPSR of the current mode replaces the
                // CPSR, possibly switching mode.
                if self.cpsr.mode().is_some_and(Mode::has_spsr) {
                    let spsr = self.spsr;
                    self.write_cpsr(spsr.into());
                }
                return;
            }
        }

        if set_conditions && rd != REG_PC {
            match arithmetic {
                Some(flags) => self.cpsr.set_flags(&flags),
                None => {
                    self.cpsr.set_nz(result);
                    self.cpsr.set_carry_flag(shifter_carry);
                }
            }
        }
    }

    fn branch(&mut self, opcode: u32) {
        let link = opcode.get_bit(24);
        // 24-bit signed offset scaled by 4, relative to PC+8.
        let offset = ((opcode.get_bits(0..=23) << 8) as i32) >> 6;

        let pc = self.registers.program_counter();
        if link {
            self.registers.set_register_at(REG_LR, pc);
        }

        self.registers
            .set_program_counter(pc.wrapping_add(offset as u32).wrapping_add(4));
    }

    fn branch_and_exchange(&mut self, opcode: u32) {
        let rn = opcode.get_bits(0..=3);
        let address = self.registers.register_at(rn);
        self.branch_to(address);
    }

    fn multiply(&mut self, opcode: u32) {
        let accumulate = opcode.get_bit(21);
        let set_conditions = opcode.get_bit(20);
        let rd = opcode.get_bits(16..=19);
        let rn = opcode.get_bits(12..=15);
        let rs = opcode.get_bits(8..=11);
        let rm = opcode.get_bits(0..=3);

        let mut result = self
            .registers
            .register_at(rm)
            .wrapping_mul(self.registers.register_at(rs));
        if accumulate {
            result = result.wrapping_add(self.registers.register_at(rn));
        }

        self.registers.set_register_at(rd, result);

        if set_conditions {
            self.cpsr.set_nz(result);
        }
    }

    fn mrs(&mut self, opcode: u32) {
        let rd = opcode.get_bits(12..=15);
        let psr = if opcode.get_bit(22) && self.cpsr.mode().is_some_and(Mode::has_spsr) {
            self.spsr
        } else {
            self.cpsr
        };

        self.registers.set_register_at(rd, psr.into());
    }

    fn msr_register(&mut self, opcode: u32) {
        let value = self.registers.register_at(opcode.get_bits(0..=3));
        self.apply_msr(opcode, value);
    }

    fn msr_immediate(&mut self, opcode: u32) {
        let rotate = opcode.get_bits(8..=11) * 2;
        let value = alu::rotate_right(opcode.get_bits(0..=7), rotate);
        self.apply_msr(opcode, value);
    }

    fn apply_msr(&mut self, opcode: u32, value: u32) {
        let mut mask = 0_u32;
        if opcode.get_bit(16) {
            mask |= 0x0000_00FF;
        }
        if opcode.get_bit(17) {
            mask |= 0x0000_FF00;
        }
        if opcode.get_bit(18) {
            mask |= 0x00FF_0000;
        }
        if opcode.get_bit(19) {
            mask |= 0xFF00_0000;
        }

        if opcode.get_bit(22) {
            if self.cpsr.mode().is_some_and(Mode::has_spsr) {
                self.spsr = Psr::from((u32::from(self.spsr) & !mask) | (value & mask));
            }
        } else {
            let new_cpsr = (u32::from(self.cpsr) & !mask) | (value & mask);
            self.write_cpsr(new_cpsr);
        }
    }

    fn single_data_transfer(&mut self, opcode: u32) {
        let pre_index = opcode.get_bit(24);
        let up = opcode.get_bit(23);
        let byte = opcode.get_bit(22);
        let write_back = opcode.get_bit(21);
        let load = opcode.get_bit(20);
        let rn = opcode.get_bits(16..=19);
        let rd = opcode.get_bits(12..=15);

        let offset = if opcode.get_bit(25) {
            let rm = opcode.get_bits(0..=3);
            let kind = ShiftKind::from(opcode.get_bits(5..=6));
            let amount = opcode.get_bits(7..=11);
            alu::shift(kind, amount, self.registers.register_at(rm), false).result
        } else {
            opcode.get_bits(0..=11)
        };

        let base = self.registers.register_at(rn);
        let mut address = base;
        if pre_index {
            address = apply_offset(base, offset, up);
        }

        if load {
            let value = if byte {
                u32::from(self.bus.read_byte(address))
            } else {
                self.bus.read_word(address)
            };
            self.registers.set_register_at(rd, value);
        } else {
            let value = self.registers.register_at(rd);
            if byte {
                self.bus.write_byte(address, value as u8);
            } else {
                self.bus.write_word(address, value);
            }
        }

        if !pre_index {
            // Post-indexing always writes back.
            self.registers
                .set_register_at(rn, apply_offset(base, offset, up));
        } else if write_back {
            self.registers.set_register_at(rn, address);
        }
    }

    fn halfword_data_transfer(&mut self, opcode: u32) {
        let pre_index = opcode.get_bit(24);
        let up = opcode.get_bit(23);
        let immediate = opcode.get_bit(22);
        let write_back = opcode.get_bit(21);
        let load = opcode.get_bit(20);
        let rn = opcode.get_bits(16..=19);
        let rd = opcode.get_bits(12..=15);
        let sh = opcode.get_bits(5..=6);

        let offset = if immediate {
            (opcode.get_bits(8..=11) << 4) | opcode.get_bits(0..=3)
        } else {
            self.registers.register_at(opcode.get_bits(0..=3))
        };

        let base = self.registers.register_at(rn);
        let mut address = base;
        if pre_index {
            address = apply_offset(base, offset, up);
        }

        if load {
            let value = match sh {
                // Unsigned halfword, signed byte, signed halfword.
                1 => u32::from(self.bus.read_half_word(address)),
                2 => self.bus.read_byte(address) as i8 as i32 as u32,
                3 => self.bus.read_half_word(address) as i16 as i32 as u32,
                _ => return,
            };
            self.registers.set_register_at(rd, value);
        } else if sh == 1 {
            let value = self.registers.register_at(rd);
            self.bus.write_half_word(address, value as u16);
        }

        if !pre_index {
            self.registers
                .set_register_at(rn, apply_offset(base, offset, up));
        } else if write_back {
            self.registers.set_register_at(rn, address);
        }
    }

    /// LDM/STM. Registers transfer in ascending address order regardless
    /// of the list order; the lowest register always lands at the lowest
    /// address.
    fn block_data_transfer(&mut self, opcode: u32) {
        let pre_index = opcode.get_bit(24);
        let up = opcode.get_bit(23);
        let write_back = opcode.get_bit(21);
        let load = opcode.get_bit(20);
        let rn = opcode.get_bits(16..=19);
        let register_list = opcode.get_bits(0..=15);

        let base = self.registers.register_at(rn);
        let count = register_list.count_ones();

        let mut address = if up {
            if pre_index {
                base.wrapping_add(4)
            } else {
                base
            }
        } else if pre_index {
            base.wrapping_sub(count * 4)
        } else {
            base.wrapping_sub(count * 4).wrapping_add(4)
        };

        for reg in 0..16 {
            if !register_list.get_bit(reg) {
                continue;
            }

            if load {
                let value = self.bus.read_word(address);
                self.registers.set_register_at(u32::from(reg), value);
            } else {
                let value = self.registers.register_at(u32::from(reg));
                self.bus.write_word(address, value);
            }
            address = address.wrapping_add(4);
        }

        if write_back {
            let new_base = if up {
                base.wrapping_add(count * 4)
            } else {
                base.wrapping_sub(count * 4)
            };
            self.registers.set_register_at(rn, new_base);
        }
    }
}

const fn apply_offset(base: u32, offset: u32, up: bool) -> u32 {
    if up {
        base.wrapping_add(offset)
    } else {
        base.wrapping_sub(offset)
    }
}
