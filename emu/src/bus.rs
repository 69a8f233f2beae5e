//! The memory bus connecting the CPU to memory and hardware.
//!
//! Every access is keyed on the top byte of the 32-bit address:
//!
//! | Region | Target            | Width quirks                                |
//! |--------|-------------------|---------------------------------------------|
//! | `0x00` | BIOS              | Open bus while the PC is outside it         |
//! | `0x02` | EWRAM             | Mirrored every 256 KiB                      |
//! | `0x03` | IWRAM             | Mirrored every 32 KiB                       |
//! | `0x04` | I/O file          | Halfword registers, byte lanes on 8-bit     |
//! | `0x05` | Palette RAM       | 8-bit writes broadcast to the halfword      |
//! | `0x06` | VRAM              | 96 KiB folded into a 128 KiB slot; 8-bit    |
//! |        |                   | writes broadcast in BG data, ignored in OBJ |
//! | `0x07` | OAM               | 8-bit writes ignored                        |
//! | `0x08+`| Cartridge ROM     | Read-only, wait-state mirrors               |
//! | `0x0E+`| SRAM/Flash        | Byte bus: wide reads broadcast, wide writes |
//! |        |                   | keep the addressed lane                     |
//!
//! Wide accesses are synthesized from byte accesses on the generic path;
//! Palette, VRAM, OAM and SRAM have dedicated wide paths so the 8-bit
//! quirks do not corrupt 16/32-bit traffic.
//!
//! The bus also owns every peripheral and ticks them in `step`, wiring
//! LCD and timer events into IF bits and DMA triggers.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::apu::Apu;
use crate::cpu::hardware::dma::{AddressAdjust, Dma, Timing};
use crate::cpu::hardware::internal_memory::InternalMemory;
use crate::cpu::hardware::io_registers::{self, IoRegisters};
use crate::cpu::hardware::keypad::Keypad;
use crate::cpu::hardware::lcd::Lcd;
use crate::cpu::hardware::timers::Timers;

#[derive(Default, Serialize, Deserialize)]
pub struct Bus {
    pub memory: InternalMemory,
    pub io: IoRegisters,
    pub lcd: Lcd,
    pub timers: Timers,
    pub dma: Dma,
    pub apu: Apu,
    pub keypad: Keypad,
    cycles: u64,
    last_fetch_pc: u32,
}

impl Bus {
    /// Clears everything volatile. ROM and backup data survive.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.io.reset();
        self.lcd.reset();
        self.timers.reset();
        self.dma.reset();
        self.apu.reset();
        self.cycles = 0;
        self.last_fetch_pc = 0;
    }

    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Folds a VRAM address into the 96 KiB backing store: the region
    /// mirrors every 128 KiB and the upper 32 KiB of each mirror maps
    /// back onto the OBJ tile area.
    fn vram_offset(address: u32) -> usize {
        let mut offset = (address & 0x1_FFFF) as usize;
        if offset >= 0x18000 {
            offset -= 0x8000;
        }
        offset
    }

    pub fn read_byte(&self, address: u32) -> u8 {
        match address >> 24 {
            0x00 => {
                if address < 0x4000 {
                    self.memory.read_bios(address, self.last_fetch_pc < 0x4000)
                } else {
                    0
                }
            }
            0x02 => self.memory.ewram[(address & 0x3_FFFF) as usize],
            0x03 => self.memory.iwram[(address & 0x7FFF) as usize],
            0x04 => {
                let offset = address & 0x3FF;
                self.read_io_halfword(offset & !1).get_byte((offset & 1) as u8)
            }
            0x05 => self.lcd.palette_ram[(address & 0x3FF) as usize],
            0x06 => self.lcd.video_ram[Self::vram_offset(address)],
            0x07 => self.lcd.oam[(address & 0x3FF) as usize],
            0x08..=0x0D => self.memory.read_rom(address & 0x01FF_FFFF),
            0x0E | 0x0F => self.memory.flash.read(address),
            _ => {
                tracing::debug!("read from unmapped address {address:#010X}");
                0
            }
        }
    }

    pub fn write_byte(&mut self, address: u32, value: u8) {
        match address >> 24 {
            0x02 => self.memory.ewram[(address & 0x3_FFFF) as usize] = value,
            0x03 => self.memory.iwram[(address & 0x7FFF) as usize] = value,
            0x04 => {
                let offset = address & 0x3FF;
                // IF is write-1-to-clear per byte lane; merging it with
                // the live halfword would acknowledge the other lane too.
                if offset & !1 == io_registers::IF {
                    self.io
                        .acknowledge_interrupt(u16::from(value) << ((offset & 1) * 8));
                    return;
                }
                let mut halfword = self.read_io_halfword(offset & !1);
                halfword.set_byte((offset & 1) as u8, value);
                self.write_io_halfword(offset & !1, halfword);
            }
            0x05 => {
                // A byte write fills both bytes of the addressed halfword.
                let base = (address & 0x3FE) as usize;
                self.lcd.palette_ram[base] = value;
                self.lcd.palette_ram[base + 1] = value;
            }
            0x06 => {
                let offset = Self::vram_offset(address);
                // Broadcast like palette in BG data; the OBJ tile area
                // rejects byte writes. Bitmap modes extend BG data to
                // 0x14000.
                let bound = if self.io.bg_mode() >= 3 { 0x14000 } else { 0x10000 };
                if offset < bound {
                    let base = offset & !1;
                    self.lcd.video_ram[base] = value;
                    self.lcd.video_ram[base + 1] = value;
                }
            }
            0x07 => {
                // 8-bit OAM writes are ignored.
            }
            0x0E | 0x0F => self.memory.flash.write(address, value),
            0x00 | 0x08..=0x0D => {
                tracing::debug!("write to read-only region at {address:#010X}");
            }
            _ => {
                tracing::debug!("write to unmapped address {address:#010X}");
            }
        }
    }

    pub fn read_half_word(&self, address: u32) -> u16 {
        match address >> 24 {
            0x04 => self.read_io_halfword(address & 0x3FE),
            // The backup chip sits on a byte bus: the addressed byte is
            // broadcast across both lanes.
            0x0E | 0x0F => u16::from(self.memory.flash.read(address)) * 0x0101,
            _ => {
                let address = address & !1;
                u16::from(self.read_byte(address)) | (u16::from(self.read_byte(address + 1)) << 8)
            }
        }
    }

    pub fn write_half_word(&mut self, address: u32, value: u16) {
        match address >> 24 {
            0x04 => self.write_io_halfword(address & 0x3FE, value),
            0x05 => {
                let base = (address & 0x3FE) as usize;
                self.lcd.palette_ram[base] = value.get_byte(0);
                self.lcd.palette_ram[base + 1] = value.get_byte(1);
            }
            0x06 => {
                let offset = Self::vram_offset(address & !1);
                self.lcd.video_ram[offset] = value.get_byte(0);
                self.lcd.video_ram[offset + 1] = value.get_byte(1);
            }
            0x07 => {
                let base = (address & 0x3FE) as usize;
                self.lcd.oam[base] = value.get_byte(0);
                self.lcd.oam[base + 1] = value.get_byte(1);
            }
            // Only the lane addressed by the low bit reaches the chip.
            0x0E | 0x0F => {
                self.memory.flash.write(address, value.get_byte((address & 1) as u8));
            }
            _ => {
                let address = address & !1;
                self.write_byte(address, value.get_byte(0));
                self.write_byte(address + 1, value.get_byte(1));
            }
        }
    }

    pub fn read_word(&self, address: u32) -> u32 {
        match address >> 24 {
            0x0E | 0x0F => u32::from(self.memory.flash.read(address)) * 0x0101_0101,
            _ => {
                let address = address & !3;
                u32::from(self.read_half_word(address))
                    | (u32::from(self.read_half_word(address + 2)) << 16)
            }
        }
    }

    pub fn write_word(&mut self, address: u32, value: u32) {
        match address >> 24 {
            0x0E | 0x0F => {
                self.memory.flash.write(address, value.get_byte((address & 3) as u8));
            }
            _ => {
                let address = address & !3;
                self.write_half_word(address, value as u16);
                self.write_half_word(address + 2, (value >> 16) as u16);
            }
        }
    }

    /// Instruction fetch: a plain word read that additionally feeds the
    /// BIOS open-bus latch.
    pub fn fetch_word(&mut self, pc: u32) -> u32 {
        self.last_fetch_pc = pc;
        let opcode = self.read_word(pc);
        if pc < 0x4000 {
            self.memory.set_bios_latch(opcode);
        }
        opcode
    }

    pub fn fetch_half_word(&mut self, pc: u32) -> u16 {
        self.last_fetch_pc = pc;
        let opcode = self.read_half_word(pc);
        if pc < 0x4000 {
            self.memory
                .set_bios_latch(u32::from(opcode) | (u32::from(opcode) << 16));
        }
        opcode
    }

    fn read_io_halfword(&self, offset: u32) -> u16 {
        match offset {
            io_registers::KEYINPUT => self.keypad.key_input,
            0x0B0..=0x0DF => {
                let relative = offset - io_registers::DMA_BASE;
                self.dma.read_register((relative / 12) as usize, relative % 12)
            }
            0x100..=0x10F => {
                let relative = offset - io_registers::TIMER_BASE;
                let timer = (relative / 4) as usize;
                if relative % 4 == 0 {
                    self.timers.read_counter(timer)
                } else {
                    self.timers.read_control(timer)
                }
            }
            _ => self.io.read(offset),
        }
    }

    fn write_io_halfword(&mut self, offset: u32, value: u16) {
        match offset {
            // Read-only registers.
            io_registers::VCOUNT | io_registers::KEYINPUT => {}
            io_registers::IF => self.io.acknowledge_interrupt(value),
            0x0A0 | 0x0A2 => {
                self.apu.fifo_a.push(value.get_byte(0) as i8);
                self.apu.fifo_a.push(value.get_byte(1) as i8);
            }
            0x0A4 | 0x0A6 => {
                self.apu.fifo_b.push(value.get_byte(0) as i8);
                self.apu.fifo_b.push(value.get_byte(1) as i8);
            }
            0x0B0..=0x0DF => {
                let relative = offset - io_registers::DMA_BASE;
                let channel = (relative / 12) as usize;
                let enable_edge = self.dma.write_register(channel, relative % 12, value);
                if enable_edge && self.dma.channels[channel].timing() == Timing::Immediate {
                    self.execute_dma(channel);
                }
            }
            0x100..=0x10F => {
                let relative = offset - io_registers::TIMER_BASE;
                let timer = (relative / 4) as usize;
                if relative % 4 == 0 {
                    self.timers.write_reload(timer, value);
                } else {
                    self.timers.write_control(timer, value);
                }
            }
            _ => self.io.write(offset, value),
        }
    }

    /// Advances the peripherals by `cycles` system ticks: timers first,
    /// then audio, then the LCD, whose edges feed IF and the DMA engine.
    pub fn step(&mut self, cycles: u32) {
        self.cycles += u64::from(cycles);

        let timer_out = self.timers.step(cycles);
        for timer in 0..4_u8 {
            if timer_out.requests_irq(usize::from(timer)) {
                self.io.raise_interrupt(3 + timer);
            }
        }

        self.apu.step(cycles, &self.io);

        let lcd_out = self.lcd.step(cycles, &mut self.io);
        if lcd_out.request_vblank_irq {
            self.io.raise_interrupt(0);
        }
        if lcd_out.request_hblank_irq {
            self.io.raise_interrupt(1);
        }
        if lcd_out.request_vcount_irq {
            self.io.raise_interrupt(2);
        }
        if lcd_out.entered_vblank {
            self.trigger_dma(Timing::VBlank);
        }
        if lcd_out.entered_hblank {
            self.trigger_dma(Timing::HBlank);
        }
    }

    /// Replaces the KEYINPUT shadow with the host's button state
    /// (active low, bits 0-9).
    pub const fn set_key_input(&mut self, state: u16) {
        self.keypad.key_input = state;
    }

    /// True when an enabled, pending interrupt is waiting for the CPU.
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        self.io.interrupt_master_enable()
            && (self.io.interrupt_enable() & self.io.interrupt_flags()) != 0
    }

    fn trigger_dma(&mut self, timing: Timing) {
        for channel in 0..4 {
            let ch = &self.dma.channels[channel];
            if ch.enabled() && ch.timing() == timing {
                self.execute_dma(channel);
            }
        }
    }

    fn execute_dma(&mut self, channel: usize) {
        let ch = &self.dma.channels[channel];
        let count = ch.transfer_count(channel);
        let word = ch.word_transfer();
        let repeat = ch.repeat();
        let timing = ch.timing();
        let irq = ch.irq_enabled();
        let destination_adjust = ch.destination_adjust();

        let unit: u32 = if word { 4 } else { 2 };
        let source_step = address_step(ch.source_adjust(), unit);
        let destination_step = address_step(destination_adjust, unit);

        let mut source = ch.internal_source;
        let mut destination = ch.internal_destination;

        for _ in 0..count {
            if word {
                let value = self.read_word(source);
                self.write_word(destination, value);
            } else {
                let value = self.read_half_word(source);
                self.write_half_word(destination, value);
            }
            source = source.wrapping_add_signed(source_step);
            destination = destination.wrapping_add_signed(destination_step);
        }

        let ch = &mut self.dma.channels[channel];
        ch.internal_source = source;
        ch.internal_destination = destination;

        if repeat && timing != Timing::Immediate {
            if destination_adjust == AddressAdjust::IncrementReload {
                ch.internal_destination = ch.destination;
            }
        } else {
            ch.clear_enable();
        }

        if irq {
            self.io.raise_interrupt(8 + channel as u8);
        }
    }
}

const fn address_step(adjust: AddressAdjust, unit: u32) -> i32 {
    match adjust {
        AddressAdjust::Increment | AddressAdjust::IncrementReload => unit as i32,
        AddressAdjust::Decrement => -(unit as i32),
        AddressAdjust::Fixed => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ewram_and_iwram_mirror() {
        let mut bus = Bus::default();

        bus.write_byte(0x0204_0001, 0x42);
        assert_eq!(bus.read_byte(0x0200_0001), 0x42);
        assert_eq!(bus.read_byte(0x02FC_0001), 0x42);

        bus.write_byte(0x0300_8002, 0x17);
        assert_eq!(bus.read_byte(0x0300_0002), 0x17);
        assert_eq!(bus.read_byte(0x03FF_8002), 0x17);
    }

    #[test]
    fn io_byte_lanes() {
        let mut bus = Bus::default();

        bus.write_byte(0x0400_0000, 0x03);
        bus.write_byte(0x0400_0001, 0x04);
        assert_eq!(bus.read_half_word(0x0400_0000), 0x0403);
        assert_eq!(bus.read_byte(0x0400_0001), 0x04);
    }

    #[test]
    fn palette_byte_write_broadcasts() {
        let mut bus = Bus::default();

        bus.write_byte(0x0500_0002, 0xAB);
        assert_eq!(bus.read_half_word(0x0500_0002), 0xABAB);
    }

    #[test]
    fn vram_mirror_folds_upper_window() {
        let mut bus = Bus::default();

        bus.write_half_word(0x0601_0000, 0x1234);
        assert_eq!(bus.read_half_word(0x0601_0000), 0x1234);
        // 0x18000.. folds down by 0x8000.
        assert_eq!(bus.read_half_word(0x0601_8000), bus.read_half_word(0x0601_0000));
        // The region mirrors every 128 KiB.
        assert_eq!(bus.read_half_word(0x0603_0000), 0x1234);
    }

    #[test]
    fn vram_byte_writes_respect_mode_bounds() {
        let mut bus = Bus::default();

        // Tile mode: the OBJ area at 0x10000 rejects byte writes.
        bus.write_byte(0x0601_0000, 0xFF);
        assert_eq!(bus.read_byte(0x0601_0000), 0);

        // BG data broadcasts like palette.
        bus.write_byte(0x0600_0005, 0xCD);
        assert_eq!(bus.read_half_word(0x0600_0004), 0xCDCD);

        // Bitmap modes extend the writable window to 0x14000.
        bus.write_half_word(0x0400_0000, 3);
        bus.write_byte(0x0601_0000, 0xFF);
        assert_eq!(bus.read_half_word(0x0601_0000), 0xFFFF);

        bus.write_byte(0x0601_4000, 0xFF);
        assert_eq!(bus.read_byte(0x0601_4000), 0);
    }

    #[test]
    fn oam_ignores_byte_writes() {
        let mut bus = Bus::default();

        bus.write_byte(0x0700_0000, 0x99);
        assert_eq!(bus.read_byte(0x0700_0000), 0);

        bus.write_half_word(0x0700_0000, 0x1234);
        assert_eq!(bus.read_half_word(0x0700_0000), 0x1234);
    }

    #[test]
    fn sram_broadcasts_reads_and_selects_write_lane() {
        let mut bus = Bus::default();

        bus.write_byte(0x0E00_0000, 0x5A);
        assert_eq!(bus.read_word(0x0E00_0000), 0x5A5A_5A5A);
        assert_eq!(bus.read_half_word(0x0E00_0001), 0x0101 * u16::from(bus.read_byte(0x0E00_0001)));

        // A wide write stores only the addressed lane.
        bus.write_word(0x0E00_0102, 0xAABB_CCDD);
        assert_eq!(bus.read_byte(0x0E00_0102), 0xBB);
    }

    #[test]
    fn rom_reads_past_end_are_zero() {
        let mut bus = Bus::default();
        bus.memory.load_rom(vec![0x11, 0x22]);

        assert_eq!(bus.read_byte(0x0800_0000), 0x11);
        assert_eq!(bus.read_byte(0x0A00_0001), 0x22);
        assert_eq!(bus.read_word(0x0800_0004), 0);

        bus.write_byte(0x0800_0000, 0xFF);
        assert_eq!(bus.read_byte(0x0800_0000), 0x11);
    }

    #[test]
    fn bios_reads_are_open_bus_outside_fetches() {
        let mut bus = Bus::default();

        // A fetch from ROM leaves the latch as the source of BIOS reads.
        bus.memory.load_rom(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        bus.fetch_word(0x0800_0000);
        assert_eq!(bus.read_byte(0x0000_0000), 0);

        bus.memory.set_bios_latch(0x1234_5678);
        assert_eq!(bus.read_word(0x0000_0000), 0x1234_5678);
    }

    #[test]
    fn keyinput_is_a_read_only_shadow() {
        let mut bus = Bus::default();

        assert_eq!(bus.read_half_word(0x0400_0130), 0x03FF);

        bus.write_half_word(0x0400_0130, 0);
        assert_eq!(bus.read_half_word(0x0400_0130), 0x03FF);

        bus.keypad.key_input = 0x03FE;
        assert_eq!(bus.read_half_word(0x0400_0130), 0x03FE);
    }

    #[test]
    fn interrupt_flags_acknowledge_through_the_bus() {
        let mut bus = Bus::default();
        bus.io.raise_interrupt(0);
        bus.io.raise_interrupt(3);

        bus.write_half_word(0x0400_0202, 0b1);
        assert_eq!(bus.read_half_word(0x0400_0202), 0b1000);

        // Byte-lane acknowledge must not touch the other lane.
        bus.io.raise_interrupt(8);
        bus.write_byte(0x0400_0202, 0b1000);
        assert_eq!(bus.read_half_word(0x0400_0202), 1 << 8);
    }

    #[test]
    fn timer_registers_route_to_the_timers() {
        let mut bus = Bus::default();

        bus.write_half_word(0x0400_0100, 0xFFF0);
        bus.write_half_word(0x0400_0102, (1 << 7) | (1 << 6));

        assert_eq!(bus.read_half_word(0x0400_0100), 0xFFF0);

        bus.step(0x10);
        assert_eq!(bus.read_half_word(0x0400_0100), 0xFFF0);
        assert!(bus.io.interrupt_flags().get_bit(3));
    }

    #[test]
    fn immediate_dma_copies_and_clears_enable() {
        let mut bus = Bus::default();

        for i in 0..16_u32 {
            bus.write_byte(0x0200_0000 + i, i as u8 + 1);
        }

        // Channel 3: EWRAM -> VRAM, four 32-bit words, immediate.
        bus.write_half_word(0x0400_00D4, 0x0000);
        bus.write_half_word(0x0400_00D6, 0x0200);
        bus.write_half_word(0x0400_00D8, 0x0000);
        bus.write_half_word(0x0400_00DA, 0x0600);
        bus.write_half_word(0x0400_00DC, 4);
        bus.write_half_word(0x0400_00DE, (1 << 15) | (1 << 10));

        for i in 0..16_u32 {
            assert_eq!(bus.read_byte(0x0600_0000 + i), i as u8 + 1);
        }
        assert!(!bus.dma.channels[3].enabled());
    }

    #[test]
    fn dma_completion_raises_if_bit() {
        let mut bus = Bus::default();

        bus.write_half_word(0x0400_00B8, 1);
        bus.write_half_word(0x0400_00BA, (1 << 15) | (1 << 14));

        assert!(bus.io.interrupt_flags().get_bit(8));
    }

    #[test]
    fn vblank_dma_triggers_on_edge() {
        let mut bus = Bus::default();
        bus.write_byte(0x0200_0000, 0x77);
        bus.write_byte(0x0200_0001, 0x77);

        // Channel 0 armed for VBlank.
        bus.write_half_word(0x0400_00B2, 0x0200);
        bus.write_half_word(0x0400_00B6, 0x0600);
        bus.write_half_word(0x0400_00B8, 1);
        bus.write_half_word(0x0400_00BA, (1 << 15) | (1 << 12));

        assert_eq!(bus.read_byte(0x0600_0000), 0);

        // Run up to scanline 160.
        for _ in 0..160 * 1232 {
            bus.step(1);
        }
        assert_eq!(bus.read_half_word(0x0600_0000), 0x7777);
    }

    #[test]
    fn unmapped_accesses_are_absorbed() {
        let mut bus = Bus::default();

        assert_eq!(bus.read_word(0x1234_5678), 0);
        bus.write_word(0x1234_5678, 0xFFFF_FFFF);
        assert_eq!(bus.read_word(0x1234_5678), 0);

        assert_eq!(bus.read_byte(0x0000_4000), 0);
    }
}
