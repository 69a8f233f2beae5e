//! The memory-mapped I/O register file.
//!
//! Region `0x04` is a contiguous array of 512 halfwords (offsets
//! `0x000..=0x3FE`). Most registers are plain storage read back by the
//! hardware that owns them; the bus intercepts the handful with dedicated
//! semantics (timer counters, DMA control, FIFO pushes, KEYINPUT, IF).

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::bitwise::Bits;

/// LCD Control.
pub const DISPCNT: u32 = 0x000;
/// General LCD Status (VBlank/HBlank/VCount flags and IRQ enables).
pub const DISPSTAT: u32 = 0x004;
/// Vertical Counter, read-only.
pub const VCOUNT: u32 = 0x006;
/// BG0 Control; BG1-3 follow at 2-byte steps.
pub const BG0CNT: u32 = 0x008;
/// BG0 X-Offset; the other scroll registers follow pairwise.
pub const BG0HOFS: u32 = 0x010;
/// Channel 1 Duty/Length/Envelope.
pub const SOUND1CNT_H: u32 = 0x062;
/// Channel 1 Frequency/Control.
pub const SOUND1CNT_X: u32 = 0x064;
/// Channel 2 Duty/Length/Envelope.
pub const SOUND2CNT_L: u32 = 0x068;
/// Channel 2 Frequency/Control.
pub const SOUND2CNT_H: u32 = 0x06C;
/// Channel 3 Stop/Wave RAM select.
pub const SOUND3CNT_L: u32 = 0x070;
/// Channel 3 Frequency/Control.
pub const SOUND3CNT_X: u32 = 0x074;
/// Channel 4 Length/Envelope.
pub const SOUND4CNT_L: u32 = 0x078;
/// Channel 4 Frequency/Control.
pub const SOUND4CNT_H: u32 = 0x07C;
/// PSG channel enables and master volumes.
pub const SOUNDCNT_L: u32 = 0x080;
/// Direct-sound mixing and FIFO routing.
pub const SOUNDCNT_H: u32 = 0x082;
/// Master sound enable.
pub const SOUNDCNT_X: u32 = 0x084;
/// Direct-sound FIFO A data port.
pub const FIFO_A: u32 = 0x0A0;
/// Direct-sound FIFO B data port.
pub const FIFO_B: u32 = 0x0A4;
/// First DMA register (DMA0SAD); the four channels occupy 12 bytes each.
pub const DMA_BASE: u32 = 0x0B0;
/// First timer register (TM0CNT_L); the four timers occupy 4 bytes each.
pub const TIMER_BASE: u32 = 0x100;
/// Key Status, read-only shadow of the host button state.
pub const KEYINPUT: u32 = 0x130;
/// Interrupt Enable.
pub const IE: u32 = 0x200;
/// Interrupt Request Flags, write-1-to-clear.
pub const IF: u32 = 0x202;
/// Interrupt Master Enable.
pub const IME: u32 = 0x208;

#[serde_as]
#[derive(Serialize, Deserialize)]
pub struct IoRegisters {
    #[serde_as(as = "[_; 512]")]
    regs: [u16; 512],
}

impl Default for IoRegisters {
    fn default() -> Self {
        Self { regs: [0; 512] }
    }
}

impl IoRegisters {
    /// Raw halfword read; `offset` is the byte offset inside the region.
    #[must_use]
    pub const fn read(&self, offset: u32) -> u16 {
        self.regs[((offset & 0x3FF) >> 1) as usize]
    }

    /// Raw halfword write. Registers with side effects are intercepted by
    /// the bus before this is reached.
    pub const fn write(&mut self, offset: u32, value: u16) {
        self.regs[((offset & 0x3FF) >> 1) as usize] = value;
    }

    pub fn reset(&mut self) {
        self.regs = [0; 512];
    }

    #[must_use]
    pub const fn dispcnt(&self) -> u16 {
        self.read(DISPCNT)
    }

    /// Video mode, bits 0-2 of DISPCNT.
    #[must_use]
    pub fn bg_mode(&self) -> u16 {
        self.dispcnt().get_bits(0..=2)
    }

    #[must_use]
    pub const fn dispstat(&self) -> u16 {
        self.read(DISPSTAT)
    }

    pub const fn set_dispstat(&mut self, value: u16) {
        self.write(DISPSTAT, value);
    }

    #[must_use]
    pub const fn vcount(&self) -> u16 {
        self.read(VCOUNT)
    }

    pub const fn set_vcount(&mut self, value: u16) {
        self.write(VCOUNT, value);
    }

    #[must_use]
    pub fn bg_control(&self, bg: u32) -> u16 {
        debug_assert!(bg < 4);
        self.read(BG0CNT + bg * 2)
    }

    #[must_use]
    pub fn bg_h_offset(&self, bg: u32) -> u16 {
        debug_assert!(bg < 4);
        self.read(BG0HOFS + bg * 4)
    }

    #[must_use]
    pub fn bg_v_offset(&self, bg: u32) -> u16 {
        debug_assert!(bg < 4);
        self.read(BG0HOFS + 2 + bg * 4)
    }

    #[must_use]
    pub const fn interrupt_enable(&self) -> u16 {
        self.read(IE)
    }

    #[must_use]
    pub const fn interrupt_flags(&self) -> u16 {
        self.read(IF)
    }

    /// Latches one interrupt source into IF.
    pub fn raise_interrupt(&mut self, bit: u8) {
        let mut flags = self.read(IF);
        flags.set_bit(bit, true);
        self.write(IF, flags);
    }

    /// IF is write-1-to-clear: every set bit in `mask` acknowledges the
    /// corresponding pending interrupt.
    pub const fn acknowledge_interrupt(&mut self, mask: u16) {
        let flags = self.read(IF);
        self.write(IF, flags & !mask);
    }

    #[must_use]
    pub fn interrupt_master_enable(&self) -> bool {
        self.read(IME).get_bit(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halfword_indexing() {
        let mut io = IoRegisters::default();
        io.write(DISPCNT, 0x0403);
        assert_eq!(io.dispcnt(), 0x0403);
        assert_eq!(io.bg_mode(), 3);
    }

    #[test]
    fn bg_register_layout() {
        let mut io = IoRegisters::default();
        io.write(BG0CNT + 2, 0x1234);
        assert_eq!(io.bg_control(1), 0x1234);

        io.write(0x018, 0x00AA); // BG2HOFS
        io.write(0x01A, 0x00BB); // BG2VOFS
        assert_eq!(io.bg_h_offset(2), 0x00AA);
        assert_eq!(io.bg_v_offset(2), 0x00BB);
    }

    #[test]
    fn interrupt_flags_are_write_one_to_clear() {
        let mut io = IoRegisters::default();
        io.raise_interrupt(0);
        io.raise_interrupt(4);
        assert_eq!(io.interrupt_flags(), 0b1_0001);

        io.acknowledge_interrupt(0b1);
        assert_eq!(io.interrupt_flags(), 0b1_0000);

        io.acknowledge_interrupt(0xFFFF);
        assert_eq!(io.interrupt_flags(), 0);
    }
}
