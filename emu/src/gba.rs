//! Top-level GBA system: the console object a host embeds.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Gba                                                      │
//! │  └─ Arm7tdmi ── owns ──▶ Bus                             │
//! │                           ├─ InternalMemory (BIOS/RAM/   │
//! │                           │                  ROM/Flash)  │
//! │                           ├─ IoRegisters                 │
//! │                           ├─ Lcd (VRAM/OAM/palette/      │
//! │                           │       framebuffer)           │
//! │                           ├─ Timers / Dma / Apu          │
//! │                           └─ Keypad                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! `run_frame` drives the interleaved loop: one CPU instruction, one
//! hardware tick, one IRQ check, until the LCD signals frame-ready.

use std::path::Path;

use logger::log;
use serde::{Deserialize, Serialize};

use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::hardware::keypad::Button;

#[derive(Default, Serialize, Deserialize)]
pub struct Gba {
    pub cpu: Arm7tdmi,
}

impl Gba {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a cartridge image and cold-boots the console. Returns false
    /// when the file cannot be read; the reason is logged.
    pub fn load_rom<P: AsRef<Path>>(&mut self, path: P) -> bool {
        match std::fs::read(path.as_ref()) {
            Ok(data) => {
                self.cpu.bus.memory.load_rom(data);
                self.reset();
                true
            }
            Err(error) => {
                log(format!(
                    "cannot read ROM {}: {error}",
                    path.as_ref().display()
                ));
                false
            }
        }
    }

    /// Power-on reset. The loaded cartridge and backup data survive.
    pub fn reset(&mut self) {
        self.cpu.bus.reset();
        self.cpu.reset();
    }

    /// Runs the interleaved step loop until the next frame-ready edge.
    pub fn run_frame(&mut self) {
        self.cpu.bus.lcd.clear_frame_ready();

        while !self.cpu.bus.lcd.is_frame_ready() {
            self.cpu.step();
            self.cpu.bus.step(1);
            self.cpu.check_irq();
        }
    }

    /// The 240x160 ARGB8888 framebuffer, top-left origin, row-major.
    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        self.cpu.bus.lcd.framebuffer()
    }

    #[must_use]
    pub fn is_frame_ready(&self) -> bool {
        self.cpu.bus.lcd.is_frame_ready()
    }

    pub fn clear_frame_ready(&mut self) {
        self.cpu.bus.lcd.clear_frame_ready();
    }

    /// Presses or releases one button. Ids 0..=9 map to A, B, Select,
    /// Start, Right, Left, Up, Down, R, L; anything else is dropped.
    pub fn update_key(&mut self, id: usize, pressed: bool) {
        match Button::from_id(id) {
            Some(button) => self.cpu.bus.keypad.set_button(button, pressed),
            None => log(format!("ignoring out-of-range key id {id}")),
        }
    }

    /// Interleaved stereo samples accumulated since the last drain.
    #[must_use]
    pub fn sample_buffer(&self) -> &[i16] {
        self.cpu.bus.apu.sample_buffer()
    }

    pub fn clear_sample_buffer(&mut self) {
        self.cpu.bus.apu.clear_sample_buffer();
    }

    /// Raw backup storage for host persistence (64 or 128 KiB).
    #[must_use]
    pub fn save_data(&self) -> &[u8] {
        self.cpu.bus.memory.flash.data()
    }

    /// Restores a raw save dump written by [`Gba::save_data`].
    pub fn load_save_data(&mut self, data: &[u8]) {
        self.cpu.bus.memory.flash.load_data(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitwise::Bits;

    #[test]
    fn frame_loop_produces_one_frame() {
        let mut gba = Gba::new();
        gba.run_frame();

        assert!(gba.is_frame_ready());
        assert_eq!(gba.framebuffer().len(), 240 * 160);

        // 228 scanlines of 1232 cycles at one instruction per cycle.
        assert_eq!(gba.cpu.cycles(), 228 * 1232);

        gba.clear_frame_ready();
        assert!(!gba.is_frame_ready());
    }

    #[test]
    fn vcount_covers_every_line_once_per_frame() {
        let mut gba = Gba::new();
        gba.run_frame();

        let mut seen = [0_u32; 228];
        let mut last = gba.cpu.bus.io.vcount();
        for _ in 0..228 * 1232 {
            gba.cpu.step();
            gba.cpu.bus.step(1);
            let vcount = gba.cpu.bus.io.vcount();
            if vcount != last {
                seen[usize::from(vcount)] += 1;
                last = vcount;
            }
        }

        assert!(seen.iter().all(|&hits| hits == 1));
    }

    #[test]
    fn audio_accumulates_during_a_frame() {
        let mut gba = Gba::new();
        gba.run_frame();

        // One stereo pair per 512 cycles.
        assert_eq!(gba.sample_buffer().len(), (228 * 1232 / 512) * 2);
        gba.clear_sample_buffer();
        assert!(gba.sample_buffer().is_empty());
    }

    #[test]
    fn keys_reach_the_keyinput_shadow() {
        let mut gba = Gba::new();

        gba.update_key(0, true); // A
        gba.update_key(9, true); // L
        assert_eq!(gba.cpu.bus.keypad.key_input, 0x03FF & !0x201);

        gba.update_key(0, false);
        gba.update_key(42, true); // dropped
        assert_eq!(gba.cpu.bus.keypad.key_input, 0x03FF & !0x200);
    }

    #[test]
    fn save_data_round_trip() {
        let mut gba = Gba::new();
        let dump = vec![0x5A; 0x10000];
        gba.load_save_data(&dump);

        assert_eq!(gba.save_data(), dump.as_slice());
        assert_eq!(gba.cpu.bus.read_byte(0x0E00_1234), 0x5A);
    }

    #[test]
    fn vblank_irq_reaches_the_cpu_between_frames() {
        let mut gba = Gba::new();
        // Enable the VBlank IRQ end to end.
        gba.cpu.bus.write_half_word(0x0400_0004, 1 << 3); // DISPSTAT
        gba.cpu.bus.write_half_word(0x0400_0200, 1); // IE
        gba.cpu.bus.write_half_word(0x0400_0208, 1); // IME

        gba.run_frame();

        // The CPU took the vector and is running the (empty) handler
        // with further IRQs masked.
        assert!(gba.cpu.cpsr.irq_disable());
        assert!(gba.cpu.bus.io.interrupt_flags().get_bit(0));
    }
}
