//! Internal memory storage: BIOS, work RAM, ROM, and the backup chip.
//!
//! # Memory regions held here
//!
//! | Region     | Address range           | Size    | Notes                      |
//! |------------|-------------------------|---------|----------------------------|
//! | BIOS       | `0x0000_0000-0000_3FFF` | 16 KiB  | Open-bus outside fetches   |
//! | EWRAM      | `0x0200_0000-...`       | 256 KiB | Mirrored within region     |
//! | IWRAM      | `0x0300_0000-...`       | 32 KiB  | Mirrored within region     |
//! | ROM        | `0x0800_0000-0DFF_FFFF` | ≤32 MiB | Reads past the end give 0  |
//! | SRAM/Flash | `0x0E00_0000-...`       | 64/128K | Backup chip, byte bus      |
//!
//! The bus masks addresses into these arrays; this module only knows about
//! region-local offsets.
//!
//! # BIOS open bus
//!
//! The BIOS is readable only while the CPU is executing inside it. Any
//! other read returns the opcode most recently fetched from the BIOS,
//! lane-selected by the low address bits.
//!
//! # Flash command machine
//!
//! The backup chip decodes a two-write unlock sequence (`0xAA @ 0x5555`,
//! `0x55 @ 0x2AAA`) followed by a command byte at `0x5555`: enter/leave ID
//! mode, erase prefix, program byte, or bank select (128 KiB parts only).
//! Programming can only clear bits; erasing restores `0xFF`.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

/// Backup chip capacity. The 128 KiB variant is split in two banks
/// selected through the `0xB0` command.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashSize {
    #[default]
    Flash64K,
    Flash128K,
}

/// Command decoding state of the backup chip.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashState {
    #[default]
    Ready,
    /// Received `0xAA` at `0x5555`.
    Command1,
    /// Received `0x55` at `0x2AAA`, waiting for the command byte.
    Command2,
    /// ID mode active, waiting for the `0xF0` exit command.
    ChipId,
    /// Received the `0x80` erase prefix, expecting a second unlock.
    Erase1,
    Erase2,
    /// Unlocked erase, waiting for chip (`0x10`) or sector (`0x30`).
    Erase3,
    /// Next write programs one byte.
    Program,
    /// Next write to `0x0000` selects the bank.
    BankSelect,
}

/// The Flash/SRAM backup chip.
#[derive(Serialize, Deserialize)]
pub struct Flash {
    memory: Vec<u8>,
    size: FlashSize,
    state: FlashState,
    bank: u8,
    chip_id_mode: bool,
}

const SECTOR_SIZE: usize = 0x1000;
const BANK_SIZE: usize = 0x10000;

const MANUFACTURER_ID: u8 = 0x32;
const DEVICE_ID_64K: u8 = 0x1B;
const DEVICE_ID_128K: u8 = 0x09;

impl Default for Flash {
    fn default() -> Self {
        Self::new(FlashSize::Flash64K)
    }
}

impl Flash {
    #[must_use]
    pub fn new(size: FlashSize) -> Self {
        Self {
            // Erased-flash convention.
            memory: vec![0xFF; 2 * BANK_SIZE],
            size,
            state: FlashState::default(),
            bank: 0,
            chip_id_mode: false,
        }
    }

    const fn capacity(&self) -> usize {
        match self.size {
            FlashSize::Flash64K => BANK_SIZE,
            FlashSize::Flash128K => 2 * BANK_SIZE,
        }
    }

    fn banked_offset(&self, address: u32) -> usize {
        let offset = (address & 0xFFFF) as usize;
        match self.size {
            FlashSize::Flash64K => offset,
            FlashSize::Flash128K => usize::from(self.bank) * BANK_SIZE + offset,
        }
    }

    #[must_use]
    pub fn read(&self, address: u32) -> u8 {
        if self.chip_id_mode {
            match address & 0xFFFF {
                0 => return MANUFACTURER_ID,
                1 => {
                    return match self.size {
                        FlashSize::Flash64K => DEVICE_ID_64K,
                        FlashSize::Flash128K => DEVICE_ID_128K,
                    }
                }
                _ => {}
            }
        }

        self.memory[self.banked_offset(address)]
    }

    pub fn write(&mut self, address: u32, value: u8) {
        let offset = address & 0xFFFF;

        match self.state {
            FlashState::Ready => {
                if offset == 0x5555 && value == 0xAA {
                    self.state = FlashState::Command1;
                }
            }
            FlashState::Command1 => {
                self.state = if offset == 0x2AAA && value == 0x55 {
                    FlashState::Command2
                } else {
                    FlashState::Ready
                };
            }
            FlashState::Command2 => {
                if offset == 0x5555 {
                    self.handle_command(value);
                } else {
                    self.state = FlashState::Ready;
                }
            }
            FlashState::ChipId => {
                if value == 0xF0 {
                    self.chip_id_mode = false;
                    self.state = FlashState::Ready;
                }
            }
            FlashState::Erase1 => {
                self.state = if offset == 0x5555 && value == 0xAA {
                    FlashState::Erase2
                } else {
                    FlashState::Ready
                };
            }
            FlashState::Erase2 => {
                self.state = if offset == 0x2AAA && value == 0x55 {
                    FlashState::Erase3
                } else {
                    FlashState::Ready
                };
            }
            FlashState::Erase3 => {
                if value == 0x10 && offset == 0x5555 {
                    self.erase_chip();
                } else if value == 0x30 {
                    self.erase_sector(self.banked_offset(address) / SECTOR_SIZE);
                }
                self.state = FlashState::Ready;
            }
            FlashState::Program => {
                let target = self.banked_offset(address);
                // Programming only clears bits.
                self.memory[target] &= value;
                self.state = FlashState::Ready;
            }
            FlashState::BankSelect => {
                if offset == 0 {
                    self.bank = value & 1;
                }
                self.state = FlashState::Ready;
            }
        }
    }

    fn handle_command(&mut self, value: u8) {
        self.state = match value {
            0x90 => {
                self.chip_id_mode = true;
                FlashState::ChipId
            }
            0xF0 => {
                self.chip_id_mode = false;
                FlashState::Ready
            }
            0x80 => FlashState::Erase1,
            0xA0 => FlashState::Program,
            0xB0 if self.size == FlashSize::Flash128K => FlashState::BankSelect,
            _ => {
                tracing::debug!("flash: unknown command {value:#04X}");
                FlashState::Ready
            }
        };
    }

    fn erase_chip(&mut self) {
        let capacity = self.capacity();
        self.memory[..capacity].fill(0xFF);
    }

    fn erase_sector(&mut self, sector: usize) {
        let start = sector * SECTOR_SIZE;
        let end = (start + SECTOR_SIZE).min(self.memory.len());
        self.memory[start..end].fill(0xFF);
    }

    /// Raw backup bytes for host persistence, sized by the chip variant.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.memory[..self.capacity()]
    }

    /// Restores a raw save dump. The chip size follows the dump length.
    pub fn load_data(&mut self, data: &[u8]) {
        self.size = if data.len() > BANK_SIZE {
            FlashSize::Flash128K
        } else {
            FlashSize::Flash64K
        };
        self.memory.fill(0xFF);
        let len = data.len().min(self.memory.len());
        self.memory[..len].copy_from_slice(&data[..len]);
    }
}

#[derive(Serialize, Deserialize)]
pub struct InternalMemory {
    /// From `0x0000_0000` to `0x0000_3FFF` (16 KiB).
    bios: Vec<u8>,

    /// From `0x0200_0000`, 256 KiB, mirrored through the whole region.
    pub ewram: Vec<u8>,

    /// From `0x0300_0000`, 32 KiB, mirrored through the whole region.
    pub iwram: Vec<u8>,

    /// Cartridge image, mapped at `0x0800_0000` and its wait-state mirrors.
    pub rom: Vec<u8>,

    /// Backup chip at `0x0E00_0000`.
    pub flash: Flash,

    /// Last opcode fetched from inside the BIOS, served to open-bus reads.
    bios_latch: u32,
}

/// Largest cartridge the bus can address (regions 0x08-0x0D).
pub const MAX_ROM_SIZE: usize = 0x0200_0000;

impl Default for InternalMemory {
    fn default() -> Self {
        Self {
            bios: vec![0; 0x4000],
            ewram: vec![0; 0x0004_0000],
            iwram: vec![0; 0x8000],
            rom: Vec::new(),
            flash: Flash::default(),
            bios_latch: 0,
        }
    }
}

impl InternalMemory {
    /// Replaces the cartridge image, truncating oversized files.
    pub fn load_rom(&mut self, mut data: Vec<u8>) {
        if data.len() > MAX_ROM_SIZE {
            tracing::warn!(
                "ROM image of {} bytes exceeds the 32 MiB window, truncating",
                data.len()
            );
            data.truncate(MAX_ROM_SIZE);
        }
        self.rom = data;
    }

    /// Clears the volatile memories. ROM and backup data survive a reset.
    pub fn reset(&mut self) {
        self.ewram.fill(0);
        self.iwram.fill(0);
        self.bios_latch = 0;
    }

    /// Reads one BIOS byte. While the PC is outside the BIOS the region is
    /// open bus and returns the latched opcode instead.
    #[must_use]
    pub fn read_bios(&self, address: u32, pc_in_bios: bool) -> u8 {
        if pc_in_bios {
            self.bios[(address & 0x3FFF) as usize]
        } else {
            self.bios_latch.get_byte((address & 3) as u8)
        }
    }

    pub const fn set_bios_latch(&mut self, opcode: u32) {
        self.bios_latch = opcode;
    }

    /// Reads one cartridge byte; offsets past the file end return 0.
    #[must_use]
    pub fn read_rom(&self, offset: u32) -> u8 {
        self.rom.get(offset as usize).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rom_reads_past_end_return_zero() {
        let mut memory = InternalMemory::default();
        memory.load_rom(vec![1, 2, 3, 4]);

        assert_eq!(memory.read_rom(0), 1);
        assert_eq!(memory.read_rom(3), 4);
        assert_eq!(memory.read_rom(4), 0);
        assert_eq!(memory.read_rom(0x01FF_FFFF), 0);
    }

    #[test]
    fn bios_open_bus_returns_latched_opcode() {
        let mut memory = InternalMemory::default();
        memory.set_bios_latch(0xE3A0_0001);

        assert_eq!(memory.read_bios(0x0000, false), 0x01);
        assert_eq!(memory.read_bios(0x0003, false), 0xE3);

        // While executing inside the BIOS the real bytes are visible.
        assert_eq!(memory.read_bios(0x0000, true), 0);
    }

    #[test]
    fn flash_starts_erased() {
        let flash = Flash::default();
        assert_eq!(flash.read(0x0000), 0xFF);
        assert_eq!(flash.data().len(), 0x10000);
    }

    fn unlock(flash: &mut Flash, command: u8) {
        flash.write(0x5555, 0xAA);
        flash.write(0x2AAA, 0x55);
        flash.write(0x5555, command);
    }

    #[test]
    fn flash_chip_id_mode() {
        let mut flash = Flash::new(FlashSize::Flash64K);
        unlock(&mut flash, 0x90);
        assert_eq!(flash.read(0x0000), 0x32);
        assert_eq!(flash.read(0x0001), 0x1B);

        flash.write(0x5555, 0xF0);
        assert_eq!(flash.read(0x0000), 0xFF);

        let mut flash = Flash::new(FlashSize::Flash128K);
        unlock(&mut flash, 0x90);
        assert_eq!(flash.read(0x0001), 0x09);
    }

    #[test]
    fn flash_program_only_clears_bits() {
        let mut flash = Flash::default();
        unlock(&mut flash, 0xA0);
        flash.write(0x0123, 0x5A);
        assert_eq!(flash.read(0x0123), 0x5A);

        unlock(&mut flash, 0xA0);
        flash.write(0x0123, 0xF0);
        assert_eq!(flash.read(0x0123), 0x50);
    }

    #[test]
    fn flash_sector_erase() {
        let mut flash = Flash::default();
        unlock(&mut flash, 0xA0);
        flash.write(0x1010, 0x00);
        unlock(&mut flash, 0xA0);
        flash.write(0x2010, 0x00);

        unlock(&mut flash, 0x80);
        flash.write(0x5555, 0xAA);
        flash.write(0x2AAA, 0x55);
        flash.write(0x1000, 0x30);

        assert_eq!(flash.read(0x1010), 0xFF);
        assert_eq!(flash.read(0x2010), 0x00);
    }

    #[test]
    fn flash_bank_switch() {
        let mut flash = Flash::new(FlashSize::Flash128K);
        unlock(&mut flash, 0xA0);
        flash.write(0x0000, 0x11);

        unlock(&mut flash, 0xB0);
        flash.write(0x0000, 1);

        assert_eq!(flash.read(0x0000), 0xFF);

        unlock(&mut flash, 0xB0);
        flash.write(0x0000, 0);
        assert_eq!(flash.read(0x0000), 0x11);
    }

    #[test]
    fn flash_bank_command_rejected_on_64k() {
        let mut flash = Flash::new(FlashSize::Flash64K);
        unlock(&mut flash, 0xB0);
        flash.write(0x0000, 1);

        unlock(&mut flash, 0xA0);
        flash.write(0x0000, 0x22);
        assert_eq!(flash.read(0x0000), 0x22);
    }

    #[test]
    fn save_data_roundtrip() {
        let mut flash = Flash::default();
        unlock(&mut flash, 0xA0);
        flash.write(0x0042, 0x24);

        let dump = flash.data().to_vec();
        let mut restored = Flash::default();
        restored.load_data(&dump);
        assert_eq!(restored.read(0x0042), 0x24);

        let mut restored = Flash::default();
        restored.load_data(&vec![0xAB; 0x20000]);
        assert_eq!(restored.data().len(), 0x20000);
    }
}
