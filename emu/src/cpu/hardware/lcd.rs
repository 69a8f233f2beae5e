//! The pixel pipeline.
//!
//! The LCD owns palette RAM, VRAM, OAM and the ARGB8888 framebuffer, and
//! advances a dot clock of 960 draw + 272 blank cycles per scanline across
//! 228 scanlines (160 visible). Whole scanlines are rendered at once when
//! the clock crosses a line boundary; per-dot effects are out of scope.
//!
//! `step` reports blanking edges and IRQ requests to the bus, which turns
//! them into IF bits and DMA triggers.

use serde::{Deserialize, Serialize};

use self::object_attributes::{ColorMode, ObjMode};
use super::io_registers::IoRegisters;
use crate::bitwise::Bits;

pub mod object_attributes;

/// GBA display width.
pub const DISPLAY_WIDTH: usize = 240;

/// GBA display height.
pub const DISPLAY_HEIGHT: usize = 160;

const HDRAW_CYCLES: u32 = 960;
const SCANLINE_CYCLES: u32 = 1232;
const VISIBLE_LINES: u16 = 160;
const TOTAL_LINES: u16 = 228;

/// OBJ tile data starts here in VRAM.
const OBJ_TILE_BASE: usize = 0x10000;

/// Shown instead of palette entry 0 while the palette is still erased, so
/// an uninitialized ROM renders visibly gray rather than black.
const BACKDROP_FALLBACK: u16 = 0x18C6;

#[derive(Serialize, Deserialize)]
pub struct Lcd {
    /// From `0x0500_0000`: 512 bytes of BG color, 512 bytes of OBJ color.
    pub palette_ram: Vec<u8>,
    /// From `0x0600_0000`: 96 KiB, tile data or bitmaps.
    pub video_ram: Vec<u8>,
    /// From `0x0700_0000`: 128 sprite descriptors.
    pub oam: Vec<u8>,

    framebuffer: Vec<u32>,
    scanline: u16,
    dot: u32,
    in_hblank: bool,
    frame_ready: bool,
}

/// Edges and IRQ requests produced by one `step`.
#[derive(Default, Debug, Clone, Copy)]
pub struct LcdStepOutput {
    pub entered_vblank: bool,
    pub entered_hblank: bool,
    pub request_vblank_irq: bool,
    pub request_hblank_irq: bool,
    pub request_vcount_irq: bool,
}

impl Default for Lcd {
    fn default() -> Self {
        Self {
            palette_ram: vec![0; 0x400],
            video_ram: vec![0; 0x18000],
            oam: vec![0; 0x400],
            framebuffer: vec![0xFF00_0000; DISPLAY_WIDTH * DISPLAY_HEIGHT],
            scanline: 0,
            dot: 0,
            in_hblank: false,
            frame_ready: false,
        }
    }
}

impl Lcd {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// ARGB8888, top-left origin, row-major.
    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }

    #[must_use]
    pub const fn is_frame_ready(&self) -> bool {
        self.frame_ready
    }

    pub const fn clear_frame_ready(&mut self) {
        self.frame_ready = false;
    }

    pub fn step(&mut self, cycles: u32, io: &mut IoRegisters) -> LcdStepOutput {
        let mut output = LcdStepOutput::default();

        self.dot += cycles;

        if !self.in_hblank && self.dot >= HDRAW_CYCLES {
            self.in_hblank = true;

            let mut dispstat = io.dispstat();
            dispstat.set_bit(1, true);
            io.set_dispstat(dispstat);

            // HBlank DMA and IRQ only fire on visible lines.
            if self.scanline < VISIBLE_LINES {
                output.entered_hblank = true;
                if dispstat.get_bit(4) {
                    output.request_hblank_irq = true;
                }
            }
        }

        while self.dot >= SCANLINE_CYCLES {
            self.dot -= SCANLINE_CYCLES;

            if self.scanline < VISIBLE_LINES {
                self.render_scanline(io);
            }

            self.scanline += 1;
            if self.scanline == TOTAL_LINES {
                self.scanline = 0;
                self.frame_ready = true;
            }
            io.set_vcount(self.scanline);

            self.in_hblank = self.dot >= HDRAW_CYCLES;

            let mut dispstat = io.dispstat() & !0b111;
            dispstat.set_bit(0, self.scanline >= VISIBLE_LINES);
            dispstat.set_bit(1, self.in_hblank);

            if self.scanline == u16::from(dispstat.get_byte(1)) {
                dispstat.set_bit(2, true);
                if dispstat.get_bit(5) {
                    output.request_vcount_irq = true;
                }
            }

            if self.scanline == VISIBLE_LINES {
                output.entered_vblank = true;
                if dispstat.get_bit(3) {
                    output.request_vblank_irq = true;
                }
            }

            io.set_dispstat(dispstat);
        }

        output
    }

    fn render_scanline(&mut self, io: &IoRegisters) {
        match io.bg_mode() {
            0 => self.render_mode0(io),
            3 => self.render_mode3(),
            4 => self.render_mode4(io),
            5 => self.render_mode5(io),
            mode => {
                tracing::debug!("unsupported video mode {mode}");
                self.fill_scanline(0xFF00_0000);
            }
        }

        if io.dispcnt().get_bit(12) {
            self.render_sprites(io);
        }
    }

    fn fill_scanline(&mut self, color: u32) {
        let row = usize::from(self.scanline) * DISPLAY_WIDTH;
        self.framebuffer[row..row + DISPLAY_WIDTH].fill(color);
    }

    fn set_pixel(&mut self, x: usize, color: u16) {
        self.framebuffer[usize::from(self.scanline) * DISPLAY_WIDTH + x] = rgb15_to_argb(color);
    }

    fn palette_color(&self, index: usize) -> u16 {
        u16::from(self.palette_ram[index * 2]) | (u16::from(self.palette_ram[index * 2 + 1]) << 8)
    }

    fn vram_halfword(&self, offset: usize) -> u16 {
        u16::from(self.video_ram[offset]) | (u16::from(self.video_ram[offset + 1]) << 8)
    }

    /// Tiled backgrounds. Priorities iterate 3→0 with backgrounds 3→0
    /// inside each level, later draws overwriting earlier ones, so the
    /// lowest priority value ends up on top.
    fn render_mode0(&mut self, io: &IoRegisters) {
        let entry0 = self.palette_color(0);
        let backdrop = if entry0 == 0 { BACKDROP_FALLBACK } else { entry0 };
        self.fill_scanline(rgb15_to_argb(backdrop));

        for priority in (0..4_u16).rev() {
            for bg in (0..4_u32).rev() {
                if !io.dispcnt().get_bit(8 + bg as u8) {
                    continue;
                }
                if io.bg_control(bg).get_bits(0..=1) != priority {
                    continue;
                }
                self.render_tile_background(bg, io);
            }
        }
    }

    fn render_tile_background(&mut self, bg: u32, io: &IoRegisters) {
        let control = io.bg_control(bg);
        let char_base = usize::from(control.get_bits(2..=3)) * 0x4000;
        let is_8bpp = control.get_bit(7);
        let screen_base = usize::from(control.get_bits(8..=12)) * 0x800;
        let (width, height) = match control.get_bits(14..=15) {
            0 => (256_u32, 256_u32),
            1 => (512, 256),
            2 => (256, 512),
            _ => (512, 512),
        };

        let hofs = u32::from(io.bg_h_offset(bg));
        let vofs = u32::from(io.bg_v_offset(bg));
        let y = (u32::from(self.scanline) + vofs) & (height - 1);

        for x in 0..DISPLAY_WIDTH as u32 {
            let sx = (x + hofs) & (width - 1);

            // One of up to four 256x256 screen blocks, by quadrant.
            let mut block = 0_usize;
            if sx >= 256 {
                block += 1;
            }
            if y >= 256 {
                block += if width == 512 { 2 } else { 1 };
            }

            let tile_x = ((sx & 255) / 8) as usize;
            let tile_y = ((y & 255) / 8) as usize;
            let entry_offset = screen_base + block * 0x800 + (tile_y * 32 + tile_x) * 2;
            if entry_offset + 1 >= self.video_ram.len() {
                continue;
            }

            let entry = self.vram_halfword(entry_offset);
            let tile = usize::from(entry.get_bits(0..=9));

            let mut pixel_x = (sx & 7) as usize;
            let mut pixel_y = (y & 7) as usize;
            if entry.get_bit(10) {
                pixel_x = 7 - pixel_x;
            }
            if entry.get_bit(11) {
                pixel_y = 7 - pixel_y;
            }

            let color_index = if is_8bpp {
                match self.video_ram.get(char_base + tile * 64 + pixel_y * 8 + pixel_x) {
                    Some(&byte) => usize::from(byte),
                    None => continue,
                }
            } else {
                let byte = match self
                    .video_ram
                    .get(char_base + tile * 32 + pixel_y * 4 + pixel_x / 2)
                {
                    Some(&byte) => byte,
                    None => continue,
                };
                let nibble = if pixel_x & 1 == 1 { byte >> 4 } else { byte & 0xF };
                if nibble == 0 {
                    continue;
                }
                usize::from(entry.get_bits(12..=15)) * 16 + usize::from(nibble)
            };

            // Index 0 is transparent, the backdrop shows through.
            if color_index == 0 {
                continue;
            }

            self.set_pixel(x as usize, self.palette_color(color_index));
        }
    }

    /// Single 16bpp 240x160 bitmap at the start of VRAM.
    fn render_mode3(&mut self) {
        for x in 0..DISPLAY_WIDTH {
            let offset = (usize::from(self.scanline) * DISPLAY_WIDTH + x) * 2;
            self.set_pixel(x, self.vram_halfword(offset));
        }
    }

    /// Paletted 240x160 bitmap, double-buffered through DISPCNT bit 4.
    fn render_mode4(&mut self, io: &IoRegisters) {
        let base = if io.dispcnt().get_bit(4) { 0xA000 } else { 0 };

        for x in 0..DISPLAY_WIDTH {
            let offset = base + usize::from(self.scanline) * DISPLAY_WIDTH + x;
            let palette_index = usize::from(self.video_ram[offset]);
            self.set_pixel(x, self.palette_color(palette_index));
        }
    }

    /// 16bpp 160x128 bitmap, double-buffered; the border stays black.
    fn render_mode5(&mut self, io: &IoRegisters) {
        const MODE5_WIDTH: usize = 160;
        const MODE5_HEIGHT: usize = 128;

        let base = if io.dispcnt().get_bit(4) { 0xA000 } else { 0 };
        let line = usize::from(self.scanline);

        for x in 0..DISPLAY_WIDTH {
            if line < MODE5_HEIGHT && x < MODE5_WIDTH {
                let offset = base + (line * MODE5_WIDTH + x) * 2;
                self.set_pixel(x, self.vram_halfword(offset));
            } else {
                self.framebuffer[line * DISPLAY_WIDTH + x] = 0xFF00_0000;
            }
        }
    }

    /// Composites the regular sprites over the current scanline, in OAM
    /// index order. Affine entries are skipped; sprites always win over
    /// backgrounds.
    fn render_sprites(&mut self, io: &IoRegisters) {
        let one_dimensional = io.dispcnt().get_bit(6);
        let attributes = object_attributes::parse(&self.oam);
        let line = i32::from(self.scanline);

        for obj in &attributes {
            if !matches!(obj.attr0.mode, ObjMode::Normal) {
                continue;
            }
            let Some((width, height)) = object_attributes::sprite_size(obj.attr0.shape, obj.attr1.size)
            else {
                continue;
            };

            let mut y = i32::from(obj.attr0.y);
            if y >= 160 {
                y -= 256;
            }
            let mut x = i32::from(obj.attr1.x);
            if x >= 240 {
                x -= 512;
            }

            if line < y || line >= y + i32::from(height) {
                continue;
            }

            let mut tex_y = (line - y) as u32;
            if obj.attr1.v_flip {
                tex_y = u32::from(height) - 1 - tex_y;
            }

            let row_stride = u32::from(width / 8);
            let base_tile = u32::from(obj.attr2.tile);

            for column in 0..u32::from(width) {
                let screen_x = x + column as i32;
                if !(0..DISPLAY_WIDTH as i32).contains(&screen_x) {
                    continue;
                }

                let mut tex_x = column;
                if obj.attr1.h_flip {
                    tex_x = u32::from(width) - 1 - tex_x;
                }

                let tile_row = tex_y / 8;
                let tile_col = tex_x / 8;
                let in_y = (tex_y % 8) as usize;
                let in_x = (tex_x % 8) as usize;

                let palette_index = match obj.attr0.color_mode {
                    ColorMode::Palette8bpp => {
                        // 8bpp tile indices step by two.
                        let tile = base_tile
                            + if one_dimensional {
                                tile_row * row_stride * 2
                            } else {
                                tile_row * 32
                            }
                            + tile_col * 2;
                        let offset = OBJ_TILE_BASE + tile as usize * 32 + in_y * 8 + in_x;
                        match self.video_ram.get(offset) {
                            Some(&byte) if byte != 0 => 0x100 + usize::from(byte),
                            _ => continue,
                        }
                    }
                    ColorMode::Palette4bpp => {
                        let tile = base_tile
                            + if one_dimensional {
                                tile_row * row_stride
                            } else {
                                tile_row * 32
                            }
                            + tile_col;
                        let offset = OBJ_TILE_BASE + tile as usize * 32 + in_y * 4 + in_x / 2;
                        let Some(&byte) = self.video_ram.get(offset) else {
                            continue;
                        };
                        let nibble = if in_x & 1 == 1 { byte >> 4 } else { byte & 0xF };
                        if nibble == 0 {
                            continue;
                        }
                        0x100 + usize::from(obj.attr2.palette_bank) * 16 + usize::from(nibble)
                    }
                };

                self.set_pixel(screen_x as usize, self.palette_color(palette_index));
            }
        }
    }
}

/// Expands a 15-bit BGR color to ARGB8888 by shifting each 5-bit channel
/// up by three; alpha is opaque.
#[must_use]
pub fn rgb15_to_argb(color: u16) -> u32 {
    let red = u32::from(color.get_bits(0..=4)) << 3;
    let green = u32::from(color.get_bits(5..=9)) << 3;
    let blue = u32::from(color.get_bits(10..=14)) << 3;

    0xFF00_0000 | (red << 16) | (green << 8) | blue
}
