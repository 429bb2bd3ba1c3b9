/*!
MOS 6569 VIC-II (PAL): raster generator, text/bitmap rendering, sprites,
collision latches and the raster interrupt.

Submodules
- renderer.rs: per-column background pixel production and sprite
  composition into the 320×200 framebuffer.
- sprites.rs: sprite state mirrors and the once-per-scanline sprite
  buffer rasterization with collision latching.

Timing model: `tick` advances one cycle of the 63-cycle scanline. Cycles
16..56 inside the visible window each emit one 8-pixel column. When the
cycle counter wraps, the raster line advances (modulo 312), the next line's
sprite buffer is rasterized, the raster-compare interrupt is evaluated, and
badline cycle theft is reported to the caller.

The chip reads memory through the read-only [`VicBus`] view the bus
constructs around its RAM, color RAM and character ROM; it never observes
the CPU's banked map.
*/

mod renderer;
mod sprites;

pub use sprites::Sprite;

use serde::{Deserialize, Serialize};

pub const SCREEN_WIDTH: usize = 320;
pub const SCREEN_HEIGHT: usize = 200;
pub const CYCLES_PER_LINE: u16 = 63;
pub const RASTER_LINES: u16 = 312;
/// Cycles a badline steals from the CPU.
pub const BADLINE_STOLEN_CYCLES: u32 = 40;

/// First raster line of the visible 200-line box.
pub(crate) const FIRST_VISIBLE_LINE: u16 = 50;
/// First cycle of the 40 visible columns in a scanline.
pub(crate) const FIRST_VISIBLE_CYCLE: u16 = 16;
/// Sprite coordinate of the left edge of the visible box.
pub(crate) const SPRITE_X_OFFSET: i32 = 24;

const REG_COUNT: usize = 47;

// Interrupt source bits in $D019/$D01A.
pub(crate) const IRQ_RASTER: u8 = 0x01;
pub(crate) const IRQ_SPRITE_DATA: u8 = 0x02;
pub(crate) const IRQ_SPRITE_SPRITE: u8 = 0x04;

/// The fixed 16-entry palette (Pepto), indexed by C64 color code.
pub const PALETTE: [[u8; 3]; 16] = [
    [0, 0, 0],
    [255, 255, 255],
    [136, 0, 0],
    [170, 255, 238],
    [204, 68, 204],
    [0, 204, 85],
    [0, 0, 170],
    [238, 238, 119],
    [221, 136, 85],
    [102, 68, 0],
    [255, 119, 119],
    [51, 51, 51],
    [119, 119, 119],
    [170, 255, 102],
    [0, 136, 255],
    [187, 187, 187],
];

/// Read-only memory view handed to the VIC for its fetches.
pub trait VicBus {
    /// RAM as the VIC sees it (screen matrix, bitmap, sprite data).
    fn read(&self, addr: u16) -> u8;
    /// Color RAM nibble for a screen cell index.
    fn color(&self, index: u16) -> u8;
    /// Character generator ROM byte.
    fn char_rom(&self, offset: u16) -> u8;
}

pub struct Vic {
    pub(crate) regs: [u8; REG_COUNT],
    pub(crate) cycle: u16,
    pub(crate) raster: u16,
    pub(crate) irq_flags: u8,
    pub(crate) sprites: [Sprite; 8],
    /// Per-scanline sprite pixels: `(color, sprite id)` per visible column.
    pub(crate) sprite_line: Box<[Option<(u8, u8)>; SCREEN_WIDTH]>,
    pub(crate) sprite_sprite_collision: u8,
    pub(crate) sprite_data_collision: u8,
    framebuffer: Box<[u8; SCREEN_WIDTH * SCREEN_HEIGHT]>,
}

impl Default for Vic {
    fn default() -> Self {
        Self::new()
    }
}

impl Vic {
    pub fn new() -> Self {
        Self {
            regs: [0; REG_COUNT],
            cycle: 0,
            raster: 0,
            irq_flags: 0,
            sprites: std::array::from_fn(|i| Sprite::new(i as u8)),
            sprite_line: Box::new([None; SCREEN_WIDTH]),
            sprite_sprite_collision: 0,
            sprite_data_collision: 0,
            framebuffer: Box::new([0; SCREEN_WIDTH * SCREEN_HEIGHT]),
        }
    }

    /// Advance one cycle. Returns the number of CPU cycles stolen (40 when
    /// the beam just entered a badline, 0 otherwise).
    pub fn tick<B: VicBus>(&mut self, bus: &B) -> u32 {
        let col = self.cycle.wrapping_sub(FIRST_VISIBLE_CYCLE);
        if col < 40 {
            self.render_column(bus, col);
        }

        self.cycle += 1;
        if self.cycle < CYCLES_PER_LINE {
            return 0;
        }

        // Scanline transition.
        self.cycle = 0;
        self.raster += 1;
        if self.raster >= RASTER_LINES {
            self.raster = 0;
        }
        self.rasterize_sprite_line(bus);
        if self.raster == self.raster_compare() {
            self.trigger_interrupt(IRQ_RASTER);
        }
        if self.is_badline() {
            BADLINE_STOLEN_CYCLES
        } else {
            0
        }
    }

    /// Raster compare value: $D012 joined with bit 7 of $D011 as bit 8.
    fn raster_compare(&self) -> u16 {
        self.regs[0x12] as u16 | (((self.regs[0x11] & 0x80) as u16) << 1)
    }

    /// A badline stalls the CPU: display enabled, raster inside the text
    /// window, and the line either matches the vertical scroll phase or
    /// starts DMA for an enabled sprite.
    pub fn is_badline(&self) -> bool {
        if self.regs[0x11] & 0x10 == 0 {
            return false;
        }
        if !(FIRST_VISIBLE_LINE..FIRST_VISIBLE_LINE + 200).contains(&self.raster) {
            return false;
        }
        if (self.raster & 0x07) as u8 == self.regs[0x11] & 0x07 {
            return true;
        }
        self.sprites
            .iter()
            .any(|s| s.enabled && s.y as u16 == self.raster)
    }

    /// Latch an interrupt source. The IRQ line itself is the level view in
    /// [`Vic::irq_asserted`], gated by the mask register.
    pub(crate) fn trigger_interrupt(&mut self, source: u8) {
        self.irq_flags |= source;
    }

    pub fn irq_asserted(&self) -> bool {
        self.irq_flags & self.regs[0x1A] & 0x0F != 0
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        let offset = (addr & 0x3F) as usize;
        match offset {
            // Stored control bits with the live raster bit 8 in bit 7.
            0x11 => (self.regs[0x11] & 0x7F) | ((self.raster >> 1) & 0x80) as u8,
            0x12 => (self.raster & 0xFF) as u8,
            0x19 => {
                let mut val = self.irq_flags;
                if self.irq_flags & self.regs[0x1A] & 0x0F != 0 {
                    val |= 0x80;
                }
                self.irq_flags = 0;
                val
            }
            0x1E => {
                let val = self.sprite_sprite_collision;
                self.sprite_sprite_collision = 0;
                val
            }
            0x1F => {
                let val = self.sprite_data_collision;
                self.sprite_data_collision = 0;
                val
            }
            _ => {
                if offset < REG_COUNT {
                    self.regs[offset]
                } else {
                    0
                }
            }
        }
    }

    pub fn write(&mut self, addr: u16, data: u8) {
        let offset = (addr & 0x3F) as usize;
        if offset < REG_COUNT {
            self.regs[offset] = data;
        }
        self.apply_sprite_register(offset, data);
    }

    /// Current raster line (tests and the host status line).
    pub fn raster_line(&self) -> u16 {
        self.raster
    }

    /// The visible surface: one palette index per pixel, row-major 320×200.
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer[..]
    }

    pub(crate) fn put_pixel(&mut self, x: usize, y: usize, color: u8) {
        self.framebuffer[y * SCREEN_WIDTH + x] = color;
    }

    /// Screen matrix base inside the VIC's address space ($D018 VM bits).
    pub(crate) fn screen_base(&self) -> u16 {
        ((self.regs[0x18] >> 4) & 0x0F) as u16 * 0x400
    }

    pub fn snapshot(&self) -> VicSnapshot {
        VicSnapshot {
            regs: self.regs.to_vec(),
            cycle: self.cycle,
            raster: self.raster,
            irq_flags: self.irq_flags,
            sprite_sprite_collision: self.sprite_sprite_collision,
            sprite_data_collision: self.sprite_data_collision,
            sprites: self.sprites.to_vec(),
            sprite_line: self.sprite_line.to_vec(),
        }
    }

    pub fn restore(&mut self, snap: &VicSnapshot) {
        let n = snap.regs.len().min(REG_COUNT);
        self.regs[..n].copy_from_slice(&snap.regs[..n]);
        self.cycle = snap.cycle;
        self.raster = snap.raster;
        self.irq_flags = snap.irq_flags;
        self.sprite_sprite_collision = snap.sprite_sprite_collision;
        self.sprite_data_collision = snap.sprite_data_collision;
        for (i, s) in snap.sprites.iter().take(8).enumerate() {
            self.sprites[i] = s.clone();
        }
        for (i, cell) in snap.sprite_line.iter().take(SCREEN_WIDTH).enumerate() {
            self.sprite_line[i] = *cell;
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VicSnapshot {
    pub regs: Vec<u8>,
    pub cycle: u16,
    pub raster: u16,
    pub irq_flags: u8,
    pub sprite_sprite_collision: u8,
    pub sprite_data_collision: u8,
    pub sprites: Vec<Sprite>,
    pub sprite_line: Vec<Option<(u8, u8)>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat test memory: RAM bytes plus a synthetic character ROM where
    /// every glyph row repeats the character code.
    pub(crate) struct TestMem {
        pub ram: Vec<u8>,
        pub color: Vec<u8>,
    }

    impl TestMem {
        pub fn new() -> Self {
            Self {
                ram: vec![0; 0x10000],
                color: vec![0; 0x400],
            }
        }
    }

    impl VicBus for TestMem {
        fn read(&self, addr: u16) -> u8 {
            self.ram[addr as usize]
        }
        fn color(&self, index: u16) -> u8 {
            self.color[index as usize & 0x3FF]
        }
        fn char_rom(&self, offset: u16) -> u8 {
            ((offset >> 3) & 0xFF) as u8
        }
    }

    fn run_lines(vic: &mut Vic, mem: &TestMem, lines: u32) -> u32 {
        let mut stolen = 0;
        for _ in 0..lines * CYCLES_PER_LINE as u32 {
            stolen += vic.tick(mem);
        }
        stolen
    }

    #[test]
    fn raster_register_readback() {
        let mut vic = Vic::new();
        let mem = TestMem::new();
        run_lines(&mut vic, &mem, 300);
        assert_eq!(vic.raster_line(), 300);
        assert_eq!(vic.read(0xD012), (300u16 & 0xFF) as u8);
        assert_eq!(vic.read(0xD011) & 0x80, 0x80); // bit 8 of 300 is set
        run_lines(&mut vic, &mem, 12); // wrap at 312
        assert_eq!(vic.raster_line(), 0);
        assert_eq!(vic.read(0xD011) & 0x80, 0);
    }

    #[test]
    fn raster_compare_sets_flag_and_line() {
        let mut vic = Vic::new();
        let mem = TestMem::new();
        vic.write(0xD012, 2);
        vic.write(0xD01A, IRQ_RASTER);
        run_lines(&mut vic, &mem, 1);
        assert!(!vic.irq_asserted());
        run_lines(&mut vic, &mem, 1);
        assert!(vic.irq_asserted());
        let flags = vic.read(0xD019);
        assert_eq!(flags & 0x01, 0x01);
        assert_eq!(flags & 0x80, 0x80);
        // Read cleared the latch.
        assert!(!vic.irq_asserted());
        assert_eq!(vic.read(0xD019), 0);
    }

    #[test]
    fn raster_compare_above_255_uses_bit_8() {
        let mut vic = Vic::new();
        let mem = TestMem::new();
        vic.write(0xD012, 0x00);
        vic.write(0xD011, 0x80); // compare = 0x100
        vic.write(0xD01A, IRQ_RASTER);
        run_lines(&mut vic, &mem, 0x100);
        assert!(vic.irq_asserted());
    }

    #[test]
    fn masked_source_latches_without_asserting() {
        let mut vic = Vic::new();
        let mem = TestMem::new();
        vic.write(0xD012, 1);
        run_lines(&mut vic, &mem, 1);
        assert!(!vic.irq_asserted());
        let flags = vic.read(0xD019);
        assert_eq!(flags, IRQ_RASTER); // bit 7 clear: no enabled source
    }

    #[test]
    fn badline_needs_display_enable_and_scroll_match() {
        let mut vic = Vic::new();
        let mem = TestMem::new();
        run_lines(&mut vic, &mem, 50);
        assert_eq!(vic.raster_line(), 50);
        assert!(!vic.is_badline()); // display off
        vic.write(0xD011, 0x12); // DEN, vscroll 2 == 50 & 7
        assert!(vic.is_badline());
        vic.write(0xD011, 0x13); // vscroll 3
        assert!(!vic.is_badline());
    }

    #[test]
    fn badline_steals_forty_cycles_once_per_line() {
        let mut vic = Vic::new();
        let mem = TestMem::new();
        vic.write(0xD011, 0x10); // DEN, vscroll 0
        let stolen = run_lines(&mut vic, &mem, 100);
        // Raster reaches 1..=100; badlines at 56, 64, 72, 80, 88, 96.
        assert_eq!(stolen, 6 * BADLINE_STOLEN_CYCLES);
    }

    #[test]
    fn sprite_dma_line_is_a_badline() {
        let mut vic = Vic::new();
        let mem = TestMem::new();
        vic.write(0xD011, 0x13); // DEN, vscroll 3
        vic.write(0xD015, 0x01); // sprite 0 enabled
        vic.write(0xD001, 100); // sprite 0 y
        run_lines(&mut vic, &mem, 100);
        assert!(vic.is_badline());
    }
}
