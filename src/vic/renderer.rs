/*!
Background pixel production and final composition.

One call renders the 8-pixel column under the current cycle into the
framebuffer. Text and standard bitmap modes are supported; horizontal and
vertical scroll shift the logical coordinate before cell lookup, wrapping
inside the 320×200 plane. Sprite pixels from the per-scanline buffer are
composed on top, honoring per-sprite background priority and latching
sprite-to-data collisions against foreground background pixels.
*/

use super::{FIRST_VISIBLE_CYCLE, FIRST_VISIBLE_LINE, IRQ_SPRITE_DATA, Vic, VicBus};

impl Vic {
    /// Render visible column `col` (0..40) of the current raster line.
    pub(crate) fn render_column<B: VicBus>(&mut self, bus: &B, col: u16) {
        let y_screen = match self.raster.checked_sub(FIRST_VISIBLE_LINE) {
            Some(y) if y < 200 => y as usize,
            _ => return, // border rows carry no framebuffer cells
        };
        debug_assert_eq!(col, self.cycle - FIRST_VISIBLE_CYCLE);

        let h_scroll = (self.regs[0x16] & 0x07) as usize;
        let v_scroll = (self.regs[0x11] & 0x07) as usize;
        let bitmap_mode = self.regs[0x11] & 0x20 != 0;
        let background = self.regs[0x21] & 0x0F;
        let screen_base = self.screen_base();

        let x_base = col as usize * 8;
        for i in 0..8 {
            let x_screen = x_base + i;
            let lx = (x_screen + h_scroll) % 320;
            let ly = (y_screen + v_scroll) % 200;
            let char_row = (ly / 8) as u16;
            let char_col = (lx / 8) as u16;
            let cell = char_row * 40 + char_col;

            let (mut color, foreground) = if bitmap_mode {
                let bitmap_base = (((self.regs[0x18] >> 3) & 0x01) as u16) * 0x2000;
                let byte_addr =
                    bitmap_base + char_row * 320 + char_col * 8 + (ly % 8) as u16;
                let bits = bus.read(byte_addr);
                let nibbles = bus.read(screen_base + cell);
                if (bits >> (7 - lx % 8)) & 1 != 0 {
                    (nibbles >> 4, true)
                } else {
                    (nibbles & 0x0F, false)
                }
            } else {
                let code = bus.read(screen_base + cell);
                let char_base = (((self.regs[0x18] >> 1) & 0x01) as u16) * 0x800;
                let bits = bus.char_rom(char_base + code as u16 * 8 + (ly % 8) as u16);
                if (bits >> (7 - lx % 8)) & 1 != 0 {
                    (bus.color(cell) & 0x0F, true)
                } else {
                    (background, false)
                }
            };

            if let Some((sprite_color, id)) = self.sprite_line[x_screen] {
                if foreground {
                    self.sprite_data_collision |= 1 << id;
                    self.trigger_interrupt(IRQ_SPRITE_DATA);
                }
                let behind = self.sprites[id as usize].priority;
                if !behind || !foreground {
                    color = sprite_color;
                }
            }

            self.put_pixel(x_screen, y_screen, color);
        }
    }
}
