/*!
MOS 6526 CIA: two 16-bit down-counting interval timers, the interrupt
control/flag register pair, and (on CIA1) the keyboard/joystick matrix.

Register window is 16 bytes, mirrored across its page by masking the low
nibble of the address. Interrupt semantics:
- Timer A underflow sets ifr bit 0, Timer B sets bit 1.
- If the corresponding mask bit is enabled, ifr bit 7 latches and the chip
  asserts its interrupt line: CIA1 drives IRQ, CIA2 drives NMI.
- Reading the ICR ($xD) returns the flag byte and clears it atomically.
- Writing the ICR with bit 7 set ORs the low bits into the mask; with bit 7
  clear it ANDs their complement out of the mask.

Keyboard scanning (CIA1): the CPU writes an active-low column-select pattern
to port A. Reading port A folds the matrix rows of every selected column
together, ANDs in the joystick-2 lines (port A bits 0..4, active low), and
mixes latch bits back in for pins DDRA marks as outputs. Reading port B
returns the same row fold under DDRB mixing, which is the pin the KERNAL
scan routine actually samples.
*/

use serde::{Deserialize, Serialize};

/// One interval timer: latch + counter + run mode.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Timer {
    pub latch: u16,
    pub counter: u16,
    pub started: bool,
    pub one_shot: bool,
}

impl Timer {
    /// Advance one cycle; true on underflow. The counter reloads from the
    /// latch on underflow; one-shot mode also stops the timer.
    fn tick(&mut self) -> bool {
        if !self.started {
            return false;
        }
        if self.counter == 0 {
            self.counter = self.latch;
            if self.one_shot {
                self.started = false;
            }
            true
        } else {
            self.counter -= 1;
            false
        }
    }

    fn force_load(&mut self) {
        self.counter = self.latch;
    }
}

// ifr / mask bit assignments
const INT_TIMER_A: u8 = 0x01;
const INT_TIMER_B: u8 = 0x02;
const INT_ASSERTED: u8 = 0x80;

#[derive(Clone, Debug)]
pub struct Cia {
    label: &'static str,
    /// Backing store for offsets without dedicated behavior (TOD, SDR).
    regs: [u8; 16],
    pub timer_a: Timer,
    pub timer_b: Timer,
    icr_mask: u8,
    ifr: u8,

    // Port state. Only CIA1 wires the matrix and joystick to port reads.
    keyboard: bool,
    matrix: [[u8; 8]; 8],
    port_a_out: u8,
    port_b_out: u8,
    ddra: u8,
    ddrb: u8,
    joystick: u8,
}

impl Cia {
    pub fn new(label: &'static str, keyboard: bool) -> Self {
        Self {
            label,
            regs: [0; 16],
            timer_a: Timer::default(),
            timer_b: Timer::default(),
            icr_mask: 0,
            ifr: 0,
            keyboard,
            matrix: [[1; 8]; 8],
            port_a_out: 0xFF,
            port_b_out: 0xFF,
            ddra: 0,
            ddrb: 0,
            joystick: 0xFF,
        }
    }

    /// Advance both timers one cycle. Returns true when an enabled underflow
    /// newly asserted the chip's interrupt line this cycle.
    pub fn tick(&mut self) -> bool {
        let mut raised = false;
        if self.timer_a.tick() {
            self.ifr |= INT_TIMER_A;
            if self.icr_mask & INT_TIMER_A != 0 {
                self.ifr |= INT_ASSERTED;
                raised = true;
            }
            if self.timer_a.one_shot {
                self.regs[0x0E] &= !0x01;
            }
        }
        if self.timer_b.tick() {
            self.ifr |= INT_TIMER_B;
            if self.icr_mask & INT_TIMER_B != 0 {
                self.ifr |= INT_ASSERTED;
                raised = true;
            }
            if self.timer_b.one_shot {
                self.regs[0x0F] &= !0x01;
            }
        }
        raised
    }

    /// Level view of the interrupt line (held until the ICR is read).
    pub fn irq_asserted(&self) -> bool {
        self.ifr & INT_ASSERTED != 0
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        match addr & 0x0F {
            0x00 if self.keyboard => self.read_port_a(),
            0x01 if self.keyboard => self.read_port_b(),
            0x02 => self.ddra,
            0x03 => self.ddrb,
            0x04 => (self.timer_a.counter & 0xFF) as u8,
            0x05 => (self.timer_a.counter >> 8) as u8,
            0x06 => (self.timer_b.counter & 0xFF) as u8,
            0x07 => (self.timer_b.counter >> 8) as u8,
            0x0D => {
                let val = self.ifr;
                self.ifr = 0;
                val
            }
            offset => self.regs[offset as usize],
        }
    }

    pub fn write(&mut self, addr: u16, data: u8) {
        let offset = (addr & 0x0F) as usize;
        match offset {
            0x00 => self.port_a_out = data,
            0x01 => self.port_b_out = data,
            0x02 => self.ddra = data,
            0x03 => self.ddrb = data,
            0x04 => self.timer_a.latch = (self.timer_a.latch & 0xFF00) | data as u16,
            0x05 => {
                self.timer_a.latch =
                    (self.timer_a.latch & 0x00FF) | ((data as u16) << 8);
                // A stopped timer picks the new latch up immediately.
                if !self.timer_a.started {
                    self.timer_a.force_load();
                }
            }
            0x06 => self.timer_b.latch = (self.timer_b.latch & 0xFF00) | data as u16,
            0x07 => {
                self.timer_b.latch =
                    (self.timer_b.latch & 0x00FF) | ((data as u16) << 8);
                if !self.timer_b.started {
                    self.timer_b.force_load();
                }
            }
            0x0D => {
                if data & 0x80 != 0 {
                    self.icr_mask |= data & 0x7F;
                } else {
                    self.icr_mask &= !(data & 0x7F);
                }
                return;
            }
            0x0E => {
                self.timer_a.started = data & 0x01 != 0;
                self.timer_a.one_shot = data & 0x08 != 0;
                if data & 0x10 != 0 {
                    self.timer_a.force_load();
                }
            }
            0x0F => {
                self.timer_b.started = data & 0x01 != 0;
                self.timer_b.one_shot = data & 0x08 != 0;
                if data & 0x10 != 0 {
                    self.timer_b.force_load();
                }
            }
            _ => {}
        }
        self.regs[offset] = data;
    }

    /// Fold the matrix rows of every column selected (low) in `columns`.
    fn scan_rows(&self, columns: u8) -> u8 {
        let mut result = 0xFF;
        for col in 0..8 {
            if columns & (1 << col) == 0 {
                let mut rows = 0xFFu8;
                for row in 0..8 {
                    if self.matrix[row][col] == 0 {
                        rows &= !(1 << row);
                    }
                }
                result &= rows;
            }
        }
        result
    }

    fn read_port_a(&self) -> u8 {
        let external = self.scan_rows(self.port_a_out) & self.joystick;
        (external & !self.ddra) | (self.port_a_out & self.ddra)
    }

    fn read_port_b(&self) -> u8 {
        let rows = self.scan_rows(self.port_a_out);
        (rows & !self.ddrb) | (self.port_b_out & self.ddrb)
    }

    /// Host key event: 0 in the matrix means pressed.
    pub fn set_key(&mut self, row: u8, col: u8, pressed: bool) {
        if row < 8 && col < 8 {
            self.matrix[row as usize][col as usize] = if pressed { 0 } else { 1 };
        }
    }

    /// Host joystick event on the given port-A bit (active low).
    pub fn set_joystick(&mut self, bit: u8, pressed: bool) {
        if pressed {
            self.joystick &= !(1 << bit);
        } else {
            self.joystick |= 1 << bit;
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn snapshot(&self) -> CiaSnapshot {
        CiaSnapshot {
            regs: self.regs.to_vec(),
            timer_a: self.timer_a.clone(),
            timer_b: self.timer_b.clone(),
            icr_mask: self.icr_mask,
            ifr: self.ifr,
            matrix: self.matrix,
            port_a_out: self.port_a_out,
            port_b_out: self.port_b_out,
            ddra: self.ddra,
            ddrb: self.ddrb,
            joystick: self.joystick,
        }
    }

    pub fn restore(&mut self, snap: &CiaSnapshot) {
        let n = snap.regs.len().min(16);
        self.regs[..n].copy_from_slice(&snap.regs[..n]);
        self.timer_a = snap.timer_a.clone();
        self.timer_b = snap.timer_b.clone();
        self.icr_mask = snap.icr_mask;
        self.ifr = snap.ifr;
        self.matrix = snap.matrix;
        self.port_a_out = snap.port_a_out;
        self.port_b_out = snap.port_b_out;
        self.ddra = snap.ddra;
        self.ddrb = snap.ddrb;
        self.joystick = snap.joystick;
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CiaSnapshot {
    pub regs: Vec<u8>,
    pub timer_a: Timer,
    pub timer_b: Timer,
    pub icr_mask: u8,
    pub ifr: u8,
    pub matrix: [[u8; 8]; 8],
    pub port_a_out: u8,
    pub port_b_out: u8,
    pub ddra: u8,
    pub ddrb: u8,
    pub joystick: u8,
}
