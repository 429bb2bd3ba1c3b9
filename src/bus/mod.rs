/*!
Bus facade: owns RAM, the three ROMs, color RAM, the processor port latch,
the cartridge overlay and every peripheral. The CPU reaches memory and I/O
exclusively through [`Bus::read`]/[`Bus::write`] (implemented in
`memory_map.rs`); peripherals raise interrupts by line state the bus
aggregates once per cycle in [`Bus::tick_devices`].

Interrupt plumbing: the VIC and CIA1 drive the (level-sensitive) IRQ line;
CIA2 drives NMI, which latches edge-style in `nmi_pending` until the CPU
takes it. The CPU observes both at its next pre-fetch gate.

The VIC does not see the CPU's banked map; it fetches through a read-only
[`VicMemView`] over RAM, color RAM and the character ROM.
*/

pub mod memory_map;

use std::collections::HashSet;

use log::info;

use crate::cartridge::Cartridge;
use crate::cia::Cia;
use crate::drive::Drive;
use crate::keyboard::{JoyInput, Key};
use crate::rom::{RomSet, parse_prg};
use crate::sid::Sid;
use crate::vic::{Vic, VicBus};

pub struct Bus {
    pub(crate) ram: Box<[u8; 0x10000]>,
    pub(crate) basic_rom: Box<[u8; 0x2000]>,
    pub(crate) kernal_rom: Box<[u8; 0x2000]>,
    pub(crate) char_rom: Box<[u8; 0x1000]>,
    pub(crate) color_ram: Box<[u8; 0x0400]>,
    /// Latched processor port byte at $0001 (LORAM/HIRAM/CHAREN in bits 0..2).
    pub(crate) processor_port: u8,
    /// Every RAM address stored to since power-on; feeds sparse snapshots.
    pub(crate) dirty: HashSet<u16>,
    pub cartridge: Option<Cartridge>,
    pub vic: Vic,
    pub sid: Sid,
    pub cia1: Cia,
    pub cia2: Cia,
    pub drive: Drive,
    nmi_pending: bool,
    irq_line: bool,
}

impl Bus {
    pub fn new(roms: RomSet) -> Self {
        Self {
            ram: Box::new([0; 0x10000]),
            basic_rom: roms.basic,
            kernal_rom: roms.kernal,
            char_rom: roms.chargen,
            color_ram: Box::new([0; 0x0400]),
            // Stock power-on configuration: LORAM, HIRAM, CHAREN all high.
            processor_port: 0b0011_0111,
            dirty: HashSet::new(),
            cartridge: None,
            vic: Vic::new(),
            sid: Sid::new(),
            cia1: Cia::new("CIA1", true),
            cia2: Cia::new("CIA2", false),
            drive: Drive::new(),
            nmi_pending: false,
            irq_line: false,
        }
    }

    /// One cycle of peripheral work: VIC beam, both CIA timers, interrupt
    /// line aggregation. Returns the CPU cycles stolen by a badline entry.
    pub fn tick_devices(&mut self) -> u32 {
        let stolen = {
            let view = VicMemView {
                ram: &self.ram,
                color: &self.color_ram,
                chargen: &self.char_rom,
            };
            self.vic.tick(&view)
        };
        self.cia1.tick();
        if self.cia2.tick() {
            self.nmi_pending = true;
        }
        self.irq_line = self.vic.irq_asserted() || self.cia1.irq_asserted();
        stolen
    }

    /// Edge consume of the pending NMI.
    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_pending)
    }

    /// Level view of the aggregated IRQ line.
    pub fn irq_line(&self) -> bool {
        self.irq_line
    }

    pub fn drive_attached(&self) -> bool {
        self.drive.is_attached()
    }

    /// Little-endian word read (vectors, pointers).
    pub fn read_word(&mut self, addr: u16) -> u16 {
        let lo = self.read(addr) as u16;
        let hi = self.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    /// Write a PRG image into memory; returns its load address.
    pub fn load_prg(&mut self, bytes: &[u8]) -> Option<u16> {
        let (load, payload) = parse_prg(bytes)?;
        for (i, &b) in payload.iter().enumerate() {
            self.write(load.wrapping_add(i as u16), b);
        }
        info!("loaded PRG: {} bytes at ${load:04X}", payload.len());
        Some(load)
    }

    pub fn attach_cartridge(&mut self, cart: Cartridge) {
        self.cartridge = Some(cart);
    }

    pub fn attach_disk(&mut self, image: Vec<u8>) {
        self.drive.attach(image);
    }

    pub fn set_key(&mut self, key: Key, pressed: bool) {
        let (row, col) = key.matrix();
        self.cia1.set_key(row, col, pressed);
    }

    pub fn set_joystick(&mut self, input: JoyInput, pressed: bool) {
        self.cia1.set_joystick(input.bit(), pressed);
    }

    /// Raw RAM view for hosts and tests; bypasses banking.
    pub fn ram(&self) -> &[u8] {
        &self.ram[..]
    }

    /// Direct RAM store that still feeds the dirty set. Used by hosts and
    /// tests installing data underneath whatever is currently banked in.
    pub fn poke_ram(&mut self, addr: u16, data: u8) {
        self.ram[addr as usize] = data;
        self.dirty.insert(addr);
    }

    pub fn processor_port(&self) -> u8 {
        self.processor_port
    }
}

/// Read-only view the VIC fetches through. Borrowing the backing arrays
/// directly keeps the VIC tick free of a second mutable borrow of the bus.
pub struct VicMemView<'a> {
    ram: &'a [u8; 0x10000],
    color: &'a [u8; 0x0400],
    chargen: &'a [u8; 0x1000],
}

impl VicBus for VicMemView<'_> {
    fn read(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    fn color(&self, index: u16) -> u8 {
        self.color[(index & 0x03FF) as usize] & 0x0F
    }

    fn char_rom(&self, offset: u16) -> u8 {
        self.chargen[(offset & 0x0FFF) as usize]
    }
}
