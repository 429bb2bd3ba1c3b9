/*!
Shared builders for tests: a synthetic ROM set with known vectors and
machines with a program installed at a fixed RAM base.

The test KERNAL is all zeros except for the three vectors:
- reset -> `PROGRAM_BASE` ($0400, the default screen page, reused as
  program space since the test VIC keeps its display off)
- IRQ/BRK -> `IRQ_HANDLER` ($0500)
- NMI -> `NMI_HANDLER` ($0600)

Handlers are plain RAM; tests poke in whatever bytes they need.
*/

use crate::bus::Bus;
use crate::cpu::Cpu;
use crate::machine::C64;
use crate::rom::{KERNAL_ROM_SIZE, RomSet};

pub const PROGRAM_BASE: u16 = 0x0400;
pub const IRQ_HANDLER: u16 = 0x0500;
pub const NMI_HANDLER: u16 = 0x0600;

/// Zero ROMs with the reset/IRQ/NMI vectors wired for tests.
pub fn test_roms() -> RomSet {
    let mut kernal = vec![0u8; KERNAL_ROM_SIZE];
    let mut set_vector = |addr: usize, target: u16| {
        kernal[addr] = (target & 0xFF) as u8;
        kernal[addr + 1] = (target >> 8) as u8;
    };
    set_vector(0x1FFA, NMI_HANDLER); // $FFFA
    set_vector(0x1FFC, PROGRAM_BASE); // $FFFC
    set_vector(0x1FFE, IRQ_HANDLER); // $FFFE
    RomSet::from_bytes(&[], &kernal, &[])
}

/// CPU + bus with `program` installed at `PROGRAM_BASE` and PC reset there.
pub fn bus_with_program(program: &[u8]) -> (Cpu, Bus) {
    let mut bus = Bus::new(test_roms());
    for (i, &b) in program.iter().enumerate() {
        bus.poke_ram(PROGRAM_BASE + i as u16, b);
    }
    let mut cpu = Cpu::new();
    cpu.reset(&mut bus);
    (cpu, bus)
}

/// Full machine with `program` installed and the CPU reset onto it.
pub fn machine_with_program(program: &[u8]) -> C64 {
    let mut c64 = C64::new(test_roms());
    for (i, &b) in program.iter().enumerate() {
        c64.bus.poke_ram(PROGRAM_BASE + i as u16, b);
    }
    c64.reset();
    c64
}
