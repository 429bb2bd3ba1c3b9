/*!
KERNAL LOAD/SAVE traps for the high-level drive.

The CPU checks these vectors at its pre-fetch gate (only while a disk image
is attached). A hit performs the whole operation in host code and returns
control as if the caller's JSR had completed: carry clear on success, carry
set on failure, PC pulled from the stack RTS-style.

Zero-page protocol (what the KERNAL's own LOAD/SAVE consume):
- $B8: filename length, $BB/$BC: filename pointer (PETSCII).
- SAVE range: start at $2B/$2C, end (exclusive) at $2D/$2E.
*/

use log::{debug, warn};

use crate::bus::Bus;
use crate::cpu::Cpu;
use crate::cpu::state::CARRY;
use crate::drive::petscii_to_ascii;

pub const LOAD_TRAP: u16 = 0xFFD5;
pub const SAVE_TRAP: u16 = 0xFFD8;

const FILENAME_LEN: u16 = 0x00B8;
const FILENAME_PTR: u16 = 0x00BB;
const SAVE_START_PTR: u16 = 0x002B;
const SAVE_END_PTR: u16 = 0x002D;

fn read_filename(bus: &mut Bus) -> String {
    let len = bus.read(FILENAME_LEN) as u16;
    let ptr = bus.read_word(FILENAME_PTR);
    (0..len)
        .map(|i| petscii_to_ascii(bus.read(ptr.wrapping_add(i))))
        .collect()
}

pub(crate) fn load(cpu: &mut Cpu, bus: &mut Bus) {
    let name = read_filename(bus);
    let success = match bus.drive.load(&name) {
        Some(data) if data.len() >= 2 => {
            // PRG header: the first two bytes are the load address.
            let addr = u16::from_le_bytes([data[0], data[1]]);
            for (i, &b) in data[2..].iter().enumerate() {
                bus.write(addr.wrapping_add(i as u16), b);
            }
            debug!("LOAD \"{name}\": {} bytes to ${addr:04X}", data.len() - 2);
            true
        }
        _ => {
            warn!("LOAD \"{name}\": file not found");
            false
        }
    };
    finish(cpu, bus, success);
}

pub(crate) fn save(cpu: &mut Cpu, bus: &mut Bus) {
    let name = read_filename(bus);
    let start = bus.read_word(SAVE_START_PTR);
    let end = bus.read_word(SAVE_END_PTR);
    let mut data = Vec::with_capacity(2 + end.saturating_sub(start) as usize);
    data.extend_from_slice(&start.to_le_bytes());
    let mut addr = start;
    while addr < end {
        data.push(bus.read(addr));
        addr = addr.wrapping_add(1);
    }
    debug!("SAVE \"{name}\": ${start:04X}..${end:04X}");
    let success = bus.drive.save(&name, &data);
    finish(cpu, bus, success);
}

/// Complete the trapped subroutine: carry reports the outcome, PC returns
/// past the caller's JSR.
fn finish(cpu: &mut Cpu, bus: &mut Bus, success: bool) {
    cpu.state.assign_flag(CARRY, !success);
    let ret = cpu.state.pop_u16(bus);
    cpu.state.pc = ret.wrapping_add(1);
}
