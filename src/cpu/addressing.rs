/*!
Operand resolution for every addressing mode.

Resolution consumes operand bytes at PC (advancing it) and produces either
an immediate value or an effective address, plus whether indexing crossed a
page boundary (the dispatcher charges the extra cycle for modes the decode
table marks). All zero-page arithmetic wraps inside the page; absolute
arithmetic wraps at 16 bits.

JMP `($XXFF)` reproduces the NMOS wrap bug: the high byte of the target is
fetched from `$XX00` instead of the next page.
*/

use crate::bus::Bus;
use crate::cpu::state::CpuState;
use crate::cpu::table::AddrMode;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Implied,
    Accumulator,
    Immediate(u8),
    Address(u16),
}

#[derive(Copy, Clone, Debug)]
pub struct Resolved {
    pub operand: Operand,
    pub page_crossed: bool,
}

impl Resolved {
    fn plain(operand: Operand) -> Self {
        Self { operand, page_crossed: false }
    }
}

/// Little-endian word read from the zero page, wrapping inside it.
fn read_word_zp(bus: &mut Bus, ptr: u8) -> u16 {
    let lo = bus.read(ptr as u16) as u16;
    let hi = bus.read(ptr.wrapping_add(1) as u16) as u16;
    (hi << 8) | lo
}

/// Word read with the indirect-JMP page-wrap bug.
fn read_word_page_bug(bus: &mut Bus, addr: u16) -> u16 {
    let lo = bus.read(addr) as u16;
    let hi_addr = (addr & 0xFF00) | (addr.wrapping_add(1) & 0x00FF);
    let hi = bus.read(hi_addr) as u16;
    (hi << 8) | lo
}

#[inline]
fn crossed(base: u16, effective: u16) -> bool {
    base & 0xFF00 != effective & 0xFF00
}

pub fn resolve(state: &mut CpuState, bus: &mut Bus, mode: AddrMode) -> Resolved {
    match mode {
        AddrMode::Implied => Resolved::plain(Operand::Implied),
        AddrMode::Accumulator => Resolved::plain(Operand::Accumulator),
        // Branch displacements resolve as immediates too.
        AddrMode::Immediate | AddrMode::Relative => {
            let v = state.fetch_u8(bus);
            Resolved::plain(Operand::Immediate(v))
        }
        AddrMode::ZeroPage => {
            let a = state.fetch_u8(bus) as u16;
            Resolved::plain(Operand::Address(a))
        }
        AddrMode::ZeroPageX => {
            let a = state.fetch_u8(bus).wrapping_add(state.x) as u16;
            Resolved::plain(Operand::Address(a))
        }
        AddrMode::ZeroPageY => {
            let a = state.fetch_u8(bus).wrapping_add(state.y) as u16;
            Resolved::plain(Operand::Address(a))
        }
        AddrMode::Absolute => {
            let a = state.fetch_u16(bus);
            Resolved::plain(Operand::Address(a))
        }
        AddrMode::AbsoluteX => {
            let base = state.fetch_u16(bus);
            let a = base.wrapping_add(state.x as u16);
            Resolved { operand: Operand::Address(a), page_crossed: crossed(base, a) }
        }
        AddrMode::AbsoluteY => {
            let base = state.fetch_u16(bus);
            let a = base.wrapping_add(state.y as u16);
            Resolved { operand: Operand::Address(a), page_crossed: crossed(base, a) }
        }
        AddrMode::Indirect => {
            let ptr = state.fetch_u16(bus);
            let a = read_word_page_bug(bus, ptr);
            Resolved::plain(Operand::Address(a))
        }
        AddrMode::IndirectX => {
            let zp = state.fetch_u8(bus).wrapping_add(state.x);
            let a = read_word_zp(bus, zp);
            Resolved::plain(Operand::Address(a))
        }
        AddrMode::IndirectY => {
            let zp = state.fetch_u8(bus);
            let base = read_word_zp(bus, zp);
            let a = base.wrapping_add(state.y as u16);
            Resolved { operand: Operand::Address(a), page_crossed: crossed(base, a) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::RomSet;

    fn setup(bytes: &[(u16, u8)]) -> (CpuState, Bus) {
        let mut bus = Bus::new(RomSet::empty());
        for &(addr, val) in bytes {
            bus.poke_ram(addr, val);
        }
        let mut state = CpuState::new();
        state.pc = 0x0400;
        (state, bus)
    }

    #[test]
    fn zero_page_indexing_wraps_in_page() {
        let (mut state, mut bus) = setup(&[(0x0400, 0xF0)]);
        state.x = 0x20;
        let r = resolve(&mut state, &mut bus, AddrMode::ZeroPageX);
        assert_eq!(r.operand, Operand::Address(0x0010));
        assert_eq!(state.pc, 0x0401);
    }

    #[test]
    fn absolute_x_reports_page_cross() {
        let (mut state, mut bus) = setup(&[(0x0400, 0xFF), (0x0401, 0x12)]);
        state.x = 0x01;
        let r = resolve(&mut state, &mut bus, AddrMode::AbsoluteX);
        assert_eq!(r.operand, Operand::Address(0x1300));
        assert!(r.page_crossed);

        let (mut state, mut bus) = setup(&[(0x0400, 0x00), (0x0401, 0x12)]);
        state.x = 0x01;
        let r = resolve(&mut state, &mut bus, AddrMode::AbsoluteX);
        assert_eq!(r.operand, Operand::Address(0x1201));
        assert!(!r.page_crossed);
    }

    #[test]
    fn indirect_jmp_page_wrap_bug() {
        let (mut state, mut bus) = setup(&[
            (0x0400, 0xFF),
            (0x0401, 0x02), // pointer $02FF
            (0x02FF, 0x34),
            (0x0200, 0x12), // high byte from $0200, not $0300
        ]);
        let r = resolve(&mut state, &mut bus, AddrMode::Indirect);
        assert_eq!(r.operand, Operand::Address(0x1234));
    }

    #[test]
    fn indirect_x_pre_indexes_with_wrap() {
        let (mut state, mut bus) = setup(&[
            (0x0400, 0xFE),
            (0x00FF, 0x78), // ($FE + $01) = $FF -> lo
            (0x0000, 0x56), // hi wraps to $00
        ]);
        state.x = 0x01;
        let r = resolve(&mut state, &mut bus, AddrMode::IndirectX);
        assert_eq!(r.operand, Operand::Address(0x5678));
    }

    #[test]
    fn indirect_y_post_indexes_and_flags_cross() {
        let (mut state, mut bus) = setup(&[
            (0x0400, 0x20),
            (0x0020, 0xFF),
            (0x0021, 0x10), // base $10FF
        ]);
        state.y = 0x01;
        let r = resolve(&mut state, &mut bus, AddrMode::IndirectY);
        assert_eq!(r.operand, Operand::Address(0x1100));
        assert!(r.page_crossed);
    }
}
