/*!
Instruction semantics: the dispatcher plus the ALU helpers it leans on.

`dispatch` is called once per instruction, after the opcode byte has been
consumed. It resolves the operand for the decode-table mode (advancing PC
past the operand bytes), applies the instruction's full effect, and returns
the extra cycles beyond the table's base cost: the page-cross penalty for
marked rows, +1 for a taken branch and +1 more when the branch crosses a
page.

Decimal mode is implemented for ADC and SBC with the nibble-carry
correction scheme; carry and the BCD-corrected result are exact, N follows
the corrected result and V is left untouched (NMOS decimal-mode N/V are not
modeled precisely).
*/

use crate::bus::Bus;
use crate::cpu::addressing::{Operand, Resolved, resolve};
use crate::cpu::state::{CARRY, CpuState, DECIMAL, IRQ_DISABLE, NEGATIVE, OVERFLOW, ZERO};
use crate::cpu::table::{Op, OpInfo};
use crate::cpu::IRQ_VECTOR;

pub(crate) fn dispatch(state: &mut CpuState, bus: &mut Bus, info: &OpInfo) -> u32 {
    let resolved = resolve(state, bus, info.mode);
    let mut extra = u32::from(info.page_penalty && resolved.page_crossed);

    match info.op {
        // Loads / stores
        Op::Lda => {
            state.a = value(state, bus, &resolved);
            state.update_zn(state.a);
        }
        Op::Ldx => {
            state.x = value(state, bus, &resolved);
            state.update_zn(state.x);
        }
        Op::Ldy => {
            state.y = value(state, bus, &resolved);
            state.update_zn(state.y);
        }
        Op::Sta => store(bus, &resolved, state.a),
        Op::Stx => store(bus, &resolved, state.x),
        Op::Sty => store(bus, &resolved, state.y),

        // Transfers
        Op::Tax => {
            state.x = state.a;
            state.update_zn(state.x);
        }
        Op::Tay => {
            state.y = state.a;
            state.update_zn(state.y);
        }
        Op::Txa => {
            state.a = state.x;
            state.update_zn(state.a);
        }
        Op::Tya => {
            state.a = state.y;
            state.update_zn(state.a);
        }
        Op::Tsx => {
            state.x = state.sp;
            state.update_zn(state.x);
        }
        Op::Txs => state.sp = state.x, // flags unaffected

        // Stack
        Op::Pha => {
            let a = state.a;
            state.push_u8(bus, a);
        }
        Op::Pla => {
            state.a = state.pop_u8(bus);
            state.update_zn(state.a);
        }
        Op::Php => {
            let v = state.compose_status_for_push(true);
            state.push_u8(bus, v);
        }
        Op::Plp => {
            let v = state.pop_u8(bus);
            state.set_status_from_pull(v);
        }

        // Arithmetic
        Op::Adc => {
            let v = value(state, bus, &resolved);
            adc(state, v);
        }
        Op::Sbc => {
            let v = value(state, bus, &resolved);
            sbc(state, v);
        }
        Op::Cmp => {
            let v = value(state, bus, &resolved);
            compare(state, state.a, v);
        }
        Op::Cpx => {
            let v = value(state, bus, &resolved);
            compare(state, state.x, v);
        }
        Op::Cpy => {
            let v = value(state, bus, &resolved);
            compare(state, state.y, v);
        }

        // Logic
        Op::And => {
            state.a &= value(state, bus, &resolved);
            state.update_zn(state.a);
        }
        Op::Ora => {
            state.a |= value(state, bus, &resolved);
            state.update_zn(state.a);
        }
        Op::Eor => {
            state.a ^= value(state, bus, &resolved);
            state.update_zn(state.a);
        }
        Op::Bit => {
            let v = value(state, bus, &resolved);
            state.assign_flag(ZERO, state.a & v == 0);
            state.assign_flag(NEGATIVE, v & 0x80 != 0);
            state.assign_flag(OVERFLOW, v & 0x40 != 0);
        }

        // Read-modify-write
        Op::Inc => {
            let r = rmw(state, bus, &resolved, |_, v| v.wrapping_add(1));
            state.update_zn(r);
        }
        Op::Dec => {
            let r = rmw(state, bus, &resolved, |_, v| v.wrapping_sub(1));
            state.update_zn(r);
        }
        Op::Asl => {
            let r = rmw(state, bus, &resolved, |s, v| {
                s.assign_flag(CARRY, v & 0x80 != 0);
                v << 1
            });
            state.update_zn(r);
        }
        Op::Lsr => {
            let r = rmw(state, bus, &resolved, |s, v| {
                s.assign_flag(CARRY, v & 0x01 != 0);
                v >> 1
            });
            state.update_zn(r);
        }
        Op::Rol => {
            let r = rmw(state, bus, &resolved, |s, v| {
                let carry_in = s.is_flag_set(CARRY) as u8;
                s.assign_flag(CARRY, v & 0x80 != 0);
                (v << 1) | carry_in
            });
            state.update_zn(r);
        }
        Op::Ror => {
            let r = rmw(state, bus, &resolved, |s, v| {
                let carry_in = (s.is_flag_set(CARRY) as u8) << 7;
                s.assign_flag(CARRY, v & 0x01 != 0);
                (v >> 1) | carry_in
            });
            state.update_zn(r);
        }

        // Register counters
        Op::Inx => {
            state.x = state.x.wrapping_add(1);
            state.update_zn(state.x);
        }
        Op::Iny => {
            state.y = state.y.wrapping_add(1);
            state.update_zn(state.y);
        }
        Op::Dex => {
            state.x = state.x.wrapping_sub(1);
            state.update_zn(state.x);
        }
        Op::Dey => {
            state.y = state.y.wrapping_sub(1);
            state.update_zn(state.y);
        }

        // Flags
        Op::Clc => state.assign_flag(CARRY, false),
        Op::Sec => state.assign_flag(CARRY, true),
        Op::Cli => state.assign_flag(IRQ_DISABLE, false),
        Op::Sei => state.assign_flag(IRQ_DISABLE, true),
        Op::Clv => state.assign_flag(OVERFLOW, false),
        Op::Cld => state.assign_flag(DECIMAL, false),
        Op::Sed => state.assign_flag(DECIMAL, true),

        // Branches
        Op::Bpl => extra += branch(state, &resolved, !state.is_flag_set(NEGATIVE)),
        Op::Bmi => extra += branch(state, &resolved, state.is_flag_set(NEGATIVE)),
        Op::Bvc => extra += branch(state, &resolved, !state.is_flag_set(OVERFLOW)),
        Op::Bvs => extra += branch(state, &resolved, state.is_flag_set(OVERFLOW)),
        Op::Bcc => extra += branch(state, &resolved, !state.is_flag_set(CARRY)),
        Op::Bcs => extra += branch(state, &resolved, state.is_flag_set(CARRY)),
        Op::Bne => extra += branch(state, &resolved, !state.is_flag_set(ZERO)),
        Op::Beq => extra += branch(state, &resolved, state.is_flag_set(ZERO)),

        // Control flow
        Op::Jmp => {
            if let Operand::Address(a) = resolved.operand {
                state.pc = a;
            }
        }
        Op::Jsr => {
            if let Operand::Address(a) = resolved.operand {
                let ret = state.pc.wrapping_sub(1);
                state.push_u16(bus, ret);
                state.pc = a;
            }
        }
        Op::Rts => {
            state.pc = state.pop_u16(bus).wrapping_add(1);
        }
        Op::Brk => {
            // PC is one past the opcode; the pad byte is skipped on return.
            let ret = state.pc.wrapping_add(1);
            state.push_u16(bus, ret);
            let status = state.compose_status_for_push(true);
            state.push_u8(bus, status);
            state.assign_flag(IRQ_DISABLE, true);
            state.pc = bus.read_word(IRQ_VECTOR);
        }
        Op::Rti => {
            let status = state.pop_u8(bus);
            state.set_status_from_pull(status);
            state.pc = state.pop_u16(bus);
        }
        Op::Nop => {}

        // Undocumented
        Op::Slo => {
            let r = rmw(state, bus, &resolved, |s, v| {
                s.assign_flag(CARRY, v & 0x80 != 0);
                v << 1
            });
            state.a |= r;
            state.update_zn(state.a);
        }
        Op::Rla => {
            let r = rmw(state, bus, &resolved, |s, v| {
                let carry_in = s.is_flag_set(CARRY) as u8;
                s.assign_flag(CARRY, v & 0x80 != 0);
                (v << 1) | carry_in
            });
            state.a &= r;
            state.update_zn(state.a);
        }
        Op::Sax => store(bus, &resolved, state.a & state.x),
        Op::Lax => {
            let v = value(state, bus, &resolved);
            state.a = v;
            state.x = v;
            state.update_zn(v);
        }
        Op::Dcp => {
            let r = rmw(state, bus, &resolved, |_, v| v.wrapping_sub(1));
            compare(state, state.a, r);
        }

        Op::Jam => unreachable!("jam opcodes are rejected before dispatch"),
    }

    extra
}

fn value(state: &CpuState, bus: &mut Bus, resolved: &Resolved) -> u8 {
    match resolved.operand {
        Operand::Immediate(v) => v,
        Operand::Address(a) => bus.read(a),
        Operand::Accumulator => state.a,
        Operand::Implied => 0,
    }
}

fn store(bus: &mut Bus, resolved: &Resolved, value: u8) {
    if let Operand::Address(a) = resolved.operand {
        bus.write(a, value);
    }
}

/// Read-modify-write through either the accumulator or memory.
fn rmw(
    state: &mut CpuState,
    bus: &mut Bus,
    resolved: &Resolved,
    transform: impl FnOnce(&mut CpuState, u8) -> u8,
) -> u8 {
    match resolved.operand {
        Operand::Accumulator => {
            let r = transform(state, state.a);
            state.a = r;
            r
        }
        Operand::Address(a) => {
            let v = bus.read(a);
            let r = transform(state, v);
            bus.write(a, r);
            r
        }
        _ => 0,
    }
}

fn compare(state: &mut CpuState, register: u8, v: u8) {
    state.assign_flag(CARRY, register >= v);
    state.update_zn(register.wrapping_sub(v));
}

/// Taken branches cost one extra cycle, two when crossing a page.
fn branch(state: &mut CpuState, resolved: &Resolved, take: bool) -> u32 {
    let Operand::Immediate(offset) = resolved.operand else {
        return 0;
    };
    if !take {
        return 0;
    }
    let old = state.pc;
    state.pc = old.wrapping_add(offset as i8 as u16);
    if old & 0xFF00 != state.pc & 0xFF00 { 2 } else { 1 }
}

pub(crate) fn adc(state: &mut CpuState, v: u8) {
    if state.is_flag_set(DECIMAL) {
        adc_decimal(state, v);
    } else {
        adc_binary(state, v);
    }
}

pub(crate) fn sbc(state: &mut CpuState, v: u8) {
    if state.is_flag_set(DECIMAL) {
        sbc_decimal(state, v);
    } else {
        sbc_binary(state, v);
    }
}

fn adc_binary(state: &mut CpuState, v: u8) {
    let a = state.a;
    let sum = a as u16 + v as u16 + state.is_flag_set(CARRY) as u16;
    let result = sum as u8;
    state.assign_flag(CARRY, sum > 0xFF);
    state.assign_flag(OVERFLOW, (!(a ^ v) & (a ^ result)) & 0x80 != 0);
    state.a = result;
    state.update_zn(result);
}

fn sbc_binary(state: &mut CpuState, v: u8) {
    let a = state.a;
    let borrow = !state.is_flag_set(CARRY) as i16;
    let diff = a as i16 - v as i16 - borrow;
    let result = diff as u8;
    state.assign_flag(CARRY, diff >= 0);
    state.assign_flag(OVERFLOW, ((a ^ v) & (a ^ result)) & 0x80 != 0);
    state.a = result;
    state.update_zn(result);
}

fn adc_decimal(state: &mut CpuState, v: u8) {
    let a = state.a;
    let mut low = (a & 0x0F) as u16 + (v & 0x0F) as u16 + state.is_flag_set(CARRY) as u16;
    let mut high = (a >> 4) as u16 + (v >> 4) as u16;
    if low > 9 {
        low += 6;
    }
    if low > 0x0F {
        high += 1;
    }
    if high > 9 {
        high += 6;
    }
    state.assign_flag(CARRY, high > 0x0F);
    let result = (((high & 0x0F) << 4) | (low & 0x0F)) as u8;
    state.a = result;
    state.update_zn(result);
}

fn sbc_decimal(state: &mut CpuState, v: u8) {
    let a = state.a;
    let borrow = !state.is_flag_set(CARRY) as i16;
    let mut low = (a & 0x0F) as i16 - (v & 0x0F) as i16 - borrow;
    let mut high = (a >> 4) as i16 - (v >> 4) as i16;
    if low < 0 {
        low -= 6;
        high -= 1;
    }
    if high < 0 {
        high -= 6;
    }
    state.assign_flag(CARRY, high >= 0);
    let result = (((high as u8) & 0x0F) << 4) | ((low as u8) & 0x0F);
    state.a = result;
    state.update_zn(result);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(a: u8, carry: bool, decimal: bool) -> CpuState {
        let mut s = CpuState::new();
        s.a = a;
        s.assign_flag(CARRY, carry);
        s.assign_flag(DECIMAL, decimal);
        s
    }

    #[test]
    fn binary_adc_overflow_and_carry() {
        let mut s = state_with(0x50, false, false);
        adc(&mut s, 0x50);
        assert_eq!(s.a, 0xA0);
        assert!(s.is_flag_set(OVERFLOW));
        assert!(!s.is_flag_set(CARRY));

        let mut s = state_with(0xFF, true, false);
        adc(&mut s, 0x00);
        assert_eq!(s.a, 0x00);
        assert!(s.is_flag_set(CARRY));
        assert!(s.is_flag_set(ZERO));
    }

    #[test]
    fn decimal_adc_matches_bcd_semantics() {
        // $99 + $01 + carry-in = $01 with carry out.
        let mut s = state_with(0x99, true, true);
        adc(&mut s, 0x01);
        assert_eq!(s.a, 0x01);
        assert!(s.is_flag_set(CARRY));

        // $12 + $34 = $46, no carry.
        let mut s = state_with(0x12, false, true);
        adc(&mut s, 0x34);
        assert_eq!(s.a, 0x46);
        assert!(!s.is_flag_set(CARRY));

        // $58 + $46 = $104 -> $04 carry set.
        let mut s = state_with(0x58, false, true);
        adc(&mut s, 0x46);
        assert_eq!(s.a, 0x04);
        assert!(s.is_flag_set(CARRY));
    }

    #[test]
    fn binary_sbc_sets_overflow_on_signed_wrap() {
        // $50 - $B0 = $A0: 80 - (-80) overflows the signed range.
        let mut s = state_with(0x50, true, false);
        sbc(&mut s, 0xB0);
        assert_eq!(s.a, 0xA0);
        assert!(s.is_flag_set(OVERFLOW));
        assert!(!s.is_flag_set(CARRY)); // borrow taken

        let mut s = state_with(0x50, true, false);
        sbc(&mut s, 0x10);
        assert_eq!(s.a, 0x40);
        assert!(!s.is_flag_set(OVERFLOW));
        assert!(s.is_flag_set(CARRY));
    }

    #[test]
    fn decimal_sbc_borrows_through_nibbles() {
        // $42 - $13 = $29.
        let mut s = state_with(0x42, true, true);
        sbc(&mut s, 0x13);
        assert_eq!(s.a, 0x29);
        assert!(s.is_flag_set(CARRY));

        // $10 - $20 wraps with borrow: $90, carry clear.
        let mut s = state_with(0x10, true, true);
        sbc(&mut s, 0x20);
        assert_eq!(s.a, 0x90);
        assert!(!s.is_flag_set(CARRY));
    }
}
