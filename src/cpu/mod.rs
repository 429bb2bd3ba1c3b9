/*!
MOS 6510 CPU core.

Submodules
- state.rs: architectural registers, flags, stack helpers
- table.rs: static 256-entry decode table
- addressing.rs: operand resolution per mode
- execute.rs: instruction semantics and cycle penalties
- kernal.rs: LOAD/SAVE high-level traps

Timing model: an instruction's cost is amortized across ticks. The fetch
tick applies the complete instruction effect and charges
`base + penalties - 1` into `cycles_remaining`; the remaining ticks only
count down. Every tick first advances the peripherals through the bus, in
the fixed order the machine depends on: VIC beam, badline accounting, CIA1,
CIA2, then NMI before IRQ at the pre-fetch gate, then the KERNAL traps,
then instruction progress.

Badlines stall the CPU: entering one adds 40 cycles to both
`cycles_remaining` and `total_cycles`, so the cycle-sum bookkeeping
(base + branch penalties + page-cross penalties + badline thefts) stays
exact.
*/

pub mod addressing;
mod execute;
pub mod kernal;
pub mod state;
pub mod table;

use std::collections::HashSet;

use log::{error, trace, warn};
use serde::{Deserialize, Serialize};

use crate::bus::Bus;
use crate::errors::EmuError;
use state::{CpuState, IRQ_DISABLE};
use table::{DECODE, Op};

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Cycles consumed by servicing a hardware interrupt.
const INTERRUPT_CYCLES: u32 = 7;

pub struct Cpu {
    pub state: CpuState,
    /// Ticks left before the current instruction retires.
    pub cycles_remaining: u32,
    pub total_cycles: u64,
    pub irq_pending: bool,
    pub nmi_pending: bool,
    /// Addresses that halt the CPU at the pre-fetch gate (debug hook).
    pub breakpoints: HashSet<u16>,
    /// Log each dispatched instruction at trace level.
    pub trace: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            state: CpuState::new(),
            cycles_remaining: 0,
            total_cycles: 0,
            irq_pending: false,
            nmi_pending: false,
            breakpoints: HashSet::new(),
            trace: false,
        }
    }

    /// Reset registers and load PC from the reset vector.
    pub fn reset(&mut self, bus: &mut Bus) {
        self.state = CpuState::new();
        self.state.pc = bus.read_word(RESET_VECTOR);
        self.cycles_remaining = 0;
        self.total_cycles = 0;
        self.irq_pending = false;
        self.nmi_pending = false;
    }

    /// Request an IRQ (level; honored while the I flag is clear).
    pub fn irq(&mut self) {
        self.irq_pending = true;
    }

    /// Request an NMI (edge; always honored at the next pre-fetch gate).
    pub fn nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Advance the machine by one clock cycle.
    pub fn tick(&mut self, bus: &mut Bus) -> Result<(), EmuError> {
        // (1)-(4): beam, cycle theft, both CIA timers, line aggregation.
        let stolen = bus.tick_devices();
        if stolen > 0 {
            self.cycles_remaining += stolen;
            self.total_cycles += stolen as u64;
        }
        if bus.take_nmi() {
            self.nmi_pending = true;
        }

        // Mid-instruction: this tick is part of the stall budget.
        if self.cycles_remaining > 0 {
            self.cycles_remaining -= 1;
            return Ok(());
        }

        // A halted CPU stays halted; not even interrupts revive it.
        if self.state.halted {
            return Ok(());
        }

        // Pre-fetch gate. NMI outranks IRQ within the same cycle.
        if self.nmi_pending {
            self.nmi_pending = false;
            self.service_interrupt(bus, NMI_VECTOR);
            return Ok(());
        }
        // IRQ is level-sensitive on the wire; `irq_pending` additionally
        // carries one-shot requests made through [`Cpu::irq`].
        if (self.irq_pending || bus.irq_line()) && !self.state.is_flag_set(IRQ_DISABLE) {
            self.irq_pending = false;
            self.service_interrupt(bus, IRQ_VECTOR);
            return Ok(());
        }

        if bus.drive_attached() {
            match self.state.pc {
                kernal::LOAD_TRAP => {
                    kernal::load(self, bus);
                    return Ok(());
                }
                kernal::SAVE_TRAP => {
                    kernal::save(self, bus);
                    return Ok(());
                }
                _ => {}
            }
        }

        if self.breakpoints.contains(&self.state.pc) {
            warn!("breakpoint hit at ${:04X}; CPU halted", self.state.pc);
            self.state.halt();
            return Ok(());
        }

        // Fetch, decode, execute.
        let pc = self.state.pc;
        let opcode = bus.read(pc);
        let info = &DECODE[opcode as usize];
        if matches!(info.op, Op::Jam) {
            error!("unknown opcode ${opcode:02X} at ${pc:04X}; CPU halted");
            self.state.halt();
            return Err(EmuError::UnknownOpcode { opcode, pc });
        }

        self.state.advance_pc(1);
        let extra = execute::dispatch(&mut self.state, bus, info);
        let cycles = info.cycles as u32 + extra;
        if self.trace {
            trace!(
                "${pc:04X} {:?} a={:02X} x={:02X} y={:02X} sp={:02X} p={:02X}",
                info.op, self.state.a, self.state.x, self.state.y, self.state.sp,
                self.state.status
            );
        }
        self.total_cycles += cycles as u64;
        self.cycles_remaining = cycles - 1;
        Ok(())
    }

    /// Push PC and status (B clear), mask interrupts, vector.
    fn service_interrupt(&mut self, bus: &mut Bus, vector: u16) {
        let pc = self.state.pc;
        self.state.push_u16(bus, pc);
        let status = self.state.compose_status_for_push(false);
        self.state.push_u8(bus, status);
        self.state.assign_flag(IRQ_DISABLE, true);
        self.state.pc = bus.read_word(vector);
        self.total_cycles += INTERRUPT_CYCLES as u64;
        self.cycles_remaining = INTERRUPT_CYCLES - 1;
    }

    /// Tick until the in-flight work retires; returns the tick count.
    pub fn step(&mut self, bus: &mut Bus) -> Result<u32, EmuError> {
        let mut ticks = 0;
        loop {
            self.tick(bus)?;
            ticks += 1;
            if self.cycles_remaining == 0 {
                return Ok(ticks);
            }
        }
    }

    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            state: self.state,
            cycles_remaining: self.cycles_remaining,
            total_cycles: self.total_cycles,
            irq_pending: self.irq_pending,
            nmi_pending: self.nmi_pending,
        }
    }

    pub fn restore(&mut self, snap: &CpuSnapshot) {
        self.state = snap.state;
        self.cycles_remaining = snap.cycles_remaining;
        self.total_cycles = snap.total_cycles;
        self.irq_pending = snap.irq_pending;
        self.nmi_pending = snap.nmi_pending;
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub state: CpuState,
    pub cycles_remaining: u32,
    pub total_cycles: u64,
    pub irq_pending: bool,
    pub nmi_pending: bool,
}

#[cfg(test)]
mod tests {
    use super::state::{BREAK, CARRY, DECIMAL, IRQ_DISABLE, NEGATIVE, OVERFLOW, ZERO};
    use super::*;
    use crate::test_utils::{IRQ_HANDLER, PROGRAM_BASE, bus_with_program};

    #[test]
    fn reset_loads_the_vector() {
        let (cpu, _bus) = bus_with_program(&[0xEA]);
        assert_eq!(cpu.state.pc, PROGRAM_BASE);
    }

    #[test]
    fn lda_immediate_sets_flags() {
        let (mut cpu, mut bus) = bus_with_program(&[0xA9, 0x00, 0xA9, 0x80]);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.state.a, 0x00);
        assert!(cpu.state.is_flag_set(ZERO));
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.state.a, 0x80);
        assert!(cpu.state.is_flag_set(NEGATIVE));
    }

    #[test]
    fn sta_reaches_ram() {
        // LDA #$42; STA $1234
        let (mut cpu, mut bus) = bus_with_program(&[0xA9, 0x42, 0x8D, 0x34, 0x12]);
        cpu.step(&mut bus).unwrap();
        cpu.step(&mut bus).unwrap();
        assert_eq!(bus.ram()[0x1234], 0x42);
    }

    #[test]
    fn absolute_x_page_cross_costs_one_more() {
        // LDX #$00; LDA $12FF,X -> 4 cycles (no cross)
        let (mut cpu, mut bus) = bus_with_program(&[0xA2, 0x00, 0xBD, 0xFF, 0x12]);
        assert_eq!(cpu.step(&mut bus).unwrap(), 2);
        assert_eq!(cpu.step(&mut bus).unwrap(), 4);

        // LDX #$01; LDA $12FF,X -> 5 cycles (cross)
        let (mut cpu, mut bus) = bus_with_program(&[0xA2, 0x01, 0xBD, 0xFF, 0x12]);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.step(&mut bus).unwrap(), 5);
    }

    #[test]
    fn store_indexed_has_no_page_penalty() {
        // LDX #$01; STA $12FF,X -> always 5
        let (mut cpu, mut bus) = bus_with_program(&[0xA2, 0x01, 0x9D, 0xFF, 0x12]);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.step(&mut bus).unwrap(), 5);
    }

    #[test]
    fn branch_cycle_accounting() {
        // BNE not taken (Z set by LDA #$00): 2 cycles.
        let (mut cpu, mut bus) = bus_with_program(&[0xA9, 0x00, 0xD0, 0x10]);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.step(&mut bus).unwrap(), 2);

        // BEQ taken, same page: 3 cycles.
        let (mut cpu, mut bus) = bus_with_program(&[0xA9, 0x00, 0xF0, 0x10]);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.step(&mut bus).unwrap(), 3);
        assert_eq!(cpu.state.pc, PROGRAM_BASE + 4 + 0x10);

        // BEQ taken across a page: 4 cycles. The branch sits so that
        // PC after the operand is $04FE and the +4 target crosses to $0502.
        let mut program = vec![0xA9, 0x00]; // LDA #$00
        program.resize(0xFC, 0xEA); // NOP filler up to $04FC
        program.extend_from_slice(&[0xF0, 0x04]); // BEQ +4 at $04FC
        let (mut cpu, mut bus) = bus_with_program(&program);
        cpu.step(&mut bus).unwrap(); // LDA
        for _ in 0..0xFA {
            cpu.step(&mut bus).unwrap(); // NOP padding
        }
        assert_eq!(cpu.state.pc, PROGRAM_BASE + 0xFC);
        assert_eq!(cpu.step(&mut bus).unwrap(), 4);
        assert_eq!(cpu.state.pc, 0x0502);
    }

    #[test]
    fn jmp_indirect_honors_page_wrap_bug() {
        // JMP ($12FF) with pointer split across the page boundary.
        let (mut cpu, mut bus) = bus_with_program(&[0x6C, 0xFF, 0x12]);
        bus.poke_ram(0x12FF, 0x00);
        bus.poke_ram(0x1200, 0x06); // high byte from $1200, not $1300
        bus.poke_ram(0x1300, 0xAA);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.state.pc, 0x0600);
    }

    #[test]
    fn brk_pushes_pc_plus_two_and_vectors() {
        let (mut cpu, mut bus) = bus_with_program(&[0x00, 0xFF]);
        let sp0 = cpu.state.sp;
        assert_eq!(cpu.step(&mut bus).unwrap(), 7);
        assert_eq!(cpu.state.pc, IRQ_HANDLER);
        assert!(cpu.state.is_flag_set(IRQ_DISABLE));
        // Stack: status, then return address = BRK address + 2.
        let status = bus.ram()[0x0100 + cpu.state.sp as usize + 1];
        let lo = bus.ram()[0x0100 + cpu.state.sp as usize + 2] as u16;
        let hi = bus.ram()[0x0100 + cpu.state.sp as usize + 3] as u16;
        assert_ne!(status & BREAK, 0);
        assert_eq!((hi << 8) | lo, PROGRAM_BASE + 2);
        assert_eq!(cpu.state.sp, sp0.wrapping_sub(3));
    }

    #[test]
    fn jsr_rts_round_trip() {
        // JSR $0480; (at $0480: LDA #$05; RTS); then NOP.
        let mut program = vec![0x20, 0x80, 0x04, 0xEA];
        program.resize(0x80, 0x00);
        program.extend_from_slice(&[0xA9, 0x05, 0x60]);
        let (mut cpu, mut bus) = bus_with_program(&program);
        assert_eq!(cpu.step(&mut bus).unwrap(), 6); // JSR
        assert_eq!(cpu.state.pc, PROGRAM_BASE + 0x80);
        cpu.step(&mut bus).unwrap(); // LDA
        assert_eq!(cpu.step(&mut bus).unwrap(), 6); // RTS
        assert_eq!(cpu.state.pc, PROGRAM_BASE + 3);
        assert_eq!(cpu.state.a, 0x05);
    }

    #[test]
    fn irq_serviced_at_prefetch_with_b_clear() {
        // Handler at IRQ_HANDLER: RTI. Main program: CLI; NOP; NOP...
        let (mut cpu, mut bus) = bus_with_program(&[0x58, 0xEA, 0xEA, 0xEA]);
        bus.poke_ram(IRQ_HANDLER, 0x40); // RTI
        cpu.step(&mut bus).unwrap(); // CLI
        cpu.irq();
        let ticks = cpu.step(&mut bus).unwrap(); // interrupt entry
        assert_eq!(ticks, 7);
        assert_eq!(cpu.state.pc, IRQ_HANDLER);
        assert!(cpu.state.is_flag_set(IRQ_DISABLE));
        let pushed_status = bus.ram()[0x0100 + cpu.state.sp as usize + 1];
        assert_eq!(pushed_status & BREAK, 0);
        // RTI resumes the interrupted instruction stream.
        cpu.irq_pending = false;
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.state.pc, PROGRAM_BASE + 1);
        assert!(!cpu.state.is_flag_set(IRQ_DISABLE));
    }

    #[test]
    fn irq_masked_by_i_flag() {
        let (mut cpu, mut bus) = bus_with_program(&[0xEA, 0xEA]);
        // Power-on state has I set; the IRQ must wait.
        cpu.irq();
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.state.pc, PROGRAM_BASE + 1);
    }

    #[test]
    fn nmi_outranks_irq() {
        let (mut cpu, mut bus) = bus_with_program(&[0x58, 0xEA, 0xEA]);
        bus.poke_ram(IRQ_HANDLER, 0x40);
        cpu.step(&mut bus).unwrap(); // CLI
        cpu.irq();
        cpu.nmi();
        cpu.step(&mut bus).unwrap();
        // NMI vector in the test ROM points at the NMI handler address.
        assert_eq!(cpu.state.pc, crate::test_utils::NMI_HANDLER);
    }

    #[test]
    fn unknown_opcode_halts_with_location() {
        let (mut cpu, mut bus) = bus_with_program(&[0x02]);
        let err = cpu.tick(&mut bus).unwrap_err();
        match err {
            EmuError::UnknownOpcode { opcode, pc } => {
                assert_eq!(opcode, 0x02);
                assert_eq!(pc, PROGRAM_BASE);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(cpu.state.halted);
        // Further ticks idle instead of re-faulting.
        cpu.tick(&mut bus).unwrap();
    }

    #[test]
    fn total_cycles_sum_matches_instruction_costs() {
        // LDA #$01 (2) + LDX #$01 (2) + LDA $12FF,X (5, page cross)
        // + STA $10 (3) + BNE not taken (2) = 14.
        let (mut cpu, mut bus) =
            bus_with_program(&[0xA9, 0x01, 0xA2, 0x01, 0xBD, 0xFF, 0x12, 0x85, 0x10, 0xD0, 0x02]);
        for _ in 0..5 {
            cpu.step(&mut bus).unwrap();
        }
        assert_eq!(cpu.total_cycles, 14);
    }

    #[test]
    fn undocumented_lax_and_sax() {
        // LAX $10; SAX $11
        let (mut cpu, mut bus) = bus_with_program(&[0xA7, 0x10, 0x87, 0x11]);
        bus.poke_ram(0x10, 0x5A);
        assert_eq!(cpu.step(&mut bus).unwrap(), 3);
        assert_eq!(cpu.state.a, 0x5A);
        assert_eq!(cpu.state.x, 0x5A);
        cpu.step(&mut bus).unwrap();
        assert_eq!(bus.ram()[0x11], 0x5A);
    }

    #[test]
    fn undocumented_dcp_compares_after_decrement() {
        // LDA #$10; DCP $20 where $20 holds $11 -> memory $10, equal compare.
        let (mut cpu, mut bus) = bus_with_program(&[0xA9, 0x10, 0xC7, 0x20]);
        bus.poke_ram(0x20, 0x11);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.step(&mut bus).unwrap(), 5);
        assert_eq!(bus.ram()[0x20], 0x10);
        assert!(cpu.state.is_flag_set(ZERO));
        assert!(cpu.state.is_flag_set(CARRY));
    }

    #[test]
    fn undocumented_slo_and_rla() {
        // SLO $20: $20 <<= 1 (carry from bit 7), A |= result.
        let (mut cpu, mut bus) = bus_with_program(&[0xA9, 0x01, 0x07, 0x20]);
        bus.poke_ram(0x20, 0xC0);
        cpu.step(&mut bus).unwrap();
        cpu.step(&mut bus).unwrap();
        assert_eq!(bus.ram()[0x20], 0x80);
        assert_eq!(cpu.state.a, 0x81);
        assert!(cpu.state.is_flag_set(CARRY));

        // RLA $20: rotate left through carry then AND.
        let (mut cpu, mut bus) = bus_with_program(&[0x38, 0xA9, 0xFF, 0x27, 0x20]);
        bus.poke_ram(0x20, 0x40);
        cpu.step(&mut bus).unwrap(); // SEC
        cpu.step(&mut bus).unwrap(); // LDA
        cpu.step(&mut bus).unwrap(); // RLA
        assert_eq!(bus.ram()[0x20], 0x81);
        assert_eq!(cpu.state.a, 0x81);
    }

    #[test]
    fn undocumented_nops_consume_their_operands() {
        // NOP zp ($04), NOP imm ($80), NOP abs,X ($1C): PC advances 2+2+3.
        let (mut cpu, mut bus) = bus_with_program(&[0x04, 0x10, 0x80, 0x22, 0x1C, 0x00, 0x30]);
        assert_eq!(cpu.step(&mut bus).unwrap(), 3);
        assert_eq!(cpu.state.pc, PROGRAM_BASE + 2);
        assert_eq!(cpu.step(&mut bus).unwrap(), 2);
        assert_eq!(cpu.state.pc, PROGRAM_BASE + 4);
        assert_eq!(cpu.step(&mut bus).unwrap(), 4);
        assert_eq!(cpu.state.pc, PROGRAM_BASE + 7);
    }

    #[test]
    fn decimal_flag_routes_adc_through_bcd() {
        // SED; SEC; LDA #$99; ADC #$01 -> A=$01, carry set.
        let (mut cpu, mut bus) = bus_with_program(&[0xF8, 0x38, 0xA9, 0x99, 0x69, 0x01]);
        for _ in 0..4 {
            cpu.step(&mut bus).unwrap();
        }
        assert!(cpu.state.is_flag_set(DECIMAL));
        assert_eq!(cpu.state.a, 0x01);
        assert!(cpu.state.is_flag_set(CARRY));
    }

    #[test]
    fn sbc_overflow_boundary() {
        // SEC; LDA #$50; SBC #$B0 -> A=$A0 with V set.
        let (mut cpu, mut bus) = bus_with_program(&[0x38, 0xA9, 0x50, 0xE9, 0xB0]);
        for _ in 0..3 {
            cpu.step(&mut bus).unwrap();
        }
        assert_eq!(cpu.state.a, 0xA0);
        assert!(cpu.state.is_flag_set(OVERFLOW));
    }
}
