#![doc = r#"
Cycle-driven Commodore 64 emulator core (PAL).

This crate exposes the machine core for use by host binaries and tests.

Modules:
- machine: orchestrator owning the CPU and bus; 60 Hz frame loop, A/V drains
- cpu: 6510 core with amortized per-instruction cycle budget and KERNAL traps
- bus: banked memory controller, peripheral dispatch, interrupt lines
- vic: VIC-II raster generator, sprites, collision latches, badline reporting
- sid: three-voice synthesis, ADSR envelopes, state-variable filter
- cia: interval timers, keyboard/joystick matrix, IRQ/NMI sources
- cartridge: CRT container parsing and the ROM overlay
- drive: high-level 1541 over .d64 images (LOAD/SAVE traps call into it)
- keyboard: host key naming and matrix coordinates
- rom: boot ROM set and PRG parsing
- snapshot: versioned save-state schema
- errors: crate-level error kinds

The host side (windowing, audio output, input capture) consumes the
framebuffer, the sample buffer and the key/joystick setters; nothing here
blocks or spawns.
"#]

pub mod bus;
pub mod cartridge;
pub mod cia;
pub mod cpu;
pub mod drive;
pub mod errors;
pub mod keyboard;
pub mod machine;
pub mod rom;
pub mod sid;
pub mod snapshot;
pub mod vic;

// Commonly used types at the crate root.
pub use bus::Bus;
pub use cpu::Cpu;
pub use errors::EmuError;
pub use machine::C64;

// Shared test utilities (only compiled for tests).
#[cfg(test)]
pub mod test_utils;
