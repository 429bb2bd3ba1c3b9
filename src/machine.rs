/*!
The machine orchestrator: owns the CPU and the bus, drives the 60 Hz frame
loop and drains the audio/video outputs.

A frame is 16,420 CPU cycles (985,248 Hz PAL clock over 60 frames) followed
by one pull of 735 audio samples (44,100 Hz over 60). Fatal CPU errors
(unknown opcodes) abort the frame and bubble out; everything recoverable is
logged inside the peripherals and the loop keeps running. Pausing is the
host's business; correctness does not depend on the frame batch size.
*/

use log::warn;

use crate::bus::Bus;
use crate::cartridge::Cartridge;
use crate::cpu::Cpu;
use crate::errors::EmuError;
use crate::keyboard::{JoyInput, Key};
use crate::rom::RomSet;
use crate::snapshot::{MemorySnapshot, SNAPSHOT_VERSION, Snapshot};

/// CPU cycles per 60 Hz frame batch (~985,248 / 60).
pub const CYCLES_PER_FRAME: u32 = 16_420;
/// Audio samples pulled per frame (44,100 / 60).
pub const SAMPLES_PER_FRAME: usize = 735;

pub struct C64 {
    pub cpu: Cpu,
    pub bus: Bus,
    audio: Vec<i16>,
}

impl C64 {
    pub fn new(roms: RomSet) -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(roms),
            audio: vec![0; SAMPLES_PER_FRAME],
        }
    }

    /// Cold start: registers cleared, PC from the KERNAL reset vector.
    pub fn reset(&mut self) {
        self.cpu.reset(&mut self.bus);
    }

    /// Run one frame's worth of cycles, then pull the frame's audio.
    pub fn run_frame(&mut self) -> Result<(), EmuError> {
        for _ in 0..CYCLES_PER_FRAME {
            self.cpu.tick(&mut self.bus)?;
        }
        self.audio.resize(SAMPLES_PER_FRAME, 0);
        self.bus.sid.render(&mut self.audio);
        Ok(())
    }

    /// Tick until the current instruction retires (debug/test convenience).
    pub fn step_instruction(&mut self) -> Result<u32, EmuError> {
        self.cpu.step(&mut self.bus)
    }

    /// The 320×200 surface of palette indices produced by the VIC.
    pub fn frame(&self) -> &[u8] {
        self.bus.vic.framebuffer()
    }

    /// The last frame's mono PCM samples.
    pub fn audio(&self) -> &[i16] {
        &self.audio
    }

    pub fn set_key(&mut self, key: Key, pressed: bool) {
        self.bus.set_key(key, pressed);
    }

    pub fn set_joystick(&mut self, input: JoyInput, pressed: bool) {
        self.bus.set_joystick(input, pressed);
    }

    pub fn load_prg(&mut self, bytes: &[u8]) -> Option<u16> {
        self.bus.load_prg(bytes)
    }

    /// Parse and attach a CRT image. A rejected image leaves the machine
    /// running cartridge-free.
    pub fn attach_cartridge(&mut self, bytes: &[u8]) -> Result<(), EmuError> {
        match Cartridge::from_crt_bytes(bytes) {
            Ok(cart) => {
                self.bus.attach_cartridge(cart);
                Ok(())
            }
            Err(e) => {
                warn!("cartridge rejected: {e}");
                Err(e)
            }
        }
    }

    pub fn attach_disk(&mut self, image: Vec<u8>) {
        self.bus.attach_disk(image);
    }

    /// Capture everything mutable into a versioned snapshot.
    pub fn snapshot(&self) -> Snapshot {
        let bus = &self.bus;
        Snapshot {
            version: SNAPSHOT_VERSION,
            cpu: self.cpu.snapshot(),
            memory: MemorySnapshot {
                processor_port: bus.processor_port,
                ram: bus
                    .dirty
                    .iter()
                    .map(|&addr| (addr, bus.ram[addr as usize]))
                    .collect(),
                color_ram: bus.color_ram.to_vec(),
            },
            vic: bus.vic.snapshot(),
            sid: bus.sid.snapshot(),
            cia1: bus.cia1.snapshot(),
            cia2: bus.cia2.snapshot(),
        }
    }

    /// Apply a snapshot. The version gate has already run for snapshots
    /// parsed through [`Snapshot::from_json`]; it is re-checked here so a
    /// hand-built value cannot slip through.
    pub fn restore(&mut self, snap: &Snapshot) -> Result<(), EmuError> {
        if snap.version != SNAPSHOT_VERSION {
            return Err(EmuError::Snapshot(format!(
                "version {} (expected {})",
                snap.version, SNAPSHOT_VERSION
            )));
        }
        self.cpu.restore(&snap.cpu);
        self.bus.processor_port = snap.memory.processor_port;
        for (&addr, &value) in &snap.memory.ram {
            self.bus.ram[addr as usize] = value;
            self.bus.dirty.insert(addr);
        }
        let n = snap.memory.color_ram.len().min(self.bus.color_ram.len());
        self.bus.color_ram[..n].copy_from_slice(&snap.memory.color_ram[..n]);
        self.bus.vic.restore(&snap.vic);
        self.bus.sid.restore(&snap.sid);
        self.bus.cia1.restore(&snap.cia1);
        self.bus.cia2.restore(&snap.cia2);
        Ok(())
    }
}
