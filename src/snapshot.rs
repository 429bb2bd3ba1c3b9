/*!
Versioned save-state schema.

The snapshot is a plain serde tree rendered to JSON text: CPU registers and
cycle counters, the memory controller (port latch, a sparse RAM map keyed on
the dirty set, color RAM), and the full state of the VIC, SID and both
CIAs. RAM addresses serialize through a `BTreeMap<u16, u8>`, so the on-disk
keys are strings but always parse back to integers, one schema both ways.

Restoring validates the version first and leaves the running machine
untouched on mismatch.
*/

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cia::CiaSnapshot;
use crate::cpu::CpuSnapshot;
use crate::errors::EmuError;
use crate::sid::SidSnapshot;
use crate::vic::VicSnapshot;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub cpu: CpuSnapshot,
    pub memory: MemorySnapshot,
    pub vic: VicSnapshot,
    pub sid: SidSnapshot,
    pub cia1: CiaSnapshot,
    pub cia2: CiaSnapshot,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub processor_port: u8,
    /// Sparse RAM image: every address written since power-on.
    pub ram: BTreeMap<u16, u8>,
    pub color_ram: Vec<u8>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, EmuError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, EmuError> {
        let snap: Snapshot = serde_json::from_str(text)
            .map_err(|e| EmuError::Snapshot(e.to_string()))?;
        if snap.version != SNAPSHOT_VERSION {
            return Err(EmuError::Snapshot(format!(
                "version {} (expected {})",
                snap.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snap)
    }
}
