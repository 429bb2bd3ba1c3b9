/*!
Error kinds surfaced at the crate API.

Peripherals never propagate errors into the CPU; they set status flags (a
LOAD that misses returns carry-set to the 6510 program, not an `Err`). The
variants here cover the fatal and loader-level conditions only.
*/

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmuError {
    /// A boot ROM image has the wrong length. The loaders themselves only
    /// warn and zero-fill; this kind exists for hosts that want to reject
    /// a bad image outright.
    #[error("{name} ROM is {len} bytes, expected {expected}")]
    InvalidRomSize {
        name: &'static str,
        len: usize,
        expected: usize,
    },

    /// Opcode absent from the decode table. Fatal to continued correctness;
    /// the CPU halts and the offending location is surfaced.
    #[error("unknown opcode ${opcode:02X} at ${pc:04X}")]
    UnknownOpcode { opcode: u8, pc: u16 },

    /// Cartridge container rejected (bad magic or truncated header). The
    /// machine continues with no cartridge attached.
    #[error("bad cartridge image: {0}")]
    Cartridge(String),

    /// Save-state file does not match the current schema. The running state
    /// is left untouched.
    #[error("snapshot schema mismatch: {0}")]
    Snapshot(String),

    #[error("save state encoding: {0}")]
    SnapshotFormat(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
