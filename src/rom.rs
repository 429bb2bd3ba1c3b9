/*!
ROM set loading for the machine: BASIC (8 KiB at $A000), KERNAL (8 KiB at
$E000) and the character generator (4 KiB, VIC-only).

Short images produce a warning and are zero-filled to the expected size;
oversized images are truncated. Missing files are an error; the machine
cannot boot without its ROMs, although tests build synthetic sets directly
from byte slices.
*/

use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::errors::EmuError;

pub const BASIC_ROM_SIZE: usize = 0x2000;
pub const KERNAL_ROM_SIZE: usize = 0x2000;
pub const CHAR_ROM_SIZE: usize = 0x1000;

/// The three boot ROM images, already padded/truncated to their fixed sizes.
pub struct RomSet {
    pub basic: Box<[u8; BASIC_ROM_SIZE]>,
    pub kernal: Box<[u8; KERNAL_ROM_SIZE]>,
    pub chargen: Box<[u8; CHAR_ROM_SIZE]>,
}

impl RomSet {
    /// Build a ROM set from raw image bytes, zero-filling short images.
    pub fn from_bytes(basic: &[u8], kernal: &[u8], chargen: &[u8]) -> Self {
        Self {
            basic: fit(basic, "BASIC"),
            kernal: fit(kernal, "KERNAL"),
            chargen: fit(chargen, "character"),
        }
    }

    /// Load `basic.rom`, `kernal.rom` and `char.rom` from a directory.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, EmuError> {
        let dir = dir.as_ref();
        let basic = fs::read(dir.join("basic.rom"))?;
        let kernal = fs::read(dir.join("kernal.rom"))?;
        let chargen = fs::read(dir.join("char.rom"))?;
        info!(
            "loaded ROM set from {} (basic {} bytes, kernal {} bytes, char {} bytes)",
            dir.display(),
            basic.len(),
            kernal.len(),
            chargen.len()
        );
        Ok(Self::from_bytes(&basic, &kernal, &chargen))
    }

    /// All-zero ROM set for tests; callers patch in vectors as needed.
    pub fn empty() -> Self {
        Self::from_bytes(&[], &[], &[])
    }
}

fn fit<const N: usize>(image: &[u8], name: &str) -> Box<[u8; N]> {
    if !image.is_empty() && image.len() != N {
        warn!(
            "{} ROM is {} bytes, expected {}; zero-filling the remainder",
            name,
            image.len(),
            N
        );
    }
    let mut out = Box::new([0u8; N]);
    let n = image.len().min(N);
    out[..n].copy_from_slice(&image[..n]);
    out
}

/// Split a PRG image into its little-endian load address and payload.
///
/// Returns `None` when the image is too short to carry the 2-byte header.
pub fn parse_prg(bytes: &[u8]) -> Option<(u16, &[u8])> {
    if bytes.len() < 2 {
        return None;
    }
    let load = u16::from_le_bytes([bytes[0], bytes[1]]);
    Some((load, &bytes[2..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_rom_is_zero_filled() {
        let set = RomSet::from_bytes(&[0xAA, 0xBB], &[], &[0x11]);
        assert_eq!(set.basic[0], 0xAA);
        assert_eq!(set.basic[1], 0xBB);
        assert_eq!(set.basic[2], 0x00);
        assert_eq!(set.kernal[0x1FFF], 0x00);
        assert_eq!(set.chargen[0], 0x11);
    }

    #[test]
    fn oversized_rom_is_truncated() {
        let big = vec![0x55u8; BASIC_ROM_SIZE + 16];
        let set = RomSet::from_bytes(&big, &[], &[]);
        assert_eq!(set.basic.len(), BASIC_ROM_SIZE);
        assert_eq!(set.basic[BASIC_ROM_SIZE - 1], 0x55);
    }

    #[test]
    fn prg_header_split() {
        let prg = [0x01, 0x08, 0xDE, 0xAD];
        let (load, payload) = parse_prg(&prg).unwrap();
        assert_eq!(load, 0x0801);
        assert_eq!(payload, &[0xDE, 0xAD]);
        assert!(parse_prg(&[0x01]).is_none());
    }
}
