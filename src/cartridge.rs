/*!
CRT cartridge container parsing and the resulting ROM overlay.

Container layout (big-endian multi-byte fields):

```text
Offset  Size  Field
 0       4    magic "C64 " (ASCII, trailing space)
 4       4    header length (typically $40)
 8       2    cartridge type
10       1    EXROM line (1 = asserted)
11       1    GAME line
.. header length, then repeating CHIP packets:
 0       4    magic "CHIP"
 8       4    total packet size, header included
14       2    chip load address
16..     payload
```

The bus consults the attached cartridge before its standard map: GAME/EXROM
line state plus the chip load address decide which windows the overlay
claims. Chips are read-only to the CPU for the lifetime of the machine.
*/

use std::collections::BTreeMap;

use log::{info, warn};

use crate::errors::EmuError;

const CHIP_HEADER_LEN: usize = 16;

/// A parsed cartridge: line states plus ROM chips keyed by load address.
#[derive(Debug, Clone)]
pub struct Cartridge {
    pub type_code: u16,
    pub exrom: bool,
    pub game: bool,
    chips: BTreeMap<u16, Vec<u8>>,
}

impl Cartridge {
    /// Parse a `.crt` container image.
    pub fn from_crt_bytes(bytes: &[u8]) -> Result<Self, EmuError> {
        if bytes.len() < 12 {
            return Err(EmuError::Cartridge("truncated header".into()));
        }
        if &bytes[0..4] != b"C64 " {
            return Err(EmuError::Cartridge("magic mismatch".into()));
        }
        let header_len = u32::from_be_bytes(bytes[4..8].try_into().unwrap()) as usize;
        if header_len < 12 || header_len > bytes.len() {
            return Err(EmuError::Cartridge(format!(
                "header length {header_len} out of range"
            )));
        }
        let type_code = u16::from_be_bytes(bytes[8..10].try_into().unwrap());
        let exrom = bytes[10] == 1;
        let game = bytes[11] == 1;

        let mut chips = BTreeMap::new();
        let mut pos = header_len;
        while pos + CHIP_HEADER_LEN <= bytes.len() {
            let header = &bytes[pos..pos + CHIP_HEADER_LEN];
            if &header[0..4] != b"CHIP" {
                break;
            }
            let packet_size =
                u32::from_be_bytes(header[8..12].try_into().unwrap()) as usize;
            let load_addr = u16::from_be_bytes(header[14..16].try_into().unwrap());
            if packet_size < CHIP_HEADER_LEN || pos + packet_size > bytes.len() {
                warn!("CHIP packet at offset {pos} overruns the image; ignoring the rest");
                break;
            }
            let payload = bytes[pos + CHIP_HEADER_LEN..pos + packet_size].to_vec();
            chips.insert(load_addr, payload);
            pos += packet_size;
        }
        if chips.is_empty() {
            return Err(EmuError::Cartridge("no CHIP packets".into()));
        }

        let cart = Self {
            type_code,
            exrom,
            game,
            chips,
        };
        info!(
            "cartridge attached: type {}, GAME={}, EXROM={}, chips at {:?}",
            cart.type_code,
            cart.game,
            cart.exrom,
            cart.chips.keys().map(|a| format!("${a:04X}")).collect::<Vec<_>>()
        );
        Ok(cart)
    }

    /// Read a byte from the chip mapped at `base`, if one exists and covers
    /// the offset `addr - base`.
    pub fn read(&self, base: u16, addr: u16) -> Option<u8> {
        let chip = self.chips.get(&base)?;
        chip.get((addr - base) as usize).copied()
    }

    /// True when a chip is mapped at the given load address.
    pub fn has_chip(&self, base: u16) -> bool {
        self.chips.contains_key(&base)
    }
}

/// Test-only CRT image builder, shared with the bus integration tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::CHIP_HEADER_LEN;

    pub(crate) fn build_crt(exrom: u8, game: u8, chips: &[(u16, &[u8])]) -> Vec<u8> {
        let mut out = vec![0u8; 0x40];
        out[0..4].copy_from_slice(b"C64 ");
        out[4..8].copy_from_slice(&0x40u32.to_be_bytes());
        out[8..10].copy_from_slice(&0u16.to_be_bytes());
        out[10] = exrom;
        out[11] = game;
        for (load, data) in chips {
            let mut header = [0u8; CHIP_HEADER_LEN];
            header[0..4].copy_from_slice(b"CHIP");
            header[8..12]
                .copy_from_slice(&((CHIP_HEADER_LEN + data.len()) as u32).to_be_bytes());
            header[14..16].copy_from_slice(&load.to_be_bytes());
            out.extend_from_slice(&header);
            out.extend_from_slice(data);
        }
        out
    }
}
