/*!
High-level 1541 drive emulation over a raw .d64 image.

No drive CPU: the KERNAL LOAD/SAVE traps call straight into this module.
The image is a linear dump of 256-byte sectors; per-track sector counts
follow the 35-track zone table (tracks 1..17 hold 21 sectors, 18..24 hold
19, 25..30 hold 18, 31..35 hold 17). The directory chain starts at track 18
sector 1; the BAM and disk name live in track 18 sector 0.

Sector chains link through bytes 0/1 of each sector (next track / next
sector). In the final sector (next track 0) the next-sector byte holds the
count of valid payload bytes after the link.
*/

use std::collections::BTreeMap;

use log::{info, warn};

pub const D64_SIZE: usize = 174_848;
const SECTOR_SIZE: usize = 256;
const DIR_TRACK: u8 = 18;
/// A track-18 chain can hold at most its own sector count.
const DIR_CHAIN_CAP: usize = 19;
/// PRG, locked: the file-type byte written for saved files.
const FILE_TYPE_PRG_LOCKED: u8 = 0x82;

fn sectors_in_track(track: u8) -> usize {
    match track {
        1..=17 => 21,
        18..=24 => 19,
        25..=30 => 18,
        31..=35 => 17,
        _ => 0,
    }
}

fn sector_offset(track: u8, sector: u8) -> Option<usize> {
    if !(1..=35).contains(&track) || (sector as usize) >= sectors_in_track(track) {
        return None;
    }
    let mut index = 0usize;
    for t in 1..track {
        index += sectors_in_track(t);
    }
    Some((index + sector as usize) * SECTOR_SIZE)
}

/// PETSCII to ASCII for the filename subset (letters, digits, punctuation).
pub fn petscii_to_ascii(b: u8) -> char {
    match b {
        0x20..=0x5F => b as char,
        0xC1..=0xDA => (b - 0x80) as char, // shifted letters
        _ => ' ',
    }
}

fn ascii_to_petscii(c: char) -> u8 {
    let c = c.to_ascii_uppercase();
    if (' '..='_').contains(&c) { c as u8 } else { b' ' }
}

fn decode_name(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0xA0)
        .map(|&b| petscii_to_ascii(b))
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Default)]
pub struct Drive {
    image: Option<Vec<u8>>,
    disk_name: String,
    /// Uppercased file name -> first (track, sector) of the data chain.
    directory: BTreeMap<String, (u8, u8)>,
}

impl Drive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.image.is_some()
    }

    pub fn disk_name(&self) -> &str {
        &self.disk_name
    }

    /// File names currently in the directory, uppercased.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.directory.keys().map(|s| s.as_str())
    }

    /// Attach a raw .d64 image and parse its directory.
    pub fn attach(&mut self, image: Vec<u8>) {
        if image.len() != D64_SIZE {
            warn!(
                "disk image is {} bytes, expected {} (35-track); continuing",
                image.len(),
                D64_SIZE
            );
        }
        self.image = Some(image);
        self.parse_directory();
        info!(
            "disk attached: \"{}\", {} file(s)",
            self.disk_name,
            self.directory.len()
        );
    }

    fn sector(&self, track: u8, sector: u8) -> Option<&[u8]> {
        let image = self.image.as_ref()?;
        let offset = sector_offset(track, sector)?;
        image.get(offset..offset + SECTOR_SIZE)
    }

    fn sector_mut(&mut self, track: u8, sector: u8) -> Option<&mut [u8]> {
        let offset = sector_offset(track, sector)?;
        let image = self.image.as_mut()?;
        image.get_mut(offset..offset + SECTOR_SIZE)
    }

    fn parse_directory(&mut self) {
        self.directory.clear();
        self.disk_name.clear();

        if let Some(header) = self.sector(DIR_TRACK, 0) {
            self.disk_name = decode_name(&header[144..160]);
        }

        let mut track = DIR_TRACK;
        let mut sector = 1u8;
        for _ in 0..DIR_CHAIN_CAP {
            let Some(data) = self.sector(track, sector) else {
                break;
            };
            let data = data.to_vec();
            for entry in data.chunks_exact(32) {
                let file_type = entry[2];
                if file_type == 0 || file_type & 0x07 != 2 {
                    continue; // scratched, or not PRG
                }
                let name = decode_name(&entry[5..21]).to_uppercase();
                if !name.is_empty() {
                    self.directory.insert(name, (entry[3], entry[4]));
                }
            }
            if data[0] == 0 {
                break;
            }
            track = data[0];
            sector = data[1];
        }
    }

    /// Read a file's byte chain (load address header included for PRG).
    pub fn load(&self, name: &str) -> Option<Vec<u8>> {
        let (mut track, mut sector) = *self.directory.get(&name.to_uppercase())?;
        let mut out = Vec::new();
        // Chain length can never exceed the sector count of the disk.
        for _ in 0..683 {
            let data = self.sector(track, sector)?;
            let next_track = data[0];
            let next_sector = data[1];
            if next_track == 0 {
                let valid = (next_sector as usize).min(SECTOR_SIZE - 2);
                out.extend_from_slice(&data[2..2 + valid]);
                return Some(out);
            }
            out.extend_from_slice(&data[2..]);
            track = next_track;
            sector = next_sector;
        }
        warn!("sector chain for \"{name}\" did not terminate");
        None
    }

    /// Scan the BAM for the first free sector outside the directory track.
    fn find_free_sector(&self) -> Option<(u8, u8)> {
        let bam = self.sector(DIR_TRACK, 0)?;
        for track in 1..=35u8 {
            if track == DIR_TRACK {
                continue;
            }
            let entry = track as usize * 4;
            let free_count = *bam.get(entry)?;
            if free_count == 0 {
                continue;
            }
            let bitmap = bam.get(entry + 1..entry + 4)?;
            for sector in 0..sectors_in_track(track) {
                if (bitmap[sector / 8] >> (sector % 8)) & 1 != 0 {
                    return Some((track, sector as u8));
                }
            }
        }
        None
    }

    /// Write `data` as a single-block PRG file. Returns false (and warns)
    /// when the directory or the disk is full, or the payload exceeds one
    /// block. BAM accounting is not updated.
    pub fn save(&mut self, name: &str, data: &[u8]) -> bool {
        if self.image.is_none() {
            return false;
        }
        if data.len() > SECTOR_SIZE - 2 {
            warn!(
                "\"{name}\" is {} bytes; single-block save stores at most {}",
                data.len(),
                SECTOR_SIZE - 2
            );
            return false;
        }

        // Free directory slot along the track-18 chain.
        let mut dir_pos = None;
        let mut track = DIR_TRACK;
        let mut sector = 1u8;
        'chain: for _ in 0..DIR_CHAIN_CAP {
            let Some(dir) = self.sector(track, sector) else {
                break;
            };
            for slot in 0..8 {
                if dir[slot * 32 + 2] == 0 {
                    dir_pos = Some((track, sector, slot));
                    break 'chain;
                }
            }
            if dir[0] == 0 {
                break;
            }
            let (t, s) = (dir[0], dir[1]);
            track = t;
            sector = s;
        }
        let Some((dir_track, dir_sector, slot)) = dir_pos else {
            warn!("directory is full, cannot save \"{name}\"");
            return false;
        };

        let Some((file_track, file_sector)) = self.find_free_sector() else {
            warn!("disk is full, cannot save \"{name}\"");
            return false;
        };

        // Single chain block: terminator link plus the payload length.
        // Written before the directory entry so a truncated image cannot
        // leave an entry pointing at a block that was never stored.
        {
            let Some(block) = self.sector_mut(file_track, file_sector) else {
                warn!("sector {file_track}/{file_sector} is outside the image");
                return false;
            };
            block.fill(0);
            block[1] = data.len() as u8;
            block[2..2 + data.len()].copy_from_slice(data);
        }

        // Directory entry: type, chain start, padded PETSCII name.
        {
            let Some(dir) = self.sector_mut(dir_track, dir_sector) else {
                return false;
            };
            let entry = &mut dir[slot * 32..slot * 32 + 32];
            entry[2] = FILE_TYPE_PRG_LOCKED;
            entry[3] = file_track;
            entry[4] = file_sector;
            for (i, cell) in entry[5..21].iter_mut().enumerate() {
                *cell = match name.chars().nth(i) {
                    Some(c) => ascii_to_petscii(c),
                    None => 0xA0,
                };
            }
        }

        self.directory
            .insert(name.to_uppercase(), (file_track, file_sector));
        info!("saved \"{name}\" ({} bytes) at {file_track}/{file_sector}", data.len());
        true
    }

    pub fn snapshot_image(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }
}


#[cfg(test)]
mod tests {
    use super::test_image::{add_prg, blank_disk};
    use super::*;

    #[test]
    fn track_zone_offsets() {
        assert_eq!(sector_offset(1, 0), Some(0));
        assert_eq!(sector_offset(2, 0), Some(21 * 256));
        assert_eq!(sector_offset(18, 0), Some(17 * 21 * 256));
        assert_eq!(sector_offset(18, 1), Some((17 * 21 + 1) * 256));
        assert_eq!(sector_offset(25, 0), Some((17 * 21 + 7 * 19) * 256));
        assert_eq!(sector_offset(31, 0), Some((17 * 21 + 7 * 19 + 6 * 18) * 256));
        assert_eq!(sector_offset(36, 0), None);
        assert_eq!(sector_offset(1, 21), None);
        // 683 sectors in total on a 35-track disk.
        let last = sector_offset(35, 16).unwrap();
        assert_eq!(last + 256, D64_SIZE);
    }

    #[test]
    fn directory_and_disk_name_parse() {
        let mut image = blank_disk("TESTDISK");
        add_prg(&mut image, 0, "HELLO", &[0x01, 0x08, 0xAA]);
        add_prg(&mut image, 1, "world", &[0x00, 0xC0, 0xBB]);
        let mut drive = Drive::new();
        drive.attach(image);
        assert_eq!(drive.disk_name(), "TESTDISK");
        let names: Vec<&str> = drive.files().collect();
        assert_eq!(names, vec!["HELLO", "WORLD"]);
    }

    #[test]
    fn load_single_block_file() {
        let payload = [0x01, 0x08, 0xDE, 0xAD, 0xBE, 0xEF];
        let mut image = blank_disk("D");
        add_prg(&mut image, 0, "PROG", &payload);
        let mut drive = Drive::new();
        drive.attach(image);
        // Lookup is case-insensitive.
        assert_eq!(drive.load("prog").unwrap(), payload);
        assert!(drive.load("MISSING").is_none());
    }

    #[test]
    fn load_walks_multi_sector_chain() {
        let payload: Vec<u8> = (0..600).map(|i| (i % 251) as u8).collect();
        let mut image = blank_disk("D");
        add_prg(&mut image, 0, "BIG", &payload);
        let mut drive = Drive::new();
        drive.attach(image);
        assert_eq!(drive.load("BIG").unwrap(), payload);
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut drive = Drive::new();
        drive.attach(blank_disk("D"));
        let data = [0x01, 0x08, 1, 2, 3, 4, 5];
        assert!(drive.save("NEWFILE", &data));
        assert_eq!(drive.load("NEWFILE").unwrap(), data);
        // The directory entry survives a re-parse of the raw image.
        let image = drive.snapshot_image().unwrap().to_vec();
        let mut reloaded = Drive::new();
        reloaded.attach(image);
        assert_eq!(reloaded.load("newfile").unwrap(), data);
    }

    #[test]
    fn save_rejects_oversized_payload() {
        let mut drive = Drive::new();
        drive.attach(blank_disk("D"));
        let data = vec![0u8; 255];
        assert!(!drive.save("TOOBIG", &data));
    }

    #[test]
    fn save_without_disk_fails() {
        let mut drive = Drive::new();
        assert!(!drive.save("X", &[1, 2, 3]));
    }

    #[test]
    fn save_skips_occupied_directory_slots() {
        let mut image = blank_disk("D");
        add_prg(&mut image, 0, "FIRST", &[0x01, 0x08, 9]);
        let mut drive = Drive::new();
        drive.attach(image);
        assert!(drive.save("SECOND", &[0x01, 0x08, 7]));
        assert_eq!(drive.load("FIRST").unwrap(), [0x01, 0x08, 9]);
        assert_eq!(drive.load("SECOND").unwrap(), [0x01, 0x08, 7]);
    }
}
