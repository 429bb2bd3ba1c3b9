/*!
Headless driver: boots the machine from a ROM directory, optionally attaches
a program image, runs a number of frames and reports what happened. Host
video/audio/input layers consume the library directly; this binary exists to
exercise the core end to end.

Usage: `breadbin <rom-dir> [program.prg|.d64|.crt] [frames]`
*/

use std::env;
use std::fs;
use std::process::ExitCode;

use log::{error, info};

use breadbin::C64;
use breadbin::machine::CYCLES_PER_FRAME;
use breadbin::rom::RomSet;

fn main() -> ExitCode {
    env_logger::init();

    let mut args = env::args().skip(1);
    let rom_dir = args.next().unwrap_or_else(|| "roms".into());
    let program = args.next();
    let frames: u32 = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(600);

    let roms = match RomSet::from_dir(&rom_dir) {
        Ok(roms) => roms,
        Err(e) => {
            error!("cannot load ROM set from {rom_dir}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut c64 = C64::new(roms);
    c64.reset();

    if let Some(path) = &program {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("cannot read {path}: {e}");
                return ExitCode::FAILURE;
            }
        };
        match path.rsplit('.').next().unwrap_or("").to_ascii_lowercase().as_str() {
            "prg" => {
                c64.load_prg(&bytes);
            }
            "d64" => c64.attach_disk(bytes),
            "crt" => {
                if c64.attach_cartridge(&bytes).is_ok() {
                    // Cartridges take effect from the reset path.
                    c64.reset();
                }
            }
            other => {
                error!("unrecognized program type \"{other}\"");
                return ExitCode::FAILURE;
            }
        }
    }

    let mut completed = 0;
    for _ in 0..frames {
        if let Err(e) = c64.run_frame() {
            error!("machine halted: {e}");
            break;
        }
        completed += 1;
    }

    let lit = c64.frame().iter().filter(|&&p| p != 0).count();
    info!(
        "ran {completed} frame(s), {} cycles ({} per frame), {} non-background pixels",
        c64.cpu.total_cycles,
        CYCLES_PER_FRAME,
        lit
    );
    ExitCode::SUCCESS
}
