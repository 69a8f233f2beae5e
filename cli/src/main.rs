//! Headless host for the satsuma core.
//!
//! `satsuma <rom.gba>` runs the emulation forever, reporting frame
//! counts; a presentation layer is deliberately not part of this crate.
//!
//! `satsuma <rom.gba> --test` runs 120 frames and decides pass/fail from
//! the framebuffer: test ROMs of the supported corpus print their verdict
//! at a fixed screen position, so counting dark (inked) pixels in the
//! pass-text region against the fail-text region classifies the outcome.

use std::env;
use std::process::ExitCode;

use emu::gba::Gba;
use logger::{init_logger, log, LogKind};

const TEST_FRAMES: u32 = 120;

/// Pass-text probe region: x 56..64, y 76..84.
const PASS_REGION: (std::ops::Range<usize>, std::ops::Range<usize>) = (56..64, 76..84);

/// Fail-text probe region: x 60..68, y 76..84.
const FAIL_REGION: (std::ops::Range<usize>, std::ops::Range<usize>) = (60..68, 76..84);

fn main() -> ExitCode {
    init_logger(LogKind::Stdout);

    let args: Vec<String> = env::args().collect();
    let Some(rom_path) = args.get(1) else {
        eprintln!("Usage: {} <rom.gba> [--test]", args[0]);
        return ExitCode::FAILURE;
    };
    let test_mode = args.iter().any(|arg| arg == "--test");

    let mut gba = Gba::new();
    if !gba.load_rom(rom_path) {
        eprintln!("Failed to load ROM: {rom_path}");
        return ExitCode::FAILURE;
    }

    if test_mode {
        return run_test(&mut gba);
    }

    log(format!("running {rom_path}"));
    let mut frames: u64 = 0;
    loop {
        gba.run_frame();
        gba.clear_sample_buffer();

        frames += 1;
        if frames % 600 == 0 {
            log(format!("{frames} frames"));
        }
    }
}

fn run_test(gba: &mut Gba) -> ExitCode {
    for _ in 0..TEST_FRAMES {
        gba.run_frame();
        gba.clear_sample_buffer();
    }

    let pass = dark_pixels(gba.framebuffer(), &PASS_REGION);
    let fail = dark_pixels(gba.framebuffer(), &FAIL_REGION);
    log(format!("test probe: pass={pass} fail={fail}"));

    if pass > fail {
        println!("PASSED");
        ExitCode::SUCCESS
    } else {
        println!("FAILED");
        ExitCode::FAILURE
    }
}

/// Counts pixels dark enough to be text ink within one probe region.
fn dark_pixels(
    framebuffer: &[u32],
    (xs, ys): &(std::ops::Range<usize>, std::ops::Range<usize>),
) -> u32 {
    let mut count = 0;
    for y in ys.clone() {
        for x in xs.clone() {
            let pixel = framebuffer[y * 240 + x];
            let red = (pixel >> 16) & 0xFF;
            let green = (pixel >> 8) & 0xFF;
            let blue = pixel & 0xFF;
            if red + green + blue < 0x60 {
                count += 1;
            }
        }
    }
    count
}
