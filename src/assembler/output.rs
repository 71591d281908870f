// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Binary image emission.
//!
//! The image is the instructions' bytes laid out at their assigned
//! addresses, gaps filled with the profile's fill byte. Lines that
//! errored contribute fill bytes for their reserved size so every later
//! address stays where pass 1 put it.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use super::Program;

/// Lowest and highest occupied addresses, or `None` when nothing emits.
pub fn image_range(program: &Program) -> Option<(u32, u32)> {
    let mut range: Option<(u32, u32)> = None;
    for instr in &program.instructions {
        if instr.size == 0 {
            continue;
        }
        let first = instr.address;
        let last = instr.address + instr.size - 1;
        range = Some(match range {
            Some((min, max)) => (min.min(first), max.max(last)),
            None => (first, last),
        });
    }
    range
}

/// Build the flat byte image.
///
/// The image starts at the lowest occupied address, or at `base_override`
/// when that is lower (the `--start-address` contract). Returns the base
/// address and the bytes, or `None` when the program emits nothing.
pub fn build_image(
    program: &Program,
    fill_byte: u8,
    base_override: Option<u32>,
) -> Option<(u32, Vec<u8>)> {
    let (min, max) = image_range(program)?;
    let base = match base_override {
        Some(start) if start < min => start,
        _ => min,
    };
    let len = (max - base + 1) as usize;
    let mut data = vec![fill_byte; len];
    for instr in &program.instructions {
        if instr.size == 0 || instr.machine_code.is_empty() {
            continue;
        }
        let offset = (instr.address - base) as usize;
        let end = offset + instr.machine_code.len();
        if end <= data.len() {
            data[offset..end].copy_from_slice(&instr.machine_code);
        }
    }
    Some((base, data))
}

/// Write the image bytes to a file.
pub fn write_bin_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)
}
