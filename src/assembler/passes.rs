// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assembler run orchestration.
//!
//! This module owns the CLI-driven run flow: profile loading, source
//! reading, pass execution, and listing/binary emission.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::sync::Arc;

use clap::Parser;

use crate::core::assembler::error::{
    AsmError, AsmErrorKind, AsmRunError, AsmRunReport, Diagnostic, PassCounts, Severity,
};
use crate::core::assembler::listing::{ListingLine, ListingWriter};
use crate::profile::load_profile;

use super::cli::{validate_cli, Cli, VERSION};
use super::engine::{assemble_lines, AssemblyOutput};
use super::output::{build_image, write_bin_file};

/// Run the assembler with command-line arguments.
pub fn run() -> Result<AsmRunReport, AsmRunError> {
    let cli = Cli::parse();
    run_with_cli(&cli)
}

/// Run one assembly with parsed command-line arguments.
pub fn run_with_cli(cli: &Cli) -> Result<AsmRunReport, AsmRunError> {
    let config = validate_cli(cli)?;

    let profile =
        load_profile(&config.profile_path).map_err(|err| AsmRunError::new(err, Vec::new(), Vec::new()))?;

    let source_text = fs::read_to_string(&config.source_path).map_err(|_| {
        let shown = config.source_path.display().to_string();
        AsmRunError::new(
            AsmError::new(AsmErrorKind::Io, "Cannot open source file", Some(&shown)),
            Vec::new(),
            Vec::new(),
        )
    })?;
    let source_lines: Vec<String> = source_text.lines().map(str::to_string).collect();
    let source_lines = Arc::new(source_lines);

    let start_address = config.start_address.unwrap_or(0);
    let output = assemble_lines(&source_lines, &profile, start_address);

    // The listing is written even for failed runs; it is often the
    // fastest way to see where things went wrong.
    if let Some(list_path) = &config.list_path {
        write_listing(list_path, &output, &source_lines)
            .map_err(|err| io_run_error(&err.to_string(), &output, &source_lines))?;
    }

    if output.error_count() > 0 {
        return Err(AsmRunError::new(
            AsmError::new(
                AsmErrorKind::Assembler,
                "Errors detected in source. No binary file created.",
                None,
            ),
            output.diagnostics,
            source_lines,
        ));
    }

    if let Some((_base, data)) = build_image(
        &output.program,
        profile.info.fill_byte,
        config.start_address,
    ) {
        write_bin_file(&config.output_path, &data).map_err(|_| {
            let shown = config.output_path.display().to_string();
            AsmRunError::new(
                AsmError::new(AsmErrorKind::Io, "Error opening file for write", Some(&shown)),
                Vec::new(),
                source_lines.clone(),
            )
        })?;
    }

    Ok(AsmRunReport::new(output.diagnostics, source_lines))
}

fn io_run_error(msg: &str, output: &AssemblyOutput, lines: &Arc<Vec<String>>) -> AsmRunError {
    AsmRunError::new(
        AsmError::new(AsmErrorKind::Io, msg, None),
        output.diagnostics.clone(),
        lines.clone(),
    )
}

fn write_listing(
    path: &std::path::Path,
    output: &AssemblyOutput,
    source_lines: &[String],
) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    write_listing_to(&mut file, output, source_lines)
}

fn write_listing_to<W: Write>(
    out: &mut W,
    output: &AssemblyOutput,
    source_lines: &[String],
) -> std::io::Result<()> {
    let mut by_line: BTreeMap<u32, Vec<&Diagnostic>> = BTreeMap::new();
    for diag in &output.diagnostics {
        by_line.entry(diag.line()).or_default().push(diag);
    }

    let mut listing = ListingWriter::new(out);
    listing.header(&format!("reForge Assembler v{VERSION}"))?;
    for instr in &output.program.instructions {
        let source = source_lines
            .get((instr.line_num - 1) as usize)
            .map(String::as_str)
            .unwrap_or(&instr.source);
        listing.write_line(ListingLine {
            addr: instr.address,
            bytes: &instr.machine_code,
            equ_value: instr.equ_value,
            line_num: instr.line_num,
            source,
        })?;
        if let Some(diags) = by_line.get(&instr.line_num) {
            for diag in diags {
                let kind = match diag.severity() {
                    Severity::Warning => "WARNING",
                    Severity::Error => "ERROR",
                };
                listing.write_diagnostic(kind, diag.message(), diag.line())?;
            }
        }
    }

    let counts = PassCounts {
        lines: output.program.instructions.len() as u32,
        errors: output.error_count() as u32,
        warnings: output.warning_count() as u32,
    };
    listing.footer(&counts, &output.symbols)
}

/// Render the listing as a string. Exposed for tests.
#[cfg(test)]
pub(crate) fn listing_text(output: &AssemblyOutput, source_lines: &[String]) -> String {
    let mut buf = Vec::new();
    write_listing_to(&mut buf, output, source_lines).expect("listing write should succeed");
    String::from_utf8(buf).expect("listing should be utf-8")
}
