// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::core::assembler::error::{AsmError, AsmErrorKind, AsmRunError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Retargetable two-pass assembler for 8/16-bit CPUs.

The target CPU is a declarative JSON profile selected with --cpu NAME,
resolved as <profile-dir>/NAME.json. The output is an absolute binary
image starting at the lowest assembled address; --start-address overrides
the initial origin. A listing file and a diagnostics log are optional.";

#[derive(Parser, Debug)]
#[command(
    name = "reForge",
    version = VERSION,
    about = "Retargetable two-pass assembler driven by declarative CPU profiles",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(value_name = "SOURCE", long_help = "Assembly source file.")]
    pub source: PathBuf,
    #[arg(
        long = "cpu",
        value_name = "NAME",
        long_help = "Target CPU profile, by base filename in the profiles directory."
    )]
    pub cpu: String,
    #[arg(
        long = "profile-dir",
        value_name = "DIR",
        default_value = "profiles",
        long_help = "Directory containing CPU profile documents (NAME.json)."
    )]
    pub profile_dir: PathBuf,
    #[arg(
        long = "start-address",
        value_name = "ADDR",
        long_help = "Initial origin before any .ORG directive. Decimal, 0x hex, or $ hex."
    )]
    pub start_address: Option<String>,
    #[arg(
        short = 'o',
        long = "output",
        value_name = "PATH",
        long_help = "Output binary file. Defaults to the source path with a .bin extension."
    )]
    pub output: Option<PathBuf>,
    #[arg(
        short = 'l',
        long = "list",
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = "",
        long_help = "Emit a listing file. FILE is optional; when omitted, the source base is used and a .lst extension is added."
    )]
    pub list_name: Option<String>,
    #[arg(
        long = "log-file",
        value_name = "PATH",
        long_help = "Copy diagnostics and the run summary to PATH in addition to stderr."
    )]
    pub log_file: Option<PathBuf>,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress diagnostic output for successful assembly runs."
    )]
    pub quiet: bool,
}

/// Validated, resolved CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub source_path: PathBuf,
    pub profile_path: PathBuf,
    pub start_address: Option<u32>,
    pub output_path: PathBuf,
    pub list_path: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub quiet: bool,
}

fn cli_error(msg: &str, param: Option<&str>) -> AsmRunError {
    AsmRunError::new(
        AsmError::new(AsmErrorKind::Cli, msg, param),
        Vec::new(),
        Vec::new(),
    )
}

/// Parse an address literal: decimal, `0x` hex, or `$` hex.
pub fn parse_address(text: &str) -> Option<u32> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(hex) = text.strip_prefix('$') {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse::<u32>().ok()
    }
}

/// Check argument consistency and resolve paths.
pub fn validate_cli(cli: &Cli) -> Result<CliConfig, AsmRunError> {
    let start_address = match &cli.start_address {
        Some(text) => Some(
            parse_address(text)
                .ok_or_else(|| cli_error("Invalid start address", Some(text)))?,
        ),
        None => None,
    };

    if cli.cpu.trim().is_empty() {
        return Err(cli_error("CPU profile name must not be empty", None));
    }
    let profile_path = cli
        .profile_dir
        .join(format!("{}.json", cli.cpu.to_lowercase()));

    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.source.with_extension("bin"));

    let list_path = match &cli.list_name {
        Some(name) if name.is_empty() => Some(cli.source.with_extension("lst")),
        Some(name) => Some(PathBuf::from(name)),
        None => None,
    };

    Ok(CliConfig {
        source_path: cli.source.clone(),
        profile_path,
        start_address,
        output_path,
        list_path,
        log_file: cli.log_file.clone(),
        quiet: cli.quiet,
    })
}
