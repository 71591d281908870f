// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for reForge.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use clap::Parser;

use reforge::assembler::cli::Cli;
use reforge::core::assembler::error::{AsmErrorKind, Diagnostic, Severity};

/// Routes diagnostic lines to stderr and, when configured, to a log file.
struct DiagnosticsSink {
    log: Option<File>,
}

impl DiagnosticsSink {
    fn open(log_path: Option<&Path>) -> io::Result<Self> {
        let log = match log_path {
            Some(path) => Some(File::create(path)?),
            None => None,
        };
        Ok(Self { log })
    }

    fn emit_line(&mut self, line: &str) {
        eprintln!("{line}");
        if let Some(log) = &mut self.log {
            let _ = writeln!(log, "{line}");
        }
    }

    fn emit_diagnostics(&mut self, diagnostics: &[Diagnostic], lines: &[String], use_color: bool) {
        for diag in diagnostics {
            self.emit_line(&diag.format_with_context(Some(lines), use_color));
        }
    }

    fn emit_summary(&mut self, errors: usize, warnings: usize) {
        self.emit_line("--- Assembly Summary ---");
        if errors > 0 {
            self.emit_line(&format!(
                "Assembly failed with {errors} error(s) and {warnings} warning(s)."
            ));
        } else {
            self.emit_line(&format!("Assembly successful with {warnings} warning(s)."));
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let mut sink = match DiagnosticsSink::open(cli.log_file.as_deref()) {
        Ok(sink) => sink,
        Err(err) => {
            eprintln!("Error: Cannot open log file: {err}");
            std::process::exit(1);
        }
    };
    let use_color = std::env::var("NO_COLOR").is_err();

    match reforge::assembler::run_with_cli(&cli) {
        Ok(report) => {
            if !cli.quiet {
                sink.emit_diagnostics(report.diagnostics(), report.source_lines(), use_color);
                sink.emit_summary(report.error_count(), report.warning_count());
            }
        }
        Err(err) => {
            let warnings = err
                .diagnostics()
                .iter()
                .filter(|diag| diag.severity() == Severity::Warning)
                .count();
            let errors = err.diagnostics().len() - warnings;
            sink.emit_diagnostics(err.diagnostics(), err.source_lines(), use_color);
            sink.emit_line(&format!("Error: {err}"));
            sink.emit_summary(errors.max(1), warnings);
            let code = if err.kind() == AsmErrorKind::Cli { 2 } else { 1 };
            std::process::exit(code);
        }
    }
}
