// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Listing file generation.

use std::io::Write;

use crate::core::symbol_table::SymbolTable;

use super::error::PassCounts;

/// Data for a single listing line.
pub struct ListingLine<'a> {
    pub addr: u32,
    pub bytes: &'a [u8],
    /// Value shown instead of bytes for equate lines.
    pub equ_value: Option<i64>,
    pub line_num: u32,
    pub source: &'a str,
}

/// Writer for listing file output.
pub struct ListingWriter<W: Write> {
    out: W,
}

impl<W: Write> ListingWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn header(&mut self, title: &str) -> std::io::Result<()> {
        writeln!(self.out, "{title}")?;
        writeln!(self.out, "ADDR    BYTES                    LINE  SOURCE")?;
        writeln!(self.out, "------  -----------------------  ----  ------")?;
        Ok(())
    }

    pub fn write_line(&mut self, line: ListingLine<'_>) -> std::io::Result<()> {
        let (loc, bytes_col) = match line.equ_value {
            Some(value) => (String::new(), format!("= ${value:04X}")),
            None => {
                if line.bytes.is_empty() {
                    (String::new(), String::new())
                } else {
                    (format_addr(line.addr), format_bytes(line.bytes))
                }
            }
        };
        let loc = if loc.is_empty() {
            "----".to_string()
        } else {
            loc
        };
        writeln!(
            self.out,
            "{:<6}  {:<23}  {:>4}  {}",
            loc, bytes_col, line.line_num, line.source
        )
    }

    pub fn write_diagnostic(&mut self, kind: &str, msg: &str, line_num: u32) -> std::io::Result<()> {
        writeln!(self.out, "*** {kind} on line {line_num}: {msg}")
    }

    pub fn footer(&mut self, counts: &PassCounts, symbols: &SymbolTable) -> std::io::Result<()> {
        writeln!(self.out)?;
        writeln!(
            self.out,
            "{} lines, {} errors, {} warnings",
            counts.lines, counts.errors, counts.warnings
        )?;
        if !symbols.is_empty() {
            writeln!(self.out)?;
            writeln!(self.out, "Symbols:")?;
            symbols.dump(&mut self.out)?;
        }
        Ok(())
    }
}

/// Format an address: four hex digits, widening to eight past 16 bits.
pub fn format_addr(addr: u32) -> String {
    if addr > 0xFFFF {
        format!("{addr:08X}")
    } else {
        format!("{addr:04X}")
    }
}

fn format_bytes(bytes: &[u8]) -> String {
    let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
    hex.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbol_table::SymbolKind;

    fn render<F: FnOnce(&mut ListingWriter<&mut Vec<u8>>)>(f: F) -> String {
        let mut out = Vec::new();
        {
            let mut writer = ListingWriter::new(&mut out);
            f(&mut writer);
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn write_line_formats_address_and_bytes() {
        let text = render(|w| {
            w.write_line(ListingLine {
                addr: 0x8000,
                bytes: &[0xA9, 0x42],
                equ_value: None,
                line_num: 2,
                source: "START: LDA #$42",
            })
            .unwrap();
        });
        let expected = format!(
            "{:<6}  {:<23}  {:>4}  {}\n",
            "8000", "A9 42", 2, "START: LDA #$42"
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn equ_lines_show_value_not_address() {
        let text = render(|w| {
            w.write_line(ListingLine {
                addr: 0,
                bytes: &[],
                equ_value: Some(0x10),
                line_num: 3,
                source: "SIZE EQU $10",
            })
            .unwrap();
        });
        assert!(text.starts_with("----    = $0010"));
    }

    #[test]
    fn empty_lines_render_dashes() {
        let text = render(|w| {
            w.write_line(ListingLine {
                addr: 0,
                bytes: &[],
                equ_value: None,
                line_num: 1,
                source: "; comment only",
            })
            .unwrap();
        });
        assert!(text.starts_with("----"));
        assert!(text.contains("; comment only"));
    }

    #[test]
    fn footer_includes_counts_and_symbols() {
        let mut symbols = SymbolTable::new();
        let _ = symbols.define("START", 0x8000, SymbolKind::Label, 2);
        let counts = PassCounts {
            lines: 10,
            errors: 0,
            warnings: 1,
        };
        let text = render(|w| w.footer(&counts, &symbols).unwrap());
        assert!(text.contains("10 lines, 0 errors, 1 warnings"));
        assert!(text.contains("START"));
        assert!(text.contains("$8000"));
    }

    #[test]
    fn wide_addresses_use_eight_digits() {
        assert_eq!(format_addr(0x10000), "00010000");
        assert_eq!(format_addr(0xFFFF), "FFFF");
    }
}
