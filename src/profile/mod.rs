// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Declarative CPU profiles.
//!
//! A profile is loaded once from a JSON document and drives everything
//! CPU-specific: addressing-mode recognition, opcode lookup, directives,
//! and validation rules. Retargeting the assembler means loading another
//! document; no code changes are involved.

pub mod loader;
pub mod rules;
pub mod schema;

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

pub use loader::{load_profile, profile_from_str};
pub use rules::{RuleCheck, RuleContext, ValidationRule};

/// Byte order for multi-byte operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endianness::Little => "little",
            Endianness::Big => "big",
        }
    }
}

/// General facts about the target CPU.
#[derive(Debug, Clone)]
pub struct CpuInfo {
    pub name: String,
    pub description: String,
    pub data_width: u8,
    pub address_width: u8,
    pub endianness: Endianness,
    pub fill_byte: u8,
    /// Name of the operand-less addressing mode (IMPLIED, INHERENT, ...).
    pub implied_mode: String,
}

/// One entry of the ordered addressing-mode pattern list.
#[derive(Debug, Clone)]
pub struct ModePattern {
    pub regex: Regex,
    pub mode: String,
    pub group_index: Option<usize>,
}

/// One opcode table entry: `(opcode_bytes, operand_size, metadata, flags)`.
#[derive(Debug, Clone)]
pub struct OpcodeEntry {
    pub opcode_bytes: Vec<u8>,
    pub operand_size: u8,
    /// Opaque cycle-count/description metadata; never affects encoding.
    pub metadata: serde_json::Value,
    pub flags_affected: String,
}

impl OpcodeEntry {
    /// Total encoded size of an instruction using this entry.
    pub fn total_size(&self) -> u32 {
        self.opcode_bytes.len() as u32 + u32::from(self.operand_size)
    }
}

/// Typed directive action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    SetOrigin,
    DefineConstant,
    EmitData { unit_bytes: u8 },
    Stop,
}

/// Result of addressing-mode recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeMatch {
    pub mode: String,
    pub expr_text: Option<String>,
}

/// A validated, immutable CPU profile.
#[derive(Debug)]
pub struct CpuProfile {
    pub info: CpuInfo,
    pub addressing_modes: BTreeMap<String, u32>,
    pub patterns: Vec<ModePattern>,
    pub opcodes: BTreeMap<String, BTreeMap<String, OpcodeEntry>>,
    pub branch_mnemonics: BTreeSet<String>,
    pub directives: BTreeMap<String, DirectiveKind>,
    pub rules: Vec<ValidationRule>,
}

impl CpuProfile {
    /// Integer tag of a declared addressing mode.
    pub fn mode_tag(&self, name: &str) -> Option<u32> {
        self.addressing_modes.get(name).copied()
    }

    pub fn has_mode(&self, name: &str) -> bool {
        self.addressing_modes.contains_key(name)
    }

    pub fn is_directive(&self, name: &str) -> bool {
        self.directives.contains_key(name)
    }

    pub fn directive(&self, name: &str) -> Option<DirectiveKind> {
        self.directives.get(name).copied()
    }

    pub fn is_mnemonic(&self, name: &str) -> bool {
        self.opcodes.contains_key(name)
    }

    pub fn is_branch(&self, mnemonic: &str) -> bool {
        self.branch_mnemonics.contains(mnemonic)
    }

    pub fn opcode_entry(&self, mnemonic: &str, mode: &str) -> Option<&OpcodeEntry> {
        self.opcodes.get(mnemonic)?.get(mode)
    }

    /// The single-byte-operand entry a branch falls back to when the
    /// recognizer reports a non-relative mode for its label operand.
    /// The loader guarantees every branch mnemonic has one.
    pub fn branch_relative_entry(&self, mnemonic: &str) -> Option<(&str, &OpcodeEntry)> {
        let modes = self.opcodes.get(mnemonic)?;
        modes
            .iter()
            .find(|(_, entry)| entry.operand_size == 1)
            .map(|(mode, entry)| (mode.as_str(), entry))
    }

    /// Recognize the addressing mode of an operand field.
    ///
    /// Empty text is the implied mode. Otherwise the ordered pattern list
    /// decides: first match wins. Returns `None` when nothing matches.
    pub fn match_operand(&self, operand: &str) -> Option<ModeMatch> {
        let trimmed = operand.trim();
        if trimmed.is_empty() {
            return Some(ModeMatch {
                mode: self.info.implied_mode.clone(),
                expr_text: None,
            });
        }
        for pattern in &self.patterns {
            let Some(caps) = pattern.regex.captures(trimmed) else {
                continue;
            };
            let expr_text = match pattern.group_index {
                Some(idx) => caps.get(idx).map(|m| m.as_str().to_string()),
                None => {
                    let stripped = strip_syntax_markers(trimmed);
                    if stripped.is_empty() {
                        None
                    } else {
                        Some(stripped)
                    }
                }
            };
            return Some(ModeMatch {
                mode: pattern.mode.clone(),
                expr_text,
            });
        }
        None
    }
}

/// Remove addressing-syntax markers from an operand, leaving the bare
/// expression: leading `#`, enclosing parentheses, and trailing `,X`/`,Y`
/// index suffixes.
pub fn strip_syntax_markers(text: &str) -> String {
    let mut current = text.trim().to_string();
    loop {
        let before = current.len();
        if let Some(rest) = current.strip_prefix('#') {
            current = rest.trim().to_string();
        }
        for suffix in [",X", ",x", ",Y", ",y"] {
            if let Some(rest) = current.strip_suffix(suffix) {
                current = rest.trim_end().to_string();
                break;
            }
        }
        if current.starts_with('(') && current.ends_with(')') && current.len() >= 2 {
            current = current[1..current.len() - 1].trim().to_string();
        }
        if current.len() == before {
            return current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_markers_immediate() {
        assert_eq!(strip_syntax_markers("#$42"), "$42");
        assert_eq!(strip_syntax_markers("# VALUE"), "VALUE");
    }

    #[test]
    fn strip_markers_indexed_and_indirect() {
        assert_eq!(strip_syntax_markers("$10,X"), "$10");
        assert_eq!(strip_syntax_markers("$10,y"), "$10");
        assert_eq!(strip_syntax_markers("($20,X)"), "$20");
        assert_eq!(strip_syntax_markers("($20),Y"), "$20");
        assert_eq!(strip_syntax_markers("($1234)"), "$1234");
    }

    #[test]
    fn strip_markers_leaves_plain_expressions() {
        assert_eq!(strip_syntax_markers("LABEL+2"), "LABEL+2");
        assert_eq!(strip_syntax_markers("$FFFE"), "$FFFE");
    }
}
