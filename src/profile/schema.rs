// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Raw profile document schema.
//!
//! These types mirror the JSON document one-to-one; the loader turns them
//! into the validated in-memory model. Opcode and fill bytes accept both
//! integers and `$AB`/`0xAB` hex strings so tables stay readable, and
//! opcode bytes may be a single value or an array (multi-byte prefixes).

use std::collections::BTreeMap;

use serde::de::{Deserializer, Error as DeError};
use serde::Deserialize;
use serde_json::Value;

use crate::core::expr::parse_number;

#[derive(Debug, Deserialize)]
pub struct ProfileDoc {
    pub cpu_info: CpuInfoDoc,
    pub addressing_modes: BTreeMap<String, u32>,
    #[serde(default)]
    pub addressing_mode_patterns: Vec<ModePatternDoc>,
    pub opcodes: BTreeMap<String, BTreeMap<String, OpcodeDoc>>,
    #[serde(default)]
    pub branch_mnemonics: Vec<String>,
    #[serde(default)]
    pub directives: BTreeMap<String, DirectiveDoc>,
    #[serde(default)]
    pub validation_rules: RulesDoc,
}

#[derive(Debug, Deserialize)]
pub struct CpuInfoDoc {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_data_width")]
    pub data_width: u8,
    #[serde(default = "default_address_width")]
    pub address_width: u8,
    #[serde(default = "default_endianness")]
    pub endianness: String,
    #[serde(default)]
    pub fill_byte: ByteValue,
    #[serde(default)]
    pub implied_mode: Option<String>,
}

fn default_data_width() -> u8 {
    8
}

fn default_address_width() -> u8 {
    16
}

fn default_endianness() -> String {
    "little".to_string()
}

/// A byte given as an integer or a hex string.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ByteValue(pub u8);

impl<'de> Deserialize<'de> for ByteValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        byte_from_value(&value)
            .map(ByteValue)
            .ok_or_else(|| D::Error::custom(format!("invalid byte value: {value}")))
    }
}

#[derive(Debug, Deserialize)]
pub struct ModePatternDoc {
    pub pattern: String,
    pub mode: String,
    #[serde(default)]
    pub group_index: Option<usize>,
    #[serde(default)]
    pub flags: Vec<String>,
}

/// One opcode table row: `[opcode_bytes, operand_size, metadata?, flags?]`.
#[derive(Debug, Clone)]
pub struct OpcodeDoc {
    pub opcode_bytes: Vec<u8>,
    pub operand_size: u8,
    pub metadata: Value,
    pub flags_affected: String,
}

impl<'de> Deserialize<'de> for OpcodeDoc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let row = value
            .as_array()
            .ok_or_else(|| D::Error::custom("opcode entry must be an array"))?;
        if row.len() < 2 {
            return Err(D::Error::custom(
                "opcode entry needs at least [opcode, operand_size]",
            ));
        }
        let opcode_bytes = opcode_bytes_from_value(&row[0])
            .ok_or_else(|| D::Error::custom(format!("invalid opcode bytes: {}", row[0])))?;
        let operand_size = row[1]
            .as_u64()
            .and_then(|size| u8::try_from(size).ok())
            .ok_or_else(|| D::Error::custom(format!("invalid operand size: {}", row[1])))?;
        let metadata = row.get(2).cloned().unwrap_or(Value::Null);
        let flags_affected = row
            .get(3)
            .and_then(|flags| flags.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(OpcodeDoc {
            opcode_bytes,
            operand_size,
            metadata,
            flags_affected,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct DirectiveDoc {
    pub action: String,
    #[serde(default)]
    pub unit_size: Option<u8>,
}

/// Validation rules: the generic list form or the legacy map form
/// (`rule_name -> { MNEMONIC: [allowed modes] }`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RulesDoc {
    Generic(Vec<RuleDoc>),
    Legacy(BTreeMap<String, BTreeMap<String, Vec<String>>>),
}

impl Default for RulesDoc {
    fn default() -> Self {
        RulesDoc::Generic(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
pub struct RuleDoc {
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(default)]
    pub mnemonics: Vec<String>,
    #[serde(default)]
    pub modes: Vec<String>,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
    #[serde(default)]
    pub exceptions: Vec<String>,
    #[serde(default)]
    pub registers: Vec<String>,
    pub message: String,
}

/// Interpret a JSON value as one byte: an integer or a numeric string
/// (`"$A9"`, `"0xA9"`, decimal).
pub fn byte_from_value(value: &Value) -> Option<u8> {
    match value {
        Value::Number(num) => {
            let val = num.as_u64()?;
            u8::try_from(val).ok()
        }
        Value::String(text) => {
            let val = parse_number(text)?;
            u8::try_from(val).ok()
        }
        _ => None,
    }
}

/// Interpret a JSON value as an opcode byte sequence: a single byte value
/// or a non-empty array of them.
pub fn opcode_bytes_from_value(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return None;
            }
            items.iter().map(byte_from_value).collect()
        }
        other => byte_from_value(other).map(|byte| vec![byte]),
    }
}
