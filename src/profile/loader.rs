// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Profile document loading and validation.
//!
//! Schema problems are fatal before pass 1 ever runs: a profile that
//! references undeclared modes, carries an uncompilable pattern, or names
//! a branch mnemonic without a relative entry is rejected here.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use regex::RegexBuilder;

use crate::core::assembler::error::{AsmError, AsmErrorKind, Severity};
use crate::profile::schema::{DirectiveDoc, ProfileDoc, RuleDoc, RulesDoc};
use crate::profile::{
    CpuInfo, CpuProfile, DirectiveKind, Endianness, ModePattern, OpcodeEntry, RuleCheck,
    ValidationRule,
};

fn profile_error(msg: &str, param: Option<&str>) -> AsmError {
    AsmError::new(AsmErrorKind::Profile, msg, param)
}

/// Load and validate a profile document from a file.
pub fn load_profile(path: &Path) -> Result<CpuProfile, AsmError> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        let shown = path.display().to_string();
        if err.kind() == std::io::ErrorKind::NotFound {
            AsmError::new(AsmErrorKind::Cli, "CPU profile not found", Some(&shown))
        } else {
            AsmError::new(AsmErrorKind::Io, "Cannot read CPU profile", Some(&shown))
        }
    })?;
    profile_from_str(&text)
}

/// Parse and validate a profile document from JSON text.
pub fn profile_from_str(text: &str) -> Result<CpuProfile, AsmError> {
    let doc: ProfileDoc = serde_json::from_str(text)
        .map_err(|err| profile_error("Invalid profile document", Some(&err.to_string())))?;
    build_profile(doc)
}

fn build_profile(doc: ProfileDoc) -> Result<CpuProfile, AsmError> {
    let endianness = match doc.cpu_info.endianness.as_str() {
        "little" => Endianness::Little,
        "big" => Endianness::Big,
        other => {
            return Err(profile_error(
                "Endianness must be \"little\" or \"big\"",
                Some(other),
            ))
        }
    };

    if doc.cpu_info.address_width == 0 || doc.cpu_info.address_width > 32 {
        return Err(profile_error(
            "Address width must be between 1 and 32 bits",
            Some(&doc.cpu_info.address_width.to_string()),
        ));
    }

    let addressing_modes = doc.addressing_modes;
    let implied_mode = doc
        .cpu_info
        .implied_mode
        .unwrap_or_else(|| "IMPLIED".to_string());
    if !addressing_modes.contains_key(&implied_mode) {
        return Err(profile_error(
            "Implied addressing mode is not declared",
            Some(&implied_mode),
        ));
    }

    let mut patterns = Vec::with_capacity(doc.addressing_mode_patterns.len());
    for entry in doc.addressing_mode_patterns {
        if !addressing_modes.contains_key(&entry.mode) {
            return Err(profile_error(
                "Pattern references undeclared addressing mode",
                Some(&entry.mode),
            ));
        }
        let mut builder = RegexBuilder::new(&entry.pattern);
        for flag in &entry.flags {
            match flag.as_str() {
                "IGNORECASE" => {
                    builder.case_insensitive(true);
                }
                other => {
                    return Err(profile_error("Unknown pattern flag", Some(other)));
                }
            }
        }
        let regex = builder.build().map_err(|err| {
            profile_error(
                "Addressing-mode pattern does not compile",
                Some(&format!("{}: {err}", entry.pattern)),
            )
        })?;
        if let Some(group) = entry.group_index {
            if group >= regex.captures_len() {
                return Err(profile_error(
                    "Pattern group index out of range",
                    Some(&format!("{}: group {group}", entry.pattern)),
                ));
            }
        }
        patterns.push(ModePattern {
            regex,
            mode: entry.mode,
            group_index: entry.group_index,
        });
    }

    let mut opcodes: BTreeMap<String, BTreeMap<String, OpcodeEntry>> = BTreeMap::new();
    for (mnemonic, modes) in doc.opcodes {
        let mnemonic = mnemonic.to_uppercase();
        let mut table = BTreeMap::new();
        for (mode, row) in modes {
            if !addressing_modes.contains_key(&mode) {
                return Err(profile_error(
                    "Opcode references undeclared addressing mode",
                    Some(&format!("{mnemonic}/{mode}")),
                ));
            }
            if row.operand_size > 2 {
                return Err(profile_error(
                    "Operand size must be 0, 1, or 2 bytes",
                    Some(&format!("{mnemonic}/{mode}")),
                ));
            }
            table.insert(
                mode,
                OpcodeEntry {
                    opcode_bytes: row.opcode_bytes,
                    operand_size: row.operand_size,
                    metadata: row.metadata,
                    flags_affected: row.flags_affected,
                },
            );
        }
        opcodes.insert(mnemonic, table);
    }

    let mut branch_mnemonics = BTreeSet::new();
    for mnemonic in doc.branch_mnemonics {
        let mnemonic = mnemonic.to_uppercase();
        let has_relative = opcodes
            .get(&mnemonic)
            .is_some_and(|modes| modes.values().any(|entry| entry.operand_size == 1));
        if !has_relative {
            return Err(profile_error(
                "Branch mnemonic has no single-byte-operand mode",
                Some(&mnemonic),
            ));
        }
        branch_mnemonics.insert(mnemonic);
    }

    let mut directives = BTreeMap::new();
    for (name, entry) in doc.directives {
        let name = name.to_uppercase();
        let kind = directive_kind(&name, &entry)?;
        directives.insert(name, kind);
    }

    let rules = build_rules(doc.validation_rules, &addressing_modes)?;

    Ok(CpuProfile {
        info: CpuInfo {
            name: doc.cpu_info.name,
            description: doc.cpu_info.description,
            data_width: doc.cpu_info.data_width,
            address_width: doc.cpu_info.address_width,
            endianness,
            fill_byte: doc.cpu_info.fill_byte.0,
            implied_mode,
        },
        addressing_modes,
        patterns,
        opcodes,
        branch_mnemonics,
        directives,
        rules,
    })
}

fn directive_kind(name: &str, entry: &DirectiveDoc) -> Result<DirectiveKind, AsmError> {
    match entry.action.as_str() {
        "set_origin" => Ok(DirectiveKind::SetOrigin),
        "define_constant" => Ok(DirectiveKind::DefineConstant),
        "emit_data" => {
            let unit = entry.unit_size.unwrap_or(1);
            if unit == 0 || unit > 2 {
                return Err(profile_error(
                    "Data directive unit size must be 1 or 2",
                    Some(name),
                ));
            }
            Ok(DirectiveKind::EmitData { unit_bytes: unit })
        }
        "stop" => Ok(DirectiveKind::Stop),
        other => Err(profile_error(
            "Unknown directive action",
            Some(&format!("{name}: {other}")),
        )),
    }
}

fn build_rules(
    doc: RulesDoc,
    addressing_modes: &BTreeMap<String, u32>,
) -> Result<Vec<ValidationRule>, AsmError> {
    match doc {
        RulesDoc::Generic(rules) => rules
            .into_iter()
            .map(|rule| generic_rule(rule, addressing_modes))
            .collect(),
        RulesDoc::Legacy(map) => {
            // Legacy shape: rule_name -> { MNEMONIC: [allowed modes] }.
            // Each mnemonic becomes an error_if_mode_is_not rule.
            let mut rules = Vec::new();
            for (_rule_name, entries) in map {
                for (mnemonic, allowed) in entries {
                    let mnemonic = mnemonic.to_uppercase();
                    for mode in &allowed {
                        check_rule_mode(mode, addressing_modes)?;
                    }
                    rules.push(ValidationRule {
                        severity: Severity::Error,
                        message: format!(
                            "Instruction '{mnemonic}' does not allow addressing mode '{{mode}}'"
                        ),
                        check: RuleCheck::ModeIsNot {
                            mnemonics: BTreeSet::from([mnemonic]),
                            modes: allowed.into_iter().collect(),
                        },
                    });
                }
            }
            Ok(rules)
        }
    }
}

fn check_rule_mode(
    mode: &str,
    addressing_modes: &BTreeMap<String, u32>,
) -> Result<(), AsmError> {
    if addressing_modes.contains_key(mode) {
        Ok(())
    } else {
        Err(profile_error(
            "Validation rule references undeclared addressing mode",
            Some(mode),
        ))
    }
}

fn generic_rule(
    rule: RuleDoc,
    addressing_modes: &BTreeMap<String, u32>,
) -> Result<ValidationRule, AsmError> {
    for mode in &rule.modes {
        check_rule_mode(mode, addressing_modes)?;
    }
    let mnemonics: BTreeSet<String> = rule.mnemonics.iter().map(|m| m.to_uppercase()).collect();
    let modes: BTreeSet<String> = rule.modes.iter().cloned().collect();
    let (severity, tail) = if let Some(tail) = rule.rule_type.strip_prefix("error_if_") {
        (Severity::Error, tail)
    } else if let Some(tail) = rule.rule_type.strip_prefix("warning_if_") {
        (Severity::Warning, tail)
    } else {
        return Err(profile_error(
            "Unknown validation rule type",
            Some(&rule.rule_type),
        ));
    };
    let check = match tail {
        "mode_is" => RuleCheck::ModeIs { mnemonics, modes },
        "mode_is_not" => RuleCheck::ModeIsNot { mnemonics, modes },
        "operand_out_of_range" => RuleCheck::OperandOutOfRange {
            min: rule.min.unwrap_or(i64::MIN),
            max: rule.max.unwrap_or(i64::MAX),
            exceptions: rule.exceptions.iter().map(|m| m.to_uppercase()).collect(),
        },
        "register_used" => RuleCheck::RegisterUsed {
            mnemonics,
            registers: rule.registers.clone(),
        },
        _ => {
            return Err(profile_error(
                "Unknown validation rule type",
                Some(&rule.rule_type),
            ))
        }
    };
    Ok(ValidationRule {
        severity,
        message: rule.message,
        check,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_doc() -> serde_json::Value {
        json!({
            "cpu_info": {
                "name": "TEST8",
                "endianness": "little"
            },
            "addressing_modes": {
                "IMPLIED": 0,
                "IMMEDIATE": 1,
                "ABSOLUTE": 2,
                "RELATIVE": 3
            },
            "addressing_mode_patterns": [
                { "pattern": "^#(.+)$", "mode": "IMMEDIATE", "group_index": 1 },
                { "pattern": "^(.+)$", "mode": "ABSOLUTE", "group_index": 1, "flags": ["IGNORECASE"] }
            ],
            "opcodes": {
                "LDA": {
                    "IMMEDIATE": ["0xA9", 1, { "base": 2 }, "NZ"],
                    "ABSOLUTE": ["0xAD", 2, { "base": 4 }, "NZ"]
                },
                "NOP": { "IMPLIED": ["0xEA", 0] },
                "BRA": { "RELATIVE": ["0x80", 1] }
            },
            "branch_mnemonics": ["BRA"],
            "directives": {
                ".ORG": { "action": "set_origin" },
                "EQU": { "action": "define_constant" },
                ".BYTE": { "action": "emit_data", "unit_size": 1 },
                ".WORD": { "action": "emit_data", "unit_size": 2 },
                ".END": { "action": "stop" }
            },
            "validation_rules": []
        })
    }

    fn load(doc: serde_json::Value) -> Result<CpuProfile, AsmError> {
        profile_from_str(&doc.to_string())
    }

    #[test]
    fn loads_minimal_profile() {
        let profile = load(minimal_doc()).expect("profile should load");
        assert_eq!(profile.info.name, "TEST8");
        assert_eq!(profile.info.endianness, Endianness::Little);
        assert_eq!(profile.info.implied_mode, "IMPLIED");
        assert_eq!(profile.mode_tag("IMMEDIATE"), Some(1));
        let entry = profile.opcode_entry("LDA", "IMMEDIATE").unwrap();
        assert_eq!(entry.opcode_bytes, vec![0xA9]);
        assert_eq!(entry.operand_size, 1);
        assert!(profile.is_branch("BRA"));
        assert_eq!(
            profile.directive(".WORD"),
            Some(DirectiveKind::EmitData { unit_bytes: 2 })
        );
    }

    #[test]
    fn rejects_unknown_endianness() {
        let mut doc = minimal_doc();
        doc["cpu_info"]["endianness"] = json!("middle");
        let err = load(doc).unwrap_err();
        assert!(err.message().contains("Endianness"));
    }

    #[test]
    fn rejects_pattern_with_undeclared_mode() {
        let mut doc = minimal_doc();
        doc["addressing_mode_patterns"][0]["mode"] = json!("NOWHERE");
        let err = load(doc).unwrap_err();
        assert!(err.message().contains("undeclared addressing mode"));
    }

    #[test]
    fn rejects_out_of_range_group_index() {
        let mut doc = minimal_doc();
        doc["addressing_mode_patterns"][0]["group_index"] = json!(4);
        let err = load(doc).unwrap_err();
        assert!(err.message().contains("group index"));
    }

    #[test]
    fn rejects_uncompilable_pattern() {
        let mut doc = minimal_doc();
        doc["addressing_mode_patterns"][0]["pattern"] = json!("^([)$");
        let err = load(doc).unwrap_err();
        assert!(err.message().contains("does not compile"));
    }

    #[test]
    fn rejects_opcode_with_undeclared_mode() {
        let mut doc = minimal_doc();
        doc["opcodes"]["LDA"]["NOWHERE"] = json!(["0xA9", 1]);
        let err = load(doc).unwrap_err();
        assert!(err.message().contains("undeclared addressing mode"));
    }

    #[test]
    fn rejects_branch_without_relative_entry() {
        let mut doc = minimal_doc();
        doc["branch_mnemonics"] = json!(["NOP"]);
        let err = load(doc).unwrap_err();
        assert!(err.message().contains("single-byte-operand"));
    }

    #[test]
    fn rejects_oversized_operand() {
        let mut doc = minimal_doc();
        doc["opcodes"]["LDA"]["IMMEDIATE"] = json!(["0xA9", 3]);
        let err = load(doc).unwrap_err();
        assert!(err.message().contains("Operand size"));
    }

    #[test]
    fn rejects_unknown_directive_action() {
        let mut doc = minimal_doc();
        doc["directives"][".ORG"] = json!({ "action": "teleport" });
        let err = load(doc).unwrap_err();
        assert!(err.message().contains("directive action"));
    }

    #[test]
    fn rejects_undeclared_implied_mode() {
        let mut doc = minimal_doc();
        doc["cpu_info"]["implied_mode"] = json!("INHERENT");
        let err = load(doc).unwrap_err();
        assert!(err.message().contains("Implied addressing mode"));
    }

    #[test]
    fn multibyte_opcode_prefixes_survive() {
        let mut doc = minimal_doc();
        doc["opcodes"]["SWI2"] = json!({ "IMPLIED": [["0x10", "0x3F"], 0] });
        let profile = load(doc).unwrap();
        let entry = profile.opcode_entry("SWI2", "IMPLIED").unwrap();
        assert_eq!(entry.opcode_bytes, vec![0x10, 0x3F]);
        assert_eq!(entry.total_size(), 2);
    }

    #[test]
    fn generic_rules_parse() {
        let mut doc = minimal_doc();
        doc["validation_rules"] = json!([
            {
                "type": "warning_if_mode_is",
                "mnemonics": ["LDA"],
                "modes": ["ABSOLUTE"],
                "message": "consider zero page for {mnemonic}"
            },
            {
                "type": "error_if_operand_out_of_range",
                "min": 0,
                "max": 255,
                "exceptions": ["JMP"],
                "message": "value {value} too large"
            }
        ]);
        let profile = load(doc).unwrap();
        assert_eq!(profile.rules.len(), 2);
        assert_eq!(profile.rules[0].severity, Severity::Warning);
        assert_eq!(profile.rules[1].severity, Severity::Error);
    }

    #[test]
    fn legacy_rules_rewrite_to_mode_is_not() {
        let mut doc = minimal_doc();
        doc["validation_rules"] = json!({
            "inherent_only": { "NOP": ["IMPLIED"] }
        });
        let profile = load(doc).unwrap();
        assert_eq!(profile.rules.len(), 1);
        let rule = &profile.rules[0];
        assert_eq!(rule.severity, Severity::Error);
        match &rule.check {
            RuleCheck::ModeIsNot { mnemonics, modes } => {
                assert!(mnemonics.contains("NOP"));
                assert!(modes.contains("IMPLIED"));
            }
            other => panic!("expected ModeIsNot, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_rule_type() {
        let mut doc = minimal_doc();
        doc["validation_rules"] = json!([
            { "type": "error_if_moon_phase", "message": "nope" }
        ]);
        let err = load(doc).unwrap_err();
        assert!(err.message().contains("rule type"));
    }

    #[test]
    fn rejects_rule_with_undeclared_mode() {
        let mut doc = minimal_doc();
        doc["validation_rules"] = json!([
            {
                "type": "error_if_mode_is",
                "mnemonics": ["LDA"],
                "modes": ["NOWHERE"],
                "message": "nope"
            }
        ]);
        let err = load(doc).unwrap_err();
        assert!(err.message().contains("undeclared addressing mode"));
    }

    #[test]
    fn missing_profile_file_is_a_cli_error() {
        let err = load_profile(Path::new("/nonexistent/profiles/zz80.json")).unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::Cli);
    }
}
