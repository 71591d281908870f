// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Declarative validation-rule engine.
//!
//! Rules come from the profile document and run against every instruction
//! in pass 2. Each rule pairs a severity with a check; the engine turns
//! hits into diagnostics. Nothing here is CPU-specific.

use std::collections::BTreeSet;

use crate::core::assembler::error::Severity;

/// The condition a rule tests.
#[derive(Debug, Clone)]
pub enum RuleCheck {
    /// Fires when the mnemonic is in `mnemonics` and the mode is in `modes`.
    ModeIs {
        mnemonics: BTreeSet<String>,
        modes: BTreeSet<String>,
    },
    /// Fires when the mnemonic is in `mnemonics` and the mode is NOT in `modes`.
    ModeIsNot {
        mnemonics: BTreeSet<String>,
        modes: BTreeSet<String>,
    },
    /// Fires when the operand value falls outside `min..=max`, unless the
    /// mnemonic is listed as an exception. An empty `mnemonics` set means
    /// every mnemonic.
    OperandOutOfRange {
        min: i64,
        max: i64,
        exceptions: BTreeSet<String>,
    },
    /// Fires when the raw operand mentions one of the registers as a
    /// standalone token.
    RegisterUsed {
        mnemonics: BTreeSet<String>,
        registers: Vec<String>,
    },
}

/// One validation rule: a severity, a message template, and a check.
///
/// Message templates may interpolate `{mnemonic}`, `{mode}`, and `{value}`.
#[derive(Debug, Clone)]
pub struct ValidationRule {
    pub severity: Severity,
    pub message: String,
    pub check: RuleCheck,
}

/// Instruction facts a rule can look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub mnemonic: &'a str,
    pub mode: &'a str,
    pub value: Option<i64>,
    pub operand_text: &'a str,
}

impl ValidationRule {
    /// Whether this rule fires for the given instruction.
    pub fn fires(&self, ctx: &RuleContext<'_>) -> bool {
        match &self.check {
            RuleCheck::ModeIs { mnemonics, modes } => {
                mnemonics.contains(ctx.mnemonic) && modes.contains(ctx.mode)
            }
            RuleCheck::ModeIsNot { mnemonics, modes } => {
                mnemonics.contains(ctx.mnemonic) && !modes.contains(ctx.mode)
            }
            RuleCheck::OperandOutOfRange {
                min,
                max,
                exceptions,
            } => match ctx.value {
                Some(value) => {
                    !exceptions.contains(ctx.mnemonic) && (value < *min || value > *max)
                }
                None => false,
            },
            RuleCheck::RegisterUsed {
                mnemonics,
                registers,
            } => {
                mnemonics.contains(ctx.mnemonic)
                    && registers
                        .iter()
                        .any(|reg| operand_mentions_register(ctx.operand_text, reg))
            }
        }
    }

    /// The message with `{mnemonic}`, `{mode}`, `{value}` interpolated.
    pub fn render_message(&self, ctx: &RuleContext<'_>) -> String {
        let value_text = match ctx.value {
            Some(value) => value.to_string(),
            None => "?".to_string(),
        };
        self.message
            .replace("{mnemonic}", ctx.mnemonic)
            .replace("{mode}", ctx.mode)
            .replace("{value}", &value_text)
    }
}

/// Run every rule against one instruction, in declared order.
pub fn run_rules(rules: &[ValidationRule], ctx: &RuleContext<'_>) -> Vec<(Severity, String)> {
    rules
        .iter()
        .filter(|rule| rule.fires(ctx))
        .map(|rule| (rule.severity, rule.render_message(ctx)))
        .collect()
}

/// True when `register` appears in the operand as its own token,
/// case-insensitively. `$10,X` mentions X; `XPOS` does not.
fn operand_mentions_register(operand: &str, register: &str) -> bool {
    operand
        .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .any(|token| token.eq_ignore_ascii_case(register))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ctx<'a>(mnemonic: &'a str, mode: &'a str, value: Option<i64>, operand: &'a str) -> RuleContext<'a> {
        RuleContext {
            mnemonic,
            mode,
            value,
            operand_text: operand,
        }
    }

    #[test]
    fn mode_is_fires_on_listed_combination() {
        let rule = ValidationRule {
            severity: Severity::Error,
            message: "{mnemonic} does not support {mode}".to_string(),
            check: RuleCheck::ModeIs {
                mnemonics: set(&["ASL", "LSR"]),
                modes: set(&["IMMEDIATE"]),
            },
        };
        assert!(rule.fires(&ctx("ASL", "IMMEDIATE", Some(1), "#1")));
        assert!(!rule.fires(&ctx("ASL", "ABSOLUTE", Some(1), "$1000")));
        assert!(!rule.fires(&ctx("LDA", "IMMEDIATE", Some(1), "#1")));
        assert_eq!(
            rule.render_message(&ctx("ASL", "IMMEDIATE", Some(1), "#1")),
            "ASL does not support IMMEDIATE"
        );
    }

    #[test]
    fn mode_is_not_fires_outside_allowed_modes() {
        let rule = ValidationRule {
            severity: Severity::Error,
            message: "{mnemonic} only allows implied mode".to_string(),
            check: RuleCheck::ModeIsNot {
                mnemonics: set(&["NOP"]),
                modes: set(&["IMPLIED"]),
            },
        };
        assert!(rule.fires(&ctx("NOP", "ABSOLUTE", Some(16), "$10")));
        assert!(!rule.fires(&ctx("NOP", "IMPLIED", None, "")));
    }

    #[test]
    fn range_rule_respects_exceptions_and_missing_values() {
        let rule = ValidationRule {
            severity: Severity::Warning,
            message: "value {value} outside range".to_string(),
            check: RuleCheck::OperandOutOfRange {
                min: 0,
                max: 255,
                exceptions: set(&["JMP"]),
            },
        };
        assert!(rule.fires(&ctx("LDA", "ABSOLUTE", Some(300), "$12C")));
        assert!(!rule.fires(&ctx("JMP", "ABSOLUTE", Some(300), "$12C")));
        assert!(!rule.fires(&ctx("LDA", "ABSOLUTE", Some(255), "$FF")));
        assert!(!rule.fires(&ctx("NOP", "IMPLIED", None, "")));
        assert_eq!(
            rule.render_message(&ctx("LDA", "ABSOLUTE", Some(300), "$12C")),
            "value 300 outside range"
        );
    }

    #[test]
    fn register_rule_matches_tokens_not_substrings() {
        let rule = ValidationRule {
            severity: Severity::Warning,
            message: "{mnemonic} with Y operand".to_string(),
            check: RuleCheck::RegisterUsed {
                mnemonics: set(&["LDX"]),
                registers: vec!["Y".to_string()],
            },
        };
        assert!(rule.fires(&ctx("LDX", "ABSOLUTE", Some(0), "Y")));
        assert!(rule.fires(&ctx("LDX", "ABSOLUTE", Some(0), "$10,Y")));
        assert!(!rule.fires(&ctx("LDX", "ABSOLUTE", Some(0), "YPOS")));
        assert!(!rule.fires(&ctx("LDA", "ABSOLUTE", Some(0), "Y")));
    }

    #[test]
    fn run_rules_preserves_declared_order() {
        let rules = vec![
            ValidationRule {
                severity: Severity::Warning,
                message: "first".to_string(),
                check: RuleCheck::ModeIs {
                    mnemonics: set(&["LDA"]),
                    modes: set(&["ABSOLUTE"]),
                },
            },
            ValidationRule {
                severity: Severity::Error,
                message: "second".to_string(),
                check: RuleCheck::ModeIs {
                    mnemonics: set(&["LDA"]),
                    modes: set(&["ABSOLUTE"]),
                },
            },
        ];
        let hits = run_rules(&rules, &ctx("LDA", "ABSOLUTE", Some(0x50), "$0050"));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, Severity::Warning);
        assert_eq!(hits[0].1, "first");
        assert_eq!(hits[1].1, "second");
    }
}
