// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The two-pass engine.
//!
//! Pass 1 sizes every instruction, assigns addresses, and populates the
//! symbol table. Pass 2 evaluates operands against the completed table,
//! runs the profile's validation rules, and encodes machine bytes. A
//! failing line keeps its reserved size but produces no bytes, so later
//! addresses stay valid and one run surfaces as many errors as possible.

use crate::core::assembler::error::{AsmError, AsmErrorKind, Diagnostic, PassCounts, Severity};
use crate::core::expr::{eval_expr, value_fits_operand, SymbolTableContext};
use crate::core::parser::{parse_operand, parse_operand_list, Span};
use crate::core::symbol_table::{SymbolKind, SymbolTable, SymbolTableResult};
use crate::profile::rules::{run_rules, RuleContext};
use crate::profile::{CpuProfile, DirectiveKind, Endianness};

use super::srcline::split_line;
use super::{Instruction, InstructionKind, Operand, Program};

/// One assembly run over a fixed profile.
pub struct Assembler<'a> {
    profile: &'a CpuProfile,
    pub symbols: SymbolTable,
    pub diagnostics: Vec<Diagnostic>,
}

/// Everything a finished run produced.
pub struct AssemblyOutput {
    pub program: Program,
    pub symbols: SymbolTable,
    pub diagnostics: Vec<Diagnostic>,
    pub pass1: PassCounts,
    pub pass2: PassCounts,
}

impl AssemblyOutput {
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|diag| diag.severity() == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|diag| diag.severity() == Severity::Warning)
            .count()
    }
}

/// Assemble source text with the given profile. Convenience wrapper for
/// callers that have the source in one string.
pub fn assemble(source: &str, profile: &CpuProfile, start_address: u32) -> AssemblyOutput {
    let lines: Vec<String> = source.lines().map(str::to_string).collect();
    assemble_lines(&lines, profile, start_address)
}

/// Assemble pre-split source lines with the given profile.
pub fn assemble_lines(
    lines: &[String],
    profile: &CpuProfile,
    start_address: u32,
) -> AssemblyOutput {
    let mut assembler = Assembler::new(profile);
    let mut program = Program::new();
    program.instructions = assembler.parse_lines(lines);
    let pass1 = assembler.pass1(&mut program, start_address);
    let pass2 = assembler.pass2(&mut program);
    AssemblyOutput {
        program,
        symbols: assembler.symbols,
        diagnostics: assembler.diagnostics,
        pass1,
        pass2,
    }
}

fn push_diag(
    diagnostics: &mut Vec<Diagnostic>,
    counts: &mut PassCounts,
    line: u32,
    severity: Severity,
    kind: AsmErrorKind,
    msg: &str,
    param: Option<&str>,
    column: Option<usize>,
) {
    let diag = Diagnostic::new(line, severity, AsmError::new(kind, msg, param)).with_column(column);
    diagnostics.push(diag);
    match severity {
        Severity::Error => counts.errors += 1,
        Severity::Warning => counts.warnings += 1,
    }
}

fn define_symbol(
    symbols: &mut SymbolTable,
    diagnostics: &mut Vec<Diagnostic>,
    counts: &mut PassCounts,
    name: &str,
    value: i64,
    kind: SymbolKind,
    line: u32,
) {
    match symbols.define(name, value, kind, line) {
        SymbolTableResult::Ok => {}
        SymbolTableResult::Duplicate => {
            push_diag(
                diagnostics,
                counts,
                line,
                Severity::Error,
                AsmErrorKind::Symbol,
                "Duplicate symbol",
                Some(name),
                None,
            );
        }
    }
}

/// Translate an expression span into a source-line column.
fn span_column(operand_col: usize, span: Span) -> Option<usize> {
    if span.col_start == 0 {
        None
    } else {
        Some(operand_col + span.col_start - 1)
    }
}

impl<'a> Assembler<'a> {
    pub fn new(profile: &'a CpuProfile) -> Self {
        Self {
            profile,
            symbols: SymbolTable::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Split raw lines into instruction records. Only syntax is handled
    /// here; sizing and operand parsing belong to pass 1.
    pub fn parse_lines(&mut self, lines: &[String]) -> Vec<Instruction> {
        let mut instructions = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            let line_num = (idx + 1) as u32;
            let split = split_line(line);
            let mut instr = Instruction::new(line_num, line);
            if let Some(warning) = split.label_warning {
                self.diagnostics.push(Diagnostic::new(
                    line_num,
                    Severity::Warning,
                    AsmError::new(AsmErrorKind::Parser, &warning, None),
                ));
            }
            instr.label = split.label;
            instr.operand_text = split.operand_text;
            instr.operand_col = split.operand_col;
            match split.name {
                None => instr.kind = InstructionKind::Empty,
                Some(name) => {
                    instr.kind = if self.profile.is_directive(&name) {
                        InstructionKind::Directive
                    } else {
                        InstructionKind::Instruction
                    };
                    instr.name = name;
                }
            }
            instructions.push(instr);
        }
        instructions
    }

    /// Pass 1: assign addresses and sizes, define symbols.
    pub fn pass1(&mut self, program: &mut Program, start_address: u32) -> PassCounts {
        let mut counts = PassCounts::new();
        let mut addr = start_address;
        let mut stop_at = None;

        let profile = self.profile;
        let symbols = &mut self.symbols;
        let diagnostics = &mut self.diagnostics;

        for (idx, instr) in program.instructions.iter_mut().enumerate() {
            let line = instr.line_num;
            instr.address = addr;

            let directive = match instr.kind {
                InstructionKind::Directive => profile.directive(&instr.name),
                _ => None,
            };

            // EQU binds the label to the evaluated value, not the address,
            // so it skips the generic label definition below.
            if matches!(directive, Some(DirectiveKind::DefineConstant)) {
                let Some(label) = instr.label.clone() else {
                    push_diag(
                        diagnostics,
                        &mut counts,
                        line,
                        Severity::Error,
                        AsmErrorKind::Directive,
                        "EQU requires a label",
                        None,
                        None,
                    );
                    instr.errored = true;
                    continue;
                };
                match eval_now(symbols, &instr.operand_text, instr.operand_col) {
                    Ok((value, operand)) => {
                        instr.operand = operand;
                        instr.equ_value = Some(value);
                        define_symbol(
                            symbols,
                            diagnostics,
                            &mut counts,
                            &label,
                            value,
                            SymbolKind::Equate,
                            line,
                        );
                    }
                    Err((msg, column)) => {
                        push_diag(
                            diagnostics,
                            &mut counts,
                            line,
                            Severity::Error,
                            AsmErrorKind::Expression,
                            &msg,
                            None,
                            column,
                        );
                        instr.errored = true;
                    }
                }
                continue;
            }

            // .ORG moves the address pointer before the label (if any) is
            // defined, so a label on the same line lands on the new origin.
            if matches!(directive, Some(DirectiveKind::SetOrigin)) {
                match eval_now(symbols, &instr.operand_text, instr.operand_col) {
                    Ok((value, operand)) => {
                        let limit = 1i64 << profile.info.address_width;
                        if (0..limit).contains(&value) {
                            addr = value as u32;
                            instr.address = addr;
                            instr.operand = operand;
                        } else {
                            push_diag(
                                diagnostics,
                                &mut counts,
                                line,
                                Severity::Error,
                                AsmErrorKind::Directive,
                                "Origin out of address range",
                                Some(&value.to_string()),
                                None,
                            );
                            instr.errored = true;
                        }
                    }
                    Err((msg, column)) => {
                        push_diag(
                            diagnostics,
                            &mut counts,
                            line,
                            Severity::Error,
                            AsmErrorKind::Expression,
                            &msg,
                            None,
                            column,
                        );
                        instr.errored = true;
                    }
                }
            }

            if let Some(label) = instr.label.clone() {
                define_symbol(
                    symbols,
                    diagnostics,
                    &mut counts,
                    &label,
                    i64::from(instr.address),
                    SymbolKind::Label,
                    line,
                );
            }

            match instr.kind {
                InstructionKind::Empty => {}
                InstructionKind::Directive => match directive {
                    Some(DirectiveKind::SetOrigin) | Some(DirectiveKind::DefineConstant) => {}
                    Some(DirectiveKind::EmitData { unit_bytes }) => {
                        if instr.operand_text.is_empty() {
                            push_diag(
                                diagnostics,
                                &mut counts,
                                line,
                                Severity::Error,
                                AsmErrorKind::Directive,
                                "Missing operand for data directive",
                                Some(&instr.name),
                                None,
                            );
                            instr.errored = true;
                            continue;
                        }
                        match parse_operand_list(&instr.operand_text) {
                            Ok(outcome) => {
                                for issue in &outcome.recovered {
                                    push_diag(
                                        diagnostics,
                                        &mut counts,
                                        line,
                                        Severity::Error,
                                        AsmErrorKind::Expression,
                                        &issue.message,
                                        None,
                                        span_column(instr.operand_col, issue.span),
                                    );
                                }
                                instr.size = outcome.exprs.len() as u32 * u32::from(unit_bytes);
                                instr.operand = Operand::List(outcome.exprs);
                                addr = addr.wrapping_add(instr.size);
                            }
                            Err(err) => {
                                push_diag(
                                    diagnostics,
                                    &mut counts,
                                    line,
                                    Severity::Error,
                                    AsmErrorKind::Expression,
                                    &err.message,
                                    None,
                                    span_column(instr.operand_col, err.span),
                                );
                                instr.errored = true;
                            }
                        }
                    }
                    Some(DirectiveKind::Stop) => {
                        stop_at = Some(idx);
                        break;
                    }
                    None => {
                        push_diag(
                            diagnostics,
                            &mut counts,
                            line,
                            Severity::Error,
                            AsmErrorKind::Directive,
                            "Unknown directive",
                            Some(&instr.name),
                            None,
                        );
                        instr.errored = true;
                    }
                },
                InstructionKind::Instruction => {
                    size_instruction(profile, diagnostics, &mut counts, instr);
                    addr = addr.wrapping_add(instr.size);
                }
            }
        }

        if let Some(idx) = stop_at {
            program.instructions.truncate(idx + 1);
        }
        counts.lines = program.instructions.len() as u32;
        program.origin = addr;
        counts
    }

    /// Pass 2: evaluate, validate, encode.
    pub fn pass2(&mut self, program: &mut Program) -> PassCounts {
        let mut counts = PassCounts::new();
        counts.lines = program.instructions.len() as u32;

        let profile = self.profile;
        let symbols = &self.symbols;
        let diagnostics = &mut self.diagnostics;

        for instr in program.instructions.iter_mut() {
            if instr.errored {
                continue;
            }
            match instr.kind {
                InstructionKind::Empty => {}
                InstructionKind::Directive => {
                    if let Some(DirectiveKind::EmitData { unit_bytes }) =
                        profile.directive(&instr.name)
                    {
                        encode_data(profile, symbols, diagnostics, &mut counts, instr, unit_bytes);
                    }
                }
                InstructionKind::Instruction => {
                    encode_instruction(profile, symbols, diagnostics, &mut counts, instr);
                }
            }
        }
        counts
    }
}

/// Evaluate a single-expression operand right now (EQU, .ORG). Forward
/// references are not allowed here.
fn eval_now(
    symbols: &SymbolTable,
    operand_text: &str,
    operand_col: usize,
) -> Result<(i64, Operand), (String, Option<usize>)> {
    if operand_text.is_empty() {
        return Err(("Missing operand expression".to_string(), None));
    }
    let outcome = parse_operand(operand_text)
        .map_err(|err| (err.message.clone(), span_column(operand_col, err.span)))?;
    if let Some(issue) = outcome.recovered.first() {
        return Err((issue.message.clone(), span_column(operand_col, issue.span)));
    }
    let Some(expr) = outcome.exprs.into_iter().next() else {
        return Err(("Missing operand expression".to_string(), None));
    };
    let ctx = SymbolTableContext::new(symbols);
    let value = eval_expr(&expr, &ctx).map_err(|err| {
        (
            err.message.clone(),
            err.span.and_then(|span| span_column(operand_col, span)),
        )
    })?;
    Ok((value, Operand::Single(expr)))
}

/// Recognize the addressing mode, fix the size, and parse (not evaluate)
/// the operand expression.
fn size_instruction(
    profile: &CpuProfile,
    diagnostics: &mut Vec<Diagnostic>,
    counts: &mut PassCounts,
    instr: &mut Instruction,
) {
    let line = instr.line_num;
    let Some(matched) = profile.match_operand(&instr.operand_text) else {
        push_diag(
            diagnostics,
            counts,
            line,
            Severity::Error,
            AsmErrorKind::Instruction,
            "Unrecognized operand",
            Some(&instr.operand_text),
            Some(instr.operand_col),
        );
        instr.errored = true;
        return;
    };

    if !profile.is_mnemonic(&instr.name) {
        push_diag(
            diagnostics,
            counts,
            line,
            Severity::Error,
            AsmErrorKind::Instruction,
            "Unknown mnemonic",
            Some(&instr.name),
            None,
        );
        instr.errored = true;
        return;
    }

    // A branch whose label operand was recognized as an absolute mode
    // falls back to its relative (1-byte-operand) entry.
    let resolved = match profile.opcode_entry(&instr.name, &matched.mode) {
        Some(entry) => Some((matched.mode.clone(), entry)),
        None if profile.is_branch(&instr.name) => profile
            .branch_relative_entry(&instr.name)
            .map(|(mode, entry)| (mode.to_string(), entry)),
        None => None,
    };
    let Some((mode, entry)) = resolved else {
        push_diag(
            diagnostics,
            counts,
            line,
            Severity::Error,
            AsmErrorKind::Instruction,
            "Invalid addressing mode for mnemonic",
            Some(&format!("{} {}", instr.name, matched.mode)),
            None,
        );
        instr.errored = true;
        return;
    };

    instr.mode = Some(mode);
    instr.size = entry.total_size();

    if entry.operand_size == 0 {
        return;
    }
    let Some(expr_text) = matched.expr_text else {
        push_diag(
            diagnostics,
            counts,
            line,
            Severity::Error,
            AsmErrorKind::Instruction,
            "Mnemonic requires an operand",
            Some(&instr.name),
            None,
        );
        instr.errored = true;
        return;
    };
    match parse_operand(&expr_text) {
        Ok(outcome) => {
            // Lexical problems were recovered with zero placeholders; the
            // line still reserves and encodes its size.
            for issue in &outcome.recovered {
                push_diag(
                    diagnostics,
                    counts,
                    line,
                    Severity::Error,
                    AsmErrorKind::Expression,
                    &issue.message,
                    None,
                    span_column(instr.operand_col, issue.span),
                );
            }
            if let Some(expr) = outcome.exprs.into_iter().next() {
                instr.operand = Operand::Single(expr);
            }
        }
        Err(err) => {
            push_diag(
                diagnostics,
                counts,
                line,
                Severity::Error,
                AsmErrorKind::Expression,
                &err.message,
                None,
                span_column(instr.operand_col, err.span),
            );
            instr.errored = true;
        }
    }
}

fn encode_data(
    profile: &CpuProfile,
    symbols: &SymbolTable,
    diagnostics: &mut Vec<Diagnostic>,
    counts: &mut PassCounts,
    instr: &mut Instruction,
    unit_bytes: u8,
) {
    let Operand::List(exprs) = &instr.operand else {
        return;
    };
    let ctx = SymbolTableContext::new(symbols);
    let mut bytes = Vec::with_capacity(instr.size as usize);
    for expr in exprs {
        let value = match eval_expr(expr, &ctx) {
            Ok(value) => value,
            Err(err) => {
                push_diag(
                    diagnostics,
                    counts,
                    instr.line_num,
                    Severity::Error,
                    AsmErrorKind::Expression,
                    &err.message,
                    None,
                    err.span
                        .and_then(|span| span_column(instr.operand_col, span)),
                );
                instr.errored = true;
                return;
            }
        };
        if !value_fits_operand(value, unit_bytes) {
            let (what, range) = if unit_bytes == 1 {
                ("Byte", "0-255")
            } else {
                ("Word", "0-65535")
            };
            push_diag(
                diagnostics,
                counts,
                instr.line_num,
                Severity::Error,
                AsmErrorKind::Directive,
                &format!("{what} value out of range ({range})"),
                Some(&value.to_string()),
                span_column(instr.operand_col, expr.span()),
            );
            instr.errored = true;
            return;
        }
        bytes.extend_from_slice(&encode_value(value, unit_bytes, profile.info.endianness));
    }
    instr.machine_code = bytes;
}

fn encode_instruction(
    profile: &CpuProfile,
    symbols: &SymbolTable,
    diagnostics: &mut Vec<Diagnostic>,
    counts: &mut PassCounts,
    instr: &mut Instruction,
) {
    let Some(mode) = instr.mode.clone() else {
        return;
    };
    let Some(entry) = profile.opcode_entry(&instr.name, &mode) else {
        return;
    };

    let ctx = SymbolTableContext::new(symbols);
    let value = match &instr.operand {
        Operand::Single(expr) => match eval_expr(expr, &ctx) {
            Ok(value) => Some(value),
            Err(err) => {
                push_diag(
                    diagnostics,
                    counts,
                    instr.line_num,
                    Severity::Error,
                    AsmErrorKind::Expression,
                    &err.message,
                    None,
                    err.span
                        .and_then(|span| span_column(instr.operand_col, span)),
                );
                instr.errored = true;
                return;
            }
        },
        _ => None,
    };

    let mut operand_bytes = Vec::new();
    if entry.operand_size > 0 {
        let Some(value) = value else {
            push_diag(
                diagnostics,
                counts,
                instr.line_num,
                Severity::Error,
                AsmErrorKind::Instruction,
                "Mnemonic requires an operand",
                Some(&instr.name),
                None,
            );
            instr.errored = true;
            return;
        };
        if profile.is_branch(&instr.name) && entry.operand_size == 1 {
            // Displacement is relative to the instruction after the branch.
            let next = i64::from(instr.address) + i64::from(instr.size);
            let displacement = value - next;
            if !(-128..=127).contains(&displacement) {
                push_diag(
                    diagnostics,
                    counts,
                    instr.line_num,
                    Severity::Error,
                    AsmErrorKind::Instruction,
                    "Branch out of range",
                    Some(&displacement.to_string()),
                    None,
                );
                instr.errored = true;
                return;
            }
            operand_bytes.push((displacement & 0xFF) as u8);
        } else {
            if !value_fits_operand(value, entry.operand_size) {
                push_diag(
                    diagnostics,
                    counts,
                    instr.line_num,
                    Severity::Error,
                    AsmErrorKind::Instruction,
                    "Operand out of range",
                    Some(&value.to_string()),
                    None,
                );
                instr.errored = true;
                return;
            }
            operand_bytes = encode_value(value, entry.operand_size, profile.info.endianness);
        }
    }

    let rule_ctx = RuleContext {
        mnemonic: &instr.name,
        mode: &mode,
        value,
        operand_text: &instr.operand_text,
    };
    for (severity, message) in run_rules(&profile.rules, &rule_ctx) {
        push_diag(
            diagnostics,
            counts,
            instr.line_num,
            severity,
            AsmErrorKind::Instruction,
            &message,
            None,
            None,
        );
        if severity == Severity::Error {
            instr.errored = true;
        }
    }
    if instr.errored {
        return;
    }

    let mut bytes = entry.opcode_bytes.clone();
    bytes.extend_from_slice(&operand_bytes);
    instr.machine_code = bytes;
}

/// Encode an operand value into `size_bytes` bytes in the given order.
fn encode_value(value: i64, size_bytes: u8, endianness: Endianness) -> Vec<u8> {
    match (size_bytes, endianness) {
        (1, _) => vec![(value & 0xFF) as u8],
        (2, Endianness::Little) => vec![(value & 0xFF) as u8, ((value >> 8) & 0xFF) as u8],
        (2, Endianness::Big) => vec![((value >> 8) & 0xFF) as u8, (value & 0xFF) as u8],
        _ => Vec::new(),
    }
}
