// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Source line splitting.
//!
//! One line becomes (label, mnemonic/directive, operand text). Comments
//! are stripped first; the `NAME EQU expr` shape binds NAME as the label
//! even without a colon.

/// Result of splitting one source line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitLine {
    pub label: Option<String>,
    /// Warning about a malformed label; the label is still recorded.
    pub label_warning: Option<String>,
    /// Uppercased mnemonic or directive token.
    pub name: Option<String>,
    pub operand_text: String,
    /// 1-based byte column where the operand starts.
    pub operand_col: usize,
}

/// Strip a `;` comment, ignoring semicolons inside character literals.
fn strip_comment(line: &str) -> &str {
    let mut in_char = false;
    let mut prev_backslash = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '\'' if !prev_backslash => in_char = !in_char,
            ';' if !in_char => return &line[..idx],
            _ => {}
        }
        prev_backslash = ch == '\\' && !prev_backslash;
    }
    line
}

fn is_valid_label(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn label_warning(name: &str) -> Option<String> {
    if is_valid_label(name) {
        None
    } else {
        Some(format!(
            "Label '{name}' should start with a letter or underscore and contain only letters, digits, and underscores"
        ))
    }
}

fn offset_in(base: &str, sub: &str) -> usize {
    sub.as_ptr() as usize - base.as_ptr() as usize
}

/// Split one raw source line into its syntactic parts.
pub fn split_line(line: &str) -> SplitLine {
    let body = strip_comment(line);
    let mut out = SplitLine {
        operand_col: 1,
        ..SplitLine::default()
    };

    let mut rest = body.trim_start();
    if rest.trim_end().is_empty() {
        return out;
    }

    // A label is a leading token with a colon before any whitespace.
    let colon = rest.find(':');
    let first_ws = rest.find(char::is_whitespace);
    if let Some(colon) = colon.filter(|colon| first_ws.map_or(true, |ws| *colon < ws)) {
        let name = &rest[..colon];
        if name.is_empty() {
            out.label_warning = Some("Empty label before ':'".to_string());
        } else {
            out.label_warning = label_warning(name);
            out.label = Some(name.to_string());
        }
        rest = rest[colon + 1..].trim_start();
    }

    let rest = rest.trim_end();
    if rest.is_empty() {
        return out;
    }

    let (first, remainder) = match rest.find(char::is_whitespace) {
        Some(ws) => (&rest[..ws], rest[ws..].trim_start()),
        None => (rest, ""),
    };

    // NAME EQU expr: the leading name is the label.
    if out.label.is_none() && !remainder.is_empty() {
        let (second, tail) = match remainder.find(char::is_whitespace) {
            Some(ws) => (&remainder[..ws], remainder[ws..].trim_start()),
            None => (remainder, ""),
        };
        if second.eq_ignore_ascii_case("EQU") {
            out.label_warning = label_warning(first);
            out.label = Some(first.to_string());
            out.name = Some("EQU".to_string());
            out.operand_text = tail.trim_end().to_string();
            out.operand_col = if tail.is_empty() {
                1
            } else {
                offset_in(line, tail) + 1
            };
            return out;
        }
    }

    out.name = Some(first.to_uppercase());
    out.operand_text = remainder.trim_end().to_string();
    out.operand_col = if remainder.is_empty() {
        1
    } else {
        offset_in(line, remainder) + 1
    };
    out
}
