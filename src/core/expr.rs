// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Generic expression evaluation.
//!
//! Walks the AST built by [`crate::core::parser`] against a symbol lookup
//! context and produces a 64-bit two's-complement value. Operand range
//! checks belong to the assembler, not here.

use crate::core::parser::{BinaryOp, Expr, Span, UnaryOp};
use crate::core::symbol_table::SymbolTable;

/// Error returned from expression evaluation.
#[derive(Debug, Clone)]
pub struct EvalError {
    pub message: String,
    pub span: Option<Span>,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span: Some(span),
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvalError {}

/// Context for expression evaluation.
pub trait EvalContext {
    /// Look up a symbol's value by name.
    fn lookup_symbol(&self, name: &str) -> Option<i64>;
}

/// Evaluate an expression to a numeric value.
pub fn eval_expr(expr: &Expr, ctx: &dyn EvalContext) -> Result<i64, EvalError> {
    match expr {
        Expr::Number(value, _) => Ok(*value),

        Expr::Symbol(name, span) => ctx
            .lookup_symbol(name)
            .ok_or_else(|| EvalError::with_span(format!("Undefined symbol: {name}"), *span)),

        Expr::Unary { op, expr, span } => {
            let val = eval_expr(expr, ctx)?;
            apply_unary(*op, val, *span)
        }

        Expr::Binary {
            op,
            left,
            right,
            span,
        } => {
            let l = eval_expr(left, ctx)?;
            let r = eval_expr(right, ctx)?;
            apply_binary(*op, l, r, *span)
        }
    }
}

/// Apply a unary operator to a value.
pub fn apply_unary(op: UnaryOp, val: i64, _span: Span) -> Result<i64, EvalError> {
    Ok(match op {
        UnaryOp::Plus => val,
        UnaryOp::Minus => val.wrapping_neg(),
        UnaryOp::BitNot => !val,
        UnaryOp::LogicNot => {
            if val == 0 {
                1
            } else {
                0
            }
        }
        UnaryOp::Low => val & 0xff,
        UnaryOp::High => (val >> 8) & 0xff,
    })
}

/// Apply a binary operator to two values.
pub fn apply_binary(op: BinaryOp, l: i64, r: i64, span: Span) -> Result<i64, EvalError> {
    Ok(match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Subtract => l.wrapping_sub(r),
        BinaryOp::Multiply => l.wrapping_mul(r),
        BinaryOp::Divide => {
            if r == 0 {
                return Err(EvalError::with_span("Division by zero", span));
            }
            l.wrapping_div(r)
        }
        BinaryOp::Mod => {
            if r == 0 {
                return Err(EvalError::with_span("Modulo by zero", span));
            }
            l.wrapping_rem(r)
        }
        BinaryOp::BitAnd => l & r,
        BinaryOp::BitOr => l | r,
        BinaryOp::BitXor => l ^ r,
        // Shift amounts are masked to 0-63 to stay in the 64-bit value domain.
        BinaryOp::Shl => l.wrapping_shl((r & 0x3f) as u32),
        BinaryOp::Shr => ((l as u64).wrapping_shr((r & 0x3f) as u32)) as i64,
    })
}

/// Parse a number literal.
///
/// Supported formats:
/// - Decimal: `42`
/// - Hex: `$2A`, `0x2A`
/// - Binary: `%101010`, `0b101010`
/// - Octal: `@52`, `0o52`
///
/// Underscores are accepted as visual separators. Returns `None` for
/// malformed literals; sign handling belongs to the parser.
pub fn parse_number(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let text: String = text.chars().filter(|&c| c != '_').collect();
    let text = text.as_str();

    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(hex) = text.strip_prefix('$') {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()
    } else if let Some(bin) = text.strip_prefix('%') {
        i64::from_str_radix(bin, 2).ok()
    } else if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(oct) = text.strip_prefix('@') {
        i64::from_str_radix(oct, 8).ok()
    } else {
        text.parse::<i64>().ok()
    }
}

/// Exclusive upper bound for an unsigned operand of `size_bytes` bytes.
pub fn operand_limit(size_bytes: u8) -> i64 {
    1i64 << (8 * u32::from(size_bytes))
}

/// Returns true if the value encodes into `size_bytes` unsigned bytes.
pub fn value_fits_operand(value: i64, size_bytes: u8) -> bool {
    (0..operand_limit(size_bytes)).contains(&value)
}

/// Evaluation context backed by a [`SymbolTable`].
pub struct SymbolTableContext<'a> {
    symbols: &'a SymbolTable,
}

impl<'a> SymbolTableContext<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self { symbols }
    }
}

impl EvalContext for SymbolTableContext<'_> {
    fn lookup_symbol(&self, name: &str) -> Option<i64> {
        self.symbols.lookup(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_operand;
    use proptest::prelude::*;

    struct MapContext(Vec<(&'static str, i64)>);

    impl EvalContext for MapContext {
        fn lookup_symbol(&self, name: &str) -> Option<i64> {
            self.0
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| *v)
        }
    }

    fn eval(text: &str) -> Result<i64, EvalError> {
        eval_with(text, &MapContext(Vec::new()))
    }

    fn eval_with(text: &str, ctx: &dyn EvalContext) -> Result<i64, EvalError> {
        let outcome = parse_operand(text).expect("parse should succeed");
        eval_expr(&outcome.exprs[0], ctx)
    }

    #[test]
    fn parse_number_formats() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("$2A"), Some(42));
        assert_eq!(parse_number("0x2a"), Some(42));
        assert_eq!(parse_number("%101010"), Some(42));
        assert_eq!(parse_number("0b101010"), Some(42));
        assert_eq!(parse_number("@52"), Some(42));
        assert_eq!(parse_number("0o52"), Some(42));
        assert_eq!(parse_number("1_000"), Some(1000));
        assert_eq!(parse_number("$FF_FF"), Some(0xFFFF));
    }

    #[test]
    fn parse_number_rejects_garbage() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("$FG"), None);
        assert_eq!(parse_number("%102"), None);
        assert_eq!(parse_number("@9"), None);
        assert_eq!(parse_number("12AB"), None);
    }

    #[test]
    fn arithmetic_and_bitwise() {
        assert_eq!(eval("2+3*4").unwrap(), 14);
        assert_eq!(eval("(2+3)*4").unwrap(), 20);
        assert_eq!(eval("$FF & $0F").unwrap(), 0x0F);
        assert_eq!(eval("$F0 | $0F").unwrap(), 0xFF);
        assert_eq!(eval("$FF ^ $0F").unwrap(), 0xF0);
        assert_eq!(eval("1 << 4").unwrap(), 16);
        assert_eq!(eval("$100 >> 4").unwrap(), 0x10);
        assert_eq!(eval("~0 & $FF").unwrap(), 0xFF);
        assert_eq!(eval("!0").unwrap(), 1);
        assert_eq!(eval("!5").unwrap(), 0);
    }

    #[test]
    fn division_truncates_toward_zero() {
        assert_eq!(eval("7/2").unwrap(), 3);
        assert_eq!(eval("-7/2").unwrap(), -3);
        assert_eq!(eval("7/-2").unwrap(), -3);
    }

    #[test]
    fn modulo_keeps_dividend_sign() {
        assert_eq!(eval("7%3").unwrap(), 1);
        assert_eq!(eval("-7%3").unwrap(), -1);
        assert_eq!(eval("7%-3").unwrap(), 1);
    }

    #[test]
    fn division_by_zero_errors() {
        assert!(eval("1/0").unwrap_err().message.contains("Division"));
        assert!(eval("1%0").unwrap_err().message.contains("Modulo"));
    }

    #[test]
    fn low_high_byte() {
        assert_eq!(eval("<$1234").unwrap(), 0x34);
        assert_eq!(eval(">$1234").unwrap(), 0x12);
    }

    #[test]
    fn symbols_resolve_through_context() {
        let ctx = MapContext(vec![("SIZE", 0x10)]);
        assert_eq!(eval_with("SIZE+1", &ctx).unwrap(), 0x11);
    }

    #[test]
    fn undefined_symbol_errors_with_name() {
        let err = eval("MISSING").unwrap_err();
        assert_eq!(err.message, "Undefined symbol: MISSING");
    }

    #[test]
    fn symbol_names_are_case_sensitive() {
        let ctx = MapContext(vec![("size", 1)]);
        assert!(eval_with("SIZE", &ctx).is_err());
        assert_eq!(eval_with("size", &ctx).unwrap(), 1);
    }

    #[test]
    fn operand_limits() {
        assert_eq!(operand_limit(1), 0x100);
        assert_eq!(operand_limit(2), 0x10000);
        assert!(value_fits_operand(0xFF, 1));
        assert!(!value_fits_operand(0x100, 1));
        assert!(!value_fits_operand(-1, 1));
        assert!(value_fits_operand(0xFFFF, 2));
        assert!(!value_fits_operand(0x10000, 2));
    }

    proptest! {
        #[test]
        fn parse_number_decimal_round_trip(value in any::<u32>()) {
            let text = value.to_string();
            prop_assert_eq!(parse_number(&text), Some(i64::from(value)));
        }

        #[test]
        fn parse_number_hex_round_trip(value in any::<u32>()) {
            let text = format!("${value:X}");
            prop_assert_eq!(parse_number(&text), Some(i64::from(value)));
        }

        #[test]
        fn parse_number_binary_round_trip(value in any::<u16>()) {
            let text = format!("0b{value:b}");
            prop_assert_eq!(parse_number(&text), Some(i64::from(value)));
        }

        #[test]
        fn subtraction_of_same_symbol_is_zero(value in any::<i32>()) {
            let ctx = MapContext(vec![("L", i64::from(value))]);
            prop_assert_eq!(eval_with("L-L", &ctx).unwrap(), 0);
        }

        #[test]
        fn low_high_recompose(value in 0i64..0x10000) {
            let ctx = MapContext(vec![("V", value)]);
            let low = eval_with("<V", &ctx).unwrap();
            let high = eval_with(">V", &ctx).unwrap();
            prop_assert_eq!((high << 8) | low, value);
        }
    }
}
