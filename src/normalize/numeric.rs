//! Best-effort numeric coercion for sheet cells

use super::CellValue;
use regex::Regex;
use std::sync::OnceLock;

fn leading_float_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?").expect("static float pattern")
    })
}

/// Coerce a cell to a number. Anything unparseable becomes `0.0`.
pub fn parse_numeric(value: &CellValue) -> f64 {
    match value {
        CellValue::Number(n) if n.is_finite() => *n,
        CellValue::Number(_) | CellValue::Empty => 0.0,
        CellValue::Text(text) => parse_numeric_str(text),
    }
}

/// Parse a currency-formatted string such as `"₹1,234.50"`.
///
/// Currency symbols, thousands separators and whitespace are stripped, then
/// the longest leading float literal is read, so `"12.5%"` gives `12.5`.
pub fn parse_numeric_str(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '₹' | '$' | ',') && !c.is_whitespace())
        .collect();

    leading_float_re()
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}
