//! Coercion of upstream numbers, which arrive as `"1,234"`, `"55%"`,
//! `"Lv.45"` or plain JSON numbers.

use serde_json::Value;

/// Parse a display number. Thousands separators, whitespace and a percent
/// suffix are ignored; decimals are rounded. Returns `None` for anything
/// that is not a number once cleaned.
pub fn parse_number(text: &str) -> Option<i64> {
    let cleaned: String = text
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(n) = cleaned.parse::<i64>() {
        return Some(n);
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.round() as i64)
}

/// Parse a level label such as `Lv.45`, `Lv 45` or `45`.
pub fn parse_level(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("Lv")
        .or_else(|| trimmed.strip_prefix("LV"))
        .or_else(|| trimmed.strip_prefix("lv"))
        .unwrap_or(trimmed)
        .trim_start_matches(['.', ' ']);
    digits.parse::<i64>().ok()
}

/// Coerce a JSON value that may be a number or a formatted string.
pub fn coerce(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}
