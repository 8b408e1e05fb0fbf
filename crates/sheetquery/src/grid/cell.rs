//! Scalar cell values and numeric coercion.

use std::borrow::Cow;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Currency symbols stripped before numeric parsing.
const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₹', '₽', '₩', '₺', '₫', '฿', '₴', '₪'];

/// ISO-style currency codes stripped before numeric parsing.
static CURRENCY_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(usd|eur|gbp|jpy|cny|rmb|rub|mxn|brl|inr|krw|chf|cad|aud)\s*|\s*(usd|eur|gbp|jpy|cny|rmb|rub|mxn|brl|inr|krw|chf|cad|aud)$")
        .unwrap()
});

/// Plain `1,234,567` style thousands grouping.
static THOUSANDS_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d{1,3}(,\d{3})+(\.\d+)?$").unwrap());

/// Date formats accepted when comparing text cells as dates.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y", "%d.%m.%Y"];

/// A single scalar cell in a sheet grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Empty cell.
    #[default]
    Null,
    /// Boolean cell.
    Bool(bool),
    /// Numeric cell.
    Number(f64),
    /// Date cell.
    Date(NaiveDate),
    /// Text cell (may hold formulas such as `=SUM(A1:A3)`).
    Text(String),
}

impl CellValue {
    /// True for null cells and whitespace-only text.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Display text of the cell (empty string for null).
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            CellValue::Null => Cow::Borrowed(""),
            CellValue::Bool(b) => Cow::Owned(b.to_string()),
            CellValue::Number(n) => Cow::Owned(format_number(*n)),
            CellValue::Date(d) => Cow::Owned(d.format("%Y-%m-%d").to_string()),
            CellValue::Text(s) => Cow::Borrowed(s.trim()),
        }
    }

    /// Numeric value of the cell, parsing text with currency awareness.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => parse_number(s),
            _ => None,
        }
    }

    /// Date value of the cell, parsing text in common layouts.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            CellValue::Text(s) => parse_date(s),
            _ => None,
        }
    }

    /// Whether the cell holds a spreadsheet formula.
    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.trim_start().starts_with('='))
    }

    /// Convert to a JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Bool(b) => Value::Bool(*b),
            CellValue::Number(n) => number_value(*n),
            CellValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            CellValue::Text(s) => Value::String(s.clone()),
        }
    }

    /// Build a cell from raw delimited-text input.
    ///
    /// Plain numbers become numeric cells unless they carry a leading zero
    /// (identifiers such as `00123` stay text).
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Null;
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => return CellValue::Bool(true),
            "false" => return CellValue::Bool(false),
            _ => {}
        }
        let leading_zero = trimmed.len() > 1
            && trimmed.starts_with('0')
            && trimmed.as_bytes().get(1).is_some_and(|b| b.is_ascii_digit());
        if !leading_zero {
            if let Ok(n) = trimmed.parse::<f64>() {
                if n.is_finite() {
                    return CellValue::Number(n);
                }
            }
        }
        CellValue::Text(raw.to_string())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// Parse a number from text, tolerating currency markers, thousands
/// separators, percent signs, accounting parentheses and decimal commas.
pub fn parse_number(raw: &str) -> Option<f64> {
    let mut s: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\'')
        .collect();
    if s.is_empty() {
        return None;
    }

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') && s.len() > 2 {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }

    s = CURRENCY_CODE.replace_all(&s, "").into_owned();
    s = s.trim_matches(|c| CURRENCY_SYMBOLS.contains(&c)).to_string();
    if let Some(rest) = s.strip_prefix('-') {
        let rest = rest.trim_start_matches(|c| CURRENCY_SYMBOLS.contains(&c));
        s = format!("-{}", rest);
    }
    if let Some(rest) = s.strip_suffix('%') {
        s = rest.to_string();
    }
    if s.is_empty() || !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = normalize_separators(&s)?;
    let value = normalized.parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Resolve thousands/decimal separators into a plain `f64` literal.
fn normalize_separators(s: &str) -> Option<String> {
    let has_comma = s.contains(',');
    let has_dot = s.contains('.');
    let out = match (has_comma, has_dot) {
        (true, true) => {
            // The right-most separator is the decimal mark.
            let last_comma = s.rfind(',')?;
            let last_dot = s.rfind('.')?;
            if last_comma > last_dot {
                s.replace('.', "").replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
        (true, false) => {
            if THOUSANDS_COMMA.is_match(s) {
                s.replace(',', "")
            } else if s.matches(',').count() == 1 {
                s.replace(',', ".")
            } else {
                return None;
            }
        }
        (false, true) => {
            if s.matches('.').count() > 1 {
                // 1.234.567 style grouping
                s.replace('.', "")
            } else {
                s.to_string()
            }
        }
        (false, false) => s.to_string(),
    };
    if out
        .chars()
        .enumerate()
        .all(|(i, c)| c.is_ascii_digit() || c == '.' || (i == 0 && c == '-') || c == 'e' || c == 'E')
    {
        Some(out)
    } else {
        None
    }
}

/// Parse a date from text in one of the common layouts.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// JSON number that stays integral when the value has no fractional part.
pub fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Render a number without a trailing `.0` for integral values.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_plain_and_grouped() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number("1,234"), Some(1234.0));
        assert_eq!(parse_number("1,234,567.89"), Some(1234567.89));
        assert_eq!(parse_number("1.234,50"), Some(1234.5));
        assert_eq!(parse_number("3,5"), Some(3.5));
    }

    #[test]
    fn test_parse_number_currency() {
        assert_eq!(parse_number("$1,200.00"), Some(1200.0));
        assert_eq!(parse_number("€ 99"), Some(99.0));
        assert_eq!(parse_number("USD 15"), Some(15.0));
        assert_eq!(parse_number("(250.00)"), Some(-250.0));
        assert_eq!(parse_number("-$5"), Some(-5.0));
        assert_eq!(parse_number("12.5%"), Some(12.5));
    }

    #[test]
    fn test_parse_number_rejects_text() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("Acme"), None);
        assert_eq!(parse_number("$"), None);
        assert_eq!(parse_number("12 apples"), None);
    }

    #[test]
    fn test_from_raw() {
        assert_eq!(CellValue::from_raw(""), CellValue::Null);
        assert_eq!(CellValue::from_raw("100"), CellValue::Number(100.0));
        assert_eq!(CellValue::from_raw("TRUE"), CellValue::Bool(true));
        assert_eq!(CellValue::from_raw("00123"), CellValue::Text("00123".to_string()));
        assert_eq!(CellValue::from_raw("Acme"), CellValue::Text("Acme".to_string()));
    }

    #[test]
    fn test_number_value_integral() {
        assert_eq!(number_value(100.0), serde_json::json!(100));
        assert_eq!(number_value(2.5), serde_json::json!(2.5));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }

    #[test]
    fn test_is_empty_and_text() {
        assert!(CellValue::Text("   ".to_string()).is_empty());
        assert!(!CellValue::Number(0.0).is_empty());
        assert_eq!(CellValue::Number(3.0).as_text(), "3");
        assert!(CellValue::Text("=SUM(A1:A3)".to_string()).is_formula());
    }
}
