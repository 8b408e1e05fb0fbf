//! Value classification and shape predicates.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::grid::{parse_number, CellValue};
use crate::schema::{DataType, ValuePattern};

// =============================================================================
// LAZY STATIC PATTERNS
// =============================================================================
// Compiled once on first use.

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}").unwrap(), // ISO date
        Regex::new(r"^\d{1,2}/\d{1,2}/\d{2,4}$").unwrap(), // US / European slashes
        Regex::new(r"^\d{1,2}-\d{1,2}-\d{4}$").unwrap(), // European dashes
        Regex::new(r"^\d{1,2}\.\d{1,2}\.\d{2,4}$").unwrap(), // German dots
        Regex::new(r"^\d{4}/\d{1,2}/\d{1,2}$").unwrap(), // Alt ISO
        Regex::new(r"^\d{4}年\d{1,2}月\d{1,2}日$").unwrap(), // CJK
        Regex::new(r"(?i)^(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.? \d{1,2},? \d{4}$")
            .unwrap(),
        Regex::new(r"(?i)^\d{1,2} (jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.? \d{4}$")
            .unwrap(),
    ]
});

static CURRENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\(?-?\s*([$€£¥₹₽₩₺₫฿₴₪]|usd|eur|gbp|jpy|cny|rmb|rub|mxn|brl|inr|krw|chf|cad|aud)\s*-?[\d.,\s]+\)?$|^\(?-?[\d.,\s]+\s*([$€£¥₹₽₩₺₫฿₴₪]|usd|eur|gbp|jpy|cny|rmb|rub|mxn|brl|inr|krw|chf|cad|aud|руб\.?|元|円)\)?$",
    )
    .unwrap()
});

static PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[\d.,\s]+\s*%$").unwrap());

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[\d\s().\-/]{7,22}$").unwrap());

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(https?://|www\.)\S+$").unwrap());

static ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Prefixed codes: INV-0001, SKU12345, PO_2024_17
        Regex::new(r"^[A-Za-z]{1,6}[-_#]?\d{2,}([-_/][A-Za-z0-9]+)*$").unwrap(),
        // UUID
        Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap(),
        // Zero-padded numbers kept as text
        Regex::new(r"^0\d{3,}$").unwrap(),
    ]
});

/// Company suffixes that mark a vendor/customer name.
static COMPANY_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(inc|llc|ltd|limited|corp|corporation|co|company|gmbh|ag|sa|s\.a|sas|sarl|srl|s\.r\.l|bv|nv|plc|oy|ab|kk|pty|sl|ооо|зао|оао)\.?$|有限公司|株式会社|㈱",
    )
    .unwrap()
});

/// Classify a single non-empty cell; `None` for empty cells.
pub fn classify(cell: &CellValue) -> Option<DataType> {
    match cell {
        CellValue::Null => None,
        CellValue::Bool(_) => Some(DataType::Boolean),
        CellValue::Number(_) => Some(DataType::Number),
        CellValue::Date(_) => Some(DataType::Date),
        CellValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(classify_text(trimmed))
            }
        }
    }
}

fn classify_text(s: &str) -> DataType {
    if is_boolean_word(s) {
        return DataType::Boolean;
    }
    if PERCENT.is_match(s) && parse_number(s).is_some() {
        return DataType::Percentage;
    }
    let has_marker = s
        .chars()
        .any(|c| !c.is_ascii_digit() && !c.is_whitespace() && !",.-()".contains(c));
    if has_marker && CURRENCY.is_match(s) && parse_number(s).is_some() {
        return DataType::Currency;
    }
    if looks_like_date(s) {
        return DataType::Date;
    }
    if parse_number(s).is_some() {
        return DataType::Number;
    }
    DataType::String
}

/// Boolean words in the supported languages.
fn is_boolean_word(s: &str) -> bool {
    matches!(
        s.to_lowercase().as_str(),
        "true" | "false" | "yes" | "no" | "sí" | "si" | "oui" | "non" | "ja" | "nein"
            | "sim" | "não" | "да" | "нет" | "是" | "否" | "はい" | "いいえ"
    )
}

/// Check if a value looks like a date.
pub fn looks_like_date(value: &str) -> bool {
    DATE_PATTERNS.iter().any(|pattern| pattern.is_match(value.trim()))
}

/// Whether a cell matches a value pattern. Only text cells qualify.
pub fn matches_pattern(cell: &CellValue, pattern: ValuePattern) -> bool {
    let CellValue::Text(s) = cell else {
        return false;
    };
    let s = s.trim();
    match pattern {
        ValuePattern::Email => is_email(s),
        ValuePattern::Phone => is_phone(s),
        ValuePattern::Url => URL.is_match(s),
        ValuePattern::Id => ID_PATTERNS.iter().any(|p| p.is_match(s)),
    }
}

/// Email address shape.
pub fn is_email(s: &str) -> bool {
    EMAIL.is_match(s.trim())
}

/// Phone number shape: 7-15 digits with common separators.
pub fn is_phone(s: &str) -> bool {
    let s = s.trim();
    if !PHONE.is_match(s) {
        return false;
    }
    let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
    (7..=15).contains(&digits) && !looks_like_date(s)
}

/// Date shape, for native date cells or date-looking text.
pub fn is_date_value(cell: &CellValue) -> bool {
    match cell {
        CellValue::Date(_) => true,
        CellValue::Text(s) => looks_like_date(s),
        _ => false,
    }
}

/// Monetary amount shape: currency text or a plain non-integer-id number.
pub fn is_amount_value(cell: &CellValue) -> bool {
    match cell {
        CellValue::Number(_) => true,
        CellValue::Text(s) => {
            let s = s.trim();
            (CURRENCY.is_match(s) || !looks_like_date(s)) && parse_number(s).is_some()
        }
        _ => false,
    }
}

/// Organisation-name shape: capitalised words, optionally a company suffix,
/// no digits-only or email/url text.
pub fn is_company_name(cell: &CellValue) -> bool {
    let CellValue::Text(s) = cell else {
        return false;
    };
    let s = s.trim();
    if s.len() < 2 || is_email(s) || URL.is_match(s) || parse_number(s).is_some() {
        return false;
    }
    if COMPANY_SUFFIX.is_match(s) {
        return true;
    }
    let words: Vec<&str> = s.split_whitespace().collect();
    let letters = s.chars().filter(|c| c.is_alphabetic()).count();
    let capitalised = words
        .iter()
        .all(|w| w.chars().next().is_some_and(|c| c.is_uppercase() || !c.is_alphabetic()));
    (1..=6).contains(&words.len()) && letters * 2 >= s.chars().count() && capitalised
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_classify_text_values() {
        assert_eq!(classify(&text("123.45")), Some(DataType::Number));
        assert_eq!(classify(&text("$1,200")), Some(DataType::Currency));
        assert_eq!(classify(&text("1.200,00 €")), Some(DataType::Currency));
        assert_eq!(classify(&text("45%")), Some(DataType::Percentage));
        assert_eq!(classify(&text("2024-01-15")), Some(DataType::Date));
        assert_eq!(classify(&text("Jan 5, 2023")), Some(DataType::Date));
        assert_eq!(classify(&text("yes")), Some(DataType::Boolean));
        assert_eq!(classify(&text("Acme")), Some(DataType::String));
        assert_eq!(classify(&text("  ")), None);
        assert_eq!(classify(&CellValue::Null), None);
    }

    #[test]
    fn test_value_patterns() {
        assert!(matches_pattern(&text("ana@example.com"), ValuePattern::Email));
        assert!(matches_pattern(&text("+1 (555) 123-4567"), ValuePattern::Phone));
        assert!(!matches_pattern(&text("2024-01-15"), ValuePattern::Phone));
        assert!(matches_pattern(&text("https://example.com/x"), ValuePattern::Url));
        assert!(matches_pattern(&text("INV-00123"), ValuePattern::Id));
        assert!(!matches_pattern(&CellValue::Number(5551234567.0), ValuePattern::Phone));
    }

    #[test]
    fn test_company_name_shape() {
        assert!(is_company_name(&text("Acme Corp")));
        assert!(is_company_name(&text("Globex")));
        assert!(is_company_name(&text("北京科技有限公司")));
        assert!(!is_company_name(&text("ana@example.com")));
        assert!(!is_company_name(&text("1234")));
        assert!(!is_company_name(&text("paid on time")));
    }
}
