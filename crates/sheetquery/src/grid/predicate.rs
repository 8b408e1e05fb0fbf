//! Row predicates shared by retrieval filters and extraction procedures.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::cell::{parse_date, parse_number, CellValue};

/// Comparison operator applied to a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Equal (numeric when both sides are numeric, else case-insensitive text).
    Eq,
    /// Not equal.
    Ne,
    /// Case-insensitive substring match.
    Contains,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Inclusive range `[value, upper]`.
    Between,
}

impl Comparison {
    /// Parse an operator from a symbol or word (`>=`, `gte`, `contains`, ...).
    pub fn parse(token: &str) -> Option<Self> {
        let op = match token.trim().to_lowercase().as_str() {
            "=" | "==" | "eq" | "equals" | "is" => Comparison::Eq,
            "!=" | "<>" | "ne" | "not" => Comparison::Ne,
            "~" | "contains" | "like" => Comparison::Contains,
            ">" | "gt" => Comparison::Gt,
            ">=" | "gte" => Comparison::Gte,
            "<" | "lt" => Comparison::Lt,
            "<=" | "lte" => Comparison::Lte,
            "between" => Comparison::Between,
            _ => return None,
        };
        Some(op)
    }

    /// Evaluate the predicate against a cell.
    ///
    /// `upper` is only consulted for [`Comparison::Between`].
    pub fn evaluate(&self, cell: &CellValue, value: &Value, upper: Option<&Value>) -> bool {
        match self {
            Comparison::Eq => values_equal(cell, value),
            Comparison::Ne => !cell.is_empty() && !values_equal(cell, value),
            Comparison::Contains => {
                let needle = json_text(value).to_lowercase();
                !needle.is_empty() && cell.as_text().to_lowercase().contains(&needle)
            }
            Comparison::Gt => order(cell, value).is_some_and(|o| o.is_gt()),
            Comparison::Gte => order(cell, value).is_some_and(|o| o.is_ge()),
            Comparison::Lt => order(cell, value).is_some_and(|o| o.is_lt()),
            Comparison::Lte => order(cell, value).is_some_and(|o| o.is_le()),
            Comparison::Between => {
                let Some(upper) = upper else {
                    return false;
                };
                order(cell, value).is_some_and(|o| o.is_ge())
                    && order(cell, upper).is_some_and(|o| o.is_le())
            }
        }
    }
}

/// Text form of a JSON operand.
pub fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Numeric form of a JSON operand.
fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn values_equal(cell: &CellValue, value: &Value) -> bool {
    if let (Some(a), Some(b)) = (cell.as_number(), json_number(value)) {
        return (a - b).abs() < 1e-9;
    }
    if let (CellValue::Bool(a), Value::Bool(b)) = (cell, value) {
        return a == b;
    }
    let text = json_text(value);
    !text.is_empty() && cell.as_text().to_lowercase() == text.to_lowercase()
}

/// Order a cell against an operand: numerically, then as dates.
fn order(cell: &CellValue, value: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (cell.as_number(), json_number(value)) {
        return a.partial_cmp(&b);
    }
    let operand = match value {
        Value::String(s) => parse_date(s),
        _ => None,
    };
    match (cell.as_date(), operand) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => None,
    }
}
