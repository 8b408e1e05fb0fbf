//! Column profiles produced by structure analysis.

use serde::{Deserialize, Serialize};

use super::types::{DataType, ValuePattern};

/// Profile of a single grid column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    /// Zero-based column position in the grid.
    pub index: usize,
    /// Header text, or a generated name when the header is missing.
    pub inferred_name: String,
    /// Header text as found in the sheet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Spreadsheet letter label (A, B, ..., AA).
    pub letter_label: String,
    /// Majority data type.
    pub data_type: DataType,
    /// Share of examined rows that hold a value, rounded to 2 decimals.
    pub density: f64,
    /// Distinct non-empty values among the first examined values.
    pub unique_value_count: usize,
    /// Value shapes detected in the samples.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_patterns: Vec<ValuePattern>,
    /// First non-empty values (display text).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_values: Vec<String>,
    /// Whether the column holds spreadsheet formulas.
    pub has_formula: bool,
}

impl ColumnProfile {
    /// Create an empty profile for a column position.
    pub fn new(index: usize, header: Option<String>) -> Self {
        let letter_label = column_letter(index);
        let inferred_name = header
            .clone()
            .unwrap_or_else(|| format!("Column {}", letter_label));
        Self {
            index,
            inferred_name,
            header,
            letter_label,
            data_type: DataType::Empty,
            density: 0.0,
            unique_value_count: 0,
            sample_patterns: Vec::new(),
            sample_values: Vec::new(),
            has_formula: false,
        }
    }

    /// Whether the sheet supplied a header for this column.
    pub fn has_header(&self) -> bool {
        self.header.as_deref().is_some_and(|h| !h.trim().is_empty())
    }

    /// Whether the column holds no values at all.
    pub fn is_empty(&self) -> bool {
        self.data_type == DataType::Empty
    }
}

/// Column index (0-based) to spreadsheet letter (0→A, 1→B, 26→AA).
pub fn column_letter(index: usize) -> String {
    let mut n = index;
    let mut s = String::new();
    loop {
        let r = (n % 26) as u8;
        s.insert(0, (b'A' + r) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    s
}
