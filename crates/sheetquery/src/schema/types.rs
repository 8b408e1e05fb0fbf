//! Core type definitions for schema representation.

use serde::{Deserialize, Serialize};

/// Inferred data type for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Free text.
    String,
    /// Plain numbers.
    Number,
    /// Dates (with or without time).
    Date,
    /// Boolean values (true/false/yes/no).
    Boolean,
    /// Numbers carrying a currency symbol or code.
    Currency,
    /// Numbers carrying a percent sign.
    Percentage,
    /// No single type reaches the agreement threshold.
    Mixed,
    /// No non-empty values.
    #[default]
    Empty,
}

impl DataType {
    /// Returns true if values of this type are numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Number | DataType::Currency | DataType::Percentage
        )
    }

    /// Lowercase name used in prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Date => "date",
            DataType::Boolean => "boolean",
            DataType::Currency => "currency",
            DataType::Percentage => "percentage",
            DataType::Mixed => "mixed",
            DataType::Empty => "empty",
        }
    }
}

/// Value shape detected in a column's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuePattern {
    /// Email addresses.
    Email,
    /// Phone numbers.
    Phone,
    /// Identifier codes (INV-001, SKU12345, UUIDs).
    Id,
    /// Web addresses.
    Url,
}
