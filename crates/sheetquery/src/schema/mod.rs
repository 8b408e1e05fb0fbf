//! Schema types for representing inferred sheet structure.

mod column;
mod table;
mod types;

pub use column::{column_letter, ColumnProfile};
pub use table::{DataPatterns, Dimensions, MergedRegion, SheetStructure, TableBounds, TableRegion};
pub use types::{DataType, ValuePattern};
