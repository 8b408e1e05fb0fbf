//! Sheet structure analysis.
//!
//! Finds table regions inside a raw grid, decides whether each region
//! starts with a header row, and profiles every column of the primary
//! region (type, density, uniqueness, value shapes, formulas).

mod analyzer;
pub mod patterns;

pub use analyzer::{StructureAnalyzer, StructureConfig};
