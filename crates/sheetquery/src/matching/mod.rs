//! Sheet ranking and concept-to-column matching.

mod column;
mod sheet;
pub mod synonyms;
pub mod text;

pub use column::{is_generic_header, ColumnMatch, ColumnMatcher, MatchMethod, MatchThresholds};
pub use sheet::{
    CandidateColumn, CandidateFile, CandidateSheet, RankingMethod, SheetMatch, SheetMatchConfig,
    SheetMatcher,
};
