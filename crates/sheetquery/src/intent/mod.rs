//! Query intent analysis.
//!
//! A query is classified as lookup, filter, aggregate or list, together
//! with the column concepts it needs, an optional grouping key, comparison
//! filters and aggregation functions.

mod analyzer;
mod fallback;
mod types;

pub use analyzer::{IntentAnalyzer, IntentConfig};
pub use fallback::fallback_intent;
pub use types::{AggregationKind, IntentFilter, IntentType, SearchIntent};
