//! Extraction plans and the inputs used to produce them.

use serde::{Deserialize, Serialize};

use crate::intent::SearchIntent;
use crate::llm::ResolutionSource;
use crate::matching::ColumnMatch;
use crate::schema::SheetStructure;

use super::program::{OutputShape, Program};

/// A procedure plus what the planner knows about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionPlan {
    pub procedure: Program,
    pub description: String,
    pub expected_output: OutputShape,
    /// Free-text output description from the collaborator, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_format: Option<String>,
    /// Planner confidence in `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub source: ResolutionSource,
    /// 1-based attempt this plan was made for.
    pub attempt: u32,
}

/// A failed execution attempt, fed back into the next planning round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFailure {
    pub attempt: u32,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl PlanFailure {
    /// Record a failure, attaching a repair hint when the error suggests one.
    pub fn new(attempt: u32, error: impl Into<String>) -> Self {
        let error = error.into();
        let hint = repair_hint(&error);
        Self { attempt, error, hint }
    }
}

/// Hint for errors caused by reading rows or columns that are not there.
pub fn repair_hint(error: &str) -> Option<String> {
    let lower = error.to_lowercase();
    let missing = ["undefined", "out of range", "missing column", "missing row", "no such column"]
        .iter()
        .any(|needle| lower.contains(needle));
    missing.then(|| {
        "Reference only columns listed in the structure (by exact header or index), \
         start at the data start row, and drop blank or short rows before reading cells."
            .to_string()
    })
}

/// Everything the planner sees for one sheet and attempt.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub query: &'a str,
    pub intent: &'a SearchIntent,
    pub structure: &'a SheetStructure,
    pub column_matches: &'a [ColumnMatch],
    /// Earlier failures for this sheet, oldest first.
    pub failures: &'a [PlanFailure],
    /// 1-based attempt number.
    pub attempt: u32,
}

impl<'a> PlanRequest<'a> {
    /// First-attempt request with no failures.
    pub fn new(
        query: &'a str,
        intent: &'a SearchIntent,
        structure: &'a SheetStructure,
        column_matches: &'a [ColumnMatch],
    ) -> Self {
        Self {
            query,
            intent,
            structure,
            column_matches,
            failures: &[],
            attempt: 1,
        }
    }

    /// Same request for a later attempt.
    pub fn with_failures(mut self, failures: &'a [PlanFailure], attempt: u32) -> Self {
        self.failures = failures;
        self.attempt = attempt;
        self
    }
}
