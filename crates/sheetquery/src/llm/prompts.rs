//! Prompt templates and response schemas for collaborator calls.
//!
//! Prompts carry schema only (sheet names, column names, types) and never
//! cell values, except the sample-free structure summary used for planning.

use serde_json::{json, Value};

use crate::intent::SearchIntent;
use crate::matching::{CandidateFile, CandidateSheet, ColumnMatch};
use crate::plan::PlanFailure;
use crate::schema::{ColumnProfile, SheetStructure};

/// System prompt shared by all providers.
pub fn system_prompt() -> &'static str {
    r#"You are a data analyst working with messy, multilingual spreadsheets.
Headers may be missing, generic ("Column C") or written in any language, and the
same concept is often named differently across sheets (amount / importe / 金额).
Match meaning, not spelling.

Always respond with a single valid JSON object that follows the schema given in
the request. Do not add commentary outside the JSON."#
}

/// Append the response schema to a task prompt.
pub fn with_schema(prompt: &str, schema: &Value) -> String {
    format!(
        "{}\n\n## Response Schema\nRespond with JSON matching:\n{}",
        prompt,
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
    )
}

// =============================================================================
// INTENT
// =============================================================================

/// Build a prompt classifying a query.
pub fn intent_prompt(query: &str) -> String {
    format!(
        r#"Classify this spreadsheet question.

## Query
"{}"

## Task
- intent_type: "aggregate" (totals, sums, counts, averages, "X by Y"),
  "filter" (rows matching conditions), "lookup" (one specific record or value)
  or "list" (show everything).
- target_concepts: the column concepts the answer needs, in the query's language
  AND in English (e.g. "importe", "amount").
- key_concept: the grouping concept for "X by/per Y" questions, otherwise null.
- filters: conditions as {{"concept", "operator", "value"}} with operator one of
  eq, ne, contains, gt, gte, lt, lte, between (between also sets "upper").
- aggregations: any of sum, count, average, min, max."#,
        query
    )
}

/// Response schema for intent classification.
pub fn intent_schema() -> Value {
    json!({
        "type": "object",
        "required": ["intent_type", "target_concepts"],
        "properties": {
            "intent_type": {"enum": ["lookup", "filter", "aggregate", "list"]},
            "target_concepts": {"type": "array", "items": {"type": "string"}},
            "key_concept": {"type": ["string", "null"]},
            "filters": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "concept": {"type": "string"},
                        "operator": {"type": "string"},
                        "value": {},
                        "upper": {}
                    }
                }
            },
            "aggregations": {
                "type": "array",
                "items": {"enum": ["sum", "count", "average", "min", "max"]}
            }
        }
    })
}

/// Build a prompt expanding one concept into variants.
pub fn concept_expansion_prompt(concept: &str) -> String {
    format!(
        r#"List up to 8 alternative column names a spreadsheet might use for the
concept "{}": synonyms, abbreviations and translations (Spanish, French, German,
Portuguese, Russian, Chinese, Japanese). Lowercase, no duplicates."#,
        concept
    )
}

/// Response schema for concept expansion.
pub fn concept_expansion_schema() -> Value {
    json!({
        "type": "object",
        "required": ["variants"],
        "properties": {
            "variants": {"type": "array", "items": {"type": "string"}, "maxItems": 8}
        }
    })
}

// =============================================================================
// SHEET MATCHING
// =============================================================================

/// Build a prompt scoring a batch of sheets. Each sheet is listed under its
/// position in `batch`, which the response refers back to.
pub fn sheet_match_prompt(
    query: &str,
    intent: &SearchIntent,
    batch: &[(&CandidateFile, &CandidateSheet)],
) -> String {
    let sheets = batch
        .iter()
        .enumerate()
        .map(|(i, (file, sheet))| {
            let columns = sheet
                .columns
                .iter()
                .map(|c| match &c.data_type {
                    Some(t) => format!("{} ({})", c.name, t),
                    None => c.name.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "[{}] file \"{}\", sheet \"{}\"{}\n    columns: {}",
                i,
                file.file_name,
                sheet.name,
                sheet
                    .summary
                    .as_deref()
                    .map(|s| format!("\n    summary: {}", s))
                    .unwrap_or_default(),
                if columns.is_empty() { "(unknown)".to_string() } else { columns }
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Score how likely each sheet can answer the query.

## Query
"{}"
Concepts: {}

## Sheets
{}

## Task
For every sheet give a relevance score from 0.0 to 1.0 and short reasons.
Column names may be in another language than the query; judge by meaning."#,
        query,
        intent
            .target_concepts
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
        sheets
    )
}

/// Response schema for sheet scoring.
pub fn sheet_match_schema() -> Value {
    json!({
        "type": "object",
        "required": ["matches"],
        "properties": {
            "matches": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["sheet", "score"],
                    "properties": {
                        "sheet": {"type": "integer"},
                        "score": {"type": "number"},
                        "reasons": {"type": "array", "items": {"type": "string"}}
                    }
                }
            }
        }
    })
}

// =============================================================================
// COLUMN MATCHING
// =============================================================================

/// Build a prompt asking which column holds a concept.
pub fn column_match_prompt(concept: &str, columns: &[ColumnProfile]) -> String {
    let listing = columns
        .iter()
        .map(|c| format!("  [{}] {} ({})", c.index, c.inferred_name, c.data_type.as_str()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Which column holds the concept "{}"?

## Columns
{}

## Task
Match across languages, synonyms and abbreviations ("importe" = "amount",
"proveedor" = "vendor", "金额" = "amount"). Return the column index, or null when
no column fits, with a confidence from 0.0 to 1.0."#,
        concept, listing
    )
}

/// Response schema for column matching.
pub fn column_match_schema() -> Value {
    json!({
        "type": "object",
        "required": ["column_index"],
        "properties": {
            "column_index": {"type": ["integer", "null"]},
            "confidence": {"type": "number"},
            "reason": {"type": "string"}
        }
    })
}

// =============================================================================
// PLANNING
// =============================================================================

/// Reference card for the extraction pipeline language.
const PIPELINE_REFERENCE: &str = r#"A procedure is a JSON array of steps applied in order to `rows`
(all grid rows, header rows included) with `headers` naming the columns.
Columns are referenced by header name or 0-based index.

Row steps:
  {"op": "slice", "start": N, "end": M}        keep rows [N, M)
  {"op": "drop_blank"}                          drop rows with no values
  {"op": "require_any", "columns": [c, ...]}   keep rows with a value in any column
  {"op": "filter", "column": c, "operator": "eq|ne|contains|gt|gte|lt|lte|between",
   "value": v, "upper": v2}
  {"op": "coerce", "column": c, "to": "number|text|boolean"}
  {"op": "sort", "column": c, "descending": true}
  {"op": "limit", "count": N}
Final step (at most one, must be last):
  {"op": "project", "columns": [c, ...]}       list of records
  {"op": "group", "key": c, "sum": [c, ...]}   {key: {"count", "total"}}
  {"op": "aggregate", "function": "sum|avg|min|max|count", "column": c}
  {"op": "distinct", "column": c}
  {"op": "count"}
Without a final step the result is every remaining row as a record."#;

/// Build a prompt synthesizing an extraction procedure.
pub fn plan_prompt(
    query: &str,
    intent: &SearchIntent,
    structure: &SheetStructure,
    column_matches: &[ColumnMatch],
    failures: &[PlanFailure],
) -> String {
    let matches = if column_matches.is_empty() {
        "  (none resolved)".to_string()
    } else {
        column_matches
            .iter()
            .map(|m| {
                format!(
                    "  \"{}\" -> [{}] \"{}\" (confidence {:.2})",
                    m.concept, m.column_index, m.column_name, m.confidence
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut prompt = format!(
        r#"Write an extraction procedure answering the query over one sheet.

## Query
"{}"
Intent: {}

## Sheet Structure
Rows: {}, columns: {}
Data rows: {} to {} (exclusive); rows before that are titles or headers.
{}

## Resolved Columns
{}

## Pipeline Language
{}

## Task
Return the procedure plus a one-line description, the expected output format,
your confidence (0.0-1.0) and any warnings about ambiguous columns."#,
        query,
        serde_json::to_string(intent).unwrap_or_default(),
        structure.dimensions.rows,
        structure.dimensions.cols,
        structure.data_start_row,
        structure.data_end_row(),
        structure.describe(),
        matches,
        PIPELINE_REFERENCE,
    );

    if !failures.is_empty() {
        prompt.push_str("\n\n## Previous Attempts Failed\n");
        for failure in failures {
            prompt.push_str(&format!("- attempt {}: {}\n", failure.attempt, failure.error));
            if let Some(hint) = &failure.hint {
                prompt.push_str(&format!("  hint: {}\n", hint));
            }
        }
        prompt.push_str("Fix the procedure so it does not fail the same way.");
    }
    prompt
}

/// Response schema for planning.
pub fn plan_schema() -> Value {
    json!({
        "type": "object",
        "required": ["procedure"],
        "properties": {
            "procedure": {"type": "array", "items": {"type": "object"}},
            "description": {"type": "string"},
            "expectedOutputFormat": {"type": "string"},
            "confidence": {"type": "number"},
            "warnings": {"type": "array", "items": {"type": "string"}}
        }
    })
}
