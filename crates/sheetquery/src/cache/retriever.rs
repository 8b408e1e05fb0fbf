//! Filtered row retrieval without plan synthesis.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::grid::{CellValue, Comparison, FileSource, SheetSelector};
use crate::matching::text::resolve_header;

use super::store::DataCache;

const DEFAULT_MAX_ROWS: usize = 1000;

fn default_max_rows() -> usize {
    DEFAULT_MAX_ROWS
}

/// A single-column predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    /// Header name, resolved fuzzily against the sheet headers.
    pub column: String,
    pub operator: Comparison,
    pub value: Value,
    /// Upper bound for `between`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<Value>,
}

impl RowFilter {
    pub fn new(column: impl Into<String>, operator: Comparison, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
            upper: None,
        }
    }

    pub fn between(column: impl Into<String>, lower: impl Into<Value>, upper: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator: Comparison::Between,
            value: lower.into(),
            upper: Some(upper.into()),
        }
    }
}

/// What to retrieve from one sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub file_id: String,
    pub sheet: SheetSelector,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub filters: Vec<RowFilter>,
    /// Rows must have a value in at least one of these columns.
    #[serde(default)]
    pub key_columns: Vec<String>,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default)]
    pub include_empty_rows: bool,
    #[serde(default)]
    pub force_refresh: bool,
}

impl RetrievalRequest {
    pub fn new(file_id: impl Into<String>, sheet: impl Into<SheetSelector>) -> Self {
        Self {
            file_id: file_id.into(),
            sheet: sheet.into(),
            access_token: String::new(),
            filters: Vec::new(),
            key_columns: Vec::new(),
            max_rows: DEFAULT_MAX_ROWS,
            include_empty_rows: false,
            force_refresh: false,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = token.into();
        self
    }

    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
        self.key_columns.push(column.into());
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_empty_rows(mut self, include: bool) -> Self {
        self.include_empty_rows = include;
        self
    }

    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }
}

/// Rows that passed the filters, with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// Data rows below the header row, before filtering.
    pub total_rows: usize,
    /// Rows that passed the filters, before the cap.
    pub filtered_rows: usize,
    pub truncated: bool,
    pub cache_hit: bool,
    pub loaded_at: DateTime<Utc>,
    pub warnings: Vec<String>,
}

/// Loads sheets through the cache and filters their rows.
#[derive(Clone)]
pub struct Retriever {
    source: Arc<dyn FileSource>,
    cache: Arc<DataCache>,
}

impl Retriever {
    pub fn new(source: Arc<dyn FileSource>, cache: Arc<DataCache>) -> Self {
        Self { source, cache }
    }

    pub fn cache(&self) -> &Arc<DataCache> {
        &self.cache
    }

    pub fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResult> {
        let (grid, cache_hit) = self.cache.get_or_load(
            self.source.as_ref(),
            &request.access_token,
            &request.file_id,
            &request.sheet,
            request.force_refresh,
        )?;

        let header_row = grid.first_non_empty_row();
        let headers: Vec<String> = header_row
            .map(|r| grid.rows()[r].iter().map(|c| c.as_text().trim().to_string()).collect())
            .unwrap_or_default();
        let data = match header_row {
            Some(r) => &grid.rows()[r + 1..],
            None => &[][..],
        };

        let mut warnings = Vec::new();
        let mut filters = Vec::new();
        for filter in &request.filters {
            match resolve_header(&headers, &filter.column) {
                Some(col) => filters.push((col, filter)),
                None => {
                    warn!(column = %filter.column, "filter column not found, ignoring");
                    warnings.push(format!(
                        "filter column '{}' not found; filter ignored",
                        filter.column
                    ));
                }
            }
        }

        let mut keys = Vec::new();
        for column in &request.key_columns {
            match resolve_header(&headers, column) {
                Some(col) => keys.push(col),
                None => warnings.push(format!("key column '{}' not found; ignored", column)),
            }
        }

        let matched: Vec<&Vec<CellValue>> = data
            .iter()
            .filter(|row| request.include_empty_rows || !row.iter().all(CellValue::is_empty))
            .filter(|row| {
                keys.is_empty()
                    || keys
                        .iter()
                        .any(|&k| row.get(k).is_some_and(|c| !c.is_empty()))
            })
            .filter(|row| {
                filters.iter().all(|(col, f)| {
                    f.operator.evaluate(
                        row.get(*col).unwrap_or(&CellValue::Null),
                        &f.value,
                        f.upper.as_ref(),
                    )
                })
            })
            .collect();

        let filtered_rows = matched.len();
        let truncated = filtered_rows > request.max_rows;
        let rows: Vec<Vec<CellValue>> = matched
            .into_iter()
            .take(request.max_rows)
            .cloned()
            .collect();

        debug!(
            file_id = %request.file_id,
            total = data.len(),
            filtered = filtered_rows,
            truncated,
            cache_hit,
            "retrieved rows"
        );

        Ok(RetrievalResult {
            headers,
            rows,
            total_rows: data.len(),
            filtered_rows,
            truncated,
            cache_hit,
            loaded_at: grid.metadata.loaded_at,
            warnings,
        })
    }
}
