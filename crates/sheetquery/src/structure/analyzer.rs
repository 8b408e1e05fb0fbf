//! Table region detection and per-column profiling.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::grid::{CellValue, SheetGrid};
use crate::schema::{
    ColumnProfile, DataPatterns, DataType, Dimensions, MergedRegion, SheetStructure, TableBounds,
    TableRegion, ValuePattern,
};

use super::patterns::{classify, matches_pattern};

/// Order used to break ties between equally frequent types.
const TYPE_ORDER: [DataType; 6] = [
    DataType::Number,
    DataType::Currency,
    DataType::Percentage,
    DataType::Date,
    DataType::Boolean,
    DataType::String,
];

const PATTERNS: [ValuePattern; 4] = [
    ValuePattern::Email,
    ValuePattern::Phone,
    ValuePattern::Id,
    ValuePattern::Url,
];

/// Tunables for structure analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureConfig {
    /// Consecutive empty rows that close a table region.
    pub region_gap: usize,
    /// Share of non-numeric cells above which a first row is a header.
    pub header_text_ratio: f64,
    /// Share a type needs among samples to become the column type.
    pub type_agreement: f64,
    /// Non-empty values sampled for type inference.
    pub type_sample_size: usize,
    /// Values examined for the unique count.
    pub unique_cap: usize,
    /// Values sampled for shape patterns and sample values.
    pub pattern_sample_size: usize,
    /// Share of samples a shape needs to be recorded.
    pub pattern_ratio: f64,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            region_gap: 3,
            header_text_ratio: 0.8,
            type_agreement: 0.7,
            type_sample_size: 100,
            unique_cap: 1000,
            pattern_sample_size: 20,
            pattern_ratio: 0.5,
        }
    }
}

/// Infers table regions, headers and column profiles from a raw grid.
///
/// Analysis is pure: the same grid always yields the same structure.
#[derive(Debug, Clone, Default)]
pub struct StructureAnalyzer {
    config: StructureConfig,
}

impl StructureAnalyzer {
    /// Create an analyzer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an analyzer with custom settings.
    pub fn with_config(config: StructureConfig) -> Self {
        Self { config }
    }

    /// Analyze a sheet grid.
    pub fn analyze(&self, grid: &SheetGrid) -> SheetStructure {
        let dimensions = Dimensions {
            rows: grid.row_count(),
            cols: grid.column_count(),
        };

        let mut tables = self.detect_regions(grid);
        if tables.is_empty() {
            tables.push(TableRegion {
                bounds: TableBounds {
                    start_row: 0,
                    end_row: dimensions.rows,
                    start_col: 0,
                    end_col: dimensions.cols,
                },
                has_headers: false,
                header_row_count: 0,
            });
        }

        // Largest region wins; the earliest one on ties.
        let mut primary_table = 0;
        for (i, region) in tables.iter().enumerate() {
            if region.bounds.row_count() > tables[primary_table].bounds.row_count() {
                primary_table = i;
            }
        }
        let primary = &tables[primary_table];
        let data_start_row = primary.data_start_row();
        let data_end_row = primary.bounds.end_row;

        let columns: Vec<ColumnProfile> = (0..dimensions.cols)
            .map(|col| {
                let header = if primary.has_headers {
                    let text = grid.cell(primary.bounds.start_row, col).as_text();
                    (!text.is_empty()).then(|| text.into_owned())
                } else {
                    None
                };
                self.profile_column(grid, col, header, data_start_row, data_end_row)
            })
            .collect();

        let patterns = detect_patterns(&columns, primary);

        tracing::debug!(
            sheet = %grid.metadata.sheet_name,
            regions = tables.len(),
            columns = columns.len(),
            data_start_row,
            "analyzed sheet structure"
        );

        SheetStructure {
            dimensions,
            tables,
            columns,
            patterns,
            primary_table,
            data_start_row,
        }
    }

    // =========================================================================
    // REGIONS
    // =========================================================================

    /// Split the grid into blocks separated by runs of empty rows.
    fn detect_regions(&self, grid: &SheetGrid) -> Vec<TableRegion> {
        let gap = self.config.region_gap.max(1);
        let mut regions = Vec::new();
        let mut start: Option<usize> = None;
        let mut last_filled = 0;
        let mut empty_run = 0;

        for (i, row) in grid.rows().iter().enumerate() {
            if SheetGrid::is_row_empty(row) {
                if let Some(s) = start {
                    empty_run += 1;
                    if empty_run >= gap {
                        regions.push(self.make_region(grid, s, last_filled + 1));
                        start = None;
                        empty_run = 0;
                    }
                }
            } else {
                if start.is_none() {
                    start = Some(i);
                }
                last_filled = i;
                empty_run = 0;
            }
        }
        if let Some(s) = start {
            regions.push(self.make_region(grid, s, last_filled + 1));
        }
        regions
    }

    fn make_region(&self, grid: &SheetGrid, start_row: usize, end_row: usize) -> TableRegion {
        let rows = &grid.rows()[start_row..end_row];
        let start_col = rows
            .iter()
            .filter_map(|r| r.iter().position(|c| !c.is_empty()))
            .min()
            .unwrap_or(0);
        let end_col = rows
            .iter()
            .filter_map(|r| r.iter().rposition(|c| !c.is_empty()))
            .max()
            .map_or(start_col, |c| c + 1);

        let has_headers = self.looks_like_header(&rows[0]);
        TableRegion {
            bounds: TableBounds {
                start_row,
                end_row,
                start_col,
                end_col,
            },
            has_headers,
            header_row_count: usize::from(has_headers),
        }
    }

    /// A first row is a header when most of its values are not numbers.
    fn looks_like_header(&self, row: &[CellValue]) -> bool {
        let filled: Vec<&CellValue> = row.iter().filter(|c| !c.is_empty()).collect();
        if filled.is_empty() {
            return false;
        }
        let text = filled.iter().filter(|c| c.as_number().is_none()).count();
        text as f64 / filled.len() as f64 > self.config.header_text_ratio
    }

    // =========================================================================
    // COLUMNS
    // =========================================================================

    fn profile_column(
        &self,
        grid: &SheetGrid,
        col: usize,
        header: Option<String>,
        start_row: usize,
        end_row: usize,
    ) -> ColumnProfile {
        let mut profile = ColumnProfile::new(col, header);
        let examined = end_row.saturating_sub(start_row);
        if examined == 0 {
            return profile;
        }

        let values: Vec<&CellValue> = (start_row..end_row)
            .map(|row| grid.cell(row, col))
            .filter(|c| !c.is_empty())
            .collect();
        if values.is_empty() {
            return profile;
        }

        profile.density = round2(values.len() as f64 / examined as f64);
        profile.data_type = self.majority_type(&values);

        let mut seen = HashSet::new();
        for v in values.iter().take(self.config.unique_cap) {
            seen.insert(v.as_text().into_owned());
        }
        profile.unique_value_count = seen.len();

        let samples = &values[..values.len().min(self.config.pattern_sample_size)];
        profile.sample_values = samples.iter().map(|v| v.as_text().into_owned()).collect();
        for pattern in PATTERNS {
            let hits = samples.iter().filter(|v| matches_pattern(v, pattern)).count();
            if hits as f64 / samples.len() as f64 >= self.config.pattern_ratio {
                profile.sample_patterns.push(pattern);
            }
        }

        profile.has_formula = values
            .iter()
            .take(self.config.unique_cap)
            .any(|v| v.is_formula());
        profile
    }

    /// Majority type over the first sampled values, or `Mixed`.
    fn majority_type(&self, values: &[&CellValue]) -> DataType {
        let mut counts: HashMap<DataType, usize> = HashMap::new();
        let mut total = 0;
        for v in values.iter().take(self.config.type_sample_size) {
            if let Some(t) = classify(v) {
                *counts.entry(t).or_insert(0) += 1;
                total += 1;
            }
        }
        if total == 0 {
            return DataType::Empty;
        }

        let mut best = DataType::Mixed;
        let mut best_count = 0;
        for t in TYPE_ORDER {
            let count = counts.get(&t).copied().unwrap_or(0);
            if count > best_count {
                best = t;
                best_count = count;
            }
        }
        if best_count as f64 / total as f64 > self.config.type_agreement {
            best
        } else {
            DataType::Mixed
        }
    }
}

/// Empty, sparse and formula columns plus merged header cells.
fn detect_patterns(columns: &[ColumnProfile], primary: &TableRegion) -> DataPatterns {
    let mut patterns = DataPatterns::default();
    for c in columns {
        if c.is_empty() {
            patterns.empty_columns.push(c.index);
        } else if c.density < 0.5 {
            patterns.sparse_columns.push(c.index);
        }
        if c.has_formula {
            patterns.formula_columns.push(c.index);
        }
    }

    if primary.has_headers {
        let mut col = primary.bounds.start_col;
        while col < primary.bounds.end_col {
            if !columns.get(col).is_some_and(ColumnProfile::has_header) {
                col += 1;
                continue;
            }
            let mut end = col + 1;
            while end < primary.bounds.end_col
                && columns
                    .get(end)
                    .is_some_and(|c| !c.has_header() && !c.is_empty())
            {
                end += 1;
            }
            if end > col + 1 {
                patterns.merged_regions.push(MergedRegion {
                    row: primary.bounds.start_row,
                    start_col: col,
                    end_col: end,
                });
            }
            col = end;
        }
    }
    patterns
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
