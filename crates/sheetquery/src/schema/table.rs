//! Sheet-level structure definition.

use serde::{Deserialize, Serialize};

use super::column::ColumnProfile;

/// Grid dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub rows: usize,
    pub cols: usize,
}

/// Rectangular bounds; `end_row` and `end_col` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBounds {
    pub start_row: usize,
    pub end_row: usize,
    pub start_col: usize,
    pub end_col: usize,
}

impl TableBounds {
    /// Number of rows covered.
    pub fn row_count(&self) -> usize {
        self.end_row.saturating_sub(self.start_row)
    }

    /// Number of columns covered.
    pub fn col_count(&self) -> usize {
        self.end_col.saturating_sub(self.start_col)
    }

    /// Whether the bounds fit inside the given dimensions.
    pub fn within(&self, dims: Dimensions) -> bool {
        self.start_row <= self.end_row
            && self.start_col <= self.end_col
            && self.end_row <= dims.rows
            && self.end_col <= dims.cols
    }
}

/// A detected contiguous block assumed to hold one header+data table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRegion {
    pub bounds: TableBounds,
    pub has_headers: bool,
    pub header_row_count: usize,
}

impl TableRegion {
    /// First row holding data (after the header rows).
    pub fn data_start_row(&self) -> usize {
        (self.bounds.start_row + self.header_row_count).min(self.bounds.end_row)
    }
}

/// A header cell that visually spans the empty header cells to its right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRegion {
    pub row: usize,
    pub start_col: usize,
    /// Exclusive.
    pub end_col: usize,
}

/// Sheet-wide column patterns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataPatterns {
    /// Columns without any value.
    pub empty_columns: Vec<usize>,
    /// Columns with density below one half.
    pub sparse_columns: Vec<usize>,
    /// Columns holding spreadsheet formulas.
    pub formula_columns: Vec<usize>,
    /// Header cells spanning several columns.
    pub merged_regions: Vec<MergedRegion>,
}

/// Structure inferred for one sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetStructure {
    pub dimensions: Dimensions,
    /// Detected table regions in row order (never empty).
    pub tables: Vec<TableRegion>,
    /// One profile per grid column.
    pub columns: Vec<ColumnProfile>,
    pub patterns: DataPatterns,
    /// Index into `tables` of the region used for profiling.
    pub primary_table: usize,
    /// First data row of the primary region.
    pub data_start_row: usize,
}

impl SheetStructure {
    /// The region used for profiling and extraction.
    pub fn primary(&self) -> &TableRegion {
        &self.tables[self.primary_table.min(self.tables.len().saturating_sub(1))]
    }

    /// Exclusive end row of the primary region.
    pub fn data_end_row(&self) -> usize {
        self.primary().bounds.end_row
    }

    /// Column names in grid order (generated names for missing headers).
    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.inferred_name.clone()).collect()
    }

    /// Get a column profile by position.
    pub fn column(&self, index: usize) -> Option<&ColumnProfile> {
        self.columns.get(index)
    }

    /// Number of data rows in the primary region.
    pub fn data_row_count(&self) -> usize {
        self.data_end_row().saturating_sub(self.data_start_row)
    }

    /// Compact schema description for prompts (names and types only).
    pub fn describe(&self) -> String {
        self.columns
            .iter()
            .filter(|c| !c.is_empty())
            .map(|c| {
                format!(
                    "  [{}] {} ({}) \"{}\": {}, density {:.2}",
                    c.index,
                    c.letter_label,
                    if c.has_header() { "header" } else { "no header" },
                    c.inferred_name,
                    c.data_type.as_str(),
                    c.density
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_within() {
        let dims = Dimensions { rows: 5, cols: 3 };
        let inside = TableBounds {
            start_row: 1,
            end_row: 5,
            start_col: 0,
            end_col: 3,
        };
        let outside = TableBounds {
            start_row: 0,
            end_row: 6,
            start_col: 0,
            end_col: 3,
        };
        assert!(inside.within(dims));
        assert!(!outside.within(dims));
        assert_eq!(inside.row_count(), 4);
    }

    #[test]
    fn test_data_start_row_clamped() {
        let region = TableRegion {
            bounds: TableBounds {
                start_row: 2,
                end_row: 3,
                start_col: 0,
                end_col: 1,
            },
            has_headers: true,
            header_row_count: 2,
        };
        assert_eq!(region.data_start_row(), 3);
    }
}
