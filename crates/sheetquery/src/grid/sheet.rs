//! Raw sheet grids as delivered by a file source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::cell::CellValue;

static NULL_CELL: CellValue = CellValue::Null;

/// Metadata about a loaded sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridMetadata {
    /// Identifier of the file the sheet belongs to.
    pub file_id: String,
    /// Sheet name within the file.
    pub sheet_name: String,
    /// SHA-256 hash of the sheet contents.
    pub hash: String,
    /// When the sheet was loaded from its source.
    pub loaded_at: DateTime<Utc>,
    /// Number of rows (including header and empty rows).
    pub row_count: usize,
    /// Width of the widest row.
    pub column_count: usize,
}

/// Immutable, ordered rows of scalar cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetGrid {
    /// Provenance of the grid.
    pub metadata: GridMetadata,
    rows: Vec<Vec<CellValue>>,
}

impl SheetGrid {
    /// Create a grid, hashing its contents.
    pub fn new(
        file_id: impl Into<String>,
        sheet_name: impl Into<String>,
        rows: Vec<Vec<CellValue>>,
    ) -> Self {
        let column_count = rows.iter().map(Vec::len).max().unwrap_or(0);
        let hash = content_hash(&rows);
        Self {
            metadata: GridMetadata {
                file_id: file_id.into(),
                sheet_name: sheet_name.into(),
                hash,
                loaded_at: Utc::now(),
                row_count: rows.len(),
                column_count,
            },
            rows,
        }
    }

    /// Create a grid from anything convertible into cells.
    pub fn from_values<R, C>(file_id: &str, sheet_name: &str, rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = C>,
        C: Into<CellValue>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        Self::new(file_id, sheet_name, rows)
    }

    /// All rows.
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Width of the widest row.
    pub fn column_count(&self) -> usize {
        self.metadata.column_count
    }

    /// Cell at (row, col); out-of-range positions read as null.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&NULL_CELL)
    }

    /// Whether a row has no non-empty cells.
    pub fn is_row_empty(row: &[CellValue]) -> bool {
        row.iter().all(CellValue::is_empty)
    }

    /// Index of the first row holding any value.
    pub fn first_non_empty_row(&self) -> Option<usize> {
        self.rows.iter().position(|r| !Self::is_row_empty(r))
    }
}

/// Hash the display text of every cell, row by row.
fn content_hash(rows: &[Vec<CellValue>]) -> String {
    let mut hasher = Sha256::new();
    for row in rows {
        for cell in row {
            hasher.update(cell.as_text().as_bytes());
            hasher.update(b"\t");
        }
        hasher.update(b"\n");
    }
    format!("sha256:{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_use_widest_row() {
        let grid = SheetGrid::from_values(
            "f1",
            "Sheet1",
            vec![vec!["a", "b"], vec!["c", "d", "e"], vec![]],
        );
        assert_eq!(grid.row_count(), 3);
        assert_eq!(grid.column_count(), 3);
        assert_eq!(grid.cell(0, 2), &CellValue::Null);
        assert_eq!(grid.cell(10, 0), &CellValue::Null);
    }

    #[test]
    fn test_hash_is_content_based() {
        let a = SheetGrid::from_values("f", "s", vec![vec!["x", "y"]]);
        let b = SheetGrid::from_values("g", "t", vec![vec!["x", "y"]]);
        let c = SheetGrid::from_values("f", "s", vec![vec!["x", "z"]]);
        assert_eq!(a.metadata.hash, b.metadata.hash);
        assert_ne!(a.metadata.hash, c.metadata.hash);
        assert!(a.metadata.hash.starts_with("sha256:"));
    }

    #[test]
    fn test_first_non_empty_row() {
        let grid = SheetGrid::new(
            "f",
            "s",
            vec![
                vec![CellValue::Null],
                vec![CellValue::Text("  ".to_string())],
                vec![CellValue::from("h")],
            ],
        );
        assert_eq!(grid.first_non_empty_row(), Some(2));
    }
}
