//! CLI command implementations.

pub mod analyze;
pub mod retrieve;
pub mod search;

use std::path::{Path, PathBuf};

use sheetquery::{CellValue, DirectorySource};

/// Split a sheet file path into a directory source and its file id.
pub(crate) fn file_source(file: &Path) -> Result<(DirectorySource, String), Box<dyn std::error::Error>> {
    if !file.is_file() {
        return Err(format!("File not found: {}", file.display()).into());
    }
    let file_id = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| format!("Invalid file path: {}", file.display()))?;
    let root = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((DirectorySource::new(root), file_id))
}

/// Cell text clipped to a column width.
pub(crate) fn clip(cell: &CellValue, width: usize) -> String {
    let text = cell.as_text();
    if text.chars().count() <= width {
        text.into_owned()
    } else {
        let mut clipped: String = text.chars().take(width.saturating_sub(1)).collect();
        clipped.push('…');
        clipped
    }
}
