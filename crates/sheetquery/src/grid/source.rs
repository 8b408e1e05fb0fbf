//! File-source collaborators that hand out raw sheet grids.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SheetQueryError};

use super::cell::CellValue;
use super::sheet::SheetGrid;

/// Delimiters to try when auto-detecting.
const DELIMITERS: &[u8] = &[b'\t', b',', b';', b'|'];

/// Extensions treated as sheets by [`DirectorySource`].
const SHEET_EXTENSIONS: &[&str] = &["csv", "tsv", "txt", "psv"];

/// How a sheet is addressed inside a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetSelector {
    /// By sheet name (case-insensitive).
    Name(String),
    /// By zero-based position.
    Index(usize),
}

impl fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelector::Name(name) => write!(f, "{}", name),
            SheetSelector::Index(idx) => write!(f, "#{}", idx),
        }
    }
}

impl From<&str> for SheetSelector {
    fn from(value: &str) -> Self {
        SheetSelector::Name(value.to_string())
    }
}

impl From<usize> for SheetSelector {
    fn from(value: usize) -> Self {
        SheetSelector::Index(value)
    }
}

/// External storage that loads raw grids.
///
/// Implementations must be thread-safe; sheets are loaded from parallel
/// sheet tasks.
pub trait FileSource: Send + Sync {
    /// Load one sheet of a file.
    fn load(&self, access_token: &str, file_id: &str, sheet: &SheetSelector) -> Result<SheetGrid>;

    /// List the sheet names of a file, in order.
    fn list_sheets(&self, access_token: &str, file_id: &str) -> Result<Vec<String>>;

    /// Name of this source (for logging).
    fn name(&self) -> &str;
}

/// Check a presented token against an optional required one.
fn check_token(required: Option<&str>, presented: &str, file_id: &str) -> Result<()> {
    match required {
        Some(expected) if expected != presented => {
            Err(SheetQueryError::Unauthorized(file_id.to_string()))
        }
        _ => Ok(()),
    }
}

/// Pick a sheet position from a list of names.
fn select_sheet(names: &[String], file_id: &str, sheet: &SheetSelector) -> Result<usize> {
    let found = match sheet {
        SheetSelector::Name(name) => names.iter().position(|n| n.eq_ignore_ascii_case(name)),
        SheetSelector::Index(idx) => (*idx < names.len()).then_some(*idx),
    };
    found.ok_or_else(|| SheetQueryError::SheetNotFound {
        file_id: file_id.to_string(),
        sheet: sheet.to_string(),
    })
}

// =============================================================================
// IN-MEMORY SOURCE
// =============================================================================

/// In-memory source, mainly for tests and embedding hosts that already hold
/// the grids.
#[derive(Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<(String, Vec<Vec<CellValue>>)>>,
    required_token: Option<String>,
    loads: AtomicUsize,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require this access token on every call.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.required_token = Some(token.into());
        self
    }

    /// Add a sheet to a file (files are created on first use).
    pub fn with_sheet<R, C>(mut self, file_id: &str, sheet_name: &str, rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = C>,
        C: Into<CellValue>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        self.files
            .entry(file_id.to_string())
            .or_default()
            .push((sheet_name.to_string(), rows));
        self
    }

    /// Number of successful loads served so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl FileSource for MemorySource {
    fn load(&self, access_token: &str, file_id: &str, sheet: &SheetSelector) -> Result<SheetGrid> {
        check_token(self.required_token.as_deref(), access_token, file_id)?;
        let sheets = self.files.get(file_id).ok_or_else(|| SheetQueryError::Source {
            file_id: file_id.to_string(),
            sheet: sheet.to_string(),
            message: "file not found".to_string(),
        })?;
        let names: Vec<String> = sheets.iter().map(|(name, _)| name.clone()).collect();
        let idx = select_sheet(&names, file_id, sheet)?;
        let (name, rows) = &sheets[idx];
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(SheetGrid::new(file_id, name.clone(), rows.clone()))
    }

    fn list_sheets(&self, access_token: &str, file_id: &str) -> Result<Vec<String>> {
        check_token(self.required_token.as_deref(), access_token, file_id)?;
        Ok(self
            .files
            .get(file_id)
            .map(|sheets| sheets.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// =============================================================================
// DIRECTORY SOURCE
// =============================================================================

/// Configuration for reading delimited sheet files.
#[derive(Debug, Clone)]
pub struct DirectorySourceConfig {
    /// Delimiter to use (None = auto-detect).
    pub delimiter: Option<u8>,
    /// Quote character.
    pub quote: u8,
    /// Maximum rows to read per sheet (None = all).
    pub max_rows: Option<usize>,
}

impl Default for DirectorySourceConfig {
    fn default() -> Self {
        Self {
            delimiter: None,
            quote: b'"',
            max_rows: None,
        }
    }
}

/// Reads delimited text files from a directory tree.
///
/// A file id names either a sub-directory (each delimited file inside is one
/// sheet, ordered by name) or a single delimited file (one sheet named after
/// its stem). Paths are resolved relative to the root and may not escape it.
/// Lines holding only delimiters stay as empty rows; fully blank lines are
/// dropped by the CSV reader.
pub struct DirectorySource {
    root: PathBuf,
    config: DirectorySourceConfig,
    required_token: Option<String>,
}

impl DirectorySource {
    /// Create a source rooted at a directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, DirectorySourceConfig::default())
    }

    /// Create a source with custom parsing configuration.
    pub fn with_config(root: impl Into<PathBuf>, config: DirectorySourceConfig) -> Self {
        Self {
            root: root.into(),
            config,
            required_token: None,
        }
    }

    /// Require this access token on every call.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.required_token = Some(token.into());
        self
    }

    /// List the file ids available under the root.
    pub fn list_files(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| SheetQueryError::Io {
            path: self.root.clone(),
            source: e,
        })?;
        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() || is_sheet_file(path))
            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Resolve a file id to its sheet files.
    fn sheet_files(&self, file_id: &str) -> Result<Vec<PathBuf>> {
        if file_id.split(['/', '\\']).any(|part| part == "..") {
            return Err(SheetQueryError::Source {
                file_id: file_id.to_string(),
                sheet: String::new(),
                message: "file id escapes the source root".to_string(),
            });
        }
        let path = self.root.join(file_id);
        if path.is_dir() {
            let entries = fs::read_dir(&path).map_err(|e| SheetQueryError::Io {
                path: path.clone(),
                source: e,
            })?;
            let mut files: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|p| is_sheet_file(p))
                .collect();
            files.sort();
            Ok(files)
        } else if path.is_file() {
            Ok(vec![path])
        } else {
            Err(SheetQueryError::Source {
                file_id: file_id.to_string(),
                sheet: String::new(),
                message: "file not found".to_string(),
            })
        }
    }

    /// Read one delimited file into a grid.
    fn read_grid(&self, file_id: &str, sheet_name: &str, path: &Path) -> Result<SheetGrid> {
        let bytes = fs::read(path).map_err(|e| SheetQueryError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let delimiter = match self.config.delimiter {
            Some(d) => d,
            None => detect_delimiter(&bytes),
        };
        let rows = parse_rows(&bytes, delimiter, self.config.quote, self.config.max_rows)?;
        debug!(
            path = %path.display(),
            delimiter = %(delimiter as char),
            rows = rows.len(),
            "parsed sheet file"
        );
        Ok(SheetGrid::new(file_id, sheet_name, rows))
    }
}

impl FileSource for DirectorySource {
    fn load(&self, access_token: &str, file_id: &str, sheet: &SheetSelector) -> Result<SheetGrid> {
        check_token(self.required_token.as_deref(), access_token, file_id)?;
        let files = self.sheet_files(file_id)?;
        let names: Vec<String> = files.iter().map(|p| sheet_name_of(p)).collect();
        let idx = select_sheet(&names, file_id, sheet)?;
        self.read_grid(file_id, &names[idx], &files[idx])
    }

    fn list_sheets(&self, access_token: &str, file_id: &str) -> Result<Vec<String>> {
        check_token(self.required_token.as_deref(), access_token, file_id)?;
        Ok(self
            .sheet_files(file_id)?
            .iter()
            .map(|p| sheet_name_of(p))
            .collect())
    }

    fn name(&self) -> &str {
        "directory"
    }
}

fn is_sheet_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| SHEET_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn sheet_name_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parse delimited bytes into raw rows; no header handling happens here.
fn parse_rows(
    bytes: &[u8],
    delimiter: u8,
    quote: u8,
    max_rows: Option<usize>,
) -> Result<Vec<Vec<CellValue>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .quote(quote)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        if max_rows.is_some_and(|max| row_idx >= max) {
            break;
        }
        let record = result?;
        rows.push(record.iter().map(CellValue::from_raw).collect());
    }
    Ok(rows)
}

/// Detect the delimiter by analyzing the first few lines.
pub fn detect_delimiter(bytes: &[u8]) -> u8 {
    let reader = BufReader::new(bytes);
    let lines: Vec<String> = reader
        .lines()
        .take(10)
        .map_while(|l| l.ok())
        .filter(|l| !l.trim().is_empty())
        .collect();

    let mut best_delimiter = b',';
    let mut best_score = 0;

    for &delim in DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| count_delimiter_in_line(line, delim))
            .collect();

        let Some(&first_count) = counts.first() else {
            continue;
        };
        if first_count == 0 {
            continue;
        }

        let consistent = counts.iter().all(|&c| c == first_count);
        let mean = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
        let variance =
            counts.iter().map(|&c| (c as f64 - mean).powi(2)).sum::<f64>() / counts.len() as f64;

        // Higher count with lower variance wins; tabs get a slight bonus as
        // they rarely appear inside values.
        let score = if consistent {
            first_count * 1000 + if delim == b'\t' { 100 } else { 0 }
        } else if variance < 1.0 {
            first_count * 100
        } else {
            first_count
        };

        if score > best_score {
            best_score = score;
            best_delimiter = delim;
        }
    }

    best_delimiter
}

/// Count delimiter occurrences in a line, respecting quotes.
fn count_delimiter_in_line(line: &str, delimiter: u8) -> usize {
    let delim_char = delimiter as char;
    let mut count = 0;
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == delim_char && !in_quotes => count += 1,
            _ => {}
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_delimiter_csv() {
        assert_eq!(detect_delimiter(b"a,b,c\n1,2,3\n4,5,6"), b',');
    }

    #[test]
    fn test_detect_delimiter_tsv() {
        assert_eq!(detect_delimiter(b"a\tb\tc\n1\t2\t3\n4\t5\t6"), b'\t');
    }

    #[test]
    fn test_detect_delimiter_quoted_commas() {
        let data = b"name;note\n\"Acme, Inc\";ok\n\"Beta, LLC\";ok";
        assert_eq!(detect_delimiter(data), b';');
    }

    #[test]
    fn test_parse_rows_keeps_blank_lines_as_rows() {
        let rows = parse_rows(b"Vendor,Amount\nAcme,100\n,\nBeta,200", b',', b'"', None).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1][1], CellValue::Number(100.0));
        assert!(SheetGrid::is_row_empty(&rows[2]));
    }

    #[test]
    fn test_memory_source_selects_by_name_and_index() {
        let source = MemorySource::new()
            .with_sheet("f1", "Sales", vec![vec!["a"]])
            .with_sheet("f1", "Costs", vec![vec!["b"]]);

        let by_name = source.load("", "f1", &"costs".into()).unwrap();
        assert_eq!(by_name.metadata.sheet_name, "Costs");
        let by_index = source.load("", "f1", &0usize.into()).unwrap();
        assert_eq!(by_index.metadata.sheet_name, "Sales");
        assert_eq!(source.load_count(), 2);

        let missing = source.load("", "f1", &"Other".into());
        assert!(matches!(missing, Err(SheetQueryError::SheetNotFound { .. })));
    }

    #[test]
    fn test_memory_source_token() {
        let source = MemorySource::new()
            .with_token("secret")
            .with_sheet("f1", "S", vec![vec!["a"]]);
        assert!(matches!(
            source.load("wrong", "f1", &"S".into()),
            Err(SheetQueryError::Unauthorized(_))
        ));
        assert!(source.load("secret", "f1", &"S".into()).is_ok());
    }

    #[test]
    fn test_directory_source_reads_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let book = dir.path().join("book");
        fs::create_dir(&book).unwrap();
        let mut f = fs::File::create(book.join("payments.csv")).unwrap();
        f.write_all(b"Vendor,Amount\nAcme,100\n").unwrap();
        let mut g = fs::File::create(book.join("vendors.tsv")).unwrap();
        g.write_all(b"Name\tCity\nAcme\tParis\n").unwrap();

        let source = DirectorySource::new(dir.path());
        assert_eq!(source.list_files().unwrap(), vec!["book".to_string()]);
        assert_eq!(
            source.list_sheets("", "book").unwrap(),
            vec!["payments".to_string(), "vendors".to_string()]
        );

        let grid = source.load("", "book", &"vendors".into()).unwrap();
        assert_eq!(grid.cell(1, 1), &CellValue::from("Paris"));
        assert!(source.load("", "../etc", &0usize.into()).is_err());
    }
}
