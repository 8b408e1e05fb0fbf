//! What a running procedure may see.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, SheetQueryError};
use crate::grid::{parse_number, CellValue, SheetGrid};
use crate::matching::text::normalize;

/// Shared cancellation flag for one search.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone observes it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Evaluation context of one execution attempt.
///
/// Exposes the sheet rows, the column headers and a few pure helpers.
/// Procedures must call [`EvalContext::checkpoint`] regularly so an
/// abandoned attempt stops consuming CPU.
pub struct EvalContext {
    grid: Arc<SheetGrid>,
    headers: Arc<[String]>,
    abort: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl EvalContext {
    pub fn new(
        grid: Arc<SheetGrid>,
        headers: Arc<[String]>,
        abort: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            grid,
            headers,
            abort,
            cancel,
        }
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        self.grid.rows()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Whether the executor gave up on this attempt or the search was cancelled.
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed) || self.cancel.is_cancelled()
    }

    /// Fail fast once the attempt is aborted.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SheetQueryError::Cancelled);
        }
        if self.abort.load(Ordering::Relaxed) {
            return Err(SheetQueryError::Execution("attempt aborted".to_string()));
        }
        Ok(())
    }

    /// Currency-aware number parsing.
    pub fn parse_number(&self, raw: &str) -> Option<f64> {
        parse_number(raw)
    }

    /// Case, accent and separator-insensitive form of a string.
    pub fn normalize(&self, s: &str) -> String {
        normalize(s)
    }

    /// Whether a row holds no values.
    pub fn is_blank_row(&self, row: &[CellValue]) -> bool {
        SheetGrid::is_row_empty(row)
    }
}
