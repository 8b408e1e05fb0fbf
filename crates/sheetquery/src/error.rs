//! Error types for the SheetQuery library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for SheetQuery operations.
#[derive(Debug, Error)]
pub enum SheetQueryError {
    /// Error reading or accessing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A collaborator (completion or embedding service) failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// A collaborator answered, but not in the requested shape.
    #[error("Malformed collaborator response: {0}")]
    Malformed(String),

    /// A bounded operation did not finish in time.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The file source could not provide a sheet.
    #[error("Source error for '{file_id}' / '{sheet}': {message}")]
    Source {
        file_id: String,
        sheet: String,
        message: String,
    },

    /// The requested sheet does not exist in the file.
    #[error("Sheet '{sheet}' not found in '{file_id}'")]
    SheetNotFound { file_id: String, sheet: String },

    /// The access token was rejected by the file source.
    #[error("Access token rejected for '{0}'")]
    Unauthorized(String),

    /// The query text was empty.
    #[error("Query is empty")]
    EmptyQuery,

    /// No candidate files were supplied.
    #[error("No candidate sheets to search")]
    NoCandidates,

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// A procedure failed while running in the sandbox.
    #[error("Execution error: {0}")]
    Execution(String),
}

/// Result type alias for SheetQuery operations.
pub type Result<T> = std::result::Result<T, SheetQueryError>;
