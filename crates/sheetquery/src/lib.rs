//! SheetQuery: natural-language queries over semi-structured spreadsheets.
//!
//! Given a question and a set of candidate sheets, SheetQuery works out
//! which sheets are relevant, which columns answer the question (across
//! languages, missing headers and stray empty rows), builds an extraction
//! procedure for each sheet and runs it under a hard time limit, repairing
//! the procedure when it fails.
//!
//! # Core Principles
//!
//! - **Fallback everywhere**: every collaborator-backed step has a
//!   deterministic path, so the engine works offline
//! - **Bounded execution**: procedures are a small pipeline language run on
//!   a worker thread with a per-attempt deadline
//! - **Explicit confidence**: matches, plans and failures carry scores,
//!   methods and warnings
//!
//! # Example
//!
//! ```no_run
//! use sheetquery::{MemorySource, SearchOptions, SheetQuery};
//!
//! let source = MemorySource::new().with_sheet(
//!     "ledger",
//!     "Payments",
//!     vec![vec!["Vendor", "Amount"], vec!["Acme", "100"], vec!["Beta", "200"]],
//! );
//! let engine = SheetQuery::new(source);
//! let candidates = vec![engine.describe_file("", "ledger").unwrap()];
//! let response = engine
//!     .search("total by vendor", &candidates, "", &SearchOptions::default())
//!     .unwrap();
//!
//! println!("{}", response.results[0].result_value);
//! ```

pub mod cache;
pub mod error;
pub mod grid;
pub mod intent;
pub mod llm;
pub mod matching;
pub mod plan;
pub mod sandbox;
pub mod schema;
pub mod structure;

mod engine;

pub use crate::engine::{
    EngineConfig, FailureStage, SearchOptions, SearchResponse, SheetFailure, SheetQuery,
    SheetResult,
};
pub use cache::{CacheConfig, DataCache, RetrievalRequest, RetrievalResult, Retriever, RowFilter};
pub use error::{Result, SheetQueryError};
pub use grid::{
    CellValue, Comparison, DirectorySource, DirectorySourceConfig, FileSource, MemorySource,
    SheetGrid, SheetSelector,
};
pub use intent::{IntentAnalyzer, IntentType, SearchIntent};
pub use llm::{
    AnthropicProvider, CompletionProvider, EmbeddingProvider, LlmConfig, MockEmbedder,
    MockProvider, OllamaProvider, OpenAIProvider,
};
pub use matching::{
    CandidateColumn, CandidateFile, CandidateSheet, ColumnMatch, ColumnMatcher, MatchMethod,
    SheetMatch, SheetMatcher,
};
pub use plan::{ExtractionPlan, ExtractionPlanner, Program, Step};
pub use sandbox::{CancellationToken, ExecutorConfig, ExtractionOutcome, SandboxedExecutor};
pub use schema::{ColumnProfile, DataType, SheetStructure};
pub use structure::StructureAnalyzer;
