//! Sandboxed execution of extraction procedures.
//!
//! Each attempt runs on a dedicated worker thread under a hard deadline.
//! The caller stops waiting at the deadline no matter what the procedure
//! does; a failed attempt asks the caller for a regenerated procedure
//! until the attempt limit is reached.

mod context;
mod executor;
mod interpreter;

pub use context::{CancellationToken, EvalContext};
pub use executor::{
    AttemptRecord, ExecutionState, ExecutorConfig, ExtractionOutcome, Procedure, SandboxedExecutor,
};
pub use interpreter::run_program;
