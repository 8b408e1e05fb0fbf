//! Bounded, self-repairing execution of extraction procedures.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::grid::SheetGrid;

use super::context::{CancellationToken, EvalContext};

/// Something the sandbox can run against a sheet.
pub trait Procedure: Send + Sync + 'static {
    fn run(&self, ctx: &EvalContext) -> Result<Value>;
}

/// Execution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Wall-clock limit per attempt.
    pub attempt_timeout: Duration,
    /// Attempts including the first.
    pub max_attempts: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}

impl ExecutorConfig {
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// States of the execution state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Executing,
    Succeeded,
    Failed,
    Regenerating,
    TerminalFailed,
}

/// One execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
    /// Whether the attempt was abandoned at the deadline.
    pub timed_out: bool,
}

/// Result of running a procedure to success or exhaustion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Last error when unsuccessful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
    /// Length of an array or object result, else 0.
    pub rows_processed: usize,
    pub attempts: Vec<AttemptRecord>,
    pub final_state: ExecutionState,
    /// Every state visited, in order.
    pub transitions: Vec<ExecutionState>,
}

struct AttemptFailure {
    message: String,
    timed_out: bool,
}

/// Runs procedures on worker threads under a hard per-attempt deadline,
/// asking for a regenerated procedure after each failure.
pub struct SandboxedExecutor {
    config: ExecutorConfig,
}

impl SandboxedExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute `initial`, then whatever `regenerate(attempt, error)` returns
    /// after each failure, until success, `None` or the attempt limit.
    pub fn execute<P, F>(
        &self,
        initial: P,
        grid: Arc<SheetGrid>,
        headers: Arc<[String]>,
        cancel: &CancellationToken,
        mut regenerate: F,
    ) -> ExtractionOutcome
    where
        P: Procedure,
        F: FnMut(u32, &str) -> Option<P>,
    {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut transitions = vec![ExecutionState::Pending];
        let mut attempts = Vec::new();
        let mut current = Arc::new(initial);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                last_error = Some("cancelled".to_string());
                break;
            }

            transitions.push(ExecutionState::Executing);
            let attempt_started = Instant::now();
            let outcome = self.run_attempt(&current, &grid, &headers, cancel);
            let elapsed_ms = attempt_started.elapsed().as_millis() as u64;

            match outcome {
                Ok(value) => {
                    transitions.push(ExecutionState::Succeeded);
                    attempts.push(AttemptRecord {
                        attempt,
                        succeeded: true,
                        error: None,
                        elapsed_ms,
                        timed_out: false,
                    });
                    tracing::info!(attempt, elapsed_ms, "procedure succeeded");
                    let rows_processed = match &value {
                        Value::Array(items) => items.len(),
                        Value::Object(map) => map.len(),
                        _ => 0,
                    };
                    return ExtractionOutcome {
                        success: true,
                        result: Some(value),
                        error: None,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        rows_processed,
                        attempts,
                        final_state: ExecutionState::Succeeded,
                        transitions,
                    };
                }
                Err(failure) => {
                    transitions.push(ExecutionState::Failed);
                    tracing::warn!(
                        attempt,
                        elapsed_ms,
                        timed_out = failure.timed_out,
                        error = %failure.message,
                        "procedure failed"
                    );
                    attempts.push(AttemptRecord {
                        attempt,
                        succeeded: false,
                        error: Some(failure.message.clone()),
                        elapsed_ms,
                        timed_out: failure.timed_out,
                    });
                    last_error = Some(failure.message);

                    if attempt == max_attempts || cancel.is_cancelled() {
                        break;
                    }
                    transitions.push(ExecutionState::Regenerating);
                    let error = last_error.as_deref().unwrap_or_default();
                    match regenerate(attempt, error) {
                        Some(next) => current = Arc::new(next),
                        None => break,
                    }
                }
            }
        }

        transitions.push(ExecutionState::TerminalFailed);
        ExtractionOutcome {
            success: false,
            result: None,
            error: last_error,
            elapsed_ms: started.elapsed().as_millis() as u64,
            rows_processed: 0,
            attempts,
            final_state: ExecutionState::TerminalFailed,
            transitions,
        }
    }

    /// Run one attempt on its own thread, waiting at most the attempt timeout.
    fn run_attempt<P: Procedure>(
        &self,
        procedure: &Arc<P>,
        grid: &Arc<SheetGrid>,
        headers: &Arc<[String]>,
        cancel: &CancellationToken,
    ) -> std::result::Result<Value, AttemptFailure> {
        let abort = Arc::new(AtomicBool::new(false));
        let ctx = EvalContext::new(
            Arc::clone(grid),
            Arc::clone(headers),
            Arc::clone(&abort),
            cancel.clone(),
        );
        let procedure = Arc::clone(procedure);
        let (tx, rx) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name("sheetquery-sandbox".to_string())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| procedure.run(&ctx)));
                // The receiver is gone when the attempt was abandoned.
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            return Err(AttemptFailure {
                message: format!("could not start sandbox worker: {}", e),
                timed_out: false,
            });
        }

        let timeout = self.config.attempt_timeout;
        match rx.recv_timeout(timeout) {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(AttemptFailure {
                message: e.to_string(),
                timed_out: false,
            }),
            Ok(Err(payload)) => Err(AttemptFailure {
                message: format!("procedure panicked: {}", panic_message(payload.as_ref())),
                timed_out: false,
            }),
            Err(RecvTimeoutError::Timeout) => {
                abort.store(true, Ordering::SeqCst);
                Err(AttemptFailure {
                    message: format!(
                        "procedure exceeded the {} ms time limit and was aborted",
                        timeout.as_millis()
                    ),
                    timed_out: true,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(AttemptFailure {
                message: "sandbox worker exited without a result".to_string(),
                timed_out: false,
            }),
        }
    }
}

impl Default for SandboxedExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Program;
    use serde_json::json;

    fn grid() -> (Arc<SheetGrid>, Arc<[String]>) {
        let grid = SheetGrid::from_values(
            "f",
            "s",
            vec![vec!["Vendor", "Amount"], vec!["Acme", "100"], vec!["Beta", "200"]],
        );
        (Arc::new(grid), vec!["Vendor".to_string(), "Amount".to_string()].into())
    }

    /// Test procedures with controllable behavior.
    enum Scripted {
        Program(Program),
        /// Spins until the executor aborts the attempt.
        Spin,
        /// Ignores the abort flag entirely.
        Sleep(Duration),
        Panic,
    }

    impl Procedure for Scripted {
        fn run(&self, ctx: &EvalContext) -> Result<Value> {
            match self {
                Scripted::Program(p) => p.run(ctx),
                Scripted::Spin => loop {
                    ctx.checkpoint()?;
                    std::hint::spin_loop();
                },
                Scripted::Sleep(d) => {
                    thread::sleep(*d);
                    Ok(json!("late"))
                }
                Scripted::Panic => panic!("boom"),
            }
        }
    }

    fn program(steps: Value) -> Scripted {
        Scripted::Program(Program::from_json(&steps).unwrap())
    }

    fn executor(timeout_ms: u64) -> SandboxedExecutor {
        SandboxedExecutor::new(
            ExecutorConfig::default()
                .with_attempt_timeout(Duration::from_millis(timeout_ms))
                .with_max_attempts(3),
        )
    }

    #[test]
    fn test_first_attempt_succeeds() {
        let (grid, headers) = grid();
        let outcome = executor(1000).execute(
            program(json!([{"op": "slice", "start": 1}, {"op": "project", "columns": [0]}])),
            grid,
            headers,
            &CancellationToken::new(),
            |_, _| None,
        );
        assert!(outcome.success);
        assert_eq!(outcome.rows_processed, 2);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(
            outcome.transitions,
            vec![ExecutionState::Pending, ExecutionState::Executing, ExecutionState::Succeeded]
        );
    }

    #[test]
    fn test_failure_regenerates_with_error() {
        let (grid, headers) = grid();
        let mut seen = Vec::new();
        let outcome = executor(1000).execute(
            program(json!([{"op": "distinct", "column": "Supplier"}])),
            grid,
            headers,
            &CancellationToken::new(),
            |attempt, error| {
                seen.push((attempt, error.to_string()));
                Some(program(json!([{"op": "slice", "start": 1}, {"op": "distinct", "column": 0}])))
            },
        );
        assert!(outcome.success);
        assert_eq!(outcome.result, Some(json!(["Acme", "Beta"])));
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 1);
        assert!(seen[0].1.contains("undefined"));
        assert_eq!(
            outcome.transitions,
            vec![
                ExecutionState::Pending,
                ExecutionState::Executing,
                ExecutionState::Failed,
                ExecutionState::Regenerating,
                ExecutionState::Executing,
                ExecutionState::Succeeded,
            ]
        );
    }

    #[test]
    fn test_exhaustion_keeps_last_error() {
        let (grid, headers) = grid();
        let mut calls = 0;
        let outcome = executor(1000).execute(
            program(json!([{"op": "distinct", "column": 9}])),
            grid,
            headers,
            &CancellationToken::new(),
            |_, _| {
                calls += 1;
                Some(program(json!([{"op": "aggregate", "function": "sum"}])))
            },
        );
        assert!(!outcome.success);
        assert_eq!(outcome.final_state, ExecutionState::TerminalFailed);
        assert_eq!(outcome.attempts.len(), 3);
        assert_eq!(calls, 2);
        assert!(outcome.error.unwrap().contains("missing its column"));
    }

    #[test]
    fn test_runaway_procedure_aborted_at_deadline() {
        let (grid, headers) = grid();
        let started = Instant::now();
        let outcome = executor(100).execute(
            Scripted::Spin,
            grid,
            headers,
            &CancellationToken::new(),
            |_, _| Some(program(json!([{"op": "count"}]))),
        );
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert!(outcome.success);
        assert_eq!(outcome.result, Some(json!(3)));
        assert_eq!(outcome.attempts.len(), 2);
        assert!(outcome.attempts[0].timed_out);
        assert!(!outcome.attempts[0].succeeded);
    }

    #[test]
    fn test_uncooperative_procedures_bounded() {
        let (grid, headers) = grid();
        let started = Instant::now();
        let outcome = executor(100).execute(
            Scripted::Sleep(Duration::from_secs(3)),
            grid,
            headers,
            &CancellationToken::new(),
            |_, _| Some(Scripted::Sleep(Duration::from_secs(3))),
        );
        // 3 attempts × 100 ms plus scheduling slack.
        assert!(started.elapsed() < Duration::from_millis(1500));
        assert!(!outcome.success);
        assert_eq!(outcome.attempts.len(), 3);
        assert!(outcome.attempts.iter().all(|a| a.timed_out));
    }

    #[test]
    fn test_panic_becomes_failure() {
        let (grid, headers) = grid();
        let outcome = executor(1000).execute(
            Scripted::Panic,
            grid,
            headers,
            &CancellationToken::new(),
            |_, _| None,
        );
        assert!(!outcome.success);
        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.error.unwrap().contains("boom"));
    }

    #[test]
    fn test_cancelled_before_start() {
        let (grid, headers) = grid();
        let token = CancellationToken::new();
        token.cancel();
        let outcome =
            executor(1000).execute(program(json!([{"op": "count"}])), grid, headers, &token, |_, _| None);
        assert!(!outcome.success);
        assert!(outcome.attempts.is_empty());
        assert_eq!(outcome.error.as_deref(), Some("cancelled"));
    }
}
