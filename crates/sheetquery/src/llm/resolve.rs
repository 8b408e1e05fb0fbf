//! Bounded collaborator calls with deterministic fallbacks.
//!
//! Every collaborator call runs on its own worker thread while the caller
//! waits at most the time its [`CallBudget`] allows. A timed-out or
//! cancelled worker is abandoned; its late answer is dropped with the
//! channel.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SheetQueryError};
use crate::sandbox::CancellationToken;

/// How often a waiting caller looks at the cancellation flag.
const CANCEL_POLL: Duration = Duration::from_millis(25);

/// Which path produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// The collaborator answered in time and in shape.
    Collaborator,
    /// The deterministic fallback was used.
    Fallback,
}

/// A value together with the path that produced it.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ResolutionSource,
}

/// Time and cancellation limits shared by the collaborator calls of one
/// request.
///
/// Each call waits at most `per_call`, and never past the request
/// deadline. Once the deadline passes or the token is cancelled, calls
/// fail immediately without contacting the collaborator.
#[derive(Debug, Clone)]
pub struct CallBudget {
    per_call: Duration,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallBudget {
    /// A budget with only a per-call limit.
    pub fn new(per_call: Duration) -> Self {
        Self {
            per_call,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A budget whose calls all end by `started + timeout`.
    pub fn for_request(started: Instant, timeout: Duration) -> Self {
        Self::new(timeout).with_deadline(started + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Time the next call may wait.
    pub fn remaining(&self) -> Duration {
        match self.deadline {
            Some(deadline) => self
                .per_call
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.per_call,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True when no further collaborator call can be made.
    pub fn is_exhausted(&self) -> bool {
        self.is_cancelled() || self.remaining().is_zero()
    }
}

/// Run `primary` on a worker thread and wait for it within `budget`.
///
/// An exhausted budget fails without spawning the worker. Panics inside
/// `primary` are reported as collaborator errors.
pub fn call_with_timeout<T, P>(operation: &str, budget: &CallBudget, primary: P) -> Result<T>
where
    T: Send + 'static,
    P: FnOnce() -> Result<T> + Send + 'static,
{
    if budget.is_cancelled() {
        return Err(SheetQueryError::Cancelled);
    }
    let allowed = budget.remaining();
    if allowed.is_zero() {
        return Err(SheetQueryError::Timeout {
            operation: operation.to_string(),
            timeout_ms: 0,
        });
    }
    let deadline = Instant::now() + allowed;

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("collaborator-{}", operation))
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(primary));
            // The receiver is gone when the caller already gave up.
            let _ = tx.send(outcome);
        })
        .map_err(|e| SheetQueryError::Collaborator(format!("failed to spawn worker: {}", e)))?;

    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(SheetQueryError::Timeout {
                operation: operation.to_string(),
                timeout_ms: allowed.as_millis() as u64,
            });
        }
        match rx.recv_timeout(left.min(CANCEL_POLL)) {
            Ok(Ok(result)) => return result,
            Ok(Err(_)) => {
                return Err(SheetQueryError::Collaborator(format!(
                    "{} worker panicked",
                    operation
                )));
            }
            Err(RecvTimeoutError::Timeout) => {
                if budget.is_cancelled() {
                    return Err(SheetQueryError::Cancelled);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(SheetQueryError::Collaborator(format!(
                    "{} worker exited without a result",
                    operation
                )));
            }
        }
    }
}

/// Try the collaborator path, falling back to `fallback` on any error,
/// malformed answer, timeout or cancellation. Never fails.
pub fn resolve<T, P, F>(operation: &str, budget: &CallBudget, primary: P, fallback: F) -> Resolved<T>
where
    T: Send + 'static,
    P: FnOnce() -> Result<T> + Send + 'static,
    F: FnOnce() -> T,
{
    match call_with_timeout(operation, budget, primary) {
        Ok(value) => {
            tracing::debug!(operation, "collaborator answered");
            Resolved {
                value,
                source: ResolutionSource::Collaborator,
            }
        }
        Err(e) => {
            tracing::warn!(operation, error = %e, "collaborator failed, using fallback");
            Resolved {
                value: fallback(),
                source: ResolutionSource::Fallback,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn budget(ms: u64) -> CallBudget {
        CallBudget::new(Duration::from_millis(ms))
    }

    #[test]
    fn test_primary_value_used() {
        let r = resolve("test", &budget(1000), || Ok(7), || 0);
        assert_eq!(r.value, 7);
        assert_eq!(r.source, ResolutionSource::Collaborator);
    }

    #[test]
    fn test_error_uses_fallback() {
        let r = resolve(
            "test",
            &budget(1000),
            || Err(SheetQueryError::Collaborator("down".to_string())),
            || 3,
        );
        assert_eq!(r.value, 3);
        assert_eq!(r.source, ResolutionSource::Fallback);
    }

    #[test]
    fn test_timeout_uses_fallback_without_waiting() {
        let start = Instant::now();
        let r = resolve(
            "slow",
            &budget(50),
            || {
                thread::sleep(Duration::from_secs(2));
                Ok(1)
            },
            || 2,
        );
        assert_eq!(r.value, 2);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_panic_is_reported() {
        let result: Result<i32> = call_with_timeout("boom", &budget(1000), || panic!("bad collaborator"));
        assert!(matches!(result, Err(SheetQueryError::Collaborator(_))));
    }

    #[test]
    fn test_wait_never_passes_request_deadline() {
        let budget = CallBudget::new(Duration::from_secs(5))
            .with_deadline(Instant::now() + Duration::from_millis(100));
        assert!(budget.remaining() <= Duration::from_millis(100));

        let start = Instant::now();
        let result: Result<i32> = call_with_timeout("slow", &budget, || {
            thread::sleep(Duration::from_secs(2));
            Ok(1)
        });
        assert!(matches!(result, Err(SheetQueryError::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_exhausted_budget_skips_the_collaborator() {
        let budget = CallBudget::for_request(Instant::now(), Duration::ZERO);
        assert!(budget.is_exhausted());

        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let r = resolve(
            "skipped",
            &budget,
            move || {
                flag.store(true, Ordering::SeqCst);
                Ok(1)
            },
            || 2,
        );
        assert_eq!(r.value, 2);
        assert_eq!(r.source, ResolutionSource::Fallback);
        thread::sleep(Duration::from_millis(20));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancellation_abandons_a_waiting_call() {
        let cancel = CancellationToken::new();
        let budget = budget(5000).with_cancellation(cancel.clone());
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        });

        let start = Instant::now();
        let result: Result<i32> = call_with_timeout("stuck", &budget, || {
            thread::sleep(Duration::from_secs(3));
            Ok(1)
        });
        canceller.join().unwrap();
        assert!(matches!(result, Err(SheetQueryError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
