//! Mock collaborators for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use crate::error::{Result, SheetQueryError};

use super::provider::{CompletionProvider, CompletionRequest, EmbeddingProvider, PromptTask};

/// Scripted reply for one task.
#[derive(Debug, Clone)]
enum Reply {
    Value(Value),
    Failure(String),
}

#[derive(Debug, Default)]
struct Script {
    /// Replies consumed in order before the default applies.
    queue: VecDeque<Reply>,
    /// Reply used once the queue is empty.
    default: Option<Reply>,
}

/// Mock completion provider returning scripted responses per task.
///
/// Tasks without a script fail, which exercises the fallback paths.
#[derive(Debug, Default)]
pub struct MockProvider {
    scripts: Mutex<HashMap<PromptTask, Script>>,
    calls: Mutex<HashMap<PromptTask, Vec<String>>>,
    latency: Option<Duration>,
}

impl MockProvider {
    /// Create a new mock provider with no scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `task` with `response` (after any queued replies).
    pub fn with_response(self, task: PromptTask, response: Value) -> Self {
        self.script(task, |s| s.default = Some(Reply::Value(response)));
        self
    }

    /// Answer the next calls for `task` with `responses`, in order.
    pub fn with_sequence(self, task: PromptTask, responses: Vec<Value>) -> Self {
        self.script(task, |s| {
            s.queue.extend(responses.into_iter().map(Reply::Value));
        });
        self
    }

    /// Always fail `task` with `message`.
    pub fn with_failure(self, task: PromptTask, message: impl Into<String>) -> Self {
        let message = message.into();
        self.script(task, |s| s.default = Some(Reply::Failure(message)));
        self
    }

    /// Fail the next call for `task`, then continue with the script.
    pub fn with_failure_once(self, task: PromptTask, message: impl Into<String>) -> Self {
        let message = message.into();
        self.script(task, |s| s.queue.push_back(Reply::Failure(message)));
        self
    }

    /// Sleep before every reply.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn script(&self, task: PromptTask, f: impl FnOnce(&mut Script)) {
        if let Ok(mut scripts) = self.scripts.lock() {
            f(scripts.entry(task).or_default());
        }
    }

    /// Number of calls made for `task`.
    pub fn call_count(&self, task: PromptTask) -> usize {
        self.calls
            .lock()
            .map(|c| c.get(&task).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Number of calls across all tasks.
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|c| c.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Prompts received for `task`, oldest first.
    pub fn prompts(&self, task: PromptTask) -> Vec<String> {
        self.calls
            .lock()
            .map(|c| c.get(&task).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl CompletionProvider for MockProvider {
    fn complete(&self, request: &CompletionRequest) -> Result<Value> {
        if let Ok(mut calls) = self.calls.lock() {
            calls
                .entry(request.task)
                .or_default()
                .push(request.prompt.clone());
        }
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }

        let reply = {
            let mut scripts = self
                .scripts
                .lock()
                .map_err(|_| SheetQueryError::Collaborator("mock state poisoned".to_string()))?;
            scripts
                .get_mut(&request.task)
                .and_then(|s| s.queue.pop_front().or_else(|| s.default.clone()))
        };

        match reply {
            Some(Reply::Value(v)) => Ok(v),
            Some(Reply::Failure(message)) => Err(SheetQueryError::Collaborator(message)),
            None => Err(SheetQueryError::Collaborator(format!(
                "no scripted response for {}",
                request.task.as_str()
            ))),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Mock embedding provider serving a fixed vector per lowercased text.
#[derive(Debug, Default)]
pub struct MockEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    calls: Mutex<usize>,
}

impl MockEmbedder {
    /// Create an embedder with no vectors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the vector for a text.
    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_lowercase(), vector);
        self
    }

    /// Number of embed calls served.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or(0)
    }
}

impl EmbeddingProvider for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        self.vectors
            .get(&text.to_lowercase())
            .cloned()
            .ok_or_else(|| SheetQueryError::Collaborator(format!("no vector for '{}'", text)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
