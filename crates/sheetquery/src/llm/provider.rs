//! Collaborator traits and shared request types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SheetQueryError};

/// The kind of reasoning a completion request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTask {
    /// Classify a query into a search intent.
    Intent,
    /// Expand a concept into multilingual variants.
    ConceptExpansion,
    /// Score sheets against a query.
    SheetMatch,
    /// Pick the column that answers a concept.
    ColumnMatch,
    /// Synthesize an extraction procedure.
    Plan,
}

impl PromptTask {
    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptTask::Intent => "intent",
            PromptTask::ConceptExpansion => "concept_expansion",
            PromptTask::SheetMatch => "sheet_match",
            PromptTask::ColumnMatch => "column_match",
            PromptTask::Plan => "plan",
        }
    }
}

/// A structured-output completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub task: PromptTask,
    /// User prompt text.
    pub prompt: String,
    /// JSON schema the response must follow.
    pub schema: Value,
}

impl CompletionRequest {
    /// Create a new request.
    pub fn new(task: PromptTask, prompt: impl Into<String>, schema: Value) -> Self {
        Self {
            task,
            prompt: prompt.into(),
            schema,
        }
    }
}

/// Configuration for LLM providers.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model to use (e.g., "claude-sonnet-4-20250514").
    pub model: String,

    /// Maximum tokens in response.
    pub max_tokens: usize,

    /// Temperature for generation (0.0-1.0).
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 2048,
            temperature: 0.1,
        }
    }
}

impl LlmConfig {
    /// Use a different model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the response token limit.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Trait for completion collaborators returning structured JSON.
///
/// Implementations must be thread-safe (Send + Sync): calls are issued
/// from worker threads and from parallel sheet tasks.
pub trait CompletionProvider: Send + Sync {
    /// Run one completion and return the parsed JSON response.
    fn complete(&self, request: &CompletionRequest) -> Result<Value>;

    /// Get the name of this provider (for logging/debugging).
    fn name(&self) -> &str;
}

/// Trait for text embedding collaborators.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a short text into a dense vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the name of this provider (for logging/debugging).
    fn name(&self) -> &str;
}

/// Parse JSON from an LLM response, handling markdown code blocks and
/// leading or trailing prose.
pub fn parse_json_response(response: &str) -> Result<Value> {
    // Try to extract JSON from markdown code block if present
    let json_str = if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .unwrap_or(response)
    } else if response.contains("```") {
        response
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .unwrap_or(response)
    } else {
        response.trim()
    };

    if let Ok(value) = serde_json::from_str(json_str) {
        return Ok(value);
    }

    // Fall back to the outermost object or array in the text.
    let start = json_str.find(['{', '[']);
    let end = json_str.rfind(['}', ']']);
    match (start, end) {
        (Some(s), Some(e)) if e > s => serde_json::from_str(&json_str[s..=e]).map_err(|e| {
            SheetQueryError::Malformed(format!("Failed to parse LLM JSON response: {}", e))
        }),
        _ => Err(SheetQueryError::Malformed(
            "No JSON found in LLM response".to_string(),
        )),
    }
}

/// Cosine similarity of two vectors; 0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += f64::from(*x) * f64::from(*y);
        na += f64::from(*x) * f64::from(*x);
        nb += f64::from(*y) * f64::from(*y);
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
