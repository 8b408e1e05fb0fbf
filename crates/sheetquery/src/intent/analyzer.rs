//! Query intent analysis with collaborator-backed concept expansion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SheetQueryError};
use crate::grid::Comparison;
use crate::llm::{
    call_with_timeout, prompts, resolve, CallBudget, CompletionProvider, CompletionRequest,
    PromptTask, ResolutionSource,
};

use super::fallback::fallback_intent;
use super::types::{AggregationKind, IntentFilter, IntentType, SearchIntent};

/// Tunables for intent analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    /// Expand concepts when the collaborator returns fewer targets than this.
    pub min_concepts: usize,
    /// Maximum expansion calls per query.
    pub max_expansions: usize,
    /// Maximum variants kept per expansion.
    pub max_variants: usize,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            min_concepts: 3,
            max_expansions: 3,
            max_variants: 8,
        }
    }
}

/// Turns query text into a [`SearchIntent`].
pub struct IntentAnalyzer {
    provider: Option<Arc<dyn CompletionProvider>>,
    config: IntentConfig,
    timeout: Duration,
    /// Concept expansions keyed by lowercased concept, kept for the
    /// analyzer's lifetime.
    expansions: Mutex<HashMap<String, Vec<String>>>,
}

impl IntentAnalyzer {
    /// Create a fallback-only analyzer.
    pub fn new() -> Self {
        Self {
            provider: None,
            config: IntentConfig::default(),
            timeout: Duration::from_secs(30),
            expansions: Mutex::new(HashMap::new()),
        }
    }

    /// Use a completion collaborator, waiting at most `timeout` per call.
    pub fn with_provider(mut self, provider: Arc<dyn CompletionProvider>, timeout: Duration) -> Self {
        self.provider = Some(provider);
        self.timeout = timeout;
        self
    }

    /// Use custom settings.
    pub fn with_config(mut self, config: IntentConfig) -> Self {
        self.config = config;
        self
    }

    /// Analyze a query. Fails only for empty queries.
    pub fn analyze(&self, query: &str) -> Result<SearchIntent> {
        self.analyze_within(query, &CallBudget::new(self.timeout))
    }

    /// Analyze a query, spending at most `budget` on collaborator calls.
    pub fn analyze_within(&self, query: &str, budget: &CallBudget) -> Result<SearchIntent> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SheetQueryError::EmptyQuery);
        }

        let mut intent = match &self.provider {
            None => fallback_intent(query),
            Some(provider) => {
                let provider = Arc::clone(provider);
                let request = CompletionRequest::new(
                    PromptTask::Intent,
                    prompts::intent_prompt(query),
                    prompts::intent_schema(),
                );
                let resolved = resolve(
                    "intent",
                    budget,
                    move || parse_intent(&provider.complete(&request)?),
                    || fallback_intent(query),
                );
                let mut intent = resolved.value;
                if resolved.source == ResolutionSource::Collaborator
                    && intent.target_concepts.len() < self.config.min_concepts
                {
                    self.expand(&mut intent, budget);
                }
                intent
            }
        };

        intent.normalize();
        tracing::info!(
            intent = ?intent.intent_type,
            source = ?intent.source,
            concepts = intent.target_concepts.len(),
            key = intent.key_concept.as_deref().unwrap_or("-"),
            "analyzed query intent"
        );
        Ok(intent)
    }

    /// Broaden targets with memoized per-concept variants.
    fn expand(&self, intent: &mut SearchIntent, budget: &CallBudget) {
        let Some(provider) = &self.provider else {
            return;
        };
        let concepts: Vec<String> = intent
            .target_concepts
            .iter()
            .take(self.config.max_expansions)
            .cloned()
            .collect();

        for concept in concepts {
            let key = concept.to_lowercase();
            let cached = self
                .expansions
                .lock()
                .ok()
                .and_then(|memo| memo.get(&key).cloned());

            let variants = match cached {
                Some(variants) => variants,
                None => {
                    let provider = Arc::clone(provider);
                    let request = CompletionRequest::new(
                        PromptTask::ConceptExpansion,
                        prompts::concept_expansion_prompt(&concept),
                        prompts::concept_expansion_schema(),
                    );
                    let max = self.config.max_variants;
                    let result = call_with_timeout("concept_expansion", budget, move || {
                        parse_variants(&provider.complete(&request)?, max)
                    });
                    match result {
                        Ok(variants) => {
                            if let Ok(mut memo) = self.expansions.lock() {
                                memo.insert(key, variants.clone());
                            }
                            variants
                        }
                        Err(e) => {
                            tracing::warn!(concept = %concept, error = %e, "concept expansion failed");
                            continue;
                        }
                    }
                }
            };

            for variant in variants {
                intent.add_concept(&variant);
            }
        }
    }

    /// Number of memoized concept expansions.
    pub fn memoized_expansions(&self) -> usize {
        self.expansions.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for IntentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a collaborator intent response.
fn parse_intent(value: &Value) -> Result<SearchIntent> {
    let intent_type = value
        .get("intent_type")
        .and_then(Value::as_str)
        .and_then(IntentType::parse)
        .ok_or_else(|| SheetQueryError::Malformed("missing or unknown intent_type".to_string()))?;

    let mut intent = SearchIntent::new(intent_type, ResolutionSource::Collaborator);
    if let Some(concepts) = value.get("target_concepts").and_then(Value::as_array) {
        for concept in concepts.iter().filter_map(Value::as_str) {
            intent.add_concept(concept);
        }
    }
    intent.key_concept = value
        .get("key_concept")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(filters) = value.get("filters").and_then(Value::as_array) {
        for f in filters {
            let concept = f.get("concept").and_then(Value::as_str);
            let operator = f
                .get("operator")
                .and_then(Value::as_str)
                .and_then(Comparison::parse);
            if let (Some(concept), Some(operator)) = (concept, operator) {
                intent.filters.push(IntentFilter {
                    concept: concept.to_string(),
                    operator,
                    value: f.get("value").cloned().unwrap_or(Value::Null),
                    upper: f.get("upper").filter(|v| !v.is_null()).cloned(),
                });
            }
        }
    }

    if let Some(aggs) = value.get("aggregations").and_then(Value::as_array) {
        intent.aggregations = aggs
            .iter()
            .filter_map(Value::as_str)
            .filter_map(AggregationKind::parse)
            .collect();
    }

    intent.normalize();
    if intent.target_concepts.is_empty() {
        return Err(SheetQueryError::Malformed(
            "intent response has no target concepts".to_string(),
        ));
    }
    Ok(intent)
}

fn parse_variants(value: &Value, max: usize) -> Result<Vec<String>> {
    let variants = value
        .get("variants")
        .and_then(Value::as_array)
        .ok_or_else(|| SheetQueryError::Malformed("missing variants".to_string()))?;
    Ok(variants
        .iter()
        .filter_map(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(max)
        .collect())
}
