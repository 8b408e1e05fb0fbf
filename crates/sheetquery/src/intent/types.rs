//! Search intent representation.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::grid::Comparison;
use crate::llm::ResolutionSource;

/// What kind of answer a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    /// One specific record or value.
    Lookup,
    /// Rows matching conditions.
    Filter,
    /// Totals, counts or averages, optionally grouped.
    Aggregate,
    /// Everything in the sheet.
    List,
}

impl IntentType {
    /// Parse a lowercase intent name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "lookup" => Some(IntentType::Lookup),
            "filter" => Some(IntentType::Filter),
            "aggregate" | "aggregation" => Some(IntentType::Aggregate),
            "list" => Some(IntentType::List),
            _ => None,
        }
    }
}

/// Aggregation functions a query can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    Sum,
    Count,
    Average,
    Min,
    Max,
}

impl AggregationKind {
    /// Parse an aggregation name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sum" | "total" => Some(AggregationKind::Sum),
            "count" => Some(AggregationKind::Count),
            "average" | "avg" | "mean" => Some(AggregationKind::Average),
            "min" | "minimum" => Some(AggregationKind::Min),
            "max" | "maximum" => Some(AggregationKind::Max),
            _ => None,
        }
    }
}

/// A condition extracted from the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentFilter {
    /// Concept the condition applies to.
    pub concept: String,
    pub operator: Comparison,
    pub value: Value,
    /// Upper bound for `between`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<Value>,
}

/// Structured interpretation of a natural-language query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIntent {
    pub intent_type: IntentType,
    /// Column concepts the answer needs, in order of first mention.
    pub target_concepts: IndexSet<String>,
    /// Grouping concept for "X by Y" queries; always among the targets.
    pub key_concept: Option<String>,
    #[serde(default)]
    pub filters: Vec<IntentFilter>,
    #[serde(default)]
    pub aggregations: Vec<AggregationKind>,
    pub source: ResolutionSource,
}

impl SearchIntent {
    /// Create an intent with no concepts.
    pub fn new(intent_type: IntentType, source: ResolutionSource) -> Self {
        Self {
            intent_type,
            target_concepts: IndexSet::new(),
            key_concept: None,
            filters: Vec::new(),
            aggregations: Vec::new(),
            source,
        }
    }

    /// Add a target concept (trimmed; blanks and duplicates ignored).
    pub fn add_concept(&mut self, concept: &str) {
        let concept = concept.trim();
        if !concept.is_empty() {
            self.target_concepts.insert(concept.to_string());
        }
    }

    /// Set the key concept and fold it into the targets.
    pub fn with_key(mut self, key: &str) -> Self {
        self.key_concept = Some(key.trim().to_string());
        self.normalize();
        self
    }

    /// Enforce the intent invariants: trimmed, deduplicated concepts with
    /// the key concept folded into the targets.
    pub fn normalize(&mut self) {
        let concepts: IndexSet<String> = self
            .target_concepts
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        self.target_concepts = concepts;

        self.key_concept = self
            .key_concept
            .take()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        // The key concept leads the targets.
        if let Some(key) = &self.key_concept {
            let (index, _) = self.target_concepts.insert_full(key.clone());
            self.target_concepts.move_index(index, 0);
        }
        self.aggregations.dedup();
    }

    /// Target concepts as a plain list.
    pub fn concepts(&self) -> Vec<String> {
        self.target_concepts.iter().cloned().collect()
    }
}
