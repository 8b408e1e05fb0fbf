//! Concept-to-column matching cascade.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SheetQueryError};
use crate::grid::CellValue;
use crate::llm::{
    call_with_timeout, cosine_similarity, prompts, CallBudget, CompletionProvider,
    CompletionRequest, EmbeddingProvider, PromptTask,
};
use crate::schema::{ColumnProfile, DataType, ValuePattern};
use crate::structure::patterns::{
    classify, is_amount_value, is_company_name, is_date_value, is_email, is_phone, matches_pattern,
};

use super::synonyms::{concept_kind_loose, synonyms, ConceptKind};
use super::text::{find_term, normalize, ratio, same_script};

/// Placeholder headers that say nothing about the column content.
static GENERIC_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?:column|col|field|unnamed|untitled|spalte|columna|colonne|coluna|столбец|列)\s*(?:[a-z]{1,3}|\d+)?|\d+)$",
    )
    .unwrap()
});

/// How a column match was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
    Synonym,
    Embedding,
    Semantic,
    Pattern,
}

/// A concept resolved to a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMatch {
    pub concept: String,
    /// Sheet column index of the matched profile.
    pub column_index: usize,
    pub column_name: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub method: MatchMethod,
}

/// Acceptance thresholds and weights for the matching cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchThresholds {
    /// Minimum confidence (exclusive) for any match to be returned.
    pub acceptance: f64,
    /// Minimum similarity ratio (exclusive) for fuzzy hits.
    pub fuzzy_ratio: f64,
    /// Fuzzy confidence = ratio × this weight.
    pub fuzzy_weight: f64,
    /// Score given to whole-word containment ("amount" in "Invoice Amount").
    pub containment_score: f64,
    /// Synonym confidence = exact/fuzzy confidence × this weight.
    pub synonym_weight: f64,
    /// Minimum cosine similarity (exclusive) for embedding hits.
    pub embedding_similarity: f64,
    /// Confidence used when the semantic collaborator gives none.
    pub semantic_default: f64,
    /// Synonym stage runs while the best confidence is below this.
    pub synonym_gate: f64,
    /// Embedding stage runs while the best confidence is below this.
    pub embedding_gate: f64,
    /// Semantic stage runs while the best confidence is below this.
    pub semantic_gate: f64,
    /// Pattern stage runs while the best confidence is below this.
    pub pattern_gate: f64,
    /// Sampled values checked by the pattern stage.
    pub pattern_sample_size: usize,
    /// Minimum matching samples for a pattern hit.
    pub pattern_min_hits: usize,
    /// Required share of matching samples per shape.
    pub pattern_email: f64,
    pub pattern_phone: f64,
    pub pattern_date: f64,
    pub pattern_currency: f64,
    pub pattern_vendor: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            acceptance: 0.5,
            fuzzy_ratio: 0.7,
            fuzzy_weight: 0.9,
            containment_score: 0.8,
            synonym_weight: 0.85,
            embedding_similarity: 0.8,
            semantic_default: 0.7,
            synonym_gate: 0.85,
            embedding_gate: 0.8,
            semantic_gate: 0.7,
            pattern_gate: 0.6,
            pattern_sample_size: 20,
            pattern_min_hits: 3,
            pattern_email: 0.8,
            pattern_phone: 0.7,
            pattern_date: 0.7,
            pattern_currency: 0.6,
            pattern_vendor: 0.9,
        }
    }
}

/// Resolves concepts to columns through six stages: exact, fuzzy, synonym,
/// embedding, semantic and value pattern.
pub struct ColumnMatcher {
    thresholds: MatchThresholds,
    completion: Option<Arc<dyn CompletionProvider>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    timeout: Duration,
    /// Embeddings keyed by lowercased text, kept for the matcher's lifetime.
    embeddings: Mutex<HashMap<String, Vec<f32>>>,
}

impl ColumnMatcher {
    /// Create a matcher using only the deterministic stages.
    pub fn new() -> Self {
        Self {
            thresholds: MatchThresholds::default(),
            completion: None,
            embedder: None,
            timeout: Duration::from_secs(30),
            embeddings: Mutex::new(HashMap::new()),
        }
    }

    /// Use custom thresholds.
    pub fn with_thresholds(mut self, thresholds: MatchThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Enable the semantic stage.
    pub fn with_completion(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.completion = Some(provider);
        self
    }

    /// Enable the embedding stage.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Bound every collaborator call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Match every concept; unresolved concepts are omitted.
    pub fn match_concepts(&self, concepts: &[String], columns: &[ColumnProfile]) -> Vec<ColumnMatch> {
        self.match_concepts_within(concepts, columns, &CallBudget::new(self.timeout))
    }

    /// Match every concept, spending at most `budget` on collaborator stages.
    pub fn match_concepts_within(
        &self,
        concepts: &[String],
        columns: &[ColumnProfile],
        budget: &CallBudget,
    ) -> Vec<ColumnMatch> {
        concepts
            .iter()
            .filter_map(|c| self.match_concept_within(c, columns, budget))
            .collect()
    }

    /// Find the column that best holds `concept`.
    pub fn match_concept(&self, concept: &str, columns: &[ColumnProfile]) -> Option<ColumnMatch> {
        self.match_concept_within(concept, columns, &CallBudget::new(self.timeout))
    }

    /// Find the column that best holds `concept`. Collaborator stages are
    /// skipped once `budget` is spent.
    pub fn match_concept_within(
        &self,
        concept: &str,
        columns: &[ColumnProfile],
        budget: &CallBudget,
    ) -> Option<ColumnMatch> {
        let target = normalize(concept);
        if target.is_empty() || columns.is_empty() {
            return None;
        }
        let names: Vec<String> = columns.iter().map(|c| normalize(&c.inferred_name)).collect();
        let t = &self.thresholds;
        let mut best: Option<ColumnMatch> = None;

        // Stage 1: exact
        if let Some(i) = names.iter().position(|n| *n == target) {
            consider(&mut best, concept, &columns[i], 1.0, MatchMethod::Exact);
        }

        // Stage 2: fuzzy
        if best_confidence(&best) < 1.0 {
            for (i, name) in names.iter().enumerate() {
                let score = self.fuzzy_score(&target, name);
                if score > t.fuzzy_ratio {
                    consider(&mut best, concept, &columns[i], score * t.fuzzy_weight, MatchMethod::Fuzzy);
                }
            }
        }

        // Stage 3: synonyms
        if best_confidence(&best) < t.synonym_gate {
            for synonym in synonyms(concept) {
                for (i, name) in names.iter().enumerate() {
                    let confidence = if *name == synonym {
                        t.synonym_weight
                    } else {
                        let score = self.fuzzy_score(&synonym, name);
                        if score <= t.fuzzy_ratio {
                            continue;
                        }
                        score * t.fuzzy_weight * t.synonym_weight
                    };
                    consider(&mut best, concept, &columns[i], confidence, MatchMethod::Synonym);
                }
            }
        }

        // Stage 4: embeddings
        if best_confidence(&best) < t.embedding_gate && !budget.is_exhausted() {
            if let Some((i, similarity)) = self.embedding_stage(concept, columns, budget) {
                consider(&mut best, concept, &columns[i], similarity, MatchMethod::Embedding);
            }
        }

        // Stage 5: semantic collaborator
        if best_confidence(&best) < t.semantic_gate && !budget.is_exhausted() {
            if let Some((i, confidence)) = self.semantic_stage(concept, columns, budget) {
                consider(&mut best, concept, &columns[i], confidence, MatchMethod::Semantic);
            }
        }

        // Stage 6: value patterns
        if best_confidence(&best) < t.pattern_gate {
            if let Some((i, confidence)) = self.pattern_stage(concept, columns) {
                consider(&mut best, concept, &columns[i], confidence, MatchMethod::Pattern);
            }
        }

        match best {
            Some(m) if m.confidence > t.acceptance => {
                tracing::debug!(
                    concept,
                    column = %m.column_name,
                    method = ?m.method,
                    confidence = m.confidence,
                    "matched column"
                );
                Some(m)
            }
            _ => {
                tracing::debug!(concept, "no column matched");
                None
            }
        }
    }

    /// Edit-distance ratio or whole-word containment, whichever is higher.
    /// Strings in different scripts never match.
    fn fuzzy_score(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() || b.is_empty() || !same_script(a, b) {
            return 0.0;
        }
        let contained = find_term(b, a).is_some() || find_term(a, b).is_some();
        let score = ratio(a, b);
        if contained {
            score.max(self.thresholds.containment_score)
        } else {
            score
        }
    }

    // =========================================================================
    // COLLABORATOR STAGES
    // =========================================================================

    fn embedding_stage(
        &self,
        concept: &str,
        columns: &[ColumnProfile],
        budget: &CallBudget,
    ) -> Option<(usize, f64)> {
        let embedder = self.embedder.as_ref()?;
        let concept_vec = match self.embed(embedder, concept, budget) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(concept, error = %e, "embedding stage skipped");
                return None;
            }
        };

        let mut best: Option<(usize, f64)> = None;
        for (i, column) in columns.iter().enumerate() {
            if is_generic_header(column) {
                continue;
            }
            let column_vec = match self.embed(embedder, &column.inferred_name, budget) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(column = %column.inferred_name, error = %e, "embedding stage skipped");
                    return best;
                }
            };
            let similarity = cosine_similarity(&concept_vec, &column_vec);
            if similarity > self.thresholds.embedding_similarity
                && best.is_none_or(|(_, b)| similarity > b)
            {
                best = Some((i, similarity.min(1.0)));
            }
        }
        best
    }

    /// Embed text through the memo table.
    fn embed(&self, embedder: &Arc<dyn EmbeddingProvider>, text: &str, budget: &CallBudget) -> Result<Vec<f32>> {
        let key = text.to_lowercase();
        if let Some(v) = self.embeddings.lock().ok().and_then(|m| m.get(&key).cloned()) {
            return Ok(v);
        }
        let embedder = Arc::clone(embedder);
        let owned = text.to_string();
        let vector = call_with_timeout("embedding", budget, move || embedder.embed(&owned))?;
        if let Ok(mut memo) = self.embeddings.lock() {
            memo.insert(key, vector.clone());
        }
        Ok(vector)
    }

    fn semantic_stage(
        &self,
        concept: &str,
        columns: &[ColumnProfile],
        budget: &CallBudget,
    ) -> Option<(usize, f64)> {
        let provider = Arc::clone(self.completion.as_ref()?);
        let request = CompletionRequest::new(
            PromptTask::ColumnMatch,
            prompts::column_match_prompt(concept, columns),
            prompts::column_match_schema(),
        );
        let response = call_with_timeout("column_match", budget, move || provider.complete(&request));
        match response.and_then(|v| parse_semantic(&v, columns.len(), self.thresholds.semantic_default)) {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(concept, error = %e, "semantic stage skipped");
                None
            }
        }
    }

    // =========================================================================
    // PATTERN STAGE
    // =========================================================================

    /// Validate sampled values of headerless columns against the shape the
    /// concept implies.
    fn pattern_stage(&self, concept: &str, columns: &[ColumnProfile]) -> Option<(usize, f64)> {
        let t = &self.thresholds;
        let (predicate, required): (fn(&CellValue) -> bool, f64) = match concept_kind_loose(concept)? {
            ConceptKind::Email => (email_cell, t.pattern_email),
            ConceptKind::Phone => (phone_cell, t.pattern_phone),
            ConceptKind::Date => (is_date_value, t.pattern_date),
            ConceptKind::Amount | ConceptKind::Price => (is_amount_value, t.pattern_currency),
            ConceptKind::Vendor | ConceptKind::Customer => (is_company_name, t.pattern_vendor),
            _ => return None,
        };

        let mut best: Option<(usize, f64)> = None;
        for (i, column) in columns.iter().enumerate() {
            if !is_generic_header(column) {
                continue;
            }
            let samples: Vec<CellValue> = column
                .sample_values
                .iter()
                .take(t.pattern_sample_size)
                .map(|s| CellValue::from_raw(s))
                .collect();
            if samples.len() < t.pattern_min_hits {
                continue;
            }
            let hits = samples.iter().filter(|c| predicate(c)).count();
            let share = hits as f64 / samples.len() as f64;
            if hits >= t.pattern_min_hits
                && share >= required
                && best.is_none_or(|(_, b)| share > b)
            {
                best = Some((i, share));
            }
        }
        best
    }

    /// Number of memoized embeddings.
    pub fn memoized_embeddings(&self) -> usize {
        self.embeddings.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for ColumnMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a column lacks a meaningful header.
///
/// A header cell that is itself a value (an email, a phone number, a URL,
/// a number or a date) means the sheet has no real header row and the
/// first record was promoted.
pub fn is_generic_header(column: &ColumnProfile) -> bool {
    let Some(header) = column.header.as_deref().filter(|h| !h.trim().is_empty()) else {
        return true;
    };
    if GENERIC_HEADER.is_match(&normalize(header)) {
        return true;
    }
    let cell = CellValue::from_raw(header);
    [ValuePattern::Email, ValuePattern::Phone, ValuePattern::Url]
        .into_iter()
        .any(|p| matches_pattern(&cell, p))
        || classify(&cell).is_some_and(|t| t.is_numeric() || t == DataType::Date)
}

fn email_cell(cell: &CellValue) -> bool {
    is_email(&cell.as_text())
}

fn phone_cell(cell: &CellValue) -> bool {
    is_phone(&cell.as_text())
}

fn best_confidence(best: &Option<ColumnMatch>) -> f64 {
    best.as_ref().map_or(0.0, |m| m.confidence)
}

/// Replace the current best only on strictly higher confidence, so earlier
/// stages and earlier columns win ties.
fn consider(
    best: &mut Option<ColumnMatch>,
    concept: &str,
    column: &ColumnProfile,
    confidence: f64,
    method: MatchMethod,
) {
    let confidence = confidence.clamp(0.0, 1.0);
    if confidence > best_confidence(best) {
        *best = Some(ColumnMatch {
            concept: concept.to_string(),
            column_index: column.index,
            column_name: column.inferred_name.clone(),
            confidence,
            method,
        });
    }
}

/// Parse a semantic stage answer, validating the index.
fn parse_semantic(value: &Value, column_count: usize, default: f64) -> Result<Option<(usize, f64)>> {
    let index = match value.get("column_index") {
        Some(Value::Null) | None => return Ok(None),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| SheetQueryError::Malformed(format!("bad column_index: {}", v)))?,
    };
    let index = usize::try_from(index)
        .ok()
        .filter(|i| *i < column_count)
        .ok_or_else(|| {
            SheetQueryError::Malformed(format!(
                "column_index {} outside {} columns",
                index, column_count
            ))
        })?;
    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(default)
        .clamp(0.0, 1.0);
    Ok(Some((index, confidence)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockEmbedder, MockProvider};
    use crate::schema::DataType;
    use serde_json::json;

    fn column(index: usize, header: Option<&str>, samples: &[&str]) -> ColumnProfile {
        let mut c = ColumnProfile::new(index, header.map(String::from));
        c.data_type = DataType::String;
        c.sample_values = samples.iter().map(|s| s.to_string()).collect();
        c
    }

    fn columns(headers: &[&str]) -> Vec<ColumnProfile> {
        headers
            .iter()
            .enumerate()
            .map(|(i, h)| column(i, Some(h), &[]))
            .collect()
    }

    #[test]
    fn test_exact_match_is_case_and_separator_insensitive() {
        let cols = columns(&["Vendor_Name", "Amount"]);
        let m = ColumnMatcher::new().match_concept("vendor name", &cols).unwrap();
        assert_eq!(m.column_index, 0);
        assert_eq!(m.confidence, 1.0);
        assert_eq!(m.method, MatchMethod::Exact);
    }

    #[test]
    fn test_fuzzy_and_containment() {
        let cols = columns(&["Date", "Vendr"]);
        let m = ColumnMatcher::new().match_concept("vendor", &cols).unwrap();
        assert_eq!(m.method, MatchMethod::Fuzzy);
        assert_eq!(m.column_index, 1);
        assert!((m.confidence - (1.0 - 1.0 / 6.0) * 0.9).abs() < 1e-9);

        let cols = columns(&["Date", "Invoice Amount"]);
        let m = ColumnMatcher::new().match_concept("amount", &cols).unwrap();
        assert_eq!(m.column_index, 1);
        assert!((m.confidence - 0.72).abs() < 1e-9);
    }

    #[test]
    fn test_fuzzy_skipped_across_scripts() {
        let matcher = ColumnMatcher::new();
        assert_eq!(matcher.fuzzy_score("amount", "сумма"), 0.0);
    }

    #[test]
    fn test_synonym_match_across_languages() {
        let cols = columns(&["Fecha", "Proveedor", "Importe"]);
        let m = ColumnMatcher::new().match_concept("vendor", &cols).unwrap();
        assert_eq!(m.column_index, 1);
        assert_eq!(m.method, MatchMethod::Synonym);
        assert!((m.confidence - 0.85).abs() < 1e-9);

        let cols = columns(&["日期", "金额"]);
        let m = ColumnMatcher::new().match_concept("amount", &cols).unwrap();
        assert_eq!(m.column_index, 1);
    }

    #[test]
    fn test_headerless_email_column_matched_by_pattern() {
        let mut samples: Vec<String> = (0..18).map(|i| format!("user{}@example.com", i)).collect();
        samples.push("n/a".to_string());
        samples.push("unknown".to_string());
        let refs: Vec<&str> = samples.iter().map(String::as_str).collect();
        let cols = vec![
            column(0, Some("Name"), &["Ana", "Bo", "Cy"]),
            column(1, None, &refs),
        ];
        let m = ColumnMatcher::new().match_concept("email", &cols).unwrap();
        assert_eq!(m.column_index, 1);
        assert_eq!(m.method, MatchMethod::Pattern);
        assert!(m.confidence >= 0.6);
        assert!((m.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_pattern_needs_minimum_hits() {
        let cols = vec![column(0, None, &["a@b.co", "x"])];
        assert!(ColumnMatcher::new().match_concept("email", &cols).is_none());
    }

    #[test]
    fn test_pattern_ignores_named_columns() {
        let cols = vec![column(0, Some("Contact"), &["a@b.co", "c@d.co", "e@f.co"])];
        assert!(ColumnMatcher::new().match_concept("email", &cols).is_none());
    }

    #[test]
    fn test_no_match_below_floor() {
        let cols = columns(&["Region", "Quantity"]);
        assert!(ColumnMatcher::new().match_concept("vendor", &cols).is_none());
        assert!(ColumnMatcher::new().match_concept("", &cols).is_none());
        assert!(ColumnMatcher::new().match_concept("vendor", &[]).is_none());
    }

    #[test]
    fn test_embedding_stage_with_memo() {
        let embedder = Arc::new(
            MockEmbedder::new()
                .with_vector("recipient", vec![1.0, 0.0, 0.1])
                .with_vector("Beneficiary", vec![0.9, 0.0, 0.1])
                .with_vector("Notes", vec![0.0, 1.0, 0.0]),
        );
        let matcher = ColumnMatcher::new().with_embedder(embedder.clone());
        let cols = columns(&["Notes", "Beneficiary"]);
        let m = matcher.match_concept("recipient", &cols).unwrap();
        assert_eq!(m.method, MatchMethod::Embedding);
        assert_eq!(m.column_index, 1);
        assert!(m.confidence > 0.8);

        let calls = embedder.call_count();
        matcher.match_concept("recipient", &cols).unwrap();
        assert_eq!(embedder.call_count(), calls);
        assert_eq!(matcher.memoized_embeddings(), 3);
    }

    #[test]
    fn test_semantic_stage_validates_index() {
        let cols = columns(&["Col1 data", "Destinatario final"]);
        let good = Arc::new(
            MockProvider::new()
                .with_response(PromptTask::ColumnMatch, json!({"column_index": 1, "confidence": 0.8})),
        );
        let m = ColumnMatcher::new()
            .with_completion(good)
            .match_concept("recipient", &cols)
            .unwrap();
        assert_eq!(m.method, MatchMethod::Semantic);
        assert_eq!(m.column_index, 1);

        let bad = Arc::new(
            MockProvider::new().with_response(PromptTask::ColumnMatch, json!({"column_index": 7})),
        );
        assert!(ColumnMatcher::new()
            .with_completion(bad)
            .match_concept("recipient", &cols)
            .is_none());
    }

    #[test]
    fn test_semantic_default_confidence() {
        let cols = columns(&["Alpha", "Beta"]);
        let provider = Arc::new(
            MockProvider::new().with_response(PromptTask::ColumnMatch, json!({"column_index": 0})),
        );
        let m = ColumnMatcher::new()
            .with_completion(provider)
            .match_concept("widget", &cols)
            .unwrap();
        assert!((m.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_generic_headers() {
        assert!(is_generic_header(&column(0, None, &[])));
        assert!(is_generic_header(&column(0, Some("Column C"), &[])));
        assert!(is_generic_header(&column(0, Some("col_3"), &[])));
        assert!(is_generic_header(&column(0, Some("Unnamed: 2"), &[])));
        assert!(!is_generic_header(&column(0, Some("Email"), &[])));
        assert!(!is_generic_header(&column(0, Some("Q1 Sales"), &[])));
    }

    #[test]
    fn test_value_shaped_header_counts_as_missing() {
        assert!(is_generic_header(&column(0, Some("user0@example.com"), &[])));
        assert!(is_generic_header(&column(0, Some("+1 555 123 4567"), &[])));
        assert!(is_generic_header(&column(0, Some("https://example.com"), &[])));
        assert!(is_generic_header(&column(0, Some("$1,200.00"), &[])));
        assert!(is_generic_header(&column(0, Some("2024-01-05"), &[])));
    }

    #[test]
    fn test_email_column_in_sheet_without_header_row() {
        use crate::grid::SheetGrid;
        use crate::structure::StructureAnalyzer;

        let rows: Vec<Vec<String>> = (0..20)
            .map(|i| {
                let contact = match i {
                    18 => "n/a".to_string(),
                    19 => "unknown".to_string(),
                    _ => format!("user{}@example.com", i),
                };
                vec![format!("Person {}", i), contact]
            })
            .collect();
        let grid = SheetGrid::from_values("crm", "Contacts", rows);
        let structure = StructureAnalyzer::new().analyze(&grid);

        let m = ColumnMatcher::new()
            .match_concept("email", &structure.columns)
            .expect("email column not found");
        assert_eq!(m.column_index, 1);
        assert_eq!(m.method, MatchMethod::Pattern);
        assert!(m.confidence >= 0.6);
    }

    #[test]
    fn test_spent_budget_skips_collaborator_stages() {
        let cols = columns(&["Col1 data", "Destinatario final"]);
        let provider = Arc::new(
            MockProvider::new()
                .with_response(PromptTask::ColumnMatch, json!({"column_index": 1, "confidence": 0.8})),
        );
        let embedder = Arc::new(MockEmbedder::new());
        let matcher = ColumnMatcher::new()
            .with_completion(provider.clone())
            .with_embedder(embedder.clone());
        let spent = CallBudget::for_request(std::time::Instant::now(), Duration::ZERO);

        assert!(matcher.match_concept_within("recipient", &cols, &spent).is_none());
        assert_eq!(provider.total_calls(), 0);
        assert_eq!(embedder.call_count(), 0);
    }
}
