//! Ranking candidate sheets against a query.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SheetQueryError};
use crate::intent::SearchIntent;
use crate::llm::{
    call_with_timeout, prompts, CallBudget, CompletionProvider, CompletionRequest, PromptTask,
};

use super::text::{is_cjk, tokenize};

/// A column as described by stored file metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateColumn {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl CandidateColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
        }
    }
}

/// Schema-level description of one sheet; never carries cell values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSheet {
    pub name: String,
    pub index: usize,
    #[serde(default)]
    pub columns: Vec<CandidateColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub row_count: usize,
}

/// A file the caller may query, with its sheets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFile {
    pub file_id: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub sheets: Vec<CandidateSheet>,
}

/// How a sheet was scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMethod {
    Collaborator,
    Heuristic,
}

/// A sheet judged relevant to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetMatch {
    pub file_id: String,
    pub sheet_name: String,
    pub sheet_index: usize,
    /// Relevance in `[0, 1]`.
    pub relevance_score: f64,
    pub reasons: Vec<String>,
    pub method: RankingMethod,
}

/// Settings for sheet ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetMatchConfig {
    /// Sheets scored per collaborator call.
    pub batch_size: usize,
    /// Collaborator scores at or below this are discarded.
    pub threshold: f64,
    /// Heuristic scores at or below this are discarded.
    pub heuristic_floor: f64,
    /// Maximum sheets returned.
    pub max_sheets: usize,
    pub sheet_name_weight: f64,
    pub concept_weight: f64,
    pub file_name_weight: f64,
    pub summary_weight: f64,
    /// Added per concept found beyond the first.
    pub multi_concept_bonus: f64,
}

impl Default for SheetMatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            threshold: 0.5,
            heuristic_floor: 0.3,
            max_sheets: 5,
            sheet_name_weight: 0.3,
            concept_weight: 0.4,
            file_name_weight: 0.2,
            summary_weight: 0.1,
            multi_concept_bonus: 0.1,
        }
    }
}

impl SheetMatchConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_sheets(mut self, max_sheets: usize) -> Self {
        self.max_sheets = max_sheets;
        self
    }
}

/// Ranks candidate sheets, asking a collaborator per batch and scoring
/// by token overlap when it cannot.
pub struct SheetMatcher {
    provider: Option<Arc<dyn CompletionProvider>>,
    config: SheetMatchConfig,
    timeout: Duration,
}

impl SheetMatcher {
    /// Create a heuristic-only matcher.
    pub fn new() -> Self {
        Self {
            provider: None,
            config: SheetMatchConfig::default(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Use a completion collaborator, waiting at most `timeout` per batch.
    pub fn with_provider(mut self, provider: Arc<dyn CompletionProvider>, timeout: Duration) -> Self {
        self.provider = Some(provider);
        self.timeout = timeout;
        self
    }

    pub fn with_config(mut self, config: SheetMatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SheetMatchConfig {
        &self.config
    }

    /// Rank sheets with the matcher's own settings.
    pub fn rank(&self, query: &str, intent: &SearchIntent, files: &[CandidateFile]) -> Vec<SheetMatch> {
        self.rank_with(query, intent, files, &self.config)
    }

    /// Rank sheets with explicit settings.
    pub fn rank_with(
        &self,
        query: &str,
        intent: &SearchIntent,
        files: &[CandidateFile],
        config: &SheetMatchConfig,
    ) -> Vec<SheetMatch> {
        self.rank_within(query, intent, files, config, &CallBudget::new(self.timeout))
    }

    /// Rank sheets with explicit settings, spending at most `budget` on
    /// collaborator batches.
    pub fn rank_within(
        &self,
        query: &str,
        intent: &SearchIntent,
        files: &[CandidateFile],
        config: &SheetMatchConfig,
        budget: &CallBudget,
    ) -> Vec<SheetMatch> {
        let candidates: Vec<(&CandidateFile, &CandidateSheet)> = files
            .iter()
            .flat_map(|f| f.sheets.iter().map(move |s| (f, s)))
            .collect();

        let mut matches = Vec::new();
        let mut collaborator_batches = 0;
        let mut heuristic_batches = 0;
        for batch in candidates.chunks(config.batch_size.max(1)) {
            let scored = match &self.provider {
                Some(provider) => match self.score_batch(provider, query, intent, batch, config, budget) {
                    Ok(scored) => {
                        collaborator_batches += 1;
                        scored
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, sheets = batch.len(), "sheet scoring fell back to heuristics");
                        heuristic_batches += 1;
                        heuristic_batch(query, intent, batch, config)
                    }
                },
                None => {
                    heuristic_batches += 1;
                    heuristic_batch(query, intent, batch, config)
                }
            };
            matches.extend(scored);
        }

        // Stable: equal scores keep candidate order.
        matches.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(config.max_sheets);

        tracing::info!(
            candidates = candidates.len(),
            selected = matches.len(),
            collaborator_batches,
            heuristic_batches,
            "ranked sheets"
        );
        matches
    }

    fn score_batch(
        &self,
        provider: &Arc<dyn CompletionProvider>,
        query: &str,
        intent: &SearchIntent,
        batch: &[(&CandidateFile, &CandidateSheet)],
        config: &SheetMatchConfig,
        budget: &CallBudget,
    ) -> Result<Vec<SheetMatch>> {
        let provider = Arc::clone(provider);
        let request = CompletionRequest::new(
            PromptTask::SheetMatch,
            prompts::sheet_match_prompt(query, intent, batch),
            prompts::sheet_match_schema(),
        );
        let response = call_with_timeout("sheet_match", budget, move || provider.complete(&request))?;
        let scores = parse_scores(&response, batch.len())?;

        let mut matches = Vec::new();
        for (position, (file, sheet)) in batch.iter().enumerate() {
            let Some((_, score, reasons)) = scores.iter().find(|(i, _, _)| *i == position) else {
                continue;
            };
            if *score > config.threshold {
                matches.push(SheetMatch {
                    file_id: file.file_id.clone(),
                    sheet_name: sheet.name.clone(),
                    sheet_index: sheet.index,
                    relevance_score: *score,
                    reasons: reasons.clone(),
                    method: RankingMethod::Collaborator,
                });
            }
        }
        Ok(matches)
    }
}

impl Default for SheetMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `{"matches": [{"sheet", "score", "reasons"}]}`, dropping references
/// to sheets outside the batch.
fn parse_scores(value: &Value, batch_len: usize) -> Result<Vec<(usize, f64, Vec<String>)>> {
    let entries = value
        .get("matches")
        .and_then(Value::as_array)
        .ok_or_else(|| SheetQueryError::Malformed("missing matches".to_string()))?;

    let mut scores = Vec::new();
    for entry in entries {
        let index = entry.get("sheet").and_then(Value::as_u64).map(|i| i as usize);
        let score = entry.get("score").and_then(Value::as_f64);
        let (Some(index), Some(score)) = (index, score) else {
            continue;
        };
        if index >= batch_len {
            tracing::debug!(index, "ignoring unknown sheet reference");
            continue;
        }
        if scores.iter().any(|(i, _, _)| *i == index) {
            continue;
        }
        let reasons = entry
            .get("reasons")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        scores.push((index, score.clamp(0.0, 1.0), reasons));
    }
    Ok(scores)
}

// =============================================================================
// HEURISTIC SCORING
// =============================================================================

fn heuristic_batch(
    query: &str,
    intent: &SearchIntent,
    batch: &[(&CandidateFile, &CandidateSheet)],
    config: &SheetMatchConfig,
) -> Vec<SheetMatch> {
    let query_tokens = query_tokens(query, intent);
    batch
        .iter()
        .filter_map(|(file, sheet)| {
            let (score, reasons) = heuristic_score(&query_tokens, intent, file, sheet, config);
            (score > config.heuristic_floor).then(|| SheetMatch {
                file_id: file.file_id.clone(),
                sheet_name: sheet.name.clone(),
                sheet_index: sheet.index,
                relevance_score: score,
                reasons,
                method: RankingMethod::Heuristic,
            })
        })
        .collect()
}

/// Meaningful query tokens plus every concept token.
fn query_tokens(query: &str, intent: &SearchIntent) -> HashSet<String> {
    let mut tokens: HashSet<String> = tokenize(query)
        .into_iter()
        .filter(|t| t.chars().count() >= 3 || t.chars().any(is_cjk))
        .collect();
    for concept in &intent.target_concepts {
        tokens.extend(tokenize(concept));
    }
    tokens
}

fn overlaps(query_tokens: &HashSet<String>, text: &str) -> bool {
    tokenize(text).iter().any(|t| query_tokens.contains(t))
}

/// Token-overlap score of one sheet, clamped to 1.0.
pub(crate) fn heuristic_score(
    query_tokens: &HashSet<String>,
    intent: &SearchIntent,
    file: &CandidateFile,
    sheet: &CandidateSheet,
    config: &SheetMatchConfig,
) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut reasons = Vec::new();

    if overlaps(query_tokens, &sheet.name) {
        score += config.sheet_name_weight;
        reasons.push(format!("sheet name '{}' overlaps the query", sheet.name));
    }

    let column_tokens: HashSet<String> = sheet.columns.iter().flat_map(|c| tokenize(&c.name)).collect();
    let mut found = 0usize;
    for concept in &intent.target_concepts {
        let tokens = tokenize(concept);
        if !tokens.is_empty() && tokens.iter().all(|t| column_tokens.contains(t)) {
            found += 1;
            score += config.concept_weight;
            reasons.push(format!("columns contain '{}'", concept));
        }
    }
    if found > 1 {
        score += config.multi_concept_bonus * (found - 1) as f64;
    }

    if overlaps(query_tokens, &file.file_name) {
        score += config.file_name_weight;
        reasons.push(format!("file name '{}' overlaps the query", file.file_name));
    }

    let summary_hit = [sheet.summary.as_deref(), file.summary.as_deref()]
        .into_iter()
        .flatten()
        .any(|s| overlaps(query_tokens, s));
    if summary_hit {
        score += config.summary_weight;
        reasons.push("summary overlaps the query".to_string());
    }

    (f64::min(score, 1.0), reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{fallback_intent, IntentType};
    use crate::llm::{MockProvider, ResolutionSource};
    use serde_json::json;

    fn sheet(name: &str, index: usize, columns: &[&str]) -> CandidateSheet {
        CandidateSheet {
            name: name.to_string(),
            index,
            columns: columns.iter().map(|c| CandidateColumn::new(*c)).collect(),
            summary: None,
            row_count: 10,
        }
    }

    fn file(id: &str, name: &str, sheets: Vec<CandidateSheet>) -> CandidateFile {
        CandidateFile {
            file_id: id.to_string(),
            file_name: name.to_string(),
            summary: None,
            sheets,
        }
    }

    fn candidates() -> Vec<CandidateFile> {
        vec![
            file(
                "f1",
                "invoices.csv",
                vec![
                    sheet("Payments", 0, &["Vendor", "Amount", "Date"]),
                    sheet("Notes", 1, &["Text"]),
                ],
            ),
            file("f2", "people.csv", vec![sheet("Staff", 0, &["Name", "Email"])]),
        ]
    }

    #[test]
    fn test_heuristic_ranks_matching_columns_first() {
        let intent = fallback_intent("total amount by vendor");
        let ranked = SheetMatcher::new().rank("total amount by vendor", &intent, &candidates());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].sheet_name, "Payments");
        assert_eq!(ranked[0].method, RankingMethod::Heuristic);
        assert!(ranked[0].relevance_score <= 1.0);
        assert!(ranked[0].reasons.iter().any(|r| r.contains("vendor")));
    }

    #[test]
    fn test_heuristic_score_components() {
        let mut intent = SearchIntent::new(IntentType::List, ResolutionSource::Fallback);
        intent.add_concept("vendor");
        intent.add_concept("amount");
        let tokens = query_tokens("payments by vendor", &intent);
        let f = file("f1", "ledger.csv", vec![]);
        let s = sheet("Payments", 0, &["Vendor", "Amount"]);
        let (score, reasons) = heuristic_score(&tokens, &intent, &f, &s, &SheetMatchConfig::default());
        // 0.3 name + 0.4 × 2 concepts + 0.1 bonus, clamped.
        assert_eq!(score, 1.0);
        assert_eq!(reasons.len(), 3);
    }

    #[test]
    fn test_cjk_columns_match_by_bigram() {
        let mut intent = SearchIntent::new(IntentType::Aggregate, ResolutionSource::Fallback);
        intent.add_concept("金额");
        let files = vec![file("f", "data.csv", vec![sheet("Sheet1", 0, &["销售金额", "日期"])])];
        let ranked = SheetMatcher::new().rank("金额", &intent, &files);
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].relevance_score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_ties_keep_candidate_order_and_truncate() {
        let mut intent = SearchIntent::new(IntentType::List, ResolutionSource::Fallback);
        intent.add_concept("vendor");
        let files: Vec<CandidateFile> = (0..4)
            .map(|i| file(&format!("f{}", i), "x.csv", vec![sheet("S", 0, &["Vendor"])]))
            .collect();
        let config = SheetMatchConfig::default().with_max_sheets(3);
        let ranked = SheetMatcher::new().rank_with("vendor", &intent, &files, &config);
        let ids: Vec<&str> = ranked.iter().map(|m| m.file_id.as_str()).collect();
        assert_eq!(ids, vec!["f0", "f1", "f2"]);
    }

    #[test]
    fn test_collaborator_scores_filtered_and_unknown_ignored() {
        let mock = Arc::new(MockProvider::new().with_response(
            PromptTask::SheetMatch,
            json!({"matches": [
                {"sheet": 2, "score": 0.9, "reasons": ["has email"]},
                {"sheet": 0, "score": 0.4},
                {"sheet": 9, "score": 1.0},
                {"sheet": 1, "score": 0.6}
            ]}),
        ));
        let intent = fallback_intent("staff emails");
        let ranked = SheetMatcher::new()
            .with_provider(mock.clone(), Duration::from_secs(2))
            .rank("staff emails", &intent, &candidates());
        let names: Vec<&str> = ranked.iter().map(|m| m.sheet_name.as_str()).collect();
        assert_eq!(names, vec!["Staff", "Notes"]);
        assert_eq!(ranked[0].method, RankingMethod::Collaborator);
        assert_eq!(ranked[0].reasons, vec!["has email"]);
        assert_eq!(mock.call_count(PromptTask::SheetMatch), 1);
    }

    #[test]
    fn test_failed_batch_falls_back_per_batch() {
        let mock = Arc::new(
            MockProvider::new()
                .with_failure_once(PromptTask::SheetMatch, "overloaded")
                .with_response(PromptTask::SheetMatch, json!({"matches": [{"sheet": 0, "score": 0.95}]})),
        );
        let config = SheetMatchConfig {
            batch_size: 2,
            ..SheetMatchConfig::default()
        };
        let intent = fallback_intent("total amount by vendor");
        let ranked = SheetMatcher::new()
            .with_provider(mock, Duration::from_secs(2))
            .with_config(config)
            .rank("total amount by vendor", &intent, &candidates());
        assert_eq!(ranked[0].file_id, "f2");
        assert_eq!(ranked[0].method, RankingMethod::Collaborator);
        assert_eq!(ranked[1].sheet_name, "Payments");
        assert_eq!(ranked[1].method, RankingMethod::Heuristic);
    }

    #[test]
    fn test_empty_candidates() {
        let intent = fallback_intent("anything");
        assert!(SheetMatcher::new().rank("anything", &intent, &[]).is_empty());
    }
}
