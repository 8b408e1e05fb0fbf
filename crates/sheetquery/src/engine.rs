//! The SheetQuery façade: search and retrieval over candidate sheets.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{CacheConfig, DataCache, RetrievalRequest, RetrievalResult, Retriever};
use crate::error::{Result, SheetQueryError};
use crate::grid::{FileSource, SheetGrid, SheetSelector};
use crate::intent::{IntentAnalyzer, IntentConfig, SearchIntent};
use crate::llm::{CallBudget, CompletionProvider, EmbeddingProvider};
use crate::matching::{
    CandidateColumn, CandidateFile, CandidateSheet, ColumnMatch, ColumnMatcher, MatchThresholds,
    SheetMatch, SheetMatchConfig, SheetMatcher,
};
use crate::plan::{ExtractionPlan, ExtractionPlanner, PlanFailure, PlanRequest};
use crate::sandbox::{AttemptRecord, CancellationToken, ExecutorConfig, SandboxedExecutor};
use crate::schema::SheetStructure;
use crate::structure::StructureAnalyzer;

/// Configuration for the whole engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on any single collaborator call.
    pub request_timeout: Duration,
    pub intent: IntentConfig,
    pub matching: MatchThresholds,
    pub sheets: SheetMatchConfig,
    pub executor: ExecutorConfig,
    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            intent: IntentConfig::default(),
            matching: MatchThresholds::default(),
            sheets: SheetMatchConfig::default(),
            executor: ExecutorConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_sheets(mut self, sheets: SheetMatchConfig) -> Self {
        self.sheets = sheets;
        self
    }

    pub fn with_matching(mut self, matching: MatchThresholds) -> Self {
        self.matching = matching;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Reject settings the engine cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.executor.attempt_timeout >= self.request_timeout {
            return Err(SheetQueryError::Config(format!(
                "attempt timeout ({}ms) must be shorter than the request timeout ({}ms)",
                self.executor.attempt_timeout.as_millis(),
                self.request_timeout.as_millis()
            )));
        }
        if self.executor.max_attempts == 0 {
            return Err(SheetQueryError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.sheets.max_sheets == 0 {
            return Err(SheetQueryError::Config(
                "max_sheets must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sheets.threshold) {
            return Err(SheetQueryError::Config(format!(
                "sheet threshold {} is outside [0, 1]",
                self.sheets.threshold
            )));
        }
        Ok(())
    }
}

/// Per-search overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Overrides the configured sheet relevance threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_threshold: Option<f64>,
    /// Overrides the configured sheet limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sheets: Option<usize>,
    /// Keep fully blank rows in extraction input.
    #[serde(default)]
    pub include_empty_rows: bool,
    #[serde(skip)]
    pub cancel: CancellationToken,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_match_threshold(mut self, threshold: f64) -> Self {
        self.match_threshold = Some(threshold);
        self
    }

    pub fn with_max_sheets(mut self, max_sheets: usize) -> Self {
        self.max_sheets = Some(max_sheets);
        self
    }

    pub fn with_empty_rows(mut self, include: bool) -> Self {
        self.include_empty_rows = include;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Where a sheet gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Load,
    Analysis,
    Execution,
    Cancelled,
}

/// A sheet that produced a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetResult {
    pub file_id: String,
    pub sheet_name: String,
    pub relevance_score: f64,
    pub structure: SheetStructure,
    pub column_matches: Vec<ColumnMatch>,
    /// The plan whose procedure succeeded.
    pub plan: ExtractionPlan,
    pub result_value: Value,
    pub elapsed_ms: u64,
    pub rows_processed: usize,
    pub attempts: Vec<AttemptRecord>,
}

/// A sheet that did not produce a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetFailure {
    pub file_id: String,
    pub sheet_name: String,
    pub relevance_score: f64,
    pub stage: FailureStage,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_confidence: Option<f64>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl SheetFailure {
    fn new(matched: &SheetMatch, stage: FailureStage, error: impl Into<String>) -> Self {
        Self {
            file_id: matched.file_id.clone(),
            sheet_name: matched.sheet_name.clone(),
            relevance_score: matched.relevance_score,
            stage,
            error: error.into(),
            plan_description: None,
            plan_confidence: None,
            warnings: Vec::new(),
        }
    }

    fn with_plan(mut self, plan: &ExtractionPlan) -> Self {
        self.plan_description = Some(plan.description.clone());
        self.plan_confidence = Some(plan.confidence);
        self.warnings = plan.warnings.clone();
        self
    }
}

/// Everything one search produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Successful sheets, in relevance order.
    pub results: Vec<SheetResult>,
    pub failures: Vec<SheetFailure>,
    pub intent: SearchIntent,
    pub duration_ms: u64,
}

/// Natural-language query engine over a file source.
///
/// # Example
///
/// ```no_run
/// use sheetquery::{DirectorySource, SearchOptions, SheetQuery};
///
/// let engine = SheetQuery::new(DirectorySource::new("./data"));
/// let candidates = vec![engine.describe_file("", "invoices").unwrap()];
/// let response = engine
///     .search("total by vendor", &candidates, "", &SearchOptions::default())
///     .unwrap();
/// for result in &response.results {
///     println!("{}: {}", result.sheet_name, result.result_value);
/// }
/// ```
pub struct SheetQuery {
    config: EngineConfig,
    source: Arc<dyn FileSource>,
    completion: Option<Arc<dyn CompletionProvider>>,
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    cache: Arc<DataCache>,
    structure: StructureAnalyzer,
    intents: IntentAnalyzer,
    sheets: SheetMatcher,
    columns: ColumnMatcher,
    planner: ExtractionPlanner,
    executor: SandboxedExecutor,
}

impl SheetQuery {
    /// Create an engine with default configuration and no collaborators.
    ///
    /// Every stage then runs its deterministic fallback.
    pub fn new(source: impl FileSource + 'static) -> Self {
        Self::with_shared_source(Arc::new(source))
    }

    /// Create an engine over an already shared source.
    pub fn with_shared_source(source: Arc<dyn FileSource>) -> Self {
        let config = EngineConfig::default();
        Self {
            cache: Arc::new(DataCache::new(config.cache.clone())),
            structure: StructureAnalyzer::new(),
            intents: IntentAnalyzer::new(),
            sheets: SheetMatcher::new(),
            columns: ColumnMatcher::new(),
            planner: ExtractionPlanner::new(),
            executor: SandboxedExecutor::new(config.executor.clone()),
            config,
            source,
            completion: None,
            embedding: None,
        }
        .rebuild()
    }

    /// Use custom configuration. Validated on each search.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.cache = Arc::new(DataCache::new(config.cache.clone()));
        self.config = config;
        self.rebuild()
    }

    /// Add a completion collaborator for intent, ranking, matching and planning.
    pub fn with_completion(self, provider: impl CompletionProvider + 'static) -> Self {
        self.with_shared_completion(Arc::new(provider))
    }

    pub fn with_shared_completion(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.completion = Some(provider);
        self.rebuild()
    }

    /// Add an embedding collaborator for column matching.
    pub fn with_embedding(self, provider: impl EmbeddingProvider + 'static) -> Self {
        self.with_shared_embedding(Arc::new(provider))
    }

    pub fn with_shared_embedding(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding = Some(provider);
        self.rebuild()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<DataCache> {
        &self.cache
    }

    /// Recreate the stage components from the current settings.
    fn rebuild(mut self) -> Self {
        let timeout = self.config.request_timeout;

        let mut intents = IntentAnalyzer::new().with_config(self.config.intent.clone());
        let mut sheets = SheetMatcher::new().with_config(self.config.sheets.clone());
        let mut columns = ColumnMatcher::new()
            .with_thresholds(self.config.matching.clone())
            .with_timeout(timeout);
        let mut planner = ExtractionPlanner::new();

        if let Some(provider) = &self.completion {
            intents = intents.with_provider(Arc::clone(provider), timeout);
            sheets = sheets.with_provider(Arc::clone(provider), timeout);
            columns = columns.with_completion(Arc::clone(provider));
            planner = planner.with_provider(Arc::clone(provider), timeout);
        }
        if let Some(embedder) = &self.embedding {
            columns = columns.with_embedder(Arc::clone(embedder));
        }

        self.intents = intents;
        self.sheets = sheets;
        self.columns = columns;
        self.planner = planner;
        self.executor = SandboxedExecutor::new(self.config.executor.clone());
        self
    }

    /// Answer `query` from the most relevant candidate sheets.
    ///
    /// Fails only for request-level problems: invalid configuration, an
    /// empty query or no candidate sheets. Per-sheet problems are reported
    /// in [`SearchResponse::failures`].
    pub fn search(
        &self,
        query: &str,
        files: &[CandidateFile],
        access_token: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        let started = Instant::now();
        self.config.validate()?;
        if query.trim().is_empty() {
            return Err(SheetQueryError::EmptyQuery);
        }
        if files.iter().all(|f| f.sheets.is_empty()) {
            return Err(SheetQueryError::NoCandidates);
        }

        // Every collaborator call of this request shares one deadline; once
        // it passes, the remaining stages use their deterministic paths.
        let budget = CallBudget::for_request(started, self.config.request_timeout)
            .with_cancellation(options.cancel.clone());

        let intent = self.intents.analyze_within(query, &budget)?;
        info!(
            intent = ?intent.intent_type,
            source = ?intent.source,
            concepts = intent.target_concepts.len(),
            "query analyzed"
        );

        let mut ranking = self.config.sheets.clone();
        if let Some(threshold) = options.match_threshold {
            ranking.threshold = threshold.clamp(0.0, 1.0);
        }
        if let Some(max_sheets) = options.max_sheets {
            ranking.max_sheets = max_sheets.max(1);
        }
        let ranked = self.sheets.rank_within(query, &intent, files, &ranking, &budget);
        info!(selected = ranked.len(), "sheets ranked");
        if budget.is_exhausted() && self.completion.is_some() {
            debug!("request budget spent, skipping collaborator stages");
        }

        let outcomes: Vec<std::result::Result<SheetResult, SheetFailure>> = ranked
            .par_iter()
            .map(|matched| {
                panic::catch_unwind(AssertUnwindSafe(|| {
                    self.process_sheet(query, &intent, matched, access_token, options, &budget)
                }))
                .unwrap_or_else(|_| {
                    Err(SheetFailure::new(
                        matched,
                        FailureStage::Analysis,
                        "internal error while processing sheet",
                    ))
                })
            })
            .collect();

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(failure) => failures.push(failure),
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            results = results.len(),
            failures = failures.len(),
            duration_ms,
            "search finished"
        );
        Ok(SearchResponse {
            results,
            failures,
            intent,
            duration_ms,
        })
    }

    /// Load, analyze, plan and execute one sheet.
    fn process_sheet(
        &self,
        query: &str,
        intent: &SearchIntent,
        matched: &SheetMatch,
        access_token: &str,
        options: &SearchOptions,
        budget: &CallBudget,
    ) -> std::result::Result<SheetResult, SheetFailure> {
        let started = Instant::now();
        let cancel = &options.cancel;
        let cancelled = || SheetFailure::new(matched, FailureStage::Cancelled, "cancelled");

        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let selector = SheetSelector::Name(matched.sheet_name.clone());
        let (grid, cache_hit) = self
            .cache
            .get_or_load(
                self.source.as_ref(),
                access_token,
                &matched.file_id,
                &selector,
                false,
            )
            .map_err(|e| {
                warn!(file_id = %matched.file_id, sheet = %matched.sheet_name, error = %e, "sheet load failed");
                SheetFailure::new(matched, FailureStage::Load, e.to_string())
            })?;
        debug!(file_id = %matched.file_id, sheet = %matched.sheet_name, cache_hit, "sheet loaded");

        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let structure = self.structure.analyze(&grid);
        if grid.first_non_empty_row().is_none() {
            return Err(SheetFailure::new(
                matched,
                FailureStage::Analysis,
                "sheet holds no values",
            ));
        }

        let column_matches = self
            .columns
            .match_concepts_within(&intent.concepts(), &structure.columns, budget);
        debug!(
            sheet = %matched.sheet_name,
            matched = column_matches.len(),
            "columns matched"
        );

        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let include_empty_rows = options.include_empty_rows;
        let prepare = |plan: ExtractionPlan| prepare_plan(plan, include_empty_rows);

        let request = PlanRequest::new(query, intent, &structure, &column_matches);
        let initial = prepare(self.planner.plan_within(&request, budget));
        let mut last_plan = initial.clone();
        let mut failures: Vec<PlanFailure> = Vec::new();

        let headers: Arc<[String]> = structure.headers().into();
        let outcome = self.executor.execute(
            initial,
            Arc::clone(&grid),
            headers,
            cancel,
            |attempt, error| {
                if cancel.is_cancelled() {
                    return None;
                }
                failures.push(PlanFailure::new(attempt, error));
                let retry = request.with_failures(&failures, attempt + 1);
                let plan = prepare(self.planner.plan_within(&retry, budget));
                last_plan = plan.clone();
                Some(plan)
            },
        );

        if outcome.success {
            let result_value = outcome.result.unwrap_or(Value::Null);
            return Ok(SheetResult {
                file_id: matched.file_id.clone(),
                sheet_name: matched.sheet_name.clone(),
                relevance_score: matched.relevance_score,
                structure,
                column_matches,
                plan: last_plan,
                result_value,
                elapsed_ms: started.elapsed().as_millis() as u64,
                rows_processed: outcome.rows_processed,
                attempts: outcome.attempts,
            });
        }

        if cancel.is_cancelled() {
            return Err(cancelled().with_plan(&last_plan));
        }
        let error = outcome
            .error
            .unwrap_or_else(|| "procedure failed".to_string());
        Err(SheetFailure::new(matched, FailureStage::Execution, error).with_plan(&last_plan))
    }

    /// Filtered rows of one sheet, without planning.
    pub fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResult> {
        Retriever::new(Arc::clone(&self.source), Arc::clone(&self.cache)).retrieve(request)
    }

    /// Load a sheet through the cache and infer its structure.
    pub fn analyze(
        &self,
        access_token: &str,
        file_id: &str,
        sheet: &SheetSelector,
    ) -> Result<(Arc<SheetGrid>, SheetStructure)> {
        let (grid, _) =
            self.cache
                .get_or_load(self.source.as_ref(), access_token, file_id, sheet, false)?;
        let structure = self.structure.analyze(&grid);
        Ok((grid, structure))
    }

    /// Build candidate metadata for a file by profiling each of its sheets.
    pub fn describe_file(&self, access_token: &str, file_id: &str) -> Result<CandidateFile> {
        let names = self.source.list_sheets(access_token, file_id)?;
        let mut sheets = Vec::with_capacity(names.len());
        for (index, name) in names.into_iter().enumerate() {
            let (_, structure) =
                self.analyze(access_token, file_id, &SheetSelector::Name(name.clone()))?;
            let columns = structure
                .columns
                .iter()
                .filter(|c| !c.is_empty())
                .map(|c| CandidateColumn {
                    name: c.inferred_name.clone(),
                    data_type: Some(c.data_type.as_str().to_string()),
                })
                .collect();
            sheets.push(CandidateSheet {
                name,
                index,
                columns,
                summary: None,
                row_count: structure.data_row_count(),
            });
        }
        Ok(CandidateFile {
            file_id: file_id.to_string(),
            file_name: file_id.to_string(),
            summary: None,
            sheets,
        })
    }
}

fn prepare_plan(mut plan: ExtractionPlan, include_empty_rows: bool) -> ExtractionPlan {
    if !include_empty_rows {
        plan.procedure = plan.procedure.without_blank_rows();
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::MemorySource;
    use crate::llm::{MockProvider, PromptTask};
    use crate::plan::OutputShape;
    use serde_json::json;

    fn invoices() -> MemorySource {
        MemorySource::new()
            .with_sheet(
                "invoices",
                "Payments",
                vec![
                    vec!["Vendor", "Amount", "Date"],
                    vec!["Acme", "100", "2024-01-05"],
                    vec!["Beta", "200", "2024-01-09"],
                ],
            )
            .with_sheet("contacts", "People", vec![vec!["Name", "Email"], vec!["Ann", "ann@x.io"]])
    }

    fn candidates(engine: &SheetQuery) -> Vec<CandidateFile> {
        vec![
            engine.describe_file("", "invoices").unwrap(),
            engine.describe_file("", "contacts").unwrap(),
        ]
    }

    fn fast_config() -> EngineConfig {
        EngineConfig::default()
            .with_request_timeout(Duration::from_secs(2))
            .with_executor(ExecutorConfig::default().with_attempt_timeout(Duration::from_millis(500)))
    }

    #[test]
    fn test_config_validation() {
        assert!(EngineConfig::default().validate().is_ok());
        let bad = EngineConfig::default().with_request_timeout(Duration::from_secs(1));
        assert!(matches!(bad.validate(), Err(SheetQueryError::Config(_))));
    }

    #[test]
    fn test_request_level_errors() {
        let engine = SheetQuery::new(invoices());
        let files = candidates(&engine);
        let options = SearchOptions::default();
        assert!(matches!(
            engine.search("  ", &files, "", &options),
            Err(SheetQueryError::EmptyQuery)
        ));
        assert!(matches!(
            engine.search("total by vendor", &[], "", &options),
            Err(SheetQueryError::NoCandidates)
        ));

        let engine = SheetQuery::new(invoices())
            .with_config(EngineConfig::default().with_request_timeout(Duration::from_secs(1)));
        assert!(matches!(
            engine.search("total by vendor", &files, "", &options),
            Err(SheetQueryError::Config(_))
        ));
    }

    #[test]
    fn test_fallback_search_totals_by_vendor() {
        let engine = SheetQuery::new(invoices()).with_config(fast_config());
        let files = candidates(&engine);
        let response = engine
            .search("total by vendor", &files, "", &SearchOptions::default())
            .unwrap();
        assert_eq!(response.results.len(), 1);
        let result = &response.results[0];
        assert_eq!(result.sheet_name, "Payments");
        assert_eq!(result.plan.expected_output, OutputShape::Grouped);
        assert_eq!(
            result.result_value,
            json!({"Acme": {"count": 1, "total": 100}, "Beta": {"count": 1, "total": 200}})
        );
    }

    #[test]
    fn test_unknown_file_is_a_load_failure() {
        let engine = SheetQuery::new(invoices()).with_config(fast_config());
        let mut files = candidates(&engine);
        let mut ghost = files[0].clone();
        ghost.file_id = "ghost".to_string();
        files.push(ghost);

        let response = engine
            .search("total by vendor", &files, "", &SearchOptions::default())
            .unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.failures.len(), 1);
        assert_eq!(response.failures[0].stage, FailureStage::Load);
    }

    #[test]
    fn test_slow_collaborator_is_bounded_by_request_timeout() {
        let provider = Arc::new(MockProvider::new().with_latency(Duration::from_millis(900)));
        let source = MemorySource::new().with_sheet(
            "ledger",
            "Ledger",
            vec![vec!["X1", "Y1"], vec!["Acme", "100"], vec!["Beta", "200"]],
        );
        let config = EngineConfig::default()
            .with_request_timeout(Duration::from_secs(1))
            .with_executor(ExecutorConfig::default().with_attempt_timeout(Duration::from_millis(500)));
        let engine = SheetQuery::new(source)
            .with_config(config)
            .with_shared_completion(provider.clone());
        let files = vec![engine.describe_file("", "ledger").unwrap()];

        let started = Instant::now();
        let response = engine
            .search("total ledger by vendor", &files, "", &SearchOptions::default())
            .unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_millis(1800), "search took {:?}", elapsed);
        assert!(response.duration_ms < 1800);
        // Intent and at most one ranking batch reach the collaborator;
        // column matching and planning run after the deadline.
        assert!(provider.total_calls() <= 2);
        assert_eq!(provider.call_count(PromptTask::Plan), 0);
        assert_eq!(provider.call_count(PromptTask::ColumnMatch), 0);
    }

    #[test]
    fn test_cancelled_search_reports_cancelled_sheets() {
        let engine = SheetQuery::new(invoices()).with_config(fast_config());
        let files = candidates(&engine);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let response = engine
            .search(
                "total by vendor",
                &files,
                "",
                &SearchOptions::default().with_cancellation(cancel),
            )
            .unwrap();
        assert!(response.results.is_empty());
        assert!(response
            .failures
            .iter()
            .all(|f| f.stage == FailureStage::Cancelled));
    }

    #[test]
    fn test_broken_plans_are_repaired() {
        // Only planning is scripted; every other stage falls back.
        let provider = Arc::new(MockProvider::new().with_sequence(
            PromptTask::Plan,
            vec![
                json!({
                    "description": "sum a column that does not exist",
                    "procedure": [{"op": "aggregate", "function": "sum", "column": "Quantity Shipped"}],
                    "confidence": 0.9
                }),
                json!({
                    "description": "sum the amounts",
                    "procedure": [
                        {"op": "slice", "start": 1},
                        {"op": "aggregate", "function": "sum", "column": "Amount"}
                    ],
                    "confidence": 0.8
                }),
            ],
        ));
        let engine = SheetQuery::new(invoices())
            .with_config(fast_config())
            .with_shared_completion(provider.clone());
        let files = candidates(&engine);
        let response = engine
            .search("total amount", &files, "", &SearchOptions::default())
            .unwrap();

        let result = &response.results[0];
        assert_eq!(result.result_value, json!(300));
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.plan.attempt, 2);
        assert_eq!(result.plan.description, "sum the amounts");
        assert!(provider.prompts(PromptTask::Plan)[1].contains("attempt 1"));
    }

    #[test]
    fn test_retrieve_shares_the_cache() {
        let source = Arc::new(invoices());
        let engine = SheetQuery::with_shared_source(source.clone());
        engine.analyze("", "invoices", &"Payments".into()).unwrap();
        let result = engine
            .retrieve(&RetrievalRequest::new("invoices", "Payments"))
            .unwrap();
        assert!(result.cache_hit);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(source.load_count(), 1);
    }
}
