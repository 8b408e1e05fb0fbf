//! Extraction planning with a completion collaborator and templated fallback.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::{Result, SheetQueryError};
use crate::llm::{
    prompts, resolve, CallBudget, CompletionProvider, CompletionRequest, PromptTask,
    ResolutionSource,
};

use super::fallback::fallback_plan;
use super::program::Program;
use super::types::{ExtractionPlan, PlanRequest};

/// Produces an [`ExtractionPlan`] for every request; never fails.
pub struct ExtractionPlanner {
    provider: Option<Arc<dyn CompletionProvider>>,
    timeout: Duration,
}

impl ExtractionPlanner {
    /// Create a fallback-only planner.
    pub fn new() -> Self {
        Self {
            provider: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Ask `provider` first, waiting at most `timeout`.
    pub fn with_provider(mut self, provider: Arc<dyn CompletionProvider>, timeout: Duration) -> Self {
        self.provider = Some(provider);
        self.timeout = timeout;
        self
    }

    /// Plan one extraction attempt.
    pub fn plan(&self, request: &PlanRequest<'_>) -> ExtractionPlan {
        self.plan_within(request, &CallBudget::new(self.timeout))
    }

    /// Plan one extraction attempt, spending at most `budget` on the
    /// collaborator.
    pub fn plan_within(&self, request: &PlanRequest<'_>, budget: &CallBudget) -> ExtractionPlan {
        let plan = match &self.provider {
            None => fallback_plan(request),
            Some(provider) => {
                let provider = Arc::clone(provider);
                let completion = CompletionRequest::new(
                    PromptTask::Plan,
                    prompts::plan_prompt(
                        request.query,
                        request.intent,
                        request.structure,
                        request.column_matches,
                        request.failures,
                    ),
                    prompts::plan_schema(),
                );
                let attempt = request.attempt;
                resolve(
                    "plan",
                    budget,
                    move || parse_plan(&provider.complete(&completion)?, attempt),
                    || fallback_plan(request),
                )
                .value
            }
        };

        tracing::info!(
            source = ?plan.source,
            attempt = plan.attempt,
            steps = plan.procedure.steps().len(),
            confidence = plan.confidence,
            "planned extraction"
        );
        plan
    }
}

impl Default for ExtractionPlanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a collaborator plan; an unusable procedure is an error.
fn parse_plan(value: &Value, attempt: u32) -> Result<ExtractionPlan> {
    let procedure = value
        .get("procedure")
        .ok_or_else(|| SheetQueryError::Malformed("plan response has no procedure".to_string()))
        .and_then(Program::from_json)?;
    if procedure.steps().is_empty() {
        return Err(SheetQueryError::Malformed("plan procedure is empty".to_string()));
    }

    let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
    Ok(ExtractionPlan {
        expected_output: procedure.output_shape(),
        procedure,
        description: text("description").unwrap_or_default(),
        expected_format: text("expectedOutputFormat"),
        confidence: value
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0),
        warnings: value
            .get("warnings")
            .and_then(Value::as_array)
            .map(|w| w.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
        source: ResolutionSource::Collaborator,
        attempt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SheetGrid;
    use crate::intent::fallback_intent;
    use crate::llm::MockProvider;
    use crate::plan::{OutputShape, PlanFailure, Step};
    use crate::structure::StructureAnalyzer;
    use serde_json::json;

    fn structure() -> crate::schema::SheetStructure {
        let grid = SheetGrid::from_values(
            "f",
            "s",
            vec![vec!["Vendor", "Amount"], vec!["Acme", "100"], vec!["Beta", "200"]],
        );
        StructureAnalyzer::new().analyze(&grid)
    }

    #[test]
    fn test_collaborator_plan_parsed() {
        let mock = Arc::new(MockProvider::new().with_response(
            PromptTask::Plan,
            json!({
                "procedure": [{"op": "slice", "start": 1}, {"op": "count"}],
                "description": "count rows",
                "expectedOutputFormat": "a number",
                "confidence": 1.7,
                "warnings": ["header guessed"]
            }),
        ));
        let structure = structure();
        let intent = fallback_intent("how many vendors");
        let planner = ExtractionPlanner::new().with_provider(mock, Duration::from_secs(2));
        let plan = planner.plan(&PlanRequest::new("how many vendors", &intent, &structure, &[]));
        assert_eq!(plan.source, ResolutionSource::Collaborator);
        assert_eq!(plan.expected_output, OutputShape::Scalar);
        assert_eq!(plan.confidence, 1.0);
        assert_eq!(plan.warnings, vec!["header guessed"]);
        assert_eq!(plan.procedure.steps()[1], Step::Count);
    }

    #[test]
    fn test_unparsable_procedure_falls_back() {
        let mock = Arc::new(MockProvider::new().with_response(
            PromptTask::Plan,
            json!({"procedure": "rows.map(r => r[0])"}),
        ));
        let structure = structure();
        let intent = fallback_intent("total by vendor");
        let planner = ExtractionPlanner::new().with_provider(mock, Duration::from_secs(2));
        let plan = planner.plan(&PlanRequest::new("total by vendor", &intent, &structure, &[]));
        assert_eq!(plan.source, ResolutionSource::Fallback);
        assert_eq!(plan.expected_output, OutputShape::Grouped);
    }

    #[test]
    fn test_failures_folded_into_prompt() {
        let mock = Arc::new(
            MockProvider::new()
                .with_response(PromptTask::Plan, json!({"procedure": [{"op": "count"}]})),
        );
        let structure = structure();
        let intent = fallback_intent("how many vendors");
        let failures = vec![PlanFailure::new(1, "column 'Supplier' is undefined")];
        let request =
            PlanRequest::new("how many vendors", &intent, &structure, &[]).with_failures(&failures, 2);
        let plan = ExtractionPlanner::new()
            .with_provider(mock.clone(), Duration::from_secs(2))
            .plan(&request);
        assert_eq!(plan.attempt, 2);

        let prompts = mock.prompts(PromptTask::Plan);
        assert!(prompts[0].contains("attempt 1: column 'Supplier' is undefined"));
        assert!(prompts[0].contains("hint:"));
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let structure = structure();
        let intent = fallback_intent("total by vendor");
        let request = PlanRequest::new("total by vendor", &intent, &structure, &[]);
        let planner = ExtractionPlanner::new();
        assert_eq!(planner.plan(&request).procedure, planner.plan(&request).procedure);
    }
}
