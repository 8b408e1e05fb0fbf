//! Integration tests for SheetQuery.

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tempfile::TempDir;

use sheetquery::cache::CacheConfig;
use sheetquery::sandbox::{EvalContext, Procedure};
use sheetquery::{
    CancellationToken, Comparison, DirectorySource, EngineConfig, ExecutorConfig, FailureStage,
    IntentType, MatchMethod, MemorySource, RetrievalRequest, RowFilter, SandboxedExecutor,
    SearchOptions, SheetGrid, SheetQuery, SheetQueryError,
};

/// Helper to lay out a directory of delimited sheet files.
fn create_data_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("Failed to create sub-directory");
        }
        fs::write(&full, content).expect("Failed to write sheet file");
    }
    dir
}

fn fast_config() -> EngineConfig {
    EngineConfig::default()
        .with_request_timeout(Duration::from_secs(2))
        .with_executor(ExecutorConfig::default().with_attempt_timeout(Duration::from_millis(500)))
}

// =============================================================================
// End-to-end Search
// =============================================================================

#[test]
fn test_total_by_vendor_scenario() {
    let source = MemorySource::new().with_sheet(
        "ledger",
        "Payments",
        vec![vec!["Vendor", "Amount"], vec!["Acme", "100"], vec!["Beta", "200"]],
    );
    let engine = SheetQuery::new(source).with_config(fast_config());
    let candidates = vec![engine.describe_file("", "ledger").expect("describe failed")];

    let response = engine
        .search("total by vendor", &candidates, "", &SearchOptions::default())
        .expect("search failed");

    assert_eq!(response.intent.intent_type, IntentType::Aggregate);
    assert_eq!(response.intent.key_concept.as_deref(), Some("vendor"));
    assert!(response.failures.is_empty());

    let result = &response.results[0];
    let vendor = result
        .column_matches
        .iter()
        .find(|m| m.concept == "vendor")
        .expect("vendor column not matched");
    assert_eq!(vendor.column_index, 0);
    assert_eq!(vendor.method, MatchMethod::Exact);
    assert_eq!(vendor.confidence, 1.0);

    assert_eq!(
        result.result_value,
        json!({"Acme": {"count": 1, "total": 100}, "Beta": {"count": 1, "total": 200}})
    );
}

#[test]
fn test_search_is_deterministic_without_collaborators() {
    let source = MemorySource::new().with_sheet(
        "ledger",
        "Payments",
        vec![
            vec!["Vendor", "Amount", "Region"],
            vec!["Acme", "100", "EU"],
            vec!["Beta", "200", "US"],
            vec!["Acme", "50", "US"],
        ],
    );
    let engine = SheetQuery::new(source).with_config(fast_config());
    let candidates = vec![engine.describe_file("", "ledger").unwrap()];
    let options = SearchOptions::default();

    let first = engine.search("payments where amount > 60", &candidates, "", &options).unwrap();
    let second = engine.search("payments where amount > 60", &candidates, "", &options).unwrap();

    assert_eq!(first.results[0].result_value, second.results[0].result_value);
    assert_eq!(
        first.results[0].plan.procedure,
        second.results[0].plan.procedure
    );
    let rows = first.results[0].result_value.as_array().expect("records expected");
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_directory_search_across_files() {
    let dir = create_data_dir(&[
        ("finance/payments.csv", "Vendor,Amount\nAcme,100\nBeta,200\nAcme,25\n"),
        ("finance/budget.csv", "Department,Budget\nSales,1000\n"),
        ("people.tsv", "Name\tEmail\nAnn\tann@example.com\n"),
    ]);
    let source = DirectorySource::new(dir.path());
    let files = source.list_files().unwrap();
    assert_eq!(files, vec!["finance", "people.tsv"]);

    let engine = SheetQuery::new(source).with_config(fast_config());
    let candidates: Vec<_> = files
        .iter()
        .map(|f| engine.describe_file("", f).unwrap())
        .collect();
    assert_eq!(candidates[0].sheets.len(), 2);

    let response = engine
        .search("total amount by vendor", &candidates, "", &SearchOptions::default())
        .unwrap();
    let top = &response.results[0];
    assert_eq!(top.file_id, "finance");
    assert_eq!(top.sheet_name, "payments");
    assert_eq!(
        top.result_value,
        json!({"Acme": {"count": 2, "total": 125}, "Beta": {"count": 1, "total": 200}})
    );
}

#[test]
fn test_rejected_token_is_a_load_failure() {
    let source = MemorySource::new().with_token("secret").with_sheet(
        "ledger",
        "Payments",
        vec![vec!["Vendor", "Amount"], vec!["Acme", "100"]],
    );
    let engine = SheetQuery::new(source).with_config(fast_config());
    let candidates = vec![engine.describe_file("secret", "ledger").unwrap()];

    let response = engine
        .search("total by vendor", &candidates, "wrong", &SearchOptions::default())
        .unwrap();
    assert!(response.results.is_empty());
    assert_eq!(response.failures[0].stage, FailureStage::Load);
}

#[test]
fn test_max_sheets_limits_fan_out() {
    let mut source = MemorySource::new();
    for i in 0..4 {
        source = source.with_sheet(
            "ledger",
            &format!("Vendors {}", i),
            vec![vec!["Vendor", "Amount"], vec!["Acme", "1"]],
        );
    }
    let engine = SheetQuery::new(source).with_config(fast_config());
    let candidates = vec![engine.describe_file("", "ledger").unwrap()];

    let response = engine
        .search(
            "total by vendor",
            &candidates,
            "",
            &SearchOptions::default().with_max_sheets(2),
        )
        .unwrap();
    assert_eq!(response.results.len() + response.failures.len(), 2);
}

// =============================================================================
// Structure and Matching
// =============================================================================

#[test]
fn test_leading_empty_rows_on_disk() {
    let dir = create_data_dir(&[(
        "ledger.csv",
        ",,\n,,\n,,\nVendor,Amount,Date\nAcme,100,2024-01-05\nBeta,200,2024-01-09\n",
    )]);
    let engine = SheetQuery::new(DirectorySource::new(dir.path()));
    let (grid, structure) = engine.analyze("", "ledger.csv", &"ledger".into()).unwrap();

    assert_eq!(grid.first_non_empty_row(), Some(3));
    assert_eq!(structure.primary().bounds.start_row, 3);
    assert!(structure.primary().has_headers);
    assert_eq!(structure.data_start_row, 4);
    assert_eq!(structure.headers(), vec!["Vendor", "Amount", "Date"]);
}

#[test]
fn test_headerless_email_column() {
    let mut rows = vec![vec!["Name".to_string(), "Amount".to_string(), String::new()]];
    for i in 0..20 {
        let contact = match i {
            18 => "n/a".to_string(),
            19 => "unknown".to_string(),
            _ => format!("user{}@example.com", i),
        };
        rows.push(vec![format!("Person {}", i), format!("{}", i * 10), contact]);
    }
    let source = MemorySource::new().with_sheet("crm", "Contacts", rows);
    let engine = SheetQuery::new(source);
    let (_, structure) = engine.analyze("", "crm", &"Contacts".into()).unwrap();

    let matcher = sheetquery::ColumnMatcher::new();
    let m = matcher
        .match_concept("email", &structure.columns)
        .expect("email column not found");
    assert_eq!(m.column_index, 2);
    assert_eq!(m.method, MatchMethod::Pattern);
    assert!(m.confidence >= 0.6);
}

// =============================================================================
// Retrieval and Caching
// =============================================================================

#[test]
fn test_cache_round_trip_and_expiry() {
    let source = Arc::new(MemorySource::new().with_sheet(
        "ledger",
        "Payments",
        vec![vec!["Vendor", "Amount"], vec!["Acme", "100"], vec!["Beta", "200"]],
    ));
    let config = EngineConfig::default()
        .with_cache(CacheConfig::default().with_ttl(Duration::from_millis(80)));
    let engine = SheetQuery::with_shared_source(source.clone()).with_config(config);
    let request = RetrievalRequest::new("ledger", "Payments");

    let first = engine.retrieve(&request).unwrap();
    let second = engine.retrieve(&request).unwrap();
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.headers, second.headers);
    assert_eq!(first.rows, second.rows);

    thread::sleep(Duration::from_millis(150));
    let third = engine.retrieve(&request).unwrap();
    assert!(!third.cache_hit);
    assert_eq!(source.load_count(), 2);
    assert_eq!(engine.cache().stats().hits, 1);
}

#[test]
fn test_filtered_retrieval_from_disk() {
    let dir = create_data_dir(&[(
        "payments.csv",
        "Vendor,Amount,Paid On\nAcme,100,2024-01-05\n,,\nBeta,250,2024-02-10\nGamma,75,2024-03-01\n",
    )]);
    let engine = SheetQuery::new(DirectorySource::new(dir.path()));
    let request = RetrievalRequest::new("payments.csv", 0usize)
        .with_filter(RowFilter::new("amount", Comparison::Gte, json!(75)))
        .with_filter(RowFilter::new("paid on", Comparison::Lt, json!("2024-03-01")))
        .with_max_rows(1);

    let result = engine.retrieve(&request).unwrap();
    assert_eq!(result.headers, vec!["Vendor", "Amount", "Paid On"]);
    assert_eq!(result.total_rows, 4);
    assert_eq!(result.filtered_rows, 2);
    assert_eq!(result.rows.len(), 1);
    assert!(result.truncated);
    assert!(result.warnings.is_empty());
}

#[test]
fn test_missing_sheet_is_an_error() {
    let dir = create_data_dir(&[("payments.csv", "Vendor,Amount\nAcme,1\n")]);
    let engine = SheetQuery::new(DirectorySource::new(dir.path()));
    let err = engine
        .retrieve(&RetrievalRequest::new("payments.csv", "Refunds"))
        .unwrap_err();
    assert!(matches!(err, SheetQueryError::SheetNotFound { .. }));
}

// =============================================================================
// Sandbox Bounds
// =============================================================================

/// A procedure that ignores the abort flag entirely.
struct Stubborn;

impl Procedure for Stubborn {
    fn run(&self, _ctx: &EvalContext) -> sheetquery::Result<Value> {
        thread::sleep(Duration::from_secs(10));
        Ok(Value::Null)
    }
}

#[test]
fn test_terminal_failure_is_time_bounded() {
    let attempt_timeout = Duration::from_millis(100);
    let executor = SandboxedExecutor::new(
        ExecutorConfig::default()
            .with_attempt_timeout(attempt_timeout)
            .with_max_attempts(3),
    );
    let grid = Arc::new(SheetGrid::from_values("f", "s", vec![vec!["a"], vec!["1"]]));
    let headers: Arc<[String]> = vec!["a".to_string()].into();

    let started = Instant::now();
    let outcome = executor.execute(
        Stubborn,
        grid,
        headers,
        &CancellationToken::new(),
        |_, _| Some(Stubborn),
    );

    assert!(!outcome.success);
    assert_eq!(outcome.attempts.len(), 3);
    assert!(outcome.attempts.iter().all(|a| a.timed_out));
    assert!(started.elapsed() < attempt_timeout * 3 + Duration::from_secs(1));
}
