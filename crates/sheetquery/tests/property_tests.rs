//! Property-based tests for SheetQuery.
//!
//! These tests use proptest to generate random grids, headers and queries
//! and verify that the analysis and matching stages keep their invariants.
//!
//! # Running Property Tests
//!
//! ```bash
//! cargo test -p sheetquery --test property_tests
//!
//! # More cases
//! PROPTEST_CASES=10000 cargo test -p sheetquery --test property_tests
//! ```

use proptest::prelude::*;

use sheetquery::intent::fallback_intent;
use sheetquery::matching::SheetMatchConfig;
use sheetquery::plan::{fallback_plan, PlanRequest};
use sheetquery::{
    CandidateColumn, CandidateFile, CandidateSheet, CellValue, ColumnMatcher, MatchMethod,
    SheetGrid, SheetMatcher, StructureAnalyzer,
};

// =============================================================================
// Test Strategies
// =============================================================================

/// Cells drawn from the shapes real sheets contain.
fn cell() -> impl Strategy<Value = CellValue> {
    prop_oneof![
        2 => Just(CellValue::Null),
        1 => Just(CellValue::Text(String::new())),
        3 => "[A-Za-z ]{1,12}".prop_map(CellValue::Text),
        3 => (-1.0e6..1.0e6f64).prop_map(CellValue::Number),
        1 => "\\$[0-9]{1,4}\\.[0-9]{2}".prop_map(CellValue::Text),
        1 => "[a-z]{2,6}@[a-z]{2,6}\\.com".prop_map(CellValue::Text),
        1 => any::<bool>().prop_map(CellValue::Bool),
    ]
}

/// Ragged grids up to 30 rows by 8 columns.
fn grid() -> impl Strategy<Value = Vec<Vec<CellValue>>> {
    prop::collection::vec(prop::collection::vec(cell(), 0..8), 0..30)
}

/// Header-like names.
fn header() -> impl Strategy<Value = String> {
    "[a-z]{3,8}( [a-z]{3,8})?"
}

fn sheet_with_headers(headers: &[String]) -> SheetGrid {
    let mut rows = vec![headers.iter().map(|h| CellValue::Text(h.clone())).collect::<Vec<_>>()];
    for i in 0..5 {
        rows.push(headers.iter().map(|_| CellValue::Number(i as f64)).collect());
    }
    SheetGrid::new("f", "s", rows)
}

// =============================================================================
// Structure Properties
// =============================================================================

proptest! {
    #[test]
    fn structure_regions_stay_in_bounds(rows in grid()) {
        let grid = SheetGrid::new("f", "s", rows);
        let structure = StructureAnalyzer::new().analyze(&grid);

        prop_assert!(!structure.tables.is_empty());
        for table in &structure.tables {
            prop_assert!(table.bounds.within(structure.dimensions));
        }
        prop_assert_eq!(structure.columns.len(), grid.column_count());
        for column in &structure.columns {
            prop_assert!((0.0..=1.0).contains(&column.density));
            prop_assert!(column.sample_values.len() <= 20);
        }
    }

    #[test]
    fn structure_starts_at_first_non_empty_row(rows in grid()) {
        let grid = SheetGrid::new("f", "s", rows);
        let structure = StructureAnalyzer::new().analyze(&grid);
        if let Some(first) = grid.first_non_empty_row() {
            let earliest = structure.tables.iter().map(|t| t.bounds.start_row).min();
            prop_assert_eq!(earliest, Some(first));
        }
    }
}

// =============================================================================
// Matching Properties
// =============================================================================

proptest! {
    #[test]
    fn column_matches_stay_in_range(
        headers in prop::collection::vec(header(), 1..8),
        concept in "[a-z]{2,10}",
    ) {
        let structure = StructureAnalyzer::new().analyze(&sheet_with_headers(&headers));
        if let Some(m) = ColumnMatcher::new().match_concept(&concept, &structure.columns) {
            prop_assert!(m.column_index < structure.columns.len());
            prop_assert!(m.confidence > 0.5 && m.confidence <= 1.0);
        }
    }

    #[test]
    fn exact_match_ignores_case_and_separators(name in header()) {
        prop_assume!(name != "qqq");
        let headers = vec!["qqq".to_string(), name.clone()];
        let structure = StructureAnalyzer::new().analyze(&sheet_with_headers(&headers));
        let concept = name.to_uppercase().replace(' ', "_");

        let m = ColumnMatcher::new().match_concept(&concept, &structure.columns);
        prop_assert!(m.is_some());
        let m = m.unwrap();
        prop_assert_eq!(m.method, MatchMethod::Exact);
        prop_assert_eq!(m.confidence, 1.0);
        prop_assert_eq!(m.column_index, 1);
    }

    #[test]
    fn sheet_ranking_is_sorted_and_capped(
        names in prop::collection::vec("[a-z]{3,8}", 1..12),
        max_sheets in 1usize..6,
    ) {
        let sheets = names
            .iter()
            .enumerate()
            .map(|(index, name)| CandidateSheet {
                name: name.clone(),
                index,
                columns: vec![CandidateColumn::new(name.clone()), CandidateColumn::new("amount")],
                summary: None,
                row_count: 3,
            })
            .collect();
        let files = vec![CandidateFile {
            file_id: "f".to_string(),
            file_name: "ledger".to_string(),
            summary: None,
            sheets,
        }];
        let query = format!("total amount by {}", names[0]);
        let intent = fallback_intent(&query);
        let config = SheetMatchConfig::default().with_max_sheets(max_sheets);

        let ranked = SheetMatcher::new().rank_with(&query, &intent, &files, &config);
        prop_assert!(ranked.len() <= max_sheets);
        for pair in ranked.windows(2) {
            prop_assert!(pair[0].relevance_score >= pair[1].relevance_score);
            if pair[0].relevance_score == pair[1].relevance_score {
                prop_assert!(pair[0].sheet_index < pair[1].sheet_index);
            }
        }
    }
}

// =============================================================================
// Determinism
// =============================================================================

proptest! {
    #[test]
    fn fallback_paths_are_deterministic(
        rows in grid(),
        query in "(total|count|list|show) [a-z]{3,8}( by [a-z]{3,8})?",
    ) {
        let grid = SheetGrid::new("f", "s", rows);
        let structure = StructureAnalyzer::new().analyze(&grid);
        let a = fallback_intent(&query);
        let b = fallback_intent(&query);
        prop_assert_eq!(a.concepts(), b.concepts());
        prop_assert_eq!(a.intent_type, b.intent_type);

        let plan_a = fallback_plan(&PlanRequest::new(&query, &a, &structure, &[]));
        let plan_b = fallback_plan(&PlanRequest::new(&query, &b, &structure, &[]));
        prop_assert_eq!(plan_a.procedure, plan_b.procedure);
        prop_assert_eq!(plan_a.description, plan_b.description);
    }
}
