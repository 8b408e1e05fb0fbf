//! Deterministic templated plans, one template per intent type.

use crate::grid::CellValue;
use crate::intent::{AggregationKind, IntentType};
use crate::llm::ResolutionSource;
use crate::matching::text::{find_term, normalize, ratio, resolve_header, same_script};
use crate::schema::{ColumnProfile, DataType, SheetStructure};
use crate::structure::patterns::classify;

use super::program::{AggregateFn, ColumnRef, Program, Step};
use super::types::{ExtractionPlan, PlanRequest};

/// Header words that mark a column worth summing.
const VALUE_KEYWORDS: &[&str] = &[
    "amount", "total", "payment", "sales", "revenue", "sum", "price", "cost", "value",
    "importe", "monto", "pago", "ventas", "ingresos", "montant", "paiement", "ventes",
    "betrag", "summe", "umsatz", "zahlung", "valor", "pagamento", "receita", "金额", "总计",
    "付款", "销售", "收入", "сумма", "платеж", "продажи", "выручка", "金額", "売上", "합계",
    "금액",
];

const FILTER_CAP: usize = 1000;
const LIST_CAP: usize = 100;
const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Build a plan without any collaborator. Never fails.
pub fn fallback_plan(request: &PlanRequest<'_>) -> ExtractionPlan {
    let structure = request.structure;
    let intent = request.intent;
    let mut warnings = Vec::new();

    let (steps, description) = match intent.intent_type {
        IntentType::Aggregate => aggregate_steps(request, &mut warnings),
        IntentType::Filter => filter_steps(request, &mut warnings),
        IntentType::List | IntentType::Lookup => (
            vec![
                data_rows(structure),
                Step::DropBlank,
                Step::Limit { count: LIST_CAP },
                Step::Project { columns: Vec::new() },
            ],
            format!("List up to {} non-empty rows with every column", LIST_CAP),
        ),
    };

    // Templates only ever end with a single terminal step.
    let procedure = Program::new(steps).unwrap_or_default();
    ExtractionPlan {
        expected_output: procedure.output_shape(),
        procedure,
        description,
        expected_format: None,
        confidence: FALLBACK_CONFIDENCE,
        warnings,
        source: ResolutionSource::Fallback,
        attempt: request.attempt,
    }
}

fn data_rows(structure: &SheetStructure) -> Step {
    Step::Slice {
        start: structure.data_start_row,
        end: Some(structure.data_end_row()),
    }
}

/// Column for a concept: a matched column first, then header resolution.
fn concept_column(request: &PlanRequest<'_>, concept: &str) -> Option<usize> {
    let wanted = concept.to_lowercase();
    request
        .column_matches
        .iter()
        .find(|m| m.concept.to_lowercase() == wanted)
        .map(|m| m.column_index)
        .or_else(|| resolve_header(&request.structure.headers(), concept))
}

/// Whether a header names an amount-like column.
fn is_value_header(header: &str) -> bool {
    let h = normalize(header);
    if h.is_empty() {
        return false;
    }
    VALUE_KEYWORDS.iter().any(|kw| {
        let kw = normalize(kw);
        find_term(&h, &kw).is_some() || (same_script(&h, &kw) && ratio(&h, &kw) > 0.7)
    })
}

fn is_numeric(data_type: DataType) -> bool {
    matches!(
        data_type,
        DataType::Number | DataType::Currency | DataType::Percentage
    )
}

/// Mixed column whose samples are mostly numbers, prices or percentages.
fn is_mostly_numeric(column: &ColumnProfile) -> bool {
    if column.data_type != DataType::Mixed || column.sample_values.is_empty() {
        return false;
    }
    let numeric = column
        .sample_values
        .iter()
        .filter(|s| classify(&CellValue::from_raw(s)).is_some_and(is_numeric))
        .count();
    numeric as f64 / column.sample_values.len() as f64 > 0.7
}

/// Columns to sum: amount-like headers, else the first numeric column.
fn value_columns(structure: &SheetStructure, exclude: Option<usize>) -> Vec<usize> {
    let candidates = structure
        .columns
        .iter()
        .filter(|c| !c.is_empty() && Some(c.index) != exclude);
    let named: Vec<usize> = candidates
        .clone()
        .filter(|c| c.has_header() && is_value_header(&c.inferred_name))
        .map(|c| c.index)
        .collect();
    if !named.is_empty() {
        return named;
    }
    candidates
        .filter(|c| is_numeric(c.data_type) || is_mostly_numeric(c))
        .map(|c| c.index)
        .take(1)
        .collect()
}

fn aggregate_steps(request: &PlanRequest<'_>, warnings: &mut Vec<String>) -> (Vec<Step>, String) {
    let structure = request.structure;
    let intent = request.intent;

    let key = match intent.key_concept.as_deref() {
        Some(concept) => {
            let column = concept_column(request, concept);
            if column.is_none() {
                warnings.push(format!("no column found for grouping concept '{}'", concept));
            }
            column
        }
        None => None,
    };
    let values = value_columns(structure, key);

    if let Some(key) = key {
        if values.is_empty() {
            warnings.push("no amount-like column found; groups report counts only".to_string());
        }
        let key_name = header_name(structure, key);
        let description = format!(
            "Group rows by {} and total {}",
            key_name,
            values
                .iter()
                .map(|i| header_name(structure, *i))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let steps = vec![
            data_rows(structure),
            Step::Group {
                key: ColumnRef::Index(key),
                sum: values.into_iter().map(ColumnRef::Index).collect(),
            },
        ];
        return (steps, description);
    }

    let function = match intent.aggregations.first() {
        Some(AggregationKind::Count) => AggregateFn::Count,
        Some(AggregationKind::Average) => AggregateFn::Avg,
        Some(AggregationKind::Min) => AggregateFn::Min,
        Some(AggregationKind::Max) => AggregateFn::Max,
        Some(AggregationKind::Sum) | None => AggregateFn::Sum,
    };

    match values.first() {
        Some(&column) if function != AggregateFn::Count => (
            vec![
                data_rows(structure),
                Step::Aggregate {
                    function,
                    column: Some(ColumnRef::Index(column)),
                },
            ],
            format!("{:?} of {}", function, header_name(structure, column)),
        ),
        _ => {
            if function != AggregateFn::Count {
                warnings.push("no numeric column found; counting rows instead".to_string());
            }
            (
                vec![data_rows(structure), Step::DropBlank, Step::Count],
                "Count non-empty data rows".to_string(),
            )
        }
    }
}

fn filter_steps(request: &PlanRequest<'_>, warnings: &mut Vec<String>) -> (Vec<Step>, String) {
    let structure = request.structure;
    let intent = request.intent;
    let mut steps = vec![data_rows(structure), Step::DropBlank];
    let mut applied = Vec::new();

    for filter in &intent.filters {
        match concept_column(request, &filter.concept) {
            Some(column) => {
                applied.push(format!(
                    "{} {:?} {}",
                    header_name(structure, column),
                    filter.operator,
                    filter.value
                ));
                steps.push(Step::Filter {
                    column: ColumnRef::Index(column),
                    operator: filter.operator,
                    value: filter.value.clone(),
                    upper: filter.upper.clone(),
                });
            }
            None => warnings.push(format!(
                "filter on '{}' ignored: no matching column",
                filter.concept
            )),
        }
    }

    let mut columns: Vec<usize> = Vec::new();
    for concept in &intent.target_concepts {
        if let Some(column) = concept_column(request, concept) {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }
    if columns.is_empty() {
        columns = structure
            .columns
            .iter()
            .filter(|c| c.has_header())
            .map(|c| c.index)
            .collect();
    }

    steps.push(Step::Limit { count: FILTER_CAP });
    steps.push(Step::Project {
        columns: columns.into_iter().map(ColumnRef::Index).collect(),
    });

    let description = if applied.is_empty() {
        format!("Rows of the matched columns, up to {}", FILTER_CAP)
    } else {
        format!("Rows where {}, up to {}", applied.join(" and "), FILTER_CAP)
    };
    (steps, description)
}

fn header_name(structure: &SheetStructure, index: usize) -> String {
    structure
        .column(index)
        .map(|c| c.inferred_name.clone())
        .unwrap_or_else(|| format!("column {}", index))
}
