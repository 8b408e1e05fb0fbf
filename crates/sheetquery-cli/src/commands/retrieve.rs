//! Retrieve command implementation.

use std::path::PathBuf;

use colored::Colorize;
use serde_json::Value;
use sheetquery::{Comparison, RetrievalRequest, RowFilter, SheetQuery, SheetSelector};

use super::{clip, file_source};

const CELL_WIDTH: usize = 18;

pub fn run(
    file: PathBuf,
    filters: Vec<String>,
    keys: Vec<String>,
    max_rows: usize,
    include_empty_rows: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (source, file_id) = file_source(&file)?;
    let engine = SheetQuery::new(source);

    let mut request = RetrievalRequest::new(file_id, SheetSelector::Index(0))
        .with_max_rows(max_rows)
        .with_empty_rows(include_empty_rows);
    for raw in &filters {
        request = request.with_filter(parse_filter(raw)?);
    }
    for key in keys {
        request = request.with_key_column(key);
    }

    let result = engine.retrieve(&request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    for warning in &result.warnings {
        println!("{} {}", "⚠".yellow(), warning);
    }

    let header: Vec<String> = result
        .headers
        .iter()
        .map(|h| format!("{:<width$}", h, width = CELL_WIDTH))
        .collect();
    println!("{}", header.join(" ").bold());
    for row in &result.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|c| format!("{:<width$}", clip(c, CELL_WIDTH), width = CELL_WIDTH))
            .collect();
        println!("{}", cells.join(" "));
    }

    println!();
    let summary = format!(
        "{} of {} rows matched, {} shown",
        result.filtered_rows,
        result.total_rows,
        result.rows.len()
    );
    if result.truncated {
        println!("{} {}", summary.dimmed(), "(truncated)".yellow());
    } else {
        println!("{}", summary.dimmed());
    }

    Ok(())
}

/// Parse `COLUMN:OP:VALUE`; `between` takes `LOW..HIGH`.
fn parse_filter(raw: &str) -> Result<RowFilter, String> {
    let mut parts = raw.splitn(3, ':');
    let (column, op, value) = match (parts.next(), parts.next(), parts.next()) {
        (Some(c), Some(o), Some(v)) if !c.trim().is_empty() => (c.trim(), o, v),
        _ => return Err(format!("Invalid filter '{}'. Expected COLUMN:OP:VALUE.", raw)),
    };
    let operator = Comparison::parse(op)
        .ok_or_else(|| format!("Unknown filter operator '{}' in '{}'.", op, raw))?;

    if operator == Comparison::Between {
        let (low, high) = value
            .split_once("..")
            .ok_or_else(|| format!("Between filter '{}' needs LOW..HIGH.", raw))?;
        return Ok(RowFilter::between(column, literal(low), literal(high)));
    }
    Ok(RowFilter::new(column, operator, literal(value)))
}

/// Numbers compare numerically; everything else is text.
fn literal(raw: &str) -> Value {
    let raw = raw.trim();
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}
