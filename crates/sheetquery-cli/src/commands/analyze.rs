//! Analyze command implementation.

use std::path::PathBuf;

use colored::Colorize;
use sheetquery::{SheetQuery, SheetSelector, SheetStructure};

use super::{clip, file_source};

pub fn run(file: PathBuf, json: bool, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (source, file_id) = file_source(&file)?;
    let engine = SheetQuery::new(source);
    let (grid, structure) = engine.analyze("", &file_id, &SheetSelector::Index(0))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&structure)?);
        return Ok(());
    }

    println!("{} {}", "Analyzing".cyan().bold(), file.display());
    println!();
    print_structure(&structure);

    if verbose {
        println!();
        println!("{}", "Sample rows:".bold());
        let sample = structure.data_row_count().min(5);
        for row in grid.rows().iter().skip(structure.data_start_row).take(sample) {
            let cells: Vec<String> = row.iter().map(|c| clip(c, 16)).collect();
            println!("  {}", cells.join(" | ").dimmed());
        }
    }

    Ok(())
}

fn print_structure(structure: &SheetStructure) {
    println!(
        "  {} {} rows × {} columns",
        "Dimensions:".bold(),
        structure.dimensions.rows,
        structure.dimensions.cols
    );
    println!("  {} {}", "Data rows:".bold(), structure.data_row_count());

    println!("  {} {}", "Tables:".bold(), structure.tables.len());
    for (i, table) in structure.tables.iter().enumerate() {
        let marker = if i == structure.primary_table { "*" } else { " " };
        println!(
            "   {} rows {}-{}, cols {}-{}{}",
            marker,
            table.bounds.start_row + 1,
            table.bounds.end_row,
            table.bounds.start_col + 1,
            table.bounds.end_col,
            if table.has_headers { ", headers" } else { "" }
        );
    }

    println!();
    println!("{}", "Columns:".bold());
    for column in &structure.columns {
        if column.is_empty() {
            continue;
        }
        let name = if column.has_header() {
            column.inferred_name.normal()
        } else {
            column.inferred_name.italic()
        };
        let mut extra = Vec::new();
        if !column.sample_patterns.is_empty() {
            let patterns: Vec<String> = column
                .sample_patterns
                .iter()
                .map(|p| format!("{:?}", p).to_lowercase())
                .collect();
            extra.push(patterns.join("/"));
        }
        if column.has_formula {
            extra.push("formula".to_string());
        }
        println!(
            "  {:>3} {:<24} {:<10} {} {}",
            column.letter_label.cyan(),
            name,
            column.data_type.as_str(),
            format!("{:>5.1}%", column.density * 100.0).dimmed(),
            extra.join(", ").yellow()
        );
    }

    let patterns = &structure.patterns;
    if !patterns.sparse_columns.is_empty() || !patterns.merged_regions.is_empty() {
        println!();
        if !patterns.sparse_columns.is_empty() {
            println!(
                "  {} {} sparse column(s)",
                "⚠".yellow(),
                patterns.sparse_columns.len()
            );
        }
        if !patterns.merged_regions.is_empty() {
            println!(
                "  {} {} merged-looking region(s)",
                "⚠".yellow(),
                patterns.merged_regions.len()
            );
        }
    }
}
