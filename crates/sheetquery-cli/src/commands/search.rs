//! Search command implementation.

use std::path::PathBuf;

use colored::Colorize;
use sheetquery::{
    AnthropicProvider, CancellationToken, DirectorySource, LlmConfig, MockProvider,
    OllamaProvider, OpenAIProvider, SearchOptions, SearchResponse, SheetQuery,
};
use tracing::warn;

use crate::cli::LlmProviderChoice;

/// Arguments for the search command.
pub struct SearchArgs {
    pub dir: PathBuf,
    pub query: String,
    pub llm: LlmProviderChoice,
    pub model: Option<String>,
    pub max_sheets: Option<usize>,
    pub threshold: Option<f64>,
    pub include_empty_rows: bool,
    pub json: bool,
}

pub fn run(args: SearchArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.dir.is_dir() {
        return Err(format!("Directory not found: {}", args.dir.display()).into());
    }

    let source = DirectorySource::new(&args.dir);
    let files = source.list_files()?;
    let engine = with_provider(SheetQuery::new(source), &args.llm, args.model.as_deref())?;

    if !args.json {
        println!(
            "{} {} {}",
            "Searching".cyan().bold(),
            args.dir.display(),
            format!("({} files, llm: {})", files.len(), args.llm).dimmed()
        );
        println!("  {} {}", "Query:".bold(), args.query);
        println!();
    }

    let mut candidates = Vec::with_capacity(files.len());
    for file in &files {
        match engine.describe_file("", file) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => warn!(file = %file, error = %e, "skipping unreadable file"),
        }
    }

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())?;

    let mut options = SearchOptions::new()
        .with_empty_rows(args.include_empty_rows)
        .with_cancellation(cancel);
    if let Some(max_sheets) = args.max_sheets {
        options = options.with_max_sheets(max_sheets);
    }
    if let Some(threshold) = args.threshold {
        options = options.with_match_threshold(threshold);
    }

    let response = engine.search(&args.query, &candidates, "", &options)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response)?;
    }

    Ok(())
}

/// Attach the chosen completion (and, where available, embedding) provider.
fn with_provider(
    engine: SheetQuery,
    choice: &LlmProviderChoice,
    model: Option<&str>,
) -> Result<SheetQuery, Box<dyn std::error::Error>> {
    let config = match model {
        Some(m) => LlmConfig::default().with_model(m),
        None => LlmConfig::default(),
    };

    let engine = match choice {
        LlmProviderChoice::None => engine,
        LlmProviderChoice::Mock => engine.with_completion(MockProvider::new()),
        LlmProviderChoice::Anthropic => {
            engine.with_completion(AnthropicProvider::from_env_with_config(config)?)
        }
        LlmProviderChoice::OpenAI => engine
            .with_completion(OpenAIProvider::from_env_with_config(config.clone())?)
            .with_embedding(OpenAIProvider::from_env_with_config(config)?),
        LlmProviderChoice::Ollama => engine
            .with_completion(OllamaProvider::with_config(config.clone())?)
            .with_embedding(OllamaProvider::with_config(config)?),
    };
    Ok(engine)
}

fn print_response(response: &SearchResponse) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "{} {:?} {}",
        "Intent:".bold(),
        response.intent.intent_type,
        format!("[{}]", response.intent.concepts().join(", ")).dimmed()
    );
    println!();

    if response.results.is_empty() && response.failures.is_empty() {
        println!("{}", "No relevant sheets found.".yellow());
        return Ok(());
    }

    for result in &response.results {
        println!(
            "{} {} / {} {}",
            "✓".green().bold(),
            result.file_id.bold(),
            result.sheet_name.bold(),
            format!("(relevance {:.2})", result.relevance_score).dimmed()
        );
        println!("  {} {}", "Plan:".dimmed(), result.plan.description);
        for m in &result.column_matches {
            println!(
                "  {} {} → {} {}",
                "•".dimmed(),
                m.concept,
                m.column_name.cyan(),
                format!("({:?}, {:.2})", m.method, m.confidence).dimmed()
            );
        }
        println!(
            "  {} {} rows, {} attempt(s), {} ms",
            "Stats:".dimmed(),
            result.rows_processed,
            result.attempts.len(),
            result.elapsed_ms
        );
        for line in serde_json::to_string_pretty(&result.result_value)?.lines() {
            println!("    {}", line);
        }
        println!();
    }

    for failure in &response.failures {
        println!(
            "{} {} / {} {}",
            "✗".red().bold(),
            failure.file_id.bold(),
            failure.sheet_name.bold(),
            format!("({:?})", failure.stage).dimmed()
        );
        println!("  {}", failure.error.red());
        if let Some(plan) = &failure.plan_description {
            println!("  {} {}", "Last plan:".dimmed(), plan);
        }
        println!();
    }

    println!(
        "{} {} result(s), {} failure(s) in {} ms",
        "Done:".bold(),
        response.results.len(),
        response.failures.len(),
        response.duration_ms
    );
    Ok(())
}
