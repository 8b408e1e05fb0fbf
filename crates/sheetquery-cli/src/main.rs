//! SheetQuery CLI - natural-language queries over spreadsheet data.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Search {
            dir,
            query,
            llm,
            model,
            max_sheets,
            threshold,
            include_empty_rows,
            json,
        } => commands::search::run(commands::search::SearchArgs {
            dir,
            query,
            llm,
            model,
            max_sheets,
            threshold,
            include_empty_rows,
            json,
        }),

        Commands::Analyze { file, json } => commands::analyze::run(file, json, cli.verbose),

        Commands::Retrieve {
            file,
            filters,
            keys,
            max_rows,
            include_empty_rows,
            json,
        } => commands::retrieve::run(file, filters, keys, max_rows, include_empty_rows, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "sheetquery=debug" } else { "sheetquery=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
