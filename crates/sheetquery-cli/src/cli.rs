//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SheetQuery: natural-language queries over spreadsheet data
#[derive(Parser)]
#[command(name = "sheetquery")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Answer a question from the sheets in a directory
    Search {
        /// Directory of CSV/TSV files (sub-directories are multi-sheet files)
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// The question to answer
        #[arg(short, long)]
        query: String,

        /// LLM provider to use for reasoning steps
        #[arg(long, default_value = "none")]
        llm: LlmProviderChoice,

        /// Model to use (provider-specific, e.g., "gpt-4o", "llama3.2")
        #[arg(long)]
        model: Option<String>,

        /// Maximum number of sheets to process
        #[arg(long)]
        max_sheets: Option<usize>,

        /// Minimum sheet relevance (0-1)
        #[arg(long)]
        threshold: Option<f64>,

        /// Keep fully empty rows in extraction input
        #[arg(long)]
        include_empty_rows: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the inferred structure of a sheet file
    Analyze {
        /// Path to the data file (CSV/TSV)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print filtered rows of a sheet file
    Retrieve {
        /// Path to the data file (CSV/TSV)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Row filter as COLUMN:OP:VALUE (ops: eq, ne, contains, gt, gte, lt, lte, between with LOW..HIGH)
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Require a value in this column (repeatable)
        #[arg(short, long = "key")]
        keys: Vec<String>,

        /// Maximum rows to return
        #[arg(long, default_value = "1000")]
        max_rows: usize,

        /// Keep fully empty rows
        #[arg(long)]
        include_empty_rows: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// LLM provider choice for search
#[derive(Clone, Debug, Default)]
pub enum LlmProviderChoice {
    /// No LLM - deterministic fallbacks only
    #[default]
    None,
    /// Anthropic Claude API (requires ANTHROPIC_API_KEY)
    Anthropic,
    /// OpenAI GPT API (requires OPENAI_API_KEY)
    OpenAI,
    /// Ollama local models (requires Ollama running)
    Ollama,
    /// Mock provider for testing
    Mock,
}

impl std::str::FromStr for LlmProviderChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(LlmProviderChoice::None),
            "anthropic" | "claude" => Ok(LlmProviderChoice::Anthropic),
            "openai" | "gpt" => Ok(LlmProviderChoice::OpenAI),
            "ollama" | "local" => Ok(LlmProviderChoice::Ollama),
            "mock" | "test" => Ok(LlmProviderChoice::Mock),
            _ => Err(format!(
                "Unknown provider: {}. Use: none, anthropic, openai, ollama, or mock.",
                s
            )),
        }
    }
}

impl std::fmt::Display for LlmProviderChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProviderChoice::None => write!(f, "none"),
            LlmProviderChoice::Anthropic => write!(f, "anthropic"),
            LlmProviderChoice::OpenAI => write!(f, "openai"),
            LlmProviderChoice::Ollama => write!(f, "ollama"),
            LlmProviderChoice::Mock => write!(f, "mock"),
        }
    }
}
