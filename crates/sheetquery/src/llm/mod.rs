//! Completion and embedding collaborators.
//!
//! Every reasoning step of the engine (intent, sheet ranking, column
//! matching, planning) can ask a completion collaborator first and falls
//! back to a deterministic path when the collaborator is missing, slow or
//! wrong. SheetQuery works fully without any collaborator.
//!
//! # Supported Providers
//!
//! - **Anthropic** - Claude models via API (requires `ANTHROPIC_API_KEY`)
//! - **OpenAI** - GPT models and embeddings via API (requires `OPENAI_API_KEY`)
//! - **Ollama** - Local models and embeddings, no API key needed
//! - **Mock** - Scripted responses for tests
//!
//! # Example
//!
//! ```no_run
//! use sheetquery::{DirectorySource, OllamaProvider, SheetQuery};
//!
//! let ollama = OllamaProvider::new().unwrap();
//! let engine = SheetQuery::new(DirectorySource::new("./data")).with_completion(ollama);
//! ```

mod anthropic;
mod mock;
mod ollama;
mod openai;
pub(crate) mod prompts;
mod provider;
mod resolve;

pub use anthropic::AnthropicProvider;
pub use mock::{MockEmbedder, MockProvider};
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use provider::{
    cosine_similarity, parse_json_response, CompletionProvider, CompletionRequest,
    EmbeddingProvider, LlmConfig, PromptTask,
};
pub use resolve::{call_with_timeout, resolve, CallBudget, ResolutionSource, Resolved};
