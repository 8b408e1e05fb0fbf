//! Ollama local LLM provider implementation.
//!
//! Ollama allows running LLMs locally without API keys.
//! Install from: https://ollama.ai

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, SheetQueryError};

use super::prompts;
use super::provider::{
    parse_json_response, CompletionProvider, CompletionRequest, EmbeddingProvider, LlmConfig,
};

/// Default Ollama host.
const DEFAULT_HOST: &str = "http://localhost:11434";

/// Default embedding model.
const EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Ollama local LLM provider.
pub struct OllamaProvider {
    client: Client,
    host: String,
    config: LlmConfig,
    embedding_model: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider with default settings.
    ///
    /// Uses llama3.2 model by default. Make sure you've pulled it:
    /// `ollama pull llama3.2`
    pub fn new() -> Result<Self> {
        Self::with_model("llama3.2")
    }

    /// Create with a specific model.
    pub fn with_model(model: impl Into<String>) -> Result<Self> {
        Self::with_config(LlmConfig::default().with_model(model))
    }

    /// Create with custom configuration.
    pub fn with_config(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120)) // Local models can be slower
            .build()
            .map_err(|e| SheetQueryError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let host = std::env::var("OLLAMA_HOST")
            .map(|host| host.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_HOST.to_string());

        Ok(Self {
            client,
            host,
            config,
            embedding_model: EMBEDDING_MODEL.to_string(),
        })
    }

    /// Use a different embedding model.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Build headers for API requests.
    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    /// POST to an Ollama endpoint and return the successful response.
    fn post(&self, path: &str, body: &Value) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.host, path))
            .headers(self.build_headers())
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    SheetQueryError::Collaborator(
                        "Failed to connect to Ollama. Is it running? Start with: ollama serve"
                            .to_string(),
                    )
                } else {
                    SheetQueryError::Collaborator(format!("Ollama request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();

            // Check for model not found error
            if error_text.contains("not found") {
                return Err(SheetQueryError::Config(format!(
                    "Model not found. Pull it with: ollama pull {}",
                    body["model"].as_str().unwrap_or(&self.config.model)
                )));
            }

            return Err(SheetQueryError::Collaborator(format!(
                "Ollama error ({}): {}",
                status, error_text
            )));
        }
        Ok(response)
    }

    /// Send a message to Ollama, constraining output to the schema.
    fn send_message(&self, user_prompt: &str, schema: &Value) -> Result<String> {
        let body = json!({
            "model": self.config.model,
            "stream": false,
            "format": schema,
            "options": {
                "temperature": self.config.temperature,
                "num_predict": self.config.max_tokens
            },
            "messages": [
                {
                    "role": "system",
                    "content": prompts::system_prompt()
                },
                {
                    "role": "user",
                    "content": user_prompt
                }
            ]
        });

        let api_response: OllamaResponse = self.post("/api/chat", &body)?.json().map_err(|e| {
            SheetQueryError::Malformed(format!("Failed to parse Ollama response: {}", e))
        })?;

        Ok(api_response.message.content)
    }
}

impl CompletionProvider for OllamaProvider {
    fn complete(&self, request: &CompletionRequest) -> Result<Value> {
        let prompt = prompts::with_schema(&request.prompt, &request.schema);
        let text = self.send_message(&prompt, &request.schema)?;
        parse_json_response(&text)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({
            "model": self.embedding_model,
            "input": text,
        });
        let response: EmbedResponse = self.post("/api/embed", &body)?.json().map_err(|e| {
            SheetQueryError::Malformed(format!("Failed to parse Ollama embedding: {}", e))
        })?;
        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| SheetQueryError::Malformed("No embedding in response".to_string()))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama API response structure.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

/// Ollama embed endpoint response.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let raw = r#"{"model": "llama3.2", "message": {"role": "assistant", "content": "{\"x\": true}"}, "done": true}"#;
        let parsed: OllamaResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parse_json_response(&parsed.message.content).unwrap()["x"], true);
    }

    #[test]
    fn test_parse_embed_response() {
        let raw = r#"{"model": "nomic-embed-text", "embeddings": [[0.5, 0.25]]}"#;
        let parsed: EmbedResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.embeddings[0], vec![0.5, 0.25]);
    }
}
