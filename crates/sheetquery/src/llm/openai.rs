//! OpenAI API provider implementation (chat completions and embeddings).

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, SheetQueryError};

use super::prompts;
use super::provider::{
    parse_json_response, CompletionProvider, CompletionRequest, EmbeddingProvider, LlmConfig,
};

/// OpenAI API endpoint.
const API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI embeddings endpoint.
const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Default embedding model.
const EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// OpenAI GPT provider.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    config: LlmConfig,
    embedding_model: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let config = LlmConfig::default().with_model("gpt-4o");
        Self::with_config(api_key, config)
    }

    /// Create a new OpenAI provider with custom configuration.
    pub fn with_config(api_key: impl Into<String>, config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SheetQueryError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            config,
            embedding_model: EMBEDDING_MODEL.to_string(),
        })
    }

    /// Create from environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = Self::env_key()?;
        Self::new(api_key)
    }

    /// Create from environment variable with custom configuration.
    pub fn from_env_with_config(config: LlmConfig) -> Result<Self> {
        let api_key = Self::env_key()?;
        Self::with_config(api_key, config)
    }

    fn env_key() -> Result<String> {
        std::env::var("OPENAI_API_KEY").map_err(|_| {
            SheetQueryError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })
    }

    /// Use a different embedding model.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Build headers for API requests.
    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| SheetQueryError::Config(format!("Invalid API key: {}", e)))?,
        );
        Ok(headers)
    }

    /// POST a JSON body and return the successful response.
    fn post(&self, url: &str, body: &Value) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .post(url)
            .headers(self.build_headers()?)
            .json(body)
            .send()
            .map_err(|e| SheetQueryError::Collaborator(format!("API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(SheetQueryError::Collaborator(format!(
                "OpenAI API error ({}): {}",
                status, error_text
            )));
        }
        Ok(response)
    }

    /// Send a message to the OpenAI API.
    fn send_message(&self, user_prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "response_format": {"type": "json_object"},
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

        let api_response: OpenAIResponse = self.post(API_URL, &body)?.json().map_err(|e| {
            SheetQueryError::Malformed(format!("Failed to parse API response: {}", e))
        })?;

        // Extract text from response
        api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| SheetQueryError::Malformed("No response from OpenAI".to_string()))
    }
}

impl CompletionProvider for OpenAIProvider {
    fn complete(&self, request: &CompletionRequest) -> Result<Value> {
        let prompt = prompts::with_schema(&request.prompt, &request.schema);
        let text = self.send_message(&prompt)?;
        parse_json_response(&text)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({
            "model": self.embedding_model,
            "input": text,
        });
        let response: EmbeddingResponse = self.post(EMBEDDINGS_URL, &body)?.json().map_err(|e| {
            SheetQueryError::Malformed(format!("Failed to parse embedding response: {}", e))
        })?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| SheetQueryError::Malformed("No embedding in response".to_string()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// OpenAI API response structure.
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

/// Embeddings endpoint response.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
