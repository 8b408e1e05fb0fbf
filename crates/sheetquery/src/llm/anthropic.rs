//! Anthropic Claude API provider implementation.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, SheetQueryError};

use super::prompts;
use super::provider::{parse_json_response, CompletionProvider, CompletionRequest, LlmConfig};

/// Anthropic API endpoint.
const API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version.
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    config: LlmConfig,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(api_key, LlmConfig::default())
    }

    /// Create a new Anthropic provider with custom configuration.
    pub fn with_config(api_key: impl Into<String>, config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SheetQueryError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            config,
        })
    }

    /// Create from environment variable.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_config(LlmConfig::default())
    }

    /// Create from environment variable with custom configuration.
    pub fn from_env_with_config(config: LlmConfig) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            SheetQueryError::Config("ANTHROPIC_API_KEY environment variable not set".to_string())
        })?;
        Self::with_config(api_key, config)
    }

    /// Build headers for API requests.
    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| SheetQueryError::Config(format!("Invalid API key: {}", e)))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }

    /// Send a message to the Claude API.
    fn send_message(&self, user_prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "system": prompts::system_prompt(),
            "messages": [
                {
                    "role": "user",
                    "content": user_prompt
                }
            ]
        });

        let response = self
            .client
            .post(API_URL)
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .map_err(|e| SheetQueryError::Collaborator(format!("API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(SheetQueryError::Collaborator(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let api_response: ApiResponse = response.json().map_err(|e| {
            SheetQueryError::Malformed(format!("Failed to parse API response: {}", e))
        })?;

        // Extract text from response
        api_response
            .content
            .into_iter()
            .find_map(|block| {
                if block.content_type == "text" {
                    Some(block.text)
                } else {
                    None
                }
            })
            .ok_or_else(|| SheetQueryError::Malformed("No text in API response".to_string()))
    }
}

impl CompletionProvider for AnthropicProvider {
    fn complete(&self, request: &CompletionRequest) -> Result<Value> {
        let prompt = prompts::with_schema(&request.prompt, &request.schema);
        let text = self.send_message(&prompt)?;
        parse_json_response(&text)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// API response structure.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

/// Content block in API response.
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_response_blocks() {
        let raw = r#"{"content": [{"type": "tool_use"}, {"type": "text", "text": "{\"a\": 1}"}]}"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        let text = parsed
            .content
            .into_iter()
            .find(|b| b.content_type == "text")
            .map(|b| b.text)
            .unwrap();
        assert_eq!(parse_json_response(&text).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_headers_carry_key_and_version() {
        let provider = AnthropicProvider {
            client: Client::new(),
            api_key: "test".to_string(),
            config: LlmConfig::default(),
        };
        let headers = provider.build_headers().unwrap();
        assert_eq!(headers["x-api-key"], "test");
        assert_eq!(headers["anthropic-version"], API_VERSION);
    }
}
