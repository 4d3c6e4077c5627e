//! Anthropic (Claude) provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use deskbot_core::{ProviderError, Role, Turn};

use crate::traits::Provider;

/// Anthropic API base URL.
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";

/// Current Anthropic API version.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Anthropic provider for Claude models.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create from environment variable.
    pub fn from_env() -> Option<Self> {
        std::env::var("ANTHROPIC_API_KEY").ok().map(Self::new)
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the maximum tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Convert context turns to Anthropic format. System turns are handled
    /// separately via the request's `system` field.
    fn format_messages(&self, context: &[Turn]) -> Vec<AnthropicMessage> {
        context
            .iter()
            .filter(|t| t.role != Role::System)
            .map(|t| AnthropicMessage {
                role: match t.role {
                    Role::Agent => "assistant",
                    _ => "user",
                }
                .to_string(),
                content: t.content.clone(),
            })
            .collect()
    }

    /// Extract the system prompt from the context.
    fn extract_system(&self, context: &[Turn]) -> Option<String> {
        context
            .iter()
            .find(|t| t.role == Role::System)
            .map(|t| t.content.clone())
    }

    /// Map a transport-level failure to a provider error.
    fn map_transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: self.id().to_string(),
                seconds: self.timeout.as_secs(),
            }
        } else if err.is_connect() {
            ProviderError::Unreachable {
                provider: self.id().to_string(),
                message: err.to_string(),
            }
        } else {
            ProviderError::invalid_response(self.id(), err.to_string())
        }
    }

    /// Map a non-success HTTP status to a provider error.
    fn map_status(
        &self,
        status: StatusCode,
        retry_after: Option<Duration>,
        body: String,
    ) -> ProviderError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthFailure {
                provider: self.id().to_string(),
            },
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
                provider: self.id().to_string(),
                retry_after,
            },
            _ => ProviderError::invalid_response(self.id(), format!("{status}: {body}")),
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn id(&self) -> &str {
        "anthropic"
    }

    fn name(&self) -> &str {
        "Anthropic"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    #[instrument(skip(self, context), fields(model = %self.model, turns = context.len()))]
    async fn generate(&self, context: &[Turn]) -> Result<Turn, ProviderError> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: self.extract_system(context),
            messages: self.format_messages(context),
        };

        debug!("sending completion request to Anthropic API");

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .timeout(self.timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            error!("Anthropic API error: {} - {}", status, body);
            return Err(self.map_status(status, retry_after, body));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(self.id(), e.to_string()))?;

        let content: String = api_response
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .map(|b| b.text.as_str())
            .collect();

        if content.is_empty() {
            return Err(ProviderError::invalid_response(
                self.id(),
                "no text content in response",
            ));
        }

        let seq = context.last().map(|t| t.seq + 1).unwrap_or(0);
        Ok(Turn::agent(seq, content, self.id()))
    }
}

/// Parse a retry-after header value in seconds.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_metadata() {
        let provider = AnthropicProvider::new("test-key");
        assert_eq!(provider.id(), "anthropic");
        assert_eq!(provider.name(), "Anthropic");
        assert!(provider.is_configured());

        let unconfigured = AnthropicProvider::new("");
        assert!(!unconfigured.is_configured());
    }

    #[test]
    fn test_format_messages_maps_roles_and_filters_system() {
        let provider = AnthropicProvider::new("test-key");
        let context = vec![
            Turn::system("You are a support assistant."),
            Turn::user(0, "hello"),
            Turn::agent(1, "hi", "anthropic"),
        ];

        let formatted = provider.format_messages(&context);
        assert_eq!(formatted.len(), 2);
        assert_eq!(formatted[0].role, "user");
        assert_eq!(formatted[1].role, "assistant");
    }

    #[test]
    fn test_extract_system() {
        let provider = AnthropicProvider::new("test-key");
        let context = vec![Turn::system("Be helpful."), Turn::user(0, "hello")];
        assert_eq!(
            provider.extract_system(&context).as_deref(),
            Some("Be helpful.")
        );
        assert!(provider.extract_system(&context[1..]).is_none());
    }

    #[test]
    fn test_response_parsing_concatenates_text_blocks() {
        let json = r#"{"content":[{"type":"text","text":"Hello"},{"type":"text","text":" there"}]}"#;
        let response: AnthropicResponse = serde_json::from_str(json).unwrap();
        let content: String = response
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .map(|b| b.text.as_str())
            .collect();
        assert_eq!(content, "Hello there");
    }
}
