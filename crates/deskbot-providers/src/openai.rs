//! OpenAI (GPT) provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use deskbot_core::{ProviderError, Role, Turn};

use crate::traits::Provider;

/// Default OpenAI API base URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI provider for GPT models.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_API_URL.to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 4096,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create from environment variable.
    pub fn from_env() -> Option<Self> {
        std::env::var("OPENAI_API_KEY").ok().map(Self::new)
    }

    /// Set a custom base URL (for OpenAI-compatible endpoints).
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

    /// Convert context turns to OpenAI chat format.
    fn format_messages(&self, context: &[Turn]) -> Vec<OpenAiMessage> {
        context
            .iter()
            .map(|t| OpenAiMessage {
                role: match t.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Agent => "assistant",
                }
                .to_string(),
                content: t.content.clone(),
            })
            .collect()
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
impl Provider for OpenAiProvider {
    fn id(&self) -> &str {
        "openai"
    }

    fn name(&self) -> &str {
        "OpenAI"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    #[instrument(skip(self, context), fields(model = %self.model, turns = context.len()))]
    async fn generate(&self, context: &[Turn]) -> Result<Turn, ProviderError> {
        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: self.format_messages(context),
            max_tokens: self.max_tokens,
        };

        debug!("sending completion request to OpenAI API");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            error!("OpenAI API error: {} - {}", status, body);
            return Err(self.map_status(status, retry_after, body));
        }

        let api_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(self.id(), e.to_string()))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.is_empty() {
            return Err(ProviderError::invalid_response(
                self.id(),
                "no message content in first choice",
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

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_metadata() {
        let provider = OpenAiProvider::new("test-key");
        assert_eq!(provider.id(), "openai");
        assert_eq!(provider.name(), "OpenAI");
        assert!(provider.is_configured());
    }

    #[test]
    fn test_format_messages_keeps_system_inline() {
        let provider = OpenAiProvider::new("test-key");
        let context = vec![
            Turn::system("You are a support assistant."),
            Turn::user(0, "hello"),
            Turn::agent(1, "hi", "openai"),
        ];

        let formatted = provider.format_messages(&context);
        assert_eq!(formatted.len(), 3);
        assert_eq!(formatted[0].role, "system");
        assert_eq!(formatted[1].role, "user");
        assert_eq!(formatted[2].role, "assistant");
    }

    #[test]
    fn test_response_parsing_takes_first_choice() {
        let json = r#"{"choices":[{"message":{"content":"Hello!"}},{"message":{"content":"ignored"}}]}"#;
        let response: OpenAiResponse = serde_json::from_str(json).unwrap();
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content);
        assert_eq!(content.as_deref(), Some("Hello!"));
    }
}
