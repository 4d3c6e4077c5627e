//! Error types for Deskbot.
//!
//! Four error families: configuration (startup-fatal), storage, provider,
//! and session. Session errors are what `handle_turn` surfaces to callers;
//! storage and provider errors are carried as their sources.

use std::time::Duration;

use thiserror::Error;

/// Startup configuration errors. Always fatal; never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required configuration value is absent
    #[error("missing required configuration value: {field}")]
    MissingValue { field: String },

    /// A configuration value is present but unusable
    #[error("invalid configuration for {field}: {message}")]
    Invalid { field: String, message: String },

    /// Provider name does not match any registered adapter
    #[error("unknown provider '{name}'")]
    UnknownProvider { name: String },

    /// One or more validation failures, collected at load time
    #[error("configuration validation failed:\n  {0}")]
    ValidationFailed(String),
}

impl ConfigError {
    /// Create a missing-value error.
    pub fn missing(field: impl Into<String>) -> Self {
        ConfigError::MissingValue {
            field: field.into(),
        }
    }

    /// Create an invalid-value error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors from either storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Optimistic sequence check failed: another writer holds the slot.
    /// Callers retry with a refreshed sequence number, never blindly.
    #[error("write conflict on session {session_id} at sequence {seq}")]
    Conflict { session_id: String, seq: u64 },

    /// Backend unreachable or returned a server-side failure; retryable
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// Referenced record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored data could not be decoded
    #[error("invalid stored data: {0}")]
    Invalid(String),
}

impl StorageError {
    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        StorageError::Unavailable(message.into())
    }

    /// Whether a bounded-backoff retry of the same operation can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

/// Errors from a provider adapter's completion call.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The request exceeded the configured timeout
    #[error("request to {provider} timed out after {seconds}s")]
    Timeout { provider: String, seconds: u64 },

    /// The provider throttled the request
    #[error("{provider} rate limited the request")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    /// The provider returned something that could not be used as a turn
    #[error("unusable response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// Credentials were rejected; not retryable
    #[error("authentication failed for {provider}")]
    AuthFailure { provider: String },

    /// Connection-level failure before any response arrived
    #[error("could not reach {provider}: {message}")]
    Unreachable { provider: String, message: String },
}

impl ProviderError {
    /// Create an invalid-response error.
    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether the caller may reasonably retry the same request.
    /// Auth failures and malformed responses will not improve on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout { .. }
                | ProviderError::RateLimited { .. }
                | ProviderError::Unreachable { .. }
        )
    }
}

/// Errors surfaced by the session manager. Never silently swallowed:
/// every failure either changes session status or reaches the caller.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session was closed; closed sessions accept no new turns
    #[error("session {0} is closed and does not accept new turns")]
    Closed(String),

    /// A storage write failed before the provider was called; no partial state
    #[error("could not persist turn for session {session_id}")]
    PersistenceFailed {
        session_id: String,
        #[source]
        source: StorageError,
    },

    /// The provider call failed; the user turn remains persisted
    #[error("provider call failed for session {session_id}")]
    ProviderFailed {
        session_id: String,
        #[source]
        source: ProviderError,
    },

    /// The response was generated but could not be durably recorded.
    /// The content is logged before this is returned, so it is never lost.
    #[error("response for session {session_id} could not be acknowledged")]
    AckFailed {
        session_id: String,
        #[source]
        source: StorageError,
    },

    /// Operation referenced a session the index does not know
    #[error("unknown session {0}")]
    UnknownSession(String),

    /// Configuration problem discovered mid-operation (e.g. a session
    /// recorded a provider that is no longer registered)
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// Wrap a storage error from the pre-provider phase.
    pub fn persistence(session_id: impl Into<String>, source: StorageError) -> Self {
        SessionError::PersistenceFailed {
            session_id: session_id.into(),
            source,
        }
    }

    /// Wrap a provider error.
    pub fn provider(session_id: impl Into<String>, source: ProviderError) -> Self {
        SessionError::ProviderFailed {
            session_id: session_id.into(),
            source,
        }
    }

    /// Wrap a storage error from the post-provider acknowledgement phase.
    pub fn ack(session_id: impl Into<String>, source: StorageError) -> Self {
        SessionError::AckFailed {
            session_id: session_id.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_retryability() {
        assert!(StorageError::unavailable("connection refused").is_retryable());
        assert!(!StorageError::Conflict {
            session_id: "s1".into(),
            seq: 3
        }
        .is_retryable());
        assert!(!StorageError::NotFound("s1".into()).is_retryable());
    }

    #[test]
    fn test_provider_retryability() {
        assert!(ProviderError::Timeout {
            provider: "anthropic".into(),
            seconds: 120
        }
        .is_retryable());
        assert!(!ProviderError::AuthFailure {
            provider: "openai".into()
        }
        .is_retryable());
        assert!(!ProviderError::invalid_response("openai", "empty choices").is_retryable());
    }

    #[test]
    fn test_session_error_carries_source() {
        let err = SessionError::provider(
            "s1",
            ProviderError::Timeout {
                provider: "anthropic".into(),
                seconds: 30,
            },
        );
        assert!(err.to_string().contains("s1"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
