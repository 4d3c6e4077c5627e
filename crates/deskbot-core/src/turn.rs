//! Turn primitives: one message within a conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a turn in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions prepended to the context; never persisted
    System,
    /// User message
    User,
    /// Agent response
    Agent,
}

/// A single turn within a session.
///
/// Turns are immutable once written. The sequence number is the sole
/// ordering key; timestamps are informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Position within the session, starting at 0 and gap-free
    pub seq: u64,
    /// Turn role
    pub role: Role,
    /// Turn text
    pub content: String,
    /// Creation timestamp
    pub timestamp: DateTime<Utc>,
    /// Provider that produced this turn (agent turns only), fixed at write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Turn {
    /// Create a user turn.
    pub fn user(seq: u64, content: impl Into<String>) -> Self {
        Self {
            seq,
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            provider: None,
        }
    }

    /// Create an agent turn, recording the provider that produced it.
    pub fn agent(seq: u64, content: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            seq,
            role: Role::Agent,
            content: content.into(),
            timestamp: Utc::now(),
            provider: Some(provider.into()),
        }
    }

    /// Create a synthetic system turn for context assembly.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            seq: 0,
            role: Role::System,
            content: content.into(),
            timestamp: Utc::now(),
            provider: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_turn_has_no_provider() {
        let turn = Turn::user(0, "hello");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.seq, 0);
        assert!(turn.provider.is_none());
    }

    #[test]
    fn test_agent_turn_records_provider() {
        let turn = Turn::agent(1, "hi", "anthropic");
        assert_eq!(turn.role, Role::Agent);
        assert_eq!(turn.provider.as_deref(), Some("anthropic"));
    }
}
