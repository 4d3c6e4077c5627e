//! Session metadata types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session status in its lifecycle.
///
/// `active --(provider failure)--> errored --(successful turn)--> active`;
/// `active|errored --(explicit close)--> closed`. Closed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Session is accepting turns
    Active,
    /// Session was explicitly closed; accepts no further turns
    Closed,
    /// The most recent provider call failed with no successful call since
    Errored,
}

impl SessionStatus {
    /// Whether new turns are accepted in this status.
    pub fn accepts_turns(self) -> bool {
        self != SessionStatus::Closed
    }
}

/// Session metadata, owned by the session index.
///
/// Sessions are created on the first user message and never physically
/// deleted; lifecycle ends via a status transition to `closed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unique identifier
    pub id: String,
    /// Provider recorded at creation; historical turns keep their own record
    pub provider: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp
    pub last_active_at: DateTime<Utc>,
    /// Current status
    pub status: SessionStatus,
}

impl Session {
    /// Create a new active session.
    pub fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            provider: provider.into(),
            created_at: now,
            last_active_at: now,
            status: SessionStatus::Active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_active() {
        let session = Session::new("s1", "anthropic");
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.status.accepts_turns());
    }

    #[test]
    fn test_closed_rejects_turns() {
        assert!(!SessionStatus::Closed.accepts_turns());
        assert!(SessionStatus::Errored.accepts_turns());
    }
}
