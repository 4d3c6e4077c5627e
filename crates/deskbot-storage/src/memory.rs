//! In-process storage backends.
//!
//! Same contracts as the networked backends, including the append-time
//! sequence check. Used by tests and by the `memory` backend selection for
//! running without a CouchDB or PostgreSQL instance.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use deskbot_core::{Session, SessionStatus, StorageError, Turn};

use crate::index::SessionIndex;
use crate::transcript::TranscriptStore;

/// In-memory transcript store.
#[derive(Default)]
pub struct MemoryTranscriptStore {
    turns: Mutex<HashMap<String, Vec<Turn>>>,
}

impl MemoryTranscriptStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn append(&self, session_id: &str, turn: &Turn) -> Result<(), StorageError> {
        let mut turns = self.turns.lock();
        let log = turns.entry(session_id.to_string()).or_default();

        let expected = log.last().map(|t| t.seq + 1).unwrap_or(0);
        if turn.seq != expected {
            return Err(StorageError::Conflict {
                session_id: session_id.to_string(),
                seq: turn.seq,
            });
        }

        log.push(turn.clone());
        Ok(())
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, StorageError> {
        let turns = self.turns.lock();
        let log = match turns.get(session_id) {
            Some(log) => log,
            None => return Ok(vec![]),
        };
        let start = log.len().saturating_sub(limit);
        Ok(log[start..].to_vec())
    }
}

/// In-memory session index.
#[derive(Default)]
pub struct MemorySessionIndex {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionIndex for MemorySessionIndex {
    async fn get_or_create(
        &self,
        session_id: &str,
        provider: &str,
    ) -> Result<Session, StorageError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id, provider));
        Ok(session.clone())
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>, StorageError> {
        Ok(self.sessions.lock().get(session_id).cloned())
    }

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StorageError::NotFound(session_id.to_string()))?;
        session.status = status;
        session.last_active_at = at;
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Session>, StorageError> {
        let sessions = self.sessions.lock();
        let mut all: Vec<Session> = sessions.values().cloned().collect();
        all.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        all.truncate(limit);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_assigns_sequence_slots_in_order() {
        let store = MemoryTranscriptStore::new();

        store.append("s1", &Turn::user(0, "hello")).await.unwrap();
        store
            .append("s1", &Turn::agent(1, "hi", "stub"))
            .await
            .unwrap();

        let turns = store.recent("s1", 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].seq, 0);
        assert_eq!(turns[1].seq, 1);
    }

    #[tokio::test]
    async fn test_append_rejects_duplicate_sequence() {
        let store = MemoryTranscriptStore::new();
        store.append("s1", &Turn::user(0, "hello")).await.unwrap();

        let err = store.append("s1", &Turn::user(0, "again")).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { seq: 0, .. }));
    }

    #[tokio::test]
    async fn test_append_rejects_gapped_sequence() {
        let store = MemoryTranscriptStore::new();
        store.append("s1", &Turn::user(0, "hello")).await.unwrap();

        let err = store.append("s1", &Turn::user(5, "skip")).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { seq: 5, .. }));
    }

    #[tokio::test]
    async fn test_sessions_have_independent_sequences() {
        let store = MemoryTranscriptStore::new();
        store.append("s1", &Turn::user(0, "one")).await.unwrap();
        store.append("s2", &Turn::user(0, "two")).await.unwrap();

        assert_eq!(store.recent("s1", 10).await.unwrap().len(), 1);
        assert_eq!(store.recent("s2", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recent_clips_to_most_recent() {
        let store = MemoryTranscriptStore::new();
        for seq in 0..5 {
            store
                .append("s1", &Turn::user(seq, format!("m{seq}")))
                .await
                .unwrap();
        }

        let turns = store.recent("s1", 2).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].seq, 3);
        assert_eq!(turns[1].seq, 4);
    }

    #[tokio::test]
    async fn test_recent_on_unknown_session_is_empty() {
        let store = MemoryTranscriptStore::new();
        assert!(store.recent("nope", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent_and_keeps_provider() {
        let index = MemorySessionIndex::new();

        let first = index.get_or_create("s1", "anthropic").await.unwrap();
        assert_eq!(first.status, SessionStatus::Active);

        // A later call with a different default does not rewrite the record.
        let second = index.get_or_create("s1", "openai").await.unwrap();
        assert_eq!(second.provider, "anthropic");
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_update_status_unknown_session_is_not_found() {
        let index = MemorySessionIndex::new();
        let err = index
            .update_status("nope", SessionStatus::Errored, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_recent_orders_by_activity() {
        let index = MemorySessionIndex::new();
        index.get_or_create("s1", "anthropic").await.unwrap();
        index.get_or_create("s2", "anthropic").await.unwrap();

        index
            .update_status("s1", SessionStatus::Active, Utc::now() + chrono::Duration::seconds(10))
            .await
            .unwrap();

        let sessions = index.list_recent(10).await.unwrap();
        assert_eq!(sessions[0].id, "s1");
    }
}
