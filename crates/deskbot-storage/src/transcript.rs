//! Transcript storage: append-only per-session turn logs.
//!
//! The CouchDB backend stores one document per turn under a deterministic
//! id of `{session_id}:{seq:08}`. Zero-padding makes lexicographic document
//! order equal sequence order, so range reads over `_all_docs` return turns
//! in order without a view. The PUT of an already-taken id returns HTTP 409,
//! which makes the database itself the arbiter between concurrent writers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use deskbot_core::{Role, StorageError, Turn};

/// Append-only store of per-session conversation turns.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Append a turn to a session's transcript.
    ///
    /// The turn's sequence number must be exactly one greater than the last
    /// stored turn for the session (or 0 for an empty session); a violation
    /// is rejected with [`StorageError::Conflict`] so concurrent writers are
    /// caught instead of corrupting the sequence.
    async fn append(&self, session_id: &str, turn: &Turn) -> Result<(), StorageError>;

    /// The most recent `limit` turns, in ascending sequence order.
    /// Empty if the session has no turns.
    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, StorageError>;
}

/// CouchDB-backed transcript store.
pub struct CouchTranscriptStore {
    client: Client,
    base_url: String,
    database: String,
    username: Option<String>,
    password: Option<String>,
}

impl CouchTranscriptStore {
    /// Create a new store against a CouchDB endpoint.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            database: database.into(),
            username: None,
            password: None,
        }
    }

    /// Set basic-auth credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Create the database if it does not exist yet.
    pub async fn ensure_database(&self) -> Result<(), StorageError> {
        let url = format!("{}/{}", self.base_url, self.database);
        let response = self
            .authorized(self.client.put(&url))
            .send()
            .await
            .map_err(|e| StorageError::unavailable(e.to_string()))?;

        match response.status() {
            s if s.is_success() => {
                debug!(database = %self.database, "created transcript database");
                Ok(())
            }
            // 412: database already exists
            StatusCode::PRECONDITION_FAILED => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StorageError::unavailable(
                format!("couchdb rejected credentials for '{}'", self.database),
            )),
            s => Err(StorageError::unavailable(format!(
                "couchdb returned {s} creating database '{}'",
                self.database
            ))),
        }
    }

    /// Deterministic document id: zero-padded so lexicographic order is
    /// sequence order.
    fn doc_id(session_id: &str, seq: u64) -> String {
        format!("{session_id}:{seq:08}")
    }

    fn doc_url(&self, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.database, doc_id)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => builder.basic_auth(user, Some(pass)),
            _ => builder,
        }
    }

    fn transport_error(err: reqwest::Error) -> StorageError {
        StorageError::unavailable(err.to_string())
    }
}

#[async_trait]
impl TranscriptStore for CouchTranscriptStore {
    #[instrument(skip_all, fields(session = session_id, seq = turn.seq))]
    async fn append(&self, session_id: &str, turn: &Turn) -> Result<(), StorageError> {
        // Optimistic check against the stored tail; catches gaps as well as
        // stale writers before the PUT even goes out.
        let tail = self.recent(session_id, 1).await?;
        let expected = tail.last().map(|t| t.seq + 1).unwrap_or(0);
        if turn.seq != expected {
            return Err(StorageError::Conflict {
                session_id: session_id.to_string(),
                seq: turn.seq,
            });
        }

        let doc = TurnDocument::from_turn(session_id, turn);
        let url = self.doc_url(&Self::doc_id(session_id, turn.seq));
        let response = self
            .authorized(self.client.put(&url))
            .json(&doc)
            .send()
            .await
            .map_err(Self::transport_error)?;

        match response.status() {
            s if s.is_success() => Ok(()),
            // The slot is taken: we lost a race with another writer.
            StatusCode::CONFLICT => Err(StorageError::Conflict {
                session_id: session_id.to_string(),
                seq: turn.seq,
            }),
            s => Err(StorageError::unavailable(format!(
                "couchdb put returned {s}"
            ))),
        }
    }

    #[instrument(skip_all, fields(session = session_id, limit))]
    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, StorageError> {
        if limit == 0 {
            return Ok(vec![]);
        }

        // Descending range read from the session's highest key down, then
        // reversed back to ascending order.
        let high_key = serde_json::to_string(&format!("{session_id}:\u{fff0}"))
            .map_err(|e| StorageError::Invalid(e.to_string()))?;
        let low_key = serde_json::to_string(&format!("{session_id}:"))
            .map_err(|e| StorageError::Invalid(e.to_string()))?;

        let url = format!("{}/{}/_all_docs", self.base_url, self.database);
        let response = self
            .authorized(self.client.get(&url))
            .query(&[
                ("include_docs", "true".to_string()),
                ("descending", "true".to_string()),
                ("limit", limit.to_string()),
                ("startkey", high_key),
                ("endkey", low_key),
            ])
            .send()
            .await
            .map_err(Self::transport_error)?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(StorageError::unavailable(format!(
                    "transcript database '{}' does not exist",
                    self.database
                )))
            }
            s => {
                return Err(StorageError::unavailable(format!(
                    "couchdb read returned {s}"
                )))
            }
        }

        let body: AllDocsResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Invalid(e.to_string()))?;

        let mut turns: Vec<Turn> = body
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(TurnDocument::into_turn)
            .collect();
        turns.reverse();
        Ok(turns)
    }
}

// CouchDB wire types

#[derive(Debug, Serialize, Deserialize)]
struct TurnDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    seq: u64,
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
}

impl TurnDocument {
    fn from_turn(session_id: &str, turn: &Turn) -> Self {
        Self {
            id: CouchTranscriptStore::doc_id(session_id, turn.seq),
            session_id: session_id.to_string(),
            seq: turn.seq,
            role: turn.role,
            content: turn.content.clone(),
            timestamp: turn.timestamp,
            provider: turn.provider.clone(),
        }
    }

    fn into_turn(self) -> Turn {
        Turn {
            seq: self.seq,
            role: self.role,
            content: self.content,
            timestamp: self.timestamp,
            provider: self.provider,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AllDocsResponse {
    rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
struct AllDocsRow {
    #[serde(default)]
    doc: Option<TurnDocument>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_ids_sort_in_sequence_order() {
        let ids: Vec<String> = [0u64, 1, 9, 10, 99, 100, 12_345_678]
            .iter()
            .map(|&seq| CouchTranscriptStore::doc_id("s1", seq))
            .collect();

        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_doc_ids_stay_within_session_range() {
        let id = CouchTranscriptStore::doc_id("s1", 42);
        assert!(id.as_str() > "s1:");
        assert!(id.as_str() < "s1:\u{fff0}");
    }

    #[test]
    fn test_turn_document_round_trip() {
        let turn = Turn::agent(3, "hi there", "anthropic");
        let doc = TurnDocument::from_turn("s1", &turn);
        assert_eq!(doc.id, "s1:00000003");

        let json = serde_json::to_string(&doc).unwrap();
        let parsed: TurnDocument = serde_json::from_str(&json).unwrap();
        let restored = parsed.into_turn();
        assert_eq!(restored, turn);
    }

    #[test]
    fn test_all_docs_rows_without_docs_are_skipped() {
        let json = r#"{"rows":[{"id":"a"},{"id":"b","doc":{"_id":"s1:00000000","session_id":"s1","seq":0,"role":"user","content":"hello","timestamp":"2026-01-01T00:00:00Z"}}]}"#;
        let body: AllDocsResponse = serde_json::from_str(json).unwrap();
        let turns: Vec<Turn> = body
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(TurnDocument::into_turn)
            .collect();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].seq, 0);
    }
}
