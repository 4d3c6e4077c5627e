//! Conversation session management.
//!
//! [`SessionManager`] processes one user turn end-to-end: it loads session
//! metadata from the session index, appends the user turn to the transcript,
//! calls the active provider with the assembled context, appends the response,
//! and updates session status. The two stores share no transaction, so the
//! ordering discipline here is what keeps them consistent under partial
//! failure.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, error, instrument, warn};

use deskbot_core::{SessionError, SessionStatus, StorageError, Turn};
use deskbot_providers::ProviderRegistry;
use deskbot_storage::{SessionIndex, TranscriptStore};

use crate::context;
use crate::retry::RetryPolicy;

/// Configuration for the session manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Provider recorded on newly created sessions.
    pub provider: String,
    /// Maximum turns supplied to the provider per call.
    pub context_window: usize,
    /// Optional system prompt prepended to every provider context.
    pub system_prompt: Option<String>,
    /// Retry policy for the post-response storage writes.
    pub ack_retry: RetryPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            context_window: 40,
            system_prompt: None,
            ack_retry: RetryPolicy::default(),
        }
    }
}

/// The session manager: per-turn orchestration across both stores and the
/// active provider.
///
/// Turns on the same session are serialized through a per-session lock;
/// turns on different sessions proceed fully in parallel. In a multi-process
/// deployment the transcript store's sequence-conflict check is the arbiter:
/// the loser of a race receives [`StorageError::Conflict`] and retries with
/// a refreshed sequence number.
pub struct SessionManager {
    transcript: Arc<dyn TranscriptStore>,
    index: Arc<dyn SessionIndex>,
    registry: Arc<ProviderRegistry>,
    config: ManagerConfig,
    /// Per-session locks serializing concurrent turns on the same session.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionManager {
    /// Create a new session manager.
    pub fn new(
        transcript: Arc<dyn TranscriptStore>,
        index: Arc<dyn SessionIndex>,
        registry: Arc<ProviderRegistry>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            transcript,
            index,
            registry,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Process one user turn end-to-end.
    ///
    /// The user turn is made durable before the provider is called: a turn
    /// that cannot be recorded is never sent, so no response can exist
    /// without its prompt. On provider failure the user turn stays persisted
    /// (the caller can retry without resending) and the session is marked
    /// errored. Provider failures are not retried here - re-sending may
    /// duplicate cost on a paid API, so that decision belongs to the caller.
    #[instrument(skip_all, fields(session = session_id))]
    pub async fn handle_turn(
        &self,
        session_id: &str,
        user_text: &str,
    ) -> Result<Turn, SessionError> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        // Closed sessions accept no turns. An index row missing for an
        // existing transcript is recreated here and the sequence picked up
        // from the transcript tail below.
        let session = self
            .index
            .get_or_create(session_id, &self.config.provider)
            .await
            .map_err(|e| SessionError::persistence(session_id, e))?;

        if session.status == SessionStatus::Closed {
            return Err(SessionError::Closed(session_id.to_string()));
        }

        let tail = self
            .transcript
            .recent(session_id, 1)
            .await
            .map_err(|e| SessionError::persistence(session_id, e))?;
        let user_seq = tail.last().map(|t| t.seq + 1).unwrap_or(0);

        let user_turn = Turn::user(user_seq, user_text);
        self.transcript
            .append(session_id, &user_turn)
            .await
            .map_err(|e| SessionError::persistence(session_id, e))?;

        debug!(seq = user_seq, "user turn persisted");

        let recent = self
            .transcript
            .recent(session_id, self.config.context_window)
            .await
            .map_err(|e| SessionError::persistence(session_id, e))?;
        let ctx = context::assemble(
            self.config.system_prompt.as_deref(),
            &recent,
            self.config.context_window,
        );

        let adapter = self.registry.resolve(&session.provider)?;

        let mut reply = match adapter.generate(&ctx).await {
            Ok(turn) => turn,
            Err(cause) => {
                warn!(error = %cause, "provider call failed");
                self.mark_errored(session_id).await;
                return Err(SessionError::provider(session_id, cause));
            }
        };

        // The response takes the next slot; the adapter's provisional
        // numbering is not trusted.
        reply.seq = user_seq + 1;

        if let Err(e) = self.append_with_retry(session_id, &reply).await {
            error!(
                seq = reply.seq,
                content = %reply.content,
                "generated response could not be persisted"
            );
            return Err(SessionError::ack(session_id, e));
        }

        if let Err(e) = self
            .update_status_with_retry(session_id, SessionStatus::Active)
            .await
        {
            error!(
                seq = reply.seq,
                "session status could not be updated after successful turn"
            );
            return Err(SessionError::ack(session_id, e));
        }

        Ok(reply)
    }

    /// Close a session. Closing is terminal and idempotent: a closed session
    /// never transitions again and accepts no further turns.
    #[instrument(skip_all, fields(session = session_id))]
    pub async fn close_session(&self, session_id: &str) -> Result<(), SessionError> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let session = self
            .index
            .get(session_id)
            .await
            .map_err(|e| SessionError::persistence(session_id, e))?
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;

        if session.status == SessionStatus::Closed {
            return Ok(());
        }

        self.index
            .update_status(session_id, SessionStatus::Closed, Utc::now())
            .await
            .map_err(|e| SessionError::persistence(session_id, e))
    }

    /// Record the errored status after a failed provider call. A failure
    /// here is logged rather than returned so it never masks the provider
    /// error the caller is about to receive.
    async fn mark_errored(&self, session_id: &str) {
        if let Err(e) = self
            .update_status_with_retry(session_id, SessionStatus::Errored)
            .await
        {
            error!(session = session_id, error = %e, "failed to record errored status");
        }
    }

    async fn append_with_retry(
        &self,
        session_id: &str,
        turn: &Turn,
    ) -> Result<(), StorageError> {
        let mut attempt = 0;
        loop {
            match self.transcript.append(session_id, turn).await {
                Err(e) if e.is_retryable() && attempt + 1 < self.config.ack_retry.attempts => {
                    let delay = self.config.ack_retry.delay_for(attempt);
                    warn!(seq = turn.seq, error = %e, ?delay, "append failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn update_status_with_retry(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<(), StorageError> {
        let mut attempt = 0;
        loop {
            match self
                .index
                .update_status(session_id, status, Utc::now())
                .await
            {
                Err(e) if e.is_retryable() && attempt + 1 < self.config.ack_retry.attempts => {
                    let delay = self.config.ack_retry.delay_for(attempt);
                    warn!(error = %e, ?delay, "status update failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
