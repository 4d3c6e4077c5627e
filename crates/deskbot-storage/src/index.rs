//! Session index: relational session metadata.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, instrument};

use deskbot_core::{Session, SessionStatus, StorageError};

/// Relational store of per-session metadata: one row per session, keyed by
/// session id. No cross-store awareness; transcript consistency is the
/// session manager's responsibility.
#[async_trait]
pub trait SessionIndex: Send + Sync {
    /// Return the existing session, or create one with status `active` and
    /// the given provider recorded.
    async fn get_or_create(
        &self,
        session_id: &str,
        provider: &str,
    ) -> Result<Session, StorageError>;

    /// Look up a session without creating it.
    async fn get(&self, session_id: &str) -> Result<Option<Session>, StorageError>;

    /// Update a session's status and last-activity timestamp.
    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// The most recently active sessions, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Session>, StorageError>;
}

/// Schema bootstrap, run once at connection time.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    provider TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    last_active_at TIMESTAMPTZ NOT NULL
)
"#;

/// PostgreSQL-backed session index.
pub struct PgSessionIndex {
    pool: PgPool,
}

impl PgSessionIndex {
    /// Connect to the database and ensure the sessions table exists.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(url)
            .await
            .map_err(Self::map_err)?;

        let index = Self { pool };
        index.run_migrations().await?;
        Ok(index)
    }

    /// Wrap an existing pool (the caller owns migration timing).
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the sessions table if needed.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;
        debug!("session index schema ready");
        Ok(())
    }

    /// Serialize SessionStatus to its column value.
    fn status_to_str(status: SessionStatus) -> &'static str {
        match status {
            SessionStatus::Active => "active",
            SessionStatus::Closed => "closed",
            SessionStatus::Errored => "errored",
        }
    }

    /// Parse SessionStatus from its column value.
    fn str_to_status(s: &str) -> Result<SessionStatus, StorageError> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "closed" => Ok(SessionStatus::Closed),
            "errored" => Ok(SessionStatus::Errored),
            other => Err(StorageError::Invalid(format!(
                "unknown session status '{other}'"
            ))),
        }
    }

    fn map_err(e: sqlx::Error) -> StorageError {
        match e {
            sqlx::Error::RowNotFound => StorageError::NotFound("session row".to_string()),
            other => StorageError::unavailable(other.to_string()),
        }
    }

    fn row_to_session(
        row: (String, String, String, DateTime<Utc>, DateTime<Utc>),
    ) -> Result<Session, StorageError> {
        let (id, provider, status, created_at, last_active_at) = row;
        Ok(Session {
            id,
            provider,
            status: Self::str_to_status(&status)?,
            created_at,
            last_active_at,
        })
    }
}

#[async_trait]
impl SessionIndex for PgSessionIndex {
    #[instrument(skip_all, fields(session = session_id))]
    async fn get_or_create(
        &self,
        session_id: &str,
        provider: &str,
    ) -> Result<Session, StorageError> {
        let now = Utc::now();

        // Existing rows win: a session's provider is fixed at creation.
        sqlx::query(
            r#"
            INSERT INTO sessions (id, provider, status, created_at, last_active_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(provider)
        .bind(Self::status_to_str(SessionStatus::Active))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Self::map_err)?;

        let row: (String, String, String, DateTime<Utc>, DateTime<Utc>) = sqlx::query_as(
            r#"
            SELECT id, provider, status, created_at, last_active_at
            FROM sessions WHERE id = $1
            "#,
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::map_err)?;

        Self::row_to_session(row)
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>, StorageError> {
        let row: Option<(String, String, String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, provider, status, created_at, last_active_at
            FROM sessions WHERE id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_err)?;

        row.map(Self::row_to_session).transpose()
    }

    #[instrument(skip_all, fields(session = session_id, ?status))]
    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE sessions SET status = $2, last_active_at = $3 WHERE id = $1",
        )
        .bind(session_id)
        .bind(Self::status_to_str(status))
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(Self::map_err)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(session_id.to_string()));
        }

        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Session>, StorageError> {
        let rows: Vec<(String, String, String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, provider, status, created_at, last_active_at
            FROM sessions
            ORDER BY last_active_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_err)?;

        rows.into_iter().map(Self::row_to_session).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            SessionStatus::Active,
            SessionStatus::Closed,
            SessionStatus::Errored,
        ] {
            let s = PgSessionIndex::status_to_str(status);
            assert_eq!(PgSessionIndex::str_to_status(s).unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_is_invalid() {
        assert!(matches!(
            PgSessionIndex::str_to_status("archived"),
            Err(StorageError::Invalid(_))
        ));
    }
}
