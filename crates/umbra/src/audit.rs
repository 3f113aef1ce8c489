//! Audit logging for session lifecycle and command execution.
//!
//! The manager reports events through the narrow [`SessionObserver`]
//! interface, fire-and-forget: an observer failure is logged and discarded
//! at the call site, never propagated into a session operation.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

/// Observer for session lifecycle and command events.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    async fn session_created(&self, session_id: &str, port: u16, created_at: DateTime<Utc>);

    async fn session_destroyed(&self, session_id: &str, destroyed_at: DateTime<Utc>, reason: &str);

    async fn session_activity(&self, session_id: &str, at: DateTime<Utc>);

    async fn command_executed(
        &self,
        session_id: &str,
        command: &str,
        success: bool,
        duration: Duration,
        error: Option<&str>,
    );
}

/// Observer that records nothing. Used when the audit store is unavailable.
pub struct NullObserver;

#[async_trait]
impl SessionObserver for NullObserver {
    async fn session_created(&self, _session_id: &str, _port: u16, _created_at: DateTime<Utc>) {}

    async fn session_destroyed(
        &self,
        _session_id: &str,
        _destroyed_at: DateTime<Utc>,
        _reason: &str,
    ) {
    }

    async fn session_activity(&self, _session_id: &str, _at: DateTime<Utc>) {}

    async fn command_executed(
        &self,
        _session_id: &str,
        _command: &str,
        _success: bool,
        _duration: Duration,
        _error: Option<&str>,
    ) {
    }
}

/// SQLite-backed audit store.
pub struct SqliteAudit {
    pool: SqlitePool,
}

impl SqliteAudit {
    /// Open (or create) the audit database and its schema.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating audit directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("opening audit database {}", path.display()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                destroyed_at TEXT,
                last_activity TEXT NOT NULL,
                port INTEGER NOT NULL,
                termination_reason TEXT,
                status TEXT NOT NULL DEFAULT 'active'
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_commands (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                command TEXT NOT NULL,
                success INTEGER NOT NULL,
                duration_ms INTEGER,
                error TEXT,
                FOREIGN KEY (session_id) REFERENCES sessions (session_id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions (status)",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_session_commands_session_id \
             ON session_commands (session_id)",
        )
        .execute(&pool)
        .await?;

        debug!("Audit database ready at {}", path.display());
        Ok(Self { pool })
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl SessionObserver for SqliteAudit {
    async fn session_created(&self, session_id: &str, port: u16, created_at: DateTime<Utc>) {
        let result = sqlx::query(
            "INSERT INTO sessions (session_id, created_at, last_activity, port, status) \
             VALUES (?, ?, ?, ?, 'active')",
        )
        .bind(session_id)
        .bind(rfc3339(created_at))
        .bind(rfc3339(created_at))
        .bind(i64::from(port))
        .execute(&self.pool)
        .await;
        if let Err(e) = result {
            error!("Failed to record session creation: {}", e);
        }
    }

    async fn session_destroyed(&self, session_id: &str, destroyed_at: DateTime<Utc>, reason: &str) {
        let result = sqlx::query(
            "UPDATE sessions SET destroyed_at = ?, termination_reason = ?, \
             status = 'terminated' WHERE session_id = ?",
        )
        .bind(rfc3339(destroyed_at))
        .bind(reason)
        .bind(session_id)
        .execute(&self.pool)
        .await;
        if let Err(e) = result {
            error!("Failed to record session destruction: {}", e);
        }
    }

    async fn session_activity(&self, session_id: &str, at: DateTime<Utc>) {
        let result = sqlx::query("UPDATE sessions SET last_activity = ? WHERE session_id = ?")
            .bind(rfc3339(at))
            .bind(session_id)
            .execute(&self.pool)
            .await;
        if let Err(e) = result {
            error!("Failed to record session activity: {}", e);
        }
    }

    async fn command_executed(
        &self,
        session_id: &str,
        command: &str,
        success: bool,
        duration: Duration,
        error_message: Option<&str>,
    ) {
        let result = sqlx::query(
            "INSERT INTO session_commands \
             (session_id, timestamp, command, success, duration_ms, error) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(rfc3339(Utc::now()))
        .bind(command)
        .bind(success)
        .bind(duration.as_millis() as i64)
        .bind(error_message)
        .execute(&self.pool)
        .await;
        if let Err(e) = result {
            error!("Failed to record command execution: {}", e);
        }
    }
}
