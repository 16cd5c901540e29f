//! Keyed storage for login processes.
//!
//! The store holds at most one record per username; `put` is an
//! insert-or-replace so concurrent logins cannot leave two processes for
//! the same user. The Postgres backend leans on the primary key for that
//! guarantee, the in-memory backend on map semantics.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::Instrument;

use super::LoginProcess;

#[allow(async_fn_in_trait)]
pub trait SessionStore: Send + Sync {
    /// Load the login process for a username, if any.
    async fn load(&self, username: &str) -> Result<Option<LoginProcess>>;
    /// Insert or replace the login process keyed by its username.
    async fn put(&self, process: &LoginProcess) -> Result<()>;
    /// Set the two-factor flag on an existing process.
    async fn set_two_factor_verified(&self, username: &str) -> Result<()>;
}

/// Map-backed store for tests and single-process setups.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    processes: Mutex<HashMap<String, LoginProcess>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live login processes.
    pub async fn len(&self) -> usize {
        self.processes.lock().await.len()
    }
}

impl SessionStore for MemorySessionStore {
    async fn load(&self, username: &str) -> Result<Option<LoginProcess>> {
        let processes = self.processes.lock().await;
        Ok(processes.get(username).cloned())
    }

    async fn put(&self, process: &LoginProcess) -> Result<()> {
        let mut processes = self.processes.lock().await;
        processes.insert(process.username.clone(), process.clone());
        Ok(())
    }

    async fn set_two_factor_verified(&self, username: &str) -> Result<()> {
        let mut processes = self.processes.lock().await;
        if let Some(process) = processes.get_mut(username) {
            process.two_factor_verified = true;
        }
        Ok(())
    }
}

/// Postgres-backed store; the `login_processes` primary key enforces the
/// one-per-user invariant, the upsert provides replace-on-conflict.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SessionStore for PgSessionStore {
    async fn load(&self, username: &str) -> Result<Option<LoginProcess>> {
        let query = r"
            SELECT username, window_id, two_factor_verified, biometric_verified, created_at
            FROM login_processes
            WHERE username = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load login process")?;

        Ok(row.map(|row| LoginProcess {
            username: row.get("username"),
            window_id: row.get("window_id"),
            two_factor_verified: row.get("two_factor_verified"),
            biometric_verified: row.get("biometric_verified"),
            created_at: row.get("created_at"),
        }))
    }

    async fn put(&self, process: &LoginProcess) -> Result<()> {
        let query = r"
            INSERT INTO login_processes
                (username, window_id, two_factor_verified, biometric_verified, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (username) DO UPDATE
            SET window_id = $2,
                two_factor_verified = $3,
                biometric_verified = $4,
                created_at = $5
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&process.username)
            .bind(&process.window_id)
            .bind(process.two_factor_verified)
            .bind(process.biometric_verified)
            .bind(process.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to store login process")?;
        Ok(())
    }

    async fn set_two_factor_verified(&self, username: &str) -> Result<()> {
        let query = r"
            UPDATE login_processes
            SET two_factor_verified = TRUE
            WHERE username = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(username)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to mark two-factor verified")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn memory_store_replaces_by_username() -> Result<()> {
        let store = MemorySessionStore::new();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        store.put(&LoginProcess::new("alice", "window-1", now)).await?;
        store.put(&LoginProcess::new("alice", "window-2", now)).await?;

        assert_eq!(store.len().await, 1);
        let process = store.load("alice").await?.expect("process exists");
        assert_eq!(process.window_id, "window-2");
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_marks_two_factor() -> Result<()> {
        let store = MemorySessionStore::new();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        store.put(&LoginProcess::new("alice", "window-1", now)).await?;
        store.set_two_factor_verified("alice").await?;

        let process = store.load("alice").await?.expect("process exists");
        assert!(process.two_factor_verified);
        assert!(!process.biometric_verified);
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_mark_on_absent_user_is_a_noop() -> Result<()> {
        let store = MemorySessionStore::new();
        store.set_two_factor_verified("ghost").await?;
        assert_eq!(store.len().await, 0);
        Ok(())
    }
}
