//! Postgres-backed [`RowStore`](do_memory_core::storage::RowStore)
//! adapter: users, append-only audit log, session archive, metrics
//! snapshots (spec.md §4.4).
//!
//! Writes on this store are *never* allowed to fail the caller per spec.md
//! §7 ("audit write failure: logged, swallowed") — but that contract is
//! enforced one layer up, by the callers in `do-memory-core` that `let _
//! = rows.log_audit(..).await;` rather than propagating. This adapter
//! itself surfaces real SQL errors; only `log_audit`'s *callers* swallow
//! them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use do_memory_core::error::{Backend, Error, Result};
use do_memory_core::storage::{FeedbackStats, RowStore};
use do_memory_core::{AuditEntry, MemoryId, Session, User};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;

fn err(e: impl std::fmt::Display) -> Error {
    Error::Unavailable(Backend::Row, e.to_string())
}

/// Wraps a `sqlx::PgPool`. Connection pooling and transactions beyond a
/// single statement are not required by spec.md §6 ("simple pool and
/// transactions not required"), so every method here is one round trip.
pub struct PostgresRowStore {
    pool: PgPool,
}

impl PostgresRowStore {
    /// # Errors
    /// Returns an error if the pool cannot be built or the schema cannot
    /// be created.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect(dsn).await.map_err(err)?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                api_key TEXT UNIQUE NOT NULL,
                display_name TEXT NOT NULL,
                is_admin BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL,
                last_active_at TIMESTAMPTZ
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(err)?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS audit_log (
                id TEXT PRIMARY KEY,
                timestamp TIMESTAMPTZ NOT NULL,
                action TEXT NOT NULL,
                memory_id TEXT,
                actor TEXT NOT NULL,
                details_json JSONB NOT NULL,
                session_id TEXT,
                user_id TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(err)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS audit_log_memory_id_idx ON audit_log (memory_id)").execute(&self.pool).await.map_err(err)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS audit_log_timestamp_idx ON audit_log (timestamp)").execute(&self.pool).await.map_err(err)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS audit_log_action_idx ON audit_log (action)").execute(&self.pool).await.map_err(err)?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS session_archive (
                session_id TEXT PRIMARY KEY,
                started_at TIMESTAMPTZ NOT NULL,
                ended_at TIMESTAMPTZ,
                working_directory TEXT,
                current_task TEXT,
                memories_created BIGINT NOT NULL DEFAULT 0,
                memories_retrieved BIGINT NOT NULL DEFAULT 0,
                signals_detected BIGINT NOT NULL DEFAULT 0,
                archived_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(err)?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS metrics_snapshot (
                id TEXT PRIMARY KEY,
                timestamp TIMESTAMPTZ NOT NULL,
                counters_json JSONB NOT NULL,
                gauges_json JSONB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(err)?;

        Ok(())
    }

    fn row_to_audit(row: &sqlx::postgres::PgRow) -> Result<AuditEntry> {
        let memory_id: Option<String> = row.try_get("memory_id").map_err(err)?;
        Ok(AuditEntry {
            id: row.try_get("id").map_err(err)?,
            timestamp: row.try_get("timestamp").map_err(err)?,
            action: row.try_get("action").map_err(err)?,
            memory_id: memory_id.map(MemoryId),
            actor: row.try_get("actor").map_err(err)?,
            details: row.try_get("details_json").map_err(err)?,
            session_id: row.try_get("session_id").map_err(err)?,
            user_id: row.try_get("user_id").map_err(err)?,
        })
    }

    fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<User> {
        Ok(User {
            id: row.try_get("id").map_err(err)?,
            username: row.try_get("username").map_err(err)?,
            api_key: row.try_get("api_key").map_err(err)?,
            display_name: row.try_get("display_name").map_err(err)?,
            is_admin: row.try_get("is_admin").map_err(err)?,
            created_at: row.try_get("created_at").map_err(err)?,
            last_active_at: row.try_get("last_active_at").map_err(err)?,
        })
    }
}

#[async_trait]
impl RowStore for PostgresRowStore {
    async fn log_audit(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (id, timestamp, action, memory_id, actor, details_json, session_id, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&entry.id)
        .bind(entry.timestamp)
        .bind(&entry.action)
        .bind(entry.memory_id.as_ref().map(MemoryId::as_str))
        .bind(&entry.actor)
        .bind(&entry.details)
        .bind(&entry.session_id)
        .bind(&entry.user_id)
        .execute(&self.pool)
        .await
        .map_err(err)?;
        Ok(())
    }

    async fn get_feedback_for_memory(&self, id: &MemoryId) -> Result<FeedbackStats> {
        let row = sqlx::query(
            "SELECT \
                COUNT(*) FILTER (WHERE (details_json->>'useful')::boolean = TRUE) AS useful, \
                COUNT(*) FILTER (WHERE (details_json->>'useful')::boolean = FALSE) AS not_useful \
             FROM audit_log WHERE action = 'feedback' AND memory_id = $1",
        )
        .bind(id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(err)?;
        let useful: i64 = row.try_get("useful").map_err(err)?;
        let not_useful: i64 = row.try_get("not_useful").map_err(err)?;
        Ok(FeedbackStats { useful: useful.max(0) as u64, not_useful: not_useful.max(0) as u64 })
    }

    async fn get_all_memory_feedback_stats(&self) -> Result<HashMap<MemoryId, FeedbackStats>> {
        let rows = sqlx::query(
            "SELECT memory_id, \
                COUNT(*) FILTER (WHERE (details_json->>'useful')::boolean = TRUE) AS useful, \
                COUNT(*) FILTER (WHERE (details_json->>'useful')::boolean = FALSE) AS not_useful \
             FROM audit_log WHERE action = 'feedback' AND memory_id IS NOT NULL \
             GROUP BY memory_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(err)?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let memory_id: String = row.try_get("memory_id").map_err(err)?;
            let useful: i64 = row.try_get("useful").map_err(err)?;
            let not_useful: i64 = row.try_get("not_useful").map_err(err)?;
            out.insert(MemoryId(memory_id), FeedbackStats { useful: useful.max(0) as u64, not_useful: not_useful.max(0) as u64 });
        }
        Ok(out)
    }

    async fn get_feedback_stats(&self, days: u32) -> Result<FeedbackStats> {
        let row = sqlx::query(
            "SELECT \
                COUNT(*) FILTER (WHERE (details_json->>'useful')::boolean = TRUE) AS useful, \
                COUNT(*) FILTER (WHERE (details_json->>'useful')::boolean = FALSE) AS not_useful \
             FROM audit_log WHERE action = 'feedback' AND timestamp >= NOW() - ($1 || ' days')::interval",
        )
        .bind(i64::from(days))
        .fetch_one(&self.pool)
        .await
        .map_err(err)?;
        let useful: i64 = row.try_get("useful").map_err(err)?;
        let not_useful: i64 = row.try_get("not_useful").map_err(err)?;
        Ok(FeedbackStats { useful: useful.max(0) as u64, not_useful: not_useful.max(0) as u64 })
    }

    async fn get_feedback_similarity_distribution(&self, days: u32) -> Result<Vec<f64>> {
        let rows = sqlx::query(
            "SELECT (details_json->>'similarity')::double precision AS similarity FROM audit_log \
             WHERE action = 'feedback' AND timestamp >= NOW() - ($1 || ' days')::interval \
             AND details_json ? 'similarity'",
        )
        .bind(i64::from(days))
        .fetch_all(&self.pool)
        .await
        .map_err(err)?;
        rows.into_iter().map(|row| row.try_get::<f64, _>("similarity").map_err(err)).collect()
    }

    async fn get_action_counts(&self, days: u32) -> Result<HashMap<String, u64>> {
        let rows = sqlx::query("SELECT action, COUNT(*) AS n FROM audit_log WHERE timestamp >= NOW() - ($1 || ' days')::interval GROUP BY action")
            .bind(i64::from(days))
            .fetch_all(&self.pool)
            .await
            .map_err(err)?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let action: String = row.try_get("action").map_err(err)?;
            let n: i64 = row.try_get("n").map_err(err)?;
            out.insert(action, n.max(0) as u64);
        }
        Ok(out)
    }

    async fn get_noisy_memories(&self, min_negative: u64, days: u32) -> Result<Vec<MemoryId>> {
        let rows = sqlx::query(
            "SELECT memory_id, COUNT(*) AS n FROM audit_log \
             WHERE action = 'feedback' AND (details_json->>'useful')::boolean = FALSE \
             AND timestamp >= NOW() - ($1 || ' days')::interval AND memory_id IS NOT NULL \
             GROUP BY memory_id HAVING COUNT(*) >= $2",
        )
        .bind(i64::from(days))
        .bind(min_negative as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(err)?;
        rows.into_iter().map(|row| row.try_get::<String, _>("memory_id").map(MemoryId).map_err(err)).collect()
    }

    async fn get_feedback_starved_memories(&self, min_accesses: u64) -> Result<Vec<MemoryId>> {
        // `access_count` lives in the vector store, not the row store
        // (spec.md §9 open question #2: this op's contract isn't shown in
        // the source snippets). We approximate "accessed but never
        // feedback-scored" using the audit trail alone: memories with at
        // least `min_accesses` non-feedback audit rows and zero feedback
        // rows. Callers that need the vector store's exact access_count
        // should cross-reference it themselves.
        let rows = sqlx::query(
            "SELECT a.memory_id FROM audit_log a \
             WHERE a.memory_id IS NOT NULL AND a.action != 'feedback' \
             GROUP BY a.memory_id \
             HAVING COUNT(*) >= $1 \
             AND a.memory_id NOT IN (SELECT memory_id FROM audit_log WHERE action = 'feedback' AND memory_id IS NOT NULL)",
        )
        .bind(min_accesses as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(err)?;
        rows.into_iter().map(|row| row.try_get::<String, _>("memory_id").map(MemoryId).map_err(err)).collect()
    }

    async fn get_importance_timeline(&self, id: &MemoryId) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let rows = sqlx::query(
            "SELECT timestamp, (details_json->>'new_importance')::double precision AS importance FROM audit_log \
             WHERE memory_id = $1 AND details_json ? 'new_importance' ORDER BY timestamp ASC",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(err)?;
        rows.into_iter()
            .map(|row| {
                let ts: DateTime<Utc> = row.try_get("timestamp").map_err(err)?;
                let importance: f64 = row.try_get("importance").map_err(err)?;
                Ok((ts, importance))
            })
            .collect()
    }

    async fn archive_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO session_archive \
                (session_id, started_at, ended_at, working_directory, current_task, memories_created, memories_retrieved, signals_detected, archived_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (session_id) DO UPDATE SET \
                ended_at = EXCLUDED.ended_at, \
                memories_created = EXCLUDED.memories_created, \
                memories_retrieved = EXCLUDED.memories_retrieved, \
                signals_detected = EXCLUDED.signals_detected, \
                archived_at = EXCLUDED.archived_at",
        )
        .bind(&session.id)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(&session.working_directory)
        .bind(&session.current_task)
        .bind(session.counters.memories_created as i64)
        .bind(session.counters.memories_retrieved as i64)
        .bind(session.counters.signals_detected as i64)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(err)?;
        Ok(())
    }

    async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query("INSERT INTO users (id, username, api_key, display_name, is_admin, created_at, last_active_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.api_key)
            .bind(&user.display_name)
            .bind(user.is_admin)
            .bind(user.created_at)
            .bind(user.last_active_at)
            .execute(&self.pool)
            .await
            .map_err(err)?;
        Ok(())
    }

    async fn get_user_by_api_key(&self, api_key: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE api_key = $1").bind(api_key).fetch_optional(&self.pool).await.map_err(err)?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY created_at ASC").fetch_all(&self.pool).await.map_err(err)?;
        rows.iter().map(Self::row_to_user).collect()
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&self.pool).await.map_err(err)?;
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query("SELECT * FROM audit_log ORDER BY timestamp DESC LIMIT $1").bind(limit as i64).fetch_all(&self.pool).await.map_err(err)?;
        rows.iter().map(Self::row_to_audit).collect()
    }
}
