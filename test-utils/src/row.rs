//! In-memory [`RowStore`] fake: audit log, per-memory feedback tallies,
//! users, archived sessions, all behind a single mutex.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use do_memory_core::error::Result;
use do_memory_core::storage::{FeedbackStats, RowStore};
use do_memory_core::{AuditEntry, MemoryId, Session, User};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
    audit: Vec<AuditEntry>,
    feedback: HashMap<MemoryId, FeedbackStats>,
    sessions: Vec<Session>,
    users: Vec<User>,
    importance_timeline: HashMap<MemoryId, Vec<(DateTime<Utc>, f64)>>,
}

/// In-memory [`RowStore`]. Test code may push directly into
/// [`InMemoryRowStore::record_feedback`] to seed feedback counts without
/// going through the full feedback service.
#[derive(Default)]
pub struct InMemoryRowStore {
    inner: Mutex<Inner>,
}

impl InMemoryRowStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed feedback counters directly, bypassing audit logging.
    pub fn record_feedback(&self, id: &MemoryId, useful: bool) {
        let mut inner = self.inner.lock();
        let stats = inner.feedback.entry(id.clone()).or_default();
        if useful {
            stats.useful += 1;
        } else {
            stats.not_useful += 1;
        }
    }

    pub fn record_importance(&self, id: &MemoryId, at: DateTime<Utc>, importance: f64) {
        self.inner.lock().importance_timeline.entry(id.clone()).or_default().push((at, importance));
    }
}

#[async_trait]
impl RowStore for InMemoryRowStore {
    async fn log_audit(&self, entry: &AuditEntry) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(action) = entry.action.strip_prefix("feedback:") {
            if let Some(id) = &entry.memory_id {
                let stats = inner.feedback.entry(id.clone()).or_default();
                match action {
                    "useful" => stats.useful += 1,
                    "not_useful" => stats.not_useful += 1,
                    _ => {}
                }
            }
        }
        inner.audit.push(entry.clone());
        Ok(())
    }

    async fn get_feedback_for_memory(&self, id: &MemoryId) -> Result<FeedbackStats> {
        Ok(self.inner.lock().feedback.get(id).cloned().unwrap_or_default())
    }

    async fn get_all_memory_feedback_stats(&self) -> Result<HashMap<MemoryId, FeedbackStats>> {
        Ok(self.inner.lock().feedback.clone())
    }

    async fn get_feedback_stats(&self, _days: u32) -> Result<FeedbackStats> {
        let inner = self.inner.lock();
        let mut total = FeedbackStats::default();
        for stats in inner.feedback.values() {
            total.useful += stats.useful;
            total.not_useful += stats.not_useful;
        }
        Ok(total)
    }

    async fn get_feedback_similarity_distribution(&self, _days: u32) -> Result<Vec<f64>> {
        Ok(Vec::new())
    }

    async fn get_action_counts(&self, _days: u32) -> Result<HashMap<String, u64>> {
        let inner = self.inner.lock();
        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in &inner.audit {
            *counts.entry(entry.action.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn get_noisy_memories(&self, min_negative: u64, _days: u32) -> Result<Vec<MemoryId>> {
        Ok(self.inner.lock().feedback.iter().filter(|(_, s)| s.not_useful >= min_negative).map(|(id, _)| id.clone()).collect())
    }

    async fn get_feedback_starved_memories(&self, min_accesses: u64) -> Result<Vec<MemoryId>> {
        let inner = self.inner.lock();
        Ok(inner
            .feedback
            .keys()
            .filter(|id| inner.feedback.get(*id).map(|s| s.useful + s.not_useful).unwrap_or(0) < min_accesses)
            .cloned()
            .collect())
    }

    async fn get_importance_timeline(&self, id: &MemoryId) -> Result<Vec<(DateTime<Utc>, f64)>> {
        Ok(self.inner.lock().importance_timeline.get(id).cloned().unwrap_or_default())
    }

    async fn archive_session(&self, session: &Session) -> Result<()> {
        self.inner.lock().sessions.push(session.clone());
        Ok(())
    }

    async fn create_user(&self, user: &User) -> Result<()> {
        self.inner.lock().users.push(user.clone());
        Ok(())
    }

    async fn get_user_by_api_key(&self, api_key: &str) -> Result<Option<User>> {
        Ok(self.inner.lock().users.iter().find(|u| u.api_key == api_key).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.inner.lock().users.clone())
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        self.inner.lock().users.retain(|u| u.id != id);
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let inner = self.inner.lock();
        let mut entries = inner.audit.clone();
        entries.sort_by_key(|e| std::cmp::Reverse(e.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }
}
