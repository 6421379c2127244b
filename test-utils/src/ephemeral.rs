//! In-memory [`EphemeralStore`] fake. TTLs are tracked with
//! [`std::time::Instant`] deadlines and checked lazily on read, mirroring a
//! real Redis `EXPIRE` without a background sweeper.

use async_trait::async_trait;
use do_memory_core::error::Result;
use do_memory_core::storage::EphemeralStore;
use do_memory_core::{Memory, MemoryId, Session};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Expiring<T> {
    value: T,
    deadline: Option<Instant>,
}

impl<T> Expiring<T> {
    fn fresh(value: T, ttl: Option<Duration>) -> Self {
        Self { value, deadline: ttl.map(|d| Instant::now() + d) }
    }

    fn live(&self) -> bool {
        self.deadline.is_none_or(|d| Instant::now() < d)
    }
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Expiring<Session>>,
    working_memory: HashMap<String, Vec<MemoryId>>,
    turns: HashMap<String, Vec<String>>,
    pending_signals: HashMap<String, Vec<String>>,
    memory_cache: HashMap<MemoryId, Expiring<Memory>>,
    events: Vec<String>,
    model_weights: HashMap<String, serde_json::Value>,
    cached_values: HashMap<String, Expiring<serde_json::Value>>,
}

/// In-memory [`EphemeralStore`].
#[derive(Default)]
pub struct InMemoryEphemeralStore {
    inner: Mutex<Inner>,
}

impl InMemoryEphemeralStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EphemeralStore for InMemoryEphemeralStore {
    async fn set_session(&self, session: &Session, ttl_hours: u64) -> Result<()> {
        self.inner.lock().sessions.insert(session.id.clone(), Expiring::fresh(session.clone(), Some(Duration::from_secs(ttl_hours * 3600))));
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.inner.lock().sessions.get(id).filter(|e| e.live()).map(|e| e.value.clone()))
    }

    async fn end_session(&self, id: &str) -> Result<()> {
        self.inner.lock().sessions.remove(id);
        Ok(())
    }

    async fn push_working_memory(&self, session_id: &str, memory_id: &MemoryId, limit: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let list = inner.working_memory.entry(session_id.to_string()).or_default();
        list.retain(|id| id != memory_id);
        list.insert(0, memory_id.clone());
        list.truncate(limit);
        Ok(())
    }

    async fn get_working_memory(&self, session_id: &str) -> Result<Vec<MemoryId>> {
        Ok(self.inner.lock().working_memory.get(session_id).cloned().unwrap_or_default())
    }

    async fn push_turn(&self, session_id: &str, turn_json: &str, max_stored: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let list = inner.turns.entry(session_id.to_string()).or_default();
        list.insert(0, turn_json.to_string());
        list.truncate(max_stored);
        Ok(())
    }

    async fn get_recent_turns(&self, session_id: &str, n: usize) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        let mut turns: Vec<String> = inner.turns.get(session_id).cloned().unwrap_or_default().into_iter().take(n).collect();
        turns.reverse();
        Ok(turns)
    }

    async fn push_pending_signal(&self, session_id: &str, signal_json: &str) -> Result<()> {
        self.inner.lock().pending_signals.entry(session_id.to_string()).or_default().push(signal_json.to_string());
        Ok(())
    }

    async fn get_pending_signals(&self, session_id: &str) -> Result<Vec<String>> {
        Ok(self.inner.lock().pending_signals.get(session_id).cloned().unwrap_or_default())
    }

    async fn remove_pending_signal(&self, session_id: &str, index: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(list) = inner.pending_signals.get_mut(session_id) {
            if index < list.len() {
                list.remove(index);
            }
        }
        Ok(())
    }

    async fn cache_memory(&self, memory: &Memory, ttl_secs: u64) -> Result<()> {
        self.inner.lock().memory_cache.insert(memory.id.clone(), Expiring::fresh(memory.clone(), Some(Duration::from_secs(ttl_secs))));
        Ok(())
    }

    async fn get_cached_memory(&self, id: &MemoryId) -> Result<Option<Memory>> {
        Ok(self.inner.lock().memory_cache.get(id).filter(|e| e.live()).map(|e| e.value.clone()))
    }

    async fn publish_event(&self, event_json: &str, max_len: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.events.push(event_json.to_string());
        let overflow = inner.events.len().saturating_sub(max_len);
        if overflow > 0 {
            inner.events.drain(0..overflow);
        }
        Ok(())
    }

    async fn get_model_weights(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.inner.lock().model_weights.get(key).cloned())
    }

    async fn set_model_weights(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.inner.lock().model_weights.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn get_cached_value(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.inner.lock().cached_values.get(key).filter(|e| e.live()).map(|e| e.value.clone()))
    }

    async fn set_cached_value(&self, key: &str, value: &serde_json::Value, ttl_secs: u64) -> Result<()> {
        self.inner.lock().cached_values.insert(key.to_string(), Expiring::fresh(value.clone(), Some(Duration::from_secs(ttl_secs))));
        Ok(())
    }

    async fn active_session_count(&self) -> Result<u64> {
        Ok(self.inner.lock().sessions.values().filter(|e| e.live()).count() as u64)
    }
}
