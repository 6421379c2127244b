//! Redis-backed [`EphemeralStore`](do_memory_core::storage::EphemeralStore)
//! adapter (spec.md §4.5): sessions, working memory, turn history, pending
//! signals, a hot memory cache, a capped event stream, and the two fixed
//! ML-weight slots, all namespaced under plain string keys.
//!
//! `remove_pending_signal` uses the set-to-sentinel-then-`LREM` trick
//! spec.md calls for explicitly, rather than `LINDEX`/`LSET` alone, so a
//! concurrent push landing between the read and the removal can't shift
//! the wrong element out from under it.

use async_trait::async_trait;
use do_memory_core::error::{Backend, Error, Result};
use do_memory_core::storage::EphemeralStore;
use do_memory_core::{MemoryId, Session};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Sentinel value swapped into a pending-signal list slot immediately
/// before it's removed by value, so the removal can't accidentally match
/// an unrelated list element with the same content.
const TOMBSTONE: &str = "\u{0}__removed__\u{0}";

fn err(e: impl std::fmt::Display) -> Error {
    Error::Unavailable(Backend::Ephemeral, e.to_string())
}

fn session_key(id: &str) -> String {
    format!("session:{id}")
}
fn working_key(id: &str) -> String {
    format!("session:{id}:working")
}
fn turns_key(id: &str) -> String {
    format!("session:{id}:turns")
}
fn pending_key(session_id: &str) -> String {
    format!("signals:pending:{session_id}")
}
fn cache_key(id: &str) -> String {
    format!("cache:{id}")
}
const EVENT_STREAM_KEY: &str = "events:stream";
const EVENT_STREAM_MAX_LEN: usize = 1000;

/// Wraps a `redis::aio::ConnectionManager`, which reconnects transparently
/// and is safe to clone/share across tasks.
pub struct RedisEphemeralStore {
    conn: ConnectionManager,
}

impl RedisEphemeralStore {
    /// # Errors
    /// Returns an error if the client cannot be constructed or the initial
    /// connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(err)?;
        let conn = client.get_connection_manager().await.map_err(err)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl EphemeralStore for RedisEphemeralStore {
    async fn set_session(&self, session: &Session, ttl_hours: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(session)?;
        let ttl_secs = (ttl_hours * 3600).max(1);
        let () = conn.set_ex(session_key(&session.id), json, ttl_secs).await.map_err(err)?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(session_key(id)).await.map_err(err)?;
        raw.map(|s| serde_json::from_str(&s).map_err(Error::from)).transpose()
    }

    async fn end_session(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let Some(mut session) = self.get_session(id).await? else { return Ok(()) };
        session.ended_at = Some(chrono::Utc::now());
        let ttl: i64 = conn.ttl(session_key(id)).await.map_err(err)?;
        let json = serde_json::to_string(&session)?;
        if ttl > 0 {
            let () = conn.set_ex(session_key(id), json, ttl as u64).await.map_err(err)?;
        } else {
            let () = conn.set(session_key(id), json).await.map_err(err)?;
        }
        Ok(())
    }

    async fn push_working_memory(&self, session_id: &str, memory_id: &MemoryId, limit: usize) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = working_key(session_id);
        let () = conn.lpush(&key, memory_id.as_str()).await.map_err(err)?;
        let () = conn.ltrim(&key, 0, limit.saturating_sub(1) as isize).await.map_err(err)?;
        let ttl: i64 = conn.ttl(session_key(session_id)).await.map_err(err)?;
        if ttl > 0 {
            let _: bool = conn.expire(&key, ttl).await.map_err(err)?;
        }
        Ok(())
    }

    async fn get_working_memory(&self, session_id: &str) -> Result<Vec<MemoryId>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(working_key(session_id), 0, -1).await.map_err(err)?;
        Ok(raw.into_iter().map(MemoryId).collect())
    }

    async fn push_turn(&self, session_id: &str, turn_json: &str, max_stored: usize) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = turns_key(session_id);
        let () = conn.lpush(&key, turn_json).await.map_err(err)?;
        let () = conn.ltrim(&key, 0, max_stored.saturating_sub(1) as isize).await.map_err(err)?;
        Ok(())
    }

    async fn get_recent_turns(&self, session_id: &str, n: usize) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        // Stored newest-at-head; take the n newest then reverse to
        // chronological (oldest-first) order, per spec.md §4.5.
        let mut raw: Vec<String> = conn.lrange(turns_key(session_id), 0, n.saturating_sub(1) as isize).await.map_err(err)?;
        raw.reverse();
        Ok(raw)
    }

    async fn push_pending_signal(&self, session_id: &str, signal_json: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn.rpush(pending_key(session_id), signal_json).await.map_err(err)?;
        Ok(())
    }

    async fn get_pending_signals(&self, session_id: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(pending_key(session_id), 0, -1).await.map_err(err)?;
        Ok(raw.into_iter().filter(|s| s != TOMBSTONE).collect())
    }

    async fn remove_pending_signal(&self, session_id: &str, index: usize) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = pending_key(session_id);
        let result: redis::RedisResult<()> = conn.lset(&key, index as isize, TOMBSTONE).await;
        if result.is_err() {
            // Index out of range (already removed, or a race): nothing to do.
            return Ok(());
        }
        let _removed: i64 = conn.lrem(&key, 1, TOMBSTONE).await.map_err(err)?;
        Ok(())
    }

    async fn cache_memory(&self, memory: &do_memory_core::Memory, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(memory)?;
        let () = conn.set_ex(cache_key(memory.id.as_str()), json, ttl_secs.max(1)).await.map_err(err)?;
        Ok(())
    }

    async fn get_cached_memory(&self, id: &MemoryId) -> Result<Option<do_memory_core::Memory>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(cache_key(id.as_str())).await.map_err(err)?;
        raw.map(|s| serde_json::from_str(&s).map_err(Error::from)).transpose()
    }

    async fn publish_event(&self, event_json: &str, max_len: usize) -> Result<()> {
        let mut conn = self.conn.clone();
        let () = conn.lpush(EVENT_STREAM_KEY, event_json).await.map_err(err)?;
        let cap = if max_len == 0 { EVENT_STREAM_MAX_LEN } else { max_len };
        let () = conn.ltrim(EVENT_STREAM_KEY, 0, cap.saturating_sub(1) as isize).await.map_err(err)?;
        // Best-effort fan-out to live subscribers; the capped list above is
        // the durable record new readers replay from.
        let _: redis::RedisResult<i64> = redis::cmd("PUBLISH").arg("events:pubsub").arg(event_json).query_async(&mut conn).await;
        Ok(())
    }

    async fn get_model_weights(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.get_cached_value(key).await
    }

    async fn set_model_weights(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(value)?;
        let () = conn.set(key, json).await.map_err(err)?;
        Ok(())
    }

    async fn get_cached_value(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(err)?;
        raw.map(|s| serde_json::from_str(&s).map_err(Error::from)).transpose()
    }

    async fn set_cached_value(&self, key: &str, value: &serde_json::Value, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(value)?;
        if ttl_secs == 0 {
            let () = conn.set(key, json).await.map_err(err)?;
        } else {
            let () = conn.set_ex(key, json, ttl_secs).await.map_err(err)?;
        }
        Ok(())
    }

    async fn active_session_count(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut count = 0u64;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) =
                redis::cmd("SCAN").arg(cursor).arg("MATCH").arg("session:*").arg("COUNT").arg(200).query_async(&mut conn).await.map_err(err)?;
            count += keys.iter().filter(|k| !k.ends_with(":working") && !k.ends_with(":turns")).count() as u64;
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_keys_match_spec() {
        assert_eq!(session_key("abc"), "session:abc");
        assert_eq!(working_key("abc"), "session:abc:working");
        assert_eq!(turns_key("abc"), "session:abc:turns");
        assert_eq!(pending_key("abc"), "signals:pending:abc");
        assert_eq!(cache_key("01HX"), "cache:01HX");
    }
}
