//! Storage port traits. Concrete adapters live in sibling crates
//! (`do-memory-storage-qdrant`, `do-memory-storage-neo4j`,
//! `do-memory-storage-postgres`, `do-memory-storage-redis`); pure in-memory
//! fakes live in `do-memory-test-utils`.
//!
//! Generalized from the teacher's `StorageBackend` trait
//! (`memory-core/src/storage/mod.rs`) into the four ports spec.md §4.2-§4.5
//! names explicitly.

use crate::error::Result;
use crate::ids::MemoryId;
use crate::types::{AntiPattern, AuditEntry, Durability, Fact, Memory, MemoryType, Relationship, RelationshipType, Session};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Filters applied to a vector-store search (spec.md §4.2).
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub memory_types: Option<Vec<MemoryType>>,
    pub domains: Option<Vec<String>>,
    pub min_importance: Option<f64>,
    pub session_id: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub username: Option<String>,
    pub include_superseded: bool,
}

/// A single vector search hit: id, cosine similarity, and the stored
/// payload reconstructed as a [`Memory`].
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: MemoryId,
    pub similarity: f64,
    pub memory: Memory,
}

/// Result of a `store` call: whether a new point was created or an
/// existing one (by content hash) was returned.
#[derive(Debug, Clone)]
pub struct StoreOutcome {
    pub id: MemoryId,
    pub created: bool,
}

/// Cosine-ANN vector store over three logical collections: main memories,
/// facts, and anti-patterns (spec.md §4.2).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert a memory. Checks `find_by_content_hash` first; on hit returns
    /// `created=false` with the existing id and performs no write.
    async fn store(&self, memory: &Memory, embedding: &[f32]) -> Result<StoreOutcome>;

    async fn get(&self, id: &MemoryId) -> Result<Option<(Vec<f32>, Memory)>>;

    async fn search(&self, embedding: &[f32], limit: usize, filters: &SearchFilters) -> Result<Vec<VectorHit>>;

    /// Scroll all points (never by ANN, to avoid sampling bias — used by
    /// the decay and consolidation workers).
    async fn scroll_all(&self, include_superseded: bool, with_vectors: bool) -> Result<Vec<(Memory, Option<Vec<f32>>)>>;

    async fn scroll_time_range(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        domain: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Memory>>;

    async fn update_importance(&self, id: &MemoryId, importance: f64) -> Result<()>;

    async fn update_access(&self, id: &MemoryId, access_count: u64, last_accessed: DateTime<Utc>) -> Result<()>;

    async fn mark_superseded(&self, id: &MemoryId, superseded_by: &MemoryId) -> Result<()>;

    /// Sets or clears the pin flag (spec.md §4.15); pinned memories are
    /// immune to decay regardless of durability tier.
    async fn set_pinned(&self, id: &MemoryId, pinned: bool) -> Result<()>;

    /// Changes a memory's durability tier (spec.md §4.15).
    async fn set_durability(&self, id: &MemoryId, durability: Durability) -> Result<()>;

    async fn delete(&self, id: &MemoryId) -> Result<()>;

    async fn count(&self) -> Result<u64>;

    async fn count_pinned(&self) -> Result<u64>;

    async fn count_facts(&self) -> Result<u64>;

    /// Histogram-ready raw importance values across all non-superseded
    /// memories, for the health dashboard.
    async fn get_importance_distribution(&self) -> Result<Vec<f64>>;

    async fn find_by_content_hash(&self, content_hash: &str) -> Result<Option<MemoryId>>;

    async fn store_fact(&self, fact: &Fact, embedding: &[f32]) -> Result<()>;

    async fn search_facts(&self, embedding: &[f32], limit: usize) -> Result<Vec<(Fact, f64)>>;

    async fn create_anti_pattern(&self, anti_pattern: &AntiPattern, embedding: &[f32]) -> Result<()>;

    async fn get_anti_pattern(&self, id: &MemoryId) -> Result<Option<AntiPattern>>;

    async fn delete_anti_pattern(&self, id: &MemoryId) -> Result<()>;

    async fn increment_triggered(&self, id: &MemoryId) -> Result<()>;

    async fn search_anti_patterns(&self, embedding: &[f32], limit: usize, min_similarity: f64) -> Result<Vec<(AntiPattern, f64)>>;
}

/// A reached node from graph expansion, carrying the chain of edge
/// strengths from the seed so spreading activation can be computed.
#[derive(Debug, Clone)]
pub struct GraphNeighbor {
    pub id: MemoryId,
    pub memory_type: MemoryType,
    pub domain: String,
    pub importance: f64,
    pub distance: u32,
    pub rel_strengths: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct GraphStatistics {
    pub node_count: u64,
    pub edge_count: u64,
}

/// Typed-edge graph store (spec.md §4.3). Edge-type strings must be
/// validated identifier-safe (`^[A-Z_][A-Z0-9_]*$`) before being templated
/// into the underlying query language; depth parameters are clamped
/// server-side by implementations.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Idempotent upsert of a memory node.
    async fn create_memory_node(&self, memory: &Memory) -> Result<()>;

    async fn create_relationship(&self, relationship: &Relationship) -> Result<()>;

    /// Adds or increments a `related_to` edge weight, clamped to `[0,1]`.
    async fn strengthen_relationship(&self, source: &MemoryId, target: &MemoryId, increment: f64) -> Result<()>;

    async fn find_related(
        &self,
        id: &MemoryId,
        types: Option<&[RelationshipType]>,
        max_depth: u32,
        limit: usize,
    ) -> Result<Vec<GraphNeighbor>>;

    /// Shortest undirected path, depth clamped to `[1,15]`.
    async fn find_path(&self, src: &MemoryId, dst: &MemoryId, max_depth: u32) -> Result<Option<Vec<MemoryId>>>;

    async fn get_subgraph(&self, ids: &[MemoryId]) -> Result<(Vec<Memory>, Vec<Relationship>)>;

    /// Endpoint pairs within `ids` joined by a `contradicts` edge.
    async fn find_contradictions(&self, ids: &[MemoryId]) -> Result<Vec<(MemoryId, MemoryId)>>;

    /// Sum of `related_to` edge strengths incident to each id (decay
    /// floor input).
    async fn get_bulk_edge_strengths(&self, ids: &[MemoryId]) -> Result<std::collections::HashMap<MemoryId, f64>>;

    async fn get_high_gravity_memories(&self, min_strength: f64) -> Result<Vec<(MemoryId, f64)>>;

    async fn get_avg_edge_strength(&self) -> Result<f64>;

    async fn get_relationships_for_memory(&self, id: &MemoryId) -> Result<Vec<Relationship>>;

    async fn mark_superseded(&self, id: &MemoryId, superseded_by: &MemoryId) -> Result<()>;

    async fn update_importance(&self, id: &MemoryId, importance: f64) -> Result<()>;

    /// Sets or clears the pin flag, mirroring the vector store's copy of
    /// the payload (spec.md §4.15).
    async fn set_pinned(&self, id: &MemoryId, pinned: bool) -> Result<()>;

    /// Changes a memory's durability tier, mirroring the vector store's
    /// copy of the payload (spec.md §4.15).
    async fn set_durability(&self, id: &MemoryId, durability: Durability) -> Result<()>;

    async fn delete_memory(&self, id: &MemoryId) -> Result<()>;

    async fn get_statistics(&self) -> Result<GraphStatistics>;
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackStats {
    pub useful: u64,
    pub not_useful: u64,
}

impl FeedbackStats {
    #[must_use]
    pub fn useful_ratio(&self) -> Option<f64> {
        let total = self.useful + self.not_useful;
        if total == 0 {
            None
        } else {
            Some(self.useful as f64 / total as f64)
        }
    }
}

/// Durable row store: users, audit log, session archive, metric snapshots
/// (spec.md §4.4). Writes are fire-and-forget; reads surface backend
/// errors.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn log_audit(&self, entry: &AuditEntry) -> Result<()>;

    async fn get_feedback_for_memory(&self, id: &MemoryId) -> Result<FeedbackStats>;

    async fn get_all_memory_feedback_stats(&self) -> Result<std::collections::HashMap<MemoryId, FeedbackStats>>;

    async fn get_feedback_stats(&self, days: u32) -> Result<FeedbackStats>;

    async fn get_feedback_similarity_distribution(&self, days: u32) -> Result<Vec<f64>>;

    async fn get_action_counts(&self, days: u32) -> Result<std::collections::HashMap<String, u64>>;

    async fn get_noisy_memories(&self, min_negative: u64, days: u32) -> Result<Vec<MemoryId>>;

    async fn get_feedback_starved_memories(&self, min_accesses: u64) -> Result<Vec<MemoryId>>;

    async fn get_importance_timeline(&self, id: &MemoryId) -> Result<Vec<(DateTime<Utc>, f64)>>;

    async fn archive_session(&self, session: &Session) -> Result<()>;

    async fn create_user(&self, user: &crate::types::User) -> Result<()>;

    async fn get_user_by_api_key(&self, api_key: &str) -> Result<Option<crate::types::User>>;

    async fn list_users(&self) -> Result<Vec<crate::types::User>>;

    async fn delete_user(&self, id: &str) -> Result<()>;

    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>>;
}

/// Namespaced ephemeral KV/list/stream store (spec.md §4.5): sessions,
/// working memory, turns, pending signals, hot cache, event stream, model
/// weights, dashboard caches.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    async fn set_session(&self, session: &Session, ttl_hours: u64) -> Result<()>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>>;

    async fn end_session(&self, id: &str) -> Result<()>;

    async fn push_working_memory(&self, session_id: &str, memory_id: &MemoryId, limit: usize) -> Result<()>;

    async fn get_working_memory(&self, session_id: &str) -> Result<Vec<MemoryId>>;

    /// Push a new turn (newest at head), capped at `max_stored`.
    async fn push_turn(&self, session_id: &str, turn_json: &str, max_stored: usize) -> Result<()>;

    /// Oldest-first, up to `n` most recent turns.
    async fn get_recent_turns(&self, session_id: &str, n: usize) -> Result<Vec<String>>;

    async fn push_pending_signal(&self, session_id: &str, signal_json: &str) -> Result<()>;

    async fn get_pending_signals(&self, session_id: &str) -> Result<Vec<String>>;

    /// Remove by index using set-to-sentinel + list-remove to avoid index
    /// drift races under concurrent access (spec.md §4.5).
    async fn remove_pending_signal(&self, session_id: &str, index: usize) -> Result<()>;

    async fn cache_memory(&self, memory: &Memory, ttl_secs: u64) -> Result<()>;

    async fn get_cached_memory(&self, id: &MemoryId) -> Result<Option<Memory>>;

    async fn publish_event(&self, event_json: &str, max_len: usize) -> Result<()>;

    async fn get_model_weights(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn set_model_weights(&self, key: &str, value: &serde_json::Value) -> Result<()>;

    async fn get_cached_value(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn set_cached_value(&self, key: &str, value: &serde_json::Value, ttl_secs: u64) -> Result<()>;

    async fn active_session_count(&self) -> Result<u64>;
}

/// Keys used for the two fixed model-weight slots (spec.md §4.5, §4.11).
pub const RERANKER_WEIGHTS_KEY: &str = "ml:reranker_weights";
pub const SIGNAL_CLASSIFIER_WEIGHTS_KEY: &str = "ml:signal_classifier_weights";

/// Durability total order used by consolidation's `max(durability)`
/// aggregation (spec.md §4.8, §9 open question #4).
#[must_use]
pub fn max_durability(a: Durability, b: Durability) -> Durability {
    if a > b {
        a
    } else {
        b
    }
}
