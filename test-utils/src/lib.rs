//! Pure in-memory fakes of the four storage ports (`do-memory-core`'s
//! `VectorStore`, `GraphStore`, `RowStore`, `EphemeralStore`), plus shared
//! fixture builders, used by `do-memory-core`'s own test suite, the
//! workspace `tests` crate, and the storage adapter crates' contract tests.
//!
//! None of this talks to a real backend: searches are brute-force, graph
//! traversal is BFS over a `Vec` of edges, TTLs are `Instant` deadlines
//! checked lazily. That keeps the whole suite runnable without Qdrant,
//! Neo4j, Postgres, or Redis.

mod ephemeral;
mod fixtures;
mod graph;
mod row;
mod vector;

pub use ephemeral::InMemoryEphemeralStore;
pub use fixtures::{fake_embedding, memory, memory_with_domain, memory_with_type, MemoryFixtureExt};
pub use graph::InMemoryGraphStore;
pub use row::InMemoryRowStore;
pub use vector::InMemoryVectorStore;

use std::sync::Arc;

/// The four fakes wired together, ready to build a
/// `do_memory_core::retrieval::RetrievalPipeline` or any worker against.
pub struct InMemoryBackend {
    pub vector: Arc<InMemoryVectorStore>,
    pub graph: Arc<InMemoryGraphStore>,
    pub row: Arc<InMemoryRowStore>,
    pub ephemeral: Arc<InMemoryEphemeralStore>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self {
            vector: Arc::new(InMemoryVectorStore::new()),
            graph: Arc::new(InMemoryGraphStore::new()),
            row: Arc::new(InMemoryRowStore::new()),
            ephemeral: Arc::new(InMemoryEphemeralStore::new()),
        }
    }
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use do_memory_core::storage::{SearchFilters, VectorStore};

    #[tokio::test]
    async fn store_then_search_round_trips() {
        let store = InMemoryVectorStore::new();
        let mem = memory("rust ownership rules");
        let emb = fake_embedding(8, 1);
        let outcome = store.store(&mem, &emb).await.unwrap();
        assert!(outcome.created);

        let hits = store.search(&emb, 5, &SearchFilters::default()).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, mem.id);
    }

    #[tokio::test]
    async fn store_dedupes_by_content_hash() {
        let store = InMemoryVectorStore::new();
        let mem = memory("same content");
        let emb = fake_embedding(8, 2);
        let first = store.store(&mem, &emb).await.unwrap();
        let mut duplicate = memory("same content");
        duplicate.content_hash = mem.content_hash.clone();
        let second = store.store(&duplicate, &emb).await.unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
    }
}
