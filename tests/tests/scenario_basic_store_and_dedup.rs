//! Scenarios 1-2 (spec.md §8): store then search; dedup-at-write.

mod common;

use common::Harness;
use do_memory_core::embeddings::EmbedKind;
use do_memory_core::retrieval::MemoryQuery;
use do_memory_core::storage::{GraphStore, VectorStore};
use do_memory_core::{Memory, MemorySource, MemoryType};

#[tokio::test]
async fn basic_store_then_search() {
    let harness = Harness::new();
    let content = "PostgreSQL runs on port 5433 in this project.";

    let mut memory = Memory::new(content, MemoryType::Semantic, MemorySource::User, "database");
    memory.importance = 0.7;
    let embedding = harness.embeddings.embed(content, EmbedKind::Passage).await.unwrap();
    let outcome = harness.backend.vector.store(&memory, &embedding).await.unwrap();
    assert!(outcome.created);
    harness.backend.graph.create_memory_node(&memory).await.unwrap();

    let pipeline = harness.pipeline();
    let query = MemoryQuery { text: Some("What port does Postgres use here?".to_string()), limit: 5, ..Default::default() };
    let results = pipeline.retrieve(query, false).await.unwrap();

    assert!(!results.is_empty());
    let top = &results[0];
    assert_eq!(top.memory.content, content);
    assert!(top.similarity > 0.3, "similarity was {}", top.similarity);
    assert_eq!(top.graph_distance, 0);
}

#[tokio::test]
async fn dedup_at_write_returns_same_id() {
    let harness = Harness::new();
    let content = "PostgreSQL runs on port 5433 in this project.";

    let first = Memory::new(content, MemoryType::Semantic, MemorySource::User, "database");
    let embedding = harness.embeddings.embed(content, EmbedKind::Passage).await.unwrap();
    let first_outcome = harness.backend.vector.store(&first, &embedding).await.unwrap();
    assert!(first_outcome.created);

    let second = Memory::new(content, MemoryType::Semantic, MemorySource::User, "database");
    let second_outcome = harness.backend.vector.store(&second, &embedding).await.unwrap();

    assert!(!second_outcome.created);
    assert_eq!(first_outcome.id, second_outcome.id);
    assert_eq!(harness.backend.vector.count().await.unwrap(), 1);
}
