//! Scenario 8 (spec.md §8): a stored anti-pattern surfaces as a synthetic
//! "WARNING: " result tagged `is_anti_pattern` when a matching query runs.

mod common;

use common::Harness;
use do_memory_core::embeddings::EmbedKind;
use do_memory_core::retrieval::MemoryQuery;
use do_memory_core::storage::VectorStore;
use do_memory_core::types::Severity;
use do_memory_core::{AntiPattern, MemoryId};

#[tokio::test]
async fn anti_pattern_surfaces_as_warning_result() {
    let harness = Harness::new();

    let pattern_text = "using eval on untrusted user input";
    let anti_pattern = AntiPattern {
        id: MemoryId::generate(),
        pattern: pattern_text.to_string(),
        warning: "this allows arbitrary code execution".to_string(),
        alternative: Some("use a safe parser instead".to_string()),
        severity: Severity::Error,
        domain: "security".to_string(),
        tags: vec!["security".to_string()],
        times_triggered: 0,
    };

    let embedding = harness.embeddings.embed(pattern_text, EmbedKind::Passage).await.unwrap();
    harness.backend.vector.create_anti_pattern(&anti_pattern, &embedding).await.unwrap();

    let pipeline = harness.pipeline();
    let query = MemoryQuery { text: Some(pattern_text.to_string()), limit: 10, ..Default::default() };
    let results = pipeline.retrieve(query, true).await.unwrap();

    let hit = results.iter().find(|r| r.memory.id == anti_pattern.id).expect("anti-pattern should surface");
    assert!(hit.memory.content.starts_with("WARNING: "), "content was {}", hit.memory.content);
    assert!(hit.memory.content.contains(&anti_pattern.warning));
    assert!(hit.memory.is_anti_pattern());
}
