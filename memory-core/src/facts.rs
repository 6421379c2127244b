//! Fact extractor: decomposes a stored memory into 1-5 atomic, independently
//! embedded facts (spec.md §4.13), ported from
//! `original_source/src/core/fact_extractor.py`.
//!
//! Runs as a detached background task per memory store, throttled globally
//! by a semaphore so a burst of stores doesn't fan out unbounded LLM calls.

use crate::embeddings::{EmbedKind, EmbeddingService};
use crate::ids::MemoryId;
use crate::llm::{GenerateOptions, LlmClient};
use crate::storage::VectorStore;
use crate::types::Fact;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Global concurrency cap on in-flight fact extractions (spec.md §4.13:
/// "at most one extraction in flight at a time" in the reference
/// deployment; kept configurable here rather than hardcoded to 1).
const DEFAULT_DELAY: Duration = Duration::from_secs(2);

const PROMPT_TEMPLATE: &str = r#"Decompose the following memory into 1 to 5 atomic, independently-meaningful facts. Each fact must stand alone without the others for context.

Memory:
{content}

Return a JSON array of strings, each one atomic fact. Return ONLY the JSON array."#;

pub struct FactExtractor {
    vectors: Arc<dyn VectorStore>,
    embeddings: Arc<EmbeddingService>,
    llm: Arc<dyn LlmClient>,
    semaphore: Arc<Semaphore>,
    delay: Duration,
}

impl FactExtractor {
    #[must_use]
    pub fn new(vectors: Arc<dyn VectorStore>, embeddings: Arc<EmbeddingService>, llm: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self { vectors, embeddings, llm, semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))), delay: DEFAULT_DELAY }
    }

    /// Spawns the extraction as a detached task; callers don't await
    /// completion (spec.md §4.13 step 1: "runs ~2s after store, off the
    /// request path").
    pub fn spawn(self: &Arc<Self>, parent_id: MemoryId, content: String, domain: String) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(parent_id, content, domain).await;
        });
    }

    async fn run(&self, parent_id: MemoryId, content: String, domain: String) {
        tokio::time::sleep(self.delay).await;

        let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
            return;
        };
        let _permit = permit;

        let facts = match self.extract(&content).await {
            Ok(facts) => facts,
            Err(err) => {
                tracing::warn!(memory_id = %parent_id, error = %err, "fact extraction failed");
                return;
            }
        };

        for (index, fact_content) in facts.into_iter().enumerate() {
            let embedding = match self.embeddings.embed(&fact_content, EmbedKind::Passage).await {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(memory_id = %parent_id, error = %err, "fact embedding failed");
                    continue;
                }
            };
            let fact = Fact { parent_id: parent_id.clone(), fact_index: index as u32, content: fact_content, domain: domain.clone() };
            if let Err(err) = self.vectors.store_fact(&fact, &embedding).await {
                tracing::warn!(memory_id = %parent_id, error = %err, "fact store failed");
            }
        }
    }

    async fn extract(&self, content: &str) -> crate::error::Result<Vec<String>> {
        let prompt = PROMPT_TEMPLATE.replace("{content}", content);
        let options = GenerateOptions { temperature: 0.1, json_mode: true, dormant_think: true };
        let raw = self.llm.generate(&prompt, options).await?;

        let trimmed = raw.trim().strip_prefix("```json").or_else(|| raw.trim().strip_prefix("```")).unwrap_or(raw.trim());
        let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();

        let value: Value = serde_json::from_str(trimmed)?;
        let facts = value
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_str).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect::<Vec<_>>())
            .unwrap_or_default();

        Ok(facts.into_iter().take(5).collect())
    }
}
