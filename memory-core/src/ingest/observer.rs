//! Observer ingest: extracts reusable facts from a file-change notification
//! and stores them as low-importance system memories (spec.md §4.14),
//! ported from `original_source/src/workers/observer.py`.
//!
//! Invoked as a fire-and-forget background task from the file-change
//! endpoint; every failure is caught and logged rather than surfaced.

use crate::domains::normalize_domain;
use crate::embeddings::{EmbedKind, EmbeddingService};
use crate::ids::content_hash;
use crate::llm::{GenerateOptions, LlmClient};
use crate::storage::{GraphStore, VectorStore};
use crate::types::{Durability, Memory, MemorySource, MemoryType};
use serde_json::Value;
use std::sync::Arc;

const MAX_FACTS_PER_OBSERVATION: usize = 5;
const MIN_FACT_LEN: usize = 10;
const OBSERVER_IMPORTANCE: f64 = 0.4;
const OBSERVER_CONFIDENCE: f64 = 0.6;

const OBSERVER_PROMPT: &str = r#"Analyze this code change and extract facts worth remembering long-term.

File: {file_path}
Change type: {tool_name}
{change_description}

Extract ONLY concrete, reusable facts:
- Configuration values (ports, URLs, paths, credential patterns)
- Architectural decisions visible in the code
- API endpoints being created/modified
- Bug fixes and what caused them
- Dependencies and their usage patterns

Skip: variable names, obvious code, temporary debug changes, formatting-only changes.

Return JSON array: [{"fact": "...", "domain": "...", "tags": ["..."]}]
Return [] if nothing worth remembering."#;

/// A single file-change notification (spec.md §4.14: `/observe/file-change`
/// endpoint payload shape).
#[derive(Debug, Clone)]
pub struct FileChangeObservation {
    pub file_path: String,
    pub tool_name: String,
    pub old_string: Option<String>,
    pub new_string: Option<String>,
    pub content: Option<String>,
}

impl FileChangeObservation {
    fn change_description(&self) -> Option<String> {
        if self.tool_name == "Edit" {
            if let (Some(old), Some(new)) = (&self.old_string, &self.new_string) {
                let old: String = old.chars().take(2000).collect();
                let new: String = new.chars().take(2000).collect();
                return Some(format!("Replaced:\n```\n{old}\n```\nWith:\n```\n{new}\n```"));
            }
        }
        self.content.as_ref().map(|content| {
            let truncated: String = content.chars().take(3000).collect();
            format!("File content (truncated):\n```\n{truncated}\n```")
        })
    }
}

pub struct ObserverIngestor {
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    embeddings: Arc<EmbeddingService>,
    llm: Arc<dyn LlmClient>,
}

impl ObserverIngestor {
    #[must_use]
    pub fn new(vectors: Arc<dyn VectorStore>, graph: Arc<dyn GraphStore>, embeddings: Arc<EmbeddingService>, llm: Arc<dyn LlmClient>) -> Self {
        Self { vectors, graph, embeddings, llm }
    }

    /// Spawns extraction as a detached task; the caller's endpoint returns
    /// immediately.
    pub fn spawn(self: &Arc<Self>, observation: FileChangeObservation) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = this.run(&observation).await {
                tracing::error!(file = %observation.file_path, error = %err, "observer extraction failed");
            }
        });
    }

    async fn run(&self, observation: &FileChangeObservation) -> crate::error::Result<usize> {
        let Some(change_description) = observation.change_description() else {
            tracing::debug!(file = %observation.file_path, "observer: no content to analyze");
            return Ok(0);
        };

        let prompt = OBSERVER_PROMPT
            .replace("{file_path}", &observation.file_path)
            .replace("{tool_name}", &observation.tool_name)
            .replace("{change_description}", &change_description);

        let options = GenerateOptions { temperature: 0.2, json_mode: true, dormant_think: true };
        let raw = match self.llm.generate(&prompt, options).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "observer: llm call failed");
                return Ok(0);
            }
        };

        let facts = parse_facts(&raw);
        if facts.is_empty() {
            tracing::debug!(file = %observation.file_path, "observer: no facts extracted");
            return Ok(0);
        }

        let mut stored = 0;
        for fact in facts.into_iter().take(MAX_FACTS_PER_OBSERVATION) {
            if fact.fact.len() < MIN_FACT_LEN {
                continue;
            }

            let hash = content_hash(&fact.fact);
            if self.vectors.find_by_content_hash(&hash).await?.is_some() {
                continue;
            }

            let domain = normalize_domain(&fact.domain);
            let mut tags = vec!["observer".to_string()];
            tags.extend(fact.tags);

            let mut memory = Memory::new(fact.fact, MemoryType::Semantic, MemorySource::System, domain);
            memory.tags = tags;
            memory.importance = OBSERVER_IMPORTANCE;
            memory.initial_importance = OBSERVER_IMPORTANCE;
            memory.confidence = OBSERVER_CONFIDENCE;
            memory.durability = Durability::Durable;
            memory.metadata.insert("observer".to_string(), Value::Bool(true));
            memory.metadata.insert("source_file".to_string(), Value::String(observation.file_path.clone()));

            let embedding = self.embeddings.embed(&memory.content, EmbedKind::Passage).await?;
            let outcome = self.vectors.store(&memory, &embedding).await?;
            if !outcome.created {
                continue;
            }
            if let Err(err) = self.graph.create_memory_node(&memory).await {
                tracing::error!(memory_id = %memory.id, error = %err, "observer: graph write failed");
                continue;
            }
            stored += 1;
        }

        Ok(stored)
    }
}

struct ExtractedFact {
    fact: String,
    domain: String,
    tags: Vec<String>,
}

fn parse_facts(raw: &str) -> Vec<ExtractedFact> {
    let trimmed = raw.trim().strip_prefix("```json").or_else(|| raw.trim().strip_prefix("```")).unwrap_or(raw.trim());
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();

    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return Vec::new();
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let fact = obj.get("fact").and_then(Value::as_str)?.trim().to_string();
            if fact.is_empty() {
                return None;
            }
            let domain = obj.get("domain").and_then(Value::as_str).unwrap_or("general").to_string();
            let tags = obj
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            Some(ExtractedFact { fact, domain, tags })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_change_description_shows_diff() {
        let obs = FileChangeObservation {
            file_path: "src/main.rs".to_string(),
            tool_name: "Edit".to_string(),
            old_string: Some("foo".to_string()),
            new_string: Some("bar".to_string()),
            content: None,
        };
        let desc = obs.change_description().unwrap();
        assert!(desc.contains("Replaced"));
    }

    #[test]
    fn parses_fact_array() {
        let raw = r#"[{"fact": "Server listens on port 8080", "domain": "infrastructure", "tags": ["ports"]}]"#;
        let facts = parse_facts(raw);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].domain, "infrastructure");
    }

    #[test]
    fn no_content_yields_no_description() {
        let obs = FileChangeObservation { file_path: "a".to_string(), tool_name: "Write".to_string(), old_string: None, new_string: None, content: None };
        assert!(obs.change_description().is_none());
    }
}
