//! Document ingestion: parses an uploaded file into chunks, extracts
//! memories per chunk via LLM, embeds and stores them tagged with the
//! source document (spec.md §4.14), ported from
//! `original_source/src/core/document_ingest.py`.
//!
//! Chunk-level LLM extraction runs sequentially (the reference deployment's
//! local model is single-threaded); a short delay between chunks avoids
//! saturating it.

use crate::embeddings::{EmbedKind, EmbeddingService};
use crate::error::{Error, Result};
use crate::ids::content_hash;
use crate::llm::{GenerateOptions, LlmClient};
use crate::storage::{GraphStore, VectorStore};
use crate::types::{Document, Durability, Memory, MemorySource, MemoryType};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

const MAX_CHUNK_CHARS: usize = 3000;
const INTER_CHUNK_DELAY: Duration = Duration::from_secs(1);

const EXTRACT_PROMPT: &str = r#"You are a memory extraction system. Given a chunk of a document, extract the most important facts, decisions, or knowledge worth remembering.

Document: {filename}
Chunk {chunk_index}/{total_chunks}:
---
{chunk_text}
---

Return a JSON array of extracted memories. Each memory should have:
- "content": the fact or knowledge (1-3 sentences, standalone)
- "memory_type": one of "semantic", "procedural", "episodic"
- "importance": 1-10 (10 = critical infrastructure fact, 1 = trivial)
- "tags": array of 1-3 keyword tags

Return ONLY the JSON array. If nothing worth extracting, return []."#;

#[must_use]
pub fn compute_file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Split plain text on blank lines, respecting [`MAX_CHUNK_CHARS`].
#[must_use]
pub fn chunk_plaintext(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in text.trim().split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }
        if !current.is_empty() && current.len() + para.len() + 2 > MAX_CHUNK_CHARS {
            chunks.push(current.trim().to_string());
            current = para.to_string();
        } else if current.is_empty() {
            current = para.to_string();
        } else {
            current.push_str("\n\n");
            current.push_str(para);
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    if chunks.is_empty() {
        vec![text.chars().take(MAX_CHUNK_CHARS).collect()]
    } else {
        chunks
    }
}

/// Split markdown on heading boundaries (`#`, `##`, `###`), sub-chunking
/// oversized sections by paragraph.
#[must_use]
pub fn chunk_markdown(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let mut sections = Vec::new();
    let mut boundaries = vec![0];

    for (offset, line) in trimmed.match_indices('\n') {
        let line_start = offset + line.len();
        if let Some(rest) = trimmed.get(line_start..) {
            if is_heading(rest) {
                boundaries.push(line_start);
            }
        }
    }
    boundaries.push(trimmed.len());
    boundaries.dedup();

    for window in boundaries.windows(2) {
        let section = trimmed[window[0]..window[1]].trim();
        if !section.is_empty() {
            sections.push(section.to_string());
        }
    }

    let mut chunks = Vec::new();
    for section in sections {
        if section.len() <= MAX_CHUNK_CHARS {
            chunks.push(section);
        } else {
            chunks.extend(chunk_plaintext(&section));
        }
    }

    if chunks.is_empty() {
        chunk_plaintext(trimmed)
    } else {
        chunks
    }
}

fn is_heading(text: &str) -> bool {
    text.starts_with("# ") || text.starts_with("## ") || text.starts_with("### ")
}

/// Merge PDF page texts, respecting [`MAX_CHUNK_CHARS`] (page parsing
/// itself is out of scope: spec.md §1 Non-goals exclude binary file
/// format parsers, so callers supply already-extracted page text).
#[must_use]
pub fn chunk_pdf_pages(pages: &[String]) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for page in pages {
        let page = page.trim();
        if page.is_empty() {
            continue;
        }
        if !current.is_empty() && current.len() + page.len() + 2 > MAX_CHUNK_CHARS {
            chunks.push(current.trim().to_string());
            current = page.to_string();
        } else if current.is_empty() {
            current = page.to_string();
        } else {
            current.push_str("\n\n");
            current.push_str(page);
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

struct ExtractedMemory {
    content: String,
    memory_type: MemoryType,
    importance: f64,
    tags: Vec<String>,
}

pub struct DocumentIngestor {
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    embeddings: Arc<EmbeddingService>,
    llm: Arc<dyn LlmClient>,
}

impl DocumentIngestor {
    #[must_use]
    pub fn new(vectors: Arc<dyn VectorStore>, graph: Arc<dyn GraphStore>, embeddings: Arc<EmbeddingService>, llm: Arc<dyn LlmClient>) -> Self {
        Self { vectors, graph, embeddings, llm }
    }

    /// Full ingestion pipeline: chunk, extract, embed, store, tag with the
    /// originating document (spec.md §4.14). Returns the document record
    /// and the ids of the memories it produced.
    pub async fn ingest(&self, bytes: &[u8], filename: &str, file_type: &str, domain: &str, durability: Option<Durability>) -> Result<(Document, Vec<crate::ids::MemoryId>)> {
        let chunks = self.chunk(bytes, file_type)?;
        if chunks.is_empty() {
            return Err(Error::InvalidInput("no content could be extracted from the file".to_string()));
        }

        let mut document = Document {
            id: crate::ids::MemoryId::generate().0,
            filename: filename.to_string(),
            file_hash: compute_file_hash(bytes),
            file_type: file_type.to_string(),
            domain: domain.to_string(),
            durability,
            pinned: false,
            memory_count: 0,
            created_at: chrono::Utc::now(),
            user_id: None,
        };

        let total = chunks.len();
        let mut extractions = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            match self.extract_chunk(chunk, index, total, filename).await {
                Ok(mut items) => extractions.append(&mut items),
                Err(err) => tracing::warn!(chunk = index, error = %err, "chunk extraction failed"),
            }
            if index + 1 < total {
                tokio::time::sleep(INTER_CHUNK_DELAY).await;
            }
        }

        let mut child_ids = Vec::new();
        for extraction in extractions {
            let mut memory = Memory::new(extraction.content, extraction.memory_type, MemorySource::System, domain.to_string());
            memory.importance = extraction.importance;
            memory.initial_importance = extraction.importance;
            memory.tags = extraction.tags;
            if let Some(durability) = durability {
                memory.durability = durability;
            }
            memory.metadata.insert("document_id".to_string(), Value::String(document.id.clone()));
            memory.metadata.insert("source_file".to_string(), Value::String(filename.to_string()));

            let embedding = self.embeddings.embed(&memory.content, EmbedKind::Passage).await?;
            let outcome = self.vectors.store(&memory, &embedding).await?;
            if outcome.created {
                self.graph.create_memory_node(&memory).await?;
                child_ids.push(memory.id.clone());
            }
        }

        document.memory_count = child_ids.len() as u64;
        Ok((document, child_ids))
    }

    fn chunk(&self, bytes: &[u8], file_type: &str) -> Result<Vec<String>> {
        match file_type {
            "markdown" => Ok(chunk_markdown(&String::from_utf8_lossy(bytes))),
            "pdf" => Err(Error::InvalidInput("PDF parsing requires pre-extracted page text; pass file_type=\"text\" with extracted content".to_string())),
            "docx" => Err(Error::InvalidInput("DOCX parsing requires a pre-extracted plaintext conversion; pass file_type=\"text\" with extracted content".to_string())),
            _ => Ok(chunk_plaintext(&String::from_utf8_lossy(bytes))),
        }
    }

    async fn extract_chunk(&self, chunk: &str, index: usize, total: usize, filename: &str) -> Result<Vec<ExtractedMemory>> {
        let truncated: String = chunk.chars().take(MAX_CHUNK_CHARS).collect();
        let prompt = EXTRACT_PROMPT
            .replace("{filename}", filename)
            .replace("{chunk_index}", &(index + 1).to_string())
            .replace("{total_chunks}", &total.to_string())
            .replace("{chunk_text}", &truncated);

        let options = GenerateOptions { temperature: 0.2, json_mode: true, dormant_think: true };
        let raw = self.llm.generate(&prompt, options).await?;

        let trimmed = raw.trim().strip_prefix("```json").or_else(|| raw.trim().strip_prefix("```")).unwrap_or(raw.trim());
        let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();
        let value: Value = serde_json::from_str(trimmed)?;

        let items = match value {
            Value::Array(items) => items,
            Value::Object(_) => vec![value],
            _ => Vec::new(),
        };

        Ok(items.iter().filter_map(parse_extracted_memory).collect())
    }
}

fn parse_extracted_memory(item: &Value) -> Option<ExtractedMemory> {
    let obj = item.as_object()?;
    let content = obj.get("content").and_then(Value::as_str)?.trim().to_string();
    if content.is_empty() {
        return None;
    }

    let memory_type = obj
        .get("memory_type")
        .and_then(Value::as_str)
        .and_then(|s| match s {
            "semantic" => Some(MemoryType::Semantic),
            "procedural" => Some(MemoryType::Procedural),
            "episodic" => Some(MemoryType::Episodic),
            _ => None,
        })
        .unwrap_or(MemoryType::Semantic);

    let raw_importance = obj.get("importance").and_then(Value::as_f64).unwrap_or(5.0);
    let importance = (raw_importance / 10.0).clamp(0.0, 1.0);

    let tags = obj
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    Some(ExtractedMemory { content, memory_type, importance, tags })
}

#[must_use]
pub fn normalized_content_hash(content: &str) -> String {
    content_hash(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_plaintext_splits_on_blank_lines() {
        let text = "First paragraph.\n\nSecond paragraph.";
        let chunks = chunk_plaintext(text);
        assert_eq!(chunks.len(), 1, "small paragraphs merge into one chunk");
    }

    #[test]
    fn chunk_plaintext_respects_max_size() {
        let para = "x".repeat(MAX_CHUNK_CHARS - 10);
        let text = format!("{para}\n\n{para}\n\n{para}");
        let chunks = chunk_plaintext(&text);
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn chunk_markdown_splits_on_headings() {
        let text = "# Title\n\nIntro text.\n\n## Section\n\nMore text.";
        let chunks = chunk_markdown(text);
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn importance_scales_from_one_to_ten() {
        let item = serde_json::json!({"content": "fact", "importance": 8});
        let extracted = parse_extracted_memory(&item).unwrap();
        assert!((extracted.importance - 0.8).abs() < 1e-9);
    }
}
