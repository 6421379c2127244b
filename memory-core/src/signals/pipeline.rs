//! Confidence-based signal routing: auto-store, pending queue, or discard
//! (spec.md §4.10.4), ported from `original_source/src/workers/signals.py`.

use crate::embeddings::{EmbedKind, EmbeddingService};
use crate::error::Result;
use crate::ids::MemoryId;
use crate::llm::LlmClient;
use crate::ml::classifier::{ConversationTurn, SignalClassifier};
use crate::storage::{EphemeralStore, GraphStore, RowStore, VectorStore};
use crate::types::{AuditEntry, Memory, MemorySource, RelationshipType, Signal, SignalType};
use std::sync::Arc;

use super::detector::extract_signals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDisposition {
    AutoStored,
    Pending,
    Discarded,
    DuplicateSkipped,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RoutedSignal {
    pub signal_type: SignalType,
    pub disposition: SignalDisposition,
    pub memory_id: Option<MemoryId>,
}

pub struct SignalPipeline {
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    rows: Arc<dyn RowStore>,
    ephemeral: Arc<dyn EphemeralStore>,
    embeddings: Arc<EmbeddingService>,
    llm: Arc<dyn LlmClient>,
    auto_store_threshold: f64,
    pending_threshold: f64,
    session_ttl_hours: u64,
}

impl SignalPipeline {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        rows: Arc<dyn RowStore>,
        ephemeral: Arc<dyn EphemeralStore>,
        embeddings: Arc<EmbeddingService>,
        llm: Arc<dyn LlmClient>,
        auto_store_threshold: f64,
        pending_threshold: f64,
        session_ttl_hours: u64,
    ) -> Self {
        Self { vectors, graph, rows, ephemeral, embeddings, llm, auto_store_threshold, pending_threshold, session_ttl_hours }
    }

    /// The ML pre-classifier gate: skip the LLM call entirely when the
    /// cheap classifier is confident nothing interesting happened (spec.md
    /// §4.10.2).
    #[must_use]
    pub fn should_invoke_llm(classifier: Option<&SignalClassifier>, turns: &[ConversationTurn], gate_threshold: f64) -> bool {
        match classifier {
            Some(model) => model.predict(turns).signal_probability >= gate_threshold,
            None => true,
        }
    }

    /// Runs extraction then routes each signal by confidence (spec.md
    /// §4.10.4): `>= auto_store_threshold` stores immediately,
    /// `>= pending_threshold` queues to the session's pending list,
    /// otherwise discards.
    pub async fn process(&self, session_id: &str, conversation: &str, source: MemorySource, domain_fallback: &str) -> Result<Vec<RoutedSignal>> {
        let signals = extract_signals(self.llm.as_ref(), conversation, source).await?;
        let mut routed = Vec::with_capacity(signals.len());

        for signal in signals {
            // Contradiction resolution is a sub-step of the auto-store path
            // (spec.md §4.10.5): a contradiction signal below the auto-store
            // threshold is routed like any other signal, not stored and
            // edge-linked regardless of confidence.
            let disposition = if signal.signal_type == SignalType::Contradiction && signal.confidence >= self.auto_store_threshold {
                self.route_contradiction(session_id, &signal, domain_fallback).await?
            } else if signal.confidence >= self.auto_store_threshold {
                self.auto_store(session_id, &signal, domain_fallback).await?
            } else if signal.confidence >= self.pending_threshold {
                self.queue_pending(session_id, &signal).await?;
                (SignalDisposition::Pending, None)
            } else {
                (SignalDisposition::Discarded, None)
            };

            if disposition.0 == SignalDisposition::AutoStored {
                self.bump_signals_detected(session_id).await;
            }

            routed.push(RoutedSignal { signal_type: signal.signal_type, disposition: disposition.0, memory_id: disposition.1 });
        }

        Ok(routed)
    }

    /// Best-effort session counter bump (spec.md §4.10.5: the auto-store
    /// path increments the session's `signals_detected` counter).
    async fn bump_signals_detected(&self, session_id: &str) {
        if let Ok(Some(mut session)) = self.ephemeral.get_session(session_id).await {
            session.counters.signals_detected += 1;
            let _ = self.ephemeral.set_session(&session, self.session_ttl_hours).await;
        }
    }

    async fn queue_pending(&self, session_id: &str, signal: &Signal) -> Result<()> {
        let json = serde_json::to_string(signal)?;
        self.ephemeral.push_pending_signal(session_id, &json).await
    }

    /// Dedup-by-content-hash auto-store (spec.md §4.10.4 step 2): a signal
    /// whose content hashes to an existing memory is skipped rather than
    /// stored again.
    async fn auto_store(&self, session_id: &str, signal: &Signal, domain_fallback: &str) -> Result<(SignalDisposition, Option<MemoryId>)> {
        let hash = crate::ids::content_hash(&signal.content);
        if self.vectors.find_by_content_hash(&hash).await?.is_some() {
            return Ok((SignalDisposition::DuplicateSkipped, None));
        }

        let domain = signal.suggested_domain.clone().unwrap_or_else(|| domain_fallback.to_string());
        let domain = crate::domains::normalize_domain(&domain);

        let mut memory = Memory::new(signal.content.clone(), signal.signal_type.default_memory_type(), signal.source, domain);
        memory.importance = signal.suggested_importance.unwrap_or_else(|| signal.signal_type.default_importance());
        memory.initial_importance = memory.importance;
        memory.tags = signal.suggested_tags.clone();
        memory.session_id = Some(session_id.to_string());
        if let Some(durability) = signal.suggested_durability {
            memory.durability = durability;
        }

        let embedding = self.embeddings.embed(&memory.content, EmbedKind::Passage).await?;
        let outcome = self.vectors.store(&memory, &embedding).await?;
        if !outcome.created {
            return Ok((SignalDisposition::DuplicateSkipped, Some(outcome.id)));
        }
        self.graph.create_memory_node(&memory).await?;

        let _ = self
            .rows
            .log_audit(&AuditEntry::new("signal_auto_store", Some(memory.id.clone()), "signal_pipeline", serde_json::json!({ "signal_type": signal.signal_type.as_str() })))
            .await;

        Ok((SignalDisposition::AutoStored, Some(memory.id)))
    }

    /// Contradiction signals skip normal storage: find the memory the
    /// contradiction refers to (best ANN match), link a `contradicts`
    /// edge, and let the retrieval-time inhibition stage (spec.md §4.6
    /// step 9) dampen the older memory rather than deleting it outright.
    async fn route_contradiction(&self, session_id: &str, signal: &Signal, domain_fallback: &str) -> Result<(SignalDisposition, Option<MemoryId>)> {
        let embedding = self.embeddings.embed(&signal.content, EmbedKind::Query).await?;
        let filters = crate::storage::SearchFilters::default();
        let hits = self.vectors.search(&embedding, 1, &filters).await?;

        let Some(existing) = hits.into_iter().next() else {
            return self.auto_store(session_id, signal, domain_fallback).await;
        };
        if existing.similarity < 0.5 {
            return self.auto_store(session_id, signal, domain_fallback).await;
        }

        let domain = signal.suggested_domain.clone().unwrap_or_else(|| domain_fallback.to_string());
        let domain = crate::domains::normalize_domain(&domain);
        let mut memory = Memory::new(signal.content.clone(), signal.signal_type.default_memory_type(), signal.source, domain);
        memory.importance = signal.suggested_importance.unwrap_or_else(|| signal.signal_type.default_importance());
        memory.initial_importance = memory.importance;

        let new_embedding = self.embeddings.embed(&memory.content, EmbedKind::Passage).await?;
        let outcome = self.vectors.store(&memory, &new_embedding).await?;
        if outcome.created {
            self.graph.create_memory_node(&memory).await?;
            let relationship = crate::types::Relationship::new(memory.id.clone(), existing.id.clone(), RelationshipType::Contradicts, 0.8);
            let _ = self.graph.create_relationship(&relationship).await;
            let _ = self
                .rows
                .log_audit(&AuditEntry::new("contradiction_detected", Some(memory.id.clone()), "signal_pipeline", serde_json::json!({ "contradicts": existing.id })))
                .await;
        }

        Ok((SignalDisposition::AutoStored, Some(memory.id)))
    }
}
