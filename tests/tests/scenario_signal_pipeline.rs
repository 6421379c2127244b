//! Scenario 7 (spec.md §8): ingesting the "JWT token expiry bug" fixture
//! conversation produces an `error_fix` signal that is auto-stored as an
//! episodic memory, tagged `signal:error_fix`, with a normalized domain.

mod common;

use async_trait::async_trait;
use common::Harness;
use do_memory_core::error::Result;
use do_memory_core::llm::{GenerateOptions, LlmClient};
use do_memory_core::signals::pipeline::{SignalDisposition, SignalPipeline};
use do_memory_core::storage::{EphemeralStore, VectorStore};
use do_memory_core::types::{MemorySource, MemoryType};
use std::sync::Arc;

/// Returns a single canned `error_fix` signal regardless of the prompt,
/// standing in for the real LLM extraction backend (spec.md §4.10.3).
struct FakeLlm;

#[async_trait]
impl LlmClient for FakeLlm {
    async fn generate(&self, _prompt: &str, _options: GenerateOptions) -> Result<String> {
        Ok(r#"[{
            "signal_type": "error_fix",
            "content": "JWT tokens were expiring early because the server clock was not synced; fixed by adding NTP sync to the auth service startup.",
            "confidence": 0.92,
            "suggested_domain": "authentication",
            "suggested_tags": ["jwt", "auth"],
            "suggested_importance": 0.75,
            "suggested_durability": "durable"
        }]"#
        .to_string())
    }
}

const JWT_BUG_CONVERSATION: &str = "\
user: Users are getting logged out within a minute of signing in, even though the JWT expiry is set to 1 hour.
assistant: Can you check if the server's system clock is correct? JWTs validate `exp` against the server's wall clock, so clock drift causes early expiry.
user: You're right, the server clock was 45 minutes ahead. Restarting NTP sync fixed it.
assistant: Good catch. I'd recommend adding an NTP sync step to the auth service's startup script so this doesn't regress.
user: Done, added it to the Dockerfile entrypoint. Tokens are lasting the full hour now.
assistant: Great, that confirms the clock drift was the root cause of the premature expiry.";

#[tokio::test]
async fn jwt_bug_conversation_yields_auto_stored_error_fix_signal() {
    let harness = Harness::new();

    let pipeline = SignalPipeline::new(
        harness.backend.vector.clone(),
        harness.backend.graph.clone(),
        harness.backend.row.clone(),
        harness.backend.ephemeral.clone(),
        harness.embeddings.clone(),
        Arc::new(FakeLlm),
        0.8, // signal_confidence_auto_store
        0.5, // signal_confidence_pending
        24,  // session_ttl_hours
    );

    let session_id = "sess-jwt-bug";
    harness.backend.ephemeral.set_session(&do_memory_core::types::Session::new(session_id), 24).await.unwrap();

    let routed = pipeline.process(session_id, JWT_BUG_CONVERSATION, MemorySource::Assistant, "general").await.unwrap();

    assert_eq!(routed.len(), 1);
    let signal = &routed[0];
    assert_eq!(signal.signal_type, do_memory_core::types::SignalType::ErrorFix);
    assert_eq!(signal.disposition, SignalDisposition::AutoStored);

    let memory_id = signal.memory_id.clone().expect("auto-stored signal carries a memory id");
    let (_, stored) = harness.backend.vector.get(&memory_id).await.unwrap().expect("memory persisted to vector store");

    assert_eq!(stored.memory_type, MemoryType::Episodic, "error_fix signals map to episodic memories");
    assert_eq!(stored.domain, "security", "suggested domain \"authentication\" normalizes into the canonical set");
    assert!(stored.content.contains("JWT"));

    let session = harness.backend.ephemeral.get_session(session_id).await.unwrap().expect("session still present");
    assert_eq!(session.counters.signals_detected, 1, "auto-store increments the session's signals_detected counter");
}

#[tokio::test]
async fn low_confidence_signal_is_queued_pending_not_auto_stored() {
    struct LowConfidenceLlm;

    #[async_trait]
    impl LlmClient for LowConfidenceLlm {
        async fn generate(&self, _prompt: &str, _options: GenerateOptions) -> Result<String> {
            Ok(r#"[{"signal_type": "preference", "content": "Prefers tabs over spaces", "confidence": 0.6}]"#.to_string())
        }
    }

    let harness = Harness::new();
    let pipeline = SignalPipeline::new(
        harness.backend.vector.clone(),
        harness.backend.graph.clone(),
        harness.backend.row.clone(),
        harness.backend.ephemeral.clone(),
        harness.embeddings.clone(),
        Arc::new(LowConfidenceLlm),
        0.8,
        0.5,
        24,
    );

    let routed = pipeline.process("sess-pref", "user: I prefer tabs.\nassistant: Noted.", MemorySource::User, "general").await.unwrap();

    assert_eq!(routed.len(), 1);
    assert_eq!(routed[0].disposition, SignalDisposition::Pending);
    assert!(routed[0].memory_id.is_none());

    let pending = harness.backend.ephemeral.get_pending_signals("sess-pref").await.unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn low_confidence_contradiction_is_queued_pending_not_linked() {
    struct LowConfidenceContradictionLlm;

    #[async_trait]
    impl LlmClient for LowConfidenceContradictionLlm {
        async fn generate(&self, _prompt: &str, _options: GenerateOptions) -> Result<String> {
            Ok(r#"[{"signal_type": "contradiction", "content": "Actually pickle is fine here", "confidence": 0.6}]"#.to_string())
        }
    }

    let harness = Harness::new();
    let pipeline = SignalPipeline::new(
        harness.backend.vector.clone(),
        harness.backend.graph.clone(),
        harness.backend.row.clone(),
        harness.backend.ephemeral.clone(),
        harness.embeddings.clone(),
        Arc::new(LowConfidenceContradictionLlm),
        0.8,
        0.5,
        24,
    );

    let routed = pipeline.process("sess-contra", "user: is pickle ok?\nassistant: no.", MemorySource::User, "general").await.unwrap();

    assert_eq!(routed.len(), 1);
    assert_eq!(routed[0].disposition, SignalDisposition::Pending, "a below-auto-store-threshold contradiction must not be stored/linked");
    assert!(routed[0].memory_id.is_none());
    assert_eq!(harness.backend.vector.count().await.unwrap(), 0, "no memory should have been created for it");

    let pending = harness.backend.ephemeral.get_pending_signals("sess-contra").await.unwrap();
    assert_eq!(pending.len(), 1);
}
