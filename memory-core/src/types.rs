//! Data model: `Memory`, `Relationship`, `Fact`, `AntiPattern`, `Session`,
//! `Signal`, `User`, `Document`, `AuditEntry`.
//!
//! Shapes mirror `original_source/src/core/models.py`; see spec.md §3 for
//! the invariants these types must uphold (enforced by the storage adapters
//! and pipelines, not by the types themselves).

use crate::ids::{content_hash, MemoryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Episodic,
    Semantic,
    Procedural,
    Working,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    User,
    Assistant,
    System,
    Consolidation,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    Ephemeral,
    Durable,
    Permanent,
}

impl Default for Durability {
    fn default() -> Self {
        Durability::Durable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    RelatedTo,
    CausedBy,
    SolvedBy,
    Supersedes,
    DerivedFrom,
    Contradicts,
    Requires,
    PartOf,
}

impl RelationshipType {
    /// The uppercase, identifier-safe wire name used when templating into
    /// the graph query language (spec.md §4.3: must be validated against
    /// `^[A-Z_][A-Z0-9_]*$` before being spliced into a query string).
    #[must_use]
    pub fn as_edge_label(&self) -> &'static str {
        match self {
            RelationshipType::RelatedTo => "RELATED_TO",
            RelationshipType::CausedBy => "CAUSED_BY",
            RelationshipType::SolvedBy => "SOLVED_BY",
            RelationshipType::Supersedes => "SUPERSEDES",
            RelationshipType::DerivedFrom => "DERIVED_FROM",
            RelationshipType::Contradicts => "CONTRADICTS",
            RelationshipType::Requires => "REQUIRES",
            RelationshipType::PartOf => "PART_OF",
        }
    }
}

/// The atomic unit of stored knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    pub content: String,
    pub content_hash: String,

    pub memory_type: MemoryType,
    pub source: MemorySource,
    pub domain: String,
    pub tags: Vec<String>,

    pub importance: f64,
    /// Importance at creation time, used by decay-floor and consolidation
    /// bookkeeping.
    pub initial_importance: f64,
    pub stability: f64,
    pub confidence: f64,
    pub access_count: u64,

    pub durability: Durability,
    pub pinned: bool,

    pub parent_ids: Vec<MemoryId>,
    pub superseded_by: Option<MemoryId>,
    pub session_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Memory {
    /// Construct a new memory with generated id and content hash, applying
    /// defaults the way `original_source`'s `Memory` Pydantic model does.
    #[must_use]
    pub fn new(content: impl Into<String>, memory_type: MemoryType, source: MemorySource, domain: impl Into<String>) -> Self {
        let content = content.into();
        let hash = content_hash(&content);
        let now = Utc::now();
        Self {
            id: MemoryId::generate(),
            content_hash: hash,
            content,
            memory_type,
            source,
            domain: domain.into(),
            tags: Vec::new(),
            importance: 0.5,
            initial_importance: 0.5,
            stability: 0.1,
            confidence: 0.8,
            access_count: 0,
            durability: Durability::Durable,
            pinned: false,
            parent_ids: Vec::new(),
            superseded_by: None,
            session_id: None,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            metadata: Map::new(),
        }
    }

    #[must_use]
    pub fn is_anti_pattern(&self) -> bool {
        self.metadata.get("is_anti_pattern").and_then(Value::as_bool).unwrap_or(false)
    }

    #[must_use]
    pub fn document_id(&self) -> Option<&str> {
        self.metadata.get("document_id").and_then(Value::as_str)
    }

    /// Immune to decay per spec.md §3 invariant 3.
    #[must_use]
    pub fn is_decay_immune(&self) -> bool {
        self.pinned || self.durability == Durability::Permanent
    }
}

/// Typed, weighted, optionally-bidirectional edge between two memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: MemoryId,
    pub target_id: MemoryId,
    pub relationship_type: RelationshipType,
    pub strength: f64,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    #[must_use]
    pub fn new(source_id: MemoryId, target_id: MemoryId, relationship_type: RelationshipType, strength: f64) -> Self {
        Self {
            source_id,
            target_id,
            relationship_type,
            strength: strength.clamp(0.0, 1.0),
            created_at: Utc::now(),
        }
    }
}

/// A sub-embedding of a memory (1-5 per parent), stored in its own vector
/// sub-collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub parent_id: MemoryId,
    pub fact_index: u32,
    pub content: String,
    pub domain: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A distinct class of memory retrieved as a synthetic warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiPattern {
    pub id: MemoryId,
    pub pattern: String,
    pub warning: String,
    pub alternative: Option<String>,
    pub severity: Severity,
    pub domain: String,
    pub tags: Vec<String>,
    pub times_triggered: u64,
}

/// Lives in the ephemeral store with a TTL; archived to the row store on
/// end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCounters {
    pub memories_created: u64,
    pub memories_retrieved: u64,
    pub signals_detected: u64,
}

impl Default for SessionCounters {
    fn default() -> Self {
        Self { memories_created: 0, memories_retrieved: 0, signals_detected: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub working_directory: Option<String>,
    pub current_task: Option<String>,
    pub working_memory: Vec<MemoryId>,
    pub topics_discussed: Vec<String>,
    pub counters: SessionCounters,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            started_at: Utc::now(),
            ended_at: None,
            working_directory: None,
            current_task: None,
            working_memory: Vec::new(),
            topics_discussed: Vec::new(),
            counters: SessionCounters::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    ErrorFix,
    Decision,
    Pattern,
    Preference,
    Fact,
    Workflow,
    Contradiction,
    Warning,
}

impl SignalType {
    /// All eight signal types, in the canonical order enumerated to the LLM
    /// prompt (spec.md §4.10.3).
    pub const ALL: [SignalType; 8] = [
        SignalType::ErrorFix,
        SignalType::Decision,
        SignalType::Pattern,
        SignalType::Preference,
        SignalType::Fact,
        SignalType::Workflow,
        SignalType::Contradiction,
        SignalType::Warning,
    ];

    /// `signal_type -> memory_type` fixed map (spec.md §4.10.1).
    #[must_use]
    pub fn default_memory_type(&self) -> MemoryType {
        match self {
            SignalType::ErrorFix => MemoryType::Episodic,
            SignalType::Decision => MemoryType::Semantic,
            SignalType::Pattern => MemoryType::Procedural,
            SignalType::Preference => MemoryType::Semantic,
            SignalType::Fact => MemoryType::Semantic,
            SignalType::Workflow => MemoryType::Procedural,
            SignalType::Contradiction => MemoryType::Semantic,
            SignalType::Warning => MemoryType::Semantic,
        }
    }

    /// `signal_type -> default importance` fixed map.
    #[must_use]
    pub fn default_importance(&self) -> f64 {
        match self {
            SignalType::ErrorFix => 0.7,
            SignalType::Decision => 0.65,
            SignalType::Pattern => 0.6,
            SignalType::Preference => 0.6,
            SignalType::Fact => 0.5,
            SignalType::Workflow => 0.55,
            SignalType::Contradiction => 0.7,
            SignalType::Warning => 0.75,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::ErrorFix => "error_fix",
            SignalType::Decision => "decision",
            SignalType::Pattern => "pattern",
            SignalType::Preference => "preference",
            SignalType::Fact => "fact",
            SignalType::Workflow => "workflow",
            SignalType::Contradiction => "contradiction",
            SignalType::Warning => "warning",
        }
    }

    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        Some(match s.trim().to_lowercase().as_str() {
            "error_fix" | "error-fix" | "errorfix" => SignalType::ErrorFix,
            "decision" => SignalType::Decision,
            "pattern" => SignalType::Pattern,
            "preference" => SignalType::Preference,
            "fact" => SignalType::Fact,
            "workflow" => SignalType::Workflow,
            "contradiction" => SignalType::Contradiction,
            "warning" => SignalType::Warning,
            _ => return None,
        })
    }
}

/// An LLM-detected piece of noteworthy content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_type: SignalType,
    pub content: String,
    pub confidence: f64,
    pub suggested_domain: Option<String>,
    pub suggested_tags: Vec<String>,
    pub suggested_importance: Option<f64>,
    pub suggested_durability: Option<Durability>,
    pub source: MemorySource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub api_key: String,
    pub display_name: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub last_active_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub file_hash: String,
    pub file_type: String,
    pub domain: String,
    pub durability: Option<Durability>,
    pub pinned: bool,
    pub memory_count: u64,
    pub created_at: DateTime<Utc>,
    pub user_id: Option<String>,
}

/// Append-only audit row. Writes are best-effort: they never block the
/// caller (spec.md §3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub memory_id: Option<MemoryId>,
    pub actor: String,
    pub details: Value,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

impl AuditEntry {
    #[must_use]
    pub fn new(action: impl Into<String>, memory_id: Option<MemoryId>, actor: impl Into<String>, details: Value) -> Self {
        Self {
            id: MemoryId::generate().0,
            timestamp: Utc::now(),
            action: action.into(),
            memory_id,
            actor: actor.into(),
            details,
            session_id: None,
            user_id: None,
        }
    }
}

/// A single ranked retrieval hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub memory: Memory,
    pub score: f64,
    pub similarity: f64,
    pub graph_distance: u32,
    pub retrieval_path: Vec<MemoryId>,
}

/// The outcome of merging a cluster during consolidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationResult {
    pub merged_memory: Memory,
    pub source_memories: Vec<MemoryId>,
    pub relationships_created: usize,
    pub memories_superseded: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durability_total_order() {
        assert!(Durability::Ephemeral < Durability::Durable);
        assert!(Durability::Durable < Durability::Permanent);
    }

    #[test]
    fn new_memory_has_matching_content_hash() {
        let m = Memory::new("Hello World", MemoryType::Semantic, MemorySource::User, "general");
        assert_eq!(m.content_hash, content_hash("Hello World"));
    }
}
