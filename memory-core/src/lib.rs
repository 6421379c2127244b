//! Living-memory engine: content-addressed memories with importance,
//! stability, and confidence dynamics; a staged, ranked retrieval pipeline;
//! background decay, consolidation, and pattern-extraction workers; and an
//! LLM-gated signal detection pipeline.
//!
//! Storage is a set of four async traits (vector, graph, row, ephemeral)
//! implemented by adapter crates; `do-memory-core` itself only depends on
//! the trait contracts in [`storage`]. `do-memory-test-utils` supplies pure
//! in-memory fakes for tests.

pub mod config;
pub mod domains;
pub mod embeddings;
pub mod error;
pub mod facts;
pub mod feedback;
pub mod ids;
pub mod ingest;
pub mod linker;
pub mod llm;
pub mod ml;
pub mod retrieval;
pub mod signals;
pub mod storage;
pub mod types;
pub mod workers;

pub use config::Config;
pub use error::{Backend, Error, Result};
pub use ids::MemoryId;
pub use retrieval::{MemoryQuery, RetrievalPipeline};
pub use types::{
    AntiPattern, AuditEntry, ConsolidationResult, Document, Durability, Fact, Memory, MemorySource, MemoryType, Relationship, RelationshipType,
    RetrievalResult, Session, SessionCounters, Severity, Signal, SignalType, User,
};
