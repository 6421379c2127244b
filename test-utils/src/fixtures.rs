//! Convenience builders for constructing test `Memory`/`Relationship`/
//! `Session` values without repeating the full field list at every call
//! site, mirroring the fixture helpers the teacher kept in this crate.

use do_memory_core::{Durability, Memory, MemorySource, MemoryType};

/// A `Memory` with sensible test defaults: semantic, user-sourced, domain
/// `"general"`. Chain the builder methods below to override fields.
#[must_use]
pub fn memory(content: &str) -> Memory {
    Memory::new(content, MemoryType::Semantic, MemorySource::User, "general")
}

#[must_use]
pub fn memory_with_domain(content: &str, domain: &str) -> Memory {
    Memory::new(content, MemoryType::Semantic, MemorySource::User, domain)
}

#[must_use]
pub fn memory_with_type(content: &str, memory_type: MemoryType) -> Memory {
    Memory::new(content, memory_type, MemorySource::User, "general")
}

/// Builder-style mutation helpers; take ownership and return `Self` so call
/// sites can chain, e.g. `memory("x").importance(0.9).pinned(true)`.
pub trait MemoryFixtureExt {
    #[must_use]
    fn importance(self, value: f64) -> Self;
    #[must_use]
    fn stability(self, value: f64) -> Self;
    #[must_use]
    fn confidence(self, value: f64) -> Self;
    #[must_use]
    fn pinned(self, value: bool) -> Self;
    #[must_use]
    fn durability(self, value: Durability) -> Self;
    #[must_use]
    fn access_count(self, value: u64) -> Self;
    #[must_use]
    fn tags(self, tags: &[&str]) -> Self;
    #[must_use]
    fn session(self, session_id: &str) -> Self;
}

impl MemoryFixtureExt for Memory {
    fn importance(mut self, value: f64) -> Self {
        self.importance = value;
        self
    }

    fn stability(mut self, value: f64) -> Self {
        self.stability = value;
        self
    }

    fn confidence(mut self, value: f64) -> Self {
        self.confidence = value;
        self
    }

    fn pinned(mut self, value: bool) -> Self {
        self.pinned = value;
        self
    }

    fn durability(mut self, value: Durability) -> Self {
        self.durability = value;
        self
    }

    fn access_count(mut self, value: u64) -> Self {
        self.access_count = value;
        self
    }

    fn tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| (*t).to_string()).collect();
        self
    }

    fn session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }
}

/// A deterministic unit vector embedding for a given dimension and a
/// "direction" seed, so tests can construct vectors with known cosine
/// relationships without a real embedding backend.
#[must_use]
pub fn fake_embedding(dim: usize, seed: u64) -> Vec<f32> {
    let mut v: Vec<f32> = (0..dim).map(|i| ((seed as f32 + i as f32 * 0.37).sin())).collect();
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
