//! Qdrant-backed [`VectorStore`](do_memory_core::storage::VectorStore)
//! adapter: one collection per logical collection the port exposes
//! (memories, facts, anti-patterns), plus a payload-only secondary index
//! on `content_hash` used for store-time dedup.
//!
//! Qdrant point ids must be a `u64` or a UUID, but [`MemoryId`] is a
//! ULID-shaped string, so every point id here is `Uuid::new_v5` derived
//! from the memory id; the original id travels in the payload and is what
//! every method actually returns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use do_memory_core::error::{Backend, Error, Result};
use do_memory_core::storage::{SearchFilters, StoreOutcome, VectorHit, VectorStore};
use do_memory_core::{AntiPattern, Durability, Fact, Memory, MemoryId};
use qdrant_client::qdrant::{
    point_id::PointIdOptions, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, FieldCondition, Filter, GetPointsBuilder, PointId,
    PointStruct, PointsIdsList, Range, ScrollPointsBuilder, SearchPointsBuilder, SetPayloadPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use std::collections::HashMap;
use uuid::Uuid;

const MEMORIES_COLLECTION: &str = "memories";
const FACTS_COLLECTION: &str = "facts";
const ANTI_PATTERNS_COLLECTION: &str = "anti_patterns";

/// Namespace for deriving stable point UUIDs from our ULID-shaped
/// [`MemoryId`]s.
const ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6d, 0x65, 0x6d, 0x6f, 0x72, 0x79, 0x2d, 0x69, 0x64, 0x2d, 0x6e, 0x73, 0x70, 0x61, 0x63, 0x65,
]);

fn point_id_for(id: &str) -> PointId {
    Uuid::new_v5(&ID_NAMESPACE, id.as_bytes()).to_string().into()
}

fn err(backend: Backend, e: impl std::fmt::Display) -> Error {
    Error::Unavailable(backend, e.to_string())
}

/// Connects to a running Qdrant instance and ensures the three collections
/// this adapter needs exist, creating them with the given embedding
/// dimension if absent.
pub struct QdrantVectorStore {
    client: Qdrant,
    dimension: u64,
}

impl QdrantVectorStore {
    /// # Errors
    /// Returns an error if the Qdrant client cannot be constructed or a
    /// missing collection cannot be created.
    pub async fn connect(url: &str, dimension: u64) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(|e| err(Backend::Vector, e))?;
        let store = Self { client, dimension };
        store.ensure_collections().await?;
        Ok(store)
    }

    async fn ensure_collections(&self) -> Result<()> {
        for name in [MEMORIES_COLLECTION, FACTS_COLLECTION, ANTI_PATTERNS_COLLECTION] {
            let exists = self.client.collection_exists(name).await.map_err(|e| err(Backend::Vector, e))?;
            if !exists {
                self.client
                    .create_collection(CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(self.dimension, Distance::Cosine)))
                    .await
                    .map_err(|e| err(Backend::Vector, e))?;
            }
        }
        Ok(())
    }

    fn memory_payload(memory: &Memory) -> Result<Payload> {
        let value = serde_json::to_value(memory)?;
        Payload::try_from(value).map_err(|e| Error::Internal(format!("payload conversion failed: {e}")))
    }

    fn memory_from_payload(payload: &HashMap<String, qdrant_client::qdrant::Value>) -> Result<Memory> {
        let json = qdrant_client::Payload::from(payload.clone()).into();
        serde_json::from_value(json).map_err(Error::from)
    }
}

fn build_filter(filters: &SearchFilters) -> Filter {
    let mut must = Vec::new();
    if !filters.include_superseded {
        must.push(Condition::is_empty("superseded_by"));
    }
    if let Some(domains) = &filters.domains {
        must.push(Condition::matches("domain", domains.clone()));
    }
    if let Some(types) = &filters.memory_types {
        let names: Vec<String> = types.iter().map(|t| serde_json::to_value(t).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default()).collect();
        must.push(Condition::matches("memory_type", names));
    }
    if let Some(min_importance) = filters.min_importance {
        must.push(Condition::range("importance", Range { gte: Some(min_importance), ..Default::default() }));
    }
    if let Some(session_id) = &filters.session_id {
        must.push(Condition::matches("session_id", session_id.clone()));
    }
    if filters.created_after.is_some() || filters.created_before.is_some() {
        must.push(Condition::range(
            "created_at_millis",
            Range {
                gte: filters.created_after.map(|d| d.timestamp_millis() as f64),
                lte: filters.created_before.map(|d| d.timestamp_millis() as f64),
                ..Default::default()
            },
        ));
    }
    Filter { must, ..Default::default() }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn store(&self, memory: &Memory, embedding: &[f32]) -> Result<StoreOutcome> {
        if let Some(existing) = self.find_by_content_hash(&memory.content_hash).await? {
            return Ok(StoreOutcome { id: existing, created: false });
        }
        let payload = Self::memory_payload(memory)?;
        let point = PointStruct::new(point_id_for(memory.id.as_str()), embedding.to_vec(), payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(MEMORIES_COLLECTION, vec![point]))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        Ok(StoreOutcome { id: memory.id.clone(), created: true })
    }

    async fn get(&self, id: &MemoryId) -> Result<Option<(Vec<f32>, Memory)>> {
        let response = self
            .client
            .get_points(GetPointsBuilder::new(MEMORIES_COLLECTION, vec![point_id_for(id.as_str())]).with_vectors(true).with_payload(true))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        let Some(point) = response.result.into_iter().next() else { return Ok(None) };
        let memory = Self::memory_from_payload(&point.payload)?;
        let vector = point.vectors.and_then(|v| v.vectors_options).map(|opts| match opts {
            qdrant_client::qdrant::vectors::VectorsOptions::Vector(v) => v.data,
            qdrant_client::qdrant::vectors::VectorsOptions::Vectors(_) => Vec::new(),
        }).unwrap_or_default();
        Ok(Some((vector, memory)))
    }

    async fn search(&self, embedding: &[f32], limit: usize, filters: &SearchFilters) -> Result<Vec<VectorHit>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(MEMORIES_COLLECTION, embedding.to_vec(), limit as u64)
                    .filter(build_filter(filters))
                    .with_payload(true),
            )
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        response
            .result
            .into_iter()
            .map(|scored| {
                let memory = Self::memory_from_payload(&scored.payload)?;
                Ok(VectorHit { id: memory.id.clone(), similarity: f64::from(scored.score), memory })
            })
            .collect()
    }

    async fn scroll_all(&self, include_superseded: bool, with_vectors: bool) -> Result<Vec<(Memory, Option<Vec<f32>>)>> {
        let filters = SearchFilters { include_superseded, ..Default::default() };
        let mut out = Vec::new();
        let mut offset = None;
        loop {
            let mut builder = ScrollPointsBuilder::new(MEMORIES_COLLECTION)
                .filter(build_filter(&filters))
                .with_payload(true)
                .with_vectors(with_vectors)
                .limit(256);
            if let Some(o) = offset.take() {
                builder = builder.offset(o);
            }
            let response = self.client.scroll(builder).await.map_err(|e| err(Backend::Vector, e))?;
            for point in &response.result {
                let memory = Self::memory_from_payload(&point.payload)?;
                let vector = with_vectors.then(|| {
                    point.vectors.clone().and_then(|v| v.vectors_options).map(|opts| match opts {
                        qdrant_client::qdrant::vectors::VectorsOptions::Vector(v) => v.data,
                        qdrant_client::qdrant::vectors::VectorsOptions::Vectors(_) => Vec::new(),
                    }).unwrap_or_default()
                });
                out.push((memory, vector));
            }
            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(out)
    }

    async fn scroll_time_range(&self, since: DateTime<Utc>, until: DateTime<Utc>, domain: Option<&str>, limit: usize) -> Result<Vec<Memory>> {
        let filters = SearchFilters { domains: domain.map(|d| vec![d.to_string()]), created_after: Some(since), created_before: Some(until), ..Default::default() };
        let response = self
            .client
            .scroll(ScrollPointsBuilder::new(MEMORIES_COLLECTION).filter(build_filter(&filters)).with_payload(true).limit(limit as u32))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        response.result.iter().map(Self::memory_from_payload).collect()
    }

    async fn update_importance(&self, id: &MemoryId, importance: f64) -> Result<()> {
        let payload = Payload::try_from(serde_json::json!({ "importance": importance })).map_err(|e| Error::Internal(e.to_string()))?;
        self.client
            .set_payload(SetPayloadPointsBuilder::new(MEMORIES_COLLECTION, payload).points_selector(vec![point_id_for(id.as_str())]))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        Ok(())
    }

    async fn update_access(&self, id: &MemoryId, access_count: u64, last_accessed: DateTime<Utc>) -> Result<()> {
        let payload = Payload::try_from(serde_json::json!({
            "access_count": access_count,
            "last_accessed": last_accessed,
        }))
        .map_err(|e| Error::Internal(e.to_string()))?;
        self.client
            .set_payload(SetPayloadPointsBuilder::new(MEMORIES_COLLECTION, payload).points_selector(vec![point_id_for(id.as_str())]))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        Ok(())
    }

    async fn mark_superseded(&self, id: &MemoryId, superseded_by: &MemoryId) -> Result<()> {
        let payload = Payload::try_from(serde_json::json!({ "superseded_by": superseded_by.as_str() })).map_err(|e| Error::Internal(e.to_string()))?;
        self.client
            .set_payload(SetPayloadPointsBuilder::new(MEMORIES_COLLECTION, payload).points_selector(vec![point_id_for(id.as_str())]))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        Ok(())
    }

    async fn set_pinned(&self, id: &MemoryId, pinned: bool) -> Result<()> {
        let payload = Payload::try_from(serde_json::json!({ "pinned": pinned })).map_err(|e| Error::Internal(e.to_string()))?;
        self.client
            .set_payload(SetPayloadPointsBuilder::new(MEMORIES_COLLECTION, payload).points_selector(vec![point_id_for(id.as_str())]))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        Ok(())
    }

    async fn set_durability(&self, id: &MemoryId, durability: Durability) -> Result<()> {
        let payload = Payload::try_from(serde_json::json!({ "durability": durability })).map_err(|e| Error::Internal(e.to_string()))?;
        self.client
            .set_payload(SetPayloadPointsBuilder::new(MEMORIES_COLLECTION, payload).points_selector(vec![point_id_for(id.as_str())]))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        Ok(())
    }

    async fn delete(&self, id: &MemoryId) -> Result<()> {
        let ids = PointsIdsList { ids: vec![point_id_for(id.as_str())] };
        self.client
            .delete_points(DeletePointsBuilder::new(MEMORIES_COLLECTION).points(ids))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let filters = SearchFilters::default();
        let response = self
            .client
            .count(qdrant_client::qdrant::CountPointsBuilder::new(MEMORIES_COLLECTION).filter(build_filter(&filters)))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn count_pinned(&self) -> Result<u64> {
        let filter = Filter { must: vec![Condition::matches("pinned", true)], ..Default::default() };
        let response = self
            .client
            .count(qdrant_client::qdrant::CountPointsBuilder::new(MEMORIES_COLLECTION).filter(filter))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn count_facts(&self) -> Result<u64> {
        let response = self
            .client
            .count(qdrant_client::qdrant::CountPointsBuilder::new(FACTS_COLLECTION))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn get_importance_distribution(&self) -> Result<Vec<f64>> {
        Ok(self.scroll_all(false, false).await?.into_iter().map(|(m, _)| m.importance).collect())
    }

    async fn find_by_content_hash(&self, content_hash: &str) -> Result<Option<MemoryId>> {
        let filter = Filter { must: vec![Condition::matches("content_hash", content_hash.to_string()), Condition::is_empty("superseded_by")], ..Default::default() };
        let response = self
            .client
            .scroll(ScrollPointsBuilder::new(MEMORIES_COLLECTION).filter(filter).with_payload(true).limit(1))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        response.result.first().map(Self::memory_from_payload).transpose().map(|m| m.map(|m| m.id))
    }

    async fn store_fact(&self, fact: &Fact, embedding: &[f32]) -> Result<()> {
        let payload = Payload::try_from(serde_json::to_value(fact)?).map_err(|e| Error::Internal(e.to_string()))?;
        let key = format!("{}:{}", fact.parent_id.as_str(), fact.fact_index);
        let point = PointStruct::new(point_id_for(&key), embedding.to_vec(), payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(FACTS_COLLECTION, vec![point]))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        Ok(())
    }

    async fn search_facts(&self, embedding: &[f32], limit: usize) -> Result<Vec<(Fact, f64)>> {
        let response = self
            .client
            .search_points(SearchPointsBuilder::new(FACTS_COLLECTION, embedding.to_vec(), limit as u64).with_payload(true))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        response
            .result
            .into_iter()
            .map(|scored| {
                let json = qdrant_client::Payload::from(scored.payload).into();
                let fact: Fact = serde_json::from_value(json)?;
                Ok((fact, f64::from(scored.score)))
            })
            .collect()
    }

    async fn create_anti_pattern(&self, anti_pattern: &AntiPattern, embedding: &[f32]) -> Result<()> {
        let payload = Payload::try_from(serde_json::to_value(anti_pattern)?).map_err(|e| Error::Internal(e.to_string()))?;
        let point = PointStruct::new(point_id_for(anti_pattern.id.as_str()), embedding.to_vec(), payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(ANTI_PATTERNS_COLLECTION, vec![point]))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        Ok(())
    }

    async fn get_anti_pattern(&self, id: &MemoryId) -> Result<Option<AntiPattern>> {
        let response = self
            .client
            .get_points(GetPointsBuilder::new(ANTI_PATTERNS_COLLECTION, vec![point_id_for(id.as_str())]).with_payload(true))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        response
            .result
            .into_iter()
            .next()
            .map(|p| {
                let json = qdrant_client::Payload::from(p.payload).into();
                serde_json::from_value(json).map_err(Error::from)
            })
            .transpose()
    }

    async fn delete_anti_pattern(&self, id: &MemoryId) -> Result<()> {
        let ids = PointsIdsList { ids: vec![point_id_for(id.as_str())] };
        self.client
            .delete_points(DeletePointsBuilder::new(ANTI_PATTERNS_COLLECTION).points(ids))
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        Ok(())
    }

    async fn increment_triggered(&self, id: &MemoryId) -> Result<()> {
        if let Some(mut anti_pattern) = self.get_anti_pattern(id).await? {
            anti_pattern.times_triggered += 1;
            let payload = Payload::try_from(serde_json::json!({ "times_triggered": anti_pattern.times_triggered })).map_err(|e| Error::Internal(e.to_string()))?;
            self.client
                .set_payload(SetPayloadPointsBuilder::new(ANTI_PATTERNS_COLLECTION, payload).points_selector(vec![point_id_for(id.as_str())]))
                .await
                .map_err(|e| err(Backend::Vector, e))?;
        }
        Ok(())
    }

    async fn search_anti_patterns(&self, embedding: &[f32], limit: usize, min_similarity: f64) -> Result<Vec<(AntiPattern, f64)>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(ANTI_PATTERNS_COLLECTION, embedding.to_vec(), limit as u64)
                    .score_threshold(min_similarity as f32)
                    .with_payload(true),
            )
            .await
            .map_err(|e| err(Backend::Vector, e))?;
        response
            .result
            .into_iter()
            .map(|scored| {
                let json = qdrant_client::Payload::from(scored.payload).into();
                let anti_pattern: AntiPattern = serde_json::from_value(json)?;
                Ok((anti_pattern, f64::from(scored.score)))
            })
            .collect()
    }
}

#[allow(dead_code)]
fn point_id_matches(id: &PointId, uuid: &str) -> bool {
    matches!(&id.point_id_options, Some(PointIdOptions::Uuid(u)) if u == uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_stable_and_unique() {
        let a = point_id_for("01HXYZ1");
        let b = point_id_for("01HXYZ1");
        let c = point_id_for("01HXYZ2");
        assert_eq!(format!("{a:?}"), format!("{b:?}"));
        assert_ne!(format!("{a:?}"), format!("{c:?}"));
    }
}
