//! In-memory [`GraphStore`] fake: adjacency list keyed by node id, BFS for
//! `find_related`/`find_path` instead of a Cypher traversal.

use async_trait::async_trait;
use do_memory_core::error::Result;
use do_memory_core::storage::{GraphNeighbor, GraphStatistics, GraphStore};
use do_memory_core::{Durability, Memory, MemoryId, Relationship, RelationshipType};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Clone)]
struct Node {
    memory_type: do_memory_core::MemoryType,
    domain: String,
    importance: f64,
    #[allow(dead_code)]
    superseded_by: Option<MemoryId>,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<MemoryId, Node>,
    edges: Vec<Relationship>,
}

/// In-memory [`GraphStore`].
#[derive(Default)]
pub struct InMemoryGraphStore {
    inner: Mutex<Inner>,
}

impl InMemoryGraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn create_memory_node(&self, memory: &Memory) -> Result<()> {
        self.inner.lock().nodes.insert(
            memory.id.clone(),
            Node { memory_type: memory.memory_type, domain: memory.domain.clone(), importance: memory.importance, superseded_by: memory.superseded_by.clone() },
        );
        Ok(())
    }

    async fn create_relationship(&self, relationship: &Relationship) -> Result<()> {
        self.inner.lock().edges.push(relationship.clone());
        Ok(())
    }

    async fn strengthen_relationship(&self, source: &MemoryId, target: &MemoryId, increment: f64) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(edge) = inner
            .edges
            .iter_mut()
            .find(|e| e.relationship_type == RelationshipType::RelatedTo && &e.source_id == source && &e.target_id == target)
        {
            edge.strength = (edge.strength + increment).clamp(0.0, 1.0);
        } else {
            inner.edges.push(Relationship::new(source.clone(), target.clone(), RelationshipType::RelatedTo, increment));
        }
        Ok(())
    }

    async fn find_related(&self, id: &MemoryId, types: Option<&[RelationshipType]>, max_depth: u32, limit: usize) -> Result<Vec<GraphNeighbor>> {
        let inner = self.inner.lock();
        let max_depth = max_depth.clamp(1, 15);
        let mut visited: HashSet<MemoryId> = HashSet::from([id.clone()]);
        let mut queue: VecDeque<(MemoryId, u32, Vec<f64>)> = VecDeque::from([(id.clone(), 0, Vec::new())]);
        let mut out = Vec::new();
        while let Some((current, depth, chain)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for edge in &inner.edges {
                if let Some(types) = types {
                    if !types.contains(&edge.relationship_type) {
                        continue;
                    }
                }
                let neighbor = if edge.source_id == current {
                    Some(&edge.target_id)
                } else if edge.target_id == current {
                    Some(&edge.source_id)
                } else {
                    None
                };
                let Some(neighbor) = neighbor else { continue };
                if visited.contains(neighbor) {
                    continue;
                }
                visited.insert(neighbor.clone());
                let mut next_chain = chain.clone();
                next_chain.push(edge.strength);
                if let Some(node) = inner.nodes.get(neighbor) {
                    out.push(GraphNeighbor {
                        id: neighbor.clone(),
                        memory_type: node.memory_type,
                        domain: node.domain.clone(),
                        importance: node.importance,
                        distance: depth + 1,
                        rel_strengths: next_chain.clone(),
                    });
                }
                queue.push_back((neighbor.clone(), depth + 1, next_chain));
            }
        }
        out.truncate(limit);
        Ok(out)
    }

    async fn find_path(&self, src: &MemoryId, dst: &MemoryId, max_depth: u32) -> Result<Option<Vec<MemoryId>>> {
        let inner = self.inner.lock();
        let max_depth = max_depth.clamp(1, 15);
        let mut visited: HashSet<MemoryId> = HashSet::from([src.clone()]);
        let mut queue: VecDeque<(MemoryId, Vec<MemoryId>)> = VecDeque::from([(src.clone(), vec![src.clone()])]);
        while let Some((current, path)) = queue.pop_front() {
            if &current == dst {
                return Ok(Some(path));
            }
            if path.len() as u32 > max_depth {
                continue;
            }
            for edge in &inner.edges {
                let neighbor = if edge.source_id == current {
                    Some(&edge.target_id)
                } else if edge.target_id == current {
                    Some(&edge.source_id)
                } else {
                    None
                };
                let Some(neighbor) = neighbor else { continue };
                if visited.contains(neighbor) {
                    continue;
                }
                visited.insert(neighbor.clone());
                let mut next_path = path.clone();
                next_path.push(neighbor.clone());
                queue.push_back((neighbor.clone(), next_path));
            }
        }
        Ok(None)
    }

    async fn get_subgraph(&self, ids: &[MemoryId]) -> Result<(Vec<Memory>, Vec<Relationship>)> {
        let inner = self.inner.lock();
        let id_set: HashSet<&MemoryId> = ids.iter().collect();
        let relationships: Vec<Relationship> = inner.edges.iter().filter(|e| id_set.contains(&e.source_id) && id_set.contains(&e.target_id)).cloned().collect();
        Ok((Vec::new(), relationships))
    }

    async fn find_contradictions(&self, ids: &[MemoryId]) -> Result<Vec<(MemoryId, MemoryId)>> {
        let inner = self.inner.lock();
        let id_set: HashSet<&MemoryId> = ids.iter().collect();
        Ok(inner
            .edges
            .iter()
            .filter(|e| e.relationship_type == RelationshipType::Contradicts && id_set.contains(&e.source_id) && id_set.contains(&e.target_id))
            .map(|e| (e.source_id.clone(), e.target_id.clone()))
            .collect())
    }

    async fn get_bulk_edge_strengths(&self, ids: &[MemoryId]) -> Result<HashMap<MemoryId, f64>> {
        let inner = self.inner.lock();
        let mut out = HashMap::new();
        for id in ids {
            let sum: f64 = inner
                .edges
                .iter()
                .filter(|e| e.relationship_type == RelationshipType::RelatedTo && (&e.source_id == id || &e.target_id == id))
                .map(|e| e.strength)
                .sum();
            out.insert(id.clone(), sum);
        }
        Ok(out)
    }

    async fn get_high_gravity_memories(&self, min_strength: f64) -> Result<Vec<(MemoryId, f64)>> {
        let inner = self.inner.lock();
        let mut sums: HashMap<MemoryId, f64> = HashMap::new();
        for edge in inner.edges.iter().filter(|e| e.relationship_type == RelationshipType::RelatedTo) {
            *sums.entry(edge.source_id.clone()).or_insert(0.0) += edge.strength;
            *sums.entry(edge.target_id.clone()).or_insert(0.0) += edge.strength;
        }
        Ok(sums.into_iter().filter(|(_, s)| *s >= min_strength).collect())
    }

    async fn get_avg_edge_strength(&self) -> Result<f64> {
        let inner = self.inner.lock();
        if inner.edges.is_empty() {
            return Ok(0.0);
        }
        Ok(inner.edges.iter().map(|e| e.strength).sum::<f64>() / inner.edges.len() as f64)
    }

    async fn get_relationships_for_memory(&self, id: &MemoryId) -> Result<Vec<Relationship>> {
        let inner = self.inner.lock();
        Ok(inner.edges.iter().filter(|e| &e.source_id == id || &e.target_id == id).cloned().collect())
    }

    async fn mark_superseded(&self, id: &MemoryId, superseded_by: &MemoryId) -> Result<()> {
        if let Some(node) = self.inner.lock().nodes.get_mut(id) {
            node.superseded_by = Some(superseded_by.clone());
        }
        Ok(())
    }

    async fn update_importance(&self, id: &MemoryId, importance: f64) -> Result<()> {
        if let Some(node) = self.inner.lock().nodes.get_mut(id) {
            node.importance = importance;
        }
        Ok(())
    }

    async fn set_pinned(&self, _id: &MemoryId, _pinned: bool) -> Result<()> {
        Ok(())
    }

    async fn set_durability(&self, _id: &MemoryId, _durability: Durability) -> Result<()> {
        Ok(())
    }

    async fn delete_memory(&self, id: &MemoryId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.nodes.remove(id);
        inner.edges.retain(|e| &e.source_id != id && &e.target_id != id);
        Ok(())
    }

    async fn get_statistics(&self) -> Result<GraphStatistics> {
        let inner = self.inner.lock();
        Ok(GraphStatistics { node_count: inner.nodes.len() as u64, edge_count: inner.edges.len() as u64 })
    }
}
