//! Neo4j-backed [`GraphStore`](do_memory_core::storage::GraphStore)
//! adapter. Memories are `:Memory` nodes keyed by `id`; relationships are
//! typed edges whose Cypher label is the relationship type's uppercase
//! wire name (`RelationshipType::as_edge_label`), which is spliced
//! directly into the query string since Cypher doesn't allow
//! parameterized edge types. `edge_label_is_safe` revalidates that name
//! against `^[A-Z_][A-Z0-9_]*$` before every query that templates one in,
//! so a future caller adding a type can't accidentally open an injection
//! hole.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use do_memory_core::error::{Backend, Error, Result};
use do_memory_core::storage::{GraphNeighbor, GraphStatistics, GraphStore};
use do_memory_core::{Durability, Memory, MemoryId, MemoryType, Relationship, RelationshipType};
use futures::TryStreamExt;
use neo4rs::{query, Graph, Node, Row};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn edge_label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("static pattern is valid"))
}

fn edge_label_is_safe(label: &str) -> bool {
    edge_label_pattern().is_match(label)
}

fn err(e: impl std::fmt::Display) -> Error {
    Error::Unavailable(Backend::Graph, e.to_string())
}

fn all_relationship_labels() -> Vec<&'static str> {
    [
        RelationshipType::RelatedTo,
        RelationshipType::CausedBy,
        RelationshipType::SolvedBy,
        RelationshipType::Supersedes,
        RelationshipType::DerivedFrom,
        RelationshipType::Contradicts,
        RelationshipType::Requires,
        RelationshipType::PartOf,
    ]
    .iter()
    .map(RelationshipType::as_edge_label)
    .collect()
}

/// Wraps a `neo4rs::Graph` connection pool.
pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    /// # Errors
    /// Returns an error if the driver cannot connect or the uniqueness
    /// constraint on `Memory.id` cannot be created.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password).await.map_err(err)?;
        graph
            .run(query("CREATE CONSTRAINT memory_id IF NOT EXISTS FOR (m:Memory) REQUIRE m.id IS UNIQUE"))
            .await
            .map_err(err)?;
        Ok(Self { graph })
    }

    fn node_to_neighbor(node: &Node, distance: u32, rel_strengths: Vec<f64>) -> Option<GraphNeighbor> {
        let id: String = node.get("id").ok()?;
        let memory_type_str: String = node.get("memory_type").ok()?;
        let domain: String = node.get("domain").ok().unwrap_or_default();
        let importance: f64 = node.get("importance").ok().unwrap_or(0.0);
        let memory_type = match memory_type_str.as_str() {
            "episodic" => MemoryType::Episodic,
            "procedural" => MemoryType::Procedural,
            "working" => MemoryType::Working,
            _ => MemoryType::Semantic,
        };
        Some(GraphNeighbor { id: MemoryId(id), memory_type, domain, importance, distance, rel_strengths })
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn create_memory_node(&self, memory: &Memory) -> Result<()> {
        let q = query(
            "MERGE (m:Memory {id: $id}) \
             SET m.memory_type = $memory_type, m.domain = $domain, m.importance = $importance, \
                 m.pinned = $pinned, m.durability = $durability, m.superseded_by = $superseded_by",
        )
        .param("id", memory.id.as_str())
        .param("memory_type", serde_json::to_value(memory.memory_type)?.as_str().unwrap_or_default())
        .param("domain", memory.domain.as_str())
        .param("importance", memory.importance)
        .param("pinned", memory.pinned)
        .param("durability", serde_json::to_value(memory.durability)?.as_str().unwrap_or_default())
        .param("superseded_by", memory.superseded_by.as_ref().map(|id| id.as_str().to_string()));
        self.graph.run(q).await.map_err(err)?;
        Ok(())
    }

    async fn create_relationship(&self, relationship: &Relationship) -> Result<()> {
        let label = relationship.relationship_type.as_edge_label();
        if !edge_label_is_safe(label) {
            return Err(Error::Internal(format!("unsafe edge label: {label}")));
        }
        let cypher = format!(
            "MATCH (a:Memory {{id: $source}}), (b:Memory {{id: $target}}) \
             MERGE (a)-[r:{label}]->(b) SET r.strength = $strength, r.created_at = $created_at"
        );
        let q = query(&cypher)
            .param("source", relationship.source_id.as_str())
            .param("target", relationship.target_id.as_str())
            .param("strength", relationship.strength)
            .param("created_at", relationship.created_at.timestamp_millis());
        self.graph.run(q).await.map_err(err)?;
        Ok(())
    }

    async fn strengthen_relationship(&self, source: &MemoryId, target: &MemoryId, increment: f64) -> Result<()> {
        let label = RelationshipType::RelatedTo.as_edge_label();
        let cypher = format!(
            "MATCH (a:Memory {{id: $source}}), (b:Memory {{id: $target}}) \
             MERGE (a)-[r:{label}]->(b) \
             ON CREATE SET r.strength = $increment, r.created_at = timestamp() \
             ON MATCH SET r.strength = CASE WHEN r.strength + $increment > 1.0 THEN 1.0 \
                                            WHEN r.strength + $increment < 0.0 THEN 0.0 \
                                            ELSE r.strength + $increment END"
        );
        let q = query(&cypher).param("source", source.as_str()).param("target", target.as_str()).param("increment", increment);
        self.graph.run(q).await.map_err(err)?;
        Ok(())
    }

    async fn find_related(&self, id: &MemoryId, types: Option<&[RelationshipType]>, max_depth: u32, limit: usize) -> Result<Vec<GraphNeighbor>> {
        let max_depth = max_depth.clamp(1, 15);
        let labels: Vec<&str> = types.map(|t| t.iter().map(RelationshipType::as_edge_label).collect()).unwrap_or_else(all_relationship_labels);
        for label in &labels {
            if !edge_label_is_safe(label) {
                return Err(Error::Internal(format!("unsafe edge label: {label}")));
            }
        }
        let rel_pattern = labels.join("|");
        let cypher = format!(
            "MATCH path = (m:Memory {{id: $id}})-[r:{rel_pattern}*1..{max_depth}]-(n:Memory) \
             WHERE n.id <> $id \
             RETURN n, length(path) AS distance, [rel IN relationships(path) | rel.strength] AS strengths \
             LIMIT $limit"
        );
        let q = query(&cypher).param("id", id.as_str()).param("limit", limit as i64);
        let mut stream = self.graph.execute(q).await.map_err(err)?;
        let mut out = Vec::new();
        while let Some(row) = stream.next().await.map_err(err)? {
            let Some(node) = row_node(&row, "n") else { continue };
            let distance: i64 = row.get("distance").unwrap_or(1);
            let strengths: Vec<f64> = row.get("strengths").unwrap_or_default();
            if let Some(neighbor) = Self::node_to_neighbor(&node, distance.max(1) as u32, strengths) {
                out.push(neighbor);
            }
        }
        out.truncate(limit);
        Ok(out)
    }

    async fn find_path(&self, src: &MemoryId, dst: &MemoryId, max_depth: u32) -> Result<Option<Vec<MemoryId>>> {
        let max_depth = max_depth.clamp(1, 15);
        let cypher = format!(
            "MATCH path = shortestPath((a:Memory {{id: $src}})-[*1..{max_depth}]-(b:Memory {{id: $dst}})) \
             RETURN [n IN nodes(path) | n.id] AS ids"
        );
        let q = query(&cypher).param("src", src.as_str()).param("dst", dst.as_str());
        let mut stream = self.graph.execute(q).await.map_err(err)?;
        if let Some(row) = stream.next().await.map_err(err)? {
            let ids: Vec<String> = row.get("ids").unwrap_or_default();
            if ids.is_empty() {
                return Ok(None);
            }
            return Ok(Some(ids.into_iter().map(MemoryId).collect()));
        }
        Ok(None)
    }

    async fn get_subgraph(&self, ids: &[MemoryId]) -> Result<(Vec<Memory>, Vec<Relationship>)> {
        let id_strs: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let cypher = "MATCH (a:Memory)-[r]->(b:Memory) WHERE a.id IN $ids AND b.id IN $ids \
                      RETURN a.id AS source, b.id AS target, type(r) AS rel_type, r.strength AS strength, r.created_at AS created_at";
        let q = query(cypher).param("ids", id_strs);
        let mut stream = self.graph.execute(q).await.map_err(err)?;
        let mut relationships = Vec::new();
        while let Some(row) = stream.next().await.map_err(err)? {
            let source: String = row.get("source").unwrap_or_default();
            let target: String = row.get("target").unwrap_or_default();
            let rel_type: String = row.get("rel_type").unwrap_or_default();
            let strength: f64 = row.get("strength").unwrap_or(0.0);
            let created_millis: i64 = row.get("created_at").unwrap_or(0);
            let Some(relationship_type) = relationship_type_from_label(&rel_type) else { continue };
            relationships.push(Relationship {
                source_id: MemoryId(source),
                target_id: MemoryId(target),
                relationship_type,
                strength,
                created_at: Utc.timestamp_millis_opt(created_millis).single().unwrap_or_else(Utc::now),
            });
        }
        Ok((Vec::new(), relationships))
    }

    async fn find_contradictions(&self, ids: &[MemoryId]) -> Result<Vec<(MemoryId, MemoryId)>> {
        let label = RelationshipType::Contradicts.as_edge_label();
        let id_strs: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let cypher = format!("MATCH (a:Memory)-[:{label}]-(b:Memory) WHERE a.id IN $ids AND b.id IN $ids RETURN a.id AS source, b.id AS target");
        let q = query(&cypher).param("ids", id_strs);
        let mut stream = self.graph.execute(q).await.map_err(err)?;
        let mut out = Vec::new();
        while let Some(row) = stream.next().await.map_err(err)? {
            let source: String = row.get("source").unwrap_or_default();
            let target: String = row.get("target").unwrap_or_default();
            out.push((MemoryId(source), MemoryId(target)));
        }
        Ok(out)
    }

    async fn get_bulk_edge_strengths(&self, ids: &[MemoryId]) -> Result<HashMap<MemoryId, f64>> {
        let label = RelationshipType::RelatedTo.as_edge_label();
        let id_strs: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let cypher = format!(
            "MATCH (m:Memory)-[r:{label}]-() WHERE m.id IN $ids \
             RETURN m.id AS id, sum(r.strength) AS total"
        );
        let q = query(&cypher).param("ids", id_strs);
        let mut stream = self.graph.execute(q).await.map_err(err)?;
        let mut out = HashMap::new();
        while let Some(row) = stream.next().await.map_err(err)? {
            let id: String = row.get("id").unwrap_or_default();
            let total: f64 = row.get("total").unwrap_or(0.0);
            out.insert(MemoryId(id), total);
        }
        Ok(out)
    }

    async fn get_high_gravity_memories(&self, min_strength: f64) -> Result<Vec<(MemoryId, f64)>> {
        let label = RelationshipType::RelatedTo.as_edge_label();
        let cypher = format!(
            "MATCH (m:Memory)-[r:{label}]-() \
             WITH m, sum(r.strength) AS total \
             WHERE total >= $min_strength \
             RETURN m.id AS id, total"
        );
        let q = query(&cypher).param("min_strength", min_strength);
        let mut stream = self.graph.execute(q).await.map_err(err)?;
        let mut out = Vec::new();
        while let Some(row) = stream.next().await.map_err(err)? {
            let id: String = row.get("id").unwrap_or_default();
            let total: f64 = row.get("total").unwrap_or(0.0);
            out.push((MemoryId(id), total));
        }
        Ok(out)
    }

    async fn get_avg_edge_strength(&self) -> Result<f64> {
        let label = RelationshipType::RelatedTo.as_edge_label();
        let cypher = format!("MATCH ()-[r:{label}]->() RETURN avg(r.strength) AS avg");
        let mut stream = self.graph.execute(query(&cypher)).await.map_err(err)?;
        if let Some(row) = stream.next().await.map_err(err)? {
            return Ok(row.get::<f64>("avg").unwrap_or(0.0));
        }
        Ok(0.0)
    }

    async fn get_relationships_for_memory(&self, id: &MemoryId) -> Result<Vec<Relationship>> {
        let cypher = "MATCH (a:Memory {id: $id})-[r]-(b:Memory) \
                      RETURN a.id AS source, b.id AS target, type(r) AS rel_type, r.strength AS strength, r.created_at AS created_at, \
                             startNode(r).id AS real_source";
        let q = query(cypher).param("id", id.as_str());
        let mut stream = self.graph.execute(q).await.map_err(err)?;
        let mut out = Vec::new();
        while let Some(row) = stream.next().await.map_err(err)? {
            let source: String = row.get("real_source").unwrap_or_default();
            let a: String = row.get("source").unwrap_or_default();
            let b: String = row.get("target").unwrap_or_default();
            let target = if source == a { b } else { a };
            let rel_type: String = row.get("rel_type").unwrap_or_default();
            let strength: f64 = row.get("strength").unwrap_or(0.0);
            let created_millis: i64 = row.get("created_at").unwrap_or(0);
            let Some(relationship_type) = relationship_type_from_label(&rel_type) else { continue };
            out.push(Relationship {
                source_id: MemoryId(source),
                target_id: MemoryId(target),
                relationship_type,
                strength,
                created_at: Utc.timestamp_millis_opt(created_millis).single().unwrap_or_else(Utc::now),
            });
        }
        Ok(out)
    }

    async fn mark_superseded(&self, id: &MemoryId, superseded_by: &MemoryId) -> Result<()> {
        let q = query("MATCH (m:Memory {id: $id}) SET m.superseded_by = $superseded_by")
            .param("id", id.as_str())
            .param("superseded_by", superseded_by.as_str());
        self.graph.run(q).await.map_err(err)?;
        Ok(())
    }

    async fn update_importance(&self, id: &MemoryId, importance: f64) -> Result<()> {
        let q = query("MATCH (m:Memory {id: $id}) SET m.importance = $importance").param("id", id.as_str()).param("importance", importance);
        self.graph.run(q).await.map_err(err)?;
        Ok(())
    }

    async fn set_pinned(&self, id: &MemoryId, pinned: bool) -> Result<()> {
        let q = query("MATCH (m:Memory {id: $id}) SET m.pinned = $pinned").param("id", id.as_str()).param("pinned", pinned);
        self.graph.run(q).await.map_err(err)?;
        Ok(())
    }

    async fn set_durability(&self, id: &MemoryId, durability: Durability) -> Result<()> {
        let value = serde_json::to_value(durability)?.as_str().unwrap_or_default().to_string();
        let q = query("MATCH (m:Memory {id: $id}) SET m.durability = $durability").param("id", id.as_str()).param("durability", value);
        self.graph.run(q).await.map_err(err)?;
        Ok(())
    }

    async fn delete_memory(&self, id: &MemoryId) -> Result<()> {
        let q = query("MATCH (m:Memory {id: $id}) DETACH DELETE m").param("id", id.as_str());
        self.graph.run(q).await.map_err(err)?;
        Ok(())
    }

    async fn get_statistics(&self) -> Result<GraphStatistics> {
        let mut stream = self
            .graph
            .execute(query("MATCH (m:Memory) WITH count(m) AS nodes MATCH ()-[r]->() RETURN nodes, count(r) AS edges"))
            .await
            .map_err(err)?;
        if let Some(row) = stream.next().await.map_err(err)? {
            let node_count: i64 = row.get("nodes").unwrap_or(0);
            let edge_count: i64 = row.get("edges").unwrap_or(0);
            return Ok(GraphStatistics { node_count: node_count.max(0) as u64, edge_count: edge_count.max(0) as u64 });
        }
        Ok(GraphStatistics::default())
    }
}

fn row_node(row: &Row, key: &str) -> Option<Node> {
    row.get::<Node>(key).ok()
}

fn relationship_type_from_label(label: &str) -> Option<RelationshipType> {
    all_relationship_labels_with_types().into_iter().find(|(l, _)| *l == label).map(|(_, t)| t)
}

fn all_relationship_labels_with_types() -> Vec<(&'static str, RelationshipType)> {
    [
        RelationshipType::RelatedTo,
        RelationshipType::CausedBy,
        RelationshipType::SolvedBy,
        RelationshipType::Supersedes,
        RelationshipType::DerivedFrom,
        RelationshipType::Contradicts,
        RelationshipType::Requires,
        RelationshipType::PartOf,
    ]
    .iter()
    .map(|t| (t.as_edge_label(), *t))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_labels_are_identifier_safe() {
        for label in all_relationship_labels() {
            assert!(edge_label_is_safe(label), "{label} should match ^[A-Z_][A-Z0-9_]*$");
        }
        assert!(!edge_label_is_safe("RELATED_TO} MATCH (n) DETACH DELETE n //"));
    }
}
