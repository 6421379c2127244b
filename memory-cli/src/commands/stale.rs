//! `memory-cli stale [list|resolve]`. "Stale" memories are non-pinned,
//! non-superseded memories whose importance has decayed below
//! `min_importance_for_retrieval` — retrieval will never surface them again
//! (spec.md §4.6 stage filtering), but they still occupy storage and graph
//! edges. `resolve` marks one superseded by itself (a terminal tombstone,
//! since there's no better replacement) so it's excluded from future scrolls
//! and consolidation/decay passes that filter on `include_superseded`.

use crate::context::Context;
use crate::output::{Output, OutputFormat};
use do_memory_core::MemoryId;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct StaleMemory {
    pub id: MemoryId,
    pub domain: String,
    pub importance: f64,
    pub last_accessed: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct StaleList {
    pub threshold: f64,
    pub memories: Vec<StaleMemory>,
}

impl Output for StaleList {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "{} stale memorie(s) below importance {:.3}", self.memories.len(), self.threshold)?;
        for m in &self.memories {
            writeln!(writer, "  {} [{}] importance={:.3} last_accessed={}", m.id, m.domain, m.importance, m.last_accessed)?;
        }
        Ok(())
    }
}

pub async fn list(ctx: &Context, format: OutputFormat) -> anyhow::Result<()> {
    let threshold = ctx.config.min_importance_for_retrieval;
    let scrolled = ctx.vectors.scroll_all(false, false).await?;
    let memories = scrolled
        .into_iter()
        .filter(|(m, _)| !m.pinned && m.importance < threshold)
        .map(|(m, _)| StaleMemory { id: m.id, domain: m.domain, importance: m.importance, last_accessed: m.last_accessed })
        .collect();
    format.print_output(&StaleList { threshold, memories })?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ResolveReport {
    pub id: MemoryId,
    pub resolved: bool,
}

impl Output for ResolveReport {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "{}: {}", self.id, if self.resolved { "resolved" } else { "not found" })?;
        Ok(())
    }
}

pub async fn resolve(ctx: &Context, id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let id = MemoryId(id.to_string());
    let resolved = ctx.vectors.get(&id).await?.is_some();
    if resolved {
        ctx.vectors.mark_superseded(&id, &id).await?;
        ctx.graph.mark_superseded(&id, &id).await?;
    }
    format.print_output(&ResolveReport { id, resolved })?;
    Ok(())
}
