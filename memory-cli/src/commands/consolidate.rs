use crate::context::Context;
use crate::output::{Output, OutputFormat};
use do_memory_core::workers::consolidation::{ConsolidationFilters, ConsolidationWorker};
use do_memory_core::types::MemoryType;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct ConsolidateReport {
    pub merged_clusters: usize,
    pub results: Vec<do_memory_core::ConsolidationResult>,
}

impl Output for ConsolidateReport {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "merged {} cluster(s)", self.merged_clusters)?;
        for result in &self.results {
            writeln!(writer, "  {} source(s) -> {}", result.source_memories.len(), result.merged_memory.id)?;
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn run(ctx: &Context, memory_type: Option<MemoryType>, domain: Option<String>, dry_run: bool, format: OutputFormat) -> anyhow::Result<()> {
    let worker = ConsolidationWorker::new(
        ctx.vectors.clone(),
        ctx.graph.clone(),
        ctx.rows.clone(),
        ctx.embeddings.clone(),
        Some(ctx.llm.clone()),
        ctx.config.consolidation_threshold,
        ctx.config.min_importance_for_retrieval,
        ctx.config.min_cluster_size,
    );
    let filters = ConsolidationFilters { memory_type, domain, dry_run };
    let results = worker.consolidate(&filters).await?;
    let report = ConsolidateReport { merged_clusters: results.len(), results };
    format.print_output(&report)?;
    Ok(())
}
