use crate::context::Context;
use crate::output::{Output, OutputFormat};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub vector_ok: bool,
    pub graph_ok: bool,
    pub row_ok: bool,
    pub ephemeral_ok: bool,
    pub embedding_ok: bool,
    pub memory_count: u64,
    pub pinned_count: u64,
    pub fact_count: u64,
    pub active_sessions: u64,
    pub avg_edge_strength: f64,
}

impl Output for HealthReport {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "memory engine health")?;
        writeln!(writer, "  vector store:     {}", status(self.vector_ok))?;
        writeln!(writer, "  graph store:      {}", status(self.graph_ok))?;
        writeln!(writer, "  row store:        {}", status(self.row_ok))?;
        writeln!(writer, "  ephemeral store:  {}", status(self.ephemeral_ok))?;
        writeln!(writer, "  embedding backend:{}", status(self.embedding_ok))?;
        writeln!(writer, "  memories:         {}", self.memory_count)?;
        writeln!(writer, "  pinned:           {}", self.pinned_count)?;
        writeln!(writer, "  facts:            {}", self.fact_count)?;
        writeln!(writer, "  active sessions:  {}", self.active_sessions)?;
        writeln!(writer, "  avg edge strength:{:.3}", self.avg_edge_strength)?;
        Ok(())
    }
}

fn status(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "unreachable"
    }
}

pub async fn run(ctx: &Context, format: OutputFormat) -> anyhow::Result<()> {
    let vector_ok = ctx.vectors.count().await.is_ok();
    let graph_ok = ctx.graph.get_statistics().await.is_ok();
    let row_ok = ctx.rows.list_audit(1).await.is_ok();
    let ephemeral_ok = ctx.ephemeral.active_session_count().await.is_ok();
    let embedding_ok = ctx.embeddings.health_check().await.is_ok();

    let report = HealthReport {
        vector_ok,
        graph_ok,
        row_ok,
        ephemeral_ok,
        embedding_ok,
        memory_count: ctx.vectors.count().await.unwrap_or(0),
        pinned_count: ctx.vectors.count_pinned().await.unwrap_or(0),
        fact_count: ctx.vectors.count_facts().await.unwrap_or(0),
        active_sessions: ctx.ephemeral.active_session_count().await.unwrap_or(0),
        avg_edge_strength: ctx.graph.get_avg_edge_strength().await.unwrap_or(0.0),
    };

    format.print_output(&report)?;
    if !(vector_ok && graph_ok && row_ok && ephemeral_ok) {
        anyhow::bail!(do_memory_core::Error::Unavailable(do_memory_core::Backend::Vector, "one or more backends unreachable".to_string()));
    }
    Ok(())
}
