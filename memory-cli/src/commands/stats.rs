use crate::context::Context;
use crate::output::{Output, OutputFormat};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub memory_count: u64,
    pub pinned_count: u64,
    pub fact_count: u64,
    pub node_count: u64,
    pub edge_count: u64,
    pub avg_edge_strength: f64,
    pub importance_distribution: Vec<f64>,
    pub action_counts_30d: std::collections::HashMap<String, u64>,
}

impl Output for StatsReport {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "memories:    {}", self.memory_count)?;
        writeln!(writer, "pinned:      {}", self.pinned_count)?;
        writeln!(writer, "facts:       {}", self.fact_count)?;
        writeln!(writer, "graph nodes: {}", self.node_count)?;
        writeln!(writer, "graph edges: {} (avg strength {:.3})", self.edge_count, self.avg_edge_strength)?;
        writeln!(writer, "importance samples: {}", self.importance_distribution.len())?;
        writeln!(writer, "feedback actions (30d):")?;
        let mut actions: Vec<_> = self.action_counts_30d.iter().collect();
        actions.sort_by_key(|(k, _)| (*k).clone());
        for (action, count) in actions {
            writeln!(writer, "  {action}: {count}")?;
        }
        Ok(())
    }
}

pub async fn run(ctx: &Context, format: OutputFormat) -> anyhow::Result<()> {
    let graph_stats = ctx.graph.get_statistics().await?;
    let report = StatsReport {
        memory_count: ctx.vectors.count().await?,
        pinned_count: ctx.vectors.count_pinned().await?,
        fact_count: ctx.vectors.count_facts().await?,
        node_count: graph_stats.node_count,
        edge_count: graph_stats.edge_count,
        avg_edge_strength: ctx.graph.get_avg_edge_strength().await.unwrap_or(0.0),
        importance_distribution: ctx.vectors.get_importance_distribution().await.unwrap_or_default(),
        action_counts_30d: ctx.rows.get_action_counts(30).await.unwrap_or_default(),
    };
    format.print_output(&report)?;
    Ok(())
}
