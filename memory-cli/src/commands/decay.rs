use crate::context::Context;
use crate::output::{Output, OutputFormat};
use do_memory_core::workers::decay::DecayWorker;
use std::io::Write;

impl Output for do_memory_core::workers::decay::DecayStats {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "processed: {}", self.processed)?;
        writeln!(writer, "decayed:   {}", self.decayed)?;
        writeln!(writer, "stable:    {}", self.stable)?;
        Ok(())
    }
}

pub async fn run(ctx: &Context, simulate_hours: f64, format: OutputFormat) -> anyhow::Result<()> {
    let worker = DecayWorker::new(ctx.vectors.clone(), ctx.graph.clone(), ctx.rows.clone(), ctx.config.importance_decay_rate);
    let stats = worker.run(simulate_hours).await?;
    format.print_output(&stats)?;
    Ok(())
}
