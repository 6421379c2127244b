use crate::context::Context;
use crate::output::{Output, OutputFormat};
use do_memory_core::workers::patterns::{PatternExtractionStats, PatternExtractor};
use std::io::Write;

impl Output for PatternExtractionStats {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "candidates found:  {}", self.candidates_found)?;
        writeln!(writer, "clusters formed:   {}", self.clusters_formed)?;
        writeln!(writer, "patterns created:  {}", self.patterns_created)?;
        writeln!(writer, "duplicates skipped:{}", self.duplicates_skipped)?;
        Ok(())
    }
}

pub async fn run(ctx: &Context, format: OutputFormat) -> anyhow::Result<()> {
    let extractor = PatternExtractor::new(ctx.vectors.clone(), ctx.graph.clone(), ctx.rows.clone(), ctx.embeddings.clone());
    let stats = extractor.run().await?;
    format.print_output(&stats)?;
    Ok(())
}
