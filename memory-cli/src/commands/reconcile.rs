//! `memory-cli reconcile`: repairs vector-only rows left behind by a
//! cancelled or half-failed two-phase write (spec.md §5: "partial in-flight
//! backend writes to the vector/graph stores should be allowed to complete
//! and be reconciled lazily — never leave a graph-only or vector-only
//! row"). `create_memory_node` is an idempotent upsert, so re-running it
//! for every vector memory is safe and cheap; memories that already have a
//! graph node are unaffected.

use crate::context::Context;
use crate::output::{Output, OutputFormat};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct ReconcileReport {
    pub checked: u64,
    pub upserted: u64,
    pub errors: u64,
}

impl Output for ReconcileReport {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "checked:  {}", self.checked)?;
        writeln!(writer, "upserted: {}", self.upserted)?;
        writeln!(writer, "errors:   {}", self.errors)?;
        Ok(())
    }
}

pub async fn run(ctx: &Context, format: OutputFormat) -> anyhow::Result<()> {
    let scrolled = ctx.vectors.scroll_all(true, false).await?;
    let mut report = ReconcileReport { checked: 0, upserted: 0, errors: 0 };

    for (memory, _) in scrolled {
        report.checked += 1;
        match ctx.graph.create_memory_node(&memory).await {
            Ok(()) => report.upserted += 1,
            Err(err) => {
                tracing::warn!(memory_id = %memory.id, error = %err, "reconcile: graph node upsert failed");
                report.errors += 1;
            }
        }
    }

    format.print_output(&report)?;
    Ok(())
}
