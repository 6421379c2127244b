use crate::context::Context;
use crate::output::{Output, OutputFormat};
use do_memory_core::types::AuditEntry;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct AuditList {
    pub entries: Vec<AuditEntry>,
}

impl Output for AuditList {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        for entry in &self.entries {
            writeln!(writer, "{} {} actor={} memory={:?}", entry.timestamp, entry.action, entry.actor, entry.memory_id)?;
        }
        Ok(())
    }
}

pub async fn run(ctx: &Context, limit: usize, format: OutputFormat) -> anyhow::Result<()> {
    let entries = ctx.rows.list_audit(limit).await?;
    format.print_output(&AuditList { entries })?;
    Ok(())
}
