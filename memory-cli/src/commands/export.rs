//! `memory-cli export`: streams every non-superseded memory as JSONL,
//! honoring `export_include_embeddings_default` unless overridden on the
//! command line (spec.md §6).

use crate::context::Context;
use serde_json::json;
use std::io::Write;

pub async fn run(ctx: &Context, include_embeddings: Option<bool>, mut writer: impl Write) -> anyhow::Result<u64> {
    let with_vectors = include_embeddings.unwrap_or(ctx.config.export_include_embeddings_default);
    let scrolled = ctx.vectors.scroll_all(false, with_vectors).await?;
    let mut count = 0u64;
    for (memory, embedding) in scrolled {
        let mut line = serde_json::to_value(&memory)?;
        if with_vectors {
            line["embedding"] = json!(embedding);
        }
        writeln!(writer, "{line}")?;
        count += 1;
    }
    Ok(count)
}
