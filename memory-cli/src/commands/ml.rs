//! `memory-cli ml retrain-ranker` / `ml reranker-status`.
//!
//! Training rows are reconstructed from Postgres `audit_log` "feedback"
//! entries, mirroring `original_source/src/core/reranker_trainer.py`'s
//! `collect_training_data`: an enriched entry (carrying `importance`,
//! `stability`, `confidence`, `access_count`, `pinned`, `durability`
//! alongside `similarity`/`useful`) yields a full feature vector; an older,
//! pre-enrichment entry falls back to `old_importance` alone with the rest
//! defaulted, rather than being dropped. `hours_since_last_access` and
//! `hours_since_creation` aren't present in either audit shape (the
//! snapshot wasn't taken at retrieval time), so both default to 0.0 here
//! exactly as the original does.

use crate::context::Context;
use crate::output::{Output, OutputFormat};
use do_memory_core::ml::reranker::RerankerMetadata;
use do_memory_core::ml::training::{train_reranker, RerankerTrainingRow};
use do_memory_core::storage::RERANKER_WEIGHTS_KEY;
use serde::Serialize;
use std::io::Write;

const AUDIT_SCAN_LIMIT: usize = 10_000;

fn durability_score(value: Option<&serde_json::Value>) -> f64 {
    match value.and_then(serde_json::Value::as_str) {
        Some("ephemeral") => 0.0,
        Some("permanent") => 1.0,
        _ => 0.5,
    }
}

fn row_from_details(details: &serde_json::Value) -> Option<RerankerTrainingRow> {
    let useful = details.get("useful")?.as_bool()?;
    let similarity = details.get("similarity").and_then(serde_json::Value::as_f64).unwrap_or(0.0);

    if let Some(importance) = details.get("importance").and_then(serde_json::Value::as_f64) {
        let access_count = details.get("access_count").and_then(serde_json::Value::as_u64).unwrap_or(0);
        let features = [
            importance,
            details.get("stability").and_then(serde_json::Value::as_f64).unwrap_or(0.5),
            details.get("confidence").and_then(serde_json::Value::as_f64).unwrap_or(0.5),
            (access_count as f64).ln_1p(),
            0.0,
            0.0,
            f64::from(details.get("pinned").and_then(serde_json::Value::as_bool).unwrap_or(false)),
            durability_score(details.get("durability")),
            similarity,
            0.0,
            0.0,
        ];
        return Some(RerankerTrainingRow { features, useful });
    }

    let old_importance = details.get("old_importance").and_then(serde_json::Value::as_f64)?;
    let features = [old_importance, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.5, similarity, 0.0, 0.0];
    Some(RerankerTrainingRow { features, useful })
}

#[derive(Debug, Serialize)]
pub struct RetrainReport {
    pub n_samples: usize,
    pub trained: bool,
    pub metadata: Option<RerankerMetadata>,
}

impl Output for RetrainReport {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        if self.trained {
            writeln!(writer, "retrained reranker on {} sample(s)", self.n_samples)?;
            if let Some(meta) = &self.metadata {
                if let Some(score) = meta.cv_score {
                    writeln!(writer, "cross-val accuracy: {score:.4}")?;
                }
            }
        } else {
            writeln!(writer, "not enough feedback samples to retrain ({} available)", self.n_samples)?;
        }
        Ok(())
    }
}

pub async fn retrain_ranker(ctx: &Context, format: OutputFormat) -> anyhow::Result<()> {
    let audit = ctx.rows.list_audit(AUDIT_SCAN_LIMIT).await?;
    let rows: Vec<RerankerTrainingRow> = audit.iter().filter(|e| e.action == "feedback").filter_map(|e| row_from_details(&e.details)).collect();
    let n_samples = rows.len();

    match train_reranker(&rows) {
        Ok(model) => {
            let value = serde_json::to_value(&model)?;
            ctx.ephemeral.set_model_weights(RERANKER_WEIGHTS_KEY, &value).await?;
            format.print_output(&RetrainReport { n_samples, trained: true, metadata: Some(model.metadata) })?;
            Ok(())
        }
        Err(message) => {
            format.print_output(&RetrainReport { n_samples, trained: false, metadata: None })?;
            Err(do_memory_core::Error::InvalidInput(message).into())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RerankerStatus {
    pub present: bool,
    pub metadata: Option<RerankerMetadata>,
}

impl Output for RerankerStatus {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        if let Some(meta) = &self.metadata {
            writeln!(writer, "trained_at: {:?}", meta.trained_at)?;
            writeln!(writer, "n_samples:  {:?}", meta.n_samples)?;
            writeln!(writer, "cv_score:   {:?}", meta.cv_score)?;
        } else {
            writeln!(writer, "no reranker weights stored yet (using the untrained default)")?;
        }
        Ok(())
    }
}

pub async fn reranker_status(ctx: &Context, format: OutputFormat) -> anyhow::Result<()> {
    let value = ctx.ephemeral.get_model_weights(RERANKER_WEIGHTS_KEY).await?;
    let metadata = value.and_then(|v| serde_json::from_value::<do_memory_core::ml::reranker::RerankerModel>(v).ok()).map(|m| m.metadata);
    format.print_output(&RerankerStatus { present: metadata.is_some(), metadata })?;
    Ok(())
}

