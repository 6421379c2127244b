//! Reranker model: 11-feature logistic regression over retrieval results
//! (spec.md §4.11.1), ported from `original_source/src/core/reranker.py`.

use crate::types::{Durability, RetrievalResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sigmoid;

/// Feature names, in order. Persisted alongside weights so a training run
/// can assert it produced a vector of the expected shape.
pub const FEATURE_NAMES: [&str; 11] = [
    "importance",
    "stability",
    "confidence",
    "log1p_access_count",
    "hours_since_last_access",
    "hours_since_creation",
    "is_pinned",
    "durability_score",
    "similarity",
    "has_graph_path",
    "retrieval_path_len",
];

fn durability_score(durability: Durability) -> f64 {
    match durability {
        Durability::Ephemeral => 0.0,
        Durability::Durable => 0.5,
        Durability::Permanent => 1.0,
    }
}

/// Extract the 11-feature vector for a retrieval result as of `now`.
///
/// `retrieval_path_len` may legitimately be 0 for vector-only hits; per
/// spec.md §9 open question #3 this is a nuisance feature kept for shape
/// stability with the persisted weight vector, not dropped.
#[must_use]
pub fn extract_features(result: &RetrievalResult, now: DateTime<Utc>) -> [f64; 11] {
    let memory = &result.memory;
    let hours_since_access = (now - memory.last_accessed).num_seconds().max(0) as f64 / 3600.0;
    let hours_since_creation = (now - memory.created_at).num_seconds().max(0) as f64 / 3600.0;
    let has_graph_path = result.retrieval_path.len() > 1;

    [
        memory.importance,
        memory.stability,
        memory.confidence,
        (memory.access_count as f64).ln_1p(),
        hours_since_access.min(720.0),
        hours_since_creation.min(8760.0),
        f64::from(memory.pinned),
        durability_score(memory.durability),
        result.similarity,
        f64::from(has_graph_path),
        result.retrieval_path.len() as f64,
    ]
}

/// Training metadata persisted alongside the baked weights, surfaced by
/// `GET /admin/ml/reranker-status`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RerankerMetadata {
    pub trained_at: Option<DateTime<Utc>>,
    pub n_samples: Option<usize>,
    pub cv_score: Option<f64>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Logistic-regression reranker with the `StandardScaler` already baked
/// into `weights`/`bias` (spec.md §4.11: `w_eff[i] = coef[i]/scale[i]`,
/// `b_eff = intercept - Σ coef[i]·mean[i]/scale[i]`). Inference is a plain
/// dot product plus sigmoid; no scaler object is needed at serving time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerModel {
    pub weights: [f64; 11],
    pub bias: f64,
    #[serde(default)]
    pub metadata: RerankerMetadata,
}

impl RerankerModel {
    /// `P(useful) = sigmoid(w·x + b)`.
    #[must_use]
    pub fn predict(&self, features: &[f64; 11]) -> f64 {
        let dot: f64 = self.weights.iter().zip(features.iter()).map(|(w, x)| w * x).sum::<f64>() + self.bias;
        sigmoid(dot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MemoryId;
    use crate::types::{Memory, MemorySource, MemoryType};

    fn sample_result() -> RetrievalResult {
        let memory = Memory::new("content", MemoryType::Semantic, MemorySource::User, "general");
        RetrievalResult { memory, score: 0.0, similarity: 0.42, graph_distance: 0, retrieval_path: vec![MemoryId::generate()] }
    }

    #[test]
    fn feature_vector_has_11_entries_in_order() {
        let result = sample_result();
        let features = extract_features(&result, Utc::now());
        assert_eq!(features.len(), FEATURE_NAMES.len());
        assert!((features[8] - 0.42).abs() < 1e-9, "similarity must be feature index 8");
        assert_eq!(features[9], 0.0, "single-hop path has no graph traversal");
    }

    #[test]
    fn predict_matches_manual_sigmoid() {
        let model = RerankerModel { weights: [0.1; 11], bias: -0.2, metadata: RerankerMetadata::default() };
        let features = [1.0; 11];
        let dot: f64 = 0.1 * 11.0 - 0.2;
        let expected = 1.0 / (1.0 + (-dot).exp());
        assert!((model.predict(&features) - expected).abs() < 1e-12);
    }

    #[test]
    fn scaler_bake_round_trip_is_scale_invariant() {
        // w, b trained on standardized x* = (x - mean)/scale; baked weights
        // must reproduce the same prediction when fed raw x (spec.md §8).
        let coef = [0.5_f64, -0.3];
        let intercept = 0.1_f64;
        let mean = [2.0_f64, 5.0];
        let scale = [4.0_f64, 2.0];
        let raw_x = [6.0_f64, 3.0];

        let standardized: Vec<f64> = raw_x.iter().zip(mean.iter()).zip(scale.iter()).map(|((x, m), s)| (x - m) / s).collect();
        let direct_dot: f64 = coef.iter().zip(standardized.iter()).map(|(c, x)| c * x).sum::<f64>() + intercept;

        let w_eff: Vec<f64> = coef.iter().zip(scale.iter()).map(|(c, s)| c / s).collect();
        let b_eff = intercept - coef.iter().zip(mean.iter()).zip(scale.iter()).map(|((c, m), s)| c * m / s).sum::<f64>();
        let baked_dot: f64 = w_eff.iter().zip(raw_x.iter()).map(|(w, x)| w * x).sum::<f64>() + b_eff;

        assert!((direct_dot - baked_dot).abs() < 1e-9);
    }
}
