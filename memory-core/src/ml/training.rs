//! Offline training for the reranker and signal classifier (spec.md §4.11),
//! ported from `original_source/src/core/reranker_trainer.py` and
//! `signal_classifier_trainer.py`.
//!
//! Neither the teacher nor the pack carries a linear-algebra/ML crate
//! dependency suited to this (the teacher's `augurs`/`argmin` stack is for
//! changepoint detection, a different problem shape), so training is a
//! small hand-rolled batch-gradient-descent logistic regression — the same
//! algorithm `sklearn.linear_model.LogisticRegression` fits, just without
//! the dependency. Only the *baked* weights are used by inference
//! (`ml::reranker`, `ml::classifier`), so this module runs offline/in the
//! admin CLI's `ml retrain-ranker` command, never on the request path.

use super::classifier::{ConversationTurn, SignalClassifier, ClassifierMetadata, tfidf_transform, extract_conversation_features, CONV_FEATURE_NAMES};
use super::reranker::{RerankerMetadata, RerankerModel, FEATURE_NAMES};
use crate::types::SignalType;
use chrono::Utc;
use std::collections::HashMap;

/// Minimum feedback-audit rows required to (re)train the reranker.
pub const RERANKER_MIN_SAMPLES: usize = 30;
/// Minimum labeled conversations required to train the signal classifier.
pub const CLASSIFIER_MIN_SAMPLES: usize = 20;

const LEARNING_RATE: f64 = 0.1;
const L2_REG: f64 = 0.01;
const EPOCHS: usize = 500;

/// Mean/scale of each feature column, the `StandardScaler` equivalent.
struct Scaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Scaler {
    fn fit(x: &[Vec<f64>], n_features: usize) -> Self {
        let n = x.len() as f64;
        let mut mean = vec![0.0; n_features];
        for row in x {
            for (i, v) in row.iter().enumerate() {
                mean[i] += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut var = vec![0.0; n_features];
        for row in x {
            for (i, v) in row.iter().enumerate() {
                var[i] += (v - mean[i]).powi(2);
            }
        }
        let scale: Vec<f64> = var.into_iter().map(|v| (v / n).sqrt().max(1e-9)).collect();

        Self { mean, scale }
    }

    fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter().enumerate().map(|(i, v)| (v - self.mean[i]) / self.scale[i]).collect()
    }
}

/// Batch gradient descent on standardized features with class-balanced
/// sample weighting and L2 regularization. Returns `(coef, intercept)` in
/// *standardized* feature space — callers bake the scaler in afterward.
fn fit_logistic_regression(x_scaled: &[Vec<f64>], y: &[u8], n_features: usize) -> (Vec<f64>, f64) {
    let n = x_scaled.len() as f64;
    let n_pos = y.iter().filter(|&&l| l == 1).count().max(1) as f64;
    let n_neg = y.iter().filter(|&&l| l == 0).count().max(1) as f64;
    // class_weight="balanced": weight inversely proportional to class frequency.
    let w_pos = n / (2.0 * n_pos);
    let w_neg = n / (2.0 * n_neg);

    let mut coef = vec![0.0_f64; n_features];
    let mut intercept = 0.0_f64;

    for _ in 0..EPOCHS {
        let mut grad_w = vec![0.0_f64; n_features];
        let mut grad_b = 0.0_f64;

        for (row, &label) in x_scaled.iter().zip(y.iter()) {
            let z: f64 = coef.iter().zip(row.iter()).map(|(c, v)| c * v).sum::<f64>() + intercept;
            let pred = super::sigmoid(z);
            let weight = if label == 1 { w_pos } else { w_neg };
            let error = weight * (pred - f64::from(label));

            for (g, v) in grad_w.iter_mut().zip(row.iter()) {
                *g += error * v;
            }
            grad_b += error;
        }

        for (c, g) in coef.iter_mut().zip(grad_w.iter()) {
            *c -= LEARNING_RATE * (g / n + L2_REG * *c);
        }
        intercept -= LEARNING_RATE * (grad_b / n);
    }

    (coef, intercept)
}

/// Fold the standard scaler into `(coef, intercept)` so inference is a
/// plain dot product over raw (unscaled) features (spec.md §4.11,
/// "Train, bake the scaler").
fn bake_scaler(coef: &[f64], intercept: f64, scaler: &Scaler) -> (Vec<f64>, f64) {
    let w_eff: Vec<f64> = coef.iter().zip(scaler.scale.iter()).map(|(c, s)| c / s).collect();
    let b_eff = intercept - coef.iter().zip(scaler.mean.iter()).zip(scaler.scale.iter()).map(|((c, m), s)| c * m / s).sum::<f64>();
    (w_eff, b_eff)
}

/// Rough k-fold cross-validation accuracy, used only to populate
/// `cv_score` in the persisted metadata (not a training-loop input).
fn cross_val_accuracy(x: &[Vec<f64>], y: &[u8], n_features: usize, folds: usize) -> f64 {
    if x.len() < folds * 2 {
        return f64::NAN;
    }
    let fold_size = x.len() / folds;
    let mut correct = 0usize;
    let mut total = 0usize;

    for fold in 0..folds {
        let test_start = fold * fold_size;
        let test_end = if fold == folds - 1 { x.len() } else { test_start + fold_size };

        let train_x: Vec<Vec<f64>> = x.iter().enumerate().filter(|(i, _)| *i < test_start || *i >= test_end).map(|(_, v)| v.clone()).collect();
        let train_y: Vec<u8> = y.iter().enumerate().filter(|(i, _)| *i < test_start || *i >= test_end).map(|(_, v)| *v).collect();
        if train_x.is_empty() {
            continue;
        }

        let scaler = Scaler::fit(&train_x, n_features);
        let scaled: Vec<Vec<f64>> = train_x.iter().map(|r| scaler.transform(r)).collect();
        let (coef, intercept) = fit_logistic_regression(&scaled, &train_y, n_features);
        let (w, b) = bake_scaler(&coef, intercept, &scaler);

        for i in test_start..test_end {
            let dot: f64 = w.iter().zip(x[i].iter()).map(|(wi, xi)| wi * xi).sum::<f64>() + b;
            let pred = if super::sigmoid(dot) > 0.5 { 1 } else { 0 };
            if pred == y[i] {
                correct += 1;
            }
            total += 1;
        }
    }

    if total == 0 {
        f64::NAN
    } else {
        correct as f64 / total as f64
    }
}

/// A single reconstructed feedback-audit training row (spec.md §4.11.1).
#[derive(Debug, Clone)]
pub struct RerankerTrainingRow {
    pub features: [f64; 11],
    pub useful: bool,
}

/// Train the reranker from feedback-audit rows. Returns `Err` (caller
/// aborts the retrain) if fewer than [`RERANKER_MIN_SAMPLES`] rows exist.
pub fn train_reranker(rows: &[RerankerTrainingRow]) -> Result<RerankerModel, String> {
    if rows.len() < RERANKER_MIN_SAMPLES {
        return Err(format!("insufficient training data: {} samples (minimum {RERANKER_MIN_SAMPLES} required)", rows.len()));
    }

    let n_features = FEATURE_NAMES.len();
    let x: Vec<Vec<f64>> = rows.iter().map(|r| r.features.to_vec()).collect();
    let y: Vec<u8> = rows.iter().map(|r| u8::from(r.useful)).collect();

    let scaler = Scaler::fit(&x, n_features);
    let x_scaled: Vec<Vec<f64>> = x.iter().map(|r| scaler.transform(r)).collect();
    let (coef, intercept) = fit_logistic_regression(&x_scaled, &y, n_features);
    let (weights, bias) = bake_scaler(&coef, intercept, &scaler);

    let folds = if rows.len() >= 50 { 5 } else { 3 };
    let cv_score = cross_val_accuracy(&x, &y, n_features, folds);

    let mut w = [0.0_f64; 11];
    w.copy_from_slice(&weights);

    Ok(RerankerModel {
        weights: w,
        bias,
        metadata: RerankerMetadata {
            trained_at: Some(Utc::now()),
            n_samples: Some(rows.len()),
            cv_score: if cv_score.is_nan() { None } else { Some(cv_score) },
            features: FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect(),
        },
    })
}

/// A single labeled conversation sample for classifier training.
#[derive(Debug, Clone)]
pub struct ClassifierTrainingSample {
    pub turns: Vec<ConversationTurn>,
    pub is_signal: bool,
    pub signal_type: Option<SignalType>,
}

/// Build a TF-IDF vocabulary (capped at `max_terms`) and document-frequency
/// IDF weights from a training corpus.
fn build_vocab(samples: &[ClassifierTrainingSample], max_terms: usize) -> (HashMap<String, usize>, Vec<f64>) {
    let mut doc_freq: HashMap<String, usize> = HashMap::new();
    let n_docs = samples.len().max(1);

    for sample in samples {
        let text = sample.turns.iter().map(|t| t.content.as_str()).collect::<Vec<_>>().join(" ").to_lowercase();
        let mut seen = std::collections::HashSet::new();
        for token in text.split(|c: char| !c.is_alphanumeric()) {
            if token.len() > 1 {
                seen.insert(token.to_string());
            }
        }
        for token in seen {
            *doc_freq.entry(token).or_insert(0) += 1;
        }
    }

    let mut terms: Vec<(String, usize)> = doc_freq.into_iter().collect();
    // Most-common terms first, capped: mirrors sklearn's TfidfVectorizer(max_features=500).
    terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    terms.truncate(max_terms);

    let mut vocab = HashMap::new();
    let mut idf = vec![0.0; terms.len()];
    for (idx, (term, df)) in terms.into_iter().enumerate() {
        vocab.insert(term, idx);
        idf[idx] = (n_docs as f64 / (1.0 + df as f64)).ln() + 1.0;
    }
    (vocab, idf)
}

fn feature_vector(sample: &ClassifierTrainingSample, vocab: &HashMap<String, usize>, idf: &[f64]) -> Vec<f64> {
    let all_text = sample.turns.iter().map(|t| t.content.as_str()).collect::<Vec<_>>().join(" ");
    let mut v = tfidf_transform(&all_text, vocab, idf);
    v.extend_from_slice(&extract_conversation_features(&sample.turns));
    v
}

/// Train both classifier heads (binary gate + multi-class type) from a
/// labeled corpus. Returns `Err` if fewer than [`CLASSIFIER_MIN_SAMPLES`]
/// samples exist.
pub fn train_signal_classifier(samples: &[ClassifierTrainingSample]) -> Result<SignalClassifier, String> {
    if samples.len() < CLASSIFIER_MIN_SAMPLES {
        return Err(format!("insufficient training data: {} samples (minimum {CLASSIFIER_MIN_SAMPLES} required)", samples.len()));
    }

    let (vocab, idf) = build_vocab(samples, 500);
    let n_features = vocab.len() + CONV_FEATURE_NAMES.len();

    let x: Vec<Vec<f64>> = samples.iter().map(|s| feature_vector(s, &vocab, &idf)).collect();
    let y_binary: Vec<u8> = samples.iter().map(|s| u8::from(s.is_signal)).collect();

    let binary_scaler = Scaler::fit(&x, n_features);
    let x_binary_scaled: Vec<Vec<f64>> = x.iter().map(|r| binary_scaler.transform(r)).collect();
    let (coef, intercept) = fit_logistic_regression(&x_binary_scaled, &y_binary, n_features);
    let (binary_weights, binary_bias) = bake_scaler(&coef, intercept, &binary_scaler);
    let binary_cv = cross_val_accuracy(&x, &y_binary, n_features, if samples.len() >= 50 { 5 } else { 3 });

    // Type classifier trains on positives only, one-vs-rest per class.
    let positive_idx: Vec<usize> = samples.iter().enumerate().filter(|(_, s)| s.is_signal && s.signal_type.is_some()).map(|(i, _)| i).collect();
    let mut type_classes = Vec::new();
    let mut type_weights = Vec::new();
    let mut type_biases = Vec::new();
    let mut type_cv = None;

    if positive_idx.len() >= CLASSIFIER_MIN_SAMPLES {
        let pos_x: Vec<Vec<f64>> = positive_idx.iter().map(|&i| x[i].clone()).collect();
        let pos_labels: Vec<SignalType> = positive_idx.iter().map(|&i| samples[i].signal_type.unwrap()).collect();
        let scaler = Scaler::fit(&pos_x, n_features);
        let pos_x_scaled: Vec<Vec<f64>> = pos_x.iter().map(|r| scaler.transform(r)).collect();

        let mut cv_scores = Vec::new();
        for class in SignalType::ALL {
            let y_cls: Vec<u8> = pos_labels.iter().map(|l| u8::from(*l == class)).collect();
            if y_cls.iter().all(|&v| v == 0) || y_cls.iter().all(|&v| v == 1) {
                continue;
            }
            let (coef, intercept) = fit_logistic_regression(&pos_x_scaled, &y_cls, n_features);
            let (w, b) = bake_scaler(&coef, intercept, &scaler);
            cv_scores.push(cross_val_accuracy(&pos_x, &y_cls, n_features, 3));
            type_classes.push(class);
            type_weights.push(w);
            type_biases.push(b);
        }
        if !cv_scores.is_empty() {
            type_cv = Some(cv_scores.iter().sum::<f64>() / cv_scores.len() as f64);
        }
    }

    Ok(SignalClassifier {
        vocab,
        idf_weights: idf,
        binary_weights,
        binary_bias,
        type_classes,
        type_weights,
        type_biases,
        metadata: ClassifierMetadata {
            trained_at: Some(Utc::now()),
            n_samples: Some(samples.len()),
            binary_cv_score: if binary_cv.is_nan() { None } else { Some(binary_cv) },
            type_cv_score: type_cv,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linearly_separable_rows(n: usize) -> Vec<RerankerTrainingRow> {
        (0..n)
            .map(|i| {
                let useful = i % 2 == 0;
                let importance = if useful { 0.9 } else { 0.1 };
                RerankerTrainingRow { features: [importance, 0.5, 0.5, 0.0, 10.0, 100.0, 0.0, 0.5, importance, 0.0, 0.0], useful }
            })
            .collect()
    }

    #[test]
    fn rejects_insufficient_samples() {
        let rows = linearly_separable_rows(5);
        assert!(train_reranker(&rows).is_err());
    }

    #[test]
    fn trains_and_predicts_above_chance() {
        let rows = linearly_separable_rows(60);
        let model = train_reranker(&rows).expect("should train with 60 samples");
        let high = model.predict(&[0.9, 0.5, 0.5, 0.0, 10.0, 100.0, 0.0, 0.5, 0.9, 0.0, 0.0]);
        let low = model.predict(&[0.1, 0.5, 0.5, 0.0, 10.0, 100.0, 0.0, 0.5, 0.1, 0.0, 0.0]);
        assert!(high > low, "higher-importance-and-similarity row should score higher");
    }

    #[test]
    fn classifier_rejects_insufficient_samples() {
        let samples = vec![ClassifierTrainingSample {
            turns: vec![ConversationTurn { role: "user".to_string(), content: "hi".to_string() }],
            is_signal: false,
            signal_type: None,
        }];
        assert!(train_signal_classifier(&samples).is_err());
    }
}
