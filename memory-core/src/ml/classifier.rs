//! Signal classifier: TF-IDF + logistic regression over conversation turns
//! (spec.md §4.11.2), ported from
//! `original_source/src/core/signal_classifier.py`.
//!
//! Two heads share the same feature vector: a binary "is this a signal?"
//! gate and a multi-class "which type?" classifier, both scored by the same
//! dot-product-plus-sigmoid form as the reranker.

use crate::types::SignalType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

use super::sigmoid;

pub const CONV_FEATURE_NAMES: [&str; 8] =
    ["turn_count", "total_char_count", "avg_turn_length", "question_density", "code_density", "user_turn_ratio", "has_error_keywords", "has_decision_keywords"];

static CODE_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`|def\s|function\s|import\s|class\s|const\s|let\s|var\s|=>\s|\bif\s*\(|\bfor\s*\(|\breturn\s|\.py\b|\.js\b|\.ts\b").unwrap()
});
static ERROR_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(error|fix|bug|crash|fail|broke|exception|traceback|stack\s*trace|not\s+working|issue|problem|debug)\b").unwrap()
});
static DECISION_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(decide|decision|let's\s+go\s+with|recommend|choose|prefer|approach|strategy|option|trade-?off|we\s+should)\b").unwrap()
});
static WORD_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").unwrap());

/// A single turn of a conversation: speaker role plus free text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

fn tokenize(text: &str) -> Vec<String> {
    WORD_SPLIT.split(&text.to_lowercase()).filter(|t| t.len() > 1).map(str::to_string).collect()
}

/// Pure-math TF-IDF transform from a baked vocabulary and IDF weight table,
/// L2-normalized, `1 + log(tf)` term weighting.
#[must_use]
pub fn tfidf_transform(text: &str, vocab: &HashMap<String, usize>, idf_weights: &[f64]) -> Vec<f64> {
    let mut vec = vec![0.0_f64; vocab.len()];
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return vec;
    }

    let mut tf: HashMap<&str, u32> = HashMap::new();
    for token in &tokens {
        if vocab.contains_key(token) {
            *tf.entry(token.as_str()).or_insert(0) += 1;
        }
    }

    for (token, count) in tf {
        if let Some(&idx) = vocab.get(token) {
            vec[idx] = (1.0 + f64::from(count).ln()) * idf_weights.get(idx).copied().unwrap_or(0.0);
        }
    }

    let norm = vec.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}

/// Extract the 8 hand-crafted conversation-level features (spec.md §4.11.2).
#[must_use]
pub fn extract_conversation_features(turns: &[ConversationTurn]) -> [f64; 8] {
    if turns.is_empty() {
        return [0.0; 8];
    }
    let turn_count = turns.len() as f64;
    let total_chars: f64 = turns.iter().map(|t| t.content.len() as f64).sum();
    let avg_turn_length = total_chars / turn_count;

    let questions = turns.iter().filter(|t| t.content.contains('?')).count() as f64;
    let question_density = questions / turn_count;

    let code_turns = turns.iter().filter(|t| CODE_PATTERNS.is_match(&t.content)).count() as f64;
    let code_density = code_turns / turn_count;

    let user_turns = turns.iter().filter(|t| t.role == "user").count() as f64;
    let user_turn_ratio = user_turns / turn_count;

    let all_text = turns.iter().map(|t| t.content.as_str()).collect::<Vec<_>>().join(" ");
    let has_error = f64::from(ERROR_KEYWORDS.is_match(&all_text));
    let has_decision = f64::from(DECISION_KEYWORDS.is_match(&all_text));

    [turn_count, total_chars, avg_turn_length, question_density, code_density, user_turn_ratio, has_error, has_decision]
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClassifierMetadata {
    pub trained_at: Option<chrono::DateTime<chrono::Utc>>,
    pub n_samples: Option<usize>,
    pub binary_cv_score: Option<f64>,
    pub type_cv_score: Option<f64>,
}

/// Prediction produced by [`SignalClassifier::predict`].
#[derive(Debug, Clone)]
pub struct ClassifierPrediction {
    pub is_signal: bool,
    pub signal_probability: f64,
    pub predicted_type: Option<SignalType>,
    pub type_probabilities: HashMap<SignalType, f64>,
}

/// TF-IDF + logistic regression signal classifier with baked-in weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalClassifier {
    pub vocab: HashMap<String, usize>,
    pub idf_weights: Vec<f64>,
    pub binary_weights: Vec<f64>,
    pub binary_bias: f64,
    pub type_classes: Vec<SignalType>,
    pub type_weights: Vec<Vec<f64>>,
    pub type_biases: Vec<f64>,
    #[serde(default)]
    pub metadata: ClassifierMetadata,
}

impl SignalClassifier {
    /// Gate + classify a window of conversation turns.
    #[must_use]
    pub fn predict(&self, turns: &[ConversationTurn]) -> ClassifierPrediction {
        let all_text = turns.iter().map(|t| t.content.as_str()).collect::<Vec<_>>().join(" ");
        let tfidf_vec = tfidf_transform(&all_text, &self.vocab, &self.idf_weights);
        let conv_features = extract_conversation_features(turns);

        let mut features = tfidf_vec;
        features.extend_from_slice(&conv_features);

        let binary_dot: f64 = self.binary_weights.iter().zip(features.iter()).map(|(w, f)| w * f).sum::<f64>() + self.binary_bias;
        let signal_probability = sigmoid(binary_dot);
        let is_signal = signal_probability > 0.5;

        let mut type_probabilities = HashMap::new();
        let mut predicted_type = None;

        if is_signal && !self.type_classes.is_empty() {
            let mut best_score = f64::NEG_INFINITY;
            for (i, class) in self.type_classes.iter().enumerate() {
                let weights = &self.type_weights[i];
                let score: f64 = weights.iter().zip(features.iter()).map(|(w, f)| w * f).sum::<f64>() + self.type_biases[i];
                let prob = sigmoid(score);
                type_probabilities.insert(*class, prob);
                if score > best_score {
                    best_score = score;
                    predicted_type = Some(*class);
                }
            }
        }

        ClassifierPrediction { is_signal, signal_probability, predicted_type, type_probabilities }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tfidf_is_l2_normalized() {
        let mut vocab = HashMap::new();
        vocab.insert("error".to_string(), 0);
        vocab.insert("fix".to_string(), 1);
        let idf = vec![1.2, 0.8];
        let vec = tfidf_transform("error error fix", &vocab, &idf);
        let norm: f64 = vec.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9 || vec.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn conversation_features_detect_error_keywords() {
        let turns = vec![
            ConversationTurn { role: "user".to_string(), content: "The server crashed with a traceback".to_string() },
            ConversationTurn { role: "assistant".to_string(), content: "Let's fix it".to_string() },
        ];
        let features = extract_conversation_features(&turns);
        assert_eq!(features[6], 1.0, "has_error_keywords");
    }

    #[test]
    fn empty_turns_yield_zero_features() {
        assert_eq!(extract_conversation_features(&[]), [0.0; 8]);
    }
}
