//! LLM-based signal extraction from a conversation window (spec.md
//! §4.10.3), ported from `original_source/src/core/signal_detector.py`.
//!
//! A cheap ML pre-classifier gates expensive LLM calls; this module only
//! concerns the LLM extraction step itself, called when the gate passes.

use crate::error::{Error, Result};
use crate::llm::{GenerateOptions, LlmClient};
use crate::types::{Durability, MemorySource, Signal, SignalType};
use serde_json::Value;

const PROMPT_TEMPLATE: &str = r#"Analyze this conversation excerpt and extract any noteworthy signals worth remembering long-term.

A signal is one of these types: error_fix, decision, pattern, preference, fact, workflow, contradiction, warning.

Conversation:
{conversation}

Return a JSON array of signals. Each signal has:
- "signal_type": one of the eight types above
- "content": a concise, self-contained statement of the signal
- "confidence": a float from 0 to 1
- "suggested_domain": a short domain label, or null
- "suggested_tags": an array of short tags
- "suggested_importance": a float from 0 to 1, or null
- "suggested_durability": one of "ephemeral", "durable", "permanent", or null

Return ONLY the JSON array, no preamble. If there are no noteworthy signals, return an empty array []."#;

/// Builds the extraction prompt from a flattened conversation window
/// (spec.md §4.10.3 step 2).
#[must_use]
pub fn build_prompt(conversation: &str) -> String {
    PROMPT_TEMPLATE.replace("{conversation}", conversation)
}

/// Runs LLM-based signal extraction over a conversation window, retrying
/// once with a stricter instruction if the first response fails to parse
/// (spec.md §4.10.3 step 3).
pub async fn extract_signals(llm: &dyn LlmClient, conversation: &str, source: MemorySource) -> Result<Vec<Signal>> {
    let options = GenerateOptions { temperature: 0.2, json_mode: true, dormant_think: true };
    let prompt = build_prompt(conversation);

    let raw = llm.generate(&prompt, options.clone()).await?;
    if let Some(signals) = parse_signals(&raw, source) {
        return Ok(signals);
    }

    let retry_prompt = format!("{prompt}\n\nYour previous response could not be parsed as JSON. Return ONLY valid JSON, nothing else.");
    let raw_retry = llm.generate(&retry_prompt, options).await?;
    parse_signals(&raw_retry, source).ok_or_else(|| Error::Internal("signal extraction returned unparseable output twice".to_string()))
}

/// Tolerant JSON parsing (spec.md §4.10.3 step 3): accepts a bare array, a
/// wrapped object under `signals`/`results`/`items`/`data`, or a single
/// object treated as a one-element array.
fn parse_signals(raw: &str, source: MemorySource) -> Option<Vec<Signal>> {
    let trimmed = strip_code_fence(raw.trim());
    let value: Value = serde_json::from_str(trimmed).ok()?;

    let array = match value {
        Value::Array(items) => items,
        Value::Object(ref map) => {
            let wrapped = ["signals", "results", "items", "data"].iter().find_map(|key| map.get(*key)).and_then(Value::as_array);
            match wrapped {
                Some(items) => items.clone(),
                None => vec![value.clone()],
            }
        }
        _ => return None,
    };

    let signals: Vec<Signal> = array.iter().filter_map(|item| parse_one_signal(item, source)).collect();
    Some(signals)
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.strip_prefix("```json").or_else(|| text.strip_prefix("```")).unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

fn parse_one_signal(item: &Value, source: MemorySource) -> Option<Signal> {
    let obj = item.as_object()?;

    let signal_type = obj.get("signal_type").and_then(Value::as_str).and_then(SignalType::from_str_loose)?;
    let content = obj.get("content").and_then(Value::as_str)?.trim().to_string();
    if content.is_empty() {
        return None;
    }

    let confidence = obj.get("confidence").and_then(Value::as_f64).unwrap_or_else(|| signal_type.default_importance()).clamp(0.0, 1.0);

    let suggested_domain = obj.get("suggested_domain").and_then(Value::as_str).map(str::to_string);

    let suggested_tags = obj
        .get("suggested_tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    // The LLM sometimes reports importance on a 1-10 scale instead of 0-1
    // (spec.md §4.10.4 step 4); rescale before clamping so e.g. `7` lands
    // at 0.7 rather than being clamped straight to 1.0.
    let suggested_importance = obj.get("suggested_importance").and_then(Value::as_f64).map(|v| {
        let normalized = if v > 1.0 { v / 10.0 } else { v };
        normalized.clamp(0.1, 1.0)
    });

    let suggested_durability = obj.get("suggested_durability").and_then(Value::as_str).and_then(|s| match s {
        "ephemeral" => Some(Durability::Ephemeral),
        "durable" => Some(Durability::Durable),
        "permanent" => Some(Durability::Permanent),
        _ => None,
    });

    Some(Signal { signal_type, content, confidence, suggested_domain, suggested_tags, suggested_importance, suggested_durability, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_array() {
        let raw = r#"[{"signal_type": "decision", "content": "Use Postgres for audit", "confidence": 0.8}]"#;
        let signals = parse_signals(raw, MemorySource::Assistant).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::Decision);
    }

    #[test]
    fn parses_wrapped_object() {
        let raw = r#"{"signals": [{"signal_type": "fact", "content": "API key stored in env", "confidence": 0.6}]}"#;
        let signals = parse_signals(raw, MemorySource::User).unwrap();
        assert_eq!(signals.len(), 1);
    }

    #[test]
    fn parses_single_object_as_one_element() {
        let raw = r#"{"signal_type": "warning", "content": "Do not force-push main", "confidence": 0.9}"#;
        let signals = parse_signals(raw, MemorySource::User).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::Warning);
    }

    #[test]
    fn strips_code_fence() {
        let raw = "```json\n[]\n```";
        let signals = parse_signals(raw, MemorySource::User).unwrap();
        assert!(signals.is_empty());
    }

    #[test]
    fn rescales_one_to_ten_importance() {
        let raw = r#"[{"signal_type": "decision", "content": "Use Postgres for audit", "confidence": 0.8, "suggested_importance": 7}]"#;
        let signals = parse_signals(raw, MemorySource::User).unwrap();
        assert!((signals[0].suggested_importance.unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn leaves_zero_to_one_importance_alone() {
        let raw = r#"[{"signal_type": "decision", "content": "Use Postgres for audit", "confidence": 0.8, "suggested_importance": 0.55}]"#;
        let signals = parse_signals(raw, MemorySource::User).unwrap();
        assert!((signals[0].suggested_importance.unwrap() - 0.55).abs() < 1e-9);
    }

    #[test]
    fn rejects_unknown_signal_type() {
        let raw = r#"[{"signal_type": "nonsense", "content": "x", "confidence": 0.5}]"#;
        let signals = parse_signals(raw, MemorySource::User).unwrap();
        assert!(signals.is_empty());
    }
}
