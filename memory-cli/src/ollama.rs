//! Ollama-compatible `EmbeddingBackend`/`LlmClient` implementations. The
//! core crate only depends on the two narrow traits (spec.md §1
//! Non-goals: "an LLM runtime" is explicitly external); this is the one
//! concrete HTTP client the admin CLI needs to drive decay/consolidate/
//! pattern-extract/retrain commands end to end.

use async_trait::async_trait;
use do_memory_core::error::{Backend, Error, Result};
use do_memory_core::embeddings::EmbeddingBackend;
use do_memory_core::llm::{GenerateOptions, LlmClient};
use serde::Deserialize;
use std::time::Duration;

const EMBED_TIMEOUT: Duration = Duration::from_secs(120);
const GENERATE_TIMEOUT: Duration = Duration::from_secs(180);

pub struct OllamaEmbeddingClient {
    client: reqwest::Client,
    host: String,
    model: String,
}

impl OllamaEmbeddingClient {
    #[must_use]
    pub fn new(host: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder().timeout(EMBED_TIMEOUT).build().unwrap_or_default(),
            host: host.into(),
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingBackend for OllamaEmbeddingClient {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.host.trim_end_matches('/'));
        let body = serde_json::json!({ "model": self.model, "prompt": text });
        let resp = self.client.post(url).json(&body).send().await.map_err(|e| Error::Unavailable(Backend::Embedding, e.to_string()))?;
        let resp = resp.error_for_status().map_err(|e| Error::Unavailable(Backend::Embedding, e.to_string()))?;
        let parsed: EmbedResponse = resp.json().await.map_err(|e| Error::Unavailable(Backend::Embedding, e.to_string()))?;
        Ok(parsed.embedding)
    }

    async fn embed_batch_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Ollama's `/api/embeddings` endpoint takes a single prompt; batching
        // is emulated by the wrapper's sequential fallback in
        // `EmbeddingService::embed_batch`, so report failure here and let
        // the caller fall back.
        Err(Error::Unavailable(Backend::Embedding, format!("batch embedding unsupported for {} texts", texts.len())))
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.host.trim_end_matches('/'));
        self.client.get(url).send().await.map_err(|e| Error::Unavailable(Backend::Embedding, e.to_string()))?;
        Ok(())
    }
}

pub struct OllamaLlmClient {
    client: reqwest::Client,
    host: String,
    model: String,
}

impl OllamaLlmClient {
    #[must_use]
    pub fn new(host: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder().timeout(GENERATE_TIMEOUT).build().unwrap_or_default(),
            host: host.into(),
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl LlmClient for OllamaLlmClient {
    async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<String> {
        let url = format!("{}/api/generate", self.host.trim_end_matches('/'));
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": options.temperature },
        });
        if options.json_mode {
            body["format"] = serde_json::Value::String("json".to_string());
        }
        if options.dormant_think {
            body["think"] = serde_json::Value::Bool(false);
        }
        let resp = self.client.post(url).json(&body).send().await.map_err(|e| Error::Unavailable(Backend::Llm, e.to_string()))?;
        let resp = resp.error_for_status().map_err(|e| Error::Unavailable(Backend::Llm, e.to_string()))?;
        let parsed: GenerateResponse = resp.json().await.map_err(|e| Error::Unavailable(Backend::Llm, e.to_string()))?;
        Ok(parsed.response)
    }
}
