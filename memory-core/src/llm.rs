//! LLM text-generation wrapper. The core depends only on this narrow
//! contract (spec.md §1 Non-goals: "an LLM runtime" is explicitly external).

use crate::error::Result;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f64,
    pub json_mode: bool,
    /// For reasoning-model families: disable extended "thinking" output.
    pub dormant_think: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self { temperature: 0.4, json_mode: false, dormant_think: true }
    }
}

/// An LLM text-generation backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<String>;
}
