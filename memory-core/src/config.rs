//! Engine configuration, loaded from environment variables with a `MEMORY_`
//! prefix and optionally overridden by a TOML file (the admin CLI layers a
//! TOML file over these defaults the same way `memory-cli/src/config.rs`
//! does for the teacher's config).
//!
//! Defaults mirror `original_source/src/core/config.py`'s `Settings` class.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// All tunables named in spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub env: String,
    pub debug: bool,
    pub api_host: String,
    pub api_port: u16,

    pub qdrant_host: String,
    pub qdrant_port: u16,
    pub qdrant_collection: String,

    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,

    pub postgres_dsn: String,
    pub redis_url: String,
    pub ollama_host: String,

    pub embedding_model: String,
    pub embedding_dimensions: usize,

    pub default_importance: f64,
    /// Per-hour base decay rate.
    pub importance_decay_rate: f64,
    pub consolidation_threshold: f64,
    pub min_importance_for_retrieval: f64,

    pub session_ttl_hours: u64,
    pub working_memory_limit: usize,

    pub signal_confidence_auto_store: f64,
    pub signal_confidence_pending: f64,
    pub signal_context_window: usize,
    pub signal_max_turns_stored: usize,
    pub signal_detection_model: String,
    pub signal_detection_timeout_secs: u64,

    pub api_key: Option<String>,
    pub allowed_origins: Vec<String>,
    pub max_content_length: usize,
    pub max_turns_per_request: usize,

    pub export_include_embeddings_default: bool,
    pub metrics_enabled: bool,

    pub consolidation_interval_hours: u64,
    pub decay_interval_minutes: u64,
    pub pattern_extraction_interval_hours: u64,

    /// Minimum cluster size for consolidation (default 2).
    pub min_cluster_size: usize,
    /// Minimum occurrences for pattern extraction (default 3).
    pub min_occurrences: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            debug: false,
            api_host: "0.0.0.0".to_string(),
            api_port: 8000,

            qdrant_host: "localhost".to_string(),
            qdrant_port: 6334,
            qdrant_collection: "memories".to_string(),

            neo4j_uri: "bolt://localhost:7687".to_string(),
            neo4j_user: "neo4j".to_string(),
            neo4j_password: String::new(),

            postgres_dsn: "postgres://localhost/memory".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            ollama_host: "http://localhost:11434".to_string(),

            embedding_model: "mxbai-embed-large".to_string(),
            embedding_dimensions: 1024,

            default_importance: 0.5,
            importance_decay_rate: 0.01,
            consolidation_threshold: 0.85,
            min_importance_for_retrieval: 0.1,

            session_ttl_hours: 24,
            working_memory_limit: 50,

            signal_confidence_auto_store: 0.75,
            signal_confidence_pending: 0.4,
            signal_context_window: 20,
            signal_max_turns_stored: 100,
            signal_detection_model: "llama3.1".to_string(),
            signal_detection_timeout_secs: 30,

            api_key: None,
            allowed_origins: vec!["*".to_string()],
            max_content_length: 50_000,
            max_turns_per_request: 200,

            export_include_embeddings_default: false,
            metrics_enabled: true,

            consolidation_interval_hours: 1,
            decay_interval_minutes: 30,
            pattern_extraction_interval_hours: 24,

            min_cluster_size: 2,
            min_occurrences: 3,
        }
    }
}

impl Config {
    /// Load defaults overlaid with `MEMORY_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        macro_rules! env_str {
            ($field:expr, $key:expr) => {
                if let Ok(v) = env::var($key) {
                    $field = v;
                }
            };
        }
        macro_rules! env_parse {
            ($field:expr, $key:expr) => {
                if let Ok(v) = env::var($key) {
                    if let Ok(parsed) = v.parse() {
                        $field = parsed;
                    }
                }
            };
        }

        env_str!(cfg.env, "MEMORY_ENV");
        env_parse!(cfg.debug, "MEMORY_DEBUG");
        env_str!(cfg.api_host, "MEMORY_API_HOST");
        env_parse!(cfg.api_port, "MEMORY_API_PORT");

        env_str!(cfg.qdrant_host, "MEMORY_QDRANT_HOST");
        env_parse!(cfg.qdrant_port, "MEMORY_QDRANT_PORT");
        env_str!(cfg.qdrant_collection, "MEMORY_QDRANT_COLLECTION");

        env_str!(cfg.neo4j_uri, "MEMORY_NEO4J_URI");
        env_str!(cfg.neo4j_user, "MEMORY_NEO4J_USER");
        env_str!(cfg.neo4j_password, "MEMORY_NEO4J_PASSWORD");

        env_str!(cfg.postgres_dsn, "MEMORY_POSTGRES_DSN");
        env_str!(cfg.redis_url, "MEMORY_REDIS_URL");
        env_str!(cfg.ollama_host, "MEMORY_OLLAMA_HOST");

        env_str!(cfg.embedding_model, "MEMORY_EMBEDDING_MODEL");
        env_parse!(cfg.embedding_dimensions, "MEMORY_EMBEDDING_DIMENSIONS");

        env_parse!(cfg.default_importance, "MEMORY_DEFAULT_IMPORTANCE");
        env_parse!(cfg.importance_decay_rate, "MEMORY_IMPORTANCE_DECAY_RATE");
        env_parse!(cfg.consolidation_threshold, "MEMORY_CONSOLIDATION_THRESHOLD");
        env_parse!(cfg.min_importance_for_retrieval, "MEMORY_MIN_IMPORTANCE_FOR_RETRIEVAL");

        env_parse!(cfg.session_ttl_hours, "MEMORY_SESSION_TTL_HOURS");
        env_parse!(cfg.working_memory_limit, "MEMORY_WORKING_MEMORY_LIMIT");

        env_parse!(cfg.signal_confidence_auto_store, "MEMORY_SIGNAL_CONFIDENCE_AUTO_STORE");
        env_parse!(cfg.signal_confidence_pending, "MEMORY_SIGNAL_CONFIDENCE_PENDING");
        env_parse!(cfg.signal_context_window, "MEMORY_SIGNAL_CONTEXT_WINDOW");
        env_parse!(cfg.signal_max_turns_stored, "MEMORY_SIGNAL_MAX_TURNS_STORED");
        env_str!(cfg.signal_detection_model, "MEMORY_SIGNAL_DETECTION_MODEL");
        env_parse!(cfg.signal_detection_timeout_secs, "MEMORY_SIGNAL_DETECTION_TIMEOUT_SECS");

        if let Ok(key) = env::var("MEMORY_API_KEY") {
            cfg.api_key = Some(key);
        }
        if let Ok(origins) = env::var("MEMORY_ALLOWED_ORIGINS") {
            cfg.allowed_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
        }
        env_parse!(cfg.max_content_length, "MEMORY_MAX_CONTENT_LENGTH");
        env_parse!(cfg.max_turns_per_request, "MEMORY_MAX_TURNS_PER_REQUEST");

        env_parse!(cfg.export_include_embeddings_default, "MEMORY_EXPORT_INCLUDE_EMBEDDINGS_DEFAULT");
        env_parse!(cfg.metrics_enabled, "MEMORY_METRICS_ENABLED");

        env_parse!(cfg.consolidation_interval_hours, "MEMORY_CONSOLIDATION_INTERVAL_HOURS");
        env_parse!(cfg.decay_interval_minutes, "MEMORY_DECAY_INTERVAL_MINUTES");
        env_parse!(cfg.pattern_extraction_interval_hours, "MEMORY_PATTERN_EXTRACTION_INTERVAL_HOURS");

        cfg
    }

    #[must_use]
    pub fn signal_detection_timeout(&self) -> Duration {
        Duration::from_secs(self.signal_detection_timeout_secs)
    }

    #[must_use]
    pub fn decay_interval(&self) -> Duration {
        Duration::from_secs(self.decay_interval_minutes * 60)
    }

    #[must_use]
    pub fn consolidation_interval(&self) -> Duration {
        Duration::from_secs(self.consolidation_interval_hours * 3600)
    }

    #[must_use]
    pub fn pattern_extraction_interval(&self) -> Duration {
        Duration::from_secs(self.pattern_extraction_interval_hours * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_source() {
        let cfg = Config::default();
        assert_eq!(cfg.importance_decay_rate, 0.01);
        assert_eq!(cfg.consolidation_threshold, 0.85);
        assert_eq!(cfg.embedding_dimensions, 1024);
        assert_eq!(cfg.signal_confidence_auto_store, 0.75);
        assert_eq!(cfg.signal_confidence_pending, 0.4);
    }
}
