//! TOML config-file layer over `do_memory_core::Config::from_env()`,
//! following the teacher's config-file-then-env precedence in
//! `memory-cli/src/config.rs` (file overrides, both overridable by env).
//!
//! Every field is optional here; unset fields fall through to whatever
//! `Config::from_env()` already produced.

use anyhow::Context as _;
use do_memory_core::Config;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub env: Option<String>,
    pub debug: Option<bool>,

    pub qdrant_host: Option<String>,
    pub qdrant_port: Option<u16>,
    pub qdrant_collection: Option<String>,

    pub neo4j_uri: Option<String>,
    pub neo4j_user: Option<String>,
    pub neo4j_password: Option<String>,

    pub postgres_dsn: Option<String>,
    pub redis_url: Option<String>,
    pub ollama_host: Option<String>,

    pub embedding_model: Option<String>,
    pub embedding_dimensions: Option<usize>,

    pub default_importance: Option<f64>,
    pub importance_decay_rate: Option<f64>,
    pub consolidation_threshold: Option<f64>,
    pub min_importance_for_retrieval: Option<f64>,

    pub session_ttl_hours: Option<u64>,
    pub working_memory_limit: Option<usize>,

    pub signal_confidence_auto_store: Option<f64>,
    pub signal_confidence_pending: Option<f64>,
    pub signal_detection_model: Option<String>,

    pub min_cluster_size: Option<usize>,
    pub min_occurrences: Option<usize>,
}

impl ConfigOverrides {
    fn apply(self, cfg: &mut Config) {
        macro_rules! set {
            ($field:ident) => {
                if let Some(v) = self.$field {
                    cfg.$field = v;
                }
            };
        }
        set!(env);
        set!(debug);
        set!(qdrant_host);
        set!(qdrant_port);
        set!(qdrant_collection);
        set!(neo4j_uri);
        set!(neo4j_user);
        set!(neo4j_password);
        set!(postgres_dsn);
        set!(redis_url);
        set!(ollama_host);
        set!(embedding_model);
        set!(embedding_dimensions);
        set!(default_importance);
        set!(importance_decay_rate);
        set!(consolidation_threshold);
        set!(min_importance_for_retrieval);
        set!(session_ttl_hours);
        set!(working_memory_limit);
        set!(signal_confidence_auto_store);
        set!(signal_confidence_pending);
        set!(signal_detection_model);
        set!(min_cluster_size);
        set!(min_occurrences);
    }
}

/// Loads `Config::from_env()`, then layers a TOML file over it if given.
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut cfg = Config::from_env();
    if let Some(path) = path {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
        let overrides: ConfigOverrides = toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?;
        overrides.apply(&mut cfg);
    }
    Ok(cfg)
}
