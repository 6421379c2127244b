//! Wires a `do_memory_core::Config` to live storage adapters and an
//! Ollama-backed embedding/LLM pair, the way the teacher's
//! `memory-cli/src/main.rs` builds its `SelfLearningMemory` facade once at
//! startup and hands it to every command.

use crate::ollama::{OllamaEmbeddingClient, OllamaLlmClient};
use do_memory_core::embeddings::EmbeddingService;
use do_memory_core::llm::LlmClient;
use do_memory_core::storage::{EphemeralStore, GraphStore, RowStore, VectorStore};
use do_memory_core::Config;
use do_memory_storage_neo4j::Neo4jGraphStore;
use do_memory_storage_postgres::PostgresRowStore;
use do_memory_storage_qdrant::QdrantVectorStore;
use do_memory_storage_redis::RedisEphemeralStore;
use std::sync::Arc;

pub struct Context {
    pub config: Config,
    pub vectors: Arc<dyn VectorStore>,
    pub graph: Arc<dyn GraphStore>,
    pub rows: Arc<dyn RowStore>,
    pub ephemeral: Arc<dyn EphemeralStore>,
    pub embeddings: Arc<EmbeddingService>,
    pub llm: Arc<dyn LlmClient>,
}

impl Context {
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let qdrant_url = format!("http://{}:{}", config.qdrant_host, config.qdrant_port);
        let vectors: Arc<dyn VectorStore> = Arc::new(QdrantVectorStore::connect(&qdrant_url, config.embedding_dimensions as u64).await?);
        let graph: Arc<dyn GraphStore> = Arc::new(Neo4jGraphStore::connect(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password).await?);
        let rows: Arc<dyn RowStore> = Arc::new(PostgresRowStore::connect(&config.postgres_dsn).await?);
        let ephemeral: Arc<dyn EphemeralStore> = Arc::new(RedisEphemeralStore::connect(&config.redis_url).await?);

        let embed_backend = Box::new(OllamaEmbeddingClient::new(config.ollama_host.clone(), config.embedding_model.clone()));
        let embeddings = Arc::new(EmbeddingService::new(embed_backend));
        let llm: Arc<dyn LlmClient> = Arc::new(OllamaLlmClient::new(config.ollama_host.clone(), config.signal_detection_model.clone()));

        Ok(Self { config, vectors, graph, rows, ephemeral, embeddings, llm })
    }
}
