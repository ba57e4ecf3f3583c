// Engine configuration
//
// All knobs live in one explicit value handed to the engine at construction.
// Long-lived resources (embedding model, vector index handle, HTTP client)
// are fields of the engine, never module globals.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SQLite verse database.
    pub db_path: PathBuf,
    /// Identifier of the embedding model; must match the model used to build
    /// the vector index.
    pub embedding_model: String,
    /// Local ONNX weights for the embedding model.
    pub embedding_model_path: PathBuf,
    /// HuggingFace tokenizer.json for the embedding model.
    pub embedding_tokenizer_path: PathBuf,
    /// Qdrant gRPC endpoint.
    pub vector_backend_url: String,
    pub collection_name: String,
    /// API key for the LLM verifier. When absent, `llm` mode silently
    /// degrades to the heuristic.
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_base_url: String,
    /// Candidates scoring below this are discarded before classification.
    pub min_similarity_floor: f32,
    /// Retrieval breadth.
    pub top_k: usize,
    /// Inputs longer than this (in characters) are rejected.
    pub max_input_chars: usize,
    pub embed_timeout: Duration,
    pub search_timeout: Duration,
    pub llm_timeout: Duration,
    /// Upper bound on concurrent LLM requests; calls above it queue.
    pub llm_max_concurrent: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            db_path: PathBuf::from("data/processed/bible.db"),
            embedding_model: "intfloat/multilingual-e5-large".to_string(),
            embedding_model_path: PathBuf::from("data/models/e5-large/model.onnx"),
            embedding_tokenizer_path: PathBuf::from("data/models/e5-large/tokenizer.json"),
            vector_backend_url: "http://localhost:6334".to_string(),
            collection_name: "biblical_verses".to_string(),
            llm_api_key: None,
            llm_model: "claude-sonnet-4-20250514".to_string(),
            llm_base_url: "https://api.anthropic.com".to_string(),
            min_similarity_floor: 0.7,
            top_k: 10,
            max_input_chars: 5000,
            embed_timeout: Duration::from_secs(5),
            search_timeout: Duration::from_secs(5),
            llm_timeout: Duration::from_secs(30),
            llm_max_concurrent: 2,
        }
    }
}

impl EngineConfig {
    /// Build a config from environment variables, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Self {
        let mut config = EngineConfig::default();

        if let Ok(v) = std::env::var("DETECTOR_DB_PATH") {
            config.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DETECTOR_EMBEDDING_MODEL") {
            config.embedding_model = v;
        }
        if let Ok(v) = std::env::var("DETECTOR_EMBEDDING_MODEL_PATH") {
            config.embedding_model_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DETECTOR_EMBEDDING_TOKENIZER_PATH") {
            config.embedding_tokenizer_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("QDRANT_URL") {
            config.vector_backend_url = v;
        }
        if let Ok(v) = std::env::var("DETECTOR_COLLECTION") {
            config.collection_name = v;
        }
        if let Ok(v) = std::env::var("ANTHROPIC_API_KEY") {
            if !v.trim().is_empty() {
                config.llm_api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("DETECTOR_LLM_MODEL") {
            config.llm_model = v;
        }
        if let Ok(v) = std::env::var("DETECTOR_LLM_BASE_URL") {
            config.llm_base_url = v;
        }
        if let Some(v) = parse_env("DETECTOR_MIN_SIMILARITY") {
            config.min_similarity_floor = v;
        }
        if let Some(v) = parse_env("DETECTOR_TOP_K") {
            config.top_k = v;
        }

        config
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
