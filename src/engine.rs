// Detection engine
//
// Top-level façade over the pipeline: retrieve, classify (heuristic or
// LLM-verified), shape the result. Stateless and reentrant; every
// collaborator sits behind an Arc and imposes its own concurrency contract.

use std::sync::Arc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::embedding::OnnxEmbedder;
use crate::error::DetectError;
use crate::heuristic;
use crate::index::{QdrantIndex, VectorIndex};
use crate::retriever::Retriever;
use crate::store::VerseStore;
use crate::types::{
    Candidate, DetectOptions, DetectionMode, DetectionResult, MatchType, SourceMatch, Verse,
};
use crate::verifier::{AnthropicBackend, ChatBackend, LlmVerifier, Verdict};

pub struct DetectionEngine {
    config: EngineConfig,
    store: VerseStore,
    retriever: Retriever,
    verifier: Option<LlmVerifier>,
}

impl DetectionEngine {
    /// Wire up the production components from a config: SQLite verse store,
    /// ONNX embedder, Qdrant index, and (when an API key is present) the LLM
    /// verifier.
    pub fn from_config(config: EngineConfig) -> anyhow::Result<Self> {
        let store = VerseStore::open(config.db_path.clone())
            .map_err(|e| anyhow::anyhow!("failed to open verse store: {}", e))?;

        let embedder = Arc::new(OnnxEmbedder::load(
            &config.embedding_model_path,
            &config.embedding_tokenizer_path,
            embedding_dimension(&config.embedding_model),
        )?);

        let index: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::connect(
            &config.vector_backend_url,
            &config.collection_name,
            embedder,
        )?);

        let verifier = match &config.llm_api_key {
            Some(key) => {
                let backend = AnthropicBackend::new(
                    key.clone(),
                    config.llm_model.clone(),
                    config.llm_base_url.clone(),
                    config.llm_timeout,
                )?;
                Some(LlmVerifier::new(
                    Arc::new(backend),
                    config.llm_max_concurrent,
                ))
            }
            None => {
                tracing::info!("no LLM api key configured; llm mode will fall back to heuristic");
                None
            }
        };

        Ok(Self::with_components(config, store, index, verifier))
    }

    /// Assemble an engine from explicit components. Tests use this with
    /// scripted index and chat backends.
    pub fn with_components(
        config: EngineConfig,
        store: VerseStore,
        index: Arc<dyn VectorIndex>,
        verifier: Option<LlmVerifier>,
    ) -> Self {
        let retriever = Retriever::new(
            index,
            store.clone(),
            config.embed_timeout,
            config.search_timeout,
        );
        DetectionEngine {
            config,
            store,
            retriever,
            verifier,
        }
    }

    /// Convenience for wiring a verifier around a custom chat backend.
    pub fn with_chat_backend(
        config: EngineConfig,
        store: VerseStore,
        index: Arc<dyn VectorIndex>,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        let verifier = LlmVerifier::new(backend, config.llm_max_concurrent);
        Self::with_components(config, store, index, Some(verifier))
    }

    /// Detect whether `text` quotes the New Testament.
    pub async fn detect(
        &self,
        text: &str,
        options: &DetectOptions,
    ) -> Result<DetectionResult, DetectError> {
        let started = Instant::now();
        self.validate_input(text)?;

        tracing::info!(
            mode = ?options.mode,
            chars = text.chars().count(),
            "detection started"
        );

        let candidates = self
            .retriever
            .retrieve(text, self.config.top_k, self.config.min_similarity_floor)
            .await?;

        if candidates.is_empty() {
            let mut result = heuristic::classify(text, &candidates);
            result.processing_time_ms = started.elapsed().as_millis() as u64;
            return Ok(result);
        }

        let mut result = match options.mode {
            DetectionMode::Heuristic => heuristic::classify(text, &candidates),
            DetectionMode::Llm => match self.verify(text, &candidates).await {
                Ok(verdict) => assemble_from_verdict(text, &candidates, verdict),
                Err(e) => {
                    // LLM failure is never fatal: demote to heuristic.
                    tracing::warn!(error = %e, "llm verification unavailable, using heuristic");
                    heuristic::classify(text, &candidates)
                }
            },
        };

        if result.confidence < options.min_confidence {
            // The floor downgrades the verdict; match_type stays informational.
            result.is_quotation = false;
        }

        if options.include_all_candidates {
            result.sources = candidates.iter().map(SourceMatch::from).collect();
        }

        result.processing_time_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            match_type = result.match_type.as_str(),
            confidence = result.confidence,
            elapsed_ms = result.processing_time_ms,
            "detection complete"
        );
        Ok(result)
    }

    /// Detect quotations in several texts sequentially, respecting the LLM
    /// verifier's rate limits.
    pub async fn detect_batch(
        &self,
        texts: &[String],
        options: &DetectOptions,
    ) -> Result<Vec<DetectionResult>, DetectError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.detect(text, options).await?);
        }
        Ok(results)
    }

    /// Raw semantic search without classification, useful for exploring the
    /// corpus.
    pub async fn search_similar(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<SourceMatch>, DetectError> {
        self.validate_input(text)?;
        let candidates = self.retriever.retrieve(text, limit, 0.0).await?;
        Ok(candidates.iter().map(SourceMatch::from).collect())
    }

    /// Look up a single verse by reference.
    pub fn get_verse(&self, reference: &str) -> Result<Option<Verse>, DetectError> {
        self.store.get_by_reference(reference)
    }

    async fn verify(
        &self,
        text: &str,
        candidates: &[Candidate],
    ) -> Result<Verdict, DetectError> {
        match &self.verifier {
            Some(verifier) => verifier.verify(text, candidates).await,
            None => Err(DetectError::LlmUnavailable(
                "no LLM verifier configured".to_string(),
            )),
        }
    }

    fn validate_input(&self, text: &str) -> Result<(), DetectError> {
        if text.trim().is_empty() {
            return Err(DetectError::InvalidInput("text is empty".to_string()));
        }
        let chars = text.chars().count();
        if chars > self.config.max_input_chars {
            return Err(DetectError::InvalidInput(format!(
                "text is {} characters, maximum is {}",
                chars, self.config.max_input_chars
            )));
        }
        Ok(())
    }
}

/// Build a result from an LLM verdict over the retrieval candidates.
fn assemble_from_verdict(
    text: &str,
    candidates: &[Candidate],
    verdict: Verdict,
) -> DetectionResult {
    // A quotation-grade match type means quotation, even when the model's
    // IS_QUOTATION line disagrees; only the confidence floor may downgrade
    // the flag afterwards.
    let is_quotation = verdict.match_type.is_quotation();

    let best_match = if verdict.match_type == MatchType::NonBiblical {
        None
    } else {
        verdict
            .best_reference
            .as_deref()
            .and_then(|reference| candidates.iter().find(|c| c.verse.reference == reference))
            .or_else(|| candidates.first())
            .map(SourceMatch::from)
    };

    DetectionResult {
        input_text: text.to_string(),
        is_quotation,
        confidence: verdict.confidence,
        match_type: verdict.match_type,
        sources: candidates.iter().take(3).map(SourceMatch::from).collect(),
        best_match,
        explanation: verdict.explanation,
        processing_time_ms: 0,
    }
}

fn embedding_dimension(model: &str) -> usize {
    // Known sentence-embedding models used with this index.
    if model.contains("MiniLM") {
        384
    } else if model.contains("e5-base") {
        768
    } else {
        1024
    }
}
