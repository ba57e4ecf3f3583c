// Vector index adapter
//
// Wraps the ANN store (Qdrant) together with the local embedding model. The
// detection core only reads; `upsert` and `delete_collection` exist for the
// ingestion tooling that builds the index.

use std::sync::Arc;

use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde::{Deserialize, Serialize};

use crate::embedding::Embedder;
use crate::error::DetectError;

/// A raw ANN hit before hydration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredId {
    pub id: i64,
    pub score: f32,
}

/// Optional payload constraints for a search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub book: Option<String>,
    pub source_edition: Option<String>,
}

/// Payload stored alongside each vector at ingestion time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersePayload {
    pub reference: String,
    pub book: String,
    pub chapter: u32,
    pub verse: u32,
    pub source: String,
    /// Normalized Greek used both for embedding and lexical-overlap checks.
    pub text: String,
}

/// Contract the retriever depends on. Scores are treated only as a monotonic
/// ranking signal compared against fixed thresholds.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embed text with the model the index was built with.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DetectError>;

    /// Return at most `k` hits with `score >= score_floor`, score descending.
    async fn search(
        &self,
        vector: Vec<f32>,
        k: usize,
        score_floor: f32,
        filters: Option<SearchFilters>,
    ) -> Result<Vec<ScoredId>, DetectError>;

    /// Write half, used only by ingestion tooling.
    async fn upsert(
        &self,
        id: i64,
        vector: Vec<f32>,
        payload: VersePayload,
    ) -> Result<(), DetectError>;

    /// Write half, used only by ingestion tooling.
    async fn delete_collection(&self) -> Result<(), DetectError>;
}

pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

/// Summary of the backing collection, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub points_count: u64,
}

impl QdrantIndex {
    pub fn connect(
        url: &str,
        collection: &str,
        embedder: Arc<dyn Embedder>,
    ) -> anyhow::Result<Self> {
        let client = Qdrant::from_url(url).build()?;
        Ok(QdrantIndex {
            client,
            collection: collection.to_string(),
            embedder,
        })
    }

    /// Create the collection if it does not exist yet. Called by ingestion
    /// tooling before the first upsert.
    pub async fn ensure_collection(&self) -> Result<(), DetectError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(unavailable)?;
        if exists {
            return Ok(());
        }

        tracing::info!(collection = %self.collection, "creating vector collection");
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.embedder.dimension() as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    pub async fn collection_info(&self) -> Result<CollectionInfo, DetectError> {
        let response = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(unavailable)?;
        let points_count = response
            .result
            .and_then(|info| info.points_count)
            .unwrap_or(0);
        Ok(CollectionInfo {
            name: self.collection.clone(),
            points_count,
        })
    }
}

#[async_trait::async_trait]
impl VectorIndex for QdrantIndex {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DetectError> {
        self.embedder.embed(text).await
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        k: usize,
        score_floor: f32,
        filters: Option<SearchFilters>,
    ) -> Result<Vec<ScoredId>, DetectError> {
        let mut request = SearchPointsBuilder::new(&self.collection, vector, k as u64)
            .score_threshold(score_floor);

        let mut must = Vec::new();
        if let Some(filters) = filters {
            if let Some(book) = filters.book {
                must.push(Condition::matches("book", book));
            }
            if let Some(source) = filters.source_edition {
                must.push(Condition::matches("source", source));
            }
        }
        if !must.is_empty() {
            request = request.filter(Filter::must(must));
        }

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(unavailable)?;

        let mut hits = Vec::with_capacity(response.result.len());
        for point in response.result {
            let id = match point.id.and_then(|p| p.point_id_options) {
                Some(PointIdOptions::Num(n)) => n as i64,
                // verse ids are numeric; anything else is not ours
                _ => continue,
            };
            hits.push(ScoredId {
                id,
                score: point.score,
            });
        }
        Ok(hits)
    }

    async fn upsert(
        &self,
        id: i64,
        vector: Vec<f32>,
        payload: VersePayload,
    ) -> Result<(), DetectError> {
        let payload: Payload = serde_json::json!({
            "reference": payload.reference,
            "book": payload.book,
            "chapter": payload.chapter,
            "verse": payload.verse,
            "source": payload.source,
            "text": payload.text,
        })
        .try_into()
        .map_err(|e| DetectError::Internal(format!("payload conversion failed: {}", e)))?;

        let point = PointStruct::new(id as u64, vector, payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn delete_collection(&self) -> Result<(), DetectError> {
        self.client
            .delete_collection(&self.collection)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(e: qdrant_client::QdrantError) -> DetectError {
    DetectError::ServiceUnavailable(format!("vector index error: {}", e))
}
