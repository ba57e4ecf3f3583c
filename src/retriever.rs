// Candidate retrieval
//
// Embeds the input, queries the vector index, and hydrates hits into full
// verse records. Either collaborator failing means the whole retrieval
// fails; a partial list with gaps is never returned.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::DetectError;
use crate::index::VectorIndex;
use crate::store::VerseStore;
use crate::types::Candidate;

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_SCORE_FLOOR: f32 = 0.7;

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    store: VerseStore,
    embed_timeout: Duration,
    search_timeout: Duration,
}

impl Retriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        store: VerseStore,
        embed_timeout: Duration,
        search_timeout: Duration,
    ) -> Self {
        Retriever {
            index,
            store,
            embed_timeout,
            search_timeout,
        }
    }

    /// Retrieve candidate verses for `text`, ordered by score descending with
    /// verse-id ascending tie breaks. A verse appearing in several source
    /// editions is kept once, at its highest-scoring instance.
    pub async fn retrieve(
        &self,
        text: &str,
        k: usize,
        score_floor: f32,
    ) -> Result<Vec<Candidate>, DetectError> {
        let vector = tokio::time::timeout(self.embed_timeout, self.index.embed(text))
            .await
            .map_err(|_| DetectError::ServiceUnavailable("embedding timed out".to_string()))??;

        let hits = tokio::time::timeout(
            self.search_timeout,
            self.index.search(vector, k, score_floor, None),
        )
        .await
        .map_err(|_| DetectError::ServiceUnavailable("vector search timed out".to_string()))??;

        tracing::debug!(hits = hits.len(), "vector search complete");

        let ids: Vec<i64> = hits.iter().map(|h| h.id).collect();
        let verses = self.store.get_by_ids(&ids)?;

        // Hits whose verse cannot be hydrated are dropped.
        let mut candidates: Vec<Candidate> = hits
            .iter()
            .filter_map(|hit| {
                verses.get(&hit.id).map(|verse| Candidate {
                    verse: verse.clone(),
                    similarity_score: hit.score,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(Ordering::Equal)
                .then(a.verse.id.cmp(&b.verse.id))
        });

        // Same verse from multiple editions: keep the highest-scoring one.
        let mut seen = HashSet::new();
        candidates.retain(|c| seen.insert((c.verse.book.clone(), c.verse.chapter, c.verse.verse)));

        Ok(candidates)
    }
}
