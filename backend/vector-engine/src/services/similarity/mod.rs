// Similarity & Fallback Ranker
//
// Produces ranked candidate ids straight from the vector store when the
// external ranking service yields nothing. Two paths:
//
//  - vector path: indexed nearest-neighbor search in the post space with
//    content-type, seen-post and subscription filters applied in SQL;
//  - trailer path: the trailer corpus is bounded by posts carrying a video
//    key, so it is scored exhaustively with manual cosine similarity instead
//    of going through the index. Both paths are kept deliberately; the
//    duplication buys a filtered ranking the index does not have to cover.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::db::{InteractionRepository, PostRepository};
use crate::error::Result;
use crate::models::CONTENT_TYPE_TRAILERS;
use crate::services::vector_store::{CandidateFilter, VectorSpace, VectorStore};
use crate::utils::cosine_similarity;

/// Source of fallback candidate ids, ordered best-first. The orchestrator
/// consumes this seam; tests substitute stubs.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidates(
        &self,
        user_id: i64,
        content_type: Option<&str>,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<i64>>;
}

pub struct SimilarityRanker {
    store: VectorStore,
    posts: PostRepository,
    interactions: InteractionRepository,
}

impl SimilarityRanker {
    pub fn new(
        store: VectorStore,
        posts: PostRepository,
        interactions: InteractionRepository,
    ) -> Self {
        Self {
            store,
            posts,
            interactions,
        }
    }

    async fn vector_candidates(
        &self,
        user_id: i64,
        content_type: Option<&str>,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<i64>> {
        let user_vector = self.store.user_vector_or_default(user_id).await?;
        let exclude = self.interactions.interacted_post_ids(user_id).await?;

        let filter = CandidateFilter {
            media_type: content_type.map(str::to_string),
            require_video_key: false,
            subscriber_user_id: Some(user_id),
        };

        // Fetch through the end of the requested page, then slice it out.
        let k = (page + 1) * page_size;
        let ids = self
            .store
            .nearest_posts(&user_vector, k, &exclude, &filter)
            .await?;

        debug!(
            user_id,
            candidates = ids.len(),
            page,
            "Vector fallback produced candidates"
        );

        Ok(paginate(&ids, page, page_size))
    }

    async fn trailer_candidates(
        &self,
        user_id: i64,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<i64>> {
        let user_vector = self.store.user_vector_or_default(user_id).await?;
        let exclude: HashSet<i64> = self
            .interactions
            .interacted_post_ids(user_id)
            .await?
            .into_iter()
            .collect();

        let trailer_ids: Vec<i64> = self
            .posts
            .trailer_posts()
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        let pool = filter_excluded(trailer_ids, &exclude);

        let vectors = self.store.get_many(VectorSpace::Post, &pool).await?;
        let ranked = score_candidates(&user_vector, &vectors);

        debug!(
            user_id,
            pool = pool.len(),
            scored = ranked.len(),
            "Trailer fallback scored candidates"
        );

        Ok(paginate(&ranked, page, page_size))
    }
}

#[async_trait]
impl CandidateSource for SimilarityRanker {
    async fn candidates(
        &self,
        user_id: i64,
        content_type: Option<&str>,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<i64>> {
        match content_type {
            Some(CONTENT_TYPE_TRAILERS) => {
                self.trailer_candidates(user_id, page, page_size).await
            }
            other => self.vector_candidates(user_id, other, page, page_size).await,
        }
    }
}

/// Score candidates by cosine similarity against the user vector and return
/// ids in descending similarity order, id ascending as the tiebreak so the
/// ordering is total and reproducible.
pub fn score_candidates(user_vector: &[f32], vectors: &HashMap<i64, Vec<f32>>) -> Vec<i64> {
    let mut scored: Vec<(i64, f32)> = vectors
        .iter()
        .map(|(id, vec)| (*id, cosine_similarity(user_vector, vec)))
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    scored.into_iter().map(|(id, _)| id).collect()
}

/// Drop candidate ids the user has already interacted with.
pub fn filter_excluded(ids: Vec<i64>, exclude: &HashSet<i64>) -> Vec<i64> {
    ids.into_iter().filter(|id| !exclude.contains(id)).collect()
}

/// Slice one page out of an ordered candidate list.
pub fn paginate(ids: &[i64], page: i64, page_size: i64) -> Vec<i64> {
    let start = (page * page_size).max(0) as usize;
    if start >= ids.len() {
        return Vec::new();
    }
    let end = (start + page_size.max(0) as usize).min(ids.len());
    ids[start..end].to_vec()
}
