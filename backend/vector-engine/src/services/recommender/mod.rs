// Recommendation Orchestrator
//
// Façade over the fallback cascade: external ranking service first, vector
// similarity when it yields nothing. Verifies the target user exists before
// any work so "unknown user" stays distinct from "no recommendations".

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::{PostRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::models::{Post, RecommendationPage};
use crate::services::ranking_client::{RankingClient, RankingRequest};
use crate::services::similarity::CandidateSource;
use crate::services::vector_store::{VectorSpace, VectorStore};

/// Storage reads the orchestrator needs: existence check, order-preserving
/// hydration, and the stored vectors for the debug accessors.
#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn user_exists(&self, user_id: i64) -> Result<bool>;
    async fn posts_in_order(&self, ids: &[i64]) -> Result<Vec<Post>>;
    async fn user_vector(&self, user_id: i64) -> Result<Option<Vec<f32>>>;
    async fn post_vector(&self, post_id: i64) -> Result<Option<Vec<f32>>>;
}

pub struct SqlRecommendationStore {
    users: UserRepository,
    posts: PostRepository,
    vectors: VectorStore,
}

impl SqlRecommendationStore {
    pub fn new(users: UserRepository, posts: PostRepository, vectors: VectorStore) -> Self {
        Self {
            users,
            posts,
            vectors,
        }
    }
}

#[async_trait]
impl RecommendationStore for SqlRecommendationStore {
    async fn user_exists(&self, user_id: i64) -> Result<bool> {
        self.users.user_exists(user_id).await
    }

    async fn posts_in_order(&self, ids: &[i64]) -> Result<Vec<Post>> {
        self.posts.posts_in_order(ids).await
    }

    async fn user_vector(&self, user_id: i64) -> Result<Option<Vec<f32>>> {
        self.vectors.get(VectorSpace::User, user_id).await
    }

    async fn post_vector(&self, post_id: i64) -> Result<Option<Vec<f32>>> {
        self.vectors.get(VectorSpace::Post, post_id).await
    }
}

pub struct Recommender {
    ranking: Arc<dyn RankingClient>,
    fallback: Arc<dyn CandidateSource>,
    store: Arc<dyn RecommendationStore>,
}

impl Recommender {
    pub fn new(
        ranking: Arc<dyn RankingClient>,
        fallback: Arc<dyn CandidateSource>,
        store: Arc<dyn RecommendationStore>,
    ) -> Self {
        Self {
            ranking,
            fallback,
            store,
        }
    }

    /// One page of recommendations for a user. The external ranking answer,
    /// when non-empty, is returned verbatim (hydrated in its order); anything
    /// else comes entirely from the similarity fallback.
    pub async fn recommend(
        &self,
        user_id: i64,
        content_type: Option<&str>,
        page: i64,
        page_size: i64,
    ) -> Result<RecommendationPage> {
        if page < 0 || page_size < 0 {
            return Err(AppError::Validation(
                "page and page_size must be non-negative".to_string(),
            ));
        }

        if !self.store.user_exists(user_id).await? {
            return Err(AppError::NotFound(format!("user {}", user_id)));
        }

        let request = RankingRequest {
            user_id,
            content_type: content_type.map(str::to_string),
            page,
            page_size,
        };

        let ids = match self.ranking.rank(&request).await {
            Ok(ids) if !ids.is_empty() => ids,
            Ok(_) => {
                debug!(user_id, "Ranking service returned no candidates, using fallback");
                self.fallback
                    .candidates(user_id, content_type, page, page_size)
                    .await?
            }
            Err(e) => {
                warn!(user_id, error = %e, "Ranking service unavailable, using fallback");
                self.fallback
                    .candidates(user_id, content_type, page, page_size)
                    .await?
            }
        };

        if ids.is_empty() {
            return Ok(RecommendationPage::empty(page, page_size));
        }

        let posts = self.store.posts_in_order(&ids).await?;
        let total = posts.len() as i64;

        Ok(RecommendationPage {
            posts,
            page,
            page_size,
            total,
        })
    }

    /// Debug accessor: the stored user-space vector.
    pub async fn user_vector(&self, user_id: i64) -> Result<Vec<f32>> {
        self.store
            .user_vector(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user vector {}", user_id)))
    }

    /// Debug accessor: the stored post-space vector.
    pub async fn post_vector(&self, post_id: i64) -> Result<Vec<f32>> {
        self.store
            .post_vector(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post vector {}", post_id)))
    }
}
