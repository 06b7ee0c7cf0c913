// Scheduled recomputation jobs.
//
// `EngineContext` bundles the repositories and services one refresh unit
// needs; `init` runs the idempotent schema/backfill pass at startup, `refresh`
// is the daily active-entity job and `weekly` the global maintenance job.

pub mod init;
pub mod refresh;
pub mod weekly;

use sqlx::PgPool;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::db::{
    GenreRepository, InteractionRepository, PostRepository, UserRepository, INTERACTION_WINDOW,
};
use crate::error::{AppError, Result};
use crate::services::catalog::GenreCatalog;
use crate::services::encoder::{derive_genre_weights, encode_post, encode_user};
use crate::services::metadata::MetadataService;
use crate::services::profiler::{BehaviorProfiler, SqlProfileStore};
use crate::services::vector_store::{VectorSpace, VectorStore};

/// Shared handle for per-entity refresh work.
pub struct EngineContext {
    pub users: UserRepository,
    pub posts: PostRepository,
    pub interactions: InteractionRepository,
    pub genres: GenreRepository,
    pub catalog: GenreCatalog,
    pub vectors: VectorStore,
    pub metadata: MetadataService,
    pub profiler: BehaviorProfiler<SqlProfileStore>,
    pub profile_store: Arc<SqlProfileStore>,
}

impl EngineContext {
    pub fn new(pool: PgPool) -> Self {
        let profile_store = Arc::new(SqlProfileStore::new(pool.clone()));
        Self {
            users: UserRepository::new(pool.clone()),
            posts: PostRepository::new(pool.clone()),
            interactions: InteractionRepository::new(pool.clone()),
            genres: GenreRepository::new(pool.clone()),
            catalog: GenreCatalog::new(GenreRepository::new(pool.clone())),
            vectors: VectorStore::new(pool.clone()),
            metadata: MetadataService::new(pool),
            profiler: BehaviorProfiler::new(Arc::clone(&profile_store)),
            profile_store,
        }
    }

    /// Re-encode one user's vector and upsert it.
    pub async fn encode_and_store_user(&self, user_id: i64) -> Result<()> {
        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))?;

        let preferences = self.users.genre_preferences(user_id).await?;
        let post_ix = self
            .interactions
            .recent_post_interactions(user_id, INTERACTION_WINDOW)
            .await?;
        let trailer_ix = self
            .interactions
            .recent_trailer_interactions(user_id, INTERACTION_WINDOW)
            .await?;

        let window_posts: Vec<i64> = post_ix.iter().map(|i| i.post_id).collect();
        let post_genres = pair_map(self.genres.genre_ids_for_posts(&window_posts).await?);
        let snapshot = self.catalog.snapshot().await?;

        let vector = encode_user(
            &user,
            &preferences,
            &post_ix,
            &trailer_ix,
            &post_genres,
            &snapshot,
        );
        self.vectors.put(VectorSpace::User, user_id, vector).await?;

        debug!(user_id, "Stored user vector");
        Ok(())
    }

    /// Re-encode one post's vector and upsert it.
    pub async fn encode_and_store_post(&self, post_id: i64) -> Result<()> {
        let post = self
            .posts
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;

        let genre_ids = self.genres.post_genre_ids(post_id).await?;
        let engagement = self.posts.engagement_stats(post_id).await?;
        let snapshot = self.catalog.snapshot().await?;

        let vector = encode_post(&post, &genre_ids, &engagement, &snapshot);
        self.vectors.put(VectorSpace::Post, post_id, vector).await?;

        debug!(post_id, "Stored post vector");
        Ok(())
    }

    /// Recompute a user's derived genre preference weights and persist them
    /// into the metadata side channel.
    pub async fn update_derived_preferences(&self, user_id: i64) -> Result<()> {
        let post_ix = self
            .interactions
            .recent_post_interactions(user_id, INTERACTION_WINDOW)
            .await?;
        let window_posts: Vec<i64> = post_ix.iter().map(|i| i.post_id).collect();
        let post_genres = pair_map(self.genres.genre_ids_for_posts(&window_posts).await?);
        let snapshot = self.catalog.snapshot().await?;

        let weights = derive_genre_weights(&post_ix, &post_genres, &snapshot);
        self.metadata.update_genre_weights(user_id, &weights).await
    }

    /// Full daily refresh unit for one user: vector, profile, derived
    /// preferences.
    pub async fn refresh_user(&self, user_id: i64) -> Result<()> {
        self.encode_and_store_user(user_id).await?;
        self.profiler.generate(user_id).await?;
        self.update_derived_preferences(user_id).await?;
        Ok(())
    }
}

fn pair_map(pairs: Vec<(i64, i64)>) -> HashMap<i64, Vec<i64>> {
    let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
    for (post_id, genre_id) in pairs {
        map.entry(post_id).or_default().push(genre_id);
    }
    map
}

/// Entity addressed by one refresh work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshEntity {
    User(i64),
    Post(i64),
}

impl fmt::Display for RefreshEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshEntity::User(id) => write!(f, "user {}", id),
            RefreshEntity::Post(id) => write!(f, "post {}", id),
        }
    }
}

/// Result of one work unit. Failures travel as values so a single entity can
/// never abort the batch.
pub struct RefreshOutcome {
    pub entity: RefreshEntity,
    pub result: Result<()>,
}

impl RefreshOutcome {
    /// (succeeded, failed) counts over a batch.
    pub fn tally(outcomes: &[RefreshOutcome]) -> (u32, u32) {
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count() as u32;
        (outcomes.len() as u32 - failed, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_counts_failures_without_aborting() {
        let outcomes = vec![
            RefreshOutcome {
                entity: RefreshEntity::User(1),
                result: Ok(()),
            },
            RefreshOutcome {
                entity: RefreshEntity::User(2),
                result: Err(AppError::Database("boom".into())),
            },
            RefreshOutcome {
                entity: RefreshEntity::Post(3),
                result: Ok(()),
            },
        ];

        assert_eq!(RefreshOutcome::tally(&outcomes), (2, 1));
    }

    #[test]
    fn test_pair_map_groups_by_post() {
        let map = pair_map(vec![(1, 28), (1, 35), (2, 18)]);
        assert_eq!(map[&1], vec![28, 35]);
        assert_eq!(map[&2], vec![18]);
    }

    #[test]
    fn test_entity_display() {
        assert_eq!(RefreshEntity::User(7).to_string(), "user 7");
        assert_eq!(RefreshEntity::Post(9).to_string(), "post 9");
    }
}
