// Read-only tabular accessors for collaborator tables (users, posts,
// interactions, genres, subscriptions). The engine never writes these; its
// own tables are handled by the vector store, profiler and metadata service.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::Result;
use crate::models::{
    Genre, GenrePreference, Post, PostEngagementStats, PostInteraction, TrailerInteraction, User,
};

/// Newest-first interaction cap per user for vector generation. Bounds the
/// cost of encoding heavy users; older history decays out of the window.
pub const INTERACTION_WINDOW: i64 = 100;

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, preferred_runtime_minutes, preferred_year_min, preferred_year_max,
                   created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn user_exists(&self, user_id: i64) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    pub async fn all_user_ids(&self) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    /// Users with any post or trailer interaction since the cutoff.
    pub async fn active_user_ids_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT user_id FROM (
                SELECT user_id FROM post_interactions WHERE started_at >= $1
                UNION ALL
                SELECT user_id FROM trailer_interactions WHERE started_at >= $1
            ) activity
            ORDER BY user_id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    pub async fn genre_preferences(&self, user_id: i64) -> Result<Vec<GenrePreference>> {
        let prefs = sqlx::query_as::<_, GenrePreference>(
            r#"
            SELECT user_id, genre_id, priority
            FROM user_genre_preferences
            WHERE user_id = $1
            ORDER BY genre_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(prefs)
    }
}

#[derive(Clone)]
pub struct PostRepository {
    pool: PgPool,
}

impl PostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_post(&self, post_id: i64) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, title, media_type, release_year, runtime_minutes,
                   vote_average, vote_count, popularity, video_key,
                   created_at, updated_at
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    pub async fn all_post_ids(&self) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM posts ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    /// Posts created or updated since the cutoff.
    pub async fn changed_post_ids_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM posts WHERE created_at >= $1 OR updated_at >= $1 ORDER BY id",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Fetch posts preserving the order of the given id list. The
    /// `array_position` sort is load-bearing: recommendation order comes from
    /// the ranker, not from the table's natural order.
    pub async fn posts_in_order(&self, ids: &[i64]) -> Result<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, title, media_type, release_year, runtime_minutes,
                   vote_average, vote_count, popularity, video_key,
                   created_at, updated_at
            FROM posts
            WHERE id = ANY($1)
            ORDER BY array_position($1, id)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    /// All posts carrying a playable trailer. The trailer corpus is small
    /// enough to score exhaustively, which is what the fallback ranker does.
    pub async fn trailer_posts(&self) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, title, media_type, release_year, runtime_minutes,
                   vote_average, vote_count, popularity, video_key,
                   created_at, updated_at
            FROM posts
            WHERE video_key IS NOT NULL AND video_key <> ''
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    /// Viewer engagement aggregates for one post; zeroed stats when nobody
    /// has interacted with it yet.
    pub async fn engagement_stats(&self, post_id: i64) -> Result<PostEngagementStats> {
        let stats = sqlx::query_as::<_, PostEngagementStats>(
            r#"
            SELECT post_id,
                   COALESCE(AVG(EXTRACT(EPOCH FROM (ended_at - started_at))), 0)::float8
                       AS avg_watch_seconds,
                   COUNT(*) AS view_count,
                   COALESCE(AVG(CASE WHEN liked THEN 1.0 ELSE 0.0 END), 0)::float8
                       AS like_ratio,
                   COALESCE(AVG(CASE WHEN saved THEN 1.0 ELSE 0.0 END), 0)::float8
                       AS save_ratio
            FROM post_interactions
            WHERE post_id = $1
            GROUP BY post_id
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stats.unwrap_or(PostEngagementStats {
            post_id,
            ..PostEngagementStats::default()
        }))
    }
}

#[derive(Clone)]
pub struct InteractionRepository {
    pool: PgPool,
}

impl InteractionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent post interactions for a user, newest first, capped.
    pub async fn recent_post_interactions(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<PostInteraction>> {
        let interactions = sqlx::query_as::<_, PostInteraction>(
            r#"
            SELECT user_id, post_id, started_at, ended_at, liked, saved, comment_pressed
            FROM post_interactions
            WHERE user_id = $1
            ORDER BY started_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(interactions)
    }

    /// Most recent trailer interactions for a user, newest first, capped.
    pub async fn recent_trailer_interactions(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<TrailerInteraction>> {
        let interactions = sqlx::query_as::<_, TrailerInteraction>(
            r#"
            SELECT user_id, post_id, started_at, ended_at, liked, saved,
                   comment_pressed, muted, replay_count
            FROM trailer_interactions
            WHERE user_id = $1
            ORDER BY started_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(interactions)
    }

    /// Every post the user has already touched, used to exclude seen content
    /// from fallback candidates.
    pub async fn interacted_post_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT post_id FROM (
                SELECT post_id FROM post_interactions WHERE user_id = $1
                UNION ALL
                SELECT post_id FROM trailer_interactions WHERE user_id = $1
            ) seen
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

#[derive(Clone)]
pub struct GenreRepository {
    pool: PgPool,
}

impl GenreRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn all_genres(&self) -> Result<Vec<Genre>> {
        let genres = sqlx::query_as::<_, Genre>("SELECT id, name FROM genres ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(genres)
    }

    pub async fn post_genre_ids(&self, post_id: i64) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT genre_id FROM post_genres WHERE post_id = $1 ORDER BY genre_id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Genre memberships for a batch of posts as (post_id, genre_id) pairs.
    pub async fn genre_ids_for_posts(&self, post_ids: &[i64]) -> Result<Vec<(i64, i64)>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT post_id, genre_id FROM post_genres WHERE post_id = ANY($1)",
        )
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
