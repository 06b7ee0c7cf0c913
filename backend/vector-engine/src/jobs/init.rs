// Startup initialization: ensure the engine's tables and indexes exist, then
// bulk-backfill vectors when the tables are empty. Idempotent by construction
// (IF NOT EXISTS everywhere, backfill skips ids that already have a vector),
// so it runs unconditionally before normal traffic.

use sqlx::PgPool;
use std::collections::HashSet;
use tracing::{info, warn};

use super::EngineContext;
use crate::error::Result;
use crate::services::vector_store::VectorSpace;

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS vector",
    r#"
    CREATE TABLE IF NOT EXISTS user_vectors (
        user_id    BIGINT PRIMARY KEY,
        embedding  vector(64) NOT NULL,
        dimension  INT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS post_vectors (
        post_id    BIGINT PRIMARY KEY,
        embedding  vector(64) NOT NULL,
        dimension  INT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_user_vectors_embedding
        ON user_vectors USING hnsw (embedding vector_cosine_ops)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_post_vectors_embedding
        ON post_vectors USING hnsw (embedding vector_cosine_ops)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_behavior_profiles (
        user_id       BIGINT PRIMARY KEY,
        metrics       JSONB NOT NULL,
        dominant_type TEXT NOT NULL,
        updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_vector_metadata (
        user_id             BIGINT PRIMARY KEY,
        genre_weights       JSONB,
        demographic_weights JSONB,
        region_weights      JSONB,
        language_weights    JSONB,
        comment             TEXT,
        payload             JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS post_vector_metadata (
        post_id    BIGINT PRIMARY KEY,
        comment    TEXT,
        payload    JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_user_vector_metadata_updated_at
        ON user_vector_metadata (updated_at)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_post_vector_metadata_updated_at
        ON post_vector_metadata (updated_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS info_button_clicks (
        id         BIGSERIAL PRIMARY KEY,
        user_id    BIGINT NOT NULL,
        post_id    BIGINT NOT NULL,
        clicked_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_info_button_clicks_user
        ON info_button_clicks (user_id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_info_button_clicks_post
        ON info_button_clicks (post_id)
    "#,
];

/// Create the engine's tables and indexes.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Vector engine schema ensured");
    Ok(())
}

/// Backfill vectors for every user and post when a space is empty. Failures
/// for individual entities are logged and skipped; initialization should not
/// fail because one record refuses to encode.
pub async fn backfill_if_empty(ctx: &EngineContext, pool: &PgPool) -> Result<()> {
    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_vectors")
        .fetch_one(pool)
        .await?;
    if user_count == 0 {
        let existing = stored_ids(pool, VectorSpace::User).await?;
        let user_ids = ctx.users.all_user_ids().await?;
        let mut filled = 0u32;
        for user_id in user_ids {
            if existing.contains(&user_id) {
                continue;
            }
            match ctx.encode_and_store_user(user_id).await {
                Ok(()) => filled += 1,
                Err(e) => warn!(user_id, error = %e, "User vector backfill failed"),
            }
        }
        info!(filled, "User vector backfill completed");
    }

    let post_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_vectors")
        .fetch_one(pool)
        .await?;
    if post_count == 0 {
        let existing = stored_ids(pool, VectorSpace::Post).await?;
        let post_ids = ctx.posts.all_post_ids().await?;
        let mut filled = 0u32;
        for post_id in post_ids {
            if existing.contains(&post_id) {
                continue;
            }
            match ctx.encode_and_store_post(post_id).await {
                Ok(()) => filled += 1,
                Err(e) => warn!(post_id, error = %e, "Post vector backfill failed"),
            }
        }
        info!(filled, "Post vector backfill completed");
    }

    Ok(())
}

async fn stored_ids(pool: &PgPool, space: VectorSpace) -> Result<HashSet<i64>> {
    let sql = match space {
        VectorSpace::User => "SELECT user_id FROM user_vectors",
        VectorSpace::Post => "SELECT post_id FROM post_vectors",
    };
    let ids: Vec<i64> = sqlx::query_scalar(sql).fetch_all(pool).await?;
    Ok(ids.into_iter().collect())
}

/// Run the whole initialization sequence.
pub async fn initialize(ctx: &EngineContext, pool: &PgPool) -> Result<()> {
    ensure_schema(pool).await?;
    backfill_if_empty(ctx, pool).await
}
