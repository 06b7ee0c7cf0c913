// Vector Store Adapter
//
// Thin wrapper over the pgvector extension. Vectors are keyed by entity id
// within a space (user-space or item-space); `put` is an upsert, reads return
// options, and nearest-neighbor queries order by the `<=>` cosine-distance
// operator against the HNSW index created at init time.

use pgvector::Vector;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::error::Result;
use crate::models::{POST_VECTOR_DIM, USER_VECTOR_DIM};

/// Embedding space selector. The two spaces share a width but are never
/// cross-compared; queries are user-vector against the post table only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorSpace {
    User,
    Post,
}

impl VectorSpace {
    fn table(&self) -> &'static str {
        match self {
            VectorSpace::User => "user_vectors",
            VectorSpace::Post => "post_vectors",
        }
    }

    fn key_column(&self) -> &'static str {
        match self {
            VectorSpace::User => "user_id",
            VectorSpace::Post => "post_id",
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            VectorSpace::User => USER_VECTOR_DIM,
            VectorSpace::Post => POST_VECTOR_DIM,
        }
    }
}

/// Optional SQL-side filters for post-space candidate search.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    /// Restrict to one media type ("movie" / "tv").
    pub media_type: Option<String>,
    /// Restrict to posts carrying a playable trailer.
    pub require_video_key: bool,
    /// Restrict to posts available on a provider this user subscribes to.
    pub subscriber_user_id: Option<i64>,
}

#[derive(Clone)]
pub struct VectorStore {
    pool: PgPool,
}

impl VectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a vector by entity id within a space.
    pub async fn put(&self, space: VectorSpace, entity_id: i64, values: Vec<f32>) -> Result<()> {
        let dimension = values.len() as i32;
        let sql = format!(
            r#"
            INSERT INTO {table} ({key}, embedding, dimension, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT ({key})
            DO UPDATE SET embedding = EXCLUDED.embedding,
                          dimension = EXCLUDED.dimension,
                          updated_at = NOW()
            "#,
            table = space.table(),
            key = space.key_column(),
        );

        sqlx::query(&sql)
            .bind(entity_id)
            .bind(Vector::from(values))
            .bind(dimension)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get(&self, space: VectorSpace, entity_id: i64) -> Result<Option<Vec<f32>>> {
        let sql = format!(
            "SELECT embedding FROM {table} WHERE {key} = $1",
            table = space.table(),
            key = space.key_column(),
        );

        let embedding: Option<Vector> = sqlx::query_scalar(&sql)
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(embedding.map(|v| v.to_vec()))
    }

    /// User vector, or the zero vector of the user-space dimension when the
    /// user has none yet. Keeps downstream similarity math always defined.
    pub async fn user_vector_or_default(&self, user_id: i64) -> Result<Vec<f32>> {
        Ok(self
            .get(VectorSpace::User, user_id)
            .await?
            .unwrap_or_else(|| vec![0.0; USER_VECTOR_DIM]))
    }

    /// Batch fetch; ids without a stored vector are simply absent from the map.
    pub async fn get_many(
        &self,
        space: VectorSpace,
        entity_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<f32>>> {
        if entity_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT {key}, embedding FROM {table} WHERE {key} = ANY($1)",
            table = space.table(),
            key = space.key_column(),
        );

        let rows: Vec<(i64, Vector)> = sqlx::query_as(&sql)
            .bind(entity_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, embedding)| (id, embedding.to_vec()))
            .collect())
    }

    /// Ids in a space ordered by ascending cosine distance from the query.
    pub async fn nearest_neighbors(
        &self,
        space: VectorSpace,
        query: &[f32],
        k: i64,
        exclude: &[i64],
    ) -> Result<Vec<i64>> {
        let sql = format!(
            r#"
            SELECT {key} FROM {table}
            WHERE NOT ({key} = ANY($2))
            ORDER BY embedding <=> $1
            LIMIT $3
            "#,
            table = space.table(),
            key = space.key_column(),
        );

        let ids: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(Vector::from(query.to_vec()))
            .bind(exclude)
            .bind(k)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    /// Filtered post-space search used by the fallback ranker: excludes seen
    /// posts and applies content-type / trailer / subscription predicates in
    /// SQL so the index does the heavy lifting.
    pub async fn nearest_posts(
        &self,
        query: &[f32],
        k: i64,
        exclude: &[i64],
        filter: &CandidateFilter,
    ) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT pv.post_id
            FROM post_vectors pv
            JOIN posts p ON p.id = pv.post_id
            WHERE NOT (pv.post_id = ANY($2))
              AND ($3::text IS NULL OR p.media_type = $3)
              AND (NOT $4 OR (p.video_key IS NOT NULL AND p.video_key <> ''))
              AND ($5::bigint IS NULL OR EXISTS (
                    SELECT 1
                    FROM post_providers pp
                    JOIN user_provider_subscriptions ups
                      ON ups.provider_id = pp.provider_id
                     AND ups.user_id = $5
                    WHERE pp.post_id = p.id))
            ORDER BY pv.embedding <=> $1
            LIMIT $6
            "#,
        )
        .bind(Vector::from(query.to_vec()))
        .bind(exclude)
        .bind(filter.media_type.as_deref())
        .bind(filter.require_video_key)
        .bind(filter.subscriber_user_id)
        .bind(k)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
