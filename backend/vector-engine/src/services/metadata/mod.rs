// Metadata Service
//
// Auxiliary side-channel storage keyed by entity id: structured weight
// columns, a freeform comment, and a nested JSON payload shared with external
// callers. Concurrency policy is last-writer-wins upsert (documented
// limitation); callers that must preserve concurrent additions read, merge
// with `merge_json`, and write back. The click recording and partial payload
// merge paths below both follow that pattern.

use serde_json::{json, Map, Value};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::warn;

use crate::error::Result;
use crate::models::{PostVectorMetadata, UserVectorMetadata};

/// Fixed payload key holding rolling info-button click aggregates. The value
/// at this key is overwritten on every recompute; sibling keys are preserved.
pub const INFO_CLICKS_KEY: &str = "info_clicks";

#[derive(Clone)]
pub struct MetadataService {
    pool: PgPool,
}

impl MetadataService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert user metadata. Only provided fields are touched; the payload,
    /// when provided, replaces the stored document wholesale.
    pub async fn store_user_metadata(
        &self,
        user_id: i64,
        comment: Option<&str>,
        payload: Option<&Value>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_vector_metadata (user_id, comment, payload, created_at, updated_at)
            VALUES ($1, $2, COALESCE($3, '{}'::jsonb), NOW(), NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET comment = COALESCE($2, user_vector_metadata.comment),
                          payload = COALESCE($3, user_vector_metadata.payload),
                          updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(comment)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn store_post_metadata(
        &self,
        post_id: i64,
        comment: Option<&str>,
        payload: Option<&Value>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_vector_metadata (post_id, comment, payload, created_at, updated_at)
            VALUES ($1, $2, COALESCE($3, '{}'::jsonb), NOW(), NOW())
            ON CONFLICT (post_id)
            DO UPDATE SET comment = COALESCE($2, post_vector_metadata.comment),
                          payload = COALESCE($3, post_vector_metadata.payload),
                          updated_at = NOW()
            "#,
        )
        .bind(post_id)
        .bind(comment)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Absence is a normal outcome here, never an error.
    pub async fn get_user_metadata(&self, user_id: i64) -> Result<Option<UserVectorMetadata>> {
        let metadata = sqlx::query_as::<_, UserVectorMetadata>(
            r#"
            SELECT user_id, genre_weights, demographic_weights, region_weights,
                   language_weights, comment, payload, created_at, updated_at
            FROM user_vector_metadata
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(metadata)
    }

    pub async fn get_post_metadata(&self, post_id: i64) -> Result<Option<PostVectorMetadata>> {
        let metadata = sqlx::query_as::<_, PostVectorMetadata>(
            r#"
            SELECT post_id, comment, payload, created_at, updated_at
            FROM post_vector_metadata
            WHERE post_id = $1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(metadata)
    }

    /// Persist derived genre preference weights for a user. Written by the
    /// refresh jobs; read back by external metadata consumers.
    pub async fn update_genre_weights(
        &self,
        user_id: i64,
        weights: &HashMap<i64, f32>,
    ) -> Result<()> {
        let weights_json = Value::Object(
            weights
                .iter()
                .map(|(genre_id, weight)| (genre_id.to_string(), json!(weight)))
                .collect(),
        );

        sqlx::query(
            r#"
            INSERT INTO user_vector_metadata (user_id, genre_weights, payload, created_at, updated_at)
            VALUES ($1, $2, '{}'::jsonb, NOW(), NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET genre_weights = EXCLUDED.genre_weights,
                          updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(weights_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Partial payload update for a user: read the stored document, merge
    /// the incoming fragment into it, and write back. Sibling keys survive;
    /// scalars at colliding leaves are overwritten.
    pub async fn merge_user_payload(&self, user_id: i64, incoming: &Value) -> Result<()> {
        let mut payload = self
            .get_user_metadata(user_id)
            .await?
            .map(|m| m.payload)
            .unwrap_or_else(|| json!({}));
        merge_json(&mut payload, incoming);
        self.store_user_metadata(user_id, None, Some(&payload)).await
    }

    /// Partial payload update for a post.
    pub async fn merge_post_payload(&self, post_id: i64, incoming: &Value) -> Result<()> {
        let mut payload = self
            .get_post_metadata(post_id)
            .await?
            .map(|m| m.payload)
            .unwrap_or_else(|| json!({}));
        merge_json(&mut payload, incoming);
        self.store_post_metadata(post_id, None, Some(&payload)).await
    }

    /// Record one info-button click. The click row itself is the source of
    /// truth and its insert propagates failures; folding the recomputed
    /// aggregates into both metadata payloads is best-effort and only logged.
    pub async fn record_info_button_click(&self, user_id: i64, post_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO info_button_clicks (user_id, post_id, clicked_at) VALUES ($1, $2, NOW())",
        )
        .bind(user_id)
        .bind(post_id)
        .execute(&self.pool)
        .await?;

        if let Err(e) = self.fold_user_click_aggregate(user_id).await {
            warn!(user_id, error = %e, "User click aggregate backfill failed");
        }
        if let Err(e) = self.fold_post_click_aggregate(post_id).await {
            warn!(post_id, error = %e, "Post click aggregate backfill failed");
        }

        Ok(())
    }

    async fn fold_user_click_aggregate(&self, user_id: i64) -> Result<()> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM info_button_clicks WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let by_post: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT post_id, COUNT(*) FROM info_button_clicks
            WHERE user_id = $1
            GROUP BY post_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let aggregate = json!({
            "total": total,
            "by_post": Value::Object(
                by_post
                    .into_iter()
                    .map(|(post_id, count)| (post_id.to_string(), json!(count)))
                    .collect(),
            ),
        });

        let payload = self
            .get_user_metadata(user_id)
            .await?
            .map(|m| m.payload)
            .unwrap_or_else(|| json!({}));
        let folded = fold_click_aggregate(payload, aggregate);

        self.store_user_metadata(user_id, None, Some(&folded)).await
    }

    async fn fold_post_click_aggregate(&self, post_id: i64) -> Result<()> {
        let (total, unique_users): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(DISTINCT user_id) FROM info_button_clicks WHERE post_id = $1",
        )
        .bind(post_id)
        .fetch_one(&self.pool)
        .await?;

        let aggregate = json!({
            "total": total,
            "unique_users": unique_users,
        });

        let payload = self
            .get_post_metadata(post_id)
            .await?
            .map(|m| m.payload)
            .unwrap_or_else(|| json!({}));
        let folded = fold_click_aggregate(payload, aggregate);

        self.store_post_metadata(post_id, None, Some(&folded)).await
    }
}

/// Set the click aggregate under its fixed key, replacing whatever was there
/// while leaving every sibling key alone. A non-object payload is replaced by
/// a fresh object rather than corrupted in place.
pub fn fold_click_aggregate(payload: Value, aggregate: Value) -> Value {
    let mut map = match payload {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.insert(INFO_CLICKS_KEY.to_string(), aggregate);
    Value::Object(map)
}

/// Recursive JSON merge: objects merge key by key, everything else is
/// overwritten by the incoming value. The read-merge-write pattern for
/// partial payload updates builds on this so concurrent additions under
/// different keys are not lost.
pub fn merge_json(base: &mut Value, incoming: &Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                merge_json(base_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (base_slot, incoming_value) => {
            *base_slot = incoming_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_json_recursive() {
        let mut base = json!({
            "weights": {"action": 0.8, "drama": 0.2},
            "comment": "a",
        });
        let incoming = json!({
            "weights": {"drama": 0.5, "comedy": 0.3},
            "new_key": true,
        });

        merge_json(&mut base, &incoming);

        assert_eq!(base["weights"]["action"], json!(0.8));
        assert_eq!(base["weights"]["drama"], json!(0.5));
        assert_eq!(base["weights"]["comedy"], json!(0.3));
        assert_eq!(base["comment"], json!("a"));
        assert_eq!(base["new_key"], json!(true));
    }

    #[test]
    fn test_merge_json_scalar_overwrite() {
        let mut base = json!({"count": 1});
        merge_json(&mut base, &json!({"count": {"nested": 2}}));
        assert_eq!(base["count"]["nested"], json!(2));
    }

    #[test]
    fn test_fold_click_aggregate_preserves_siblings() {
        let payload = json!({
            "preference_weights": {"action": 0.9},
            "info_clicks": {"total": 1, "by_post": {"7": 1}},
        });
        let folded = fold_click_aggregate(
            payload,
            json!({"total": 2, "by_post": {"7": 1, "9": 1}}),
        );

        // Prior aggregate fully replaced, not merged.
        assert_eq!(folded[INFO_CLICKS_KEY]["total"], json!(2));
        assert_eq!(folded[INFO_CLICKS_KEY]["by_post"]["9"], json!(1));
        // Siblings untouched.
        assert_eq!(folded["preference_weights"]["action"], json!(0.9));
    }

    #[test]
    fn test_fold_click_aggregate_non_object_payload() {
        let folded = fold_click_aggregate(Value::Null, json!({"total": 1}));
        assert_eq!(folded[INFO_CLICKS_KEY]["total"], json!(1));
    }
}
