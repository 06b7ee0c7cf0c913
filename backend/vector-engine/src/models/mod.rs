// Domain models for the feature-vector engine.
//
// Every table read or written by the engine maps to exactly one struct here,
// and the encoder, profiler, metadata service and refresh jobs all consume
// these shapes instead of doing their own row mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::collections::HashMap;

/// Width of the user embedding space.
pub const USER_VECTOR_DIM: usize = 64;
/// Width of the post (content item) embedding space.
///
/// Same width as the user space, but the two spaces are not comparable:
/// similarity queries are only ever user-query against the post table.
pub const POST_VECTOR_DIM: usize = 64;

/// Content-type marker that routes a recommendation request through the
/// exhaustive trailer scoring path instead of the indexed vector search.
pub const CONTENT_TYPE_TRAILERS: &str = "trailers";

/// A user record, restricted to the fields the encoder consumes.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    /// Preferred runtime in minutes, when the user has stated one.
    pub preferred_runtime_minutes: Option<i32>,
    pub preferred_year_min: Option<i32>,
    pub preferred_year_max: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// A content item (movie or TV entry).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    /// "movie" or "tv".
    pub media_type: String,
    pub release_year: Option<i32>,
    pub runtime_minutes: Option<i32>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub popularity: Option<f64>,
    /// Present only when the item carries a playable trailer.
    pub video_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn is_movie(&self) -> bool {
        self.media_type == "movie"
    }

    pub fn has_trailer(&self) -> bool {
        self.video_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

/// Explicit genre preference with a 0-10 priority score.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GenrePreference {
    pub user_id: i64,
    pub genre_id: i64,
    pub priority: i32,
}

/// A single post viewing interaction. Read-only to this engine.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostInteraction {
    pub user_id: i64,
    pub post_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub liked: bool,
    pub saved: bool,
    pub comment_pressed: bool,
}

impl PostInteraction {
    /// Engagement duration in seconds; 0 when the interaction never ended.
    pub fn duration_seconds(&self) -> f64 {
        match self.ended_at {
            Some(ended) => (ended - self.started_at).num_seconds().max(0) as f64,
            None => 0.0,
        }
    }
}

/// A single trailer viewing interaction. Read-only to this engine.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrailerInteraction {
    pub user_id: i64,
    pub post_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub liked: bool,
    pub saved: bool,
    pub comment_pressed: bool,
    pub muted: bool,
    pub replay_count: i32,
}

impl TrailerInteraction {
    pub fn duration_seconds(&self) -> f64 {
        match self.ended_at {
            Some(ended) => (ended - self.started_at).num_seconds().max(0) as f64,
            None => 0.0,
        }
    }
}

/// Viewer engagement aggregates for one post, folded into its embedding.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct PostEngagementStats {
    pub post_id: i64,
    pub avg_watch_seconds: f64,
    pub view_count: i64,
    pub like_ratio: f64,
    pub save_ratio: f64,
}

/// Aggregated behavior profile for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub user_id: i64,
    /// Named metrics, all in [0, 1]. Keys are fixed by the profiler.
    pub metrics: HashMap<String, f64>,
    pub dominant_type: String,
    pub updated_at: DateTime<Utc>,
}

/// Raw profile row; `metrics` arrives as JSONB.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BehaviorProfileRow {
    pub user_id: i64,
    pub metrics: Json<HashMap<String, f64>>,
    pub dominant_type: String,
    pub updated_at: DateTime<Utc>,
}

impl From<BehaviorProfileRow> for BehaviorProfile {
    fn from(row: BehaviorProfileRow) -> Self {
        BehaviorProfile {
            user_id: row.user_id,
            metrics: row.metrics.0,
            dominant_type: row.dominant_type,
            updated_at: row.updated_at,
        }
    }
}

/// User-side vector metadata: structured weights plus a freeform comment and
/// a nested payload document shared with external callers.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserVectorMetadata {
    pub user_id: i64,
    pub genre_weights: Option<serde_json::Value>,
    pub demographic_weights: Option<serde_json::Value>,
    pub region_weights: Option<serde_json::Value>,
    pub language_weights: Option<serde_json::Value>,
    pub comment: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post-side vector metadata.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostVectorMetadata {
    pub post_id: i64,
    pub comment: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One page of hydrated recommendations.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationPage {
    pub posts: Vec<Post>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

impl RecommendationPage {
    pub fn empty(page: i64, page_size: i64) -> Self {
        Self {
            posts: Vec::new(),
            page,
            page_size,
            total: 0,
        }
    }
}
