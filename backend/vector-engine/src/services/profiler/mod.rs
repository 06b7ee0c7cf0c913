// Behavior Profiler
//
// Aggregates a user's recent interaction history into named ratio/duration
// metrics, classifies a dominant behavior archetype, and caches the result in
// `user_behavior_profiles` with a one-day staleness window (read-repair on
// access). Storage goes through the `ProfileStore` trait so tests can run
// against an in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::{InteractionRepository, INTERACTION_WINDOW};
use crate::error::Result;
use crate::models::{BehaviorProfile, BehaviorProfileRow, PostInteraction, TrailerInteraction};
use crate::services::encoder::{InteractionSummary, TrailerSignals};

/// Profiles older than this many hours are treated as absent and regenerated
/// on read.
pub const PROFILE_STALENESS_HOURS: i64 = 24;

/// Fixed metric names. Every profile carries exactly this set.
pub const METRIC_POST_LIKE_RATIO: &str = "post_like_ratio";
pub const METRIC_POST_SAVE_RATIO: &str = "post_save_ratio";
pub const METRIC_POST_COMMENT_RATIO: &str = "post_comment_ratio";
pub const METRIC_AVG_POST_DURATION: &str = "avg_post_duration";
pub const METRIC_POST_PREFERENCE_RATIO: &str = "post_preference_ratio";
pub const METRIC_TRAILER_LIKE_RATIO: &str = "trailer_like_ratio";
pub const METRIC_TRAILER_SAVE_RATIO: &str = "trailer_save_ratio";
pub const METRIC_TRAILER_COMMENT_RATIO: &str = "trailer_comment_ratio";
pub const METRIC_AVG_TRAILER_DURATION: &str = "avg_trailer_duration";
pub const METRIC_TRAILER_MUTE_RATIO: &str = "trailer_mute_ratio";
pub const METRIC_TRAILER_REPLAY: &str = "trailer_replay";
pub const METRIC_TRAILER_PREFERENCE_RATIO: &str = "trailer_preference_ratio";

/// Behavior archetypes.
pub const TYPE_CONTENT_SAVER: &str = "content_saver";
pub const TYPE_CONTENT_LIKER: &str = "content_liker";
pub const TYPE_COMMENTER: &str = "commenter";
pub const TYPE_TRAILER_FOCUSED: &str = "trailer_focused";
pub const TYPE_CONTENT_FOCUSED: &str = "content_focused";

/// Storage operations behind the profiler.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load_profile(&self, user_id: i64) -> Result<Option<BehaviorProfile>>;
    async fn save_profile(&self, profile: &BehaviorProfile) -> Result<()>;
    async fn fetch_post_interactions(&self, user_id: i64) -> Result<Vec<PostInteraction>>;
    async fn fetch_trailer_interactions(&self, user_id: i64) -> Result<Vec<TrailerInteraction>>;
}

/// Postgres-backed store.
pub struct SqlProfileStore {
    pool: PgPool,
    interactions: InteractionRepository,
}

impl SqlProfileStore {
    pub fn new(pool: PgPool) -> Self {
        let interactions = InteractionRepository::new(pool.clone());
        Self { pool, interactions }
    }

    /// Weekly maintenance: drop profiles untouched for the given cutoff.
    pub async fn delete_profiles_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_behavior_profiles WHERE updated_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProfileStore for SqlProfileStore {
    async fn load_profile(&self, user_id: i64) -> Result<Option<BehaviorProfile>> {
        let row = sqlx::query_as::<_, BehaviorProfileRow>(
            r#"
            SELECT user_id, metrics, dominant_type, updated_at
            FROM user_behavior_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(BehaviorProfile::from))
    }

    async fn save_profile(&self, profile: &BehaviorProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_behavior_profiles (user_id, metrics, dominant_type, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id)
            DO UPDATE SET metrics = EXCLUDED.metrics,
                          dominant_type = EXCLUDED.dominant_type,
                          updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(profile.user_id)
        .bind(Json(&profile.metrics))
        .bind(&profile.dominant_type)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_post_interactions(&self, user_id: i64) -> Result<Vec<PostInteraction>> {
        self.interactions
            .recent_post_interactions(user_id, INTERACTION_WINDOW)
            .await
    }

    async fn fetch_trailer_interactions(&self, user_id: i64) -> Result<Vec<TrailerInteraction>> {
        self.interactions
            .recent_trailer_interactions(user_id, INTERACTION_WINDOW)
            .await
    }
}

pub struct BehaviorProfiler<S: ProfileStore> {
    store: Arc<S>,
}

impl<S: ProfileStore> BehaviorProfiler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Cached profile, regenerated when absent or stale. A failure while
    /// merely reading the cache degrades to regeneration; a failure during
    /// generation propagates.
    pub async fn get_profile(&self, user_id: i64) -> Result<BehaviorProfile> {
        let cached = match self.store.load_profile(user_id).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(user_id, error = %e, "Profile cache read failed, regenerating");
                None
            }
        };

        if let Some(profile) = cached {
            if Utc::now() - profile.updated_at < Duration::hours(PROFILE_STALENESS_HOURS) {
                return Ok(profile);
            }
            debug!(user_id, "Profile stale, regenerating");
        }

        self.generate(user_id).await
    }

    /// Rebuild the profile from the recent interaction window and upsert it.
    pub async fn generate(&self, user_id: i64) -> Result<BehaviorProfile> {
        let posts = self.store.fetch_post_interactions(user_id).await?;
        let trailers = self.store.fetch_trailer_interactions(user_id).await?;

        let metrics = build_metrics(&posts, &trailers);
        let dominant_type = classify(&metrics).to_string();

        let profile = BehaviorProfile {
            user_id,
            metrics,
            dominant_type,
            updated_at: Utc::now(),
        };

        self.store.save_profile(&profile).await?;

        debug!(
            user_id,
            dominant_type = %profile.dominant_type,
            "Generated behavior profile"
        );

        Ok(profile)
    }
}

/// Compute the fixed metric set from the interaction windows.
pub fn build_metrics(
    posts: &[PostInteraction],
    trailers: &[TrailerInteraction],
) -> HashMap<String, f64> {
    let post_summary = InteractionSummary::from_posts(posts);
    let trailer_summary = InteractionSummary::from_trailers(trailers);
    let signals = TrailerSignals::from_trailers(trailers);

    let total = posts.len() + trailers.len();
    let (post_pref, trailer_pref) = if total == 0 {
        (0.5, 0.5)
    } else {
        (
            posts.len() as f64 / total as f64,
            trailers.len() as f64 / total as f64,
        )
    };

    HashMap::from([
        (METRIC_POST_LIKE_RATIO.into(), post_summary.like_ratio as f64),
        (METRIC_POST_SAVE_RATIO.into(), post_summary.save_ratio as f64),
        (
            METRIC_POST_COMMENT_RATIO.into(),
            post_summary.comment_ratio as f64,
        ),
        (
            METRIC_AVG_POST_DURATION.into(),
            post_summary.avg_duration_norm as f64,
        ),
        (METRIC_POST_PREFERENCE_RATIO.into(), post_pref),
        (
            METRIC_TRAILER_LIKE_RATIO.into(),
            trailer_summary.like_ratio as f64,
        ),
        (
            METRIC_TRAILER_SAVE_RATIO.into(),
            trailer_summary.save_ratio as f64,
        ),
        (
            METRIC_TRAILER_COMMENT_RATIO.into(),
            trailer_summary.comment_ratio as f64,
        ),
        (
            METRIC_AVG_TRAILER_DURATION.into(),
            trailer_summary.avg_duration_norm as f64,
        ),
        (METRIC_TRAILER_MUTE_RATIO.into(), signals.mute_ratio as f64),
        (METRIC_TRAILER_REPLAY.into(), signals.replay_norm as f64),
        (METRIC_TRAILER_PREFERENCE_RATIO.into(), trailer_pref),
    ])
}

/// Score the five behavior archetypes and pick the argmax. The two focus
/// types are double-weighted on their preference ratio; ties (including the
/// no-data case) resolve to `content_focused`.
pub fn classify(metrics: &HashMap<String, f64>) -> &'static str {
    let get = |key: &str| metrics.get(key).copied().unwrap_or(0.0);

    let scores = [
        (
            TYPE_CONTENT_SAVER,
            (get(METRIC_POST_SAVE_RATIO) + get(METRIC_TRAILER_SAVE_RATIO)) / 2.0,
        ),
        (
            TYPE_CONTENT_LIKER,
            (get(METRIC_POST_LIKE_RATIO) + get(METRIC_TRAILER_LIKE_RATIO)) / 2.0,
        ),
        (
            TYPE_COMMENTER,
            (get(METRIC_POST_COMMENT_RATIO) + get(METRIC_TRAILER_COMMENT_RATIO)) / 2.0,
        ),
        (
            TYPE_TRAILER_FOCUSED,
            2.0 * get(METRIC_TRAILER_PREFERENCE_RATIO),
        ),
    ];

    let mut best = TYPE_CONTENT_FOCUSED;
    let mut best_score = 2.0 * get(METRIC_POST_PREFERENCE_RATIO);

    for (name, score) in scores {
        if score > best_score {
            best = name;
            best_score = score;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct InMemoryStore {
        profile: Mutex<Option<BehaviorProfile>>,
        posts: Vec<PostInteraction>,
        trailers: Vec<TrailerInteraction>,
        saves: AtomicUsize,
        fail_reads: bool,
    }

    impl InMemoryStore {
        fn new(profile: Option<BehaviorProfile>) -> Self {
            Self {
                profile: Mutex::new(profile),
                posts: Vec::new(),
                trailers: Vec::new(),
                saves: AtomicUsize::new(0),
                fail_reads: false,
            }
        }
    }

    #[async_trait]
    impl ProfileStore for InMemoryStore {
        async fn load_profile(&self, _user_id: i64) -> Result<Option<BehaviorProfile>> {
            if self.fail_reads {
                return Err(crate::error::AppError::Database("read failed".into()));
            }
            Ok(self.profile.lock().unwrap().clone())
        }

        async fn save_profile(&self, profile: &BehaviorProfile) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.profile.lock().unwrap() = Some(profile.clone());
            Ok(())
        }

        async fn fetch_post_interactions(&self, _user_id: i64) -> Result<Vec<PostInteraction>> {
            Ok(self.posts.clone())
        }

        async fn fetch_trailer_interactions(
            &self,
            _user_id: i64,
        ) -> Result<Vec<TrailerInteraction>> {
            Ok(self.trailers.clone())
        }
    }

    fn profile_updated(hours_ago: i64) -> BehaviorProfile {
        BehaviorProfile {
            user_id: 1,
            metrics: build_metrics(&[], &[]),
            dominant_type: TYPE_CONTENT_FOCUSED.to_string(),
            updated_at: Utc::now() - Duration::hours(hours_ago),
        }
    }

    fn trailer_interaction() -> TrailerInteraction {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        TrailerInteraction {
            user_id: 1,
            post_id: 7,
            started_at: start,
            ended_at: Some(start + Duration::seconds(60)),
            liked: false,
            saved: false,
            comment_pressed: false,
            muted: false,
            replay_count: 0,
        }
    }

    #[tokio::test]
    async fn test_fresh_profile_returned_as_is() {
        let store = Arc::new(InMemoryStore::new(Some(profile_updated(1))));
        let profiler = BehaviorProfiler::new(Arc::clone(&store));

        let profile = profiler.get_profile(1).await.unwrap();
        assert_eq!(profile.dominant_type, TYPE_CONTENT_FOCUSED);
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_profile_regenerated() {
        let store = Arc::new(InMemoryStore::new(Some(profile_updated(25))));
        let profiler = BehaviorProfiler::new(Arc::clone(&store));

        profiler.get_profile(1).await.unwrap();
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_read_failure_degrades_to_regeneration() {
        let mut store = InMemoryStore::new(Some(profile_updated(1)));
        store.fail_reads = true;
        let store = Arc::new(store);
        let profiler = BehaviorProfiler::new(Arc::clone(&store));

        let profile = profiler.get_profile(1).await.unwrap();
        assert_eq!(profile.user_id, 1);
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_trailer_only_user_classifies_trailer_focused() {
        let mut store = InMemoryStore::new(None);
        store.trailers = vec![trailer_interaction(), trailer_interaction()];
        let profiler = BehaviorProfiler::new(Arc::new(store));

        let profile = profiler.generate(1).await.unwrap();
        assert_eq!(profile.dominant_type, TYPE_TRAILER_FOCUSED);
    }

    #[test]
    fn test_empty_metrics_classify_content_focused() {
        let metrics = build_metrics(&[], &[]);
        assert_eq!(classify(&metrics), TYPE_CONTENT_FOCUSED);
        // Documented defaults survive into the metric map.
        assert_eq!(metrics[METRIC_POST_LIKE_RATIO], 0.5);
        assert!((metrics[METRIC_POST_COMMENT_RATIO] - 0.2).abs() < 1e-6);
        assert_eq!(metrics[METRIC_POST_PREFERENCE_RATIO], 0.5);
    }

    #[test]
    fn test_metric_set_is_fixed() {
        let metrics = build_metrics(&[], &[]);
        assert_eq!(metrics.len(), 12);
    }
}
