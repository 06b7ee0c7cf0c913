// Daily refresh job.
//
// Recomputes vectors, profiles and derived preferences for entities with
// activity in the last 24 hours. Work units run through a bounded worker pool
// and report their result as a value, so one failing entity is logged and the
// rest of the batch proceeds. Overlapping runs are skipped rather than
// stacked: duplicate upserts would be safe but wasteful.

use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::{EngineContext, RefreshEntity, RefreshOutcome};
use crate::config::RefreshConfig;
use crate::error::Result;

/// Activity lookback for the daily pass.
const ACTIVITY_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Default)]
pub struct RefreshStats {
    pub users_processed: u32,
    pub users_failed: u32,
    pub posts_processed: u32,
    pub posts_failed: u32,
    pub duration_ms: u64,
}

pub struct DailyRefreshJob {
    ctx: Arc<EngineContext>,
    config: RefreshConfig,
    running: AtomicBool,
}

impl DailyRefreshJob {
    pub fn new(ctx: Arc<EngineContext>, config: RefreshConfig) -> Self {
        Self {
            ctx,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Run forever on the configured interval.
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.daily_interval_secs,
            concurrency = self.config.concurrency(),
            "Starting daily refresh job"
        );

        loop {
            sleep(Duration::from_secs(self.config.daily_interval_secs)).await;

            match self.run_once().await {
                Ok(Some(stats)) => {
                    info!(
                        users = stats.users_processed,
                        users_failed = stats.users_failed,
                        posts = stats.posts_processed,
                        posts_failed = stats.posts_failed,
                        duration_ms = stats.duration_ms,
                        "Daily refresh pass completed"
                    );
                }
                Ok(None) => {
                    warn!("Previous daily refresh still running, skipping this tick");
                }
                Err(e) => {
                    error!(error = %e, "Daily refresh pass failed");
                }
            }
        }
    }

    /// One pass. Returns `None` when a previous pass is still active.
    pub async fn run_once(&self) -> Result<Option<RefreshStats>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(None);
        }
        let result = self.refresh_active_entities().await;
        self.running.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    async fn refresh_active_entities(&self) -> Result<RefreshStats> {
        let started = Instant::now();
        let cutoff = Utc::now() - ChronoDuration::hours(ACTIVITY_WINDOW_HOURS);

        // Genres may have changed since the last pass; start from a fresh
        // snapshot so every encode in this batch sees the same catalog.
        self.ctx.catalog.invalidate().await;

        let user_ids = self.ctx.users.active_user_ids_since(cutoff).await?;
        let post_ids = self.ctx.posts.changed_post_ids_since(cutoff).await?;

        info!(
            users = user_ids.len(),
            posts = post_ids.len(),
            "Selected entities for daily refresh"
        );

        let concurrency = self.config.concurrency();

        let user_outcomes = run_units(
            &self.ctx,
            user_ids.into_iter().map(RefreshEntity::User).collect(),
            concurrency,
        )
        .await;
        let post_outcomes = run_units(
            &self.ctx,
            post_ids.into_iter().map(RefreshEntity::Post).collect(),
            concurrency,
        )
        .await;

        for outcome in user_outcomes.iter().chain(post_outcomes.iter()) {
            if let Err(e) = &outcome.result {
                error!(entity = %outcome.entity, error = %e, "Refresh unit failed");
            }
        }

        let (users_processed, users_failed) = RefreshOutcome::tally(&user_outcomes);
        let (posts_processed, posts_failed) = RefreshOutcome::tally(&post_outcomes);

        Ok(RefreshStats {
            users_processed,
            users_failed,
            posts_processed,
            posts_failed,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Execute refresh units through the bounded worker pool, collecting each
/// unit's result as a value.
async fn run_units(
    ctx: &Arc<EngineContext>,
    entities: Vec<RefreshEntity>,
    concurrency: usize,
) -> Vec<RefreshOutcome> {
    stream::iter(entities)
        .map(|entity| {
            let ctx = Arc::clone(ctx);
            async move {
                let result = match entity {
                    RefreshEntity::User(user_id) => ctx.refresh_user(user_id).await,
                    RefreshEntity::Post(post_id) => ctx.encode_and_store_post(post_id).await,
                };
                RefreshOutcome { entity, result }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}
