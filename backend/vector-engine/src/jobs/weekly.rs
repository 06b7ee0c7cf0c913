// Weekly maintenance job: recompute derived genre preferences for every user
// (not just the recently active) and prune behavior profiles that have not
// been touched within the retention window.

use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info};

use super::{EngineContext, RefreshEntity, RefreshOutcome};
use crate::config::RefreshConfig;
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct WeeklyStats {
    pub users_processed: u32,
    pub users_failed: u32,
    pub profiles_pruned: u64,
    pub duration_ms: u64,
}

pub struct WeeklyMaintenanceJob {
    ctx: Arc<EngineContext>,
    config: RefreshConfig,
}

impl WeeklyMaintenanceJob {
    pub fn new(ctx: Arc<EngineContext>, config: RefreshConfig) -> Self {
        Self { ctx, config }
    }

    pub async fn run(&self) {
        info!(
            interval_secs = self.config.weekly_interval_secs,
            prune_days = self.config.profile_prune_days,
            "Starting weekly maintenance job"
        );

        loop {
            sleep(Duration::from_secs(self.config.weekly_interval_secs)).await;

            match self.run_once().await {
                Ok(stats) => {
                    info!(
                        users = stats.users_processed,
                        users_failed = stats.users_failed,
                        profiles_pruned = stats.profiles_pruned,
                        duration_ms = stats.duration_ms,
                        "Weekly maintenance pass completed"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Weekly maintenance pass failed");
                }
            }
        }
    }

    pub async fn run_once(&self) -> Result<WeeklyStats> {
        let started = Instant::now();

        self.ctx.catalog.invalidate().await;
        let user_ids = self.ctx.users.all_user_ids().await?;
        info!(users = user_ids.len(), "Recomputing global derived preferences");

        let concurrency = self.config.concurrency();
        let outcomes: Vec<RefreshOutcome> = stream::iter(user_ids)
            .map(|user_id| {
                let ctx = Arc::clone(&self.ctx);
                async move {
                    let result = ctx.update_derived_preferences(user_id).await;
                    RefreshOutcome {
                        entity: RefreshEntity::User(user_id),
                        result,
                    }
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        for outcome in &outcomes {
            if let Err(e) = &outcome.result {
                error!(entity = %outcome.entity, error = %e, "Preference recompute failed");
            }
        }
        let (users_processed, users_failed) = RefreshOutcome::tally(&outcomes);

        let cutoff = Utc::now() - ChronoDuration::days(self.config.profile_prune_days);
        let profiles_pruned = self
            .ctx
            .profile_store
            .delete_profiles_older_than(cutoff)
            .await?;

        Ok(WeeklyStats {
            users_processed,
            users_failed,
            profiles_pruned,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
