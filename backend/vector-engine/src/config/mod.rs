use serde::Deserialize;
use std::env;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ranking: RankingServiceConfig,
    pub refresh: RefreshConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingServiceConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Interval between daily refresh passes.
    pub daily_interval_secs: u64,
    /// Interval between weekly maintenance passes.
    pub weekly_interval_secs: u64,
    /// Worker pool size for per-entity refresh tasks. 0 = available parallelism.
    pub worker_pool_size: usize,
    /// Behavior profiles untouched for this many days are pruned weekly.
    pub profile_prune_days: i64,
}

impl RefreshConfig {
    /// Effective concurrency for per-entity refresh work.
    pub fn concurrency(&self) -> usize {
        if self.worker_pool_size > 0 {
            self.worker_pool_size
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .map_err(|_| AppError::Configuration("DATABASE_URL must be set".into()))?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .expect("DATABASE_MAX_CONNECTIONS must be a valid u32"),
            },
            ranking: RankingServiceConfig {
                base_url: env::var("RANKING_SERVICE_URL")
                    .unwrap_or_else(|_| "http://localhost:8501".to_string()),
                timeout_ms: env::var("RANKING_SERVICE_TIMEOUT_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()
                    .expect("RANKING_SERVICE_TIMEOUT_MS must be a valid u64"),
            },
            refresh: RefreshConfig {
                daily_interval_secs: env::var("REFRESH_DAILY_INTERVAL_SECS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .expect("REFRESH_DAILY_INTERVAL_SECS must be a valid u64"),
                weekly_interval_secs: env::var("REFRESH_WEEKLY_INTERVAL_SECS")
                    .unwrap_or_else(|_| "604800".to_string())
                    .parse()
                    .expect("REFRESH_WEEKLY_INTERVAL_SECS must be a valid u64"),
                worker_pool_size: env::var("REFRESH_WORKER_POOL_SIZE")
                    .unwrap_or_else(|_| "0".to_string())
                    .parse()
                    .expect("REFRESH_WORKER_POOL_SIZE must be a valid usize"),
                profile_prune_days: env::var("PROFILE_PRUNE_DAYS")
                    .unwrap_or_else(|_| "90".to_string())
                    .parse()
                    .expect("PROFILE_PRUNE_DAYS must be a valid i64"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_fallback() {
        let config = RefreshConfig {
            daily_interval_secs: 86400,
            weekly_interval_secs: 604800,
            worker_pool_size: 0,
            profile_prune_days: 90,
        };
        assert!(config.concurrency() >= 1);

        let pinned = RefreshConfig {
            worker_pool_size: 3,
            ..config
        };
        assert_eq!(pinned.concurrency(), 3);
    }
}
