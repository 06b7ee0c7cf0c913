use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vector_engine::jobs::refresh::DailyRefreshJob;
use vector_engine::jobs::weekly::WeeklyMaintenanceJob;
use vector_engine::jobs::{init, EngineContext};
use vector_engine::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env()?;

    info!("Starting vector-engine");

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    let ctx = Arc::new(EngineContext::new(pool.clone()));

    // Idempotent schema setup + bulk backfill before any scheduled work.
    init::initialize(&ctx, &pool).await?;

    let daily = DailyRefreshJob::new(Arc::clone(&ctx), config.refresh.clone());
    let weekly = WeeklyMaintenanceJob::new(Arc::clone(&ctx), config.refresh.clone());

    tokio::spawn(async move { daily.run().await });
    tokio::spawn(async move { weekly.run().await });

    info!("Refresh schedulers running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down vector-engine");

    Ok(())
}
