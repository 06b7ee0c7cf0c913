use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use vector_engine::jobs::{init, EngineContext};
use vector_engine::services::{
    HttpRankingClient, Recommender, SimilarityRanker, SqlRecommendationStore, VectorSpace,
};
use vector_engine::Config;

/// End-to-end smoke test against a live Postgres with the pgvector extension.
/// Skips cleanly when no database is reachable, so the suite stays green in
/// environments without infrastructure.
#[tokio::test]
async fn test_engine_initialization_and_fallback_wiring() {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            println!("DATABASE_URL not set, skipping integration test");
            return;
        }
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            println!("Database not available ({}), skipping integration test", e);
            return;
        }
    };

    let ctx = Arc::new(EngineContext::new(pool.clone()));

    // Schema setup must be idempotent: running it twice is the actual test.
    init::ensure_schema(&pool).await.expect("schema setup failed");
    init::ensure_schema(&pool)
        .await
        .expect("schema setup is not idempotent");

    // Wire the full fallback cascade the way main does.
    let config = Config::from_env().expect("config load failed");
    let ranking =
        Arc::new(HttpRankingClient::new(&config.ranking).expect("ranking client build failed"));
    let ranker = Arc::new(SimilarityRanker::new(
        ctx.vectors.clone(),
        ctx.posts.clone(),
        ctx.interactions.clone(),
    ));
    let store = Arc::new(SqlRecommendationStore::new(
        ctx.users.clone(),
        ctx.posts.clone(),
        ctx.vectors.clone(),
    ));
    let recommender = Recommender::new(ranking, ranker, store);

    // An unknown user must surface as NotFound, never as an empty page.
    match recommender.recommend(i64::MAX, None, 0, 10).await {
        Err(vector_engine::AppError::NotFound(_)) => {}
        Err(e) => println!("Collaborator tables missing ({}), skipping assertion", e),
        Ok(_) => panic!("recommendation for unknown user should be NotFound"),
    }

    // Excluded ids must never come back from a nearest-neighbor query, no
    // matter how close their vectors are.
    let query = {
        let mut v = vec![0.0f32; 64];
        v[0] = 1.0;
        v
    };
    for id in [900_005i64, 900_007, 900_009] {
        let mut v = query.clone();
        v[1] = (id % 100) as f32 / 100.0;
        ctx.vectors
            .put(VectorSpace::Post, id, v)
            .await
            .expect("post vector upsert failed");
    }
    let neighbors = ctx
        .vectors
        .nearest_neighbors(VectorSpace::Post, &query, 10, &[900_005, 900_009])
        .await
        .expect("nearest neighbor query failed");
    assert!(!neighbors.contains(&900_005));
    assert!(!neighbors.contains(&900_009));
    assert!(neighbors.contains(&900_007));

    // Partial metadata writes must not clobber siblings: a stored comment
    // survives both a click-aggregate fold and a payload merge.
    let user_id = 910_001i64;
    ctx.metadata
        .store_user_metadata(user_id, Some("a"), None)
        .await
        .expect("metadata upsert failed");
    ctx.metadata
        .record_info_button_click(user_id, 900_007)
        .await
        .expect("click recording failed");
    ctx.metadata
        .merge_user_payload(user_id, &json!({"prefs": {"x": 1}}))
        .await
        .expect("payload merge failed");

    let meta = ctx
        .metadata
        .get_user_metadata(user_id)
        .await
        .expect("metadata read failed")
        .expect("metadata row missing");
    assert_eq!(meta.comment.as_deref(), Some("a"));
    assert!(meta.payload.get("info_clicks").is_some());
    assert_eq!(meta.payload["prefs"]["x"], json!(1));
}
