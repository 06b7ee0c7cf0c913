// External ranking service client.
//
// The orchestrator tries this collaborator first; an empty id list or any
// transport failure (including timeout) routes the request to the similarity
// fallback. Upstream trouble is therefore never a user-facing error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::RankingServiceConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct RankingRequest {
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingResponse {
    pub post_ids: Vec<i64>,
}

#[async_trait]
pub trait RankingClient: Send + Sync {
    /// Ranked post ids for this request, best first. Empty means "no answer".
    async fn rank(&self, request: &RankingRequest) -> Result<Vec<i64>>;
}

pub struct HttpRankingClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRankingClient {
    pub fn new(config: &RankingServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Configuration(format!("ranking client build failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RankingClient for HttpRankingClient {
    async fn rank(&self, request: &RankingRequest) -> Result<Vec<i64>> {
        let url = format!("{}/rank", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        let body: RankingResponse = response.json().await?;

        debug!(
            user_id = request.user_id,
            results = body.post_ids.len(),
            "Ranking service responded"
        );

        Ok(body.post_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_omits_absent_content_type() {
        let request = RankingRequest {
            user_id: 7,
            content_type: None,
            page: 0,
            page_size: 20,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("content_type").is_none());
        assert_eq!(body["user_id"], 7);

        let typed = RankingRequest {
            content_type: Some("movie".to_string()),
            ..request
        };
        let body = serde_json::to_value(&typed).unwrap();
        assert_eq!(body["content_type"], "movie");
    }
}
