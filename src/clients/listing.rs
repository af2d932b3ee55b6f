use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSummary {
    pub title: String,
    pub year: Option<i32>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub primary_image_url: Option<String>,
    pub price: i64,
}

#[async_trait]
pub trait ListingService: Send + Sync {
    async fn get_listing_summary(&self, listing_id: Uuid) -> AppResult<ListingSummary>;
}

#[derive(Clone)]
pub struct ListingClient {
    http: reqwest::Client,
    base_url: String,
}

impl ListingClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ListingService for ListingClient {
    async fn get_listing_summary(&self, listing_id: Uuid) -> AppResult<ListingSummary> {
        let url = format!("{}/listings/{}/summary", self.base_url, listing_id);
        let summary = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(anyhow::Error::from)?
            .error_for_status()
            .map_err(anyhow::Error::from)?
            .json::<ListingSummary>()
            .await
            .map_err(anyhow::Error::from)?;
        Ok(summary)
    }
}
