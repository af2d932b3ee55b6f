use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// The identity directory owns user accounts; we only resolve display
/// profiles from it. Callers treat a failed lookup as "profile unavailable",
/// never as a failure of the originating request.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn get_profile(&self, participant_id: Uuid) -> AppResult<Profile>;
}

#[derive(Clone)]
pub struct IdentityClient {
    http: reqwest::Client,
    base_url: String,
}

impl IdentityClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl IdentityDirectory for IdentityClient {
    async fn get_profile(&self, participant_id: Uuid) -> AppResult<Profile> {
        let url = format!("{}/profiles/{}", self.base_url, participant_id);
        let profile = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(anyhow::Error::from)?
            .error_for_status()
            .map_err(anyhow::Error::from)?
            .json::<Profile>()
            .await
            .map_err(anyhow::Error::from)?;
        Ok(profile)
    }
}
