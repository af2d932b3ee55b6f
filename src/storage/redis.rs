use redis::{AsyncCommands, Client};

use crate::error::AppResult;

/// Pub/sub fan-out for feed events. Each participant has one channel;
/// publishing there reaches every server instance with an open socket for
/// that participant. Connections are established per call, so constructing
/// the client does not require the broker to be up.
#[derive(Clone)]
pub struct RedisClient {
    client: Client,
}

impl RedisClient {
    pub fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)?;
        Ok(Self { client })
    }

    pub async fn publish_event(&self, participant_id: &str, payload: &str) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = format!("feed:{}", participant_id);
        conn.publish::<_, _, ()>(&channel, payload).await?;
        Ok(())
    }

    pub async fn subscribe_events(&self, participant_id: &str) -> AppResult<redis::aio::PubSub> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = format!("feed:{}", participant_id);
        pubsub.subscribe(&channel).await?;
        Ok(pubsub)
    }
}
