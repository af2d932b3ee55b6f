use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    clients::NotificationDispatcher, models::FeedEntry, storage::redis::RedisClient,
};

/// Feed-relevant events emitted after a committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEventKind {
    MessageSent,
    OfferCreated,
    OfferCountered,
    OfferAccepted,
    OfferDeclined,
    OfferCancelled,
}

impl FeedEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedEventKind::MessageSent => "message_sent",
            FeedEventKind::OfferCreated => "offer_created",
            FeedEventKind::OfferCountered => "offer_countered",
            FeedEventKind::OfferAccepted => "offer_accepted",
            FeedEventKind::OfferDeclined => "offer_declined",
            FeedEventKind::OfferCancelled => "offer_cancelled",
        }
    }
}

/// Wire envelope for events pushed to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// Fans a committed feed entry out to the counterparty: once over their
/// Redis channel for live sockets, once to the notification dispatcher.
/// Both legs are fire-and-forget; the originating write has already
/// succeeded and must not be failed retroactively.
#[derive(Clone)]
pub struct EventBus {
    redis: RedisClient,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl EventBus {
    pub fn new(redis: RedisClient, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self { redis, notifier }
    }

    pub async fn emit(&self, recipient_id: Uuid, kind: FeedEventKind, entry: &FeedEntry) {
        let payload = match serde_json::to_value(entry) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Failed to serialize feed event: {}", e);
                return;
            }
        };

        let envelope = FeedEventEnvelope {
            event_type: kind.as_str().to_string(),
            payload: payload.clone(),
        };

        match serde_json::to_string(&envelope) {
            Ok(wire) => {
                if let Err(e) = self.redis.publish_event(&recipient_id.to_string(), &wire).await {
                    tracing::warn!("Feed event publish failed for {}: {}", recipient_id, e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize event envelope: {}", e),
        }

        let notifier = self.notifier.clone();
        let kind_str = kind.as_str();
        tokio::spawn(async move {
            notifier.notify(recipient_id, kind_str, payload).await;
        });
    }
}
