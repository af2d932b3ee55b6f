use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

/// Fire-and-forget alerting of the other participant. Delivery failures are
/// logged and swallowed; they must never fail the write that produced them.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, participant_id: Uuid, event_kind: &str, payload: serde_json::Value);
}

/// POSTs notification events to a configured webhook. When no webhook is
/// configured the dispatcher is a no-op.
#[derive(Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    webhook_url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotifier {
    async fn notify(&self, participant_id: Uuid, event_kind: &str, payload: serde_json::Value) {
        let Some(url) = &self.webhook_url else {
            return;
        };

        let body = json!({
            "participant_id": participant_id,
            "event_kind": event_kind,
            "payload": payload,
        });

        if let Err(e) = self.http.post(url).json(&body).send().await {
            tracing::warn!("Notification delivery failed for {}: {}", participant_id, e);
        }
    }
}
