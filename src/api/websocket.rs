use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    Extension,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::{
    services::{events::FeedEventEnvelope, feed::FeedService, messages::MessageService},
    AppState,
};

use super::middleware::{get_participant_id, Claims};

/// Client-to-server frames on the feed socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsIncomingMessage {
    /// Start (or resume) streaming a conversation's feed. Entries with
    /// `seq > resume_after_seq` are replayed first, so nothing is lost
    /// across a reconnect.
    Subscribe {
        conversation_id: Uuid,
        #[serde(default)]
        resume_after_seq: i64,
    },
    MarkRead {
        conversation_id: Uuid,
        upto_seq: i64,
    },
    Ping,
}

/// Registry of open sockets on this instance. Cross-instance delivery rides
/// the per-participant Redis channels; the hub only routes to local
/// connections.
pub struct WsHub {
    clients: RwLock<HashMap<String, mpsc::Sender<FeedEventEnvelope>>>,
}

impl WsHub {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, client_id: &str, sender: mpsc::Sender<FeedEventEnvelope>) {
        let mut clients = self.clients.write().await;
        clients.insert(client_id.to_string(), sender);
        tracing::info!("Client registered: {}", client_id);
    }

    pub async fn unregister(&self, client_id: &str) {
        let mut clients = self.clients.write().await;
        clients.remove(client_id);
        tracing::info!("Client unregistered: {}", client_id);
    }

    /// Deliver to every local connection held by this participant.
    pub async fn send_to_participant(&self, participant_id: &str, message: FeedEventEnvelope) {
        let clients = self.clients.read().await;
        for (client_id, sender) in clients.iter() {
            if client_id.starts_with(&format!("{}:", participant_id)) {
                let _ = sender.send(message.clone()).await;
            }
        }
    }
}

impl Default for WsHub {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let participant_id = get_participant_id(&claims).unwrap_or_default();

    ws.on_upgrade(move |socket| handle_socket(socket, state, participant_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, participant_id: Uuid) {
    let client_id = format!("{}:{}", participant_id, Uuid::new_v4());
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<FeedEventEnvelope>(256);

    state.ws_hub.register(&client_id, tx.clone()).await;

    // Forward events published on this participant's Redis channel.
    let redis_client = state.redis.clone();
    let participant_str = participant_id.to_string();
    let tx_clone = tx.clone();

    let redis_task = tokio::spawn(async move {
        if let Ok(mut pubsub) = redis_client.subscribe_events(&participant_str).await {
            while let Some(msg) = pubsub.on_message().next().await {
                if let Ok(payload) = msg.get_payload::<String>() {
                    if let Ok(envelope) = serde_json::from_str::<FeedEventEnvelope>(&payload) {
                        let _ = tx_clone.send(envelope).await;
                    }
                }
            }
        }
    });

    // Drain the channel into the socket.
    let send_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&envelope) {
                if ws_sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Handle frames from the client.
    let recv_state = state.clone();
    let recv_tx = tx.clone();

    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    if let Ok(msg) = serde_json::from_str::<WsIncomingMessage>(&text) {
                        handle_incoming_message(&recv_state, participant_id, &recv_tx, msg).await;
                    }
                }
                Ok(Message::Ping(_)) => {}
                Ok(Message::Close(_)) => break,
                Err(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
        _ = redis_task => {},
    }

    state.ws_hub.unregister(&client_id).await;
}

async fn handle_incoming_message(
    state: &AppState,
    participant_id: Uuid,
    tx: &mpsc::Sender<FeedEventEnvelope>,
    msg: WsIncomingMessage,
) {
    match msg {
        WsIncomingMessage::Subscribe {
            conversation_id,
            resume_after_seq,
        } => {
            let feed = FeedService::new(state.db.clone());
            match feed
                .entries_after(conversation_id, participant_id, resume_after_seq)
                .await
            {
                Ok(entries) => {
                    for entry in entries {
                        if let Ok(payload) = serde_json::to_value(&entry) {
                            let _ = tx
                                .send(FeedEventEnvelope {
                                    event_type: "replay".to_string(),
                                    payload,
                                })
                                .await;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Feed replay failed for {} in {}: {}",
                        participant_id,
                        conversation_id,
                        e
                    );
                }
            }
        }
        WsIncomingMessage::MarkRead {
            conversation_id,
            upto_seq,
        } => {
            let service = MessageService::new(state.db.clone(), state.events.clone());
            if let Err(e) = service
                .mark_read(conversation_id, participant_id, upto_seq)
                .await
            {
                tracing::debug!("mark_read over ws failed for {}: {}", participant_id, e);
            }
        }
        WsIncomingMessage::Ping => {
            let _ = tx
                .send(FeedEventEnvelope {
                    event_type: "pong".to_string(),
                    payload: serde_json::json!({}),
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_parses_with_default_resume() {
        let msg: WsIncomingMessage = serde_json::from_str(
            r#"{"type": "subscribe", "conversation_id": "7f0e1d5e-23c4-44a0-9b1a-333333333333"}"#,
        )
        .unwrap();
        match msg {
            WsIncomingMessage::Subscribe {
                resume_after_seq, ..
            } => assert_eq!(resume_after_seq, 0),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn mark_read_frame_parses() {
        let msg: WsIncomingMessage = serde_json::from_str(
            r#"{"type": "mark_read", "conversation_id": "7f0e1d5e-23c4-44a0-9b1a-333333333333", "upto_seq": 17}"#,
        )
        .unwrap();
        match msg {
            WsIncomingMessage::MarkRead { upto_seq, .. } => assert_eq!(upto_seq, 17),
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
