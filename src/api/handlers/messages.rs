use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::AppResult, models::Message, services::messages::MessageService, AppState,
};

use super::super::middleware::{get_participant_id, Claims};
use super::conversations::StatusResponse;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<Json<Message>> {
    let participant_id = get_participant_id(&claims)?;

    let service = MessageService::new(state.db, state.events);
    let message = service
        .send_message(conversation_id, participant_id, &req.body)
        .await?;

    Ok(Json(message))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub upto_seq: i64,
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<MarkReadRequest>,
) -> AppResult<Json<StatusResponse>> {
    let participant_id = get_participant_id(&claims)?;

    let service = MessageService::new(state.db, state.events);
    service
        .mark_read(conversation_id, participant_id, req.upto_seq)
        .await?;

    Ok(Json(StatusResponse {
        message: "Marked as read".to_string(),
    }))
}
