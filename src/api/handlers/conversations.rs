use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Conversation, ConversationSummary, FeedCursor, FeedDirection, FeedPage},
    services::{conversations::ConversationService, feed::FeedService},
    AppState,
};

use super::super::middleware::{get_participant_id, Claims};

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<ConversationSummary>>> {
    let participant_id = get_participant_id(&claims)?;

    let service = ConversationService::new(
        state.db,
        state.events,
        state.identity,
        state.listings,
    );
    let summaries = service.list_for_participant(participant_id).await?;

    Ok(Json(summaries))
}

#[derive(Debug, Deserialize)]
pub struct StartConversationRequest {
    pub listing_id: Uuid,
    pub owner_id: Uuid,
    pub message: String,
}

pub async fn start_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartConversationRequest>,
) -> AppResult<Json<Conversation>> {
    let participant_id = get_participant_id(&claims)?;

    let service = ConversationService::new(
        state.db,
        state.events,
        state.identity,
        state.listings,
    );
    let conversation = service
        .start_conversation(req.listing_id, participant_id, req.owner_id, &req.message)
        .await?;

    Ok(Json(conversation))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub message: String,
}

pub async fn hide_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<StatusResponse>> {
    let participant_id = get_participant_id(&claims)?;

    let service = ConversationService::new(
        state.db,
        state.events,
        state.identity,
        state.listings,
    );
    service
        .hide_for_participant(conversation_id, participant_id)
        .await?;

    Ok(Json(StatusResponse {
        message: "Conversation removed".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub direction: FeedDirection,
}

pub async fn get_feed(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<FeedPage>> {
    let participant_id = get_participant_id(&claims)?;

    let cursor = match &query.cursor {
        Some(token) => Some(
            FeedCursor::decode(token)
                .ok_or_else(|| AppError::BadRequest("Malformed feed cursor".to_string()))?,
        ),
        None => None,
    };

    let limit = query
        .limit
        .unwrap_or(state.config.feed.default_page_size)
        .clamp(1, state.config.feed.max_page_size);

    let service = FeedService::new(state.db);
    let page = service
        .get_feed(conversation_id, participant_id, cursor, limit, query.direction)
        .await?;

    Ok(Json(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_request_deserializes() {
        let req: StartConversationRequest = serde_json::from_str(
            r#"{
                "listing_id": "7f0e1d5e-23c4-44a0-9b1a-111111111111",
                "owner_id": "7f0e1d5e-23c4-44a0-9b1a-222222222222",
                "message": "Is this still available?"
            }"#,
        )
        .unwrap();
        assert_eq!(req.message, "Is this still available?");
    }

    #[test]
    fn feed_query_defaults_to_newest() {
        let query: FeedQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.direction, FeedDirection::Newest);
        assert!(query.cursor.is_none());
        assert!(query.limit.is_none());
    }
}
