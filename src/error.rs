use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    // Auth errors
    #[error("Invalid token")]
    InvalidToken,
    #[error("Unauthorized")]
    Unauthorized,

    // Conversation errors
    #[error("Conversation not found")]
    ConversationNotFound,
    #[error("You cannot start a conversation with yourself")]
    InvalidParticipants,
    #[error("Not a participant")]
    NotParticipant,

    // Message errors
    #[error("Message content cannot be empty")]
    EmptyContent,

    // Offer errors
    #[error("Offer not found")]
    OfferNotFound,
    #[error("Offer amount must be positive")]
    InvalidAmount,
    #[error("You can only respond to offers sent to you")]
    NotRecipient,
    #[error("Only the sender may withdraw an offer")]
    NotSender,
    #[error("This conversation already has an open offer")]
    ConflictingActiveOffer,
    #[error("This offer was already responded to")]
    OfferNotPending,
    #[error("Negotiation has concluded for this conversation")]
    NegotiationConcluded,

    // Validation errors
    #[error("Bad request: {0}")]
    BadRequest(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Redis errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    // JWT errors
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    // Internal errors
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            // 400 Bad Request
            AppError::InvalidParticipants => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::EmptyContent => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::InvalidAmount => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),

            // 401 Unauthorized
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Jwt(_) => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),

            // 403 Forbidden
            AppError::NotParticipant => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::NotRecipient => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::NotSender => (StatusCode::FORBIDDEN, self.to_string()),

            // 404 Not Found
            AppError::ConversationNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::OfferNotFound => (StatusCode::NOT_FOUND, self.to_string()),

            // 409 Conflict — benign negotiation races; clients re-fetch the feed
            AppError::ConflictingActiveOffer => (StatusCode::CONFLICT, self.to_string()),
            AppError::OfferNotPending => (StatusCode::CONFLICT, self.to_string()),
            AppError::NegotiationConcluded => (StatusCode::CONFLICT, self.to_string()),

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage unavailable".to_string(),
                )
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error".to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// True when a sqlx error is a Postgres unique violation on the named
/// constraint, used to map insert races onto domain conflicts.
pub fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("23505")
                && db.constraint().map_or(true, |c| c == constraint)
        }
        _ => false,
    }
}
