use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    AppState,
};

/// Bearer-token claims minted by the identity directory. We only verify and
/// read the participant id; account management lives elsewhere.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // participant_id
    pub exp: i64,    // expiry
    pub iat: i64,    // issued at
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let key = DecodingKey::from_secret(state.config.auth.jwt_secret.as_bytes());
    let token_data = decode::<Claims>(token, &key, &Validation::default())?;

    request.extensions_mut().insert(token_data.claims);

    Ok(next.run(request).await)
}

/// Extract the participant id from validated claims.
pub fn get_participant_id(claims: &Claims) -> AppResult<Uuid> {
    Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)
}
