use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Offer, OfferDecision},
    services::offers::OfferService,
    AppState,
};

use super::super::middleware::{get_participant_id, Claims};

#[derive(Debug, Deserialize)]
pub struct CreateOfferRequest {
    pub amount: i64,
}

pub async fn create_offer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<CreateOfferRequest>,
) -> AppResult<Json<Offer>> {
    let participant_id = get_participant_id(&claims)?;

    let service = OfferService::new(state.db, state.events);
    let offer = service
        .create_offer(conversation_id, participant_id, req.amount)
        .await?;

    Ok(Json(offer))
}

#[derive(Debug, Deserialize)]
pub struct CounterOfferRequest {
    pub amount: i64,
}

pub async fn counter_offer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(offer_id): Path<Uuid>,
    Json(req): Json<CounterOfferRequest>,
) -> AppResult<Json<Offer>> {
    let participant_id = get_participant_id(&claims)?;

    let service = OfferService::new(state.db, state.events);
    let offer = service
        .counter_offer(offer_id, participant_id, req.amount)
        .await?;

    Ok(Json(offer))
}

#[derive(Debug, Deserialize)]
pub struct RespondToOfferRequest {
    pub decision: OfferDecision,
}

pub async fn respond_to_offer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(offer_id): Path<Uuid>,
    Json(req): Json<RespondToOfferRequest>,
) -> AppResult<Json<Offer>> {
    let participant_id = get_participant_id(&claims)?;

    let service = OfferService::new(state.db, state.events);
    let offer = service
        .respond_to_offer(offer_id, participant_id, req.decision)
        .await?;

    Ok(Json(offer))
}

pub async fn cancel_offer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(offer_id): Path<Uuid>,
) -> AppResult<Json<Offer>> {
    let participant_id = get_participant_id(&claims)?;

    let service = OfferService::new(state.db, state.events);
    let offer = service.cancel_offer(offer_id, participant_id).await?;

    Ok(Json(offer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respond_request_parses_decisions() {
        let req: RespondToOfferRequest =
            serde_json::from_str(r#"{"decision": "accept"}"#).unwrap();
        assert_eq!(req.decision, OfferDecision::Accept);

        let req: RespondToOfferRequest =
            serde_json::from_str(r#"{"decision": "decline"}"#).unwrap();
        assert_eq!(req.decision, OfferDecision::Decline);
    }

    #[test]
    fn respond_request_rejects_unknown_decision() {
        assert!(serde_json::from_str::<RespondToOfferRequest>(r#"{"decision": "maybe"}"#).is_err());
    }
}
