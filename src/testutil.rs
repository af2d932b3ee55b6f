//! Shared helpers for database-backed tests. These tests are gated on
//! `TEST_DATABASE_URL`; without it each test returns early and only the
//! pure-logic suites run.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::{
    clients::{
        IdentityDirectory, ListingService, ListingSummary, Profile, WebhookNotifier,
    },
    error::AppResult,
    models::{Conversation, ParticipantRole},
    services::events::EventBus,
    storage::redis::RedisClient,
};

pub async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .ok()?;
    sqlx::migrate!("./migrations").run(&pool).await.ok()?;
    Some(pool)
}

/// Event bus against a local Redis URL. Publish failures are logged and
/// swallowed by the bus, so tests pass whether or not a broker is listening.
pub fn test_events() -> EventBus {
    let redis = RedisClient::new("redis://127.0.0.1:6379/0").expect("redis url");
    EventBus::new(redis, Arc::new(WebhookNotifier::new(None)))
}

pub struct FixedIdentity;

#[async_trait]
impl IdentityDirectory for FixedIdentity {
    async fn get_profile(&self, _participant_id: Uuid) -> AppResult<Profile> {
        Ok(Profile {
            display_name: "Taylor".to_string(),
            avatar_url: None,
        })
    }
}

pub struct FixedListings;

#[async_trait]
impl ListingService for FixedListings {
    async fn get_listing_summary(&self, _listing_id: Uuid) -> AppResult<ListingSummary> {
        Ok(ListingSummary {
            title: "2014 Subaru Outback".to_string(),
            year: Some(2014),
            make: Some("Subaru".to_string()),
            model: Some("Outback".to_string()),
            primary_image_url: None,
            price: 180_000,
        })
    }
}

pub fn static_clients() -> (Arc<dyn IdentityDirectory>, Arc<dyn ListingService>) {
    (Arc::new(FixedIdentity), Arc::new(FixedListings))
}

/// Insert a conversation with both participant rows, bypassing the service
/// layer, for tests that start from an established thread.
pub async fn seed_conversation(pool: &PgPool, buyer_id: Uuid, seller_id: Uuid) -> Conversation {
    let conversation: Conversation = sqlx::query_as(
        r#"
        INSERT INTO conversations (id, listing_id, buyer_id, seller_id)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(Uuid::new_v4())
    .bind(buyer_id)
    .bind(seller_id)
    .fetch_one(pool)
    .await
    .expect("insert conversation");

    for (participant_id, role) in [
        (buyer_id, ParticipantRole::Buyer),
        (seller_id, ParticipantRole::Seller),
    ] {
        sqlx::query(
            r#"
            INSERT INTO participants (id, conversation_id, participant_id, role)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(conversation.id)
        .bind(participant_id)
        .bind(role)
        .execute(pool)
        .await
        .expect("insert participant");
    }

    conversation
}
