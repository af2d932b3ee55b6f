use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{is_unique_violation, AppError, AppResult},
    models::{Conversation, FeedEntry, Offer, OfferDecision, OfferStatus},
    services::events::{EventBus, FeedEventKind},
};

/// The negotiation state machine. Every transition out of `pending` runs as
/// a conditional update (`... WHERE id = $1 AND status = 'pending'`), so two
/// concurrent actors racing on the same offer cannot both succeed: the loser
/// sees zero rows updated and gets `OfferNotPending`.
pub struct OfferService {
    db: PgPool,
    events: EventBus,
}

impl OfferService {
    pub fn new(db: PgPool, events: EventBus) -> Self {
        Self { db, events }
    }

    async fn load_conversation(&self, conversation_id: Uuid) -> AppResult<Conversation> {
        sqlx::query_as("SELECT * FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::ConversationNotFound)
    }

    async fn load_offer(&self, offer_id: Uuid) -> AppResult<Offer> {
        sqlx::query_as("SELECT * FROM offers WHERE id = $1")
            .bind(offer_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::OfferNotFound)
    }

    /// Open a new offer. Only valid when the conversation has no pending
    /// offer and negotiation has not concluded; the partial unique index on
    /// pending offers backstops the pre-check against insert races.
    pub async fn create_offer(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        amount: i64,
    ) -> AppResult<Offer> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount);
        }

        let conversation = self.load_conversation(conversation_id).await?;
        let recipient_id = conversation
            .counterparty_of(sender_id)
            .ok_or(AppError::NotParticipant)?;
        if conversation.is_concluded() {
            return Err(AppError::NegotiationConcluded);
        }

        let has_pending: Option<(i64,)> = sqlx::query_as(
            "SELECT 1::BIGINT FROM offers WHERE conversation_id = $1 AND status = 'pending'",
        )
        .bind(conversation_id)
        .fetch_optional(&self.db)
        .await?;

        if has_pending.is_some() {
            return Err(AppError::ConflictingActiveOffer);
        }

        let offer: Offer = sqlx::query_as(
            r#"
            INSERT INTO offers (id, conversation_id, sender_id, recipient_id, amount, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender_id)
        .bind(recipient_id)
        .bind(amount)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "offers_one_pending") {
                AppError::ConflictingActiveOffer
            } else {
                AppError::Database(e)
            }
        })?;

        self.touch_conversation(conversation_id, recipient_id).await;

        self.events
            .emit(
                recipient_id,
                FeedEventKind::OfferCreated,
                &FeedEntry::Offer(offer.clone()),
            )
            .await;

        Ok(offer)
    }

    /// Counter a pending offer: atomically retire the original to
    /// `countered` and open a successor with sender and recipient swapped.
    pub async fn counter_offer(
        &self,
        offer_id: Uuid,
        counterparty_id: Uuid,
        amount: i64,
    ) -> AppResult<Offer> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount);
        }

        let original = self.load_offer(offer_id).await?;
        if original.recipient_id != counterparty_id {
            return Err(AppError::NotRecipient);
        }

        let conversation = self.load_conversation(original.conversation_id).await?;
        if conversation.is_concluded() {
            return Err(AppError::NegotiationConcluded);
        }

        let mut tx = self.db.begin().await?;

        let retired = sqlx::query(
            "UPDATE offers SET status = 'countered' WHERE id = $1 AND status = 'pending'",
        )
        .bind(offer_id)
        .execute(&mut *tx)
        .await?;

        if retired.rows_affected() == 0 {
            return Err(AppError::OfferNotPending);
        }

        let counter: Offer = sqlx::query_as(
            r#"
            INSERT INTO offers (id, conversation_id, sender_id, recipient_id, amount, status, supersedes_id)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(original.conversation_id)
        .bind(counterparty_id)
        .bind(original.sender_id)
        .bind(amount)
        .bind(offer_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.touch_conversation(original.conversation_id, original.sender_id)
            .await;

        self.events
            .emit(
                original.sender_id,
                FeedEventKind::OfferCountered,
                &FeedEntry::Offer(counter.clone()),
            )
            .await;

        Ok(counter)
    }

    /// Accept or decline a pending offer. Acceptance concludes negotiation
    /// for the whole conversation in the same transaction; decline simply
    /// leaves no active offer, so either party may open a fresh one.
    pub async fn respond_to_offer(
        &self,
        offer_id: Uuid,
        responder_id: Uuid,
        decision: OfferDecision,
    ) -> AppResult<Offer> {
        let offer = self.load_offer(offer_id).await?;
        if offer.recipient_id != responder_id {
            return Err(AppError::NotRecipient);
        }

        let conversation = self.load_conversation(offer.conversation_id).await?;
        if conversation.is_concluded() {
            return Err(AppError::NegotiationConcluded);
        }

        let status = decision.resulting_status();

        let mut tx = self.db.begin().await?;

        let updated: Option<Offer> = sqlx::query_as(
            "UPDATE offers SET status = $2 WHERE id = $1 AND status = 'pending' RETURNING *",
        )
        .bind(offer_id)
        .bind(status)
        .fetch_optional(&mut *tx)
        .await?;

        let updated = updated.ok_or(AppError::OfferNotPending)?;

        if status == OfferStatus::Accepted {
            sqlx::query("UPDATE conversations SET concluded_at = NOW() WHERE id = $1")
                .bind(offer.conversation_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.touch_conversation(offer.conversation_id, offer.sender_id)
            .await;

        let kind = match decision {
            OfferDecision::Accept => FeedEventKind::OfferAccepted,
            OfferDecision::Decline => FeedEventKind::OfferDeclined,
        };

        self.events
            .emit(offer.sender_id, kind, &FeedEntry::Offer(updated.clone()))
            .await;

        Ok(updated)
    }

    /// Withdraw a pending offer. Only its sender may do this.
    pub async fn cancel_offer(&self, offer_id: Uuid, sender_id: Uuid) -> AppResult<Offer> {
        let offer = self.load_offer(offer_id).await?;
        if offer.sender_id != sender_id {
            return Err(AppError::NotSender);
        }

        let updated: Option<Offer> = sqlx::query_as(
            "UPDATE offers SET status = 'cancelled' WHERE id = $1 AND status = 'pending' RETURNING *",
        )
        .bind(offer_id)
        .fetch_optional(&self.db)
        .await?;

        let updated = updated.ok_or(AppError::OfferNotPending)?;

        self.touch_conversation(offer.conversation_id, offer.recipient_id)
            .await;

        self.events
            .emit(
                offer.recipient_id,
                FeedEventKind::OfferCancelled,
                &FeedEntry::Offer(updated.clone()),
            )
            .await;

        Ok(updated)
    }

    /// Offer activity bumps the conversation and restores the counterparty's
    /// hidden view, same as messages. Runs after the transition has
    /// committed, so failures here are logged, not propagated.
    async fn touch_conversation(&self, conversation_id: Uuid, counterparty_id: Uuid) {
        let bump = sqlx::query("UPDATE conversations SET last_activity_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&self.db)
            .await;
        if let Err(e) = bump {
            tracing::warn!("Activity bump failed for {}: {}", conversation_id, e);
        }

        let unhide = sqlx::query(
            "UPDATE participants SET hidden_at = NULL WHERE conversation_id = $1 AND participant_id = $2",
        )
        .bind(conversation_id)
        .bind(counterparty_id)
        .execute(&self.db)
        .await;
        if let Err(e) = unhide {
            tracing::warn!("Unhide failed for {}: {}", conversation_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_conversation, test_events, test_pool};

    #[tokio::test]
    async fn second_pending_offer_is_a_conflict() {
        let Some(pool) = test_pool().await else { return };
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let conv = seed_conversation(&pool, buyer, seller).await;
        let service = OfferService::new(pool.clone(), test_events());

        service.create_offer(conv.id, buyer, 150_000).await.unwrap();
        let err = service
            .create_offer(conv.id, buyer, 160_000)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConflictingActiveOffer), "{err:?}");

        let pending: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM offers WHERE conversation_id = $1 AND status = 'pending'",
        )
        .bind(conv.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(pending.0, 1);
    }

    #[tokio::test]
    async fn pending_unique_index_rejects_a_second_insert() {
        let Some(pool) = test_pool().await else { return };
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let conv = seed_conversation(&pool, buyer, seller).await;

        // Straight to the table, skipping the service pre-check: the
        // partial unique index is the last line of defense.
        let insert = |amount: i64| {
            sqlx::query(
                r#"
                INSERT INTO offers (id, conversation_id, sender_id, recipient_id, amount, status)
                VALUES ($1, $2, $3, $4, $5, 'pending')
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(conv.id)
            .bind(buyer)
            .bind(seller)
            .bind(amount)
        };

        insert(150_000).execute(&pool).await.unwrap();
        let err = insert(160_000).execute(&pool).await.unwrap_err();
        assert!(is_unique_violation(&err, "offers_one_pending"), "{err:?}");
    }

    #[tokio::test]
    async fn accept_and_counter_race_has_exactly_one_winner() {
        let Some(pool) = test_pool().await else { return };
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let conv = seed_conversation(&pool, buyer, seller).await;
        let service = OfferService::new(pool.clone(), test_events());

        let offer = service.create_offer(conv.id, buyer, 150_000).await.unwrap();

        let (accepted, countered) = tokio::join!(
            service.respond_to_offer(offer.id, seller, OfferDecision::Accept),
            service.counter_offer(offer.id, seller, 165_000),
        );

        assert!(
            accepted.is_ok() != countered.is_ok(),
            "exactly one of the racing calls may win: {accepted:?} / {countered:?}"
        );
        // The loser sees the offer already resolved, either at the
        // conditional update or, when the accept landed first, at the
        // concluded-conversation gate.
        let loser = if accepted.is_ok() {
            countered.unwrap_err()
        } else {
            accepted.unwrap_err()
        };
        assert!(
            matches!(
                loser,
                AppError::OfferNotPending | AppError::NegotiationConcluded
            ),
            "{loser:?}"
        );

        let pending: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM offers WHERE conversation_id = $1 AND status = 'pending'",
        )
        .bind(conv.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(pending.0 <= 1);
    }

    #[tokio::test]
    async fn decline_reopens_the_conversation_for_fresh_offers() {
        let Some(pool) = test_pool().await else { return };
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let conv = seed_conversation(&pool, buyer, seller).await;
        let service = OfferService::new(pool.clone(), test_events());

        let offer = service.create_offer(conv.id, buyer, 150_000).await.unwrap();
        let declined = service
            .respond_to_offer(offer.id, seller, OfferDecision::Decline)
            .await
            .unwrap();
        assert_eq!(declined.status, OfferStatus::Declined);

        // Either party may open a new offer after a decline.
        let reoffer = service.create_offer(conv.id, seller, 140_000).await.unwrap();
        assert_eq!(reoffer.status, OfferStatus::Pending);
    }

    #[tokio::test]
    async fn acceptance_freezes_the_ledger() {
        let Some(pool) = test_pool().await else { return };
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let conv = seed_conversation(&pool, buyer, seller).await;
        let service = OfferService::new(pool.clone(), test_events());

        let offer = service.create_offer(conv.id, buyer, 150_000).await.unwrap();
        service
            .respond_to_offer(offer.id, seller, OfferDecision::Accept)
            .await
            .unwrap();

        let err = service
            .create_offer(conv.id, buyer, 155_000)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NegotiationConcluded), "{err:?}");
    }
}
