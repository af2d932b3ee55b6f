use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    clients::{IdentityDirectory, ListingService},
    error::{is_unique_violation, AppError, AppResult},
    models::{Conversation, ConversationSummary, FeedEntry, Message, Offer, ParticipantRole},
    services::{
        events::{EventBus, FeedEventKind},
        messages::MessageService,
    },
};

pub struct ConversationService {
    db: PgPool,
    events: EventBus,
    identity: Arc<dyn IdentityDirectory>,
    listings: Arc<dyn ListingService>,
}

impl ConversationService {
    pub fn new(
        db: PgPool,
        events: EventBus,
        identity: Arc<dyn IdentityDirectory>,
        listings: Arc<dyn ListingService>,
    ) -> Self {
        Self {
            db,
            events,
            identity,
            listings,
        }
    }

    /// First contact about a listing: creates the conversation and its first
    /// message in one transaction. Re-contacting the same owner about the
    /// same listing reuses the existing conversation (and restores it in the
    /// initiator's inbox); the first message is still appended.
    pub async fn start_conversation(
        &self,
        listing_id: Uuid,
        initiator_id: Uuid,
        owner_id: Uuid,
        first_message: &str,
    ) -> AppResult<Conversation> {
        if initiator_id == owner_id {
            return Err(AppError::InvalidParticipants);
        }
        let body = first_message.trim();
        if body.is_empty() {
            return Err(AppError::EmptyContent);
        }

        if let Some(existing) = self
            .find_existing(listing_id, initiator_id, owner_id)
            .await?
        {
            return self.reuse_conversation(existing, initiator_id, body).await;
        }

        let mut tx = self.db.begin().await?;

        let conv_id = Uuid::new_v4();
        let inserted: Result<Conversation, sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO conversations (id, listing_id, buyer_id, seller_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(conv_id)
        .bind(listing_id)
        .bind(initiator_id)
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await;

        let conversation = match inserted {
            Ok(c) => c,
            // Lost a create race: another request inserted the same
            // (listing, pair) row first. Fall back to reuse.
            Err(e) if is_unique_violation(&e, "conversations_pair_listing") => {
                drop(tx);
                let existing = self
                    .find_existing(listing_id, initiator_id, owner_id)
                    .await?
                    .ok_or(AppError::ConversationNotFound)?;
                return self.reuse_conversation(existing, initiator_id, body).await;
            }
            Err(e) => return Err(AppError::Database(e)),
        };

        for (participant_id, role) in [
            (initiator_id, ParticipantRole::Buyer),
            (owner_id, ParticipantRole::Seller),
        ] {
            sqlx::query(
                r#"
                INSERT INTO participants (id, conversation_id, participant_id, role)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(conv_id)
            .bind(participant_id)
            .bind(role)
            .execute(&mut *tx)
            .await?;
        }

        let message: Message = sqlx::query_as(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, body)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(conv_id)
        .bind(initiator_id)
        .bind(body)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.events
            .emit(
                owner_id,
                FeedEventKind::MessageSent,
                &FeedEntry::Message(message),
            )
            .await;

        Ok(conversation)
    }

    async fn find_existing(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let existing: Option<Conversation> = sqlx::query_as(
            "SELECT * FROM conversations WHERE listing_id = $1 AND buyer_id = $2 AND seller_id = $3",
        )
        .bind(listing_id)
        .bind(buyer_id)
        .bind(seller_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(existing)
    }

    async fn reuse_conversation(
        &self,
        conversation: Conversation,
        initiator_id: Uuid,
        body: &str,
    ) -> AppResult<Conversation> {
        sqlx::query(
            "UPDATE participants SET hidden_at = NULL WHERE conversation_id = $1 AND participant_id = $2",
        )
        .bind(conversation.id)
        .bind(initiator_id)
        .execute(&self.db)
        .await?;

        MessageService::new(self.db.clone(), self.events.clone())
            .send_message(conversation.id, initiator_id, body)
            .await?;

        Ok(conversation)
    }

    /// Inbox listing: conversations the caller has not hidden, newest
    /// activity first, each with unread count, latest entry preview, and
    /// best-effort listing/counterparty enrichment.
    pub async fn list_for_participant(
        &self,
        participant_id: Uuid,
    ) -> AppResult<Vec<ConversationSummary>> {
        let conversations: Vec<Conversation> = sqlx::query_as(
            r#"
            SELECT c.* FROM conversations c
            JOIN participants p ON c.id = p.conversation_id
            WHERE p.participant_id = $1 AND p.hidden_at IS NULL
            ORDER BY c.last_activity_at DESC
            "#,
        )
        .bind(participant_id)
        .fetch_all(&self.db)
        .await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            summaries.push(self.summarize(conversation, participant_id).await?);
        }

        Ok(summaries)
    }

    async fn summarize(
        &self,
        conversation: Conversation,
        participant_id: Uuid,
    ) -> AppResult<ConversationSummary> {
        let unread_count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM messages m
            JOIN participants p ON p.conversation_id = m.conversation_id
                AND p.participant_id = $2
            WHERE m.conversation_id = $1
              AND m.sender_id != $2
              AND m.seq > p.last_read_seq
            "#,
        )
        .bind(conversation.id)
        .bind(participant_id)
        .fetch_one(&self.db)
        .await?;

        let last_message: Option<Message> = sqlx::query_as(
            "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(conversation.id)
        .fetch_optional(&self.db)
        .await?;

        let last_offer: Option<Offer> = sqlx::query_as(
            "SELECT * FROM offers WHERE conversation_id = $1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(conversation.id)
        .fetch_optional(&self.db)
        .await?;

        let last_entry = match (last_message, last_offer) {
            (Some(m), Some(o)) => {
                if o.seq > m.seq {
                    Some(FeedEntry::Offer(o))
                } else {
                    Some(FeedEntry::Message(m))
                }
            }
            (Some(m), None) => Some(FeedEntry::Message(m)),
            (None, Some(o)) => Some(FeedEntry::Offer(o)),
            (None, None) => None,
        };

        // Collaborator lookups degrade gracefully; the inbox renders
        // without them.
        let listing = match self
            .listings
            .get_listing_summary(conversation.listing_id)
            .await
        {
            Ok(l) => Some(l),
            Err(e) => {
                tracing::warn!("Listing lookup failed for {}: {}", conversation.listing_id, e);
                None
            }
        };

        let counterparty = match conversation.counterparty_of(participant_id) {
            Some(other) => match self.identity.get_profile(other).await {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!("Profile lookup failed for {}: {}", other, e);
                    None
                }
            },
            None => None,
        };

        Ok(ConversationSummary {
            conversation,
            unread_count: unread_count.0,
            last_entry,
            listing,
            counterparty,
        })
    }

    /// Per-participant soft delete. The other participant's view and all
    /// underlying messages and offers are untouched.
    pub async fn hide_for_participant(
        &self,
        conversation_id: Uuid,
        participant_id: Uuid,
    ) -> AppResult<()> {
        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT 1::BIGINT FROM conversations WHERE id = $1")
                .bind(conversation_id)
                .fetch_optional(&self.db)
                .await?;
        if exists.is_none() {
            return Err(AppError::ConversationNotFound);
        }

        let result = sqlx::query(
            "UPDATE participants SET hidden_at = NOW() WHERE conversation_id = $1 AND participant_id = $2",
        )
        .bind(conversation_id)
        .bind(participant_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotParticipant);
        }

        Ok(())
    }
}
