use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Conversation, FeedEntry, Message},
    services::events::{EventBus, FeedEventKind},
};

pub struct MessageService {
    db: PgPool,
    events: EventBus,
}

impl MessageService {
    pub fn new(db: PgPool, events: EventBus) -> Self {
        Self { db, events }
    }

    /// Append a message to the conversation log. Bumps the activity
    /// timestamp and restores the recipient's view if they had hidden the
    /// conversation.
    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> AppResult<Message> {
        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::EmptyContent);
        }

        let conversation: Conversation =
            sqlx::query_as("SELECT * FROM conversations WHERE id = $1")
                .bind(conversation_id)
                .fetch_optional(&self.db)
                .await?
                .ok_or(AppError::ConversationNotFound)?;

        let recipient_id = conversation
            .counterparty_of(sender_id)
            .ok_or(AppError::NotParticipant)?;

        let message: Message = sqlx::query_as(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, body)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender_id)
        .bind(body)
        .fetch_one(&self.db)
        .await?;

        // The message is committed; view bookkeeping failures are logged,
        // not propagated.
        let bump = sqlx::query("UPDATE conversations SET last_activity_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&self.db)
            .await;
        if let Err(e) = bump {
            tracing::warn!("Activity bump failed for {}: {}", conversation_id, e);
        }

        // New activity brings a hidden conversation back into the
        // recipient's inbox.
        let unhide = sqlx::query(
            "UPDATE participants SET hidden_at = NULL WHERE conversation_id = $1 AND participant_id = $2",
        )
        .bind(conversation_id)
        .bind(recipient_id)
        .execute(&self.db)
        .await;
        if let Err(e) = unhide {
            tracing::warn!("Unhide failed for {}: {}", conversation_id, e);
        }

        self.events
            .emit(
                recipient_id,
                FeedEventKind::MessageSent,
                &FeedEntry::Message(message.clone()),
            )
            .await;

        Ok(message)
    }

    /// Advance the reader's read cursor. Idempotent: the cursor never moves
    /// backwards, so repeating a call changes nothing.
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        upto_seq: i64,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE participants
            SET last_read_seq = GREATEST(last_read_seq, $3)
            WHERE conversation_id = $1 AND participant_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(reader_id)
        .bind(upto_seq)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotParticipant);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_conversation, test_events, test_pool};

    async fn unread_count(pool: &PgPool, conversation_id: Uuid, reader_id: Uuid) -> i64 {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM messages m
            JOIN participants p ON p.conversation_id = m.conversation_id
            WHERE m.conversation_id = $1
              AND p.participant_id = $2
              AND m.sender_id <> $2
              AND m.seq > p.last_read_seq
            "#,
        )
        .bind(conversation_id)
        .bind(reader_id)
        .fetch_one(pool)
        .await
        .unwrap();
        count
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_never_regresses() {
        let Some(pool) = test_pool().await else { return };
        let svc = MessageService::new(pool.clone(), test_events());
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let conv = seed_conversation(&pool, buyer, seller).await;

        svc.send_message(conv.id, seller, "Asking 180k, firm-ish")
            .await
            .unwrap();
        let latest = svc
            .send_message(conv.id, seller, "Can do a call this week")
            .await
            .unwrap();
        assert_eq!(unread_count(&pool, conv.id, buyer).await, 2);

        svc.mark_read(conv.id, buyer, latest.seq).await.unwrap();
        assert_eq!(unread_count(&pool, conv.id, buyer).await, 0);

        // Repeating the call changes nothing.
        svc.mark_read(conv.id, buyer, latest.seq).await.unwrap();
        assert_eq!(unread_count(&pool, conv.id, buyer).await, 0);

        // A stale, lower cursor does not move the read marker back.
        svc.mark_read(conv.id, buyer, latest.seq - 1).await.unwrap();
        assert_eq!(unread_count(&pool, conv.id, buyer).await, 0);
    }

    #[tokio::test]
    async fn mark_read_rejects_outsiders() {
        let Some(pool) = test_pool().await else { return };
        let svc = MessageService::new(pool.clone(), test_events());
        let conv = seed_conversation(&pool, Uuid::new_v4(), Uuid::new_v4()).await;

        let err = svc.mark_read(conv.id, Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotParticipant), "{err:?}");
    }
}
