use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        merge_entries, Conversation, FeedCursor, FeedDirection, FeedEntry, FeedPage, Message,
        Offer,
    },
};

/// Read-side projection over the message and offer logs. Performs no writes;
/// a page is a deterministic function of the two logs and the cursor.
pub struct FeedService {
    db: PgPool,
}

impl FeedService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Merged, keyset-paginated feed. Fetches up to `limit` rows from each
    /// log past the cursor, merges on `(created_at, seq)` and truncates, so
    /// concurrent inserts during pagination can neither skip nor duplicate
    /// entries.
    pub async fn get_feed(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
        cursor: Option<FeedCursor>,
        limit: i64,
        direction: FeedDirection,
    ) -> AppResult<FeedPage> {
        let conversation: Conversation =
            sqlx::query_as("SELECT * FROM conversations WHERE id = $1")
                .bind(conversation_id)
                .fetch_optional(&self.db)
                .await?
                .ok_or(AppError::ConversationNotFound)?;

        if !conversation.is_participant(viewer_id) {
            return Err(AppError::NotParticipant);
        }

        let (comparator, order) = match direction {
            FeedDirection::Newest => ("<", "DESC"),
            FeedDirection::Oldest => (">", "ASC"),
        };

        let (messages, offers) = match cursor {
            Some(c) => {
                let msg_sql = format!(
                    "SELECT * FROM messages WHERE conversation_id = $1 \
                     AND (created_at, seq) {cmp} ($2, $3) \
                     ORDER BY created_at {ord}, seq {ord} LIMIT $4",
                    cmp = comparator,
                    ord = order
                );
                let offer_sql = format!(
                    "SELECT * FROM offers WHERE conversation_id = $1 \
                     AND (created_at, seq) {cmp} ($2, $3) \
                     ORDER BY created_at {ord}, seq {ord} LIMIT $4",
                    cmp = comparator,
                    ord = order
                );
                let messages: Vec<Message> = sqlx::query_as(&msg_sql)
                    .bind(conversation_id)
                    .bind(c.created_at)
                    .bind(c.seq)
                    .bind(limit)
                    .fetch_all(&self.db)
                    .await?;
                let offers: Vec<Offer> = sqlx::query_as(&offer_sql)
                    .bind(conversation_id)
                    .bind(c.created_at)
                    .bind(c.seq)
                    .bind(limit)
                    .fetch_all(&self.db)
                    .await?;
                (messages, offers)
            }
            None => {
                let msg_sql = format!(
                    "SELECT * FROM messages WHERE conversation_id = $1 \
                     ORDER BY created_at {ord}, seq {ord} LIMIT $2",
                    ord = order
                );
                let offer_sql = format!(
                    "SELECT * FROM offers WHERE conversation_id = $1 \
                     ORDER BY created_at {ord}, seq {ord} LIMIT $2",
                    ord = order
                );
                let messages: Vec<Message> = sqlx::query_as(&msg_sql)
                    .bind(conversation_id)
                    .bind(limit)
                    .fetch_all(&self.db)
                    .await?;
                let offers: Vec<Offer> = sqlx::query_as(&offer_sql)
                    .bind(conversation_id)
                    .bind(limit)
                    .fetch_all(&self.db)
                    .await?;
                (messages, offers)
            }
        };

        let entries = merge_entries(messages, offers, direction, limit as usize);

        let next_cursor = if entries.len() == limit as usize {
            entries.last().map(|e| e.cursor().encode())
        } else {
            None
        };

        Ok(FeedPage {
            entries,
            next_cursor,
            negotiation_concluded: conversation.is_concluded(),
        })
    }

    /// Everything after a seq cursor, oldest first. Used by the live
    /// subscription to replay entries missed across a reconnect.
    pub async fn entries_after(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
        after_seq: i64,
    ) -> AppResult<Vec<FeedEntry>> {
        let conversation: Conversation =
            sqlx::query_as("SELECT * FROM conversations WHERE id = $1")
                .bind(conversation_id)
                .fetch_optional(&self.db)
                .await?
                .ok_or(AppError::ConversationNotFound)?;

        if !conversation.is_participant(viewer_id) {
            return Err(AppError::NotParticipant);
        }

        let messages: Vec<Message> = sqlx::query_as(
            "SELECT * FROM messages WHERE conversation_id = $1 AND seq > $2 ORDER BY seq ASC",
        )
        .bind(conversation_id)
        .bind(after_seq)
        .fetch_all(&self.db)
        .await?;

        let offers: Vec<Offer> = sqlx::query_as(
            "SELECT * FROM offers WHERE conversation_id = $1 AND seq > $2 ORDER BY seq ASC",
        )
        .bind(conversation_id)
        .bind(after_seq)
        .fetch_all(&self.db)
        .await?;

        let total = messages.len() + offers.len();
        Ok(merge_entries(messages, offers, FeedDirection::Oldest, total))
    }
}
