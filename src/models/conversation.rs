use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::clients::{ListingSummary, Profile};

/// A two-party negotiation thread scoped to one listing. The buyer is
/// whoever initiated first contact; the seller is the listing owner.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    /// Set once any offer is accepted; no further offer actions after this.
    pub concluded_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, participant_id: Uuid) -> bool {
        participant_id == self.buyer_id || participant_id == self.seller_id
    }

    /// The other party, given one participant.
    pub fn counterparty_of(&self, participant_id: Uuid) -> Option<Uuid> {
        if participant_id == self.buyer_id {
            Some(self.seller_id)
        } else if participant_id == self.seller_id {
            Some(self.buyer_id)
        } else {
            None
        }
    }

    pub fn is_concluded(&self) -> bool {
        self.concluded_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "participant_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Buyer,
    Seller,
}

/// Inbox row: the conversation plus what the list view needs alongside it.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub unread_count: i64,
    pub last_entry: Option<super::FeedEntry>,
    pub listing: Option<ListingSummary>,
    pub counterparty: Option<Profile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(buyer: Uuid, seller: Uuid) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            buyer_id: buyer,
            seller_id: seller,
            concluded_at: None,
            last_activity_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn counterparty_swaps_sides() {
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let conv = conversation(buyer, seller);

        assert_eq!(conv.counterparty_of(buyer), Some(seller));
        assert_eq!(conv.counterparty_of(seller), Some(buyer));
        assert_eq!(conv.counterparty_of(Uuid::new_v4()), None);
    }

    #[test]
    fn outsiders_are_not_participants() {
        let conv = conversation(Uuid::new_v4(), Uuid::new_v4());
        assert!(conv.is_participant(conv.buyer_id));
        assert!(conv.is_participant(conv.seller_id));
        assert!(!conv.is_participant(Uuid::new_v4()));
    }
}
