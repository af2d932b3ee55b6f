use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Offer {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub seq: i64,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    /// Integer currency units, always positive.
    pub amount: i64,
    pub status: OfferStatus,
    /// The prior offer this one countered, if any.
    pub supersedes_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Offer state machine. `Pending` is the only live state; every transition
/// out of it is terminal for this row. `Countered` additionally means a
/// successor offer exists with `supersedes_id` pointing back here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "offer_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
    Countered,
    Cancelled,
}

impl OfferStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OfferStatus::Pending)
    }

    /// Valid single-offer transitions. Creation is not a transition.
    pub fn can_transition_to(self, next: OfferStatus) -> bool {
        matches!(self, OfferStatus::Pending) && next.is_terminal()
    }
}

/// How a recipient resolves a pending offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferDecision {
    Accept,
    Decline,
}

impl OfferDecision {
    pub fn resulting_status(self) -> OfferStatus {
        match self {
            OfferDecision::Accept => OfferStatus::Accepted,
            OfferDecision::Decline => OfferStatus::Declined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_the_only_live_state() {
        assert!(!OfferStatus::Pending.is_terminal());
        for status in [
            OfferStatus::Accepted,
            OfferStatus::Declined,
            OfferStatus::Countered,
            OfferStatus::Cancelled,
        ] {
            assert!(status.is_terminal(), "{status:?} should be terminal");
        }
    }

    #[test]
    fn terminal_states_admit_no_transitions() {
        for from in [
            OfferStatus::Accepted,
            OfferStatus::Declined,
            OfferStatus::Countered,
            OfferStatus::Cancelled,
        ] {
            for to in [
                OfferStatus::Pending,
                OfferStatus::Accepted,
                OfferStatus::Declined,
                OfferStatus::Countered,
                OfferStatus::Cancelled,
            ] {
                assert!(!from.can_transition_to(to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn pending_transitions_to_every_terminal_state() {
        for to in [
            OfferStatus::Accepted,
            OfferStatus::Declined,
            OfferStatus::Countered,
            OfferStatus::Cancelled,
        ] {
            assert!(OfferStatus::Pending.can_transition_to(to));
        }
        assert!(!OfferStatus::Pending.can_transition_to(OfferStatus::Pending));
    }

    #[test]
    fn decisions_map_to_statuses() {
        assert_eq!(
            OfferDecision::Accept.resulting_status(),
            OfferStatus::Accepted
        );
        assert_eq!(
            OfferDecision::Decline.resulting_status(),
            OfferStatus::Declined
        );
    }

    #[test]
    fn decision_deserializes_lowercase() {
        let d: OfferDecision = serde_json::from_str("\"accept\"").unwrap();
        assert_eq!(d, OfferDecision::Accept);
        let d: OfferDecision = serde_json::from_str("\"decline\"").unwrap();
        assert_eq!(d, OfferDecision::Decline);
    }
}
