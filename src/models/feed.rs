use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::{Message, Offer};

/// One entry in the merged conversation feed. Messages and offers share the
/// ordering key `(created_at, seq)`; `seq` comes from a single database
/// sequence so ties on `created_at` still order deterministically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FeedEntry {
    Message(Message),
    Offer(Offer),
}

impl FeedEntry {
    pub fn seq(&self) -> i64 {
        match self {
            FeedEntry::Message(m) => m.seq,
            FeedEntry::Offer(o) => o.seq,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            FeedEntry::Message(m) => m.created_at,
            FeedEntry::Offer(o) => o.created_at,
        }
    }

    pub fn ordering_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at(), self.seq())
    }

    pub fn cursor(&self) -> FeedCursor {
        FeedCursor {
            created_at: self.created_at(),
            seq: self.seq(),
        }
    }
}

/// Keyset pagination cursor over the feed ordering key. Opaque to clients:
/// serialized as url-safe base64 of `micros:seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCursor {
    pub created_at: DateTime<Utc>,
    pub seq: i64,
}

impl FeedCursor {
    pub fn encode(&self) -> String {
        let raw = format!("{}:{}", self.created_at.timestamp_micros(), self.seq);
        URL_SAFE_NO_PAD.encode(raw)
    }

    pub fn decode(token: &str) -> Option<Self> {
        let raw = URL_SAFE_NO_PAD.decode(token).ok()?;
        let raw = std::str::from_utf8(&raw).ok()?;
        let (micros, seq) = raw.split_once(':')?;
        let micros: i64 = micros.parse().ok()?;
        let seq: i64 = seq.parse().ok()?;
        let created_at = Utc.timestamp_micros(micros).single()?;
        Some(FeedCursor { created_at, seq })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedDirection {
    /// Chat-style inverted list; the default.
    Newest,
    Oldest,
}

impl Default for FeedDirection {
    fn default() -> Self {
        Self::Newest
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub entries: Vec<FeedEntry>,
    pub next_cursor: Option<String>,
    pub negotiation_concluded: bool,
}

/// Merge per-table pages into one feed page. Both inputs must already be
/// sorted in `direction` order; the result is truncated to `limit`.
pub fn merge_entries(
    messages: Vec<Message>,
    offers: Vec<Offer>,
    direction: FeedDirection,
    limit: usize,
) -> Vec<FeedEntry> {
    let mut entries: Vec<FeedEntry> = messages
        .into_iter()
        .map(FeedEntry::Message)
        .chain(offers.into_iter().map(FeedEntry::Offer))
        .collect();

    match direction {
        FeedDirection::Newest => {
            entries.sort_by(|a, b| b.ordering_key().cmp(&a.ordering_key()))
        }
        FeedDirection::Oldest => {
            entries.sort_by(|a, b| a.ordering_key().cmp(&b.ordering_key()))
        }
    }

    entries.truncate(limit);
    entries
}
