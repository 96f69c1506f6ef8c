//! Row models exchanged with the store.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::state::ids::{PersistentId, RoundId};

/// Opaque structured event payload: string keys to any JSON value.
///
/// Passed through to storage unmodified.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Values written when a round is finalized.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundFinalization {
    /// Round being closed.
    pub round_id: RoundId,
    /// Capture time of the round-end notification.
    pub ended_at: DateTime<Utc>,
    /// Winning team snapshot, as persistent ids.
    pub win_team: Vec<PersistentId>,
    /// Losing team snapshot, as persistent ids.
    pub lose_team: Vec<PersistentId>,
}

/// An event row about to be appended.
#[derive(Clone, Debug, PartialEq)]
pub struct NewEvent {
    /// Owning round.
    pub round_id: RoundId,
    /// Capture time.
    pub time: DateTime<Utc>,
    /// Event type tag (the notification name).
    pub event_type: String,
    /// Serialized as `data_json`.
    pub data: Payload,
    /// Subject participant, if resolved.
    pub subject_id: Option<PersistentId>,
    /// Indirect/secondary participant, if resolved.
    pub indirect_id: Option<PersistentId>,
}

/// A `players` row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPlayer {
    /// Primary key.
    pub persistent_id: PersistentId,
    /// Latest display name seen.
    pub name: String,
}

/// A `rounds` row read back from the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredRound {
    /// Row id.
    pub id: RoundId,
    /// `starttime`.
    pub started_at: DateTime<Utc>,
    /// `endtime`, NULL while open.
    pub ended_at: Option<DateTime<Utc>>,
    /// Decoded `win_team_json`.
    pub win_team: Option<Vec<PersistentId>>,
    /// Decoded `lose_team_json`.
    pub lose_team: Option<Vec<PersistentId>>,
}

impl StoredRound {
    /// True while the round has not been finalized.
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// An `events` row read back from the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Row id.
    pub id: i64,
    /// Owning round.
    pub round_id: RoundId,
    /// Capture time.
    pub time: DateTime<Utc>,
    /// `type` column.
    pub event_type: String,
    /// Decoded `data_json`.
    pub data: Payload,
    /// Subject participant.
    pub subject_id: Option<PersistentId>,
    /// Indirect participant.
    pub indirect_id: Option<PersistentId>,
}
