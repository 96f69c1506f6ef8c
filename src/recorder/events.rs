//! Event Recorder
//!
//! Appends gameplay events to the active round. Events outside a round are
//! dropped on purpose. Participants are resolved to persistent ids at write
//! time and stored as NULL when the connection is no longer known.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::state::ids::{ConnectionId, RoundId};
use crate::state::roster::Roster;
use crate::state::round::RoundLifecycle;
use crate::store::{NewEvent, Payload, Store, StoreError};

/// Payload field naming the subject participant.
pub const SUBJECT_FIELD: &str = "userid";

/// Payload field naming the indirect participant.
pub const INDIRECT_FIELD: &str = "attacker";

/// A gameplay event before round scoping and identity resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct GameplayEvent {
    /// Type tag, normally the notification name.
    pub event_type: String,
    /// Stored verbatim as `data_json`.
    pub payload: Payload,
    /// Subject connection.
    pub subject: Option<ConnectionId>,
    /// Indirect/secondary connection.
    pub indirect: Option<ConnectionId>,
}

impl GameplayEvent {
    /// Create an event with explicit participants.
    pub fn new(
        event_type: impl Into<String>,
        payload: Payload,
        subject: Option<ConnectionId>,
        indirect: Option<ConnectionId>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            subject,
            indirect,
        }
    }

    /// Create an event from a raw notification payload, taking participants
    /// from the `userid` and `attacker` fields when they hold connection ids.
    pub fn from_payload(event_type: impl Into<String>, payload: Payload) -> Self {
        let subject = connection_field(&payload, SUBJECT_FIELD);
        let indirect = connection_field(&payload, INDIRECT_FIELD);
        Self::new(event_type, payload, subject, indirect)
    }
}

fn connection_field(payload: &Payload, field: &str) -> Option<ConnectionId> {
    payload
        .get(field)
        .and_then(serde_json::Value::as_u64)
        .and_then(|raw| u32::try_from(raw).ok())
        .map(ConnectionId::new)
}

/// Result of a `record` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Event row appended.
    Recorded {
        /// New row id.
        event_id: i64,
        /// Round it belongs to.
        round_id: RoundId,
    },
    /// No round active; event dropped.
    NoActiveRound,
}

/// Writes round-scoped event rows. Every call is its own durable write.
#[derive(Debug, Default)]
pub struct EventRecorder {
    recorded: u64,
    dropped: u64,
}

impl EventRecorder {
    /// Create a recorder with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `event` to the active round.
    pub fn record<S: Store>(
        &mut self,
        store: &mut S,
        rounds: &RoundLifecycle,
        roster: &Roster,
        event: GameplayEvent,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome, StoreError> {
        let Some(round_id) = rounds.active_round_id() else {
            self.dropped += 1;
            debug!(event_type = %event.event_type, "event outside a round dropped");
            return Ok(RecordOutcome::NoActiveRound);
        };

        let row = NewEvent {
            round_id,
            time: now,
            subject_id: event.subject.and_then(|conn| roster.resolve(conn).cloned()),
            indirect_id: event.indirect.and_then(|conn| roster.resolve(conn).cloned()),
            event_type: event.event_type,
            data: event.payload,
        };

        let event_id = store.insert_event(&row)?;
        self.recorded += 1;

        Ok(RecordOutcome::Recorded { event_id, round_id })
    }

    /// Events written so far.
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    /// Events dropped because no round was active.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
