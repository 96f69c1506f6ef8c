//! Persistence Gateway
//!
//! The query contract the recorder writes through. The recorder only ever
//! talks to the [`Store`] trait; [`SqliteStore`] is the shipped backend.
//!
//! ## Consistency
//!
//! - Every write is its own durable unit; there is no batching.
//! - Round finalization updates a row only while its `endtime` is NULL, so a
//!   round is finalized at most once.
//! - Removing a player from memory never deletes its `players` row; events
//!   keep referencing it.

pub mod models;
pub mod schema;
pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::state::ids::{PersistentId, RoundId};

pub use models::{NewEvent, Payload, RoundFinalization, StoredEvent, StoredPlayer, StoredRound};
pub use sqlite::SqliteStore;

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Snapshot or payload (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp: {0}")]
    Timestamp(String),
}

/// Durable write interface used by the session state.
pub trait Store {
    /// Create the schema if absent. Idempotent.
    fn ensure_schema(&mut self) -> Result<(), StoreError>;

    /// Insert or update a player row; the latest name wins.
    fn upsert_player(&mut self, persistent_id: &PersistentId, name: &str) -> Result<(), StoreError>;

    /// Insert an open round row and return its id.
    fn insert_round(&mut self, started_at: DateTime<Utc>) -> Result<RoundId, StoreError>;

    /// Close an open round. Returns `false` if the round was missing or
    /// already closed, in which case nothing is written.
    fn finalize_round(&mut self, round: &RoundFinalization) -> Result<bool, StoreError>;

    /// Append an event row and return its id.
    fn insert_event(&mut self, event: &NewEvent) -> Result<i64, StoreError>;
}
