//! Player Roster
//!
//! Maps live connection ids to player identities. The roster is the only
//! owner of [`Player`] values; everything else holds a [`ConnectionId`] and
//! must cope with it no longer resolving.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::state::ids::{ConnectionId, PersistentId};
use crate::store::{Store, StoreError};

/// A connected player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Current connection.
    pub connection_id: ConnectionId,
    /// Stable account id.
    pub persistent_id: PersistentId,
    /// Display name at last connect.
    pub display_name: String,
}

/// What an `add_or_update` call did to the roster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Connection was not known before.
    Joined,
    /// Same connection and same account; attributes refreshed.
    Refreshed,
    /// Connection was held by a different account (missed disconnect).
    Replaced {
        /// Account that previously held the connection.
        previous: PersistentId,
    },
}

/// Connection id to player identity.
#[derive(Debug, Default)]
pub struct Roster {
    players: BTreeMap<ConnectionId, Player>,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a player and upsert its durable row.
    ///
    /// Repeat calls with identical data leave both the roster and the
    /// `players` table unchanged.
    pub fn add_or_update<S: Store>(
        &mut self,
        store: &mut S,
        connection_id: ConnectionId,
        persistent_id: PersistentId,
        display_name: impl Into<String>,
    ) -> Result<Admission, StoreError> {
        let display_name = display_name.into();

        let admission = match self.players.get(&connection_id) {
            None => Admission::Joined,
            Some(existing) if existing.persistent_id == persistent_id => Admission::Refreshed,
            Some(existing) => Admission::Replaced {
                previous: existing.persistent_id.clone(),
            },
        };

        store.upsert_player(&persistent_id, &display_name)?;
        self.players.insert(connection_id, Player {
            connection_id,
            persistent_id,
            display_name,
        });

        Ok(admission)
    }

    /// Remove a player. Unknown connections are a no-op.
    ///
    /// Memory only: the `players` row is kept for historical events.
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Player> {
        self.players.remove(&connection_id)
    }

    /// Persistent id of a connected player.
    pub fn resolve(&self, connection_id: ConnectionId) -> Option<&PersistentId> {
        self.players.get(&connection_id).map(|p| &p.persistent_id)
    }

    /// Get a connected player.
    pub fn get(&self, connection_id: ConnectionId) -> Option<&Player> {
        self.players.get(&connection_id)
    }

    /// Display name for diagnostics.
    pub fn display_name(&self, connection_id: ConnectionId) -> Option<&str> {
        self.players.get(&connection_id).map(|p| p.display_name.as_str())
    }

    /// Check if a connection is known.
    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.players.contains_key(&connection_id)
    }

    /// Number of connected players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// True if nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Iterate players in connection id order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }
}
