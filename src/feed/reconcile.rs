//! Startup Reconciliation
//!
//! Players already in the match when the recorder attaches never send a
//! connect notification. Before dispatch starts, the session is seeded from
//! an external query of who is connected and on which team.

use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::state::ids::{ConnectionId, PersistentId, TeamId};

/// A player reported by the external roster query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedPlayer {
    /// Connection id.
    pub userid: ConnectionId,
    /// Persistent id.
    pub networkid: PersistentId,
    /// Display name.
    pub name: String,
    /// Current team, if on one.
    #[serde(default)]
    pub team: Option<TeamId>,
}

/// External source of currently-connected players.
pub trait ConnectedPlayers {
    /// Everyone connected right now.
    fn connected_players(&self) -> Vec<ConnectedPlayer>;
}

impl ConnectedPlayers for [ConnectedPlayer] {
    fn connected_players(&self) -> Vec<ConnectedPlayer> {
        self.to_vec()
    }
}

impl ConnectedPlayers for Vec<ConnectedPlayer> {
    fn connected_players(&self) -> Vec<ConnectedPlayer> {
        self.clone()
    }
}

/// Roster file errors.
#[derive(Debug, thiserror::Error)]
pub enum RosterFileError {
    /// File could not be read.
    #[error("cannot read roster file: {0}")]
    Io(#[from] std::io::Error),

    /// File is not a JSON array of players.
    #[error("invalid roster file: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Load a JSON array of [`ConnectedPlayer`] from disk.
pub fn load_roster_file(path: impl AsRef<Path>) -> Result<Vec<ConnectedPlayer>, RosterFileError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
