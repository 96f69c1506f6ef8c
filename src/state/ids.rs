//! Identifier Types
//!
//! Newtypes for the identifiers that flow between the feed, the in-memory
//! state and the store. Keeping them distinct stops a connection id from
//! being written where a persistent id belongs.

use std::fmt;
use serde::{Serialize, Deserialize};

// =============================================================================
// CONNECTION ID
// =============================================================================

/// Ephemeral identifier of a player's current connection.
///
/// Unique only while the player is connected; the same value may be handed
/// to a different player after a disconnect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    /// Create from the raw `userid` value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// PERSISTENT ID
// =============================================================================

/// Stable external account identifier (e.g. a platform account id).
///
/// This is the durable join key for everything written to the store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistentId(pub String);

impl PersistentId {
    /// Create from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersistentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// TEAM ID
// =============================================================================

/// Small integer team identifier as reported by the game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub u8);

impl TeamId {
    /// Player has not picked a team yet.
    pub const UNASSIGNED: TeamId = TeamId(0);
    /// Player is watching.
    pub const SPECTATOR: TeamId = TeamId(1);

    /// Create from the raw team number.
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Team number as it appears on the feed. `None` if out of range.
    pub fn from_wire(raw: i64) -> Option<Self> {
        u8::try_from(raw).ok().map(Self)
    }

    /// True for the unassigned/spectator sentinels.
    pub fn is_sentinel(self) -> bool {
        self == Self::UNASSIGNED || self == Self::SPECTATOR
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ROUND ID
// =============================================================================

/// Store-assigned round identifier (monotonic row id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(pub i64);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_teams() {
        assert!(TeamId::UNASSIGNED.is_sentinel());
        assert!(TeamId::SPECTATOR.is_sentinel());
        assert!(!TeamId::new(2).is_sentinel());
        assert!(!TeamId::new(3).is_sentinel());
    }

    #[test]
    fn test_team_from_wire() {
        assert_eq!(TeamId::from_wire(3), Some(TeamId(3)));
        assert_eq!(TeamId::from_wire(255), Some(TeamId(255)));
        assert_eq!(TeamId::from_wire(-1), None);
        assert_eq!(TeamId::from_wire(256), None);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        assert_eq!(serde_json::to_string(&ConnectionId::new(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&PersistentId::new("STEAM_1:0:42")).unwrap(), "\"STEAM_1:0:42\"");
        let team: TeamId = serde_json::from_str("3").unwrap();
        assert_eq!(team, TeamId::new(3));
    }
}
