//! Notification Wire Format
//!
//! The feed delivers named notifications with a key/value payload. One JSON
//! object per notification:
//!
//! ```json
//! {"name": "player_team", "data": {"userid": 4, "team": 3, "oldteam": 0, "disconnect": false}}
//! ```
//!
//! [`Notification::classify`] turns the raw form into a [`GameNotification`].

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::RecorderConfig;
use crate::recorder::events::GameplayEvent;
use crate::state::ids::{ConnectionId, PersistentId, TeamId};
use crate::store::Payload;

/// Raw notification as delivered by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Event name, e.g. `round_end`.
    pub name: String,
    /// Payload fields.
    #[serde(default)]
    pub data: Payload,
}

/// `player_connect` / `player_connect_client`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayerConnect {
    /// Connection id.
    pub userid: ConnectionId,
    /// Persistent id.
    pub networkid: PersistentId,
    /// Display name.
    pub name: String,
}

/// `player_disconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PlayerDisconnect {
    /// Connection id.
    pub userid: ConnectionId,
}

/// `player_team`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PlayerTeam {
    /// Connection id.
    pub userid: ConnectionId,
    /// New team.
    pub team: TeamId,
    /// Team being left, as the game believes it.
    #[serde(default)]
    pub oldteam: Option<TeamId>,
    /// Player is leaving the server; skip the re-assignment.
    #[serde(default, deserialize_with = "bool_or_int")]
    pub disconnect: bool,
}

/// `round_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RoundEndNotice {
    /// Winning team number (draws use a sentinel). Kept raw so values that
    /// are not a team id still reach the round lifecycle.
    pub winner: i64,
}

/// Classified notification.
#[derive(Debug, Clone, PartialEq)]
pub enum GameNotification {
    /// Player connected.
    PlayerConnect(PlayerConnect),
    /// Player disconnected.
    PlayerDisconnect(PlayerDisconnect),
    /// Player changed team.
    PlayerTeam(PlayerTeam),
    /// Round started.
    RoundStart,
    /// Round ended.
    RoundEnd(RoundEndNotice),
    /// Tracked gameplay event.
    Gameplay(GameplayEvent),
    /// Not recognized and not tracked.
    Ignored {
        /// Notification name.
        name: String,
    },
}

/// Notification errors.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Line is not a notification object.
    #[error("undecodable notification: {0}")]
    Decode(serde_json::Error),

    /// Required payload field absent.
    #[error("{notification}: missing field `{field}`")]
    MissingField {
        /// Notification name.
        notification: String,
        /// Field name.
        field: &'static str,
    },

    /// Payload fields present but of the wrong shape.
    #[error("{notification}: malformed payload: {source}")]
    Malformed {
        /// Notification name.
        notification: String,
        /// Decode failure.
        #[source]
        source: serde_json::Error,
    },
}

impl Notification {
    /// Create a notification.
    pub fn new(name: impl Into<String>, data: Payload) -> Self {
        Self { name: name.into(), data }
    }

    /// Decode one JSON line.
    pub fn from_json(line: &str) -> Result<Self, NotificationError> {
        serde_json::from_str(line).map_err(NotificationError::Decode)
    }

    /// Classify by name and decode the fields the recorder needs.
    pub fn classify(self, config: &RecorderConfig) -> Result<GameNotification, NotificationError> {
        match self.name.as_str() {
            "player_connect" | "player_connect_client" => {
                return self
                    .decode(&["userid", "networkid", "name"])
                    .map(GameNotification::PlayerConnect);
            }
            "player_disconnect" => {
                return self.decode(&["userid"]).map(GameNotification::PlayerDisconnect);
            }
            "player_team" => {
                return self.decode(&["userid", "team"]).map(GameNotification::PlayerTeam);
            }
            "round_start" => return Ok(GameNotification::RoundStart),
            "round_end" => {
                return self.decode(&["winner"]).map(GameNotification::RoundEnd);
            }
            _ => {}
        }

        if config.records(&self.name) {
            Ok(GameNotification::Gameplay(GameplayEvent::from_payload(self.name, self.data)))
        } else {
            Ok(GameNotification::Ignored { name: self.name })
        }
    }

    fn decode<T: for<'de> Deserialize<'de>>(
        &self,
        required: &[&'static str],
    ) -> Result<T, NotificationError> {
        if let Some(field) = required.iter().find(|f| !self.data.contains_key(**f)) {
            return Err(NotificationError::MissingField {
                notification: self.name.clone(),
                field: *field,
            });
        }
        serde_json::from_value(serde_json::Value::Object(self.data.clone())).map_err(|source| {
            NotificationError::Malformed {
                notification: self.name.clone(),
                source,
            }
        })
    }
}

/// Accept `true`/`false` or `1`/`0`.
fn bool_or_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(flag) => flag,
        Flag::Int(raw) => raw != 0,
    })
}
