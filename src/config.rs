//! Recorder Configuration

use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::warn;

use crate::state::ids::TeamId;

/// Gameplay notifications recorded by default.
pub const DEFAULT_TRACKED_EVENTS: &[&str] = &[
    // Combat
    "player_death",
    "player_hurt",
    "player_blind",
    "weapon_fire",
    "weapon_reload",
    // Items
    "item_pickup",
    "item_equip",
    "grenade_thrown",
    "hegrenade_detonate",
    "flashbang_detonate",
    "smokegrenade_detonate",
    "molotov_detonate",
    // Objectives / environment
    "bomb_planted",
    "bomb_defused",
    "bomb_exploded",
    "bomb_pickup",
    "bomb_dropped",
    "hostage_rescued",
    "door_moving",
];

/// Default database file.
pub const DEFAULT_DATABASE_PATH: &str = "log-everything.sqlite3";

/// Recorder configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct RecorderConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// The two teams whose round results are recorded.
    pub competing_teams: [TeamId; 2],
    /// Clear team membership when a round starts.
    pub reset_teams_on_round_start: bool,
    /// Gameplay notification names that are recorded as events.
    pub tracked_events: BTreeSet<String>,
    /// Record every unrecognized notification, not just tracked ones.
    pub record_untracked_events: bool,
    /// JSON file listing players connected at startup.
    pub roster_path: Option<PathBuf>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            competing_teams: [TeamId(2), TeamId(3)],
            reset_teams_on_round_start: true,
            tracked_events: DEFAULT_TRACKED_EVENTS.iter().map(|s| s.to_string()).collect(),
            record_untracked_events: false,
            roster_path: None,
        }
    }
}

impl RecorderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup. Unset keys keep their
    /// defaults; malformed values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("RECORDER_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup("RECORDER_TEAMS") {
            match parse_teams(&raw) {
                Some(teams) => config.competing_teams = teams,
                None => warn!(value = %raw, "RECORDER_TEAMS must be two distinct team ids, using default"),
            }
        }

        if let Some(raw) = lookup("RECORDER_RESET_TEAMS") {
            match parse_bool(&raw) {
                Some(reset) => config.reset_teams_on_round_start = reset,
                None => warn!(value = %raw, "RECORDER_RESET_TEAMS is not a boolean, using default"),
            }
        }

        if let Some(raw) = lookup("RECORDER_EVENTS") {
            config.tracked_events = raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(raw) = lookup("RECORDER_RECORD_ALL") {
            match parse_bool(&raw) {
                Some(all) => config.record_untracked_events = all,
                None => warn!(value = %raw, "RECORDER_RECORD_ALL is not a boolean, using default"),
            }
        }

        config.roster_path = lookup("RECORDER_ROSTER_PATH").map(PathBuf::from);

        config
    }

    /// Check if a gameplay notification should be recorded.
    pub fn records(&self, name: &str) -> bool {
        self.record_untracked_events || self.tracked_events.contains(name)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_teams(raw: &str) -> Option<[TeamId; 2]> {
    let ids: Vec<u8> = raw
        .split(',')
        .map(|part| part.trim().parse().ok())
        .collect::<Option<_>>()?;
    match ids.as_slice() {
        [a, b] if a != b => Some([TeamId(*a), TeamId(*b)]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RecorderConfig::from_lookup(lookup(&[]));
        assert_eq!(config, RecorderConfig::default());
        assert_eq!(config.competing_teams, [TeamId(2), TeamId(3)]);
        assert!(config.records("player_death"));
        assert!(!config.records("player_footstep"));
    }

    #[test]
    fn test_overrides() {
        let config = RecorderConfig::from_lookup(lookup(&[
            ("RECORDER_DB_PATH", "/tmp/match.db"),
            ("RECORDER_TEAMS", "3, 2"),
            ("RECORDER_RESET_TEAMS", "false"),
            ("RECORDER_EVENTS", "weapon_fire, player_death,,"),
            ("RECORDER_ROSTER_PATH", "roster.json"),
        ]));

        assert_eq!(config.database_path, PathBuf::from("/tmp/match.db"));
        assert_eq!(config.competing_teams, [TeamId(3), TeamId(2)]);
        assert!(!config.reset_teams_on_round_start);
        assert_eq!(config.tracked_events.len(), 2);
        assert!(config.records("weapon_fire"));
        assert!(!config.records("bomb_planted"));
        assert_eq!(config.roster_path, Some(PathBuf::from("roster.json")));
    }

    #[test]
    fn test_malformed_values_keep_defaults() {
        let config = RecorderConfig::from_lookup(lookup(&[
            ("RECORDER_TEAMS", "2,2"),
            ("RECORDER_RESET_TEAMS", "maybe"),
            ("RECORDER_RECORD_ALL", "sometimes"),
        ]));
        assert_eq!(config.competing_teams, [TeamId(2), TeamId(3)]);
        assert!(config.reset_teams_on_round_start);
        assert!(!config.record_untracked_events);

        assert_eq!(parse_teams("2,3,4"), None);
        assert_eq!(parse_teams("2,x"), None);
    }

    #[test]
    fn test_record_all() {
        let config = RecorderConfig::from_lookup(lookup(&[("RECORDER_RECORD_ALL", "1")]));
        assert!(config.records("anything_at_all"));
    }
}
