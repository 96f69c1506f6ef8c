//! Store Schema
//!
//! Create-if-absent DDL for the three recorder tables. Safe to run on every
//! startup against an existing database.

/// Player identities, keyed by persistent id. Latest display name wins.
pub const PLAYERS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS players (
    persistent_id TEXT PRIMARY KEY,
    name          TEXT NOT NULL
);";

/// One row per round. `endtime` and the team snapshots stay NULL until the
/// round is finalized.
pub const ROUNDS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS rounds (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    starttime      TEXT NOT NULL,
    endtime        TEXT NULL,
    win_team_json  TEXT NULL,
    lose_team_json TEXT NULL
);";

/// Per-event detail scoped to a round.
pub const EVENTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    round_id    INTEGER NOT NULL REFERENCES rounds(id),
    time        TEXT NOT NULL,
    type        TEXT NOT NULL,
    data_json   TEXT NOT NULL,
    subject_id  TEXT NULL REFERENCES players(persistent_id),
    indirect_id TEXT NULL REFERENCES players(persistent_id)
);
CREATE INDEX IF NOT EXISTS events_round_id ON events(round_id);";

/// Full schema in dependency order.
pub fn schema_sql() -> String {
    [PLAYERS_TABLE, ROUNDS_TABLE, EVENTS_TABLE].concat()
}
