//! SQLite Store
//!
//! [`Store`] backed by a single rusqlite connection. The recorder is the only
//! writer, so there is no pooling.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::state::ids::{PersistentId, RoundId};
use crate::store::models::{
    NewEvent, Payload, RoundFinalization, StoredEvent, StoredPlayer, StoredRound,
};
use crate::store::schema::schema_sql;
use crate::store::{Store, StoreError};

/// Raw `rounds` columns in select order.
type RoundColumns = (i64, String, Option<String>, Option<String>, Option<String>);

/// Raw `events` columns in select order.
type EventColumns = (i64, i64, String, String, String, Option<String>, Option<String>);

const SELECT_ROUND: &str =
    "SELECT id, starttime, endtime, win_team_json, lose_team_json FROM rounds";

const SELECT_EVENT: &str =
    "SELECT id, round_id, time, type, data_json, subject_id, indirect_id FROM events";

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Connection,
    /// `None` for in-memory databases.
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        debug!(path = %path.display(), "sqlite store opened");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database (used in tests).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Database file path, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Look up a player row.
    pub fn player(&self, persistent_id: &PersistentId) -> Result<Option<StoredPlayer>, StoreError> {
        let player = self
            .conn
            .query_row(
                "SELECT persistent_id, name FROM players WHERE persistent_id = ?1",
                params![persistent_id.as_str()],
                |row| {
                    Ok(StoredPlayer {
                        persistent_id: PersistentId::new(row.get::<_, String>(0)?),
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(player)
    }

    /// Number of player rows.
    pub fn count_players(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Look up a round row.
    pub fn round(&self, id: RoundId) -> Result<Option<StoredRound>, StoreError> {
        let columns: Option<RoundColumns> = self
            .conn
            .query_row(
                &format!("{SELECT_ROUND} WHERE id = ?1"),
                params![id.0],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;
        columns.map(decode_round).transpose()
    }

    /// All rounds in id order.
    pub fn rounds(&self) -> Result<Vec<StoredRound>, StoreError> {
        let mut stmt = self.conn.prepare(&format!("{SELECT_ROUND} ORDER BY id ASC"))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?;

        let mut rounds = Vec::new();
        for row in rows {
            rounds.push(decode_round(row?)?);
        }
        Ok(rounds)
    }

    /// Events of one round in insertion order.
    pub fn events_for_round(&self, id: RoundId) -> Result<Vec<StoredEvent>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_EVENT} WHERE round_id = ?1 ORDER BY id ASC"))?;
        let rows = stmt.query_map(params![id.0], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(decode_event(row?)?);
        }
        Ok(events)
    }

    /// Total number of event rows.
    pub fn count_events(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

impl Store for SqliteStore {
    fn ensure_schema(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(&schema_sql())?;
        Ok(())
    }

    fn upsert_player(&mut self, persistent_id: &PersistentId, name: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO players (persistent_id, name) VALUES (?1, ?2)
             ON CONFLICT(persistent_id) DO UPDATE SET name = excluded.name",
            params![persistent_id.as_str(), name],
        )?;
        Ok(())
    }

    fn insert_round(&mut self, started_at: DateTime<Utc>) -> Result<RoundId, StoreError> {
        self.conn.execute(
            "INSERT INTO rounds (starttime) VALUES (?1)",
            params![format_time(started_at)],
        )?;
        Ok(RoundId(self.conn.last_insert_rowid()))
    }

    fn finalize_round(&mut self, round: &RoundFinalization) -> Result<bool, StoreError> {
        let win_team = serde_json::to_string(&round.win_team)?;
        let lose_team = serde_json::to_string(&round.lose_team)?;

        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE rounds SET endtime = ?1, win_team_json = ?2, lose_team_json = ?3
             WHERE id = ?4 AND endtime IS NULL",
            params![format_time(round.ended_at), win_team, lose_team, round.round_id.0],
        )?;
        tx.commit()?;

        Ok(changed == 1)
    }

    fn insert_event(&mut self, event: &NewEvent) -> Result<i64, StoreError> {
        let data = serde_json::to_string(&event.data)?;
        self.conn.execute(
            "INSERT INTO events (round_id, time, type, data_json, subject_id, indirect_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.round_id.0,
                format_time(event.time),
                event.event_type,
                data,
                event.subject_id.as_ref().map(PersistentId::as_str),
                event.indirect_id.as_ref().map(PersistentId::as_str),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Timestamp(format!("{raw}: {e}")))
}

fn parse_team(raw: Option<String>) -> Result<Option<Vec<PersistentId>>, StoreError> {
    raw.map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(StoreError::from)
}

fn decode_round(
    (id, starttime, endtime, win_team, lose_team): RoundColumns,
) -> Result<StoredRound, StoreError> {
    Ok(StoredRound {
        id: RoundId(id),
        started_at: parse_time(&starttime)?,
        ended_at: endtime.as_deref().map(parse_time).transpose()?,
        win_team: parse_team(win_team)?,
        lose_team: parse_team(lose_team)?,
    })
}

fn decode_event(
    (id, round_id, time, event_type, data, subject_id, indirect_id): EventColumns,
) -> Result<StoredEvent, StoreError> {
    let data: Payload = serde_json::from_str(&data)?;
    Ok(StoredEvent {
        id,
        round_id: RoundId(round_id),
        time: parse_time(&time)?,
        event_type,
        data,
        subject_id: subject_id.map(PersistentId::new),
        indirect_id: indirect_id.map(PersistentId::new),
    })
}
