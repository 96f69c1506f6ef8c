//! Notification Dispatch
//!
//! Feeds notifications into a [`SessionState`] one at a time. A notification
//! that cannot be decoded or whose write fails is logged and counted; the
//! next one is processed normally.

use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info, instrument, warn};

use crate::feed::notification::Notification;
use crate::recorder::session::{Handled, RecorderError, SessionState};
use crate::store::Store;

/// Dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Notifications handled.
    pub handled: u64,
    /// Notifications that could not be decoded.
    pub rejected: u64,
    /// Notifications whose store write failed.
    pub failed: u64,
}

/// Routes notifications into a session.
#[derive(Debug, Default)]
pub struct Dispatcher {
    stats: DispatchStats,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters so far.
    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Handle one notification. Errors are absorbed here.
    pub fn dispatch<S: Store>(
        &mut self,
        session: &mut SessionState<S>,
        notification: Notification,
    ) -> Option<Handled> {
        let name = notification.name.clone();
        match session.handle_notification(notification) {
            Ok(handled) => {
                self.stats.handled += 1;
                Some(handled)
            }
            Err(RecorderError::Notification(e)) => {
                self.stats.rejected += 1;
                warn!(notification = %name, error = %e, "notification rejected");
                None
            }
            Err(RecorderError::Store(e)) => {
                self.stats.failed += 1;
                error!(notification = %name, error = %e, "store write failed");
                None
            }
        }
    }

    /// Handle one line of newline-delimited JSON. Blank lines are skipped.
    pub fn dispatch_line<S: Store>(
        &mut self,
        session: &mut SessionState<S>,
        line: &str,
    ) -> Option<Handled> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match Notification::from_json(line) {
            Ok(notification) => self.dispatch(session, notification),
            Err(e) => {
                self.stats.rejected += 1;
                warn!(error = %e, "undecodable feed line skipped");
                None
            }
        }
    }

    /// Handle one raw feed line. Lines that are not UTF-8 are rejected.
    pub fn dispatch_bytes<S: Store>(
        &mut self,
        session: &mut SessionState<S>,
        line: &[u8],
    ) -> Option<Handled> {
        match std::str::from_utf8(line) {
            Ok(line) => self.dispatch_line(session, line),
            Err(e) => {
                self.stats.rejected += 1;
                warn!(error = %e, "non UTF-8 feed line skipped");
                None
            }
        }
    }

    /// Read notifications from `reader` until EOF or `shutdown` resolves.
    ///
    /// Only a failing reader ends the feed early; bad lines are skipped.
    #[instrument(skip_all)]
    pub async fn run<S, R, F>(
        &mut self,
        session: &mut SessionState<S>,
        mut reader: R,
        shutdown: F,
    ) -> std::io::Result<DispatchStats>
    where
        S: Store,
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let mut line = Vec::new();
        tokio::pin!(shutdown);

        loop {
            line.clear();
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                read = reader.read_until(b'\n', &mut line) => {
                    if read? == 0 {
                        info!("notification feed closed");
                        break;
                    }
                    self.dispatch_bytes(session, &line);
                }
            }
        }

        info!(
            handled = self.stats.handled,
            rejected = self.stats.rejected,
            failed = self.stats.failed,
            "dispatch stopped"
        );
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use crate::clock::StepClock;
    use crate::config::RecorderConfig;
    use crate::recorder::events::RecordOutcome;
    use crate::state::ids::{PersistentId, RoundId};
    use crate::store::{NewEvent, RoundFinalization, SqliteStore, StoreError};

    /// SQLite store whose round inserts can be made to fail.
    struct FlakyStore {
        inner: SqliteStore,
        fail_round_inserts: bool,
    }

    impl Store for FlakyStore {
        fn ensure_schema(&mut self) -> Result<(), StoreError> {
            self.inner.ensure_schema()
        }

        fn upsert_player(&mut self, persistent_id: &PersistentId, name: &str) -> Result<(), StoreError> {
            self.inner.upsert_player(persistent_id, name)
        }

        fn insert_round(&mut self, started_at: DateTime<Utc>) -> Result<RoundId, StoreError> {
            if self.fail_round_inserts {
                return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
            }
            self.inner.insert_round(started_at)
        }

        fn finalize_round(&mut self, round: &RoundFinalization) -> Result<bool, StoreError> {
            self.inner.finalize_round(round)
        }

        fn insert_event(&mut self, event: &NewEvent) -> Result<i64, StoreError> {
            self.inner.insert_event(event)
        }
    }

    fn session() -> SessionState<SqliteStore> {
        SessionState::with_clock(
            SqliteStore::in_memory().unwrap(),
            RecorderConfig::default(),
            Box::new(StepClock::new()),
        )
        .unwrap()
    }

    const FEED: &str = r#"
{"name": "player_connect", "data": {"userid": 1, "networkid": "STEAM_1:0:1", "name": "alice"}}
{"name": "player_connect", "data": {"userid": 2, "networkid": "STEAM_1:0:2", "name": "bob"}}
{"name": "round_start", "data": {}}
{"name": "player_team", "data": {"userid": 1, "team": 2, "oldteam": 0, "disconnect": false}}
{"name": "player_team", "data": {"userid": 2, "team": 3, "oldteam": 0, "disconnect": false}}
this line is garbage
{"name": "player_death", "data": {"userid": 2, "attacker": 1, "weapon": "m4a1"}}
{"name": "round_end", "data": {}}
{"name": "round_end", "data": {"winner": 2}}
"#;

    #[tokio::test]
    async fn test_run_until_eof() {
        let mut session = session();
        let mut dispatcher = Dispatcher::new();

        let stats = dispatcher
            .run(&mut session, tokio::io::BufReader::new(FEED.as_bytes()), std::future::pending())
            .await
            .unwrap();

        assert_eq!(stats, DispatchStats { handled: 7, rejected: 2, failed: 0 });

        let rounds = session.store().rounds().unwrap();
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].win_team, Some(vec![PersistentId::new("STEAM_1:0:1")]));
        assert_eq!(rounds[0].lose_team, Some(vec![PersistentId::new("STEAM_1:0:2")]));
        assert_eq!(session.store().count_events().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_reading() {
        let mut session = session();
        let mut dispatcher = Dispatcher::new();

        let stats = dispatcher
            .run(&mut session, tokio::io::BufReader::new(FEED.as_bytes()), async {})
            .await
            .unwrap();

        assert_eq!(stats, DispatchStats::default());
        assert!(session.roster().is_empty());
    }

    #[tokio::test]
    async fn test_non_utf8_line_is_skipped() {
        let mut session = session();
        let mut dispatcher = Dispatcher::new();

        let mut feed = br#"{"name": "round_start", "data": {}}"#.to_vec();
        feed.extend_from_slice(b"\n\xff\xfe garbage\n");
        feed.extend_from_slice(
            br#"{"name": "player_connect", "data": {"userid": 1, "networkid": "STEAM_1:0:1", "name": "alice"}}"#,
        );

        let stats = dispatcher
            .run(&mut session, tokio::io::BufReader::new(feed.as_slice()), std::future::pending())
            .await
            .unwrap();

        assert_eq!(stats, DispatchStats { handled: 2, rejected: 1, failed: 0 });
        assert!(session.rounds().is_active());
        assert!(session.roster().contains(crate::state::ids::ConnectionId::new(1)));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut session = session();
        let mut dispatcher = Dispatcher::new();
        assert!(dispatcher.dispatch_line(&mut session, "   ").is_none());
        assert_eq!(dispatcher.stats(), DispatchStats::default());
    }

    #[test]
    fn test_store_failure_does_not_stop_dispatch() {
        let store = FlakyStore {
            inner: SqliteStore::in_memory().unwrap(),
            fail_round_inserts: true,
        };
        let mut session =
            SessionState::with_clock(store, RecorderConfig::default(), Box::new(StepClock::new())).unwrap();
        let mut dispatcher = Dispatcher::new();

        dispatcher.dispatch_line(
            &mut session,
            r#"{"name": "player_connect", "data": {"userid": 1, "networkid": "STEAM_1:0:1", "name": "alice"}}"#,
        );
        assert!(dispatcher.dispatch_line(&mut session, r#"{"name": "round_start"}"#).is_none());
        let after = dispatcher.dispatch_line(
            &mut session,
            r#"{"name": "weapon_fire", "data": {"userid": 1}}"#,
        );

        assert_eq!(after, Some(Handled::Event(RecordOutcome::NoActiveRound)));
        assert_eq!(dispatcher.stats(), DispatchStats { handled: 2, rejected: 0, failed: 1 });
        assert!(!session.rounds().is_active());
        assert!(session.roster().contains(crate::state::ids::ConnectionId::new(1)));
    }
}
