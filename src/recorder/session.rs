//! Recording Session
//!
//! [`SessionState`] is the one explicit owner of everything the recorder
//! knows about the running match: roster, team membership, active round and
//! the store handle. It is created with [`SessionState::open`], handed to the
//! dispatcher, and torn down with [`SessionState::close`].
//!
//! Handlers run one at a time to completion. Unknown references and invalid
//! lifecycle states come back as outcomes; only store failures are `Err`.

use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::RecorderConfig;
use crate::feed::notification::{GameNotification, Notification, NotificationError};
use crate::feed::reconcile::ConnectedPlayers;
use crate::recorder::events::{EventRecorder, GameplayEvent, RecordOutcome};
use crate::state::ids::{ConnectionId, PersistentId, TeamId};
use crate::state::roster::{Admission, Player, Roster};
use crate::state::round::{RoundEnd, RoundLifecycle, StartedRound};
use crate::state::teams::{Assignment, TeamTracker};
use crate::store::{Store, StoreError};

/// Recorder errors.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// Durable write failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Notification could not be decoded.
    #[error("notification error: {0}")]
    Notification(#[from] NotificationError),
}

/// Counters reported when the session closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Round rows inserted.
    pub rounds_started: u64,
    /// Round rows closed with a result.
    pub rounds_finalized: u64,
    /// Rounds left open by a following round start.
    pub rounds_abandoned: u64,
    /// Round ends ignored (draw or unknown winner).
    pub rounds_unresolved: u64,
    /// Event rows appended.
    pub events_recorded: u64,
    /// Events dropped outside a round.
    pub events_dropped: u64,
}

/// What a disconnect removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnection {
    /// Player that was in the roster, if any.
    pub player: Option<Player>,
    /// Team the connection was on, if any.
    pub team: Option<TeamId>,
}

/// What a team notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamChange {
    /// Connection moved onto a team.
    Assigned {
        /// New team.
        team: TeamId,
        /// Tracker result.
        assignment: Assignment,
    },
    /// Connection left its team without joining another.
    Left {
        /// Team it was on, if tracked.
        team: Option<TeamId>,
    },
}

/// Result of handling one notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    /// Player connect.
    Connected(Admission),
    /// Player disconnect.
    Disconnected(Disconnection),
    /// Team change.
    Team(TeamChange),
    /// Round start.
    RoundStarted(StartedRound),
    /// Round end.
    RoundEnded(RoundEnd),
    /// Gameplay event.
    Event(RecordOutcome),
    /// Notification not recorded.
    Ignored,
}

/// Live recorder state for one match.
pub struct SessionState<S: Store> {
    store: S,
    config: RecorderConfig,
    clock: Box<dyn Clock>,
    roster: Roster,
    teams: TeamTracker,
    rounds: RoundLifecycle,
    events: EventRecorder,
    stats: SessionStats,
}

impl<S: Store> SessionState<S> {
    /// Open a session on `store`, ensuring the schema exists.
    pub fn open(store: S, config: RecorderConfig) -> Result<Self, StoreError> {
        Self::with_clock(store, config, Box::new(SystemClock))
    }

    /// Open a session with an explicit clock.
    #[instrument(skip_all)]
    pub fn with_clock(
        mut store: S,
        config: RecorderConfig,
        clock: Box<dyn Clock>,
    ) -> Result<Self, StoreError> {
        store.ensure_schema()?;
        info!(
            teams = ?config.competing_teams,
            reset_teams = config.reset_teams_on_round_start,
            tracked_events = config.tracked_events.len(),
            "recording session opened"
        );

        let rounds = RoundLifecycle::new(config.competing_teams, config.reset_teams_on_round_start);
        Ok(Self {
            store,
            config,
            clock,
            roster: Roster::new(),
            teams: TeamTracker::new(),
            rounds,
            events: EventRecorder::new(),
            stats: SessionStats::default(),
        })
    }

    /// Seed roster and teams with players already connected.
    ///
    /// Returns the number of players seeded.
    pub fn reconcile(&mut self, source: &(impl ConnectedPlayers + ?Sized)) -> Result<usize, StoreError> {
        let players = source.connected_players();
        for player in &players {
            self.player_connected(player.userid, player.networkid.clone(), &player.name)?;
            if let Some(team) = player.team {
                self.teams.assign(player.userid, team, None);
            }
        }
        info!(players = players.len(), "roster reconciled");
        Ok(players.len())
    }

    /// Decode, classify and handle a raw notification.
    pub fn handle_notification(&mut self, notification: Notification) -> Result<Handled, RecorderError> {
        let classified = notification.classify(&self.config)?;
        Ok(self.handle(classified)?)
    }

    /// Handle a classified notification.
    pub fn handle(&mut self, notification: GameNotification) -> Result<Handled, StoreError> {
        match notification {
            GameNotification::PlayerConnect(connect) => self
                .player_connected(connect.userid, connect.networkid, &connect.name)
                .map(Handled::Connected),
            GameNotification::PlayerDisconnect(disconnect) => {
                Ok(Handled::Disconnected(self.player_disconnected(disconnect.userid)))
            }
            GameNotification::PlayerTeam(change) => Ok(Handled::Team(self.player_team(
                change.userid,
                change.team,
                change.oldteam,
                change.disconnect,
            ))),
            GameNotification::RoundStart => self.round_started().map(Handled::RoundStarted),
            GameNotification::RoundEnd(end) => self.round_ended_wire(end.winner).map(Handled::RoundEnded),
            GameNotification::Gameplay(event) => self.record_event(event).map(Handled::Event),
            GameNotification::Ignored { name } => {
                debug!(notification = %name, "notification ignored");
                Ok(Handled::Ignored)
            }
        }
    }

    /// Player connected (or refreshed its attributes).
    pub fn player_connected(
        &mut self,
        connection_id: ConnectionId,
        persistent_id: PersistentId,
        display_name: &str,
    ) -> Result<Admission, StoreError> {
        let admission = self
            .roster
            .add_or_update(&mut self.store, connection_id, persistent_id, display_name)?;

        match &admission {
            Admission::Refreshed => {}
            Admission::Joined => {
                // Nothing a previous occupant of this connection id left behind survives.
                self.teams.unassign_everywhere(connection_id);
                debug!(connection_id = %connection_id, player = display_name, "player connected");
            }
            Admission::Replaced { previous } => {
                self.teams.unassign_everywhere(connection_id);
                warn!(
                    connection_id = %connection_id,
                    previous = %previous,
                    player = display_name,
                    "connection reused without a disconnect"
                );
            }
        }

        Ok(admission)
    }

    /// Player disconnected. Unknown connections are a no-op.
    pub fn player_disconnected(&mut self, connection_id: ConnectionId) -> Disconnection {
        let team = self.teams.unassign_everywhere(connection_id);
        let player = self.roster.remove(connection_id);

        match &player {
            Some(player) => debug!(
                connection_id = %connection_id,
                player = %player.display_name,
                "player disconnected"
            ),
            None => debug!(connection_id = %connection_id, "disconnect for untracked connection"),
        }

        Disconnection { player, team }
    }

    /// Player changed team. With `disconnect` set the player only leaves.
    pub fn player_team(
        &mut self,
        connection_id: ConnectionId,
        team: TeamId,
        old_team: Option<TeamId>,
        disconnect: bool,
    ) -> TeamChange {
        let player_name = self.roster.display_name(connection_id).unwrap_or("<unknown>");

        if disconnect {
            let left = self.teams.unassign_everywhere(connection_id);
            debug!(connection_id = %connection_id, player = player_name, team = ?left, "player left team");
            return TeamChange::Left { team: left };
        }

        let assignment = self.teams.assign(connection_id, team, old_team);
        if assignment.stale_hint {
            debug!(
                connection_id = %connection_id,
                player = player_name,
                hint = ?old_team,
                tracked = ?assignment.previous,
                "old team hint did not match tracked membership"
            );
        }
        debug!(connection_id = %connection_id, player = player_name, team = %team, "player joined team");

        TeamChange::Assigned { team, assignment }
    }

    /// Round started.
    pub fn round_started(&mut self) -> Result<StartedRound, StoreError> {
        let now = self.clock.now();
        let started = self.rounds.start_round(&mut self.store, &mut self.teams, now)?;

        self.stats.rounds_started += 1;
        if started.abandoned.is_some() {
            self.stats.rounds_abandoned += 1;
        }
        Ok(started)
    }

    /// Round ended with `winner`.
    pub fn round_ended(&mut self, winner: TeamId) -> Result<RoundEnd, StoreError> {
        self.round_ended_wire(i64::from(winner.0))
    }

    /// Round ended with the winner number exactly as the feed sent it.
    pub fn round_ended_wire(&mut self, winner: i64) -> Result<RoundEnd, StoreError> {
        let now = self.clock.now();
        let end = self
            .rounds
            .end_round_wire(&mut self.store, &self.teams, &self.roster, winner, now)?;

        match &end {
            RoundEnd::Finalized(_) => self.stats.rounds_finalized += 1,
            RoundEnd::UnknownWinner { .. } => self.stats.rounds_unresolved += 1,
            RoundEnd::NoActiveRound => debug!(winner, "round end with no active round"),
            RoundEnd::AlreadyClosed { .. } => {}
        }
        Ok(end)
    }

    /// Record a gameplay event in the active round.
    pub fn record_event(&mut self, event: GameplayEvent) -> Result<RecordOutcome, StoreError> {
        let now = self.clock.now();
        self.events
            .record(&mut self.store, &self.rounds, &self.roster, event, now)
    }

    /// Roster.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Team membership.
    pub fn teams(&self) -> &TeamTracker {
        &self.teams
    }

    /// Round lifecycle.
    pub fn rounds(&self) -> &RoundLifecycle {
        &self.rounds
    }

    /// Store handle.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Configuration.
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Counters so far.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            events_recorded: self.events.recorded(),
            events_dropped: self.events.dropped(),
            ..self.stats
        }
    }

    /// Close the session and hand back the store.
    ///
    /// An active round is left open in the store.
    pub fn close(self) -> (S, SessionStats) {
        let stats = self.stats();
        if let Some(round) = self.rounds.active() {
            warn!(round_id = %round.id, "session closed mid-round");
        }
        info!(
            rounds_started = stats.rounds_started,
            rounds_finalized = stats.rounds_finalized,
            rounds_abandoned = stats.rounds_abandoned,
            rounds_unresolved = stats.rounds_unresolved,
            events_recorded = stats.events_recorded,
            events_dropped = stats.events_dropped,
            "recording session closed"
        );
        (self.store, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::clock::StepClock;
    use crate::feed::reconcile::ConnectedPlayer;
    use crate::state::ids::RoundId;
    use crate::store::{Payload, SqliteStore};

    const A: TeamId = TeamId(2);
    const B: TeamId = TeamId(3);

    fn session_with(config: RecorderConfig) -> SessionState<SqliteStore> {
        let store = SqliteStore::in_memory().unwrap();
        SessionState::with_clock(store, config, Box::new(StepClock::new())).unwrap()
    }

    fn session() -> SessionState<SqliteStore> {
        session_with(RecorderConfig::default())
    }

    fn keep_teams() -> RecorderConfig {
        RecorderConfig {
            reset_teams_on_round_start: false,
            ..RecorderConfig::default()
        }
    }

    fn c(raw: u32) -> ConnectionId {
        ConnectionId::new(raw)
    }

    fn pid(raw: u32) -> PersistentId {
        PersistentId::new(format!("STEAM_1:0:{raw}"))
    }

    fn connect(session: &mut SessionState<SqliteStore>, raw: u32, team: TeamId) {
        session.player_connected(c(raw), pid(raw), &format!("player{raw}")).unwrap();
        session.player_team(c(raw), team, Some(TeamId::UNASSIGNED), false);
    }

    fn notify(session: &mut SessionState<SqliteStore>, raw: serde_json::Value) -> Handled {
        let notification: Notification = serde_json::from_value(raw).unwrap();
        session.handle_notification(notification).unwrap()
    }

    fn finalized_round(session: &SessionState<SqliteStore>, id: RoundId) -> crate::store::StoredRound {
        session.store().round(id).unwrap().unwrap()
    }

    #[test]
    fn test_open_ensures_schema() {
        let session = session();
        assert!(session.store().rounds().unwrap().is_empty());
        assert!(!session.rounds().is_active());
    }

    #[test]
    fn test_round_finalization_correctness() {
        let mut session = session();
        let started = session.round_started().unwrap();

        // Teams picked after the round started (teams reset at start).
        connect(&mut session, 1, A);
        connect(&mut session, 2, A);
        connect(&mut session, 3, B);

        let end = session.round_ended(A).unwrap();
        assert!(matches!(end, RoundEnd::Finalized(_)));

        let row = finalized_round(&session, started.round.id);
        assert_eq!(row.win_team, Some(vec![pid(1), pid(2)]));
        assert_eq!(row.lose_team, Some(vec![pid(3)]));
        assert!(row.ended_at.unwrap() > row.started_at);
        assert!(!session.rounds().is_active());
    }

    #[test]
    fn test_unknown_winner_leaves_round_active() {
        let mut session = session();
        let started = session.round_started().unwrap();
        connect(&mut session, 1, A);

        let end = session.round_ended(TeamId(99)).unwrap();

        assert!(matches!(end, RoundEnd::UnknownWinner { .. }));
        assert_eq!(session.rounds().active_round_id(), Some(started.round.id));
        let row = finalized_round(&session, started.round.id);
        assert!(row.is_open());
        assert_eq!(row.win_team, None);
        assert_eq!(session.stats().rounds_unresolved, 1);
    }

    #[test]
    fn test_dropped_event_outside_round() {
        let mut session = session();
        connect(&mut session, 1, A);

        let mut data = Payload::new();
        data.insert("userid".into(), json!(1));
        data.insert("weapon".into(), json!("deagle"));
        let outcome = session
            .record_event(GameplayEvent::from_payload("weapon_fire", data))
            .unwrap();

        assert_eq!(outcome, RecordOutcome::NoActiveRound);
        assert_eq!(session.store().count_events().unwrap(), 0);
        assert_eq!(session.stats().events_dropped, 1);
    }

    #[test]
    fn test_disconnect_during_round_excluded_from_snapshot() {
        let mut session = session_with(keep_teams());
        connect(&mut session, 1, A);
        connect(&mut session, 2, A);
        let started = session.round_started().unwrap();

        let gone = session.player_disconnected(c(2));
        assert_eq!(gone.team, Some(A));
        assert_eq!(gone.player.map(|p| p.persistent_id), Some(pid(2)));

        session.round_ended(A).unwrap();
        let row = finalized_round(&session, started.round.id);
        assert_eq!(row.win_team, Some(vec![pid(1)]));
        // Durable player row retained for history.
        assert!(session.store().player(&pid(2)).unwrap().is_some());
    }

    #[test]
    fn test_reconnect_with_new_identity_is_new_player() {
        let mut session = session_with(keep_teams());
        connect(&mut session, 7, A);
        session.player_disconnected(c(7));

        let admission = session
            .player_connected(c(7), PersistentId::new("someone-else"), "newcomer")
            .unwrap();
        assert_eq!(admission, Admission::Joined);
        assert_eq!(session.teams().team_of(c(7)), None);

        let started = session.round_started().unwrap();
        session.round_ended(A).unwrap();
        let row = finalized_round(&session, started.round.id);
        assert_eq!(row.win_team, Some(vec![]));
    }

    #[test]
    fn test_reused_connection_without_disconnect_purges_team() {
        let mut session = session_with(keep_teams());
        connect(&mut session, 7, A);

        let admission = session
            .player_connected(c(7), PersistentId::new("someone-else"), "newcomer")
            .unwrap();

        assert_eq!(admission, Admission::Replaced { previous: pid(7) });
        assert_eq!(session.teams().team_of(c(7)), None);
    }

    #[test]
    fn test_connect_twice_is_idempotent() {
        let mut session = session_with(keep_teams());
        connect(&mut session, 1, A);
        let admission = session.player_connected(c(1), pid(1), "player1").unwrap();

        assert_eq!(admission, Admission::Refreshed);
        assert_eq!(session.roster().len(), 1);
        assert_eq!(session.teams().team_of(c(1)), Some(A));
        assert_eq!(session.store().count_players().unwrap(), 1);
    }

    #[test]
    fn test_team_disconnect_flag_only_leaves() {
        let mut session = session_with(keep_teams());
        connect(&mut session, 1, A);

        let change = session.player_team(c(1), TeamId::UNASSIGNED, Some(A), true);

        assert_eq!(change, TeamChange::Left { team: Some(A) });
        assert_eq!(session.teams().team_of(c(1)), None);
        assert!(session.roster().contains(c(1)));
    }

    #[test]
    fn test_untracked_disconnect_is_noop() {
        let mut session = session();
        let gone = session.player_disconnected(c(42));
        assert_eq!(gone, Disconnection { player: None, team: None });

        let change = session.player_team(c(42), TeamId::UNASSIGNED, Some(B), true);
        assert_eq!(change, TeamChange::Left { team: None });
    }

    #[test]
    fn test_events_scope_to_active_round() {
        let mut session = session();
        let first = session.round_started().unwrap();
        connect(&mut session, 1, A);
        connect(&mut session, 2, B);

        notify(&mut session, json!({"name": "player_hurt", "data": {"userid": 2, "attacker": 1, "dmg_health": 27}}));
        notify(&mut session, json!({"name": "player_death", "data": {"userid": 2, "attacker": 1, "weapon": "ak47"}}));

        let second = session.round_started().unwrap();
        notify(&mut session, json!({"name": "weapon_fire", "data": {"userid": 1, "weapon": "ak47"}}));

        let first_events = session.store().events_for_round(first.round.id).unwrap();
        assert_eq!(first_events.len(), 2);
        assert_eq!(first_events[1].event_type, "player_death");
        assert_eq!(first_events[1].subject_id, Some(pid(2)));
        assert_eq!(first_events[1].indirect_id, Some(pid(1)));
        assert_eq!(first_events[1].data.get("weapon"), Some(&json!("ak47")));

        assert_eq!(session.store().events_for_round(second.round.id).unwrap().len(), 1);
        assert_eq!(session.stats().rounds_abandoned, 1);
    }

    #[test]
    fn test_full_notification_flow() {
        let mut session = session();

        notify(&mut session, json!({"name": "player_connect", "data": {"userid": 1, "networkid": "STEAM_1:0:1", "name": "alice"}}));
        notify(&mut session, json!({"name": "player_connect_client", "data": {"userid": 1, "networkid": "STEAM_1:0:1", "name": "alice"}}));
        notify(&mut session, json!({"name": "player_connect", "data": {"userid": 2, "networkid": "STEAM_1:0:2", "name": "bob"}}));

        let started = match notify(&mut session, json!({"name": "round_start", "data": {"timelimit": 115}})) {
            Handled::RoundStarted(started) => started,
            other => panic!("expected round start, got {other:?}"),
        };

        notify(&mut session, json!({"name": "player_team", "data": {"userid": 1, "team": 3, "oldteam": 0, "disconnect": false}}));
        notify(&mut session, json!({"name": "player_team", "data": {"userid": 2, "team": 2, "oldteam": 0, "disconnect": false}}));
        notify(&mut session, json!({"name": "bomb_planted", "data": {"userid": 2, "site": 1}}));
        notify(&mut session, json!({"name": "player_footstep", "data": {"userid": 2}}));
        notify(&mut session, json!({"name": "round_end", "data": {"winner": 3, "reason": 7}}));
        notify(&mut session, json!({"name": "weapon_fire", "data": {"userid": 1}}));

        let row = finalized_round(&session, started.round.id);
        assert_eq!(row.win_team, Some(vec![pid(1)]));
        assert_eq!(row.lose_team, Some(vec![pid(2)]));
        assert_eq!(session.store().count_events().unwrap(), 1);

        let (store, stats) = session.close();
        assert_eq!(store.count_players().unwrap(), 2);
        assert_eq!(stats.rounds_started, 1);
        assert_eq!(stats.rounds_finalized, 1);
        assert_eq!(stats.events_recorded, 1);
        assert_eq!(stats.events_dropped, 1);
    }

    #[test]
    fn test_out_of_range_winner_counts_as_unresolved() {
        let mut session = session();
        let started = session.round_started().unwrap();
        connect(&mut session, 1, A);

        for winner in [-1, 256] {
            let handled = notify(&mut session, json!({"name": "round_end", "data": {"winner": winner}}));
            assert_eq!(
                handled,
                Handled::RoundEnded(RoundEnd::UnknownWinner { round_id: started.round.id, winner })
            );
        }

        assert!(session.rounds().is_active());
        assert!(finalized_round(&session, started.round.id).is_open());
        assert_eq!(session.stats().rounds_unresolved, 2);
    }

    #[test]
    fn test_malformed_notification_is_error() {
        let mut session = session();
        let result = session.handle_notification(Notification::new("round_end", Payload::new()));
        assert!(matches!(result, Err(RecorderError::Notification(_))));
    }

    #[test]
    fn test_reconcile_seeds_roster_and_teams() {
        let mut session = session_with(keep_teams());
        let connected = vec![
            ConnectedPlayer { userid: c(1), networkid: pid(1), name: "alice".into(), team: Some(A) },
            ConnectedPlayer { userid: c(2), networkid: pid(2), name: "bob".into(), team: Some(B) },
            ConnectedPlayer { userid: c(3), networkid: pid(3), name: "carol".into(), team: None },
        ];

        assert_eq!(session.reconcile(&connected).unwrap(), 3);
        assert_eq!(session.roster().len(), 3);
        assert_eq!(session.teams().snapshot(A), vec![c(1)]);
        assert_eq!(session.store().count_players().unwrap(), 3);

        let started = session.round_started().unwrap();
        session.round_ended(B).unwrap();
        let row = finalized_round(&session, started.round.id);
        assert_eq!(row.win_team, Some(vec![pid(2)]));
        assert_eq!(row.lose_team, Some(vec![pid(1)]));
    }

    #[test]
    fn test_round_state_invariant_through_sequence() {
        let mut session = session();
        let winners = [A, TeamId(99), B, TeamId::SPECTATOR, A];

        for winner in winners {
            session.round_started().unwrap();
            session.round_ended(winner).unwrap();

            for row in session.store().rounds().unwrap() {
                let active = session.rounds().active_round_id() == Some(row.id);
                // The active round is never closed in the store.
                if active {
                    assert!(row.is_open());
                }
            }
            if let Some(id) = session.rounds().active_round_id() {
                assert!(finalized_round(&session, id).is_open());
            }
        }

        let stats = session.stats();
        assert_eq!(stats.rounds_finalized, 3);
        assert_eq!(stats.rounds_unresolved, 2);
        assert_eq!(stats.rounds_abandoned, 2);
    }
}
