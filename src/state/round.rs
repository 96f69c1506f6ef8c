//! Round Lifecycle
//!
//! Two-state machine: `Idle` (no round) and `Active` (round row open).
//!
//! ```text
//!            start_round                    start_round (abandons)
//!   Idle ───────────────────▶ Active ◀──────────────────┐
//!    ▲                          │  └────────────────────┘
//!    └──── end_round(known) ────┘
//!          end_round(draw/unknown): stays Active
//! ```
//!
//! Only `end_round` with a winner from the competing pair writes the end
//! time and team snapshots, and the store writes them at most once per row.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::state::ids::{PersistentId, RoundId, TeamId};
use crate::state::roster::Roster;
use crate::state::teams::TeamTracker;
use crate::store::{RoundFinalization, Store, StoreError};

/// The round currently open in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveRound {
    /// Store-assigned id.
    pub id: RoundId,
    /// `starttime` written to the row.
    pub started_at: DateTime<Utc>,
}

/// Lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RoundPhase {
    /// No round open.
    #[default]
    Idle,
    /// A round row is open.
    Active(ActiveRound),
}

/// Result of `start_round`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartedRound {
    /// The new active round.
    pub round: ActiveRound,
    /// The previous round, left open in the store.
    pub abandoned: Option<ActiveRound>,
}

/// A round that was just closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizedRound {
    /// Round id.
    pub round_id: RoundId,
    /// Winning team id.
    pub winner: TeamId,
    /// Losing team id.
    pub loser: TeamId,
    /// Winning snapshot as written.
    pub win_team: Vec<PersistentId>,
    /// Losing snapshot as written.
    pub lose_team: Vec<PersistentId>,
    /// Members dropped from the snapshots because the roster no longer knew them.
    pub omitted: usize,
}

/// Result of `end_round`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundEnd {
    /// Row updated; lifecycle is now Idle.
    Finalized(FinalizedRound),
    /// No round was active. Nothing written.
    NoActiveRound,
    /// Winner is not one of the competing teams (draw or malformed).
    /// Nothing written; the round stays Active.
    UnknownWinner {
        /// Round that stays open.
        round_id: RoundId,
        /// Reported winner, as sent on the feed.
        winner: i64,
    },
    /// Store found the row missing or already closed. Lifecycle is now Idle.
    AlreadyClosed {
        /// Round id that could not be updated.
        round_id: RoundId,
    },
}

/// Owns the identity and timing of the active round.
#[derive(Debug)]
pub struct RoundLifecycle {
    phase: RoundPhase,
    competing_teams: [TeamId; 2],
    reset_teams_on_start: bool,
}

impl RoundLifecycle {
    /// Create an idle lifecycle for the given competing pair.
    pub fn new(competing_teams: [TeamId; 2], reset_teams_on_start: bool) -> Self {
        Self {
            phase: RoundPhase::Idle,
            competing_teams,
            reset_teams_on_start,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// The active round, if any.
    pub fn active(&self) -> Option<ActiveRound> {
        match self.phase {
            RoundPhase::Active(round) => Some(round),
            RoundPhase::Idle => None,
        }
    }

    /// Id of the active round, if any.
    pub fn active_round_id(&self) -> Option<RoundId> {
        self.active().map(|round| round.id)
    }

    /// Check if a round is active.
    pub fn is_active(&self) -> bool {
        matches!(self.phase, RoundPhase::Active(_))
    }

    /// The team facing `team`, if `team` is one of the competing pair.
    pub fn opponent_of(&self, team: TeamId) -> Option<TeamId> {
        let [a, b] = self.competing_teams;
        if team == a {
            Some(b)
        } else if team == b {
            Some(a)
        } else {
            None
        }
    }

    /// Open a new round row. Callable from any phase.
    ///
    /// A previously active round is dropped without being finalized. If the
    /// insert fails the lifecycle is left Idle, so later events are dropped
    /// instead of landing in the abandoned round.
    pub fn start_round<S: Store>(
        &mut self,
        store: &mut S,
        teams: &mut TeamTracker,
        now: DateTime<Utc>,
    ) -> Result<StartedRound, StoreError> {
        let abandoned = self.active();
        self.phase = RoundPhase::Idle;

        if let Some(previous) = abandoned {
            warn!(round_id = %previous.id, "round abandoned without a result");
        }

        let id = store.insert_round(now)?;
        if self.reset_teams_on_start {
            teams.reset();
        }

        let round = ActiveRound { id, started_at: now };
        self.phase = RoundPhase::Active(round);
        info!(round_id = %id, "round started");

        Ok(StartedRound { round, abandoned })
    }

    /// Close the active round with a winner taken straight from the feed.
    ///
    /// A number that is not a team id is treated like any other unknown
    /// winner.
    pub fn end_round_wire<S: Store>(
        &mut self,
        store: &mut S,
        teams: &TeamTracker,
        roster: &Roster,
        winner: i64,
        now: DateTime<Utc>,
    ) -> Result<RoundEnd, StoreError> {
        if let Some(team) = TeamId::from_wire(winner) {
            return self.end_round(store, teams, roster, team, now);
        }

        let Some(round) = self.active() else {
            return Ok(RoundEnd::NoActiveRound);
        };
        info!(round_id = %round.id, winner, "round ended with an out-of-range winner");
        Ok(RoundEnd::UnknownWinner { round_id: round.id, winner })
    }

    /// Close the active round with `winner`.
    ///
    /// Draws, unknown winners and a missing round are absorbed as outcomes,
    /// never errors. Snapshot members the roster can no longer resolve are
    /// omitted. A store error leaves the round Active.
    pub fn end_round<S: Store>(
        &mut self,
        store: &mut S,
        teams: &TeamTracker,
        roster: &Roster,
        winner: TeamId,
        now: DateTime<Utc>,
    ) -> Result<RoundEnd, StoreError> {
        let Some(round) = self.active() else {
            return Ok(RoundEnd::NoActiveRound);
        };

        let Some(loser) = self.opponent_of(winner) else {
            info!(round_id = %round.id, winner = %winner, "round ended without a known winner");
            return Ok(RoundEnd::UnknownWinner { round_id: round.id, winner: i64::from(winner.0) });
        };

        let mut omitted = 0;
        let mut resolve_team = |team: TeamId| -> Vec<PersistentId> {
            let members = teams.snapshot(team);
            let resolved: Vec<PersistentId> = members
                .iter()
                .filter_map(|conn| roster.resolve(*conn).cloned())
                .collect();
            omitted += members.len() - resolved.len();
            resolved
        };
        let win_team = resolve_team(winner);
        let lose_team = resolve_team(loser);

        let finalization = RoundFinalization {
            round_id: round.id,
            ended_at: now,
            win_team,
            lose_team,
        };
        let written = store.finalize_round(&finalization)?;
        self.phase = RoundPhase::Idle;

        if !written {
            warn!(round_id = %round.id, "round row missing or already closed");
            return Ok(RoundEnd::AlreadyClosed { round_id: round.id });
        }

        info!(
            round_id = %round.id,
            winner = %winner,
            winners = finalization.win_team.len(),
            losers = finalization.lose_team.len(),
            "round finalized"
        );

        Ok(RoundEnd::Finalized(FinalizedRound {
            round_id: round.id,
            winner,
            loser,
            win_team: finalization.win_team,
            lose_team: finalization.lose_team,
            omitted,
        }))
    }
}
