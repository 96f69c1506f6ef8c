//! Team Membership
//!
//! Team id to the set of connections currently on that team.
//!
//! Upstream notifications can arrive late, twice, or not at all, so every
//! removal here is "remove if present", never a failure. A connection is on
//! at most one team at any time regardless of what the `oldteam` hints say.

use std::collections::{BTreeMap, BTreeSet};

use crate::state::ids::{ConnectionId, TeamId};

/// Result of an [`TeamTracker::assign`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assignment {
    /// Team the connection was actually on before this call.
    pub previous: Option<TeamId>,
    /// The caller's old-team hint disagreed with tracked membership.
    pub stale_hint: bool,
}

/// Team id to member connections.
#[derive(Debug, Default, Clone)]
pub struct TeamTracker {
    teams: BTreeMap<TeamId, BTreeSet<ConnectionId>>,
}

impl TeamTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a connection onto `new_team`.
    ///
    /// `old_team` is only a hint: the connection is taken off whatever team
    /// it is really on. Repeating the same assignment changes nothing.
    pub fn assign(
        &mut self,
        connection_id: ConnectionId,
        new_team: TeamId,
        old_team: Option<TeamId>,
    ) -> Assignment {
        let previous = self.team_of(connection_id);

        let stale_hint = match (old_team, previous) {
            (Some(hint), Some(actual)) => hint != actual,
            // Leaving a team it was never recorded in.
            (Some(hint), None) => !hint.is_sentinel(),
            (None, _) => false,
        };

        if let Some(hint) = old_team {
            self.remove_if_present(hint, connection_id);
        }
        self.unassign_everywhere(connection_id);
        self.teams.entry(new_team).or_default().insert(connection_id);

        Assignment { previous, stale_hint }
    }

    /// Remove one connection from one team. Returns whether it was there.
    pub fn remove_if_present(&mut self, team: TeamId, connection_id: ConnectionId) -> bool {
        let Some(members) = self.teams.get_mut(&team) else {
            return false;
        };
        let removed = members.remove(&connection_id);
        if members.is_empty() {
            self.teams.remove(&team);
        }
        removed
    }

    /// Remove a connection from every team. Returns the team it was on.
    pub fn unassign_everywhere(&mut self, connection_id: ConnectionId) -> Option<TeamId> {
        let mut found = None;
        self.teams.retain(|team, members| {
            if members.remove(&connection_id) {
                found = Some(*team);
            }
            !members.is_empty()
        });
        found
    }

    /// Clear all teams.
    pub fn reset(&mut self) {
        self.teams.clear();
    }

    /// Members of a team in connection id order. Empty for unknown teams.
    pub fn snapshot(&self, team: TeamId) -> Vec<ConnectionId> {
        self.teams
            .get(&team)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Team a connection is on.
    pub fn team_of(&self, connection_id: ConnectionId) -> Option<TeamId> {
        self.teams
            .iter()
            .find(|(_, members)| members.contains(&connection_id))
            .map(|(team, _)| *team)
    }

    /// Teams with at least one member.
    pub fn populated_teams(&self) -> impl Iterator<Item = TeamId> + '_ {
        self.teams.keys().copied()
    }

    /// Number of members on a team.
    pub fn team_size(&self, team: TeamId) -> usize {
        self.teams.get(&team).map_or(0, BTreeSet::len)
    }

    /// Total tracked memberships.
    pub fn member_count(&self) -> usize {
        self.teams.values().map(BTreeSet::len).sum()
    }
}
