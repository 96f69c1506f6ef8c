//! Session State
//!
//! In-memory view of the match. No I/O happens here except through the
//! [`Store`](crate::store::Store) handle passed into the operations that
//! need durable writes.
//!
//! ## Module Structure
//!
//! - `ids`: Identifier newtypes
//! - `roster`: Connection id to player identity
//! - `teams`: Team id to member connections
//! - `round`: Active round state machine

pub mod ids;
pub mod roster;
pub mod teams;
pub mod round;

// Re-export key types
pub use ids::{ConnectionId, PersistentId, RoundId, TeamId};
pub use roster::{Admission, Player, Roster};
pub use teams::{Assignment, TeamTracker};
pub use round::{ActiveRound, FinalizedRound, RoundEnd, RoundLifecycle, RoundPhase, StartedRound};
