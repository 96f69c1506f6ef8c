//! Recorder
//!
//! Orchestration of the session state against the store.
//!
//! - `events`: Round-scoped event rows
//! - `session`: Explicit session object with notification handlers

pub mod events;
pub mod session;

pub use events::{EventRecorder, GameplayEvent, RecordOutcome};
pub use session::{Disconnection, Handled, RecorderError, SessionState, SessionStats, TeamChange};
