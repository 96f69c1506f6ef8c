//! # Match Recorder
//!
//! Session-state tracker and durable round/event recorder for one live
//! multiplayer match.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      MATCH RECORDER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  state/          - In-memory session state                   │
//! │  ├── ids.rs      - Connection/persistent/team/round ids      │
//! │  ├── roster.rs   - Connection id -> player identity          │
//! │  ├── teams.rs    - Team id -> member connections             │
//! │  └── round.rs    - Active round state machine                │
//! │                                                              │
//! │  recorder/       - Orchestration                             │
//! │  ├── events.rs   - Round-scoped event rows                   │
//! │  └── session.rs  - SessionState: open, handlers, close       │
//! │                                                              │
//! │  store/          - Persistence gateway                       │
//! │  ├── schema.rs   - players / rounds / events DDL             │
//! │  └── sqlite.rs   - rusqlite backend                          │
//! │                                                              │
//! │  feed/           - Inbound notifications                     │
//! │  ├── notification.rs - Wire format and classification        │
//! │  ├── dispatch.rs - Line-stream dispatcher                    │
//! │  └── reconcile.rs- Startup roster seeding                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//!
//! Notifications arrive one at a time and are handled to completion. Roster
//! and team state update in memory; round start/end open and close round
//! rows; gameplay events are written against the open round, resolving
//! participants through the roster at write time.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod feed;
pub mod recorder;
pub mod state;
pub mod store;

// Re-export commonly used types
pub use config::RecorderConfig;
pub use feed::{Dispatcher, Notification};
pub use recorder::{GameplayEvent, SessionState, SessionStats};
pub use state::{ConnectionId, PersistentId, RoundId, TeamId};
pub use store::{SqliteStore, Store, StoreError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
