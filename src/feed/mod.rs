//! Notification Feed
//!
//! Inbound side of the recorder: the notification wire format, the
//! dispatcher that drives a session from a line stream, and startup
//! reconciliation against the external roster query.

pub mod notification;
pub mod dispatch;
pub mod reconcile;

pub use notification::{GameNotification, Notification, NotificationError};
pub use dispatch::{DispatchStats, Dispatcher};
pub use reconcile::{load_roster_file, ConnectedPlayer, ConnectedPlayers, RosterFileError};
