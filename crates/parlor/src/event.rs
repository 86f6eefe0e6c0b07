//! What a session tells its UI.

use parlor_channel::DisconnectReason;
use parlor_protocol::TableNum;

/// Session-level notifications. Lobby and table changes are published by
/// the replicated objects themselves; these cover everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The lobby snapshot arrived and the replica is built.
    LoggedIn { username: String },
    /// Something did not happen. Never fatal.
    Status(StatusEvent),
    /// Terminal. The replica has been dropped.
    Disconnected(DisconnectReason),
}

/// A non-fatal failure worth showing to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// The server sent an `error` element.
    ServerError { code: i32, message: String },
    /// An inbound frame could not be decoded.
    Dropped { reason: String },
    /// A message arrived for a table this client does not know.
    Unroutable { tag: &'static str, table: Option<TableNum> },
    /// The server's echo moved these users out of a seat the local replica
    /// had given them.
    SeatCorrected { table: TableNum, evicted: Vec<String> },
}
