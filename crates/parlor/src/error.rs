//! Unified error type for the Parlor client.

use parlor_channel::ChannelError;
use parlor_protocol::{ProtocolError, Serial, TableNum};
use parlor_table::TableError;
use parlor_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `parlor` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// variants let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ParlorError {
    /// Dialing or talking to the server failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The channel is closed or a write failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A table operation was refused locally, before anything was sent.
    #[error(transparent)]
    Table(#[from] TableError),

    /// The operation needs a logged-in session.
    #[error("not logged in")]
    NotLoggedIn,

    /// `login` was called twice.
    #[error("already logged in as {0}")]
    AlreadyLoggedIn(String),

    /// The local user holds no channel for this table.
    #[error("no open channel for table {0}")]
    UnknownTable(TableNum),

    /// No pending request carries this serial.
    #[error("no pending request {serial} at table {table}")]
    UnknownRequest { table: TableNum, serial: Serial },

    /// The server answered `connect` with an error.
    #[error("login rejected ({code}): {message}")]
    LoginRejected { code: i32, message: String },

    /// The server answered a request with an error.
    #[error("request rejected ({code}): {message}")]
    Rejected { code: i32, message: String },

    /// No reply arrived in time.
    #[error("timed out waiting for {0}")]
    TimedOut(&'static str),

    /// The connection went away while a reply was outstanding.
    #[error("disconnected")]
    Disconnected,
}
