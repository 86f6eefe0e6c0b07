//! Error types for the table layer.

use parlor_protocol::{SeatNum, TableNum};

/// A lifecycle precondition that failed locally, before anything was sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// The table is not in the table list.
    #[error("table {0} not found")]
    NotFound(TableNum),

    /// The user has not joined this table.
    #[error("{username} is not at table {table}")]
    NotAtTable { table: TableNum, username: String },

    /// Sitting down requires being unseated first.
    #[error("already seated at {0}")]
    AlreadySeated(SeatNum),

    /// Someone else holds the seat.
    #[error("{seat} is taken by {by}")]
    SeatOccupied { seat: SeatNum, by: String },

    /// The seat number is outside `[0, seats)`.
    #[error("{seat} is out of range for a {seats}-seat table")]
    SeatOutOfRange { seat: SeatNum, seats: u32 },

    /// The operation is not allowed while a game runs at this table.
    #[error("a game is in progress at table {0}")]
    GameInProgress(TableNum),

    /// The operation needs a seat.
    #[error("not seated")]
    NotSeated,

    /// Ready was already declared.
    #[error("already ready")]
    AlreadyReady,

    /// Not enough seated players to declare ready.
    #[error("{seated} seated, {required} required")]
    TooFewPlayers { seated: usize, required: u32 },

    /// The operation needs a running game the user plays in.
    #[error("not playing")]
    NotPlaying,

    /// A draw offer must go to another user at the same table.
    #[error("{recipient} is not at table {table}")]
    RecipientNotAtTable { table: TableNum, recipient: String },

    /// Requests cannot be addressed to oneself.
    #[error("cannot address {0} to yourself")]
    InvalidRecipient(&'static str),
}
