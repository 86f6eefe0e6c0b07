//! The game-specific capability interface.
//!
//! The sync layer knows nothing about any particular game. A
//! [`GameModule`] creates one [`GameController`] per table the local user
//! sits at; the controller receives the opaque `controller-*` payloads and
//! the start/end of each game, and answers with payloads of its own that
//! the coordinator sends to the same table.

use parlor_protocol::{Element, GameOver, Message, SeatNum, TableNum};

use crate::Table;

/// A game-specific payload the sync layer passes through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpaqueMessage {
    Property {
        name: String,
        value: String,
    },
    Object {
        name: Option<String>,
        children: Vec<Element>,
    },
}

impl OpaqueMessage {
    /// Extracts the payload of a `controller-*` message.
    pub fn from_message(message: &Message) -> Option<Self> {
        match message {
            Message::ControllerProperty { name, value, .. } => Some(Self::Property {
                name: name.clone(),
                value: value.clone(),
            }),
            Message::ControllerObject { name, children, .. } => Some(Self::Object {
                name: name.clone(),
                children: children.clone(),
            }),
            _ => None,
        }
    }

    /// Wraps the payload for sending to `table`.
    pub fn into_message(self, table: TableNum) -> Message {
        match self {
            Self::Property { name, value } => Message::ControllerProperty { table, name, value },
            Self::Object { name, children } => Message::ControllerObject {
                table,
                name,
                children,
            },
        }
    }
}

/// Game rules for one table. This is the trait a game implements.
///
/// The sync layer owns seats, readiness, turns, draws and invites. A
/// controller only sees what is specific to one game: the opaque
/// `controller-*` payloads and the moments a game starts and ends.
///
/// ## When each method is called
///
/// Every method runs on the connection's dispatch task, *after* the
/// replica has applied the message that triggered it, so `table` already
/// reflects the new state:
///
/// - [`receive_opaque_message`](Self::receive_opaque_message): a
///   `controller-property` or `controller-object` arrived for the table.
/// - [`first_turn`](Self::first_turn): a `start-game` arrived without a
///   first seat; called before seats move to PLAYING.
/// - [`on_game_start`](Self::on_game_start): after every seated player is
///   PLAYING and the turn pointer is set.
/// - [`on_game_over`](Self::on_game_over): after results are applied to
///   user statistics and players are back to SEATED.
///
/// ## Replies
///
/// Each method returns the payloads to send back. The coordinator stamps
/// them with the table number and writes them in order on a separate
/// task, so a controller never blocks the read loop. Return an empty
/// `Vec` to send nothing.
///
/// ## Trait bounds explained
///
/// - `Send`: the controller is owned by the dispatcher, which runs on
///   the read loop task.
/// - `'static`: the controller lives as long as the user stays at the
///   table and borrows nothing from the code that created it.
pub trait GameController: Send + 'static {
    /// A `controller-property` or `controller-object` arrived.
    fn receive_opaque_message(
        &mut self,
        table: &Table,
        message: OpaqueMessage,
    ) -> Vec<OpaqueMessage>;

    /// The game started; seats are PLAYING and the turn pointer is set.
    fn on_game_start(&mut self, _table: &Table) -> Vec<OpaqueMessage> {
        Vec::new()
    }

    /// The game ended; statistics are updated and seats are SEATED again.
    fn on_game_over(&mut self, _table: &Table, _outcome: &GameOver) -> Vec<OpaqueMessage> {
        Vec::new()
    }

    /// Who moves first when the server leaves it open. `None` picks the
    /// lowest occupied seat.
    fn first_turn(&self, _table: &Table) -> Option<SeatNum> {
        None
    }
}

/// Creates and tears down controllers.
pub trait GameModule: Send + Sync + 'static {
    /// Called when the local user arrives at a table: on the creator's
    /// `new-table` acknowledgement, on the user's own `join-table` echo,
    /// or for tables listed in the login snapshot.
    fn create_controller(&self, table: &Table) -> Box<dyn GameController>;

    /// Called when the local user leaves the table or the table goes away.
    fn teardown(&self, table: TableNum, controller: Box<dyn GameController>) {
        tracing::debug!(%table, "controller torn down");
        drop(controller);
    }
}

/// A module whose controllers ignore every payload. Useful for lobby-only
/// clients and observers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRules;

struct Passive;

impl GameController for Passive {
    fn receive_opaque_message(&mut self, _table: &Table, _message: OpaqueMessage) -> Vec<OpaqueMessage> {
        Vec::new()
    }
}

impl GameModule for NoRules {
    fn create_controller(&self, _table: &Table) -> Box<dyn GameController> {
        Box::new(Passive)
    }
}
