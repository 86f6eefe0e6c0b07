//! Replicated table state for Parlor.
//!
//! Everything here is a client-side copy of server-owned truth. Objects
//! are plain records mutated in place by one writer (the connection's
//! dispatch path) and observed by any number of readers through
//! [`Observers`].
//!
//! # Key types
//!
//! - [`Game`]: the root aggregate: users, tables, own identity
//! - [`Table`] / [`TableList`]: tables and their lifecycle checks
//! - [`Player`] / [`PlayerList`]: seats, status, turn pointer
//! - [`User`]: statistics
//! - [`PendingExchanges`]: draw offers and invites by serial
//! - [`GameController`] / [`GameModule`]: the game-specific plug-in point

mod config;
mod controller;
mod error;
mod exchange;
mod game;
mod observe;
mod player;
mod table;
mod user;

pub use config::TableOptions;
pub use controller::{GameController, GameModule, NoRules, OpaqueMessage};
pub use error::TableError;
pub use exchange::{PendingExchange, PendingExchanges, Side, Topic};
pub use game::{ChatEvent, Game, GameEvent};
pub use observe::{Observers, Subscription};
pub use player::{Player, PlayerEvent, PlayerList, PlayerListEvent};
pub use table::{Table, TableEvent, TableList, TableListEvent};
pub use user::{User, UserEvent};
