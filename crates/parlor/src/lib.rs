//! # Parlor
//!
//! Client-side session synchronization for turn-based multiplayer game
//! tables.
//!
//! One [`Session`] holds one long-lived connection to a game server. Lobby
//! and table traffic is multiplexed over it; every inbound message is
//! applied to a local replica of the lobby ([`Game`]) on the connection's
//! read task, and UI code observes the replica through subscriptions.
//! Game rules plug in through [`GameModule`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parlor::prelude::*;
//!
//! # async fn run() -> Result<(), ParlorError> {
//! let session = SessionBuilder::new().connect("ws://127.0.0.1:4000").await?;
//! session.login("ann", None).await?;
//! let table = session.create_table(&TableOptions::default()).await?;
//! table.sit_down(SeatNum(0)).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod error;
mod event;
mod session;

pub use config::{ClientContext, SessionConfig};
pub use error::ParlorError;
pub use event::{SessionEvent, StatusEvent};
pub use session::{Session, SessionBuilder, TableHandle};

pub use parlor_channel::{ChannelConfig, DisconnectReason, TableChannel};
pub use parlor_table::{
    ChatEvent, Game, GameController, GameEvent, GameModule, NoRules, OpaqueMessage, Player,
    PlayerEvent, PlayerList, PlayerListEvent, Subscription, Table, TableError, TableEvent,
    TableList, TableListEvent, TableOptions, User, UserEvent,
};

/// Installs a `tracing` subscriber that honours `RUST_LOG` and defaults to
/// `info`. Safe to call more than once; later calls do nothing.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Everything a typical client needs.
pub mod prelude {
    pub use crate::{
        ChannelConfig, ChatEvent, ClientContext, DisconnectReason, Game, GameController,
        GameEvent, GameModule, NoRules, OpaqueMessage, ParlorError, Session, SessionBuilder,
        SessionConfig, SessionEvent, StatusEvent, Table, TableError, TableEvent, TableHandle,
        TableOptions,
    };
    pub use parlor_protocol::{
        ExchangeKind, GameResult, PlayerStatus, SeatNum, Serial, TableNum, Visibility,
    };
}
