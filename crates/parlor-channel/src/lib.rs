//! Connection and table channels for Parlor.
//!
//! A [`ConnectionChannel`] owns one transport connection per logged-in
//! user. It runs the single read loop that decodes inbound frames and
//! hands them to one [`MessageHandler`], and it serializes every write
//! through one lock. [`TableChannel`]s multiplex table-scoped traffic
//! over it by stamping the table number.
//!
//! # How it fits in the stack
//!
//! ```text
//! Coordinator (above)  ← routes ChannelEvents to tables and the lobby
//!     ↕
//! Channel layer (this crate)  ← read loop, write lock, close
//!     ↕
//! Protocol + Transport (below)  ← Message ↔ bytes ↔ frames
//! ```

mod channel;
mod config;
mod error;
mod table;

pub use channel::{ChannelEvent, ConnectionChannel, DisconnectReason, MessageHandler};
pub use config::ChannelConfig;
pub use error::ChannelError;
pub use table::TableChannel;
