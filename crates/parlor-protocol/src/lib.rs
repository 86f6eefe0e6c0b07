//! Wire protocol for Parlor.
//!
//! This crate defines the language the client and the game server speak:
//!
//! - **Wire tree** ([`Element`]): tag, string attributes, nested children,
//!   optional text. One element per frame.
//! - **Messages** ([`Message`], [`encode`], [`decode`]): the closed,
//!   named catalog of everything that travels, one variant per tag.
//! - **Records** ([`UserRecord`], [`TableRecord`], ...): structured
//!   payloads nested inside messages.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): element ↔ bytes.
//! - **Errors** ([`ProtocolError`], [`DecodeError`]).
//!
//! ```text
//! Transport (frames) → Codec (Element) → decode (Message) → session layer
//! ```

mod codec;
mod element;
mod error;
mod message;
mod records;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use element::Element;
pub use error::{DecodeError, ProtocolError};
pub use message::{
    Chat, Connect, ErrorReport, Exchange, GameOver, GameSnapshot, Message,
    NewTable, PrivateChat, decode, encode,
};
pub use records::{PlayerRecord, PlayerResult, TableRecord, UserRecord, WireRecord};
pub use types::{
    ExchangeKind, GameResult, PlayerStatus, SeatNum, Serial, TableNum, UNRATED,
    Visibility, WireValue,
};
