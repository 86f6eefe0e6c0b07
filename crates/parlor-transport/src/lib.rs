//! Transport abstraction layer for Parlor.
//!
//! Provides the [`Connection`] trait that the session layer reads frames
//! from and writes frames to, plus two implementations:
//!
//! - [`StreamConnection`]: one frame per line over any established
//!   `AsyncRead + AsyncWrite` byte stream (TCP, `tokio::io::duplex`, ...)
//! - [`WebSocketConnection`]: one frame per WebSocket message
//!
//! A "frame" is the byte encoding of exactly one wire element. The
//! transport never looks inside it.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
mod stream;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use stream::{FrameConfig, StreamConnection};
#[cfg(feature = "websocket")]
pub use websocket::{ClientConnection, WebSocketConnection, connect};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique id.
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A single bidirectional connection that carries discrete frames.
///
/// A frame is an opaque byte buffer holding exactly one encoded element.
/// Implementations decide how frames are delimited on the wire (one
/// WebSocket message, one line) but never look inside them.
///
/// ## Concurrency contract
///
/// `send` and `recv` may be called concurrently from different tasks.
/// The connection channel parks one task in `recv` for the whole life of
/// the connection while other tasks call `send`, so implementations keep
/// the read and write halves behind separate locks. A read blocked on
/// the network must never stall a writer.
///
/// `close` may also race a parked `recv`. After `close`, the peer sees
/// end of stream and the local `recv` eventually returns `Ok(None)` or an
/// error.
///
/// ## Trait bounds explained
///
/// - `Send + Sync + 'static`: the connection lives in an `Arc` shared by
///   the read loop task and every sender.
/// - The methods return `impl Future + Send` rather than being declared
///   `async fn`, so callers may `tokio::spawn` futures that await them.
///   Implementations can still write `async fn` in the `impl` block.
/// - `Error: 'static` lets the error be boxed into the channel's own
///   error type with `?`.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends one frame to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    /// Closes the connection.
    fn close(
        &self,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
