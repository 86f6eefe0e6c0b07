//! Error types for the channel layer.

use parlor_protocol::ProtocolError;
use parlor_transport::TransportError;

/// Errors returned by channel operations.
///
/// Inbound failures never surface here: the read loop logs them and, for
/// transport failures, ends with a single disconnected event.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel was closed, locally or by a transport failure.
    #[error("channel is closed")]
    Closed,

    /// Writing the frame failed; the channel is now closed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A table channel was asked to send a lobby-scope message.
    #[error("<{0}> is not a table message")]
    NotTableScoped(&'static str),
}
