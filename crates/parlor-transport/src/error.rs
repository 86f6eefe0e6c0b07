/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Dialing a remote endpoint failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// An inbound frame exceeded the configured maximum length.
    #[error("frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },

    /// An outbound frame contains the frame delimiter.
    #[error("frame contains a raw delimiter byte")]
    InvalidFrame,
}
