//! Error types for the protocol layer.
//!
//! Two stages can fail independently: bytes → wire tree ([`ProtocolError`])
//! and wire tree → typed message ([`DecodeError`]). Neither is fatal; the
//! read loop logs and drops the offending frame.

/// Errors converting between bytes and wire elements.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes are not a well-formed element.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The element is well-formed but not a known message shape.
    #[error(transparent)]
    Message(#[from] DecodeError),

    /// The message is invalid at the protocol level.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Errors converting a wire element into a typed message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// No message type owns this tag. Callers treat this as a no-op so
    /// newer servers can add messages.
    #[error("unknown tag <{0}>")]
    UnknownTag(String),

    /// A required attribute is absent.
    #[error("<{tag}> is missing attribute `{attr}`")]
    MissingAttribute { tag: String, attr: &'static str },

    /// A required child element is absent.
    #[error("<{tag}> is missing child <{child}>")]
    MissingChild { tag: String, child: &'static str },

    /// An enumerated attribute holds a value outside its set.
    #[error("<{tag}> attribute `{attr}` has unexpected value {value:?}")]
    InvalidValue {
        tag: String,
        attr: &'static str,
        value: String,
    },
}

impl DecodeError {
    /// `true` for errors a forward-compatible reader should ignore silently.
    pub fn is_unknown_tag(&self) -> bool {
        matches!(self, Self::UnknownTag(_))
    }
}
