//! Byte codecs: wire element ↔ bytes.
//!
//! The message layer never sees bytes and the transport never sees
//! elements; a [`Codec`] sits between them. [`JsonCodec`] writes each
//! element as one compact JSON document.

use serde::{Serialize, de::DeserializeOwned};

use crate::{Element, Message, ProtocolError, decode, encode};

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Two layers
///
/// Decoding a frame happens in two steps, and each step fails in its own
/// way:
///
/// 1. bytes → [`Element`] ([`Codec::decode`]). Fails with
///    `ProtocolError::Decode` when the bytes are not a valid document at
///    all, e.g. a truncated frame.
/// 2. [`Element`] → [`Message`] ([`decode`]). Fails with
///    `ProtocolError::Message` when the document is well formed but has
///    an unknown tag or lacks a required attribute.
///
/// [`Codec::decode_message`] runs both. A connection channel logs either
/// failure, drops the frame and keeps reading.
///
/// ## Trait bounds explained
///
/// - `Send + Sync`: one codec is used by a channel's read loop and by
///   every task that calls `send` on that channel, concurrently.
/// - `'static`: the codec is stored inside the channel's shared state,
///   which lives as long as the read loop task.
///
/// ## Generic methods
///
/// `encode<T: Serialize>` and `decode<T: DeserializeOwned>` work for any
/// serde type. `DeserializeOwned` means the decoded value owns its data,
/// so the frame buffer can be dropped right after decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Encodes a message into one frame.
    fn encode_message(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        self.encode(&encode(message))
    }

    /// Decodes one frame into a message.
    ///
    /// # Errors
    /// Byte-level failures come back as `ProtocolError::Decode`; shape
    /// failures as `ProtocolError::Message`.
    fn decode_message(&self, data: &[u8]) -> Result<Message, ProtocolError> {
        let element: Element = self.decode(data)?;
        Ok(decode(&element)?)
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses compact JSON (via `serde_json`).
///
/// Compact output never contains a raw newline, which is what lets the
/// line-framed stream connection use `\n` as its frame delimiter.
///
/// ## Example
///
/// ```rust
/// use parlor_protocol::{Codec, JsonCodec, Message, TableNum};
///
/// let codec = JsonCodec;
/// let msg = Message::StandUp { table: TableNum(4) };
///
/// let bytes = codec.encode_message(&msg).unwrap();
/// let decoded = codec.decode_message(&bytes).unwrap();
/// assert_eq!(msg, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Chat, DecodeError, TableNum};

    #[test]
    fn test_frame_has_no_raw_newline() {
        let msg = Message::ChatTable {
            table: TableNum(1),
            chat: Chat {
                username: "ann".into(),
                text: "a\nb\r\nc".into(),
            },
        };
        let bytes = JsonCodec.encode_message(&msg).unwrap();
        assert!(!bytes.contains(&b'\n'));
        assert_eq!(JsonCodec.decode_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_garbage_bytes_are_a_decode_error() {
        let err = JsonCodec.decode_message(b"not json at all").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_unknown_tag_surfaces_as_message_error() {
        let err = JsonCodec
            .decode_message(br#"{"tag":"teleport","attrs":{"to":"mars"}}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Message(DecodeError::UnknownTag(ref t)) if t == "teleport"
        ));
    }

    #[test]
    fn test_hand_written_frame_decodes() {
        let frame = br#"{"tag":"sit-down","attrs":{"table":"12","seat":"3"}}"#;
        assert_eq!(
            JsonCodec.decode_message(frame).unwrap(),
            Message::SitDown {
                table: TableNum(12),
                seat: crate::SeatNum(3),
            }
        );
    }
}
