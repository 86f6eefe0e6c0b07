//! Line-framed connection over an established byte stream.

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
    BufReader, ReadHalf, WriteHalf,
};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, TransportError};

const DELIMITER: u8 = b'\n';

/// Framing limits for a [`StreamConnection`].
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest inbound frame accepted, delimiter excluded.
    pub max_frame_len: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_len: 1024 * 1024,
        }
    }
}

/// A [`Connection`] that writes one frame per line.
///
/// Frames must not contain a raw `\n`; compact JSON never does, since the
/// encoder escapes newlines inside strings.
pub struct StreamConnection<S> {
    id: ConnectionId,
    reader: Mutex<BufReader<ReadHalf<S>>>,
    writer: Mutex<WriteHalf<S>>,
    config: FrameConfig,
}

impl<S> StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wraps `stream` with default framing limits.
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, FrameConfig::default())
    }

    /// Wraps `stream` with explicit framing limits.
    pub fn with_config(stream: S, config: FrameConfig) -> Self {
        let (read, write) = tokio::io::split(stream);
        let id = ConnectionId::next();
        tracing::debug!(%id, "wrapped byte stream");
        Self {
            id,
            reader: Mutex::new(BufReader::new(read)),
            writer: Mutex::new(write),
            config,
        }
    }
}

impl<S> Connection for StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        if data.contains(&DELIMITER) {
            return Err(TransportError::InvalidFrame);
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await.map_err(TransportError::SendFailed)?;
        writer
            .write_all(&[DELIMITER])
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let max = self.config.max_frame_len;
        let mut reader = self.reader.lock().await;
        loop {
            let mut buf = Vec::new();
            let n = (&mut *reader)
                .take(max as u64 + 1)
                .read_until(DELIMITER, &mut buf)
                .await
                .map_err(TransportError::ReceiveFailed)?;

            if n == 0 {
                return Ok(None);
            }
            if buf.last() == Some(&DELIMITER) {
                buf.pop();
                if buf.is_empty() {
                    continue; // blank line between frames
                }
                return Ok(Some(buf));
            }
            if buf.len() > max {
                return Err(TransportError::FrameTooLarge { max });
            }
            return Err(TransportError::ReceiveFailed(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream ended inside a frame",
            )));
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (
        StreamConnection<tokio::io::DuplexStream>,
        StreamConnection<tokio::io::DuplexStream>,
    ) {
        let (a, b) = tokio::io::duplex(4096);
        (StreamConnection::new(a), StreamConnection::new(b))
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (a, b) = pair();
        a.send(b"first").await.unwrap();
        a.send(b"second").await.unwrap();

        assert_eq!(b.recv().await.unwrap().unwrap(), b"first");
        assert_eq!(b.recv().await.unwrap().unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_close_yields_none_on_peer() {
        let (a, b) = pair();
        a.close().await.unwrap();
        assert!(b.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_rejects_embedded_delimiter() {
        let (a, _b) = pair();
        let err = a.send(b"two\nlines").await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidFrame));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (a, b) = tokio::io::duplex(4096);
        let a = StreamConnection::new(a);
        let b = StreamConnection::with_config(
            b,
            FrameConfig { max_frame_len: 8 },
        );
        a.send(b"0123456789abcdef").await.unwrap();
        let err = b.recv().await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { max: 8 }));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_an_error() {
        use tokio::io::AsyncWriteExt;
        let (mut raw, b) = tokio::io::duplex(4096);
        let b = StreamConnection::new(b);
        raw.write_all(b"partial").await.unwrap();
        drop(raw);
        assert!(matches!(
            b.recv().await,
            Err(TransportError::ReceiveFailed(_))
        ));
    }
}
