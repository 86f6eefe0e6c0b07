//! The connection channel: one transport, one read loop, one write lock.
//!
//! ```text
//!            send() ──┐                     ┌── keep-alive timer
//!                     ▼                     ▼
//!              [write lock] ──► Connection ◄── read loop ──► handler
//! ```
//!
//! The read loop is a single task. It decodes one frame at a time and
//! calls the handler synchronously, so the handler sees messages in
//! arrival order and is never called concurrently with itself. When the
//! loop ends it calls the handler one last time with
//! [`ChannelEvent::Disconnected`] and drops it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use parlor_protocol::{Codec, JsonCodec, Message, ProtocolError, TableNum};
use parlor_transport::{Connection, ConnectionId, TransportError};
use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::{ChannelConfig, ChannelError, TableChannel};

/// How long close waits for the transport to shut down cleanly.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Why a channel stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// [`ConnectionChannel::close`] was called.
    Closed,
    /// The peer closed the stream.
    PeerClosed,
    /// A read or write failed.
    Failed(String),
}

/// What the handler receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A decoded message, with its table number when it is table scoped.
    Message {
        table: Option<TableNum>,
        message: Message,
    },
    /// A frame that could not be decoded was skipped.
    Dropped { reason: String },
    /// Terminal. Delivered exactly once, after which the handler is
    /// dropped.
    Disconnected(DisconnectReason),
}

/// The single consumer of a channel's inbound traffic.
///
/// Called on the read loop's task; it must not block and must not call
/// [`ConnectionChannel::set_message_handler`] itself.
pub trait MessageHandler: Send + 'static {
    fn on_event(&mut self, event: ChannelEvent);
}

impl<F> MessageHandler for F
where
    F: FnMut(ChannelEvent) + Send + 'static,
{
    fn on_event(&mut self, event: ChannelEvent) {
        self(event)
    }
}

pub(crate) struct Shared<C> {
    conn: C,
    codec: JsonCodec,
    config: ChannelConfig,
    write_lock: Mutex<()>,
    closed: AtomicBool,
    started: AtomicBool,
    shutdown: watch::Sender<bool>,
    reason: StdMutex<Option<DisconnectReason>>,
    handler: StdMutex<Option<Box<dyn MessageHandler>>>,
    pub(crate) open_tables: AtomicUsize,
}

/// A channel over one established connection.
///
/// Cheap to clone; every clone drives the same connection.
pub struct ConnectionChannel<C> {
    pub(crate) shared: Arc<Shared<C>>,
}

impl<C> Clone for ConnectionChannel<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C> ConnectionChannel<C>
where
    C: Connection<Error = TransportError>,
{
    /// Wraps an established connection. Nothing is read until a handler
    /// is registered.
    pub fn open(conn: C, config: ChannelConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        tracing::info!(conn = %conn.id(), "channel opened");
        Self {
            shared: Arc::new(Shared {
                conn,
                codec: JsonCodec,
                config,
                write_lock: Mutex::new(()),
                closed: AtomicBool::new(false),
                started: AtomicBool::new(false),
                shutdown,
                reason: StdMutex::new(None),
                handler: StdMutex::new(None),
                open_tables: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.shared.conn.id()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of table channels not yet closed or detached.
    pub fn open_tables(&self) -> usize {
        self.shared.open_tables.load(Ordering::Acquire)
    }

    /// Registers the handler. The first call starts the read loop on the
    /// current Tokio runtime; later calls replace the handler.
    pub fn set_message_handler(&self, handler: impl MessageHandler) {
        *self
            .shared
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(handler));
        if !self.shared.started.swap(true, Ordering::AcqRel) {
            tokio::spawn(read_loop(Arc::clone(&self.shared)));
        }
    }

    /// Encodes and writes one message. Writes from any number of tasks
    /// are serialized.
    ///
    /// # Errors
    /// [`ChannelError::Closed`] after close. A write failure closes the
    /// channel and returns [`ChannelError::Transport`].
    pub async fn send(&self, message: &Message) -> Result<(), ChannelError> {
        self.shared.send(message).await
    }

    /// Stops the read loop and closes the connection. Safe to call any
    /// number of times from any task.
    pub async fn close(&self) -> Result<(), ChannelError> {
        self.shared.shut(DisconnectReason::Closed).await;
        Ok(())
    }

    /// A table channel bound to `table` on this connection.
    pub fn table(&self, table: TableNum) -> TableChannel<C> {
        TableChannel::new(self.clone(), table)
    }
}

impl<C> Shared<C>
where
    C: Connection<Error = TransportError>,
{
    async fn send(&self, message: &Message) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        let frame = self.codec.encode_message(message)?;

        // A write stuck on a peer that stopped reading must not outlive
        // close(); dropping it releases the write lock.
        let mut shutdown = self.shutdown.subscribe();
        let closing = async move {
            let _ = shutdown.wait_for(|closed| *closed).await;
        };
        let write = async {
            let _guard = self.write_lock.lock().await;
            self.conn.send(&frame).await
        };
        let result = tokio::select! {
            biased;
            () = closing => return Err(ChannelError::Closed),
            result = write => result,
        };
        match result {
            Ok(()) => {
                tracing::trace!(conn = %self.conn.id(), tag = message.tag(), "sent");
                Ok(())
            }
            Err(e) => {
                tracing::debug!(conn = %self.conn.id(), error = %e, "write failed");
                self.shut(DisconnectReason::Failed(e.to_string())).await;
                Err(e.into())
            }
        }
    }

    /// Marks the channel closed and closes the transport. Only the first
    /// caller does anything; returns whether that was this caller.
    ///
    /// In-flight writes see the shutdown signal and give up, so this never
    /// waits on the write lock. The transport close itself is bounded by
    /// [`CLOSE_GRACE`].
    async fn shut(&self, reason: DisconnectReason) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.clone());
        self.shutdown.send_replace(true);

        match tokio::time::timeout(CLOSE_GRACE, self.conn.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(conn = %self.conn.id(), error = %e, "transport close failed"),
            Err(_) => tracing::debug!(conn = %self.conn.id(), "transport close timed out"),
        }
        tracing::info!(conn = %self.conn.id(), ?reason, "channel closed");
        true
    }

    fn emit(&self, event: ChannelEvent) {
        let mut slot = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handler) = slot.as_mut() {
            handler.on_event(event);
        }
    }

    fn dispatch(&self, frame: &[u8]) {
        let message = match self.codec.decode_message(frame) {
            Ok(message) => message,
            Err(ProtocolError::Message(e)) if e.is_unknown_tag() => {
                tracing::trace!(conn = %self.conn.id(), error = %e, "ignoring unknown tag");
                return;
            }
            Err(e) => {
                tracing::debug!(conn = %self.conn.id(), error = %e, "dropping undecodable frame");
                self.emit(ChannelEvent::Dropped {
                    reason: e.to_string(),
                });
                return;
            }
        };
        tracing::trace!(conn = %self.conn.id(), tag = message.tag(), "dispatching");
        let table = message.table_num();
        self.emit(ChannelEvent::Message { table, message });
    }
}

/// One step of the read loop.
enum Step {
    Frame(Vec<u8>),
    Eof,
    Failed(String),
    Shutdown,
}

async fn read_loop<C>(shared: Arc<Shared<C>>)
where
    C: Connection<Error = TransportError>,
{
    let id = shared.conn.id();
    let mut shutdown = shared.shutdown.subscribe();
    let mut keepalive = shared
        .config
        .keepalive_interval
        .filter(|p| !p.is_zero())
        .map(keepalive_timer);
    tracing::debug!(conn = %id, "read loop started");

    let reason = loop {
        if shared.closed.load(Ordering::Acquire) {
            break DisconnectReason::Closed;
        }

        // The pending read survives keep-alive ticks so a frame is never
        // cut in half.
        let step = {
            let recv = shared.conn.recv();
            tokio::pin!(recv);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break Step::Shutdown,
                    result = &mut recv => {
                        break match result {
                            Ok(Some(frame)) => Step::Frame(frame),
                            Ok(None) => Step::Eof,
                            Err(e) => Step::Failed(e.to_string()),
                        };
                    }
                    () = next_tick(&mut keepalive) => {
                        match shared.send(&Message::KeepAlive).await {
                            Ok(()) => tracing::trace!(conn = %id, "keep-alive sent"),
                            Err(e) => break Step::Failed(e.to_string()),
                        }
                    }
                }
            }
        };

        match step {
            Step::Frame(frame) => shared.dispatch(&frame),
            Step::Eof => break DisconnectReason::PeerClosed,
            Step::Failed(e) => break DisconnectReason::Failed(e),
            Step::Shutdown => break DisconnectReason::Closed,
        }
    };

    shared.shut(reason.clone()).await;
    let reason = shared
        .reason
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .unwrap_or(reason);

    tracing::debug!(conn = %id, ?reason, "read loop stopped");
    let handler = shared
        .handler
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(mut handler) = handler {
        handler.on_event(ChannelEvent::Disconnected(reason));
    }
}

fn keepalive_timer(period: Duration) -> Interval {
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
