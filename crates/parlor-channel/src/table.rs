//! Table channels: one table's view of a shared connection.

use std::sync::atomic::{AtomicBool, Ordering};

use parlor_protocol::{Message, TableNum};
use parlor_transport::{Connection, TransportError};

use crate::{ChannelError, ConnectionChannel};

/// A connection channel scoped to one table number.
///
/// Outbound messages are stamped with the table number. Many table
/// channels share one connection; closing one sends `exit-table` and
/// closes the connection only if it was the last one open (and
/// [`ChannelConfig::close_on_last_table`](crate::ChannelConfig) is set).
pub struct TableChannel<C> {
    channel: ConnectionChannel<C>,
    table: TableNum,
    released: AtomicBool,
}

impl<C> TableChannel<C>
where
    C: Connection<Error = TransportError>,
{
    pub(crate) fn new(channel: ConnectionChannel<C>, table: TableNum) -> Self {
        channel.shared.open_tables.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(conn = %channel.id(), %table, "table channel opened");
        Self {
            channel,
            table,
            released: AtomicBool::new(false),
        }
    }

    pub fn table(&self) -> TableNum {
        self.table
    }

    /// The connection underneath.
    pub fn connection(&self) -> &ConnectionChannel<C> {
        &self.channel
    }

    pub fn is_closed(&self) -> bool {
        self.released.load(Ordering::Acquire) || self.channel.is_closed()
    }

    /// Whether an inbound message belongs to this table.
    pub fn accepts(&self, message: &Message) -> bool {
        message.table_num() == Some(self.table)
    }

    /// Stamps `message` with this table's number and sends it.
    ///
    /// # Errors
    /// [`ChannelError::NotTableScoped`] for lobby-scope messages,
    /// [`ChannelError::Closed`] once this table channel is closed.
    pub async fn send(&self, mut message: Message) -> Result<(), ChannelError> {
        if self.released.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        if !message.stamp_table(self.table) {
            return Err(ChannelError::NotTableScoped(message.tag()));
        }
        self.channel.send(&message).await
    }

    /// Leaves the table: sends `exit-table`, then closes the connection
    /// if no other table channel is open on it. Idempotent.
    pub async fn close(&self) -> Result<(), ChannelError> {
        let Some(remaining) = self.release() else {
            return Ok(());
        };
        let sent = self
            .channel
            .send(&Message::ExitTable {
                table: self.table,
                username: None,
            })
            .await;
        tracing::info!(conn = %self.channel.id(), table = %self.table, remaining, "left table");

        if remaining == 0 && self.channel.config().close_on_last_table {
            self.channel.close().await?;
        }
        match sent {
            Err(ChannelError::Closed) => Ok(()),
            other => other,
        }
    }

    /// Stops using this table channel without telling the server, for
    /// when the server already removed us from the table.
    pub fn detach(&self) {
        if let Some(remaining) = self.release() {
            tracing::debug!(conn = %self.channel.id(), table = %self.table, remaining, "table channel detached");
        }
    }

    /// Marks this table channel released. Returns the number of table
    /// channels still open, or `None` if it was already released.
    fn release(&self) -> Option<usize> {
        if self.released.swap(true, Ordering::AcqRel) {
            return None;
        }
        let before = self.channel.shared.open_tables.fetch_sub(1, Ordering::AcqRel);
        Some(before.saturating_sub(1))
    }
}
