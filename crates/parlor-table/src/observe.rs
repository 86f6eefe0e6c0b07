//! Subscribe/notify for replicated objects.
//!
//! Any number of readers may [`subscribe`](Observers::subscribe); only the
//! object's owner (the channel's dispatch path) calls
//! [`notify`](Observers::notify).

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

/// The subscriber list of one replicated object.
pub struct Observers<E> {
    senders: Mutex<Vec<mpsc::UnboundedSender<E>>>,
}

impl<E: Clone> Observers<E> {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new observer. It sees every event notified after this
    /// call, in notification order.
    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Subscription { rx }
    }

    /// Number of live observers.
    pub fn len(&self) -> usize {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every live observer and forgets dropped ones.
    /// Only the owner of the observed object calls this.
    pub fn notify(&self, event: E) {
        let mut senders = self
            .senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl<E: Clone> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A copy of an object starts with nobody watching it.
impl<E: Clone> Clone for Observers<E> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

/// Observer lists never take part in equality.
impl<E> PartialEq for Observers<E> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<E> Eq for Observers<E> {}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Observers")
    }
}

/// The receiving end of a subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription<E> {
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E> Subscription<E> {
    /// Waits for the next event. `None` once the observed object is gone.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }

    /// Drains every queued event.
    pub fn drain(&mut self) -> Vec<E> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
