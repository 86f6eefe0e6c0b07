//! Correlation of draw offers and invitations by serial number.
//!
//! A request is remembered under `(table, topic, side, serial)`. Every
//! client numbers its own requests from 1, so the serial of a request
//! this client sent and the serial of one it received may coincide; the
//! [`Side`] keeps them apart.
//!
//! A reply is matched only against [`Side::Outgoing`] requests, and only
//! if it comes from the user the request was addressed to. Anything else
//! is unmatched and the caller drops it. Answering a request takes it
//! from [`Side::Incoming`].

use std::collections::HashMap;

use parlor_protocol::{Exchange, Serial, TableNum};

/// Which handshake a serial belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Draw,
    Invite,
}

/// Who sent a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Sent by the local user; waiting for the recipient's reply.
    Outgoing,
    /// Addressed to the local user; waiting for a local answer.
    Incoming,
}

/// A request waiting for its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExchange {
    pub table: TableNum,
    pub topic: Topic,
    pub side: Side,
    pub serial: Serial,
    pub from: String,
    pub to: String,
}

/// Requests in flight, both ways.
#[derive(Debug)]
pub struct PendingExchanges {
    next_serial: u64,
    pending: HashMap<(TableNum, Topic, Side, Serial), PendingExchange>,
}

impl Default for PendingExchanges {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingExchanges {
    pub fn new() -> Self {
        Self {
            next_serial: 1,
            pending: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get(
        &self,
        table: TableNum,
        topic: Topic,
        side: Side,
        serial: Serial,
    ) -> Option<&PendingExchange> {
        self.pending.get(&(table, topic, side, serial))
    }

    /// Allocates a serial for an outgoing request and remembers it.
    /// Serial 0 is never issued.
    pub fn issue(&mut self, table: TableNum, topic: Topic, from: &str, to: &str) -> Serial {
        let serial = Serial(self.next_serial);
        self.next_serial += 1;
        self.insert(PendingExchange {
            table,
            topic,
            side: Side::Outgoing,
            serial,
            from: from.to_string(),
            to: to.to_string(),
        });
        serial
    }

    /// Remembers an incoming request so it can be answered later.
    /// Returns `false` if the request names no recipient.
    pub fn record(&mut self, table: TableNum, topic: Topic, request: &Exchange) -> bool {
        let Some(to) = &request.recipient else {
            return false;
        };
        self.insert(PendingExchange {
            table,
            topic,
            side: Side::Incoming,
            serial: request.serial,
            from: request.username.clone(),
            to: to.clone(),
        });
        true
    }

    /// Matches a reply to a request this client sent and forgets the
    /// request.
    pub fn resolve(
        &mut self,
        table: TableNum,
        topic: Topic,
        reply: &Exchange,
    ) -> Option<PendingExchange> {
        let key = (table, topic, Side::Outgoing, reply.serial);
        match self.pending.get(&key) {
            Some(p) if p.to == reply.username => self.pending.remove(&key),
            _ => None,
        }
    }

    /// Takes a received request so the local user can answer it.
    pub fn take(&mut self, table: TableNum, topic: Topic, serial: Serial) -> Option<PendingExchange> {
        self.pending.remove(&(table, topic, Side::Incoming, serial))
    }

    /// Forgets a request this client sent, e.g. when sending it failed.
    pub fn withdraw(
        &mut self,
        table: TableNum,
        topic: Topic,
        serial: Serial,
    ) -> Option<PendingExchange> {
        self.pending.remove(&(table, topic, Side::Outgoing, serial))
    }

    /// Drops every pending request of one topic at a table.
    pub fn discard(&mut self, table: TableNum, topic: Topic) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|(t, tp, _, _), _| !(*t == table && *tp == topic));
        before - self.pending.len()
    }

    /// Drops every pending request at a table.
    pub fn discard_table(&mut self, table: TableNum) -> usize {
        let before = self.pending.len();
        self.pending.retain(|(t, _, _, _), _| *t != table);
        before - self.pending.len()
    }

    fn insert(&mut self, pending: PendingExchange) {
        let key = (pending.table, pending.topic, pending.side, pending.serial);
        if self.pending.insert(key, pending).is_some() {
            tracing::warn!(table = %key.0, side = ?key.2, serial = %key.3, "pending request replaced");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_protocol::ExchangeKind;

    fn reply(serial: u64, from: &str) -> Exchange {
        Exchange {
            kind: ExchangeKind::Accept,
            serial: Serial(serial),
            username: from.into(),
            recipient: Some("ann".into()),
        }
    }

    #[test]
    fn test_issued_serials_start_at_one() {
        let mut pending = PendingExchanges::new();
        let a = pending.issue(TableNum(1), Topic::Draw, "ann", "bob");
        let b = pending.issue(TableNum(1), Topic::Draw, "ann", "bob");
        assert_eq!(a, Serial(1));
        assert_eq!(b, Serial(2));
        assert_ne!(a, Serial::UNKNOWN);
    }

    #[test]
    fn test_reply_matches_by_serial_and_sender() {
        let mut pending = PendingExchanges::new();
        let serial = pending.issue(TableNum(1), Topic::Draw, "ann", "bob");

        assert!(pending.resolve(TableNum(1), Topic::Draw, &reply(serial.0, "eve")).is_none());
        assert!(pending.resolve(TableNum(1), Topic::Invite, &reply(serial.0, "bob")).is_none());
        assert!(pending.resolve(TableNum(2), Topic::Draw, &reply(serial.0, "bob")).is_none());

        let matched = pending
            .resolve(TableNum(1), Topic::Draw, &reply(serial.0, "bob"))
            .unwrap();
        assert_eq!(matched.from, "ann");
        assert!(pending.is_empty());
        assert!(pending.resolve(TableNum(1), Topic::Draw, &reply(serial.0, "bob")).is_none());
    }

    #[test]
    fn test_incoming_request_needs_recipient() {
        let mut pending = PendingExchanges::new();
        let mut request = Exchange {
            kind: ExchangeKind::Request,
            serial: Serial(40),
            username: "bob".into(),
            recipient: None,
        };
        assert!(!pending.record(TableNum(3), Topic::Invite, &request));
        request.recipient = Some("ann".into());
        assert!(pending.record(TableNum(3), Topic::Invite, &request));
        assert!(pending.take(TableNum(3), Topic::Invite, Serial(40)).is_some());
    }

    #[test]
    fn test_same_serial_both_ways_stays_apart() {
        let mut pending = PendingExchanges::new();
        let mine = pending.issue(TableNum(1), Topic::Draw, "ann", "bob");
        let theirs = Exchange {
            kind: ExchangeKind::Request,
            serial: mine,
            username: "bob".into(),
            recipient: Some("ann".into()),
        };
        assert!(pending.record(TableNum(1), Topic::Draw, &theirs));
        assert_eq!(pending.len(), 2);

        let matched = pending.resolve(TableNum(1), Topic::Draw, &reply(mine.0, "bob")).unwrap();
        assert_eq!(matched.side, Side::Outgoing);
        assert_eq!(matched.to, "bob");

        let answered = pending.take(TableNum(1), Topic::Draw, mine).unwrap();
        assert_eq!(answered.side, Side::Incoming);
        assert_eq!(answered.from, "bob");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_answering_never_takes_an_outgoing_request() {
        let mut pending = PendingExchanges::new();
        let serial = pending.issue(TableNum(1), Topic::Invite, "ann", "cat");
        assert!(pending.take(TableNum(1), Topic::Invite, serial).is_none());
        assert!(pending.withdraw(TableNum(1), Topic::Invite, serial).is_some());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_discard_by_topic_and_table() {
        let mut pending = PendingExchanges::new();
        pending.issue(TableNum(1), Topic::Draw, "ann", "bob");
        pending.issue(TableNum(1), Topic::Invite, "ann", "cat");
        pending.issue(TableNum(2), Topic::Draw, "ann", "dan");

        assert_eq!(pending.discard(TableNum(1), Topic::Draw), 1);
        assert_eq!(pending.discard_table(TableNum(1)), 1);
        assert_eq!(pending.len(), 1);
    }
}
