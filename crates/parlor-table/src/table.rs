//! Tables, the table list, and the local lifecycle checks.
//!
//! The `check_*` methods answer "may this user send that command right
//! now?" against the current replica. They never change state: a seat is
//! only claimed when the server's `player-state` echo is applied.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parlor_protocol::{
    Chat, Exchange, GameOver, PlayerRecord, PlayerStatus, SeatNum, TableNum,
    TableRecord, Visibility,
};

use crate::{Observers, PlayerList, Subscription, TableError};

/// Something happened at a table that is not a player move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableEvent {
    GameStarted { first: Option<SeatNum> },
    GameOver(GameOver),
    Chat(Chat),
    /// A draw offer addressed to the local user.
    DrawOffered(Exchange),
    /// A reply to the local user's draw offer.
    DrawAnswered(Exchange),
    /// A reply to an invitation the local user sent.
    InviteAnswered(Exchange),
    /// A player resigned; `GameOver` follows.
    Resigned(String),
    /// The table left the table list.
    Removed,
}

/// One hosted game session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    number: TableNum,
    visibility: Visibility,
    owner: String,
    seats: u32,
    min_players: u32,
    in_progress: bool,
    created: DateTime<Utc>,
    properties: BTreeMap<String, String>,
    players: PlayerList,
    observers: Observers<TableEvent>,
}

impl Table {
    pub fn from_record(record: &TableRecord) -> Self {
        Self {
            number: record.table,
            visibility: record.visibility,
            owner: record.owner.clone(),
            seats: record.seats,
            min_players: record.min_players,
            in_progress: record.in_progress,
            created: record.created,
            properties: record.properties.clone(),
            players: PlayerList::from_records(&record.players),
            observers: Observers::new(),
        }
    }

    pub fn record(&self) -> TableRecord {
        TableRecord {
            table: self.number,
            visibility: self.visibility,
            owner: self.owner.clone(),
            seats: self.seats,
            min_players: self.min_players,
            in_progress: self.in_progress,
            created: self.created,
            properties: self.properties.clone(),
            players: self.players.records(),
        }
    }

    pub fn number(&self) -> TableNum {
        self.number
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn seats(&self) -> u32 {
        self.seats
    }

    pub fn min_players(&self) -> u32 {
        self.min_players
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn players(&self) -> &PlayerList {
        &self.players
    }

    pub fn subscribe(&self) -> Subscription<TableEvent> {
        self.observers.subscribe()
    }

    // -- lifecycle checks ---------------------------------------------------

    fn status_of(&self, username: &str) -> Result<PlayerStatus, TableError> {
        self.players
            .get(username)
            .map(|p| p.status())
            .ok_or_else(|| TableError::NotAtTable {
                table: self.number,
                username: username.to_string(),
            })
    }

    /// Sitting needs: no running game, a place at the table, no seat yet,
    /// and a vacant seat in range.
    pub fn check_sit_down(&self, username: &str, seat: SeatNum) -> Result<(), TableError> {
        if self.in_progress {
            return Err(TableError::GameInProgress(self.number));
        }
        if self.status_of(username)?.holds_seat() {
            let current = self.players.get(username).map_or(seat, |p| p.seat());
            return Err(TableError::AlreadySeated(current));
        }
        let in_range = seat
            .index()
            .is_some_and(|i| self.seats == 0 || i < self.seats as usize);
        if !in_range {
            return Err(TableError::SeatOutOfRange {
                seat,
                seats: self.seats,
            });
        }
        if let Some(holder) = self.players.at_seat(seat) {
            return Err(TableError::SeatOccupied {
                seat,
                by: holder.username().to_string(),
            });
        }
        Ok(())
    }

    /// Standing is allowed from SEATED or READY only.
    pub fn check_stand_up(&self, username: &str) -> Result<(), TableError> {
        match self.status_of(username)? {
            PlayerStatus::Seated | PlayerStatus::Ready => Ok(()),
            PlayerStatus::Viewing => Err(TableError::NotSeated),
            PlayerStatus::Playing => Err(TableError::GameInProgress(self.number)),
        }
    }

    /// Ready is allowed from SEATED once enough players are seated.
    pub fn check_ready(&self, username: &str) -> Result<(), TableError> {
        match self.status_of(username)? {
            PlayerStatus::Seated => {}
            PlayerStatus::Viewing => return Err(TableError::NotSeated),
            PlayerStatus::Ready => return Err(TableError::AlreadyReady),
            PlayerStatus::Playing => return Err(TableError::GameInProgress(self.number)),
        }
        let seated = self.players.seated_count();
        if seated < self.min_players as usize {
            return Err(TableError::TooFewPlayers {
                seated,
                required: self.min_players,
            });
        }
        Ok(())
    }

    /// A draw offer goes from someone at the table to exactly one other
    /// user at the same table.
    pub fn check_offer_draw(&self, from: &str, to: &str) -> Result<(), TableError> {
        self.status_of(from)?;
        if from == to {
            return Err(TableError::InvalidRecipient("a draw offer"));
        }
        if !self.players.contains(to) {
            return Err(TableError::RecipientNotAtTable {
                table: self.number,
                recipient: to.to_string(),
            });
        }
        Ok(())
    }

    /// Resigning needs a running game the user plays in.
    pub fn check_resign(&self, username: &str) -> Result<(), TableError> {
        match self.status_of(username)? {
            PlayerStatus::Playing if self.in_progress => Ok(()),
            _ => Err(TableError::NotPlaying),
        }
    }

    /// Invitations come from someone at the table and go to someone else.
    pub fn check_invite(&self, from: &str, to: &str) -> Result<(), TableError> {
        self.status_of(from)?;
        if from == to {
            return Err(TableError::InvalidRecipient("an invitation"));
        }
        Ok(())
    }

    // -- mutation (dispatch path only) --------------------------------------

    /// Adds a viewer.
    pub fn join(&mut self, username: &str) -> bool {
        self.players.join(username)
    }

    /// Removes a user. Returns `true` if they were listed.
    pub fn leave(&mut self, username: &str) -> bool {
        self.players.leave(username).is_some()
    }

    /// Applies an authoritative `player-state` echo.
    pub fn apply_player_state(&mut self, record: &PlayerRecord) -> Vec<String> {
        self.players.apply(record)
    }

    pub fn start_game(&mut self, first: Option<SeatNum>) -> Option<SeatNum> {
        self.in_progress = true;
        let first = self.players.start_game(first);
        tracing::info!(table = %self.number, ?first, "game started");
        self.observers.notify(TableEvent::GameStarted { first });
        first
    }

    pub fn next_turn(&mut self, seat: SeatNum) {
        if self.players.at_seat(seat).is_none() {
            tracing::warn!(table = %self.number, %seat, "turn moved to an empty seat");
        }
        self.players.set_turn(Some(seat));
    }

    /// Ends the running game. User statistics are updated by
    /// [`Game::finish_game`](crate::Game::finish_game).
    pub fn finish_game(&mut self, outcome: &GameOver) {
        self.in_progress = false;
        self.players.finish_game();
        tracing::info!(
            table = %self.number,
            reason = outcome.reason.as_deref().unwrap_or("-"),
            "game over"
        );
        self.observers.notify(TableEvent::GameOver(outcome.clone()));
    }

    pub fn receive_chat(&mut self, chat: Chat) {
        self.observers.notify(TableEvent::Chat(chat));
    }

    /// Publishes an event that changes no table state: draw offers,
    /// replies, resignations.
    pub fn publish(&mut self, event: TableEvent) {
        self.observers.notify(event);
    }

    fn removed(&self) {
        self.observers.notify(TableEvent::Removed);
    }
}

/// Tables entering or leaving the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableListEvent {
    Added(TableNum),
    Removed(TableNum),
}

/// Every table the server has told us about, by number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableList {
    tables: BTreeMap<TableNum, Table>,
    observers: Observers<TableListEvent>,
}

impl TableList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a TableRecord>) -> Self {
        let mut list = Self::new();
        for record in records {
            list.insert(Table::from_record(record));
        }
        list
    }

    pub fn subscribe(&self) -> Subscription<TableListEvent> {
        self.observers.subscribe()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn get(&self, table: TableNum) -> Option<&Table> {
        self.tables.get(&table)
    }

    pub fn get_mut(&mut self, table: TableNum) -> Option<&mut Table> {
        self.tables.get_mut(&table)
    }

    pub fn contains(&self, table: TableNum) -> bool {
        self.tables.contains_key(&table)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn numbers(&self) -> impl Iterator<Item = TableNum> + '_ {
        self.tables.keys().copied()
    }

    /// Tables where `username` is listed, seated or viewing.
    pub fn tables_for<'a>(&'a self, username: &'a str) -> impl Iterator<Item = &'a Table> + 'a {
        self.tables
            .values()
            .filter(move |t| t.players().contains(username))
    }

    /// Inserts or replaces a table. A replaced table keeps no observers.
    pub fn insert(&mut self, table: Table) -> TableNum {
        let number = table.number();
        self.tables.insert(number, table);
        self.observers.notify(TableListEvent::Added(number));
        number
    }

    pub fn remove(&mut self, table: TableNum) -> Option<Table> {
        let removed = self.tables.remove(&table)?;
        removed.removed();
        self.observers.notify(TableListEvent::Removed(table));
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_protocol::ExchangeKind;

    fn record(players: Vec<PlayerRecord>) -> TableRecord {
        TableRecord {
            table: TableNum(5),
            visibility: Visibility::Public,
            owner: "ann".into(),
            seats: 3,
            min_players: 2,
            in_progress: false,
            created: DateTime::<Utc>::default(),
            properties: BTreeMap::new(),
            players,
        }
    }

    fn player(name: &str, seat: i32, status: PlayerStatus) -> PlayerRecord {
        PlayerRecord {
            username: name.into(),
            seat: SeatNum(seat),
            status,
        }
    }

    #[test]
    fn test_sit_down_preconditions() {
        let table = Table::from_record(&record(vec![
            player("ann", 0, PlayerStatus::Seated),
            player("bob", -1, PlayerStatus::Viewing),
        ]));

        assert_eq!(table.check_sit_down("bob", SeatNum(1)), Ok(()));
        assert_eq!(
            table.check_sit_down("bob", SeatNum(0)),
            Err(TableError::SeatOccupied {
                seat: SeatNum(0),
                by: "ann".into()
            })
        );
        assert!(matches!(
            table.check_sit_down("bob", SeatNum(3)),
            Err(TableError::SeatOutOfRange { .. })
        ));
        assert!(matches!(
            table.check_sit_down("bob", SeatNum::NOT_SEATED),
            Err(TableError::SeatOutOfRange { .. })
        ));
        assert_eq!(
            table.check_sit_down("ann", SeatNum(1)),
            Err(TableError::AlreadySeated(SeatNum(0)))
        );
        assert!(matches!(
            table.check_sit_down("cat", SeatNum(1)),
            Err(TableError::NotAtTable { .. })
        ));
    }

    #[test]
    fn test_sit_down_refused_mid_game() {
        let mut rec = record(vec![player("bob", -1, PlayerStatus::Viewing)]);
        rec.in_progress = true;
        let table = Table::from_record(&rec);
        assert_eq!(
            table.check_sit_down("bob", SeatNum(1)),
            Err(TableError::GameInProgress(TableNum(5)))
        );
    }

    #[test]
    fn test_stand_up_only_from_seated_or_ready() {
        let table = Table::from_record(&record(vec![
            player("a", 0, PlayerStatus::Seated),
            player("b", 1, PlayerStatus::Ready),
            player("c", 2, PlayerStatus::Playing),
            player("d", -1, PlayerStatus::Viewing),
        ]));
        assert_eq!(table.check_stand_up("a"), Ok(()));
        assert_eq!(table.check_stand_up("b"), Ok(()));
        assert!(table.check_stand_up("c").is_err());
        assert_eq!(table.check_stand_up("d"), Err(TableError::NotSeated));
    }

    #[test]
    fn test_ready_needs_minimum_players() {
        let mut table = Table::from_record(&record(vec![player("a", 0, PlayerStatus::Seated)]));
        assert_eq!(
            table.check_ready("a"),
            Err(TableError::TooFewPlayers {
                seated: 1,
                required: 2
            })
        );
        table.apply_player_state(&player("b", 1, PlayerStatus::Seated));
        assert_eq!(table.check_ready("a"), Ok(()));
        table.apply_player_state(&player("a", 0, PlayerStatus::Ready));
        assert_eq!(table.check_ready("a"), Err(TableError::AlreadyReady));
    }

    #[test]
    fn test_draw_offer_recipient_must_be_at_table() {
        let table = Table::from_record(&record(vec![
            player("a", 0, PlayerStatus::Playing),
            player("b", 1, PlayerStatus::Playing),
        ]));
        assert_eq!(table.check_offer_draw("a", "b"), Ok(()));
        assert!(matches!(
            table.check_offer_draw("a", "zed"),
            Err(TableError::RecipientNotAtTable { .. })
        ));
        assert!(matches!(
            table.check_offer_draw("a", "a"),
            Err(TableError::InvalidRecipient(_))
        ));
    }

    #[test]
    fn test_resign_needs_running_game() {
        let mut table = Table::from_record(&record(vec![
            player("a", 0, PlayerStatus::Seated),
            player("b", 1, PlayerStatus::Seated),
        ]));
        assert_eq!(table.check_resign("a"), Err(TableError::NotPlaying));
        table.start_game(None);
        assert_eq!(table.check_resign("a"), Ok(()));
    }

    #[test]
    fn test_game_events_reach_table_observers() {
        let mut table = Table::from_record(&record(vec![
            player("a", 0, PlayerStatus::Ready),
            player("b", 1, PlayerStatus::Ready),
        ]));
        let mut sub = table.subscribe();

        table.start_game(None);
        table.publish(TableEvent::DrawOffered(Exchange {
            kind: ExchangeKind::Request,
            serial: parlor_protocol::Serial(1),
            username: "b".into(),
            recipient: Some("a".into()),
        }));
        table.finish_game(&GameOver {
            reason: None,
            results: Vec::new(),
        });

        let events = sub.drain();
        assert_eq!(events[0], TableEvent::GameStarted { first: Some(SeatNum(0)) });
        assert!(matches!(events[1], TableEvent::DrawOffered(_)));
        assert!(matches!(events[2], TableEvent::GameOver(_)));
        assert!(!table.in_progress());
    }

    #[test]
    fn test_table_list_lookup_and_removal() {
        let mut list = TableList::from_records(&[record(vec![player(
            "ann",
            0,
            PlayerStatus::Seated,
        )])]);
        let mut list_sub = list.subscribe();
        let mut table_sub = list.get(TableNum(5)).unwrap().subscribe();

        assert_eq!(list.tables_for("ann").count(), 1);
        assert_eq!(list.tables_for("bob").count(), 0);

        assert!(list.remove(TableNum(5)).is_some());
        assert!(list.remove(TableNum(5)).is_none());
        assert_eq!(list_sub.drain(), vec![TableListEvent::Removed(TableNum(5))]);
        assert_eq!(table_sub.drain(), vec![TableEvent::Removed]);
    }
}
