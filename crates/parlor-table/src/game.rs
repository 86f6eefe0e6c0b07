//! The root aggregate one logged-in connection holds.

use std::collections::BTreeMap;

use parlor_protocol::{
    Chat, Exchange, GameOver, GameSnapshot, PrivateChat, TableNum, TableRecord,
    UserRecord,
};

use crate::{Observers, Subscription, Table, TableList, User};

/// A chat line, by scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Broadcast(Chat),
    Private(PrivateChat),
    Table { table: TableNum, chat: Chat },
}

/// Lobby-wide changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    UserJoined(String),
    UserLeft(String),
    TableAdded(TableNum),
    TableRemoved(TableNum),
    Chat(ChatEvent),
    /// Someone invited the local user to a table.
    Invited { table: TableNum, exchange: Exchange },
}

/// Users, tables and the local identity, from login to disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    username: String,
    users: BTreeMap<String, User>,
    tables: TableList,
    observers: Observers<GameEvent>,
}

impl Game {
    /// Builds the replica from the login snapshot.
    pub fn from_snapshot(snapshot: &GameSnapshot) -> Self {
        Self {
            username: snapshot.username.clone(),
            users: snapshot
                .users
                .iter()
                .map(|u| (u.username.clone(), User::new(u.clone())))
                .collect(),
            tables: TableList::from_records(&snapshot.tables),
            observers: Observers::new(),
        }
    }

    /// The logged-in user's name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The logged-in user's record, when the server listed it.
    pub fn me(&self) -> Option<&User> {
        self.users.get(&self.username)
    }

    pub fn user(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn tables(&self) -> &TableList {
        &self.tables
    }

    pub fn table(&self, table: TableNum) -> Option<&Table> {
        self.tables.get(table)
    }

    pub fn table_mut(&mut self, table: TableNum) -> Option<&mut Table> {
        self.tables.get_mut(table)
    }

    pub fn subscribe(&self) -> Subscription<GameEvent> {
        self.observers.subscribe()
    }

    // -- mutation (dispatch path only) --------------------------------------

    /// Inserts a user or refreshes their statistics.
    pub fn apply_user(&mut self, record: UserRecord) {
        match self.users.get_mut(&record.username) {
            Some(user) => user.apply(record),
            None => {
                let username = record.username.clone();
                self.users.insert(username.clone(), User::new(record));
                self.observers.notify(GameEvent::UserJoined(username));
            }
        }
    }

    /// Drops a user who left the server, along with their places at every
    /// table. Tables left empty are removed.
    pub fn remove_user(&mut self, username: &str) -> Option<User> {
        let user = self.users.remove(username)?;
        let tables: Vec<TableNum> = self.tables.tables_for(username).map(Table::number).collect();
        for table in tables {
            self.leave_table(table, username);
        }
        self.observers
            .notify(GameEvent::UserLeft(username.to_string()));
        Some(user)
    }

    /// Inserts a table from a snapshot.
    pub fn add_table(&mut self, record: &TableRecord) -> TableNum {
        let table = self.tables.insert(Table::from_record(record));
        tracing::info!(%table, owner = %record.owner, "table added");
        self.observers.notify(GameEvent::TableAdded(table));
        table
    }

    pub fn remove_table(&mut self, table: TableNum) -> Option<Table> {
        let removed = self.tables.remove(table)?;
        tracing::info!(%table, "table removed");
        self.observers.notify(GameEvent::TableRemoved(table));
        Some(removed)
    }

    /// Adds a viewer to a known table. Returns `false` for unknown tables.
    pub fn join_table(&mut self, table: TableNum, username: &str) -> bool {
        match self.tables.get_mut(table) {
            Some(t) => {
                t.join(username);
                true
            }
            None => false,
        }
    }

    /// Removes a user from a table, and the table itself once empty.
    /// Returns `true` if the table was removed.
    pub fn leave_table(&mut self, table: TableNum, username: &str) -> bool {
        let emptied = match self.tables.get_mut(table) {
            Some(t) => {
                t.leave(username);
                t.players().is_empty()
            }
            None => return false,
        };
        if emptied {
            self.remove_table(table);
        }
        emptied
    }

    /// Ends a game: per-user statistics, then the table itself.
    pub fn finish_game(&mut self, table: TableNum, outcome: &GameOver) {
        for result in &outcome.results {
            match self.users.get_mut(&result.username) {
                Some(user) => user.apply_result(result.result, result.rating),
                None => tracing::debug!(
                    %table,
                    username = %result.username,
                    "result for unknown user"
                ),
            }
        }
        if let Some(t) = self.tables.get_mut(table) {
            t.finish_game(outcome);
        }
    }

    /// Publishes a chat line; table chat also reaches the table's
    /// observers.
    pub fn receive_chat(&mut self, event: ChatEvent) {
        if let ChatEvent::Table { table, chat } = &event {
            if let Some(t) = self.tables.get_mut(*table) {
                t.receive_chat(chat.clone());
            }
        }
        self.observers.notify(GameEvent::Chat(event));
    }

    pub fn receive_invite(&mut self, table: TableNum, exchange: Exchange) {
        self.observers
            .notify(GameEvent::Invited { table, exchange });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use parlor_protocol::{
        GameResult, PlayerRecord, PlayerResult, PlayerStatus, SeatNum, Visibility,
    };

    fn table(n: u32, players: &[(&str, i32, PlayerStatus)]) -> TableRecord {
        TableRecord {
            table: TableNum(n),
            visibility: Visibility::Public,
            owner: "ann".into(),
            seats: 2,
            min_players: 2,
            in_progress: false,
            created: DateTime::<Utc>::default(),
            properties: BTreeMap::new(),
            players: players
                .iter()
                .map(|(u, s, st)| PlayerRecord {
                    username: (*u).into(),
                    seat: SeatNum(*s),
                    status: *st,
                })
                .collect(),
        }
    }

    fn snapshot() -> GameSnapshot {
        GameSnapshot {
            username: "ann".into(),
            users: vec![UserRecord::new("ann"), UserRecord::new("bob")],
            tables: vec![table(
                1,
                &[("ann", 0, PlayerStatus::Playing), ("bob", 1, PlayerStatus::Playing)],
            )],
        }
    }

    #[test]
    fn test_snapshot_builds_replica() {
        let game = Game::from_snapshot(&snapshot());
        assert_eq!(game.username(), "ann");
        assert!(game.me().is_some());
        assert_eq!(game.users().count(), 2);
        assert_eq!(game.table(TableNum(1)).unwrap().players().len(), 2);
    }

    #[test]
    fn test_game_over_updates_statistics_and_seats() {
        let mut game = Game::from_snapshot(&snapshot());
        game.table_mut(TableNum(1)).unwrap().start_game(None);

        game.finish_game(
            TableNum(1),
            &GameOver {
                reason: Some("resign".into()),
                results: vec![
                    PlayerResult {
                        username: "ann".into(),
                        result: GameResult::Win,
                        rating: Some(1600),
                    },
                    PlayerResult {
                        username: "bob".into(),
                        result: GameResult::Lose,
                        rating: None,
                    },
                ],
            },
        );

        let ann = game.user("ann").unwrap().record();
        assert_eq!((ann.played, ann.won, ann.rating), (1, 1, 1600));
        assert_eq!(game.user("bob").unwrap().record().lost, 1);

        let t = game.table(TableNum(1)).unwrap();
        assert!(!t.in_progress());
        assert!(t.players().seated().all(|p| p.status() == PlayerStatus::Seated));
    }

    #[test]
    fn test_last_player_leaving_removes_table() {
        let mut game = Game::from_snapshot(&snapshot());
        let mut sub = game.subscribe();

        assert!(!game.leave_table(TableNum(1), "ann"));
        assert!(game.leave_table(TableNum(1), "bob"));
        assert!(game.table(TableNum(1)).is_none());
        assert_eq!(sub.drain(), vec![GameEvent::TableRemoved(TableNum(1))]);
    }

    #[test]
    fn test_user_leaving_server_leaves_tables() {
        let mut game = Game::from_snapshot(&snapshot());
        game.remove_user("bob");
        assert!(game.user("bob").is_none());
        assert!(!game.table(TableNum(1)).unwrap().players().contains("bob"));
    }

    #[test]
    fn test_new_table_and_user_notify_observers() {
        let mut game = Game::from_snapshot(&snapshot());
        let mut sub = game.subscribe();

        game.add_table(&table(2, &[("ann", -1, PlayerStatus::Viewing)]));
        game.apply_user(UserRecord::new("cat"));
        game.apply_user(UserRecord::new("cat"));

        assert_eq!(
            sub.drain(),
            vec![
                GameEvent::TableAdded(TableNum(2)),
                GameEvent::UserJoined("cat".into()),
            ]
        );
    }

    #[test]
    fn test_table_chat_reaches_both_scopes() {
        let mut game = Game::from_snapshot(&snapshot());
        let mut lobby = game.subscribe();
        let mut at_table = game.table(TableNum(1)).unwrap().subscribe();

        let chat = Chat {
            username: "bob".into(),
            text: "gg".into(),
        };
        game.receive_chat(ChatEvent::Table {
            table: TableNum(1),
            chat: chat.clone(),
        });

        assert_eq!(lobby.drain().len(), 1);
        assert_eq!(at_table.drain(), vec![crate::TableEvent::Chat(chat)]);
    }
}
