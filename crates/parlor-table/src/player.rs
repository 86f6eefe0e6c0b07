//! Players and the per-table player list.
//!
//! The list is the only place a seat is assigned, and it is only ever
//! assigned from a server echo ([`PlayerList::apply`]). A second claim on
//! an occupied seat evicts the previous holder, so no two players ever
//! share a seat number.

use parlor_protocol::{PlayerRecord, PlayerStatus, SeatNum};

use crate::{Observers, Subscription};

/// A player's seat or status changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    Changed { seat: SeatNum, status: PlayerStatus },
}

/// One user's position at a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    username: String,
    seat: SeatNum,
    status: PlayerStatus,
    observers: Observers<PlayerEvent>,
}

impl Player {
    /// A viewer without a seat.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            seat: SeatNum::NOT_SEATED,
            status: PlayerStatus::Viewing,
            observers: Observers::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn seat(&self) -> SeatNum {
        self.seat
    }

    pub fn status(&self) -> PlayerStatus {
        self.status
    }

    pub fn record(&self) -> PlayerRecord {
        PlayerRecord {
            username: self.username.clone(),
            seat: self.seat,
            status: self.status,
        }
    }

    pub fn subscribe(&self) -> Subscription<PlayerEvent> {
        self.observers.subscribe()
    }

    fn set(&mut self, seat: SeatNum, status: PlayerStatus) -> bool {
        let (seat, status) = normalize(seat, status);
        if (seat, status) == (self.seat, self.status) {
            return false;
        }
        self.seat = seat;
        self.status = status;
        self.observers.notify(PlayerEvent::Changed { seat, status });
        true
    }
}

/// A viewer has no seat and a seat-less player is a viewer.
fn normalize(seat: SeatNum, status: PlayerStatus) -> (SeatNum, PlayerStatus) {
    if !status.holds_seat() || !seat.is_seated() {
        (SeatNum::NOT_SEATED, PlayerStatus::Viewing)
    } else {
        (seat, status)
    }
}

/// Membership or turn changes at one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerListEvent {
    Joined(String),
    Left(String),
    Moved {
        username: String,
        seat: SeatNum,
        status: PlayerStatus,
    },
    TurnChanged(Option<SeatNum>),
}

/// The players at one table, seated players first in seat order, then
/// viewers in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerList {
    players: Vec<Player>,
    current: Option<SeatNum>,
    observers: Observers<PlayerListEvent>,
}

impl PlayerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from a snapshot, applying each record in order.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a PlayerRecord>) -> Self {
        let mut list = Self::new();
        for record in records {
            list.apply(record);
        }
        list
    }

    pub fn subscribe(&self) -> Subscription<PlayerListEvent> {
        self.observers.subscribe()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn get(&self, username: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.username == username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.get(username).is_some()
    }

    /// The player holding `seat`, if any.
    pub fn at_seat(&self, seat: SeatNum) -> Option<&Player> {
        if !seat.is_seated() {
            return None;
        }
        self.players.iter().find(|p| p.seat == seat)
    }

    /// Players holding a seat, in seat order.
    pub fn seated(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.status.holds_seat())
    }

    pub fn seated_count(&self) -> usize {
        self.seated().count()
    }

    /// The seat whose turn it is. Only meaningful while a game runs.
    pub fn current_seat(&self) -> Option<SeatNum> {
        self.current
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.current.and_then(|seat| self.at_seat(seat))
    }

    pub fn records(&self) -> Vec<PlayerRecord> {
        self.players.iter().map(Player::record).collect()
    }

    // -- mutation (dispatch path only) --------------------------------------

    /// Adds a viewer. Returns `false` if the user is already listed.
    pub fn join(&mut self, username: &str) -> bool {
        if self.contains(username) {
            return false;
        }
        self.players.push(Player::new(username));
        self.observers
            .notify(PlayerListEvent::Joined(username.to_string()));
        true
    }

    /// Removes a user, seated or not.
    pub fn leave(&mut self, username: &str) -> Option<Player> {
        let index = self.players.iter().position(|p| p.username == username)?;
        let player = self.players.remove(index);
        self.observers
            .notify(PlayerListEvent::Left(player.username.clone()));
        Some(player)
    }

    /// Applies an authoritative player state. A user not yet listed is
    /// added. Returns the users evicted from the claimed seat.
    pub fn apply(&mut self, record: &PlayerRecord) -> Vec<String> {
        let (seat, status) = normalize(record.seat, record.status);
        let mut evicted = Vec::new();

        if seat.is_seated() {
            for holder in self
                .players
                .iter_mut()
                .filter(|p| p.seat == seat && p.username != record.username)
            {
                tracing::warn!(
                    %seat,
                    holder = %holder.username,
                    claimant = %record.username,
                    "seat reassigned by server, evicting previous holder"
                );
                holder.set(SeatNum::NOT_SEATED, PlayerStatus::Viewing);
                evicted.push(holder.username.clone());
            }
        }

        let changed = match self.players.iter_mut().find(|p| p.username == record.username) {
            Some(player) => player.set(seat, status),
            None => {
                let mut player = Player::new(record.username.clone());
                player.set(seat, status);
                self.players.push(player);
                self.observers
                    .notify(PlayerListEvent::Joined(record.username.clone()));
                true
            }
        };

        self.sort();
        for username in &evicted {
            self.observers.notify(PlayerListEvent::Moved {
                username: username.clone(),
                seat: SeatNum::NOT_SEATED,
                status: PlayerStatus::Viewing,
            });
        }
        if changed {
            self.observers.notify(PlayerListEvent::Moved {
                username: record.username.clone(),
                seat,
                status,
            });
        }
        evicted
    }

    /// Moves every seated player to PLAYING and points the turn at
    /// `first` if someone holds it, otherwise at the lowest occupied seat.
    pub fn start_game(&mut self, first: Option<SeatNum>) -> Option<SeatNum> {
        self.set_all_status(PlayerStatus::holds_seat, PlayerStatus::Playing);
        let first = first
            .filter(|s| self.at_seat(*s).is_some())
            .or_else(|| self.seated().map(Player::seat).min());
        self.set_turn(first);
        first
    }

    /// Sets the turn pointer.
    pub fn set_turn(&mut self, seat: Option<SeatNum>) {
        if self.current != seat {
            self.current = seat;
            self.observers.notify(PlayerListEvent::TurnChanged(seat));
        }
    }

    /// Returns PLAYING players to SEATED and clears the turn pointer.
    pub fn finish_game(&mut self) {
        self.set_all_status(|s| s == PlayerStatus::Playing, PlayerStatus::Seated);
        self.set_turn(None);
    }

    fn set_all_status(&mut self, select: impl Fn(PlayerStatus) -> bool, status: PlayerStatus) {
        let mut moved = Vec::new();
        for player in self.players.iter_mut().filter(|p| select(p.status)) {
            let seat = player.seat;
            if player.set(seat, status) {
                moved.push((player.username.clone(), seat));
            }
        }
        for (username, seat) in moved {
            self.observers
                .notify(PlayerListEvent::Moved { username, seat, status });
        }
    }

    fn sort(&mut self) {
        self.players
            .sort_by_key(|p| (!p.seat.is_seated(), p.seat));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seated(username: &str, seat: i32) -> PlayerRecord {
        PlayerRecord {
            username: username.into(),
            seat: SeatNum(seat),
            status: PlayerStatus::Seated,
        }
    }

    #[test]
    fn test_echo_seats_the_player() {
        let mut list = PlayerList::new();
        list.join("ann");
        let evicted = list.apply(&seated("ann", 2));
        assert!(evicted.is_empty());

        let ann = list.get("ann").unwrap();
        assert_eq!(ann.seat(), SeatNum(2));
        assert_eq!(ann.status(), PlayerStatus::Seated);
    }

    #[test]
    fn test_second_claim_evicts_first_holder() {
        let mut list = PlayerList::new();
        list.apply(&seated("ann", 1));
        let evicted = list.apply(&seated("bob", 1));

        assert_eq!(evicted, vec!["ann".to_string()]);
        assert_eq!(list.at_seat(SeatNum(1)).unwrap().username(), "bob");
        assert_eq!(list.get("ann").unwrap().status(), PlayerStatus::Viewing);
    }

    #[test]
    fn test_list_is_ordered_by_seat() {
        let mut list = PlayerList::new();
        list.join("viewer");
        list.apply(&seated("c", 2));
        list.apply(&seated("a", 0));
        list.apply(&seated("b", 1));
        let order: Vec<_> = list.iter().map(Player::username).collect();
        assert_eq!(order, ["a", "b", "c", "viewer"]);
    }

    #[test]
    fn test_viewing_status_drops_the_seat() {
        let mut list = PlayerList::new();
        list.apply(&seated("ann", 0));
        list.apply(&PlayerRecord {
            username: "ann".into(),
            seat: SeatNum(0),
            status: PlayerStatus::Viewing,
        });
        assert_eq!(list.get("ann").unwrap().seat(), SeatNum::NOT_SEATED);
        assert!(list.at_seat(SeatNum(0)).is_none());
    }

    #[test]
    fn test_start_and_finish_game() {
        let mut list = PlayerList::new();
        list.apply(&seated("b", 1));
        list.apply(&seated("a", 0));
        list.join("viewer");

        assert_eq!(list.start_game(None), Some(SeatNum(0)));
        assert!(list.seated().all(|p| p.status() == PlayerStatus::Playing));
        assert_eq!(list.get("viewer").unwrap().status(), PlayerStatus::Viewing);
        assert_eq!(list.current_player().unwrap().username(), "a");

        list.finish_game();
        assert!(list.seated().all(|p| p.status() == PlayerStatus::Seated));
        assert_eq!(list.current_seat(), None);
    }

    #[test]
    fn test_first_seat_override_must_be_occupied() {
        let mut list = PlayerList::new();
        list.apply(&seated("a", 0));
        list.apply(&seated("b", 3));
        assert_eq!(list.start_game(Some(SeatNum(3))), Some(SeatNum(3)));

        let mut list = PlayerList::new();
        list.apply(&seated("a", 1));
        assert_eq!(list.start_game(Some(SeatNum(0))), Some(SeatNum(1)));
    }

    #[test]
    fn test_observers_see_join_move_and_turn() {
        let mut list = PlayerList::new();
        let mut sub = list.subscribe();
        list.join("ann");
        list.apply(&seated("ann", 0));
        list.start_game(None);

        let events = sub.drain();
        assert_eq!(events[0], PlayerListEvent::Joined("ann".into()));
        assert!(matches!(events[1], PlayerListEvent::Moved { .. }));
        assert_eq!(
            events.last(),
            Some(&PlayerListEvent::TurnChanged(Some(SeatNum(0))))
        );
    }
}
