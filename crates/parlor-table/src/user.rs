//! The replicated user record.

use parlor_protocol::{GameResult, UserRecord};

use crate::{Observers, Subscription};

/// Something about a user changed. Carries the new values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    Updated(UserRecord),
}

/// A logged-in user as last reported by the server.
///
/// The username never changes after creation; the statistics are
/// refreshed by `user` messages and by game results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    record: UserRecord,
    observers: Observers<UserEvent>,
}

impl User {
    pub fn new(record: UserRecord) -> Self {
        Self {
            record,
            observers: Observers::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.record.username
    }

    pub fn rating(&self) -> i32 {
        self.record.rating
    }

    /// The current values as a plain record.
    pub fn record(&self) -> &UserRecord {
        &self.record
    }

    pub fn subscribe(&self) -> Subscription<UserEvent> {
        self.observers.subscribe()
    }

    /// Replaces the statistics with a fresh server copy. The username in
    /// `record` is ignored.
    pub fn apply(&mut self, record: UserRecord) {
        let username = std::mem::take(&mut self.record.username);
        self.record = UserRecord { username, ..record };
        self.notify();
    }

    /// Counts one finished game.
    pub fn apply_result(&mut self, result: GameResult, rating: Option<i32>) {
        let r = &mut self.record;
        r.played += 1;
        match result {
            GameResult::Win => {
                r.won += 1;
                r.streak = if r.streak > 0 { r.streak + 1 } else { 1 };
            }
            GameResult::Lose => {
                r.lost += 1;
                r.streak = if r.streak < 0 { r.streak - 1 } else { -1 };
            }
            GameResult::Draw => {
                r.drawn += 1;
                r.streak = 0;
            }
        }
        if let Some(rating) = rating {
            r.rating = rating;
        }
        self.notify();
    }

    fn notify(&self) {
        self.observers.notify(UserEvent::Updated(self.record.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_protocol::UNRATED;

    #[test]
    fn test_results_update_streak_and_counts() {
        let mut user = User::new(UserRecord::new("ann"));
        let mut sub = user.subscribe();

        user.apply_result(GameResult::Win, None);
        user.apply_result(GameResult::Win, Some(1520));
        assert_eq!(user.record().streak, 2);
        assert_eq!(user.rating(), 1520);

        user.apply_result(GameResult::Lose, None);
        assert_eq!(user.record().streak, -1);

        user.apply_result(GameResult::Draw, None);
        let r = user.record();
        assert_eq!((r.played, r.won, r.lost, r.drawn, r.streak), (4, 2, 1, 1, 0));
        assert_eq!(sub.drain().len(), 4);
    }

    #[test]
    fn test_apply_keeps_the_username() {
        let mut user = User::new(UserRecord::new("ann"));
        let mut fresh = UserRecord::new("someone-else");
        fresh.rating = 1400;
        user.apply(fresh);
        assert_eq!(user.username(), "ann");
        assert_eq!(user.rating(), 1400);
    }

    #[test]
    fn test_new_user_is_unrated() {
        assert_eq!(User::new(UserRecord::new("x")).rating(), UNRATED);
    }
}
