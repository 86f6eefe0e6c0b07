//! Options for creating a table.

use std::collections::BTreeMap;

use parlor_protocol::{NewTable, Visibility};
use serde::{Deserialize, Serialize};

/// What a `new-table` request asks for.
///
/// The property bag is game-specific and travels untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOptions {
    pub visibility: Visibility,

    /// Number of seats; seat numbers run over `[0, seats)`.
    pub seats: u32,

    /// Seated players required before anyone may declare ready.
    pub min_players: u32,

    pub properties: BTreeMap<String, String>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            visibility: Visibility::Public,
            seats: 2,
            min_players: 2,
            properties: BTreeMap::new(),
        }
    }
}

impl TableOptions {
    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Sets the seat count. `min_players` is clamped to it.
    #[must_use]
    pub fn with_seats(mut self, seats: u32) -> Self {
        self.seats = seats;
        self.min_players = self.min_players.min(seats);
        self
    }

    #[must_use]
    pub fn with_min_players(mut self, min_players: u32) -> Self {
        self.min_players = min_players.min(self.seats);
        self
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// The request message for these options.
    pub fn to_request(&self) -> NewTable {
        NewTable {
            visibility: self.visibility,
            seats: self.seats,
            min_players: self.min_players,
            properties: self.properties.clone(),
            snapshot: None,
        }
    }
}
