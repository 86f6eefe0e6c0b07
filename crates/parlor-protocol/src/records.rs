//! Structured payloads nested inside messages: users, players, tables and
//! per-player game results.
//!
//! These are plain data records. The replicated objects in `parlor-table`
//! are built from them and refreshed by them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    DecodeError, Element, GameResult, PlayerStatus, SeatNum, TableNum, UNRATED,
    Visibility,
};

/// Conversion between a record and its nested element.
pub trait WireRecord: Sized {
    /// The element tag this record is written under.
    const TAG: &'static str;

    /// Writes the record as an element.
    fn to_element(&self) -> Element;

    /// Reads the record from an element. The caller has already checked
    /// the tag.
    fn from_element(el: &Element) -> Result<Self, DecodeError>;

    /// Reads every child of `parent` written under [`Self::TAG`].
    fn children_of(parent: &Element) -> Result<Vec<Self>, DecodeError> {
        parent.children_named(Self::TAG).map(Self::from_element).collect()
    }
}

// ---------------------------------------------------------------------------
// UserRecord
// ---------------------------------------------------------------------------

/// A logged-in user and their aggregate statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    /// [`UNRATED`] while provisional.
    pub rating: i32,
    pub played: u32,
    pub won: u32,
    pub lost: u32,
    pub drawn: u32,
    /// Positive for a winning streak, negative for a losing one.
    pub streak: i32,
}

impl UserRecord {
    /// A fresh, unrated user with no games.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            rating: UNRATED,
            played: 0,
            won: 0,
            lost: 0,
            drawn: 0,
            streak: 0,
        }
    }
}

impl WireRecord for UserRecord {
    const TAG: &'static str = "user";

    fn to_element(&self) -> Element {
        Element::new(Self::TAG)
            .with_attr("username", &self.username)
            .with_attr("rating", self.rating)
            .with_attr("played", self.played)
            .with_attr("won", self.won)
            .with_attr("lost", self.lost)
            .with_attr("drawn", self.drawn)
            .with_attr("streak", self.streak)
    }

    fn from_element(el: &Element) -> Result<Self, DecodeError> {
        Ok(Self {
            username: el.required("username")?.to_string(),
            rating: el.number_or("rating", UNRATED),
            played: el.number_or("played", 0),
            won: el.number_or("won", 0),
            lost: el.number_or("lost", 0),
            drawn: el.number_or("drawn", 0),
            streak: el.number_or("streak", 0),
        })
    }
}

// ---------------------------------------------------------------------------
// PlayerRecord
// ---------------------------------------------------------------------------

/// One user's position at a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub username: String,
    pub seat: SeatNum,
    pub status: PlayerStatus,
}

impl PlayerRecord {
    pub(crate) fn write_attrs(&self, el: Element) -> Element {
        el.with_attr("username", &self.username)
            .with_attr("seat", self.seat.0)
            .with_value("status", self.status)
    }

    pub(crate) fn read_attrs(el: &Element) -> Result<Self, DecodeError> {
        Ok(Self {
            username: el.required("username")?.to_string(),
            seat: SeatNum(el.number_or("seat", SeatNum::NOT_SEATED.0)),
            status: el.value_or("status", PlayerStatus::Viewing)?,
        })
    }
}

impl WireRecord for PlayerRecord {
    const TAG: &'static str = "player";

    fn to_element(&self) -> Element {
        self.write_attrs(Element::new(Self::TAG))
    }

    fn from_element(el: &Element) -> Result<Self, DecodeError> {
        Self::read_attrs(el)
    }
}

// ---------------------------------------------------------------------------
// TableRecord
// ---------------------------------------------------------------------------

/// Full snapshot of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    pub table: TableNum,
    pub visibility: Visibility,
    pub owner: String,
    /// Number of seats; seat numbers run over `[0, seats)`.
    pub seats: u32,
    /// Seated players required before anyone may declare ready.
    pub min_players: u32,
    pub in_progress: bool,
    pub created: DateTime<Utc>,
    /// Game-specific options, opaque to the sync layer.
    pub properties: BTreeMap<String, String>,
    pub players: Vec<PlayerRecord>,
}

pub(crate) fn property_elements(
    properties: &BTreeMap<String, String>,
) -> impl Iterator<Item = Element> + '_ {
    properties.iter().map(|(name, value)| {
        Element::new("property")
            .with_attr("name", name)
            .with_attr("value", value)
    })
}

pub(crate) fn read_properties(
    el: &Element,
) -> Result<BTreeMap<String, String>, DecodeError> {
    el.children_named("property")
        .map(|p| {
            Ok((
                p.required("name")?.to_string(),
                p.attr("value").unwrap_or_default().to_string(),
            ))
        })
        .collect()
}

fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}

impl WireRecord for TableRecord {
    const TAG: &'static str = "table";

    fn to_element(&self) -> Element {
        Element::new(Self::TAG)
            .with_attr("table", self.table.0)
            .with_value("visibility", self.visibility)
            .with_attr("owner", &self.owner)
            .with_attr("seats", self.seats)
            .with_attr("min-players", self.min_players)
            .with_attr("in-progress", self.in_progress)
            .with_attr("created", self.created.to_rfc3339())
            .with_children(property_elements(&self.properties))
            .with_children(self.players.iter().map(WireRecord::to_element))
    }

    fn from_element(el: &Element) -> Result<Self, DecodeError> {
        Ok(Self {
            table: TableNum(el.required_number_or("table", TableNum::LOBBY.0)?),
            visibility: el.value_or("visibility", Visibility::Public)?,
            owner: el.required("owner")?.to_string(),
            seats: el.number_or("seats", 0),
            min_players: el.number_or("min-players", 0),
            in_progress: el.flag("in-progress"),
            created: parse_timestamp(el.attr("created")),
            properties: read_properties(el)?,
            players: PlayerRecord::children_of(el)?,
        })
    }
}

// ---------------------------------------------------------------------------
// PlayerResult
// ---------------------------------------------------------------------------

/// One player's outcome in a `game-over` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerResult {
    pub username: String,
    pub result: GameResult,
    /// The player's rating after the game, when the server rates it.
    pub rating: Option<i32>,
}

impl WireRecord for PlayerResult {
    const TAG: &'static str = "result";

    fn to_element(&self) -> Element {
        Element::new(Self::TAG)
            .with_attr("username", &self.username)
            .with_value("result", self.result)
            .with_opt_attr("rating", self.rating)
    }

    fn from_element(el: &Element) -> Result<Self, DecodeError> {
        Ok(Self {
            username: el.required("username")?.to_string(),
            result: el.value("result")?,
            rating: el.opt_number_or("rating", UNRATED),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_table() -> TableRecord {
        TableRecord {
            table: TableNum(7),
            visibility: Visibility::Private,
            owner: "ann".into(),
            seats: 4,
            min_players: 2,
            in_progress: false,
            created: parse_timestamp(Some("2026-03-01T12:30:00Z")),
            properties: BTreeMap::from([("variant".into(), "blitz".into())]),
            players: vec![PlayerRecord {
                username: "ann".into(),
                seat: SeatNum(0),
                status: PlayerStatus::Seated,
            }],
        }
    }

    #[test]
    fn test_table_record_survives_element_form() {
        let table = sample_table();
        let decoded = TableRecord::from_element(&table.to_element()).unwrap();
        assert_eq!(decoded, table);
    }

    #[test]
    fn test_table_snapshot_with_unknown_attribute_still_decodes() {
        let el = sample_table().to_element().with_attr("colour", "green");
        let decoded = TableRecord::from_element(&el).unwrap();
        assert_eq!(decoded.table, TableNum(7));
        assert_eq!(decoded.owner, "ann");
        assert_eq!(decoded.properties["variant"], "blitz");
    }

    #[test]
    fn test_table_without_owner_is_rejected() {
        let mut el = sample_table().to_element();
        el.attrs.remove("owner");
        assert!(matches!(
            TableRecord::from_element(&el),
            Err(DecodeError::MissingAttribute { attr: "owner", .. })
        ));
    }

    #[test]
    fn test_garbage_numbers_fall_back_to_sentinels() {
        let el = Element::new("user")
            .with_attr("username", "bob")
            .with_attr("rating", "n/a")
            .with_attr("played", "-3");
        let user = UserRecord::from_element(&el).unwrap();
        assert_eq!(user.rating, UNRATED);
        assert_eq!(user.played, 0);

        let el = Element::new("player")
            .with_attr("username", "bob")
            .with_attr("seat", "first");
        let player = PlayerRecord::from_element(&el).unwrap();
        assert_eq!(player.seat, SeatNum::NOT_SEATED);
        assert_eq!(player.status, PlayerStatus::Viewing);
    }

    #[test]
    fn test_bad_timestamp_reads_as_epoch() {
        let mut el = sample_table().to_element();
        el.attrs.insert("created".into(), "yesterday".into());
        let decoded = TableRecord::from_element(&el).unwrap();
        assert_eq!(decoded.created, DateTime::<Utc>::default());
    }
}
