//! Identity and enumeration types shared by every message.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A table number, unique within one server session.
///
/// `0` is reserved: a message carrying table 0 (or no table at all) is a
/// lobby-scope message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TableNum(pub u32);

impl TableNum {
    /// The lobby scope: "not bound to any table".
    pub const LOBBY: TableNum = TableNum(0);

    /// Returns `true` for the lobby scope.
    pub fn is_lobby(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TableNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T-{}", self.0)
    }
}

/// A seat number at a table, or the [`NOT_SEATED`](SeatNum::NOT_SEATED)
/// sentinel.
///
/// Seated values are stable integers in `[0, seats)`. On the wire the
/// sentinel is written as `-1`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SeatNum(pub i32);

impl SeatNum {
    /// The player occupies no seat.
    pub const NOT_SEATED: SeatNum = SeatNum(-1);

    /// Returns `true` unless this is the sentinel.
    pub fn is_seated(self) -> bool {
        self.0 >= 0
    }

    /// The seat as a list index, `None` for the sentinel.
    pub fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

impl Default for SeatNum {
    fn default() -> Self {
        Self::NOT_SEATED
    }
}

impl fmt::Display for SeatNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_seated() {
            write!(f, "seat {}", self.0)
        } else {
            f.write_str("not seated")
        }
    }
}

/// Correlation number linking a request to its eventual reply.
///
/// Serial `0` is never issued, so a reply that failed to parse (and fell
/// back to `0`) can never match a pending request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Serial(pub u64);

impl Serial {
    /// Fallback for unparseable serials.
    pub const UNKNOWN: Serial = Serial(0);
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Rating of a user with no rated games yet.
pub const UNRATED: i32 = -1;

// ---------------------------------------------------------------------------
// Enumerations carried as attribute values
// ---------------------------------------------------------------------------

/// Implemented by every enum that travels as a lowercase attribute value.
pub trait WireValue: Sized + Copy + 'static {
    /// Every variant, in declaration order.
    const ALL: &'static [Self];

    /// The attribute spelling.
    fn as_str(self) -> &'static str;

    /// Parses the attribute spelling back.
    fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.as_str() == value)
    }
}

/// Where a player stands at a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerStatus {
    /// At the table, no seat.
    Viewing,
    /// Holds a seat, not yet ready.
    Seated,
    /// Holds a seat and has asked to start.
    Ready,
    /// In a running game.
    Playing,
}

impl WireValue for PlayerStatus {
    const ALL: &'static [Self] =
        &[Self::Viewing, Self::Seated, Self::Ready, Self::Playing];

    fn as_str(self) -> &'static str {
        match self {
            Self::Viewing => "viewing",
            Self::Seated => "seated",
            Self::Ready => "ready",
            Self::Playing => "playing",
        }
    }
}

impl PlayerStatus {
    /// `true` for every status that holds a seat.
    pub fn holds_seat(self) -> bool {
        !matches!(self, Self::Viewing)
    }
}

/// Whether a table shows up in everybody's lobby.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl WireValue for Visibility {
    const ALL: &'static [Self] = &[Self::Public, Self::Private];

    fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// Phase of a three-state handshake (draw offers, invites).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeKind {
    Request,
    Accept,
    Decline,
}

impl WireValue for ExchangeKind {
    const ALL: &'static [Self] = &[Self::Request, Self::Accept, Self::Decline];

    fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Accept => "accept",
            Self::Decline => "decline",
        }
    }
}

/// Per-player outcome of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameResult {
    Win,
    Lose,
    Draw,
}

impl WireValue for GameResult {
    const ALL: &'static [Self] = &[Self::Win, Self::Lose, Self::Draw];

    fn as_str(self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Lose => "lose",
            Self::Draw => "draw",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_num_lobby() {
        assert!(TableNum::LOBBY.is_lobby());
        assert!(!TableNum(3).is_lobby());
        assert_eq!(TableNum(3).to_string(), "T-3");
    }

    #[test]
    fn test_seat_sentinel() {
        assert!(!SeatNum::NOT_SEATED.is_seated());
        assert_eq!(SeatNum::NOT_SEATED.index(), None);
        assert_eq!(SeatNum(2).index(), Some(2));
        assert_eq!(SeatNum::default(), SeatNum::NOT_SEATED);
    }

    #[test]
    fn test_wire_values_parse_their_own_spelling() {
        for s in PlayerStatus::ALL {
            assert_eq!(PlayerStatus::parse(s.as_str()), Some(*s));
        }
        for k in ExchangeKind::ALL {
            assert_eq!(ExchangeKind::parse(k.as_str()), Some(*k));
        }
        assert_eq!(GameResult::parse("tie"), None);
        assert_eq!(Visibility::parse("private"), Some(Visibility::Private));
    }

    #[test]
    fn test_only_viewing_lacks_a_seat() {
        assert!(!PlayerStatus::Viewing.holds_seat());
        assert!(PlayerStatus::Seated.holds_seat());
        assert!(PlayerStatus::Ready.holds_seat());
        assert!(PlayerStatus::Playing.holds_seat());
    }
}
