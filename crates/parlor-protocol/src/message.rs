//! The message catalog: one variant per wire tag.
//!
//! The set is closed. Dispatchers `match` on [`Message`] and the compiler
//! checks that every tag is handled. [`encode`] and [`decode`] are the
//! only places that know the attribute names.
//!
//! Decoding is tolerant: unknown attributes and unknown children are
//! ignored, numeric attributes that fail to parse fall back to a sentinel
//! (see `records.rs`), and only a missing required attribute or an
//! out-of-set enumerated value is a [`DecodeError`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::records::{property_elements, read_properties};
use crate::{
    DecodeError, Element, ExchangeKind, PlayerRecord, PlayerResult, SeatNum,
    Serial, TableNum, TableRecord, UserRecord, Visibility, WireRecord,
};

// ---------------------------------------------------------------------------
// Payload structs
// ---------------------------------------------------------------------------

/// Client → server login request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connect {
    pub username: String,
    pub password: Option<String>,
    pub version: Option<String>,
    /// Ask the server to leave the user list out of the lobby snapshot.
    pub constrained: bool,
}

/// A status code from the server, optionally with a description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: i32,
    pub message: Option<String>,
}

impl ErrorReport {
    /// Fallback for unparseable codes.
    pub const UNKNOWN: i32 = -1;
    pub const LOGIN_FAILED: i32 = 1;
    pub const DUPLICATE_USER: i32 = 2;
    pub const BAD_VERSION: i32 = 3;
    pub const TABLE_FULL: i32 = 4;
    pub const SEAT_TAKEN: i32 = 5;
    pub const NOT_ALLOWED: i32 = 6;
}

/// The full lobby snapshot sent on successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// The user this connection is logged in as.
    pub username: String,
    pub users: Vec<UserRecord>,
    pub tables: Vec<TableRecord>,
}

/// A broadcast or table chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub username: String,
    pub text: String,
}

/// A private chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateChat {
    pub username: String,
    pub recipient: String,
    pub text: String,
}

/// Table creation: request when sent by a client, acknowledgment (with
/// `snapshot`) when sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTable {
    pub visibility: Visibility,
    pub seats: u32,
    pub min_players: u32,
    pub properties: BTreeMap<String, String>,
    pub snapshot: Option<TableRecord>,
}

/// A draw offer or an invitation; both are three-state handshakes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub kind: ExchangeKind,
    pub serial: Serial,
    /// Who sent this phase of the exchange.
    pub username: String,
    /// Who it is addressed to. Required for requests.
    pub recipient: Option<String>,
}

/// End of a game with every involved player's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOver {
    pub reason: Option<String>,
    pub results: Vec<PlayerResult>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Every message that can travel between client and server.
///
/// Table-scoped variants carry a `table` field; the rest are lobby scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    // -- lobby scope --
    Connect(Connect),
    Error(ErrorReport),
    Game(GameSnapshot),
    User(UserRecord),
    ChatClient(Chat),
    ChatPrivate(PrivateChat),
    NewTable(NewTable),
    Disconnect { username: Option<String> },
    KeepAlive,

    // -- table scope --
    ChatTable { table: TableNum, chat: Chat },
    JoinTable { table: TableNum, username: Option<String> },
    ExitTable { table: TableNum, username: Option<String> },
    RemoveTable { table: TableNum },
    PlayerState { table: TableNum, player: PlayerRecord },
    SitDown { table: TableNum, seat: SeatNum },
    StandUp { table: TableNum },
    ReadyToStart { table: TableNum },
    StartGame { table: TableNum, first_seat: Option<SeatNum> },
    NextTurn { table: TableNum, seat: SeatNum },
    Resign { table: TableNum, username: Option<String> },
    GameOver { table: TableNum, outcome: GameOver },
    OfferDraw { table: TableNum, exchange: Exchange },
    Invite { table: TableNum, exchange: Exchange },
    ControllerProperty { table: TableNum, name: String, value: String },
    ControllerObject {
        table: TableNum,
        name: Option<String>,
        children: Vec<Element>,
    },
}

impl Message {
    /// The wire tag of this message.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Error(_) => "error",
            Self::Game(_) => "game",
            Self::User(_) => "user",
            Self::ChatClient(_) => "chat-client",
            Self::ChatPrivate(_) => "chat-private",
            Self::NewTable(_) => "new-table",
            Self::Disconnect { .. } => "disconnect",
            Self::KeepAlive => "keep-alive",
            Self::ChatTable { .. } => "chat-table",
            Self::JoinTable { .. } => "join-table",
            Self::ExitTable { .. } => "exit-table",
            Self::RemoveTable { .. } => "remove-table",
            Self::PlayerState { .. } => "player-state",
            Self::SitDown { .. } => "sit-down",
            Self::StandUp { .. } => "stand-up",
            Self::ReadyToStart { .. } => "ready-to-start",
            Self::StartGame { .. } => "start-game",
            Self::NextTurn { .. } => "next-turn",
            Self::Resign { .. } => "resign",
            Self::GameOver { .. } => "game-over",
            Self::OfferDraw { .. } => "offer-draw",
            Self::Invite { .. } => "invite",
            Self::ControllerProperty { .. } => "controller-property",
            Self::ControllerObject { .. } => "controller-object",
        }
    }

    /// The table this message is scoped to, `None` for lobby scope.
    ///
    /// A table-scoped message whose number decoded to the lobby sentinel
    /// also reports `None`.
    pub fn table_num(&self) -> Option<TableNum> {
        self.table_slot().copied().filter(|t| !t.is_lobby())
    }

    /// Writes `table` into a table-scoped message. Returns `false` (and
    /// leaves the message alone) for lobby-scope messages.
    pub fn stamp_table(&mut self, table: TableNum) -> bool {
        match self.table_slot_mut() {
            Some(slot) => {
                *slot = table;
                true
            }
            None => false,
        }
    }

    fn table_slot(&self) -> Option<&TableNum> {
        match self {
            Self::ChatTable { table, .. }
            | Self::JoinTable { table, .. }
            | Self::ExitTable { table, .. }
            | Self::RemoveTable { table }
            | Self::PlayerState { table, .. }
            | Self::SitDown { table, .. }
            | Self::StandUp { table }
            | Self::ReadyToStart { table }
            | Self::StartGame { table, .. }
            | Self::NextTurn { table, .. }
            | Self::Resign { table, .. }
            | Self::GameOver { table, .. }
            | Self::OfferDraw { table, .. }
            | Self::Invite { table, .. }
            | Self::ControllerProperty { table, .. }
            | Self::ControllerObject { table, .. } => Some(table),
            _ => None,
        }
    }

    fn table_slot_mut(&mut self) -> Option<&mut TableNum> {
        match self {
            Self::ChatTable { table, .. }
            | Self::JoinTable { table, .. }
            | Self::ExitTable { table, .. }
            | Self::RemoveTable { table }
            | Self::PlayerState { table, .. }
            | Self::SitDown { table, .. }
            | Self::StandUp { table }
            | Self::ReadyToStart { table }
            | Self::StartGame { table, .. }
            | Self::NextTurn { table, .. }
            | Self::Resign { table, .. }
            | Self::GameOver { table, .. }
            | Self::OfferDraw { table, .. }
            | Self::Invite { table, .. }
            | Self::ControllerProperty { table, .. }
            | Self::ControllerObject { table, .. } => Some(table),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// encode
// ---------------------------------------------------------------------------

fn exchange_element(tag: &str, table: TableNum, ex: &Exchange) -> Element {
    Element::new(tag)
        .with_attr("table", table.0)
        .with_value("kind", ex.kind)
        .with_attr("serial", ex.serial.0)
        .with_attr("username", &ex.username)
        .with_opt_attr("recipient", ex.recipient.as_ref())
}

/// Converts a message to its wire element.
pub fn encode(message: &Message) -> Element {
    let el = Element::new(message.tag());
    let el = match message.table_slot() {
        Some(table) => el.with_attr("table", table.0),
        None => el,
    };

    match message {
        Message::Connect(c) => el
            .with_attr("username", &c.username)
            .with_opt_attr("password", c.password.as_ref())
            .with_opt_attr("version", c.version.as_ref())
            .with_attr("constrained", c.constrained),
        Message::Error(e) => {
            let el = el.with_attr("code", e.code);
            match &e.message {
                Some(text) => el.with_text(text.clone()),
                None => el,
            }
        }
        Message::Game(g) => el
            .with_attr("username", &g.username)
            .with_children(g.users.iter().map(WireRecord::to_element))
            .with_children(g.tables.iter().map(WireRecord::to_element)),
        Message::User(u) => u.to_element(),
        Message::ChatClient(c) => el
            .with_attr("username", &c.username)
            .with_text(c.text.clone()),
        Message::ChatPrivate(c) => el
            .with_attr("username", &c.username)
            .with_attr("recipient", &c.recipient)
            .with_text(c.text.clone()),
        Message::NewTable(n) => {
            let el = el
                .with_value("visibility", n.visibility)
                .with_attr("seats", n.seats)
                .with_attr("min-players", n.min_players)
                .with_children(property_elements(&n.properties));
            match &n.snapshot {
                Some(table) => el.with_child(table.to_element()),
                None => el,
            }
        }
        Message::Disconnect { username } => {
            el.with_opt_attr("username", username.as_ref())
        }
        Message::KeepAlive => el,
        Message::ChatTable { chat, .. } => el
            .with_attr("username", &chat.username)
            .with_text(chat.text.clone()),
        Message::JoinTable { username, .. }
        | Message::ExitTable { username, .. }
        | Message::Resign { username, .. } => {
            el.with_opt_attr("username", username.as_ref())
        }
        Message::RemoveTable { .. }
        | Message::StandUp { .. }
        | Message::ReadyToStart { .. } => el,
        Message::PlayerState { player, .. } => player.write_attrs(el),
        Message::SitDown { seat, .. } | Message::NextTurn { seat, .. } => {
            el.with_attr("seat", seat.0)
        }
        Message::StartGame { first_seat, .. } => {
            el.with_opt_attr("first-seat", first_seat.map(|s| s.0))
        }
        Message::GameOver { outcome, .. } => el
            .with_opt_attr("reason", outcome.reason.as_ref())
            .with_children(outcome.results.iter().map(WireRecord::to_element)),
        Message::OfferDraw { table, exchange }
        | Message::Invite { table, exchange } => {
            exchange_element(message.tag(), *table, exchange)
        }
        Message::ControllerProperty { name, value, .. } => el
            .with_attr("name", name)
            .with_attr("value", value),
        Message::ControllerObject { name, children, .. } => el
            .with_opt_attr("name", name.as_ref())
            .with_children(children.iter().cloned()),
    }
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

fn table_of(el: &Element) -> Result<TableNum, DecodeError> {
    Ok(TableNum(el.required_number_or("table", TableNum::LOBBY.0)?))
}

fn opt_string(el: &Element, name: &str) -> Option<String> {
    el.attr(name).map(str::to_string)
}

fn exchange_of(el: &Element) -> Result<Exchange, DecodeError> {
    let kind: ExchangeKind = el.value("kind")?;
    let recipient = opt_string(el, "recipient");
    if kind == ExchangeKind::Request && recipient.is_none() {
        return Err(DecodeError::MissingAttribute {
            tag: el.tag.clone(),
            attr: "recipient",
        });
    }
    Ok(Exchange {
        kind,
        serial: Serial(el.required_number_or("serial", Serial::UNKNOWN.0)?),
        username: el.required("username")?.to_string(),
        recipient,
    })
}

/// Converts a wire element to a message.
///
/// # Errors
/// [`DecodeError::UnknownTag`] for tags outside the catalog (callers ignore
/// it), otherwise a missing required attribute/child or an enumerated
/// attribute outside its set.
pub fn decode(el: &Element) -> Result<Message, DecodeError> {
    let message = match el.tag.as_str() {
        "connect" => Message::Connect(Connect {
            username: el.required("username")?.to_string(),
            password: opt_string(el, "password"),
            version: opt_string(el, "version"),
            constrained: el.flag("constrained"),
        }),
        "error" => Message::Error(ErrorReport {
            code: el.required_number_or("code", ErrorReport::UNKNOWN)?,
            message: el.text.clone(),
        }),
        "game" => Message::Game(GameSnapshot {
            username: el.required("username")?.to_string(),
            users: UserRecord::children_of(el)?,
            tables: TableRecord::children_of(el)?,
        }),
        "user" => Message::User(UserRecord::from_element(el)?),
        "chat-client" => Message::ChatClient(Chat {
            username: el.required("username")?.to_string(),
            text: el.text_or_empty(),
        }),
        "chat-private" => Message::ChatPrivate(PrivateChat {
            username: el.required("username")?.to_string(),
            recipient: el.required("recipient")?.to_string(),
            text: el.text_or_empty(),
        }),
        "new-table" => Message::NewTable(NewTable {
            visibility: el.value_or("visibility", Visibility::Public)?,
            seats: el.number_or("seats", 0),
            min_players: el.number_or("min-players", 0),
            properties: read_properties(el)?,
            snapshot: el
                .child(TableRecord::TAG)
                .map(TableRecord::from_element)
                .transpose()?,
        }),
        "disconnect" => Message::Disconnect {
            username: opt_string(el, "username"),
        },
        "keep-alive" => Message::KeepAlive,
        "chat-table" => Message::ChatTable {
            table: table_of(el)?,
            chat: Chat {
                username: el.required("username")?.to_string(),
                text: el.text_or_empty(),
            },
        },
        "join-table" => Message::JoinTable {
            table: table_of(el)?,
            username: opt_string(el, "username"),
        },
        "exit-table" => Message::ExitTable {
            table: table_of(el)?,
            username: opt_string(el, "username"),
        },
        "remove-table" => Message::RemoveTable {
            table: table_of(el)?,
        },
        "player-state" => Message::PlayerState {
            table: table_of(el)?,
            player: PlayerRecord::read_attrs(el)?,
        },
        "sit-down" => Message::SitDown {
            table: table_of(el)?,
            seat: SeatNum(el.required_number_or("seat", SeatNum::NOT_SEATED.0)?),
        },
        "stand-up" => Message::StandUp {
            table: table_of(el)?,
        },
        "ready-to-start" => Message::ReadyToStart {
            table: table_of(el)?,
        },
        "start-game" => Message::StartGame {
            table: table_of(el)?,
            first_seat: el
                .opt_number_or("first-seat", SeatNum::NOT_SEATED.0)
                .map(SeatNum),
        },
        "next-turn" => Message::NextTurn {
            table: table_of(el)?,
            seat: SeatNum(el.required_number_or("seat", SeatNum::NOT_SEATED.0)?),
        },
        "resign" => Message::Resign {
            table: table_of(el)?,
            username: opt_string(el, "username"),
        },
        "game-over" => Message::GameOver {
            table: table_of(el)?,
            outcome: GameOver {
                reason: opt_string(el, "reason"),
                results: PlayerResult::children_of(el)?,
            },
        },
        "offer-draw" => Message::OfferDraw {
            table: table_of(el)?,
            exchange: exchange_of(el)?,
        },
        "invite" => Message::Invite {
            table: table_of(el)?,
            exchange: exchange_of(el)?,
        },
        "controller-property" => Message::ControllerProperty {
            table: table_of(el)?,
            name: el.required("name")?.to_string(),
            value: el.attr("value").unwrap_or_default().to_string(),
        },
        "controller-object" => Message::ControllerObject {
            table: table_of(el)?,
            name: opt_string(el, "name"),
            children: el.children.clone(),
        },
        other => return Err(DecodeError::UnknownTag(other.to_string())),
    };
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GameResult, PlayerStatus, UNRATED};
    use pretty_assertions::assert_eq;

    fn round_trip(message: Message) {
        let decoded = decode(&encode(&message)).expect("should decode");
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_lobby_messages_round_trip() {
        round_trip(Message::Connect(Connect {
            username: "ann".into(),
            password: Some("secret".into()),
            version: None,
            constrained: true,
        }));
        round_trip(Message::Error(ErrorReport {
            code: ErrorReport::LOGIN_FAILED,
            message: Some("bad password".into()),
        }));
        round_trip(Message::Error(ErrorReport {
            code: ErrorReport::SEAT_TAKEN,
            message: None,
        }));
        round_trip(Message::User(UserRecord::new("bob")));
        round_trip(Message::ChatPrivate(PrivateChat {
            username: "ann".into(),
            recipient: "bob".into(),
            text: "psst".into(),
        }));
        round_trip(Message::Disconnect { username: None });
        round_trip(Message::KeepAlive);
    }

    #[test]
    fn test_empty_chat_text_round_trips() {
        round_trip(Message::ChatClient(Chat {
            username: "ann".into(),
            text: String::new(),
        }));
    }

    #[test]
    fn test_multiline_chat_text_round_trips() {
        round_trip(Message::ChatTable {
            table: TableNum(2),
            chat: Chat {
                username: "ann".into(),
                text: "line one\nline two <b>".into(),
            },
        });
    }

    #[test]
    fn test_provisional_rating_round_trips() {
        let user = UserRecord::new("newbie");
        assert_eq!(user.rating, UNRATED);
        round_trip(Message::User(user));
    }

    #[test]
    fn test_maximum_table_number_round_trips() {
        round_trip(Message::StandUp {
            table: TableNum(u32::MAX),
        });
    }

    #[test]
    fn test_game_snapshot_round_trips() {
        let table = TableRecord {
            table: TableNum(1),
            visibility: Visibility::Public,
            owner: "ann".into(),
            seats: 2,
            min_players: 2,
            in_progress: true,
            created: chrono::DateTime::<chrono::Utc>::default(),
            properties: BTreeMap::new(),
            players: vec![
                PlayerRecord {
                    username: "ann".into(),
                    seat: SeatNum(0),
                    status: PlayerStatus::Playing,
                },
                PlayerRecord {
                    username: "cat".into(),
                    seat: SeatNum::NOT_SEATED,
                    status: PlayerStatus::Viewing,
                },
            ],
        };
        round_trip(Message::Game(GameSnapshot {
            username: "ann".into(),
            users: vec![UserRecord::new("ann"), UserRecord::new("cat")],
            tables: vec![table.clone()],
        }));
        round_trip(Message::NewTable(NewTable {
            visibility: Visibility::Public,
            seats: 2,
            min_players: 2,
            properties: BTreeMap::from([("clock".into(), "300".into())]),
            snapshot: Some(table),
        }));
    }

    #[test]
    fn test_table_messages_round_trip() {
        let t = TableNum(9);
        round_trip(Message::JoinTable { table: t, username: Some("bob".into()) });
        round_trip(Message::ExitTable { table: t, username: None });
        round_trip(Message::RemoveTable { table: t });
        round_trip(Message::PlayerState {
            table: t,
            player: PlayerRecord {
                username: "bob".into(),
                seat: SeatNum(2),
                status: PlayerStatus::Seated,
            },
        });
        round_trip(Message::SitDown { table: t, seat: SeatNum(0) });
        round_trip(Message::ReadyToStart { table: t });
        round_trip(Message::StartGame { table: t, first_seat: None });
        round_trip(Message::StartGame { table: t, first_seat: Some(SeatNum(1)) });
        round_trip(Message::NextTurn { table: t, seat: SeatNum(1) });
        round_trip(Message::Resign { table: t, username: Some("bob".into()) });
        round_trip(Message::GameOver {
            table: t,
            outcome: GameOver {
                reason: Some("resignation".into()),
                results: vec![
                    PlayerResult {
                        username: "ann".into(),
                        result: GameResult::Win,
                        rating: Some(1510),
                    },
                    PlayerResult {
                        username: "bob".into(),
                        result: GameResult::Lose,
                        rating: None,
                    },
                ],
            },
        });
        round_trip(Message::ControllerProperty {
            table: t,
            name: "move".into(),
            value: "e2e4".into(),
        });
        round_trip(Message::ControllerObject {
            table: t,
            name: Some("board".into()),
            children: vec![Element::new("cell").with_attr("x", 1)],
        });
    }

    #[test]
    fn test_exchanges_round_trip() {
        let t = TableNum(3);
        for kind in [ExchangeKind::Request, ExchangeKind::Accept, ExchangeKind::Decline] {
            let exchange = Exchange {
                kind,
                serial: Serial(7),
                username: "ann".into(),
                recipient: Some("bob".into()),
            };
            round_trip(Message::OfferDraw { table: t, exchange: exchange.clone() });
            round_trip(Message::Invite { table: t, exchange });
        }
    }

    #[test]
    fn test_request_without_recipient_is_rejected() {
        let el = Element::new("offer-draw")
            .with_attr("table", 3)
            .with_attr("kind", "request")
            .with_attr("serial", 7)
            .with_attr("username", "ann");
        assert!(matches!(
            decode(&el),
            Err(DecodeError::MissingAttribute { attr: "recipient", .. })
        ));
    }

    #[test]
    fn test_unknown_tag_is_reported_as_such() {
        let err = decode(&Element::new("fly-to-moon")).unwrap_err();
        assert!(err.is_unknown_tag());
    }

    #[test]
    fn test_unknown_attributes_are_ignored() {
        let el = Element::new("sit-down")
            .with_attr("table", 4)
            .with_attr("seat", 1)
            .with_attr("cushion", "velvet");
        assert_eq!(
            decode(&el).unwrap(),
            Message::SitDown { table: TableNum(4), seat: SeatNum(1) }
        );
    }

    #[test]
    fn test_missing_table_attribute_is_an_error() {
        let el = Element::new("stand-up");
        assert!(matches!(
            decode(&el),
            Err(DecodeError::MissingAttribute { attr: "table", .. })
        ));
    }

    #[test]
    fn test_garbage_table_number_is_lobby_scope() {
        let el = Element::new("stand-up").with_attr("table", "four");
        let msg = decode(&el).unwrap();
        assert_eq!(msg.table_num(), None);
    }

    #[test]
    fn test_garbage_serial_never_matches() {
        let el = Element::new("offer-draw")
            .with_attr("table", 3)
            .with_attr("kind", "accept")
            .with_attr("serial", "seven")
            .with_attr("username", "bob");
        match decode(&el).unwrap() {
            Message::OfferDraw { exchange, .. } => {
                assert_eq!(exchange.serial, Serial::UNKNOWN);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stamp_table_only_touches_table_scoped_messages() {
        let mut msg = Message::StandUp { table: TableNum::LOBBY };
        assert!(msg.stamp_table(TableNum(5)));
        assert_eq!(msg.table_num(), Some(TableNum(5)));

        let mut lobby = Message::KeepAlive;
        assert!(!lobby.stamp_table(TableNum(5)));
        assert_eq!(lobby.table_num(), None);
    }
}
