//! A full login → create table → sit → start → resign round trip against
//! an in-process scripted server.
//!
//! Run with `RUST_LOG=debug cargo run -p scripted-lobby` to watch the
//! dispatcher work.

use parlor::prelude::*;
use parlor::{PlayerListEvent, Subscription};
use parlor_protocol::{
    Codec, GameOver, GameSnapshot, JsonCodec, Message, NewTable, PlayerRecord, PlayerResult,
    TableRecord, UserRecord,
};
use parlor_transport::{Connection, StreamConnection};
use tokio::io::DuplexStream;

// ---------------------------------------------------------------------------
// Game rules
// ---------------------------------------------------------------------------

/// Counts the moves it sees and answers each with the next number.
struct Counting;

struct Counter {
    moves: u32,
}

impl GameController for Counter {
    fn receive_opaque_message(&mut self, table: &Table, message: OpaqueMessage) -> Vec<OpaqueMessage> {
        let OpaqueMessage::Property { name, value } = message else {
            return Vec::new();
        };
        self.moves += 1;
        tracing::info!(table = %table.number(), %name, %value, moves = self.moves, "opponent moved");
        Vec::new()
    }

    fn on_game_start(&mut self, table: &Table) -> Vec<OpaqueMessage> {
        tracing::info!(table = %table.number(), turn = ?table.players().current_seat(), "opening move");
        vec![OpaqueMessage::Property {
            name: "move".into(),
            value: "1".into(),
        }]
    }
}

impl GameModule for Counting {
    fn create_controller(&self, _table: &Table) -> Box<dyn GameController> {
        Box::new(Counter { moves: 0 })
    }
}

// ---------------------------------------------------------------------------
// Scripted server
// ---------------------------------------------------------------------------

const TABLE: TableNum = TableNum(1);
const BOT: &str = "bot";

struct Script {
    conn: StreamConnection<DuplexStream>,
    user: String,
    seat: SeatNum,
}

impl Script {
    async fn send(&self, message: Message) -> Result<(), ParlorError> {
        let frame = JsonCodec.encode_message(&message)?;
        self.conn.send(&frame).await?;
        Ok(())
    }

    fn player(&self, username: &str, seat: SeatNum, status: PlayerStatus) -> Message {
        Message::PlayerState {
            table: TABLE,
            player: PlayerRecord {
                username: username.to_string(),
                seat,
                status,
            },
        }
    }

    async fn run(mut self) -> Result<(), ParlorError> {
        while let Some(frame) = self.conn.recv().await? {
            let message = JsonCodec.decode_message(&frame)?;
            tracing::debug!(tag = message.tag(), "server received");
            match message {
                Message::Connect(connect) => {
                    self.user = connect.username;
                    self.send(Message::Game(GameSnapshot {
                        username: self.user.clone(),
                        users: vec![UserRecord::new(&self.user), UserRecord::new(BOT)],
                        tables: Vec::new(),
                    }))
                    .await?;
                }
                Message::NewTable(request) => {
                    let snapshot = TableRecord {
                        table: TABLE,
                        visibility: request.visibility,
                        owner: self.user.clone(),
                        seats: request.seats,
                        min_players: request.min_players,
                        in_progress: false,
                        created: Default::default(),
                        properties: request.properties.clone(),
                        players: vec![
                            PlayerRecord {
                                username: BOT.to_string(),
                                seat: SeatNum(1),
                                status: PlayerStatus::Seated,
                            },
                            PlayerRecord {
                                username: self.user.clone(),
                                seat: SeatNum::NOT_SEATED,
                                status: PlayerStatus::Viewing,
                            },
                        ],
                    };
                    self.send(Message::NewTable(NewTable {
                        snapshot: Some(snapshot),
                        ..request
                    }))
                    .await?;
                }
                Message::SitDown { seat, .. } => {
                    self.seat = seat;
                    let echo = self.player(&self.user, seat, PlayerStatus::Seated);
                    self.send(echo).await?;
                }
                Message::ReadyToStart { .. } => {
                    let me = self.player(&self.user, self.seat, PlayerStatus::Ready);
                    let bot = self.player(BOT, SeatNum(1), PlayerStatus::Ready);
                    self.send(me).await?;
                    self.send(bot).await?;
                    self.send(Message::StartGame {
                        table: TABLE,
                        first_seat: None,
                    })
                    .await?;
                }
                Message::ControllerProperty { name, value, .. } => {
                    let next = value.parse::<u32>().unwrap_or(0) + 1;
                    self.send(Message::ControllerProperty {
                        table: TABLE,
                        name,
                        value: next.to_string(),
                    })
                    .await?;
                }
                Message::Resign { .. } => {
                    self.send(Message::GameOver {
                        table: TABLE,
                        outcome: GameOver {
                            reason: Some("resignation".into()),
                            results: vec![
                                PlayerResult {
                                    username: self.user.clone(),
                                    result: GameResult::Lose,
                                    rating: None,
                                },
                                PlayerResult {
                                    username: BOT.to_string(),
                                    result: GameResult::Win,
                                    rating: None,
                                },
                            ],
                        },
                    })
                    .await?;
                }
                Message::Disconnect { .. } => break,
                other => tracing::debug!(tag = other.tag(), "server ignored"),
            }
        }
        tracing::info!("server done");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

async fn seated(players: &mut Subscription<PlayerListEvent>, username: &str) {
    while let Some(event) = players.recv().await {
        if let PlayerListEvent::Moved { username: who, seat, status } = event {
            if who == username && status == PlayerStatus::Seated {
                tracing::info!(%seat, "seat confirmed by server");
                return;
            }
        }
    }
}

async fn until(events: &mut Subscription<TableEvent>, wanted: fn(&TableEvent) -> bool) {
    while let Some(event) = events.recv().await {
        if wanted(&event) {
            return;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ParlorError> {
    parlor::init_tracing();

    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let script = Script {
        conn: StreamConnection::new(server_end),
        user: String::new(),
        seat: SeatNum::NOT_SEATED,
    };
    let server = tokio::spawn(script.run());

    let session = SessionBuilder::new()
        .game_module(Counting)
        .open(StreamConnection::new(client_end));
    session.login("ann", None).await?;

    let table = session
        .create_table(&TableOptions::default().with_property("variant", "counting"))
        .await?;
    let mut events = table.subscribe()?;
    let mut players = table.with_table(|t| t.players().subscribe())?;

    table.sit_down(SeatNum(0)).await?;
    seated(&mut players, "ann").await;

    table.ready_to_start().await?;
    until(&mut events, |e| matches!(e, TableEvent::GameStarted { .. })).await;

    table.resign().await?;
    until(&mut events, |e| matches!(e, TableEvent::GameOver(_))).await;

    let record = session.with_game(|g| g.me().map(|u| u.record().clone()))?;
    if let Some(me) = record {
        tracing::info!(played = me.played, lost = me.lost, streak = me.streak, "final statistics");
    }

    session.logout().await?;
    match server.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "server task failed");
            Ok(())
        }
    }
}
