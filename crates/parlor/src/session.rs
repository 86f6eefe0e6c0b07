//! `Session` builder, lobby requests and per-table handles.
//!
//! This is the entry point for a Parlor client. It ties together all the
//! layers: transport → protocol → channel → replicated tables.

use std::sync::Arc;
use std::time::Duration;

use parlor_channel::{ConnectionChannel, TableChannel};
use parlor_protocol::{
    Chat, Connect, Exchange, ExchangeKind, Message, PrivateChat, SeatNum, Serial, TableNum,
};
use parlor_table::{
    Game, GameModule, NoRules, OpaqueMessage, Subscription, Table, TableError, TableEvent,
    TableOptions, Topic,
};
use parlor_transport::{Connection, TransportError};
use tokio::sync::{mpsc, oneshot};

use crate::coordinator::{Dispatcher, Shared, write_outbound};
use crate::{ParlorError, SessionConfig, SessionEvent};

/// Builder for configuring and opening a [`Session`].
///
/// # Example
///
/// ```rust,ignore
/// use parlor::prelude::*;
///
/// let session = SessionBuilder::new()
///     .config(SessionConfig::default().with_constrained(true))
///     .game_module(MyRules)
///     .connect("ws://127.0.0.1:4000")
///     .await?;
/// session.login("ann", Some("secret")).await?;
/// ```
pub struct SessionBuilder {
    config: SessionConfig,
    module: Arc<dyn GameModule>,
}

impl SessionBuilder {
    /// Creates a builder with default settings and no game rules.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            module: Arc::new(NoRules),
        }
    }

    /// Sets the session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the module that creates a controller for each table the local
    /// user joins.
    pub fn game_module(mut self, module: impl GameModule) -> Self {
        self.module = Arc::new(module);
        self
    }

    /// Opens a session over an established connection.
    ///
    /// Must be called from within a Tokio runtime: the read loop and the
    /// controller-reply writer are spawned here.
    pub fn open<C>(self, conn: C) -> Session<C>
    where
        C: Connection<Error = TransportError>,
    {
        let channel = ConnectionChannel::open(conn, self.config.channel.clone());
        let shared = Arc::new(Shared::new(channel.clone(), self.config));
        let (outbound, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_outbound(channel.clone(), rx));
        channel.set_message_handler(Dispatcher::new(
            Arc::downgrade(&shared),
            self.module,
            outbound,
        ));
        Session { shared }
    }

    /// Dials a WebSocket server and opens a session over it.
    #[cfg(feature = "websocket")]
    pub async fn connect(
        self,
        url: &str,
    ) -> Result<Session<parlor_transport::ClientConnection>, ParlorError> {
        let conn = parlor_transport::connect(url).await?;
        Ok(self.open(conn))
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One user's connection to a game server, from login to disconnect.
///
/// Cheap to clone; every clone drives the same connection. The connection
/// closes when the last clone (and the last [`TableHandle`]) is dropped.
pub struct Session<C>
where
    C: Connection<Error = TransportError>,
{
    shared: Arc<Shared<C>>,
}

impl<C> Clone for Session<C>
where
    C: Connection<Error = TransportError>,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C> Session<C>
where
    C: Connection<Error = TransportError>,
{
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Session-level events: login, status values, disconnect.
    pub fn subscribe(&self) -> Subscription<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.channel.is_closed()
    }

    pub fn is_logged_in(&self) -> bool {
        self.shared.game().is_some()
    }

    /// The logged-in user's name.
    pub fn username(&self) -> Option<String> {
        self.shared
            .game()
            .as_ref()
            .map(|game| game.username().to_string())
    }

    /// Reads the replicated lobby. The replica is updated only by the
    /// connection's read task; `f` must not block.
    ///
    /// # Errors
    /// [`ParlorError::NotLoggedIn`] before login and after disconnect.
    pub fn with_game<R>(&self, f: impl FnOnce(&Game) -> R) -> Result<R, ParlorError> {
        let guard = self.shared.game();
        let game = guard.as_ref().ok_or(ParlorError::NotLoggedIn)?;
        Ok(f(game))
    }

    /// Sends `connect` and waits for the lobby snapshot.
    ///
    /// # Errors
    /// [`ParlorError::LoginRejected`] when the server answers with an
    /// error, [`ParlorError::TimedOut`] after `login_timeout`.
    pub async fn login(&self, username: &str, password: Option<&str>) -> Result<(), ParlorError> {
        if let Some(current) = self.username() {
            return Err(ParlorError::AlreadyLoggedIn(current));
        }
        let (tx, rx) = oneshot::channel();
        self.shared.waiters().login = Some(tx);

        let client = &self.shared.config.client;
        let connect = Connect {
            username: username.to_string(),
            password: password.map(str::to_string),
            version: Some(client.client_version.clone()),
            constrained: client.constrained,
        };
        tracing::debug!(%username, constrained = client.constrained, "logging in");
        self.shared.channel.send(&Message::Connect(connect)).await?;
        self.await_reply("login", self.shared.config.login_timeout, rx)
            .await
    }

    /// Asks the server for a new table and waits for it to be created.
    /// The local user is at the returned table.
    pub async fn create_table(&self, options: &TableOptions) -> Result<TableHandle<C>, ParlorError> {
        self.require_login()?;
        let (tx, rx) = oneshot::channel();
        self.shared.waiters().created.push_back(tx);
        self.shared
            .channel
            .send(&Message::NewTable(options.to_request()))
            .await?;
        let table = self
            .await_reply("new-table", self.shared.config.reply_timeout, rx)
            .await?;
        self.table(table)
    }

    /// Joins a table as a viewer and waits for the server's
    /// acknowledgement. Returns at once if already there.
    pub async fn join_table(&self, table: TableNum) -> Result<TableHandle<C>, ParlorError> {
        self.require_login()?;
        if let Ok(handle) = self.table(table) {
            return Ok(handle);
        }
        let (tx, rx) = oneshot::channel();
        self.shared
            .waiters()
            .joined
            .entry(table)
            .or_default()
            .push(tx);
        self.shared
            .channel
            .send(&Message::JoinTable {
                table,
                username: None,
            })
            .await?;
        self.await_reply("join-table", self.shared.config.reply_timeout, rx)
            .await?;
        self.table(table)
    }

    /// A handle for a table the local user is at.
    ///
    /// # Errors
    /// [`ParlorError::UnknownTable`] if there is no open channel for it.
    pub fn table(&self, table: TableNum) -> Result<TableHandle<C>, ParlorError> {
        let channel = self
            .table_channel_for(table)
            .ok_or(ParlorError::UnknownTable(table))?;
        Ok(TableHandle {
            session: self.clone(),
            channel,
        })
    }

    /// The table channel bound to `table`, if the local user is there and
    /// has not closed it.
    pub fn table_channel_for(&self, table: TableNum) -> Option<Arc<TableChannel<C>>> {
        self.shared
            .tables()
            .get(&table)
            .filter(|channel| !channel.is_closed())
            .cloned()
    }

    /// Tables the local user is at, in ascending order.
    pub fn open_tables(&self) -> Vec<TableNum> {
        let mut tables: Vec<TableNum> = self.shared.tables().keys().copied().collect();
        tables.sort_unstable();
        tables
    }

    /// Broadcasts a chat line to the lobby.
    pub async fn chat(&self, text: &str) -> Result<(), ParlorError> {
        let username = self.require_login()?;
        let message = Message::ChatClient(Chat {
            username,
            text: text.to_string(),
        });
        self.shared.channel.send(&message).await?;
        Ok(())
    }

    /// Sends a chat line to one user.
    pub async fn chat_private(&self, recipient: &str, text: &str) -> Result<(), ParlorError> {
        let username = self.require_login()?;
        let message = Message::ChatPrivate(PrivateChat {
            username,
            recipient: recipient.to_string(),
            text: text.to_string(),
        });
        self.shared.channel.send(&message).await?;
        Ok(())
    }

    /// Answers an invitation. Accepting does not seat the local user; join
    /// the table and sit down to take a seat.
    pub async fn respond_invite(
        &self,
        table: TableNum,
        serial: Serial,
        accept: bool,
    ) -> Result<(), ParlorError> {
        let username = self.require_login()?;
        let request = self
            .shared
            .pending()
            .take(table, Topic::Invite, serial)
            .ok_or(ParlorError::UnknownRequest { table, serial })?;
        let exchange = Exchange {
            kind: reply_kind(accept),
            serial,
            username,
            recipient: Some(request.from),
        };
        self.shared
            .channel
            .send(&Message::Invite { table, exchange })
            .await?;
        Ok(())
    }

    /// Tells the server the user is leaving, then closes the connection.
    pub async fn logout(&self) -> Result<(), ParlorError> {
        let username = self.username();
        if let Err(e) = self
            .shared
            .channel
            .send(&Message::Disconnect { username })
            .await
        {
            tracing::debug!(error = %e, "disconnect notice not sent");
        }
        self.close().await
    }

    /// Closes the connection without notice.
    pub async fn close(&self) -> Result<(), ParlorError> {
        self.shared.channel.close().await?;
        Ok(())
    }

    fn require_login(&self) -> Result<String, ParlorError> {
        self.username().ok_or(ParlorError::NotLoggedIn)
    }

    async fn await_reply<T>(
        &self,
        what: &'static str,
        limit: Duration,
        rx: oneshot::Receiver<Result<T, ParlorError>>,
    ) -> Result<T, ParlorError> {
        match tokio::time::timeout(limit, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ParlorError::Disconnected),
            Err(_) => {
                self.shared.waiters().prune();
                tracing::debug!(what, ?limit, "no reply in time");
                Err(ParlorError::TimedOut(what))
            }
        }
    }
}

fn reply_kind(accept: bool) -> ExchangeKind {
    if accept {
        ExchangeKind::Accept
    } else {
        ExchangeKind::Decline
    }
}

/// Requests at one table the local user is at.
///
/// Every request is checked against the replica first and refused locally
/// when it cannot succeed. Nothing changes locally on send; the replica
/// moves only when the server's echo arrives.
pub struct TableHandle<C>
where
    C: Connection<Error = TransportError>,
{
    session: Session<C>,
    channel: Arc<TableChannel<C>>,
}

impl<C> Clone for TableHandle<C>
where
    C: Connection<Error = TransportError>,
{
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            channel: Arc::clone(&self.channel),
        }
    }
}

impl<C> TableHandle<C>
where
    C: Connection<Error = TransportError>,
{
    pub fn table(&self) -> TableNum {
        self.channel.table()
    }

    pub fn channel(&self) -> &TableChannel<C> {
        &self.channel
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    /// Reads this table's replica.
    pub fn with_table<R>(&self, f: impl FnOnce(&Table) -> R) -> Result<R, ParlorError> {
        let table = self.table();
        self.session.with_game(|game| {
            game.table(table)
                .map(f)
                .ok_or(ParlorError::Table(TableError::NotFound(table)))
        })?
    }

    /// Table events: game start and end, chat, draw offers, replies.
    pub fn subscribe(&self) -> Result<Subscription<TableEvent>, ParlorError> {
        self.with_table(Table::subscribe)
    }

    pub async fn sit_down(&self, seat: SeatNum) -> Result<(), ParlorError> {
        self.check(|t, me| t.check_sit_down(me, seat))?;
        let table = self.table();
        self.send(Message::SitDown { table, seat }).await
    }

    pub async fn stand_up(&self) -> Result<(), ParlorError> {
        self.check(Table::check_stand_up)?;
        let table = self.table();
        self.send(Message::StandUp { table }).await
    }

    pub async fn ready_to_start(&self) -> Result<(), ParlorError> {
        self.check(Table::check_ready)?;
        let table = self.table();
        self.send(Message::ReadyToStart { table }).await
    }

    pub async fn resign(&self) -> Result<(), ParlorError> {
        let me = self.check(Table::check_resign)?;
        let table = self.table();
        self.send(Message::Resign {
            table,
            username: Some(me),
        })
        .await
    }

    /// Offers a draw to another player in the running game. Returns the
    /// serial the reply will carry.
    pub async fn offer_draw(&self, to: &str) -> Result<Serial, ParlorError> {
        let me = self.check(|t, me| t.check_offer_draw(me, to))?;
        self.request(Topic::Draw, me, to).await
    }

    /// Answers a draw offer made to the local user.
    pub async fn respond_draw(&self, serial: Serial, accept: bool) -> Result<(), ParlorError> {
        let username = self.session.require_login()?;
        let table = self.table();
        let request = self
            .session
            .shared
            .pending()
            .take(table, Topic::Draw, serial)
            .ok_or(ParlorError::UnknownRequest { table, serial })?;
        let exchange = Exchange {
            kind: reply_kind(accept),
            serial,
            username,
            recipient: Some(request.from),
        };
        self.send(Message::OfferDraw { table, exchange }).await
    }

    /// Invites a user to this table. Returns the serial the reply will
    /// carry.
    pub async fn invite(&self, to: &str) -> Result<Serial, ParlorError> {
        let me = self.check(|t, me| t.check_invite(me, to))?;
        self.request(Topic::Invite, me, to).await
    }

    pub async fn chat(&self, text: &str) -> Result<(), ParlorError> {
        let username = self.session.require_login()?;
        let table = self.table();
        self.send(Message::ChatTable {
            table,
            chat: Chat {
                username,
                text: text.to_string(),
            },
        })
        .await
    }

    /// Sends a game-specific payload to this table.
    pub async fn send_opaque(&self, payload: OpaqueMessage) -> Result<(), ParlorError> {
        self.send(payload.into_message(self.table())).await
    }

    /// Leaves the table. Closes the connection too when this was the last
    /// table and the channel is configured to.
    pub async fn close(&self) -> Result<(), ParlorError> {
        {
            let mut tables = self.session.shared.tables();
            let table = self.table();
            if tables.get(&table).is_some_and(|c| Arc::ptr_eq(c, &self.channel)) {
                tables.remove(&table);
            }
        }
        self.channel.close().await?;
        Ok(())
    }

    /// Runs a local precondition check and returns the local username.
    fn check(
        &self,
        check: impl FnOnce(&Table, &str) -> Result<(), TableError>,
    ) -> Result<String, ParlorError> {
        let table = self.table();
        self.session.with_game(|game| -> Result<String, ParlorError> {
            let t = game.table(table).ok_or(TableError::NotFound(table))?;
            check(t, game.username())?;
            Ok(game.username().to_string())
        })?
    }

    async fn request(&self, topic: Topic, me: String, to: &str) -> Result<Serial, ParlorError> {
        let table = self.table();
        let serial = self.session.shared.pending().issue(table, topic, &me, to);
        let exchange = Exchange {
            kind: ExchangeKind::Request,
            serial,
            username: me,
            recipient: Some(to.to_string()),
        };
        let message = match topic {
            Topic::Draw => Message::OfferDraw { table, exchange },
            Topic::Invite => Message::Invite { table, exchange },
        };
        if let Err(e) = self.send(message).await {
            self.session.shared.pending().withdraw(table, topic, serial);
            return Err(e);
        }
        tracing::debug!(%table, ?topic, %serial, %to, "request sent");
        Ok(serial)
    }

    async fn send(&self, message: Message) -> Result<(), ParlorError> {
        self.channel.send(message).await?;
        Ok(())
    }
}
