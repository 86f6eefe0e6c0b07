//! Routes inbound traffic into the replica and the per-table controllers.
//!
//! The [`Dispatcher`] is the connection channel's message handler, so it
//! runs on the read task and is the only writer of the replicated
//! [`Game`]. Session methods running on other tasks only read it.
//!
//! ```text
//! read task ─► Dispatcher ─┬─► Game / Table replicas ─► observers
//!                          ├─► GameController per table ─► outbound queue ─► writer task
//!                          └─► login / new-table / join-table waiters
//! ```
//!
//! Locks are always taken in the order game, tables, pending, waiters.

use std::collections::{HashMap, VecDeque};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};

use parlor_channel::{
    ChannelEvent, ConnectionChannel, DisconnectReason, MessageHandler, TableChannel,
};
use parlor_protocol::{
    ErrorReport, Exchange, ExchangeKind, GameSnapshot, Message, NewTable, TableNum,
};
use parlor_table::{
    ChatEvent, Game, GameController, GameModule, Observers, OpaqueMessage, PendingExchanges,
    Table, TableEvent, Topic,
};
use parlor_transport::{Connection, TransportError};
use tokio::sync::{mpsc, oneshot};

use crate::{ParlorError, SessionConfig, SessionEvent, StatusEvent};

pub(crate) type Reply<T> = oneshot::Sender<Result<T, ParlorError>>;

/// Requests waiting on a server acknowledgement.
#[derive(Default)]
pub(crate) struct Waiters {
    pub(crate) login: Option<Reply<()>>,
    pub(crate) created: VecDeque<Reply<TableNum>>,
    pub(crate) joined: HashMap<TableNum, Vec<Reply<()>>>,
}

impl Waiters {
    /// Fails every outstanding `new-table` and `join-table` request. An
    /// `error` reply names no request, so all of them share it.
    fn reject(&mut self, code: i32, message: &str) {
        let rejected = || ParlorError::Rejected {
            code,
            message: message.to_string(),
        };
        for tx in self.created.drain(..) {
            let _ = tx.send(Err(rejected()));
        }
        for (_, waiting) in self.joined.drain() {
            for tx in waiting {
                let _ = tx.send(Err(rejected()));
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(tx) = self.login.take() {
            let _ = tx.send(Err(ParlorError::Disconnected));
        }
        for tx in self.created.drain(..) {
            let _ = tx.send(Err(ParlorError::Disconnected));
        }
        for (_, waiting) in self.joined.drain() {
            for tx in waiting {
                let _ = tx.send(Err(ParlorError::Disconnected));
            }
        }
    }

    /// Forgets waiters whose caller gave up.
    pub(crate) fn prune(&mut self) {
        if self.login.as_ref().is_some_and(oneshot::Sender::is_closed) {
            self.login = None;
        }
        self.created.retain(|tx| !tx.is_closed());
        self.joined.retain(|_, waiting| {
            waiting.retain(|tx| !tx.is_closed());
            !waiting.is_empty()
        });
    }
}

/// State shared between a [`Session`](crate::Session) and its dispatcher.
pub(crate) struct Shared<C>
where
    C: Connection<Error = TransportError>,
{
    pub(crate) channel: ConnectionChannel<C>,
    pub(crate) config: SessionConfig,
    game: RwLock<Option<Game>>,
    tables: Mutex<HashMap<TableNum, Arc<TableChannel<C>>>>,
    pending: Mutex<PendingExchanges>,
    waiters: Mutex<Waiters>,
    pub(crate) events: Observers<SessionEvent>,
}

impl<C> Shared<C>
where
    C: Connection<Error = TransportError>,
{
    pub(crate) fn new(channel: ConnectionChannel<C>, config: SessionConfig) -> Self {
        Self {
            channel,
            config,
            game: RwLock::new(None),
            tables: Mutex::new(HashMap::new()),
            pending: Mutex::new(PendingExchanges::new()),
            waiters: Mutex::new(Waiters::default()),
            events: Observers::new(),
        }
    }

    pub(crate) fn game(&self) -> RwLockReadGuard<'_, Option<Game>> {
        self.game.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn game_mut(&self) -> RwLockWriteGuard<'_, Option<Game>> {
        self.game.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn tables(&self) -> MutexGuard<'_, HashMap<TableNum, Arc<TableChannel<C>>>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn pending(&self) -> MutexGuard<'_, PendingExchanges> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn waiters(&self) -> MutexGuard<'_, Waiters> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self, status: StatusEvent) {
        self.events.notify(SessionEvent::Status(status));
    }
}

/// Closes the connection once the last session handle is gone.
impl<C> Drop for Shared<C>
where
    C: Connection<Error = TransportError>,
{
    fn drop(&mut self) {
        self.close_in_background("session dropped");
    }
}

impl<C> Shared<C>
where
    C: Connection<Error = TransportError>,
{
    /// Closes the connection from synchronous code, e.g. `Drop` or the
    /// read loop's handler. The close runs as a fire-and-forget task.
    fn close_in_background(&self, cause: &'static str) {
        if self.channel.is_closed() {
            return;
        }
        let channel = self.channel.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = channel.close().await {
                        tracing::debug!(error = %e, cause, "close failed");
                    }
                });
            }
            Err(_) => tracing::debug!(
                conn = %self.channel.id(),
                cause,
                "no runtime to close on, connection left open"
            ),
        }
    }
}

/// The single consumer of a session's inbound traffic.
pub(crate) struct Dispatcher<C>
where
    C: Connection<Error = TransportError>,
{
    shared: Weak<Shared<C>>,
    module: Arc<dyn GameModule>,
    controllers: HashMap<TableNum, Box<dyn GameController>>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl<C> MessageHandler for Dispatcher<C>
where
    C: Connection<Error = TransportError>,
{
    fn on_event(&mut self, event: ChannelEvent) {
        let shared = self.shared.upgrade();
        match (event, shared) {
            (ChannelEvent::Disconnected(reason), shared) => {
                self.on_disconnected(shared.as_deref(), reason);
            }
            (_, None) => tracing::trace!("session dropped, ignoring inbound traffic"),
            (ChannelEvent::Message { table: Some(table), message }, Some(shared)) => {
                self.on_table_message(&shared, table, message);
            }
            (ChannelEvent::Message { table: None, message }, Some(shared)) => {
                self.on_lobby_message(&shared, message);
            }
            (ChannelEvent::Dropped { reason }, Some(shared)) => {
                shared.status(StatusEvent::Dropped { reason });
            }
        }
    }
}

impl<C> Dispatcher<C>
where
    C: Connection<Error = TransportError>,
{
    pub(crate) fn new(
        shared: Weak<Shared<C>>,
        module: Arc<dyn GameModule>,
        outbound: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            shared,
            module,
            controllers: HashMap::new(),
            outbound,
        }
    }

    // -- lobby scope --------------------------------------------------------

    fn on_lobby_message(&mut self, shared: &Shared<C>, message: Message) {
        match message {
            Message::Game(snapshot) => self.on_snapshot(shared, snapshot),
            Message::Error(report) => on_error(shared, report),
            Message::User(record) => {
                with_game(shared, "user", |game| game.apply_user(record));
            }
            Message::Disconnect { username } => {
                let mine = with_game(shared, "disconnect", |game| match &username {
                    Some(name) if name != game.username() => {
                        if game.remove_user(name).is_some() {
                            tracing::debug!(username = %name, "user left");
                        }
                        false
                    }
                    _ => true,
                });
                if mine.unwrap_or(username.is_none()) {
                    tracing::info!(?username, "server ended this session");
                    shared.close_in_background("server disconnect");
                }
            }
            Message::ChatClient(chat) => {
                with_game(shared, "chat-client", |game| {
                    game.receive_chat(ChatEvent::Broadcast(chat));
                });
            }
            Message::ChatPrivate(chat) => {
                with_game(shared, "chat-private", |game| {
                    game.receive_chat(ChatEvent::Private(chat));
                });
            }
            Message::NewTable(ack) => self.on_new_table(shared, ack),
            Message::KeepAlive => tracing::trace!("keep-alive"),
            Message::Connect(_) => tracing::debug!("ignoring client-only <connect>"),
            other => {
                let tag = other.tag();
                tracing::debug!(tag, "table message without a table number, dropped");
                shared.status(StatusEvent::Unroutable { tag, table: None });
            }
        }
    }

    fn on_snapshot(&mut self, shared: &Shared<C>, snapshot: GameSnapshot) {
        let username = snapshot.username.clone();
        let refreshed = {
            let mut guard = shared.game_mut();
            let refreshed = guard.is_some();
            let game = guard.insert(Game::from_snapshot(&snapshot));
            let mine: Vec<TableNum> = game.tables().tables_for(&username).map(Table::number).collect();
            for table in mine {
                if let Some(t) = game.table(table) {
                    self.attach(shared, t);
                }
            }
            refreshed
        };

        if refreshed {
            tracing::info!(%username, "lobby snapshot refreshed");
            return;
        }
        tracing::info!(
            %username,
            users = snapshot.users.len(),
            tables = snapshot.tables.len(),
            "logged in"
        );
        if let Some(tx) = shared.waiters().login.take() {
            let _ = tx.send(Ok(()));
        }
        shared.events.notify(SessionEvent::LoggedIn { username });
    }

    fn on_new_table(&mut self, shared: &Shared<C>, ack: NewTable) {
        let Some(record) = ack.snapshot else {
            tracing::debug!("new-table without a table snapshot, dropped");
            return;
        };
        let owned = {
            let mut guard = shared.game_mut();
            let Some(game) = guard.as_mut() else {
                tracing::debug!("new-table before login, dropped");
                return;
            };
            let table = game.add_table(&record);
            let me = game.username();
            let owned = record.owner == me;
            let seated = record.players.iter().any(|p| p.username == me);
            if owned || seated {
                if let Some(t) = game.table(table) {
                    self.attach(shared, t);
                }
            }
            owned.then_some(table)
        };
        if let Some(table) = owned {
            if let Some(tx) = shared.waiters().created.pop_front() {
                let _ = tx.send(Ok(table));
            }
        }
    }

    // -- table scope --------------------------------------------------------

    fn on_table_message(&mut self, shared: &Shared<C>, table: TableNum, message: Message) {
        let tag = message.tag();
        let mut statuses = Vec::new();
        let mut joined = false;
        let mut replies = Vec::new();
        {
            let mut guard = shared.game_mut();
            let Some(game) = guard.as_mut() else {
                tracing::debug!(%table, tag, "table message before login, dropped");
                return;
            };
            // Invites may name a private table this client has never seen.
            if !game.tables().contains(table) && !matches!(message, Message::Invite { .. }) {
                drop(guard);
                tracing::debug!(%table, tag, "message for unknown table, dropped");
                shared.status(StatusEvent::Unroutable {
                    tag,
                    table: Some(table),
                });
                return;
            }
            let me = game.username().to_string();

            match message {
                Message::ChatTable { chat, .. } => {
                    game.receive_chat(ChatEvent::Table { table, chat });
                }
                Message::JoinTable { username, .. } => {
                    let name = username.unwrap_or_else(|| me.clone());
                    game.join_table(table, &name);
                    if name == me {
                        if let Some(t) = game.table(table) {
                            self.attach(shared, t);
                        }
                        joined = true;
                    }
                }
                Message::ExitTable { username, .. } => {
                    let name = username.unwrap_or_else(|| me.clone());
                    if name == me {
                        self.detach(shared, table);
                    }
                    game.leave_table(table, &name);
                }
                Message::RemoveTable { .. } => {
                    self.detach(shared, table);
                    game.remove_table(table);
                }
                Message::PlayerState { player, .. } => {
                    if let Some(t) = game.table_mut(table) {
                        let evicted = t.apply_player_state(&player);
                        if !evicted.is_empty() {
                            statuses.push(StatusEvent::SeatCorrected { table, evicted });
                        }
                    }
                }
                Message::StartGame { first_seat, .. } => {
                    let first = first_seat.or_else(|| {
                        let controller = self.controllers.get(&table)?;
                        controller.first_turn(game.table(table)?)
                    });
                    if let Some(t) = game.table_mut(table) {
                        t.start_game(first);
                    }
                    if let (Some(controller), Some(t)) =
                        (self.controllers.get_mut(&table), game.table(table))
                    {
                        replies = controller.on_game_start(t);
                    }
                }
                Message::NextTurn { seat, .. } => {
                    if let Some(t) = game.table_mut(table) {
                        t.next_turn(seat);
                    }
                }
                Message::Resign { username, .. } => match (username, game.table_mut(table)) {
                    (Some(name), Some(t)) => t.publish(TableEvent::Resigned(name)),
                    _ => tracing::debug!(%table, "resign without a username, ignored"),
                },
                Message::GameOver { outcome, .. } => {
                    game.finish_game(table, &outcome);
                    let discarded = shared.pending().discard(table, Topic::Draw);
                    if discarded > 0 {
                        tracing::debug!(%table, discarded, "open draw offers discarded");
                    }
                    if let (Some(controller), Some(t)) =
                        (self.controllers.get_mut(&table), game.table(table))
                    {
                        replies = controller.on_game_over(t, &outcome);
                    }
                }
                Message::OfferDraw { exchange, .. } => {
                    on_exchange(shared, game, table, Topic::Draw, &me, exchange);
                }
                Message::Invite { exchange, .. } => {
                    on_exchange(shared, game, table, Topic::Invite, &me, exchange);
                }
                message @ (Message::ControllerProperty { .. } | Message::ControllerObject { .. }) => {
                    let payload = OpaqueMessage::from_message(&message);
                    match (self.controllers.get_mut(&table), game.table(table), payload) {
                        (Some(controller), Some(t), Some(payload)) => {
                            replies = controller.receive_opaque_message(t, payload);
                        }
                        _ => tracing::debug!(%table, tag, "no controller for table, dropped"),
                    }
                }
                _ => tracing::debug!(%table, tag, "client command from server, ignored"),
            }
        }

        for status in statuses {
            shared.status(status);
        }
        if joined {
            if let Some(waiting) = shared.waiters().joined.remove(&table) {
                for tx in waiting {
                    let _ = tx.send(Ok(()));
                }
            }
        }
        for reply in replies {
            if self.outbound.send(reply.into_message(table)).is_err() {
                tracing::debug!(%table, "writer gone, controller reply dropped");
            }
        }
    }

    /// Binds a table channel and a controller to a table the local user is
    /// now at. Does nothing if already bound.
    fn attach(&mut self, shared: &Shared<C>, table: &Table) {
        let number = table.number();
        {
            let mut tables = shared.tables();
            if tables.contains_key(&number) {
                return;
            }
            tables.insert(number, Arc::new(shared.channel.table(number)));
        }
        let controller = self.module.create_controller(table);
        if let Some(stale) = self.controllers.insert(number, controller) {
            self.module.teardown(number, stale);
        }
        tracing::info!(table = %number, "joined table");
    }

    /// Unbinds a table the local user is no longer at.
    fn detach(&mut self, shared: &Shared<C>, table: TableNum) {
        let channel = shared.tables().remove(&table);
        if let Some(channel) = &channel {
            channel.detach();
        }
        let discarded = shared.pending().discard_table(table);
        if let Some(controller) = self.controllers.remove(&table) {
            self.module.teardown(table, controller);
        }
        if channel.is_some() {
            tracing::info!(%table, discarded, "left table");
        }
    }

    fn on_disconnected(&mut self, shared: Option<&Shared<C>>, reason: DisconnectReason) {
        for (table, controller) in self.controllers.drain() {
            self.module.teardown(table, controller);
        }
        let Some(shared) = shared else {
            return;
        };
        for (_, channel) in shared.tables().drain() {
            channel.detach();
        }
        *shared.pending() = PendingExchanges::new();
        shared.game_mut().take();
        shared.waiters().disconnect();
        tracing::info!(?reason, "session disconnected");
        shared.events.notify(SessionEvent::Disconnected(reason));
    }
}

/// Runs `f` against the replica, or logs and drops the message before
/// login.
fn with_game<C, R>(
    shared: &Shared<C>,
    tag: &'static str,
    f: impl FnOnce(&mut Game) -> R,
) -> Option<R>
where
    C: Connection<Error = TransportError>,
{
    let mut guard = shared.game_mut();
    match guard.as_mut() {
        Some(game) => Some(f(game)),
        None => {
            tracing::debug!(tag, "lobby message before login, dropped");
            None
        }
    }
}

fn on_error<C>(shared: &Shared<C>, report: ErrorReport)
where
    C: Connection<Error = TransportError>,
{
    let code = report.code;
    let message = report.message.unwrap_or_default();
    tracing::warn!(code, %message, "server error");
    {
        let mut waiters = shared.waiters();
        match waiters.login.take() {
            Some(tx) => {
                let _ = tx.send(Err(ParlorError::LoginRejected {
                    code,
                    message: message.clone(),
                }));
            }
            None => waiters.reject(code, &message),
        }
    }
    shared.status(StatusEvent::ServerError { code, message });
}

/// Handles one step of a draw or invite handshake.
///
/// Requests addressed to the local user are remembered so they can be
/// answered. Replies are matched by serial against pending requests;
/// unmatched replies are dropped.
fn on_exchange<C>(
    shared: &Shared<C>,
    game: &mut Game,
    table: TableNum,
    topic: Topic,
    me: &str,
    exchange: Exchange,
) where
    C: Connection<Error = TransportError>,
{
    match exchange.kind {
        ExchangeKind::Request => {
            if exchange.recipient.as_deref() != Some(me) {
                tracing::trace!(%table, ?topic, serial = %exchange.serial, "request for someone else");
                return;
            }
            shared.pending().record(table, topic, &exchange);
            match topic {
                Topic::Draw => {
                    if let Some(t) = game.table_mut(table) {
                        t.publish(TableEvent::DrawOffered(exchange));
                    }
                }
                Topic::Invite => game.receive_invite(table, exchange),
            }
        }
        ExchangeKind::Accept | ExchangeKind::Decline => {
            if shared.pending().resolve(table, topic, &exchange).is_none() {
                tracing::debug!(%table, ?topic, serial = %exchange.serial, "unmatched reply dropped");
                return;
            }
            let event = match topic {
                Topic::Draw => TableEvent::DrawAnswered(exchange),
                Topic::Invite => TableEvent::InviteAnswered(exchange),
            };
            match game.table_mut(table) {
                Some(t) => t.publish(event),
                None => tracing::debug!(%table, "reply for a table no longer listed"),
            }
        }
    }
}

/// Sends controller replies in the order the dispatcher produced them.
pub(crate) async fn write_outbound<C>(
    channel: ConnectionChannel<C>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) where
    C: Connection<Error = TransportError>,
{
    while let Some(message) = rx.recv().await {
        if let Err(e) = channel.send(&message).await {
            tracing::debug!(error = %e, tag = message.tag(), "controller reply not sent");
            if channel.is_closed() {
                break;
            }
        }
    }
}
