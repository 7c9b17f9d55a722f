//! The matchmaker actor.
//!
//! One tokio task owns the queue, every live [`MatchSession`] and the
//! outbound channel of every connected client. Transports talk to it only
//! through a [`MatchmakerHandle`]; timers and game creation run in their own
//! tasks and report back as commands, so the actor never awaits anything
//! except its inbox.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dareduel_types::{BattleId, Clock, Coins, Dare, SessionId, UserContext, UserId};

use crate::error::{GameCreationError, MatchError};
use crate::events::{ClientCommand, ServerEvent};
use crate::queue::{MatchQueue, QueueEntry};
use crate::session::{MatchSession, Side, Transition};

pub const DEFAULT_DEADLINE_SECS: u64 = 10;
const DEFAULT_COMMAND_BUFFER: usize = 1024;

/// Turns a mutually accepted pair into a funded battle.
pub trait GameCreator: Send + Sync + 'static {
    /// `first` is the entry that waited longer.
    fn create_game(
        &self,
        first: QueueEntry,
        second: QueueEntry,
    ) -> impl Future<Output = Result<BattleId, GameCreationError>> + Send;
}

/// Identifies one client connection. A user reconnecting gets a new id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Clone, Debug)]
pub struct MatchConfig {
    /// How long both sides have to accept a proposed match.
    pub deadline: Duration,
    pub command_buffer: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(DEFAULT_DEADLINE_SECS),
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub connected_clients: usize,
    pub queue_depth: usize,
    pub live_sessions: usize,
    pub matches_proposed: u64,
    pub games_started: u64,
    pub timeouts: u64,
    pub declines: u64,
}

/// Everything the actor reacts to.
#[derive(Debug)]
pub enum MatchCommand {
    Connect {
        conn: ConnectionId,
        ctx: UserContext,
        events: mpsc::UnboundedSender<ServerEvent>,
    },
    Client {
        conn: ConnectionId,
        command: ClientCommand,
    },
    Disconnect {
        conn: ConnectionId,
    },
    DeadlineElapsed {
        session: SessionId,
    },
    GameCreated {
        session: SessionId,
        result: Result<BattleId, GameCreationError>,
    },
    Stats {
        reply: oneshot::Sender<MatchStats>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A connected client's end: its id and the events addressed to it.
#[derive(Debug)]
pub struct ClientLink {
    pub conn: ConnectionId,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

#[derive(Clone, Debug)]
pub struct MatchmakerHandle {
    tx: mpsc::Sender<MatchCommand>,
    next_conn: Arc<AtomicU64>,
}

impl MatchmakerHandle {
    /// Register a client. A second connection for the same user replaces
    /// the first; queue and session state carry over.
    pub async fn connect(&self, ctx: UserContext) -> Result<ClientLink, MatchError> {
        let conn = ConnectionId(self.next_conn.fetch_add(1, Ordering::Relaxed));
        let (events_tx, events) = mpsc::unbounded_channel();
        self.post(MatchCommand::Connect {
            conn,
            ctx,
            events: events_tx,
        })
        .await?;
        Ok(ClientLink { conn, events })
    }

    pub async fn send(&self, conn: ConnectionId, command: ClientCommand) -> Result<(), MatchError> {
        self.post(MatchCommand::Client { conn, command }).await
    }

    pub async fn disconnect(&self, conn: ConnectionId) -> Result<(), MatchError> {
        self.post(MatchCommand::Disconnect { conn }).await
    }

    pub async fn stats(&self) -> Result<MatchStats, MatchError> {
        let (reply, rx) = oneshot::channel();
        self.post(MatchCommand::Stats { reply }).await?;
        rx.await.map_err(|_| MatchError::Stopped)
    }

    async fn post(&self, command: MatchCommand) -> Result<(), MatchError> {
        self.tx.send(command).await.map_err(|_| MatchError::Stopped)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct Client {
    conn: ConnectionId,
    ctx: UserContext,
    events: mpsc::UnboundedSender<ServerEvent>,
}

struct LiveSession {
    session: MatchSession,
    timer: Option<JoinHandle<()>>,
}

impl LiveSession {
    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

pub struct Matchmaker<G> {
    config: MatchConfig,
    creator: Arc<G>,
    clock: Arc<dyn Clock>,
    inbox: mpsc::WeakSender<MatchCommand>,
    queue: MatchQueue,
    clients: HashMap<UserId, Client>,
    connections: HashMap<ConnectionId, UserId>,
    sessions: HashMap<SessionId, LiveSession>,
    session_of: HashMap<UserId, SessionId>,
    next_session: SessionId,
    stats: MatchStats,
}

impl<G: GameCreator> Matchmaker<G> {
    /// Start the actor. It runs until `shutdown` fires or every handle is
    /// dropped.
    pub fn spawn(
        config: MatchConfig,
        creator: Arc<G>,
        clock: Arc<dyn Clock>,
        shutdown: broadcast::Receiver<()>,
    ) -> (MatchmakerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let actor = Self {
            config,
            creator,
            clock,
            inbox: tx.downgrade(),
            queue: MatchQueue::new(),
            clients: HashMap::new(),
            connections: HashMap::new(),
            sessions: HashMap::new(),
            session_of: HashMap::new(),
            next_session: SessionId::new(1),
            stats: MatchStats::default(),
        };
        let task = tokio::spawn(actor.run(rx, shutdown));
        let handle = MatchmakerHandle {
            tx,
            next_conn: Arc::new(AtomicU64::new(1)),
        };
        (handle, task)
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<MatchCommand>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            deadline_secs = self.config.deadline.as_secs(),
            "matchmaker started"
        );
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                command = rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }
        for live in self.sessions.values_mut() {
            live.stop_timer();
        }
        info!(
            queued = self.queue.len(),
            sessions = self.sessions.len(),
            "matchmaker stopped"
        );
    }

    fn handle(&mut self, command: MatchCommand) {
        match command {
            MatchCommand::Connect { conn, ctx, events } => self.connect(conn, ctx, events),
            MatchCommand::Client { conn, command } => {
                let Some(user) = self.connections.get(&conn).cloned() else {
                    debug!(conn = conn.raw(), "command from unknown connection");
                    return;
                };
                match command {
                    ClientCommand::Enqueue { dare, wager_coins } => {
                        self.enqueue(&user, dare, wager_coins)
                    }
                    ClientCommand::CancelEnqueue => self.cancel(&user),
                    ClientCommand::AcceptMatch { session_id } => self.accept(&user, session_id),
                    ClientCommand::DeclineMatch { session_id } => self.decline(&user, session_id),
                }
            }
            MatchCommand::Disconnect { conn } => self.disconnect(conn),
            MatchCommand::DeadlineElapsed { session } => self.expire(session),
            MatchCommand::GameCreated { session, result } => self.game_created(session, result),
            MatchCommand::Stats { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> MatchStats {
        MatchStats {
            connected_clients: self.clients.len(),
            queue_depth: self.queue.len(),
            live_sessions: self.sessions.len(),
            ..self.stats
        }
    }

    fn connect(
        &mut self,
        conn: ConnectionId,
        ctx: UserContext,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let user = ctx.user_id.clone();
        let client = Client { conn, ctx, events };
        if let Some(previous) = self.clients.insert(user.clone(), client) {
            self.connections.remove(&previous.conn);
            debug!(%user, "connection replaced");
        }
        self.connections.insert(conn, user);
    }

    fn disconnect(&mut self, conn: ConnectionId) {
        let Some(user) = self.connections.remove(&conn) else {
            return;
        };
        if self.clients.get(&user).is_some_and(|c| c.conn == conn) {
            self.clients.remove(&user);
        }
        if self.queue.cancel(&user).is_some() {
            debug!(%user, "queue entry dropped on disconnect");
        }
        self.decline(&user, None);
    }

    // -- Queue ---------------------------------------------------------------

    fn enqueue(&mut self, user: &UserId, dare: String, wager_coins: u64) {
        if self.queue.contains(user) || self.session_of.contains_key(user) {
            self.send(
                user,
                ServerEvent::error("already_queued", "a match request is already open"),
            );
            return;
        }
        let dare = match Dare::single(dare) {
            Ok(dare) => dare,
            Err(e) => {
                self.send(user, ServerEvent::error("invalid_request", e.to_string()));
                return;
            }
        };
        let Some(client) = self.clients.get(user) else {
            return;
        };
        let entry = QueueEntry {
            requester: user.clone(),
            display_name: client.ctx.display_name.clone(),
            dare: dare.current().unwrap_or_default().to_string(),
            wager_coins: Coins::new(wager_coins),
            enqueued_at: self.clock.now(),
        };
        debug!(%user, wager_coins, "enqueued");
        self.send(user, ServerEvent::Queued { wager_coins });
        self.place(entry);
    }

    fn cancel(&mut self, user: &UserId) {
        if self.queue.cancel(user).is_some() {
            debug!(%user, "enqueue cancelled");
            self.send(user, ServerEvent::EnqueueCancelled);
        }
    }

    /// Put an entry (new or requeued) in line, opening a session if it
    /// pairs.
    fn place(&mut self, entry: QueueEntry) {
        if let Some((first, second)) = self.queue.enqueue(entry) {
            self.open_session(first, second);
        }
    }

    fn requeue(&mut self, entry: QueueEntry) {
        if !self.clients.contains_key(&entry.requester) {
            debug!(user = %entry.requester, "not requeued, client gone");
            return;
        }
        let wager_coins = entry.wager_coins.raw();
        self.send(&entry.requester, ServerEvent::Requeue { wager_coins });
        self.place(entry);
    }

    // -- Sessions ------------------------------------------------------------

    fn open_session(&mut self, a: QueueEntry, b: QueueEntry) {
        let id = self.next_session;
        self.next_session = id.next();
        let deadline = self.clock.now().plus_secs(self.config.deadline.as_secs());
        let session = MatchSession::new(id, a, b, deadline);

        for side in [Side::A, Side::B] {
            let me = session.entry(side);
            let them = session.entry(side.other());
            self.send(
                &me.requester,
                ServerEvent::MatchFound {
                    session_id: id,
                    opponent: them.requester.clone(),
                    opponent_display_name: them.display_name.clone(),
                    dare: them.dare.clone(),
                    wager_coins: them.wager_coins.raw(),
                    deadline,
                },
            );
            self.session_of.insert(me.requester.clone(), id);
        }

        info!(
            session = %id,
            a = %session.entry(Side::A).requester,
            b = %session.entry(Side::B).requester,
            "match proposed"
        );
        let timer = Some(self.start_timer(id));
        self.sessions.insert(id, LiveSession { session, timer });
        self.stats.matches_proposed += 1;
    }

    fn start_timer(&self, session: SessionId) -> JoinHandle<()> {
        let inbox = self.inbox.clone();
        let delay = self.config.deadline;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = inbox.upgrade() {
                let _ = tx.send(MatchCommand::DeadlineElapsed { session }).await;
            }
        })
    }

    /// The session an accept/decline from `user` applies to. A client that
    /// names a session other than its current one is talking about a stale
    /// proposal.
    fn current_session(&self, user: &UserId, named: Option<SessionId>) -> Option<SessionId> {
        let current = *self.session_of.get(user)?;
        match named {
            Some(named) if named != current => None,
            _ => Some(current),
        }
    }

    /// Apply `f` to the user's current session, returning the transition
    /// together with both entries.
    fn transition(
        &mut self,
        user: &UserId,
        named: Option<SessionId>,
        f: impl FnOnce(&mut MatchSession, Side) -> Transition,
    ) -> Option<(SessionId, Transition, QueueEntry, QueueEntry)> {
        let id = self.current_session(user, named)?;
        let live = self.sessions.get_mut(&id)?;
        let side = live.session.side_of(user)?;
        let transition = f(&mut live.session, side);
        if live.session.state().is_terminal() {
            live.stop_timer();
        }
        Some((
            id,
            transition,
            live.session.entry(Side::A).clone(),
            live.session.entry(Side::B).clone(),
        ))
    }

    fn accept(&mut self, user: &UserId, named: Option<SessionId>) {
        let Some((id, transition, a, b)) = self.transition(user, named, MatchSession::accept) else {
            debug!(%user, "accept without a live session");
            return;
        };
        match transition {
            Transition::Accepted { by } => {
                let other = if by == Side::A { &b } else { &a };
                self.send(&other.requester, ServerEvent::OpponentAccepted { session_id: id });
            }
            Transition::BothAccepted => {
                info!(session = %id, "both accepted, creating game");
                self.spawn_game_creation(id, a, b);
            }
            other => debug!(session = %id, ?other, "accept ignored"),
        }
    }

    fn decline(&mut self, user: &UserId, named: Option<SessionId>) {
        let Some((id, transition, a, b)) = self.transition(user, named, MatchSession::decline)
        else {
            return;
        };
        let Transition::Declined { by, requeue } = transition else {
            debug!(session = %id, "decline ignored");
            return;
        };
        self.finish_session(id);
        self.stats.declines += 1;
        info!(session = %id, by = ?by, "match declined");

        let survivor = if requeue == Side::A { a } else { b };
        self.send(
            &survivor.requester,
            ServerEvent::OpponentDeclined { session_id: id },
        );
        self.requeue(survivor);
    }

    fn expire(&mut self, id: SessionId) {
        let Some(live) = self.sessions.get_mut(&id) else {
            return;
        };
        let Transition::TimedOut { requeue, .. } = live.session.expire() else {
            return;
        };
        live.timer = None;
        let Some(session) = self.finish_session(id) else {
            return;
        };
        self.stats.timeouts += 1;
        info!(session = %id, silent = requeue.len(), "match timed out");

        for side in [Side::A, Side::B] {
            self.send(
                &session.entry(side).requester,
                ServerEvent::MatchTimeout { session_id: id },
            );
        }
        for side in requeue {
            self.requeue(session.entry(side).clone());
        }
    }

    /// Drop a session that reached a terminal state.
    fn finish_session(&mut self, id: SessionId) -> Option<MatchSession> {
        let mut live = self.sessions.remove(&id)?;
        live.stop_timer();
        for side in [Side::A, Side::B] {
            let user = &live.session.entry(side).requester;
            if self.session_of.get(user) == Some(&id) {
                self.session_of.remove(user);
            }
        }
        Some(live.session)
    }

    // -- Game creation -------------------------------------------------------

    fn spawn_game_creation(&self, session: SessionId, a: QueueEntry, b: QueueEntry) {
        let creator = self.creator.clone();
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = creator.create_game(a, b).await;
            if let Some(tx) = inbox.upgrade() {
                let _ = tx.send(MatchCommand::GameCreated { session, result }).await;
            }
        });
    }

    fn game_created(&mut self, id: SessionId, result: Result<BattleId, GameCreationError>) {
        let Some(session) = self.finish_session(id) else {
            return;
        };
        let (a, b) = (session.entry(Side::A), session.entry(Side::B));
        match result {
            Ok(battle_id) => {
                self.stats.games_started += 1;
                info!(session = %id, battle = %battle_id, "game started");
                self.send(&a.requester, ServerEvent::StartGame { battle_id });
                self.send(&b.requester, ServerEvent::StartGame { battle_id });
            }
            Err(GameCreationError::InsufficientFunds { user })
                if user == a.requester || user == b.requester =>
            {
                warn!(session = %id, %user, "game not created, stake not covered");
                let other = if user == a.requester { b } else { a };
                self.send(
                    &user,
                    ServerEvent::error("insufficient_funds", "not enough coins for this wager"),
                );
                self.requeue(other.clone());
            }
            Err(e) => {
                warn!(session = %id, error = %e, "game creation failed");
                for entry in [a, b] {
                    self.send(
                        &entry.requester,
                        ServerEvent::error("game_creation_failed", e.to_string()),
                    );
                }
            }
        }
    }

    fn send(&self, user: &UserId, event: ServerEvent) {
        let Some(client) = self.clients.get(user) else {
            return;
        };
        if client.events.send(event).is_err() {
            debug!(%user, "client channel closed");
        }
    }
}
