//! Command port: master election and command fan-out
//!
//! A single actor task owns every control client and the master id.
//! Connection tasks talk to it through `AuthorityHandle`, so registration,
//! election, command application and broadcast are applied one at a time in
//! the order they were requested.
//!
//! **Rules:**
//! - The first client registered while there is no master becomes master
//! - Only the master's commands change playback; others are logged and ignored
//! - Effective transitions are echoed to every client (`next` and automatic
//!   advance both echo `play`)
//! - When the master leaves, the longest-connected client (smallest id) takes over
//! - Broadcast never waits on a slow client; a full or closed queue drops it

use crate::error::Result;
use crate::session::{Session, SessionEvent};
use futures::{SinkExt, StreamExt};
use jamcast_common::command::{line_codec, parse_line, CommandLineCodec, ReceivedLine, MAX_COMMAND_LINE};
use jamcast_common::Command;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Registration-order identifier; smaller means connected earlier
pub type ClientId = u64;

/// Commands queued per client before it is considered dead
pub const OUTBOUND_QUEUE: usize = 32;

/// How long a closing connection waits for its queued echoes to flush
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Outcome of registering a control connection
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: ClientId,
    pub is_master: bool,
    /// Cancelled once the authority has dropped this client
    pub dropped: CancellationToken,
}

/// Control-channel view for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorityStatus {
    pub clients: usize,
    pub master: Option<ClientId>,
}

enum Request {
    Register {
        addr: SocketAddr,
        outbound: mpsc::Sender<Command>,
        reply: oneshot::Sender<Registration>,
    },
    Command {
        from: ClientId,
        command: Command,
    },
    Disconnect {
        id: ClientId,
    },
    Shutdown,
    Status {
        reply: oneshot::Sender<AuthorityStatus>,
    },
}

/// Cloneable sender side of the authority actor
///
/// Every method is a no-op (or returns `None`/`false`) once the actor has exited.
#[derive(Clone)]
pub struct AuthorityHandle {
    tx: mpsc::Sender<Request>,
}

impl AuthorityHandle {
    /// Add a control client whose echoes go to `outbound`
    pub async fn register(
        &self,
        addr: SocketAddr,
        outbound: mpsc::Sender<Command>,
    ) -> Option<Registration> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Register {
                addr,
                outbound,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Queue a command read from client `from`
    pub async fn submit(&self, from: ClientId, command: Command) -> bool {
        self.tx
            .send(Request::Command { from, command })
            .await
            .is_ok()
    }

    pub async fn disconnect(&self, id: ClientId) {
        let _ = self.tx.send(Request::Disconnect { id }).await;
    }

    /// Operator shutdown: broadcast `shutdown`, then cancel the process
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Request::Shutdown).await;
    }

    /// Current client count and master id
    ///
    /// The reply is produced after every previously queued request has been
    /// applied.
    pub async fn status(&self) -> Option<AuthorityStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Request::Status { reply }).await.ok()?;
        rx.await.ok()
    }
}

struct Client {
    addr: SocketAddr,
    outbound: mpsc::Sender<Command>,
    dropped: CancellationToken,
}

/// The actor state
pub struct CommandAuthority {
    session: Arc<Session>,
    clients: BTreeMap<ClientId, Client>,
    master: Option<ClientId>,
    next_id: ClientId,
    /// Newest track generation already echoed as `play`
    announced: u64,
    shutdown: CancellationToken,
}

impl CommandAuthority {
    /// Start the actor; it runs until `shutdown` fires or every handle is dropped
    pub fn spawn(session: Arc<Session>, shutdown: CancellationToken) -> (AuthorityHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let authority = Self {
            announced: session.clock().generation(),
            session,
            clients: BTreeMap::new(),
            master: None,
            next_id: 1,
            shutdown,
        };
        let task = tokio::spawn(authority.run(rx));
        (AuthorityHandle { tx }, task)
    }

    async fn run(mut self, mut requests: mpsc::Receiver<Request>) {
        let shutdown = self.shutdown.clone();
        let mut events = self.session.subscribe();
        let mut events_open = true;

        // Pending session events go out before the next request is applied
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = events.recv(), if events_open => match event {
                    Ok(event) => self.on_session_event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Authority missed {} session events", skipped);
                    }
                    Err(RecvError::Closed) => events_open = false,
                },
                request = requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
            }
        }

        info!("Command authority stopped ({} clients dropped)", self.clients.len());
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Register {
                addr,
                outbound,
                reply,
            } => {
                let registration = self.register(addr, outbound);
                let _ = reply.send(registration);
            }
            Request::Command { from, command } => self.apply(from, command).await,
            Request::Disconnect { id } => self.remove(id),
            Request::Shutdown => {
                info!("Operator shutdown: notifying {} clients", self.clients.len());
                self.broadcast(Command::Shutdown);
                self.shutdown.cancel();
            }
            Request::Status { reply } => {
                let _ = reply.send(AuthorityStatus {
                    clients: self.clients.len(),
                    master: self.master,
                });
            }
        }
    }

    fn register(&mut self, addr: SocketAddr, outbound: mpsc::Sender<Command>) -> Registration {
        let id = self.next_id;
        self.next_id += 1;
        let dropped = self.shutdown.child_token();
        self.clients.insert(
            id,
            Client {
                addr,
                outbound,
                dropped: dropped.clone(),
            },
        );

        let is_master = self.master.is_none();
        if is_master {
            self.master = Some(id);
            info!("Client {} ({}) is now master", id, addr);
        } else {
            info!("Client {} ({}) connected", id, addr);
        }
        Registration {
            id,
            is_master,
            dropped,
        }
    }

    fn remove(&mut self, id: ClientId) {
        let Some(client) = self.clients.remove(&id) else {
            return;
        };
        client.dropped.cancel();
        info!("Client {} ({}) left", id, client.addr);

        if self.master == Some(id) {
            self.master = self.clients.keys().next().copied();
            match self.master {
                Some(promoted) => info!("Client {} promoted to master", promoted),
                None => info!("No clients left; master slot empty"),
            }
        }
    }

    async fn apply(&mut self, from: ClientId, command: Command) {
        if !self.clients.contains_key(&from) {
            return;
        }
        if command == Command::Quit {
            self.remove(from);
            return;
        }
        if self.master != Some(from) {
            debug!("Ignoring {} from non-master client {}", command, from);
            return;
        }

        debug!("Master {} issued {}", from, command);
        let echo = match command {
            Command::Play => self.session.play().then_some(Command::Play),
            Command::Pause => self.session.pause().then_some(Command::Pause),
            Command::Resume => self.session.resume().then_some(Command::Resume),
            Command::Next => match self.session.next().await {
                Ok(_) => {
                    self.announced = self.announced.max(self.session.clock().generation());
                    Some(Command::Play)
                }
                Err(e) => {
                    warn!("next failed: {}", e);
                    None
                }
            },
            Command::Shutdown => {
                warn!("Client {} asked for shutdown; only the operator may shut down", from);
                None
            }
            Command::Quit => None,
        };

        if let Some(echo) = echo {
            self.broadcast(echo);
        }
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::TrackChanged { name, generation, .. } => {
                if generation <= self.announced {
                    return;
                }
                self.announced = generation;
                debug!("Announcing track change to {}", name);
                self.broadcast(Command::Play);
            }
            SessionEvent::Halted { reason } => {
                debug!("Announcing halt: {}", reason);
                self.broadcast(Command::Pause);
            }
        }
    }

    /// Queue `command` for every client, then drop the ones that could not take it
    fn broadcast(&mut self, command: Command) {
        let dead: Vec<ClientId> = self
            .clients
            .iter()
            .filter_map(|(id, client)| match client.outbound.try_send(command) {
                Ok(()) => None,
                Err(e) => {
                    warn!("Dropping client {} ({}): {}", id, client.addr, e);
                    Some(*id)
                }
            })
            .collect();

        for id in dead {
            self.remove(id);
        }
    }
}

/// Accept control connections until `shutdown` fires
///
/// Each connection is registered before its task is spawned, so election
/// follows accept order.
pub async fn run_command_server(
    listener: TcpListener,
    authority: AuthorityHandle,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("Command channel listening on {}", listener.local_addr()?);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("Command accept failed: {}", e);
                        continue;
                    }
                };

                let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
                let Some(registration) = authority.register(addr, outbound).await else {
                    warn!("Command authority is gone; refusing {}", addr);
                    break;
                };

                connections.spawn(serve_client(stream, registration, authority.clone(), outbound_rx));
            }
        }
    }

    // Let open connections flush the final broadcast
    let drain = async { while connections.join_next().await.is_some() {} };
    if tokio::time::timeout(WRITER_GRACE * 2, drain).await.is_err() {
        debug!("Command connections did not close in time");
    }
    info!("Command channel stopped accepting");
    Ok(())
}

/// Read commands from one client until it quits, disconnects or is dropped
///
/// The socket closes on return: the echo writer gets `WRITER_GRACE` to flush
/// and is aborted after that.
async fn serve_client<S>(
    stream: S,
    registration: Registration,
    authority: AuthorityHandle,
    outbound: mpsc::Receiver<Command>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let id = registration.id;
    let (read_half, write_half) = tokio::io::split(stream);
    let mut writer = tokio::spawn(write_echoes(id, write_half, outbound));
    let mut lines = FramedRead::new(read_half, CommandLineCodec::new());

    'session: loop {
        let line = tokio::select! {
            _ = registration.dropped.cancelled() => break,
            line = lines.next() => line,
        };

        let line = match line {
            Some(Ok(ReceivedLine::Text(line))) => line,
            Some(Ok(ReceivedLine::TooLong)) => {
                warn!("Client {}: ignoring line longer than {} bytes", id, MAX_COMMAND_LINE);
                continue;
            }
            Some(Ok(ReceivedLine::NotUtf8)) => {
                warn!("Client {}: ignoring line that is not UTF-8", id);
                continue;
            }
            Some(Err(e)) => {
                warn!("Client {} connection fault: {}", id, e);
                break;
            }
            None => {
                debug!("Client {} closed the control channel", id);
                break;
            }
        };

        for parsed in parse_line(&line) {
            match parsed {
                Ok(Command::Quit) => {
                    info!("Client {} quit", id);
                    break 'session;
                }
                Ok(command) => {
                    if !authority.submit(id, command).await {
                        break 'session;
                    }
                }
                Err(e) => warn!("Client {}: {}", id, e),
            }
        }
    }

    authority.disconnect(id).await;
    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        debug!("Client {} echo writer stalled; closing", id);
        writer.abort();
    }
}

async fn write_echoes<W>(id: ClientId, write_half: W, mut outbound: mpsc::Receiver<Command>)
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(write_half, line_codec());
    while let Some(command) = outbound.recv().await {
        if let Err(e) = sink.send(command.as_str()).await {
            debug!("Client {} echo write failed: {}", id, e);
            break;
        }
    }
}
