//! Server reactor: accepts sockets, performs the identification handshake and
//! routes connection events into the game.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use shared::ClientPacket;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior};

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionEvent, ConnectionId, InboundEvent};
use crate::corpus::WordCorpus;
use crate::error::ServerError;
use crate::game::Game;
use crate::session::ConnectionStatus;

/// How long shutdown waits for each session's queued packets to go out.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

pub const SHUTDOWN_REASON: &str = "Server shutting down";

/// Main server coordinating the listener, connection events and the round clock
pub struct Server {
    listener: TcpListener,
    game: Game,
    /// Accepted socket that has not identified yet. A newer accept replaces it.
    pending: Option<Connection>,
    countdown: Interval,
    poll_interval: Duration,
    outbound_queue: usize,
    next_connection: u64,
    running: Arc<AtomicBool>,

    events_tx: mpsc::UnboundedSender<InboundEvent>,
    events_rx: mpsc::UnboundedReceiver<InboundEvent>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        config: ServerConfig,
        corpus: WordCorpus,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
        info!(
            "Server listening on {}",
            listener.local_addr().map_err(ServerError::Bind)?
        );

        let second = Duration::from_secs(1);
        let mut countdown = interval_at(Instant::now() + second, second);
        countdown.set_missed_tick_behavior(MissedTickBehavior::Burst);

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            countdown,
            poll_interval: config.poll_interval,
            outbound_queue: config.outbound_queue,
            game: Game::new(config, corpus),
            pending: None,
            next_connection: 0,
            running: Arc::new(AtomicBool::new(true)),
            events_tx,
            events_rx,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Flag polled once per tick. Clearing it makes [`Server::run`] shut down.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn pending(&self) -> Option<ConnectionId> {
        self.pending.as_ref().map(Connection::id)
    }

    /// Runs ticks until the running flag is cleared or a fatal error occurs,
    /// then shuts down gracefully in both cases.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        info!("Server started successfully");

        let result = loop {
            if !self.running.load(Ordering::SeqCst) {
                info!("Shutdown requested");
                break Ok(());
            }
            if let Err(e) = self.tick().await {
                error!("Fatal server error: {}", e);
                break Err(e);
            }
        };

        self.shutdown().await;
        result
    }

    /// One reactor tick: waits, bounded by the poll interval, for the first
    /// accept, connection event or countdown second, handles it, then runs
    /// the cleanup pass if anything faulted.
    pub async fn tick(&mut self) -> Result<(), ServerError> {
        tokio::select! {
            accepted = self.listener.accept() => {
                let (stream, addr) = accepted.map_err(ServerError::Accept)?;
                self.accept(stream, addr);
            },
            Some(inbound) = self.events_rx.recv() => {
                self.dispatch(inbound);
            },
            _ = self.countdown.tick() => {
                self.game.tick_second();
            },
            _ = sleep(self.poll_interval) => {},
        }

        if self.game.needs_cleanup() {
            let removed = self.game.cleanup();
            debug!("Cleanup removed {} sessions", removed);
        }
        Ok(())
    }

    fn accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        self.next_connection += 1;
        let id = ConnectionId(self.next_connection);
        info!("Accepted connection {} from {}", id, addr);

        let connection = Connection::spawn(
            id,
            stream,
            self.events_tx.clone(),
            self.outbound_queue,
        );
        if let Some(previous) = self.pending.replace(connection) {
            info!(
                "Pending connection {} superseded by {}, closing it",
                previous.id(),
                id
            );
        }
    }

    fn dispatch(&mut self, inbound: InboundEvent) {
        let InboundEvent { connection, event } = inbound;

        if self.pending() == Some(connection) {
            self.handshake(event);
            return;
        }

        let Some(id) = self.game.sessions().find_by_connection(connection) else {
            debug!("Dropping event for stale connection {}", connection);
            return;
        };

        match event {
            ConnectionEvent::Packet(packet) => self.game.handle_packet(id, packet),
            ConnectionEvent::Closed => {
                info!("Session {} closed its connection", id);
                self.game.mark_faulted(id, ConnectionStatus::Closing);
            }
            ConnectionEvent::ReadFailed(e) | ConnectionEvent::WriteFailed(e) => {
                warn!("Session {} connection broken: {}", id, e);
                self.game.mark_faulted(id, ConnectionStatus::Broken);
            }
        }
    }

    /// Handles the first event of the pending connection. Anything other than
    /// a valid identification closes it.
    fn handshake(&mut self, event: ConnectionEvent) {
        let Some(connection) = self.pending.take() else {
            return;
        };
        let id = connection.id();

        match event {
            ConnectionEvent::Packet(ClientPacket::PlayerInfos { fanout, name }) => {
                if let Err(e) = self.game.add_session(connection, fanout, &name) {
                    warn!("Rejected {} on connection {}: {}", name, id, e);
                }
            }
            ConnectionEvent::Packet(packet) => {
                warn!(
                    "Connection {} sent {:#04x} before identifying, closing it",
                    id,
                    packet.tag()
                );
            }
            ConnectionEvent::Closed => {
                info!("Pending connection {} closed before identifying", id);
            }
            ConnectionEvent::ReadFailed(e) | ConnectionEvent::WriteFailed(e) => {
                warn!("Pending connection {} failed: {}", id, e);
            }
        }
    }

    /// Notifies every session, then closes all sockets.
    pub async fn shutdown(&mut self) {
        info!("Server shutting down");
        self.pending = None;

        for connection in self.game.shutdown(SHUTDOWN_REASON) {
            connection.close(SHUTDOWN_GRACE).await;
        }
    }
}
