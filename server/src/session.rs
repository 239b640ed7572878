//! Session table for identified players
//!
//! This module tracks every connected player that has completed the
//! identification handshake:
//! - Monotonic session id assignment (ids are never reused)
//! - Capacity enforcement
//! - Connection status tracking for deferred cleanup
//! - Per-session round state (score, mode, word cursor)
//!
//! Sessions live in a dense vector. Removal swaps the last session into the
//! freed slot, so slot order means nothing; the id is the only stable
//! identity.

use std::fmt;

use log::info;
use shared::{
    truncate_text, PlayerInfo, PlayerMode, ServerPacket, MAX_FANOUT, MAX_NAME_LEN, MIN_FANOUT,
};

use crate::connection::{Connection, ConnectionId};
use crate::corpus::WordCursor;
use crate::error::{JoinError, SendError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Stable,
    /// A read or write failed.
    Broken,
    /// The peer closed its side.
    Closing,
    Closed,
}

/// One identified player
///
/// Besides identity and transport, a session carries its round state:
/// - `cursor` is the next word the player has to complete, `None` until the
///   session takes part in a round
/// - `outstanding` counts words pushed to the client and not completed yet
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    /// Words pushed at round start.
    pub fanout: u32,
    pub score: u32,
    pub mode: PlayerMode,
    pub status: ConnectionStatus,
    pub cursor: Option<WordCursor>,
    pub outstanding: usize,
    connection: Connection,
}

impl Session {
    /// Creates a spectator with no score and no cursor.
    pub fn new(id: SessionId, connection: Connection, fanout: u32, name: &str) -> Self {
        Self {
            id,
            name: truncate_text(name, MAX_NAME_LEN).to_string(),
            fanout,
            score: 0,
            mode: PlayerMode::Spectator,
            status: ConnectionStatus::Stable,
            cursor: None,
            outstanding: 0,
            connection,
        }
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id.0,
            mode: self.mode,
            score: self.score,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn is_faulted(&self) -> bool {
        matches!(
            self.status,
            ConnectionStatus::Broken | ConnectionStatus::Closing
        )
    }

    /// Turns the session into a fresh player positioned at `anchor`.
    pub fn reset_for_round(&mut self, anchor: WordCursor) {
        self.mode = PlayerMode::Player;
        self.score = 0;
        self.cursor = Some(anchor);
        self.outstanding = 0;
    }

    /// Queues a packet if the session is stable. A failed send marks it broken.
    pub(crate) fn deliver(&mut self, packet: ServerPacket) -> Result<(), SendError> {
        if self.status != ConnectionStatus::Stable {
            return Err(SendError::NotStable);
        }
        self.connection.send(packet).map_err(|e| {
            self.status = ConnectionStatus::Broken;
            e
        })
    }

    /// Marks the session closed and hands back its connection.
    pub fn into_connection(mut self) -> Connection {
        self.status = ConnectionStatus::Closed;
        self.connection
    }
}

/// Fixed-capacity registry of identified sessions
///
/// The table also owns the "needs cleanup" flag: any send failure or status
/// downgrade raises it, and the reactor runs a cleanup pass when it is set.
#[derive(Debug)]
pub struct SessionTable {
    sessions: Vec<Session>,
    capacity: usize,
    next_id: u32,
    pub(crate) needs_cleanup: bool,
}

impl SessionTable {
    /// Session ids start from 1 and increase for the life of the process.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Vec::with_capacity(capacity),
            capacity,
            next_id: 1,
            needs_cleanup: false,
        }
    }

    /// Registers a new spectator session. The connection is dropped, and so
    /// closed, when the table is full or the fan-out is out of range.
    pub fn insert(
        &mut self,
        connection: Connection,
        fanout: u32,
        name: &str,
    ) -> Result<SessionId, JoinError> {
        if self.is_full() {
            return Err(JoinError::CapacityExceeded { max: self.capacity });
        }
        if !(MIN_FANOUT..=MAX_FANOUT).contains(&fanout) {
            return Err(JoinError::InvalidFanout(fanout));
        }

        let id = SessionId(self.next_id);
        self.next_id += 1;

        match connection.peer() {
            Some(peer) => info!(
                "Session {} registered on connection {} from {}",
                id,
                connection.id(),
                peer
            ),
            None => info!("Session {} registered on connection {}", id, connection.id()),
        }
        self.sessions.push(Session::new(id, connection, fanout, name));
        Ok(id)
    }

    /// Removes a session, moving the last one into its slot.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let index = self.position(id)?;
        Some(self.sessions.swap_remove(index))
    }

    pub fn position(&self, id: SessionId) -> Option<usize> {
        self.sessions.iter().position(|session| session.id == id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|session| session.id == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|session| session.id == id)
    }

    pub fn find_by_connection(&self, connection: ConnectionId) -> Option<SessionId> {
        self.sessions
            .iter()
            .find(|session| session.connection.id() == connection)
            .map(|session| session.id)
    }

    /// Downgrades a session's status and raises the cleanup flag.
    pub fn mark(&mut self, id: SessionId, status: ConnectionStatus) {
        if let Some(session) = self.get_mut(id) {
            session.status = status;
            self.needs_cleanup = true;
        }
    }

    pub fn first_faulted(&self) -> Option<SessionId> {
        self.sessions
            .iter()
            .find(|session| session.is_faulted())
            .map(|session| session.id)
    }

    pub fn needs_cleanup(&self) -> bool {
        self.needs_cleanup
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.iter_mut()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|session| session.id).collect()
    }

    /// Sessions currently taking part in a round.
    pub fn player_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|session| session.mode == PlayerMode::Player)
            .count()
    }

    /// Empties the table, handing back every session.
    pub fn drain(&mut self) -> impl Iterator<Item = Session> + '_ {
        self.sessions.drain(..)
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
