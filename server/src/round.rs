//! Round countdown: WAITING (lobby) and RUNNING, one second at a time.

use shared::{RoundState, ServerPacket};

use crate::session::SessionId;

#[derive(Debug, Clone)]
pub struct Round {
    state: RoundState,
    seconds_remaining: u32,
    winner: Option<SessionId>,
}

impl Round {
    /// A lobby counting down from `lobby_duration`.
    pub fn new(lobby_duration: u32) -> Self {
        Self {
            state: RoundState::Waiting,
            seconds_remaining: lobby_duration,
            winner: None,
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RoundState::Running
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.seconds_remaining
    }

    /// Winner of the most recent round, if it had one.
    pub fn winner(&self) -> Option<SessionId> {
        self.winner
    }

    /// Counts one second down. Returns true once the active countdown is at zero.
    pub fn tick(&mut self) -> bool {
        self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
        self.seconds_remaining == 0
    }

    pub fn begin(&mut self, round_duration: u32) {
        self.state = RoundState::Running;
        self.seconds_remaining = round_duration;
    }

    pub fn finish(&mut self, winner: Option<SessionId>, lobby_duration: u32) {
        self.state = RoundState::Waiting;
        self.seconds_remaining = lobby_duration;
        self.winner = winner;
    }

    pub fn restart_lobby(&mut self, lobby_duration: u32) {
        self.seconds_remaining = lobby_duration;
    }

    pub fn status_packet(&self) -> ServerPacket {
        ServerPacket::GameStatus {
            state: self.state,
            seconds_remaining: self.seconds_remaining,
        }
    }
}
