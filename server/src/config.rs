//! Runtime tunables for the game server.

use std::time::Duration;

pub const DEFAULT_MAX_PLAYERS: usize = 4;
pub const DEFAULT_LOBBY_SECS: u32 = 15;
pub const DEFAULT_ROUND_SECS: u32 = 60;
pub const DEFAULT_SCORE_LIMIT: u32 = 50;

/// Upper bound on one reactor wait. Must stay well under a second so the
/// countdown and the shutdown flag are serviced with no network traffic.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Packets queued per session before it is considered broken.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 64;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of identified sessions.
    pub max_players: usize,
    /// Seconds the lobby counts down before a round starts.
    pub lobby_duration: u32,
    /// Seconds a round lasts unless someone reaches the score limit first.
    pub round_duration: u32,
    /// Score that wins a round.
    pub score_limit: u32,
    pub poll_interval: Duration,
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_players: DEFAULT_MAX_PLAYERS,
            lobby_duration: DEFAULT_LOBBY_SECS,
            round_duration: DEFAULT_ROUND_SECS,
            score_limit: DEFAULT_SCORE_LIMIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
        }
    }
}
