use std::collections::{BTreeMap, VecDeque};

use log::debug;
use shared::{JoinKind, PlayerInfo, PlayerMode, RoundState, ServerPacket};

/// What the client knows about one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: String,
    pub mode: PlayerMode,
    pub score: u32,
}

/// Client-side mirror of the server's room, built only from received packets
pub struct ClientGame {
    pub name: String,
    pub own_id: Option<u32>,
    /// Keyed by session id, which is also join order.
    pub roster: BTreeMap<u32, RosterEntry>,
    pub state: RoundState,
    pub seconds_remaining: u32,
    /// Words still to type, oldest first.
    pub words: VecDeque<String>,
    /// Set once the server announced it is going away.
    pub disconnect_reason: Option<String>,
}

impl ClientGame {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            own_id: None,
            roster: BTreeMap::new(),
            state: RoundState::Waiting,
            seconds_remaining: 0,
            words: VecDeque::new(),
            disconnect_reason: None,
        }
    }

    pub fn current_word(&self) -> Option<&str> {
        self.words.front().map(String::as_str)
    }

    /// Applies one server packet and returns a line worth showing, if any.
    pub fn apply(&mut self, packet: ServerPacket) -> Option<String> {
        match packet {
            ServerPacket::GameStatus {
                state,
                seconds_remaining,
            } => {
                let previous = self.state;
                self.state = state;
                self.seconds_remaining = seconds_remaining;

                match (previous, state) {
                    (RoundState::Waiting, RoundState::Running) => Some(format!(
                        "Round started, {}s to go. Type: {}",
                        seconds_remaining,
                        self.current_word().unwrap_or("-")
                    )),
                    (RoundState::Running, RoundState::Waiting) => {
                        // Leftovers from the finished round are never completed.
                        self.words.clear();
                        Some(format!(
                            "Round over. {} Next round in {}s",
                            self.standings(),
                            seconds_remaining
                        ))
                    }
                    _ => None,
                }
            }
            ServerPacket::PlayerAccept(info) => {
                self.own_id = Some(info.id);
                let name = self.name.clone();
                self.upsert(info, &name);
                Some(format!("Joined as player {}", info.id))
            }
            ServerPacket::PlayerUpdate(info) => {
                let entry = self.roster.get_mut(&info.id)?;
                entry.mode = info.mode;
                entry.score = info.score;
                (info.score > 0).then(|| format!("{} has {} points", entry.name, info.score))
            }
            ServerPacket::PlayerRemove { id } => {
                let entry = self.roster.remove(&id)?;
                Some(format!("[-] {} has left", entry.name))
            }
            ServerPacket::PlayerJoin { info, kind, name } => {
                self.upsert(info, &name);
                match kind {
                    JoinKind::New => Some(format!("[+] {} has joined", name)),
                    JoinKind::Existing => {
                        debug!("Roster entry {} ({})", info.id, name);
                        None
                    }
                }
            }
            ServerPacket::NewWord { word } => {
                self.words.push_back(word);
                None
            }
            ServerPacket::Disconnected { reason } => {
                let line = format!("Server disconnected: {}", reason);
                self.disconnect_reason = Some(reason);
                Some(line)
            }
        }
    }

    fn upsert(&mut self, info: PlayerInfo, name: &str) {
        self.roster.insert(
            info.id,
            RosterEntry {
                name: name.to_string(),
                mode: info.mode,
                score: info.score,
            },
        );
    }

    /// Pops the current word if `line` matches it. Only counts while a round runs.
    pub fn submit(&mut self, line: &str) -> bool {
        if self.state != RoundState::Running {
            return false;
        }
        if self.current_word() != Some(line.trim()) {
            return false;
        }
        self.words.pop_front();
        true
    }

    /// Local countdown between server status packets.
    pub fn tick_second(&mut self) {
        self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
    }

    /// Players ordered by score, best first.
    pub fn standings(&self) -> String {
        let mut players: Vec<&RosterEntry> = self
            .roster
            .values()
            .filter(|entry| entry.mode == PlayerMode::Player)
            .collect();
        players.sort_by(|a, b| b.score.cmp(&a.score));

        players
            .iter()
            .map(|entry| format!("{}: {}", entry.name, entry.score))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
