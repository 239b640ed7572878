//! Authoritative game state: sessions, round cycle, word distribution and scoring.
//!
//! Everything here is synchronous and only ever called from the reactor, so
//! no locking is involved. Network faults surface as session status changes
//! and are resolved by [`Game::cleanup`].

use log::{debug, info, warn};
use shared::{ClientPacket, JoinKind, PlayerMode, ServerPacket};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::corpus::WordCorpus;
use crate::error::JoinError;
use crate::round::Round;
use crate::session::{ConnectionStatus, Session, SessionId, SessionTable};

#[derive(Debug)]
pub struct Game {
    config: ServerConfig,
    corpus: WordCorpus,
    sessions: SessionTable,
    round: Round,
}

impl Game {
    pub fn new(config: ServerConfig, corpus: WordCorpus) -> Self {
        Self {
            sessions: SessionTable::new(config.max_players),
            round: Round::new(config.lobby_duration),
            config,
            corpus,
        }
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Identifies a pending connection as a new spectator session.
    ///
    /// On rejection the connection is dropped, which closes it without
    /// sending anything.
    pub fn add_session(
        &mut self,
        connection: Connection,
        fanout: u32,
        name: &str,
    ) -> Result<SessionId, JoinError> {
        let id = self.sessions.insert(connection, fanout, name)?;
        info!("[+] {} has joined as session {}", name, id);
        self.announce_join(id);
        Ok(id)
    }

    /// Accepts the newcomer, announces it to everyone else and replays the
    /// existing roster to it in join order.
    fn announce_join(&mut self, id: SessionId) {
        let Some(session) = self.sessions.get(id) else {
            return;
        };
        let info = session.info();
        let name = session.name.clone();

        self.sessions.unicast(id, ServerPacket::PlayerAccept(info));
        self.sessions.broadcast(
            &ServerPacket::PlayerJoin {
                info,
                kind: JoinKind::New,
                name,
            },
            Some(id),
        );

        let mut roster: Vec<&Session> = self.sessions.iter().filter(|s| s.id != id).collect();
        roster.sort_by_key(|s| s.id);
        let roster: Vec<ServerPacket> = roster
            .into_iter()
            .map(|s| ServerPacket::PlayerJoin {
                info: s.info(),
                kind: JoinKind::Existing,
                name: s.name.clone(),
            })
            .collect();
        for packet in roster {
            if !self.sessions.unicast(id, packet) {
                break;
            }
        }
    }

    /// Removes a session, tells the others, and drops back to the lobby when
    /// nobody is left to play.
    pub fn remove_session(&mut self, id: SessionId) -> bool {
        let Some(session) = self.sessions.remove(id) else {
            warn!("Session {} not found", id);
            return false;
        };
        info!("[-] {} has left", session.name);
        drop(session.into_connection());

        self.sessions
            .broadcast(&ServerPacket::PlayerRemove { id: id.0 }, Some(id));

        if self.sessions.is_empty() {
            self.end_round(None);
        } else if self.round.is_running() && self.sessions.player_count() == 0 {
            self.end_round(None);
        }
        true
    }

    pub fn handle_packet(&mut self, id: SessionId, packet: ClientPacket) {
        match packet {
            ClientPacket::PlayerInfos { .. } => {
                debug!("Session {} identified twice, ignoring", id);
            }
            ClientPacket::WordComplete => self.word_complete(id),
            ClientPacket::Disconnect { reason } => {
                info!("Session {} disconnected: {}", id, reason);
                self.remove_session(id);
            }
        }
    }

    /// Credits one completed word. Ignored outside a running round and for
    /// sessions with no outstanding word.
    pub fn word_complete(&mut self, id: SessionId) {
        if !self.round.is_running() {
            debug!("Session {} completed a word while waiting", id);
            return;
        }

        let corpus = &self.corpus;
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        let Some(cursor) = session.cursor else {
            return;
        };
        if session.mode != PlayerMode::Player || session.outstanding == 0 {
            debug!("Session {} has no outstanding word", id);
            return;
        }

        session.cursor = Some(corpus.advance(cursor));
        session.outstanding -= 1;
        session.score += 1;
        let info = session.info();

        self.sessions
            .broadcast(&ServerPacket::PlayerUpdate(info), None);

        if info.score >= self.config.score_limit {
            self.end_round(Some(id));
        } else {
            self.push_word(id);
        }
    }

    /// Applies one elapsed second to the active countdown.
    pub fn tick_second(&mut self) {
        if !self.round.tick() {
            return;
        }

        if self.round.is_running() {
            let leader = self.leader();
            self.end_round(leader);
        } else if self.sessions.is_empty() {
            self.round.restart_lobby(self.config.lobby_duration);
        } else {
            self.start_round();
        }
    }

    fn start_round(&mut self) {
        let anchor = self.corpus.anchor();
        self.round.begin(self.config.round_duration);

        let ids = self.sessions.ids();
        for &id in &ids {
            let Some(session) = self.sessions.get_mut(id) else {
                continue;
            };
            session.reset_for_round(anchor);
            let fanout = session.fanout;

            for _ in 0..fanout {
                if !self.push_word(id) {
                    break;
                }
            }
        }

        for &id in &ids {
            if let Some(info) = self.sessions.get(id).map(Session::info) {
                self.sessions
                    .broadcast(&ServerPacket::PlayerUpdate(info), None);
            }
        }

        info!("Game has started with {} players", ids.len());
        let status = self.round.status_packet();
        self.sessions.broadcast(&status, None);
    }

    fn end_round(&mut self, winner: Option<SessionId>) {
        let was_running = self.round.is_running();
        let winner = winner.filter(|&id| self.sessions.get(id).is_some());
        self.round.finish(winner, self.config.lobby_duration);

        match self.round.winner().and_then(|id| self.sessions.get(id)) {
            Some(session) => {
                if let Some(cursor) = session.cursor {
                    self.corpus.set_anchor(cursor);
                }
                info!("Game has ended won by: {}", session.name);
            }
            None if was_running => info!("Game has ended without winner"),
            None => {}
        }

        let status = self.round.status_packet();
        self.sessions.broadcast(&status, None);
    }

    /// Pushes the session's next unseen word. Returns false when nothing was sent.
    fn push_word(&mut self, id: SessionId) -> bool {
        let Some(session) = self.sessions.get(id) else {
            return false;
        };
        let Some(cursor) = session.cursor else {
            return false;
        };
        if session.status != ConnectionStatus::Stable {
            return false;
        }

        let word = self.corpus.word_at(cursor, session.outstanding).to_string();
        if !self.sessions.unicast(id, ServerPacket::NewWord { word }) {
            return false;
        }
        if let Some(session) = self.sessions.get_mut(id) {
            session.outstanding += 1;
        }
        true
    }

    /// Unique top scorer among players, if any scored at all.
    fn leader(&self) -> Option<SessionId> {
        let mut best: Option<(SessionId, u32)> = None;
        let mut tied = false;

        for session in self.sessions.iter().filter(|s| s.mode == PlayerMode::Player) {
            match best {
                None if session.score > 0 => best = Some((session.id, session.score)),
                Some((_, top)) if session.score > top => {
                    best = Some((session.id, session.score));
                    tied = false;
                }
                Some((_, top)) if session.score == top => tied = true,
                _ => {}
            }
        }

        if tied {
            None
        } else {
            best.map(|(id, _)| id)
        }
    }

    pub fn mark_faulted(&mut self, id: SessionId, status: ConnectionStatus) {
        self.sessions.mark(id, status);
    }

    pub fn needs_cleanup(&self) -> bool {
        self.sessions.needs_cleanup()
    }

    /// Removes every broken or closing session.
    ///
    /// Each removal broadcasts and may break further sessions, and the swap
    /// compaction moves entries around, so the table is rescanned from the
    /// start after every removal until a full pass finds nothing.
    pub fn cleanup(&mut self) -> usize {
        let mut removed = 0;
        while let Some(id) = self.sessions.first_faulted() {
            self.remove_session(id);
            removed += 1;
        }
        self.sessions.needs_cleanup = false;
        removed
    }

    /// Notifies every session and hands back their connections for closing.
    pub fn shutdown(&mut self, reason: &str) -> Vec<Connection> {
        self.sessions.broadcast(
            &ServerPacket::Disconnected {
                reason: reason.to_string(),
            },
            None,
        );
        self.sessions
            .drain()
            .map(Session::into_connection)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionId;
    use shared::{PlayerInfo, RoundState, MAX_FANOUT, MIN_FANOUT};
    use tokio::sync::mpsc::Receiver;

    struct Client {
        id: SessionId,
        queue: Receiver<ServerPacket>,
    }

    impl Client {
        fn drain(&mut self) -> Vec<ServerPacket> {
            let mut packets = Vec::new();
            while let Ok(packet) = self.queue.try_recv() {
                packets.push(packet);
            }
            packets
        }
    }

    fn config() -> ServerConfig {
        ServerConfig {
            lobby_duration: 3,
            round_duration: 10,
            score_limit: 5,
            ..ServerConfig::default()
        }
    }

    fn game(words: &[&str], config: ServerConfig) -> Game {
        Game::new(config, WordCorpus::from_words(words).unwrap())
    }

    fn join(game: &mut Game, connection: u64, name: &str, fanout: u32) -> Client {
        let (link, queue) = Connection::detached(ConnectionId(connection), 64);
        let id = game.add_session(link, fanout, name).unwrap();
        Client { id, queue }
    }

    fn expire_lobby(game: &mut Game) {
        for _ in 0..game.config.lobby_duration {
            game.tick_second();
        }
    }

    fn words(packets: &[ServerPacket]) -> Vec<&str> {
        packets
            .iter()
            .filter_map(|p| match p {
                ServerPacket::NewWord { word } => Some(word.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_player_round_scenario() {
        let mut game = game(&["ab", "cd", "ef"], config());
        let mut alice = join(&mut game, 1, "alice", 2);

        expire_lobby(&mut game);

        let spectator = PlayerInfo {
            id: alice.id.0,
            mode: PlayerMode::Spectator,
            score: 0,
        };
        let player = PlayerInfo {
            mode: PlayerMode::Player,
            ..spectator
        };
        assert_eq!(
            alice.drain(),
            vec![
                ServerPacket::PlayerAccept(spectator),
                ServerPacket::NewWord {
                    word: "ab".to_string()
                },
                ServerPacket::NewWord {
                    word: "cd".to_string()
                },
                ServerPacket::PlayerUpdate(player),
                ServerPacket::GameStatus {
                    state: RoundState::Running,
                    seconds_remaining: 10
                },
            ]
        );

        game.word_complete(alice.id);
        game.word_complete(alice.id);

        assert_eq!(game.sessions().get(alice.id).unwrap().score, 2);
        let packets = alice.drain();
        assert!(packets.contains(&ServerPacket::PlayerUpdate(PlayerInfo {
            score: 2,
            ..player
        })));
        // Each completion is replaced by the next word in the list.
        assert_eq!(words(&packets), vec!["ef", "ab"]);
    }

    #[test]
    fn test_join_announces_and_replays_roster() {
        let mut game = game(&["ab"], config());
        let mut alice = join(&mut game, 1, "alice", 1);
        let mut bob = join(&mut game, 2, "bob", 1);
        alice.drain();
        bob.drain();

        let mut carol = join(&mut game, 3, "carol", 1);

        let announced = alice.drain();
        assert_eq!(announced.len(), 1);
        assert!(matches!(
            &announced[0],
            ServerPacket::PlayerJoin { kind: JoinKind::New, name, info } if name == "carol" && info.id == carol.id.0
        ));

        let replay = carol.drain();
        assert_eq!(replay.len(), 3);
        assert!(matches!(replay[0], ServerPacket::PlayerAccept(_)));
        let names: Vec<&str> = replay[1..]
            .iter()
            .map(|p| match p {
                ServerPacket::PlayerJoin {
                    kind: JoinKind::Existing,
                    name,
                    ..
                } => name.as_str(),
                other => panic!("Unexpected packet: {:?}", other),
            })
            .collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[test]
    fn test_roster_replay_follows_join_order_after_compaction() {
        let mut game = game(&["ab"], config());
        let alice = join(&mut game, 1, "alice", 1);
        let _bob = join(&mut game, 2, "bob", 1);
        let _carol = join(&mut game, 3, "carol", 1);
        game.remove_session(alice.id);

        let mut dave = join(&mut game, 4, "dave", 1);
        let names: Vec<String> = dave
            .drain()
            .into_iter()
            .filter_map(|p| match p {
                ServerPacket::PlayerJoin { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["bob", "carol"]);
    }

    #[test]
    fn test_capacity_rejection_sends_nothing() {
        let mut game = game(
            &["ab"],
            ServerConfig {
                max_players: 1,
                ..config()
            },
        );
        let _alice = join(&mut game, 1, "alice", 1);

        let (link, mut queue) = Connection::detached(ConnectionId(2), 8);
        let result = game.add_session(link, 1, "bob");

        assert_eq!(result, Err(JoinError::CapacityExceeded { max: 1 }));
        assert!(matches!(
            queue.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(game.sessions().len(), 1);
    }

    #[test]
    fn test_invalid_fanout_closes_connection() {
        let mut game = game(&["ab"], config());

        for fanout in [0, MAX_FANOUT + 1] {
            let (link, mut queue) = Connection::detached(ConnectionId(1), 8);
            assert_eq!(
                game.add_session(link, fanout, "eve"),
                Err(JoinError::InvalidFanout(fanout))
            );
            assert!(matches!(
                queue.try_recv(),
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
            ));
        }
        assert!(game.sessions().is_empty());
    }

    #[test]
    fn test_valid_fanouts_are_accepted_with_increasing_ids() {
        let mut game = game(
            &["ab"],
            ServerConfig {
                max_players: MAX_FANOUT as usize,
                ..config()
            },
        );
        let mut last = None;
        for fanout in MIN_FANOUT..=MAX_FANOUT {
            let client = join(&mut game, fanout as u64, "p", fanout);
            assert!(last.map_or(true, |prev| client.id > prev));
            last = Some(client.id);
        }
    }

    #[test]
    fn test_lobby_with_nobody_restarts() {
        let mut game = game(&["ab"], config());
        expire_lobby(&mut game);

        assert_eq!(game.round.state(), RoundState::Waiting);
        assert_eq!(game.round.seconds_remaining(), 3);
    }

    #[test]
    fn test_winner_moves_anchor_to_its_cursor() {
        let words = ["w0", "w1", "w2", "w3", "w4", "w5", "w6", "w7"];
        let mut game = game(
            &words,
            ServerConfig {
                score_limit: 3,
                ..config()
            },
        );
        let alice = join(&mut game, 1, "alice", 2);
        let bob = join(&mut game, 2, "bob", 2);
        expire_lobby(&mut game);

        game.word_complete(bob.id);
        for _ in 0..3 {
            game.word_complete(alice.id);
        }

        assert_eq!(game.round.state(), RoundState::Waiting);
        assert_eq!(game.round.winner(), Some(alice.id));
        assert_eq!(game.corpus.anchor().position(), 3);
        assert_eq!(
            game.corpus.anchor(),
            game.sessions().get(alice.id).unwrap().cursor.unwrap()
        );
    }

    #[test]
    fn test_next_round_resumes_from_anchor() {
        let words = ["w0", "w1", "w2", "w3", "w4"];
        let mut game = game(
            &words,
            ServerConfig {
                score_limit: 2,
                ..config()
            },
        );
        let mut alice = join(&mut game, 1, "alice", 1);
        expire_lobby(&mut game);
        game.word_complete(alice.id);
        game.word_complete(alice.id);
        alice.drain();

        expire_lobby(&mut game);

        assert_eq!(words_of(&alice.drain()), vec!["w2"]);
    }

    fn words_of(packets: &[ServerPacket]) -> Vec<String> {
        words(packets).into_iter().map(str::to_string).collect()
    }

    #[test]
    fn test_completion_after_win_is_ignored() {
        let mut game = game(
            &["ab", "cd"],
            ServerConfig {
                score_limit: 2,
                ..config()
            },
        );
        let alice = join(&mut game, 1, "alice", 3);
        expire_lobby(&mut game);

        game.word_complete(alice.id);
        game.word_complete(alice.id);
        game.word_complete(alice.id);

        assert_eq!(game.sessions().get(alice.id).unwrap().score, 2);
        assert_eq!(game.round.state(), RoundState::Waiting);
    }

    #[test]
    fn test_completion_while_waiting_is_ignored() {
        let mut game = game(&["ab"], config());
        let alice = join(&mut game, 1, "alice", 1);

        game.word_complete(alice.id);

        assert_eq!(game.sessions().get(alice.id).unwrap().score, 0);
    }

    #[test]
    fn test_spectator_joining_mid_round_cannot_score() {
        let mut game = game(&["ab"], config());
        let _alice = join(&mut game, 1, "alice", 1);
        expire_lobby(&mut game);
        let mut late = join(&mut game, 2, "late", 1);

        game.word_complete(late.id);

        let session = game.sessions().get(late.id).unwrap();
        assert_eq!(session.score, 0);
        assert_eq!(session.mode, PlayerMode::Spectator);
        assert!(words(&late.drain()).is_empty());
    }

    #[test]
    fn test_round_end_broadcasts_waiting_status() {
        let mut game = game(
            &["ab"],
            ServerConfig {
                score_limit: 1,
                ..config()
            },
        );
        let alice = join(&mut game, 1, "alice", 1);
        let mut bob = join(&mut game, 2, "bob", 1);
        expire_lobby(&mut game);
        bob.drain();

        game.word_complete(alice.id);

        let status: Vec<ServerPacket> = bob
            .drain()
            .into_iter()
            .filter(|p| matches!(p, ServerPacket::GameStatus { .. }))
            .collect();
        assert_eq!(
            status,
            vec![ServerPacket::GameStatus {
                state: RoundState::Waiting,
                seconds_remaining: 3
            }]
        );
    }

    #[test]
    fn test_round_timeout_crowns_unique_leader() {
        let mut game = game(&["a", "b", "c", "d"], config());
        let alice = join(&mut game, 1, "alice", 2);
        let bob = join(&mut game, 2, "bob", 2);
        expire_lobby(&mut game);
        game.word_complete(alice.id);
        game.word_complete(alice.id);
        game.word_complete(bob.id);

        for _ in 0..game.config.round_duration {
            game.tick_second();
        }

        assert_eq!(game.round.state(), RoundState::Waiting);
        assert_eq!(game.round.winner(), Some(alice.id));
        assert_eq!(game.corpus.anchor().position(), 2);
    }

    #[test]
    fn test_round_timeout_with_tie_has_no_winner() {
        let mut game = game(&["a", "b", "c"], config());
        let alice = join(&mut game, 1, "alice", 2);
        let bob = join(&mut game, 2, "bob", 2);
        expire_lobby(&mut game);
        game.word_complete(alice.id);
        game.word_complete(bob.id);

        for _ in 0..game.config.round_duration {
            game.tick_second();
        }

        assert_eq!(game.round.winner(), None);
        assert_eq!(game.corpus.anchor().position(), 0);
    }

    #[test]
    fn test_disconnect_mid_round_keeps_round_running() {
        let mut game = game(&["ab"], config());
        let alice = join(&mut game, 1, "alice", 1);
        let mut bob = join(&mut game, 2, "bob", 1);
        expire_lobby(&mut game);
        bob.drain();

        game.handle_packet(
            alice.id,
            ClientPacket::Disconnect {
                reason: "bye".to_string(),
            },
        );

        assert_eq!(
            bob.drain(),
            vec![ServerPacket::PlayerRemove { id: alice.id.0 }]
        );
        assert_eq!(game.round.state(), RoundState::Running);
    }

    #[test]
    fn test_last_disconnect_forces_waiting_without_winner() {
        let mut game = game(&["ab", "cd", "ef"], config());
        let alice = join(&mut game, 1, "alice", 2);
        expire_lobby(&mut game);
        game.word_complete(alice.id);

        game.remove_session(alice.id);

        assert!(game.sessions().is_empty());
        assert_eq!(game.round.state(), RoundState::Waiting);
        assert_eq!(game.round.winner(), None);
        assert_eq!(game.corpus.anchor().position(), 0);
    }

    #[test]
    fn test_only_spectators_left_ends_round() {
        let mut game = game(&["ab"], config());
        let alice = join(&mut game, 1, "alice", 1);
        expire_lobby(&mut game);
        let _late = join(&mut game, 2, "late", 1);

        game.remove_session(alice.id);

        assert_eq!(game.round.state(), RoundState::Waiting);
        assert_eq!(game.sessions().len(), 1);
    }

    #[test]
    fn test_prefill_stops_when_session_breaks() {
        let mut game = game(&["a", "b", "c", "d"], config());
        let (link, queue) = Connection::detached(ConnectionId(1), 2);
        let alice = game.add_session(link, 4, "alice").unwrap();
        // PlayerAccept fills one slot, the first word the second; the third push fails.
        expire_lobby(&mut game);

        let session = game.sessions().get(alice).unwrap();
        assert_eq!(session.status, ConnectionStatus::Broken);
        assert_eq!(session.outstanding, 1);
        assert!(game.needs_cleanup());
        drop(queue);
    }

    #[test]
    fn test_cleanup_removes_every_faulted_session() {
        let mut game = game(&["ab"], config());
        let a = join(&mut game, 1, "a", 1);
        let b = join(&mut game, 2, "b", 1);
        let mut c = join(&mut game, 3, "c", 1);
        let d = join(&mut game, 4, "d", 1);
        c.drain();

        // Fault the first slot and the last slot: removing the first swaps
        // the faulted last one into its place.
        game.mark_faulted(a.id, ConnectionStatus::Broken);
        game.mark_faulted(d.id, ConnectionStatus::Closing);
        // b's socket is dead too, which only shows up when a removal broadcasts.
        drop(b.queue);

        let removed = game.cleanup();

        assert_eq!(removed, 3);
        assert!(!game.needs_cleanup());
        assert_eq!(game.sessions().ids(), vec![c.id]);
        let removals: Vec<ServerPacket> = c
            .drain()
            .into_iter()
            .filter(|p| matches!(p, ServerPacket::PlayerRemove { .. }))
            .collect();
        assert_eq!(removals.len(), 3);
    }

    #[test]
    fn test_identification_twice_is_ignored() {
        let mut game = game(&["ab"], config());
        let alice = join(&mut game, 1, "alice", 1);

        game.handle_packet(
            alice.id,
            ClientPacket::PlayerInfos {
                fanout: 3,
                name: "mallory".to_string(),
            },
        );

        let session = game.sessions().get(alice.id).unwrap();
        assert_eq!(session.name, "alice");
        assert_eq!(session.fanout, 1);
    }

    #[test]
    fn test_shutdown_notifies_and_empties_table() {
        let mut game = game(&["ab"], config());
        let mut alice = join(&mut game, 1, "alice", 1);
        alice.drain();

        let connections = game.shutdown("Server shutting down");

        assert_eq!(connections.len(), 1);
        assert!(game.sessions().is_empty());
        assert_eq!(
            alice.drain(),
            vec![ServerPacket::Disconnected {
                reason: "Server shutting down".to_string()
            }]
        );
    }
}
