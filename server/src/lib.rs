//! # Typing Race Server Library
//!
//! This library provides the authoritative server for the multiplayer typing
//! race. It owns session membership, round timing, word distribution and
//! scoring, and replicates that state to every connected client.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Round State
//! Rounds alternate between a lobby countdown (WAITING) and a race
//! countdown (RUNNING). When the lobby expires every connected session
//! becomes a player, is reset to the shared word anchor and receives its
//! requested number of words. A player wins by reaching the score limit;
//! otherwise the best scorer when the clock runs out takes the round.
//!
//! ### Session Management
//! Handles the complete lifecycle of a player connection:
//! - Single-slot handshake queue for accepted but unidentified sockets
//! - Capacity and fan-out validation on identification
//! - Monotonic session ids that are never reused
//! - Deferred removal of broken or closed sessions
//!
//! ### State Broadcasting
//! Joins, leaves, score changes and round transitions are pushed to every
//! session as they happen. A failing recipient never stops delivery to the
//! others.
//!
//! ## Architecture Design
//!
//! ### Single Owner Reactor
//! Every socket gets a reader task and a writer task, but neither touches
//! game state. Readers forward decoded packets to the reactor over a channel,
//! writers drain a bounded per-session queue. The reactor is the only place
//! state is mutated, so no locks are needed.
//!
//! ### Fixed-Size Envelopes
//! Each message is one 33-byte envelope (see the `shared` crate). A read that
//! returns any other size is logged and discarded.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Identified players and the fixed-capacity table holding them.
//!
//! ### Broadcast Module (`broadcast`)
//! Unicast and broadcast-except-one with per-recipient fault isolation.
//!
//! ### Game Module (`game`)
//! Round state machine, word pre-fill and replenishment, scoring, winner
//! selection and the cleanup pass.
//!
//! ### Network Module (`network`)
//! Listener, handshake and the reactor tick.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::corpus::WordCorpus;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let corpus = WordCorpus::load("words.txt")?;
//!     let mut server = Server::bind("127.0.0.1:8080", ServerConfig::default(), corpus).await?;
//!
//!     // Runs until the running flag is cleared, then notifies every
//!     // session and closes their sockets.
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod corpus;
pub mod error;
pub mod game;
pub mod network;
pub mod round;
pub mod session;
