//! # Typing Race Client Library
//!
//! This library provides a headless, line-oriented client for the typing race
//! server. It identifies itself, mirrors the room from the packets it
//! receives and reports a completed word whenever the typed line matches the
//! word at the head of its queue.
//!
//! ## Architecture Overview
//!
//! The server is the single source of truth. The client never scores itself:
//! it only removes the word it typed from its local queue and tells the
//! server, which answers with score updates for everyone.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Local mirror of the room:
//! - Own id and the roster of every participant, in join order
//! - Round state with a local once-per-second countdown
//! - FIFO queue of words still to type
//!
//! ### Network Module (`network`)
//! Connection handling and the main loop:
//! - One fixed-size envelope per read and per write
//! - Server packets take priority over typed lines
//! - Clean exit on ctrl-c, end of input or a server shutdown notice
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use tokio::io::{stdin, BufReader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1:8080", "alice", 10).await?;
//!
//!     let shutdown = async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     };
//!     client.run(BufReader::new(stdin()), shutdown).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
