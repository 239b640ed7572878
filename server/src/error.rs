//! Error types for the game server
//!
//! Fatal errors end the process, join errors reject a single identification
//! request, and send errors degrade a single session.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Process-ending failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("could not bind listening socket: {0}")]
    Bind(#[source] io::Error),

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error(transparent)]
    Corpus(#[from] CorpusError),
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("could not read word file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("word corpus is empty")]
    Empty,
}

/// Reasons an identification request is turned down.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("session table is full ({max} players)")]
    CapacityExceeded { max: usize },

    #[error("requested fan-out {0} is outside {min}..={max}", min = shared::MIN_FANOUT, max = shared::MAX_FANOUT)]
    InvalidFanout(u32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("session is not stable")]
    NotStable,

    #[error("outbound queue is full")]
    QueueFull,

    #[error("connection closed")]
    Closed,
}
