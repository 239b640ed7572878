//! One-envelope-per-call transport helpers.
//!
//! The protocol has no framing beyond the fixed envelope size: each read or
//! write moves exactly one envelope. A read that returns any other byte count
//! is reported to the caller, which discards it. Nothing is reassembled.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Envelope, ENVELOPE_SIZE};

#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The peer closed its side in an orderly way.
    Closed,
    Frame(Envelope),
    /// A read returned a byte count other than the envelope size.
    Short(usize),
}

/// Performs a single read of up to one envelope.
pub async fn read_envelope<R>(reader: &mut R) -> io::Result<ReadOutcome>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; ENVELOPE_SIZE];
    let size = reader.read(&mut buffer).await?;
    Ok(match size {
        0 => ReadOutcome::Closed,
        ENVELOPE_SIZE => ReadOutcome::Frame(buffer),
        size => ReadOutcome::Short(size),
    })
}

pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(envelope).await?;
    writer.flush().await
}
