//! Per-socket transport plumbing.
//!
//! An accepted socket is split in two tasks. The reader performs one envelope
//! read at a time and forwards what it saw to the reactor as an
//! [`InboundEvent`]. The writer drains a bounded queue of outgoing packets.
//! Neither task touches game state: everything they learn goes through the
//! reactor's channel, which is the only place state is mutated.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, error, warn};
use shared::framing::{read_envelope, write_envelope, ReadOutcome};
use shared::{ClientPacket, ServerPacket};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::SendError;

/// Identifies one accepted socket, pending or identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub enum ConnectionEvent {
    Packet(ClientPacket),
    /// The peer closed the socket (zero-byte read).
    Closed,
    ReadFailed(io::Error),
    WriteFailed(io::Error),
}

#[derive(Debug)]
pub struct InboundEvent {
    pub connection: ConnectionId,
    pub event: ConnectionEvent,
}

/// Handle to one socket. Dropping it closes the socket once queued packets
/// have been written.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    outbound: mpsc::Sender<ServerPacket>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Connection {
    /// Splits `stream` and starts its reader and writer tasks.
    pub fn spawn(
        id: ConnectionId,
        stream: TcpStream,
        events: mpsc::UnboundedSender<InboundEvent>,
        queue_depth: usize,
    ) -> Self {
        let peer = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();
        let (outbound, queue) = mpsc::channel(queue_depth);

        let reader = tokio::spawn(read_loop(id, read_half, events.clone()));
        let writer = tokio::spawn(write_loop(id, write_half, queue, events));

        Self {
            id,
            peer,
            outbound,
            reader: Some(reader),
            writer: Some(writer),
        }
    }

    /// A connection backed only by an in-memory queue. Whatever the server
    /// sends shows up on the returned receiver; dropping the receiver makes
    /// every later send fail like a dead socket would.
    #[cfg(test)]
    pub(crate) fn detached(id: ConnectionId, queue_depth: usize) -> (Self, mpsc::Receiver<ServerPacket>) {
        let (outbound, queue) = mpsc::channel(queue_depth);
        let connection = Self {
            id,
            peer: None,
            outbound,
            reader: None,
            writer: None,
        };
        (connection, queue)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Queues one packet without waiting.
    pub fn send(&self, packet: ServerPacket) -> Result<(), SendError> {
        self.outbound.try_send(packet).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Closes the connection and waits up to `grace` for queued packets to
    /// reach the socket.
    pub async fn close(mut self, grace: Duration) {
        let id = self.id;
        let writer = self.writer.take();
        drop(self);

        if let Some(writer) = writer {
            if timeout(grace, writer).await.is_err() {
                warn!("Connection {} did not flush within {:?}", id, grace);
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn read_loop(
    id: ConnectionId,
    mut reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<InboundEvent>,
) {
    loop {
        let event = match read_envelope(&mut reader).await {
            Ok(ReadOutcome::Frame(envelope)) => match ClientPacket::decode(&envelope) {
                Ok(packet) => ConnectionEvent::Packet(packet),
                Err(e) => {
                    warn!("Ignoring packet on connection {}: {}", id, e);
                    continue;
                }
            },
            Ok(ReadOutcome::Short(size)) => {
                warn!("Invalid packet size ({}) on connection {}", size, id);
                continue;
            }
            Ok(ReadOutcome::Closed) => ConnectionEvent::Closed,
            Err(e) => ConnectionEvent::ReadFailed(e),
        };

        let last = !matches!(event, ConnectionEvent::Packet(_));
        if events.send(InboundEvent { connection: id, event }).is_err() || last {
            break;
        }
    }
    debug!("Reader for connection {} finished", id);
}

async fn write_loop(
    id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::Receiver<ServerPacket>,
    events: mpsc::UnboundedSender<InboundEvent>,
) {
    while let Some(packet) = queue.recv().await {
        let envelope = match packet.encode() {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Failed to encode packet for connection {}: {}", id, e);
                continue;
            }
        };

        if let Err(e) = write_envelope(&mut writer, &envelope).await {
            let _ = events.send(InboundEvent {
                connection: id,
                event: ConnectionEvent::WriteFailed(e),
            });
            return;
        }
    }

    let _ = writer.shutdown().await;
    debug!("Writer for connection {} finished", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{PlayerInfo, PlayerMode};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (server, client)
    }

    #[test]
    fn test_detached_connection_delivers_to_queue() {
        let (connection, mut queue) = Connection::detached(ConnectionId(1), 4);
        let packet = ServerPacket::PlayerRemove { id: 9 };

        assert_eq!(connection.send(packet.clone()), Ok(()));
        assert_eq!(queue.try_recv().unwrap(), packet);
    }

    #[test]
    fn test_send_reports_full_and_closed_queues() {
        let (connection, queue) = Connection::detached(ConnectionId(1), 1);
        let packet = ServerPacket::PlayerRemove { id: 9 };

        assert_eq!(connection.send(packet.clone()), Ok(()));
        assert_eq!(connection.send(packet.clone()), Err(SendError::QueueFull));

        drop(queue);
        assert_eq!(connection.send(packet), Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_reader_forwards_packets_and_eof() {
        let (server_side, mut client_side) = socket_pair().await;
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let _connection = Connection::spawn(ConnectionId(5), server_side, events_tx, 8);

        let envelope = ClientPacket::WordComplete.encode().unwrap();
        client_side.write_all(&envelope).await.unwrap();

        let inbound = events_rx.recv().await.unwrap();
        assert_eq!(inbound.connection, ConnectionId(5));
        assert!(matches!(
            inbound.event,
            ConnectionEvent::Packet(ClientPacket::WordComplete)
        ));

        drop(client_side);
        let inbound = events_rx.recv().await.unwrap();
        assert!(matches!(inbound.event, ConnectionEvent::Closed));
    }

    #[tokio::test]
    async fn test_reader_skips_unknown_tags_and_short_reads() {
        let (server_side, mut client_side) = socket_pair().await;
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let _connection = Connection::spawn(ConnectionId(7), server_side, events_tx, 8);

        let mut unknown = [0u8; shared::ENVELOPE_SIZE];
        unknown[0] = 0x7F;
        client_side.write_all(&unknown).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        client_side.write_all(&[1, 2, 3, 4, 5]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let envelope = ClientPacket::WordComplete.encode().unwrap();
        client_side.write_all(&envelope).await.unwrap();

        let inbound = events_rx.recv().await.unwrap();
        assert!(matches!(
            inbound.event,
            ConnectionEvent::Packet(ClientPacket::WordComplete)
        ));
    }

    #[tokio::test]
    async fn test_spawned_connection_knows_its_peer() {
        let (server_side, client_side) = socket_pair().await;
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let connection = Connection::spawn(ConnectionId(8), server_side, events_tx, 8);

        assert_eq!(connection.peer(), Some(client_side.local_addr().unwrap()));
        assert_eq!(Connection::detached(ConnectionId(9), 1).0.peer(), None);
    }

    #[tokio::test]
    async fn test_writer_sends_envelopes_then_closes() {
        let (server_side, mut client_side) = socket_pair().await;
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let connection = Connection::spawn(ConnectionId(6), server_side, events_tx, 8);

        let packet = ServerPacket::PlayerAccept(PlayerInfo {
            id: 1,
            mode: PlayerMode::Spectator,
            score: 0,
        });
        connection.send(packet.clone()).unwrap();
        connection.close(Duration::from_secs(1)).await;

        let mut envelope = [0u8; shared::ENVELOPE_SIZE];
        client_side.read_exact(&mut envelope).await.unwrap();
        assert_eq!(ServerPacket::decode(&envelope).unwrap(), packet);

        let mut rest = Vec::new();
        let size = client_side.read_to_end(&mut rest).await.unwrap();
        assert_eq!(size, 0);
    }
}
