use std::future::Future;
use std::io;
use std::time::Duration;

use log::{debug, error, info, warn};
use shared::framing::{read_envelope, write_envelope, ReadOutcome};
use shared::{ClientPacket, CodecError, ServerPacket};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::interval;

use crate::game::ClientGame;

pub const DISCONNECT_REASON: &str = "Client disconnect";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connection lost: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("server closed the connection")]
    ServerClosed,
}

pub struct Client<S> {
    stream: S,
    game: ClientGame,
    fanout: u32,
}

impl Client<TcpStream> {
    /// Connects and identifies in one go.
    pub async fn connect(addr: &str, name: &str, fanout: u32) -> Result<Self, ClientError> {
        info!("Connecting to {}...", addr);
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;

        let mut client = Client::new(stream, name, fanout);
        client.identify().await?;
        Ok(client)
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, name: &str, fanout: u32) -> Self {
        Self {
            stream,
            game: ClientGame::new(name),
            fanout,
        }
    }

    pub fn game(&self) -> &ClientGame {
        &self.game
    }

    pub async fn identify(&mut self) -> Result<(), ClientError> {
        let packet = ClientPacket::PlayerInfos {
            fanout: self.fanout,
            name: self.game.name.clone(),
        };
        self.send(packet).await
    }

    async fn send(&mut self, packet: ClientPacket) -> Result<(), ClientError> {
        let envelope = packet.encode()?;
        write_envelope(&mut self.stream, &envelope).await?;
        Ok(())
    }

    /// Plays until the input ends, `shutdown` resolves or the server goes away.
    ///
    /// Server packets are handled before input lines so a typed word is
    /// checked against every word already received.
    pub async fn run<I, F>(&mut self, input: I, shutdown: F) -> Result<(), ClientError>
    where
        I: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let mut lines = input.lines();
        let mut countdown = interval(Duration::from_secs(1));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Interrupted, leaving the game");
                    return self.leave().await;
                },

                outcome = read_envelope(&mut self.stream) => {
                    match outcome? {
                        ReadOutcome::Frame(envelope) => match ServerPacket::decode(&envelope) {
                            Ok(packet) => self.handle_packet(packet),
                            Err(e) => warn!("Ignoring packet: {}", e),
                        },
                        ReadOutcome::Short(size) => warn!("Invalid packet size ({})", size),
                        ReadOutcome::Closed => {
                            return match self.game.disconnect_reason {
                                Some(_) => Ok(()),
                                None => Err(ClientError::ServerClosed),
                            };
                        }
                    }
                },

                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            if self.game.submit(&line) {
                                self.send(ClientPacket::WordComplete).await?;
                                if let Some(next) = self.game.current_word() {
                                    println!("Type: {}", next);
                                }
                            } else {
                                debug!("'{}' does not match the current word", line.trim());
                            }
                        }
                        None => return self.leave().await,
                    }
                },

                _ = countdown.tick() => {
                    self.game.tick_second();
                },
            }
        }
    }

    fn handle_packet(&mut self, packet: ServerPacket) {
        if let Some(line) = self.game.apply(packet) {
            println!("{}", line);
        }
    }

    async fn leave(&mut self) -> Result<(), ClientError> {
        if self.game.disconnect_reason.is_some() {
            return Ok(());
        }
        let packet = ClientPacket::Disconnect {
            reason: DISCONNECT_REASON.to_string(),
        };
        if let Err(e) = self.send(packet).await {
            error!("Failed to say goodbye: {}", e);
        }
        Ok(())
    }
}
