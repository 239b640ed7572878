//! Wire protocol shared by the typing-race server and client.
//!
//! Every message travels as one fixed-size envelope: a one-byte discriminant
//! followed by a payload area sized for the largest variant. Server and client
//! use disjoint discriminant ranges, so a packet decoded with the wrong
//! direction's decoder is rejected instead of being misread.
//!
//! Payload fields are written one by one through `bincode` with fixed-width
//! little-endian integers. Nothing depends on the in-memory layout of the
//! Rust types.

use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod framing;

/// Longest player name carried on the wire, in bytes.
pub const MAX_NAME_LEN: usize = 16;
/// Longest word (or reason text) carried on the wire, in bytes.
pub const MAX_WORD_LEN: usize = 32;

/// Smallest number of words a player may ask to receive per round.
pub const MIN_FANOUT: u32 = 1;
/// Largest number of words a player may ask to receive per round.
pub const MAX_FANOUT: u32 = 10;

pub const PAYLOAD_SIZE: usize = 32;
pub const ENVELOPE_SIZE: usize = 1 + PAYLOAD_SIZE;

pub type Envelope = [u8; ENVELOPE_SIZE];

mod tag {
    // Server -> client
    pub const GAME_STATUS: u8 = 0x01;
    pub const PLAYER_ACCEPT: u8 = 0x02;
    pub const PLAYER_UPDATE: u8 = 0x03;
    pub const PLAYER_REMOVE: u8 = 0x04;
    pub const PLAYER_JOIN: u8 = 0x05;
    pub const NEW_WORD: u8 = 0x06;
    pub const DISCONNECTED: u8 = 0x0A;

    // Client -> server
    pub const PLAYER_INFOS: u8 = 0x07;
    pub const WORD_COMPLETE: u8 = 0x08;
    pub const DISCONNECT: u8 = 0x09;
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown packet discriminant {0:#04x}")]
    UnknownTag(u8),

    #[error("envelope is {actual} bytes, expected {expected}", expected = ENVELOPE_SIZE)]
    WrongSize { actual: usize },

    #[error("invalid value {value} for field `{field}`")]
    InvalidField { field: &'static str, value: u8 },

    #[error("payload of {len} bytes does not fit in {limit}", limit = PAYLOAD_SIZE)]
    Oversized { len: usize },

    #[error("payload encoding error: {0}")]
    Payload(#[from] bincode::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Waiting,
    Running,
}

impl RoundState {
    fn to_wire(self) -> u8 {
        match self {
            RoundState::Waiting => 0x01,
            RoundState::Running => 0x02,
        }
    }

    fn from_wire(value: u8) -> Result<Self, CodecError> {
        match value {
            0x01 => Ok(RoundState::Waiting),
            0x02 => Ok(RoundState::Running),
            value => Err(CodecError::InvalidField {
                field: "state",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerMode {
    Player,
    Spectator,
}

impl PlayerMode {
    fn to_wire(self) -> u8 {
        match self {
            PlayerMode::Player => 0,
            PlayerMode::Spectator => 1,
        }
    }

    fn from_wire(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(PlayerMode::Player),
            1 => Ok(PlayerMode::Spectator),
            value => Err(CodecError::InvalidField {
                field: "mode",
                value,
            }),
        }
    }
}

/// Whether a `PlayerJoin` announces a newcomer or replays the roster to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    New,
    Existing,
}

impl JoinKind {
    fn to_wire(self) -> u8 {
        match self {
            JoinKind::New => 0,
            JoinKind::Existing => 1,
        }
    }

    fn from_wire(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(JoinKind::New),
            1 => Ok(JoinKind::Existing),
            value => Err(CodecError::InvalidField {
                field: "kind",
                value,
            }),
        }
    }
}

/// Public view of one session, as replicated to every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerInfo {
    pub id: u32,
    pub mode: PlayerMode,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    GameStatus {
        state: RoundState,
        seconds_remaining: u32,
    },
    PlayerAccept(PlayerInfo),
    PlayerUpdate(PlayerInfo),
    PlayerRemove {
        id: u32,
    },
    PlayerJoin {
        info: PlayerInfo,
        kind: JoinKind,
        name: String,
    },
    NewWord {
        word: String,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    PlayerInfos { fanout: u32, name: String },
    WordComplete,
    Disconnect { reason: String },
}

#[derive(Serialize, Deserialize)]
struct WireInfo {
    id: u32,
    mode: u8,
    score: u32,
}

impl WireInfo {
    fn from_info(info: &PlayerInfo) -> Self {
        Self {
            id: info.id,
            mode: info.mode.to_wire(),
            score: info.score,
        }
    }

    fn into_info(self) -> Result<PlayerInfo, CodecError> {
        Ok(PlayerInfo {
            id: self.id,
            mode: PlayerMode::from_wire(self.mode)?,
            score: self.score,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct WireStatus {
    state: u8,
    seconds_remaining: u32,
}

#[derive(Serialize, Deserialize)]
struct WireRemove {
    id: u32,
}

#[derive(Serialize, Deserialize)]
struct WireJoin {
    info: WireInfo,
    kind: u8,
    name: [u8; MAX_NAME_LEN],
}

#[derive(Serialize, Deserialize)]
struct WireText {
    text: [u8; MAX_WORD_LEN],
}

#[derive(Serialize, Deserialize)]
struct WireInfos {
    fanout: u32,
    name: [u8; MAX_NAME_LEN],
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .allow_trailing_bytes()
}

fn seal<T: Serialize>(tag: u8, payload: Option<&T>) -> Result<Envelope, CodecError> {
    let mut envelope = [0u8; ENVELOPE_SIZE];
    envelope[0] = tag;
    if let Some(payload) = payload {
        let bytes = options().serialize(payload)?;
        if bytes.len() > PAYLOAD_SIZE {
            return Err(CodecError::Oversized { len: bytes.len() });
        }
        envelope[1..1 + bytes.len()].copy_from_slice(&bytes);
    }
    Ok(envelope)
}

fn open<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> Result<T, CodecError> {
    Ok(options().deserialize(payload)?)
}

fn split(bytes: &[u8]) -> Result<(u8, &[u8]), CodecError> {
    if bytes.len() != ENVELOPE_SIZE {
        return Err(CodecError::WrongSize {
            actual: bytes.len(),
        });
    }
    Ok((bytes[0], &bytes[1..]))
}

/// Cuts `text` to at most `max` bytes without splitting a UTF-8 sequence.
pub fn truncate_text(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn pack_text<const N: usize>(text: &str) -> [u8; N] {
    let text = truncate_text(text, N);
    let mut field = [0u8; N];
    field[..text.len()].copy_from_slice(text.as_bytes());
    field
}

fn unpack_text(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

impl ServerPacket {
    pub fn tag(&self) -> u8 {
        match self {
            ServerPacket::GameStatus { .. } => tag::GAME_STATUS,
            ServerPacket::PlayerAccept(_) => tag::PLAYER_ACCEPT,
            ServerPacket::PlayerUpdate(_) => tag::PLAYER_UPDATE,
            ServerPacket::PlayerRemove { .. } => tag::PLAYER_REMOVE,
            ServerPacket::PlayerJoin { .. } => tag::PLAYER_JOIN,
            ServerPacket::NewWord { .. } => tag::NEW_WORD,
            ServerPacket::Disconnected { .. } => tag::DISCONNECTED,
        }
    }

    pub fn encode(&self) -> Result<Envelope, CodecError> {
        let tag = self.tag();
        match self {
            ServerPacket::GameStatus {
                state,
                seconds_remaining,
            } => seal(
                tag,
                Some(&WireStatus {
                    state: state.to_wire(),
                    seconds_remaining: *seconds_remaining,
                }),
            ),
            ServerPacket::PlayerAccept(info) | ServerPacket::PlayerUpdate(info) => {
                seal(tag, Some(&WireInfo::from_info(info)))
            }
            ServerPacket::PlayerRemove { id } => seal(tag, Some(&WireRemove { id: *id })),
            ServerPacket::PlayerJoin { info, kind, name } => seal(
                tag,
                Some(&WireJoin {
                    info: WireInfo::from_info(info),
                    kind: kind.to_wire(),
                    name: pack_text(name),
                }),
            ),
            ServerPacket::NewWord { word: text } | ServerPacket::Disconnected { reason: text } => {
                seal(
                    tag,
                    Some(&WireText {
                        text: pack_text(text),
                    }),
                )
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (tag, payload) = split(bytes)?;
        match tag {
            tag::GAME_STATUS => {
                let status: WireStatus = open(payload)?;
                Ok(ServerPacket::GameStatus {
                    state: RoundState::from_wire(status.state)?,
                    seconds_remaining: status.seconds_remaining,
                })
            }
            tag::PLAYER_ACCEPT => Ok(ServerPacket::PlayerAccept(
                open::<WireInfo>(payload)?.into_info()?,
            )),
            tag::PLAYER_UPDATE => Ok(ServerPacket::PlayerUpdate(
                open::<WireInfo>(payload)?.into_info()?,
            )),
            tag::PLAYER_REMOVE => {
                let remove: WireRemove = open(payload)?;
                Ok(ServerPacket::PlayerRemove { id: remove.id })
            }
            tag::PLAYER_JOIN => {
                let join: WireJoin = open(payload)?;
                Ok(ServerPacket::PlayerJoin {
                    info: join.info.into_info()?,
                    kind: JoinKind::from_wire(join.kind)?,
                    name: unpack_text(&join.name),
                })
            }
            tag::NEW_WORD => {
                let word: WireText = open(payload)?;
                Ok(ServerPacket::NewWord {
                    word: unpack_text(&word.text),
                })
            }
            tag::DISCONNECTED => {
                let reason: WireText = open(payload)?;
                Ok(ServerPacket::Disconnected {
                    reason: unpack_text(&reason.text),
                })
            }
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

impl ClientPacket {
    pub fn tag(&self) -> u8 {
        match self {
            ClientPacket::PlayerInfos { .. } => tag::PLAYER_INFOS,
            ClientPacket::WordComplete => tag::WORD_COMPLETE,
            ClientPacket::Disconnect { .. } => tag::DISCONNECT,
        }
    }

    pub fn encode(&self) -> Result<Envelope, CodecError> {
        let tag = self.tag();
        match self {
            ClientPacket::PlayerInfos { fanout, name } => seal(
                tag,
                Some(&WireInfos {
                    fanout: *fanout,
                    name: pack_text(name),
                }),
            ),
            ClientPacket::WordComplete => seal::<WireText>(tag, None),
            ClientPacket::Disconnect { reason } => seal(
                tag,
                Some(&WireText {
                    text: pack_text(reason),
                }),
            ),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (tag, payload) = split(bytes)?;
        match tag {
            tag::PLAYER_INFOS => {
                let infos: WireInfos = open(payload)?;
                Ok(ClientPacket::PlayerInfos {
                    fanout: infos.fanout,
                    name: unpack_text(&infos.name),
                })
            }
            tag::WORD_COMPLETE => Ok(ClientPacket::WordComplete),
            tag::DISCONNECT => {
                let reason: WireText = open(payload)?;
                Ok(ClientPacket::Disconnect {
                    reason: unpack_text(&reason.text),
                })
            }
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}
