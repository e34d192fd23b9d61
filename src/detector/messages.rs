use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn new(name: String) -> Self {
        Self(name)
    }

    pub fn generate(addr: SocketAddr) -> Self {
        Self(format!("flux-{}", addr))
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Peer identity as seen by the detector. Supplied by the membership collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub addr: SocketAddr,
}

impl Member {
    pub fn new(id: MemberId, addr: SocketAddr) -> Self {
        Self { id, addr }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ping,
    PingReq,
    Ack,
}

impl MessageKind {
    pub const ALL: [MessageKind; 3] = [MessageKind::Ping, MessageKind::PingReq, MessageKind::Ack];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeMessage {
    Ping {
        seq: u64,
        host: Member,
    },

    PingReq {
        seq: u64,
        host: Member,
        destination: Member,
    },

    /// `host` is left empty when a relay forwards the result of a probe it ran on someone's behalf.
    Ack {
        seq: u64,
        host: Option<Member>,
    },
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message size {size} exceeds max UDP packet size {max}")]
    TooLarge { size: usize, max: usize },

    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),
}

pub const MAX_UDP_PACKET_SIZE: usize = 1400;

impl ProbeMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ProbeMessage::Ping { .. } => MessageKind::Ping,
            ProbeMessage::PingReq { .. } => MessageKind::PingReq,
            ProbeMessage::Ack { .. } => MessageKind::Ack,
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            ProbeMessage::Ping { seq, .. }
            | ProbeMessage::PingReq { seq, .. }
            | ProbeMessage::Ack { seq, .. } => *seq,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let bytes = bincode::serialize(self)?;
        if bytes.len() > MAX_UDP_PACKET_SIZE {
            return Err(CodecError::TooLarge {
                size: bytes.len(),
                max: MAX_UDP_PACKET_SIZE,
            });
        }
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let message = bincode::deserialize(bytes)?;
        Ok(message)
    }
}

/// A decoded message together with the address it arrived from.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub message: ProbeMessage,
    pub from: SocketAddr,
}
