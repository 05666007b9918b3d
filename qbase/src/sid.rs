//! Stream IDs: the initiator/directionality encoding from
//! [section-2.1](https://www.rfc-editor.org/rfc/rfc9000.html#section-2.1).

use crate::varint::VarInt;

/// Which endpoint initiated the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn is_initiator_of(self, id: StreamId) -> bool {
        id.initiator() == self
    }

    pub fn opposite(self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

/// Whether a stream carries data in both directions or only from initiator to peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dir {
    Bidi,
    Uni,
}

/// A QUIC stream ID, decomposed into initiator role, directionality, and sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    pub fn new(role: Role, dir: Dir, sequence: u64) -> Self {
        let mut id = sequence << 2;
        if role == Role::Server {
            id |= 0b01;
        }
        if dir == Dir::Uni {
            id |= 0b10;
        }
        Self(id)
    }

    pub fn initiator(self) -> Role {
        if self.0 & 0b01 == 0 {
            Role::Client
        } else {
            Role::Server
        }
    }

    pub fn dir(self) -> Dir {
        if self.0 & 0b10 == 0 {
            Dir::Bidi
        } else {
            Dir::Uni
        }
    }

    pub fn sequence(self) -> u64 {
        self.0 >> 2
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl From<VarInt> for StreamId {
    fn from(value: VarInt) -> Self {
        Self(value.into_inner())
    }
}

impl From<StreamId> for VarInt {
    fn from(value: StreamId) -> Self {
        VarInt::try_from(value.0).expect("stream ids fit in a varint")
    }
}

/// Enforces the peer-advertised maximum stream count per (role, dir) pair and
/// hands out the next locally-initiated stream ID.
#[derive(Debug)]
pub struct StreamIdLimits {
    role: Role,
    max_bidi_remote: u64,
    max_uni_remote: u64,
    next_bidi_local: u64,
    next_uni_local: u64,
}

impl StreamIdLimits {
    pub fn new(role: Role, max_bidi_remote: u64, max_uni_remote: u64) -> Self {
        Self {
            role,
            max_bidi_remote,
            max_uni_remote,
            next_bidi_local: 0,
            next_uni_local: 0,
        }
    }

    /// Check whether a stream ID observed on the wire (from the peer) exceeds
    /// the maximum this endpoint has permitted. Returns `Err` on violation,
    /// per spec §3 ("stream ID... exceeds the peer's permitted maximum").
    pub fn validate_remote(&self, id: StreamId) -> Result<(), crate::error::QuicError> {
        if id.initiator() == self.role {
            // Peer referenced a stream only we may initiate: treated as a
            // state error by the frame dispatcher, not a limit violation.
            return Ok(());
        }
        let limit = match id.dir() {
            Dir::Bidi => self.max_bidi_remote,
            Dir::Uni => self.max_uni_remote,
        };
        if id.sequence() >= limit {
            return Err(crate::error::QuicError::with_default_fty(
                crate::error::ErrorKind::ProtocolViolation,
                format!("stream {id:?} exceeds the permitted maximum {limit}"),
            ));
        }
        Ok(())
    }

    pub fn update_max_bidi_remote(&mut self, max: u64) {
        self.max_bidi_remote = self.max_bidi_remote.max(max);
    }

    pub fn update_max_uni_remote(&mut self, max: u64) {
        self.max_uni_remote = self.max_uni_remote.max(max);
    }

    pub fn next_local(&mut self, dir: Dir) -> StreamId {
        let seq = match dir {
            Dir::Bidi => {
                let seq = self.next_bidi_local;
                self.next_bidi_local += 1;
                seq
            }
            Dir::Uni => {
                let seq = self.next_uni_local;
                self.next_uni_local += 1;
                seq
            }
        };
        StreamId::new(self.role, dir, seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposition() {
        let id = StreamId::new(Role::Client, Dir::Bidi, 0);
        assert_eq!(id.into_inner(), 0);
        let id = StreamId::new(Role::Server, Dir::Uni, 5);
        assert_eq!(id.initiator(), Role::Server);
        assert_eq!(id.dir(), Dir::Uni);
        assert_eq!(id.sequence(), 5);
    }

    #[test]
    fn limit_enforced_only_on_peer_streams() {
        let limits = StreamIdLimits::new(Role::Server, 2, 0);
        let ok = StreamId::new(Role::Client, Dir::Bidi, 1);
        assert!(limits.validate_remote(ok).is_ok());
        let too_far = StreamId::new(Role::Client, Dir::Bidi, 2);
        assert!(limits.validate_remote(too_far).is_err());
    }
}
