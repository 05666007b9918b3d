//! Decoded packet headers.
//!
//! Header protection and AEAD removal happen in an external collaborator;
//! by the time a [`Header`] reaches this crate it is already a plain
//! descriptor of which epoch and connection IDs a packet belongs to.

use crate::cid::ConnectionId;

/// Long-header packet types, see
/// [section-17.2](https://www.rfc-editor.org/rfc/rfc9000.html#section-17.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LongHeaderType {
    Initial,
    ZeroRtt,
    Handshake,
    Retry,
}

/// Which of the three packet-number spaces (or the exempt Retry) a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Long(LongHeaderType),
    Short,
}

impl Type {
    /// Whether frames of this type count as ACK-eliciting/retransmittable candidates
    /// for the PN space the packet belongs to.
    pub const fn epoch(self) -> Option<crate::Epoch> {
        match self {
            Type::Long(LongHeaderType::Initial) => Some(crate::Epoch::Initial),
            Type::Long(LongHeaderType::Handshake) => Some(crate::Epoch::Handshake),
            Type::Long(LongHeaderType::ZeroRtt) | Type::Short => Some(crate::Epoch::Data),
            Type::Long(LongHeaderType::Retry) => None,
        }
    }
}

/// A decoded packet header: the minimum information the frame codec and
/// connection state machine need, independent of wire encoding details
/// (which live with the external header-protection collaborator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub ty: Type,
    pub dcid: ConnectionId,
    pub scid: Option<ConnectionId>,
    /// Present on Initial packets only.
    pub token: Option<bytes::Bytes>,
}

impl Header {
    pub fn long(ty: LongHeaderType, dcid: ConnectionId, scid: ConnectionId) -> Self {
        Self {
            ty: Type::Long(ty),
            dcid,
            scid: Some(scid),
            token: None,
        }
    }

    pub fn short(dcid: ConnectionId) -> Self {
        Self {
            ty: Type::Short,
            dcid,
            scid: None,
            token: None,
        }
    }

    pub fn with_token(mut self, token: bytes::Bytes) -> Self {
        self.token = Some(token);
        self
    }
}
