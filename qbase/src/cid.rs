//! Connection IDs and the issued/retired bookkeeping each endpoint keeps for them.
//!
//! See [section-5.1](https://www.rfc-editor.org/rfc/rfc9000.html#section-5.1)
//! of [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html).

use std::fmt;

/// An opaque connection identifier, at most 20 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    len: u8,
    bytes: [u8; 20],
}

impl ConnectionId {
    pub fn from_slice(bytes: &[u8]) -> Self {
        assert!(bytes.len() <= 20, "connection ids are at most 20 bytes");
        let mut buf = [0u8; 20];
        buf[..bytes.len()].copy_from_slice(bytes);
        Self {
            len: bytes.len() as u8,
            bytes: buf,
        }
    }

    pub fn random(len: usize) -> Self {
        use rand::RngCore;
        let mut buf = [0u8; 20];
        rand::rng().fill_bytes(&mut buf[..len]);
        Self {
            len: len as u8,
            bytes: buf,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cid:")?;
        for byte in self.as_slice() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A `NEW_CONNECTION_ID`-issued identifier: sequence number, the id itself,
/// and the stateless-reset token the peer can use if it finds no matching
/// connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedCid {
    pub sequence: u64,
    pub cid: ConnectionId,
    pub reset_token: [u8; 16],
}

/// The set of source CIDs this endpoint has issued to the peer, indexed by
/// sequence number, with a retire-prior-to watermark.
#[derive(Debug, Default)]
pub struct LocalCidSet {
    issued: Vec<IssuedCid>,
    retire_prior_to: u64,
    next_sequence: u64,
    limit: usize,
}

impl LocalCidSet {
    pub fn new(limit: usize) -> Self {
        Self {
            issued: Vec::new(),
            retire_prior_to: 0,
            next_sequence: 0,
            limit,
        }
    }

    pub fn initial_scid(&self) -> Option<ConnectionId> {
        self.issued.first().map(|i| i.cid)
    }

    /// Issue a brand-new CID if the peer's `active_connection_id_limit` leaves room.
    pub fn issue(&mut self, cid: ConnectionId, reset_token: [u8; 16]) -> Option<IssuedCid> {
        let active = self.issued.len();
        if active >= self.limit {
            return None;
        }
        let issued = IssuedCid {
            sequence: self.next_sequence,
            cid,
            reset_token,
        };
        self.next_sequence += 1;
        self.issued.push(issued);
        Some(issued)
    }

    /// Record a RETIRE_CONNECTION_ID received from the peer, freeing a slot.
    pub fn on_retired(&mut self, sequence: u64) {
        self.issued.retain(|i| i.sequence != sequence);
    }

    pub fn active_count(&self) -> usize {
        self.issued.len()
    }

    pub fn room(&self) -> usize {
        self.limit.saturating_sub(self.issued.len())
    }
}

/// The set of destination CIDs the peer has issued to this endpoint.
#[derive(Debug, Default)]
pub struct RemoteCidSet {
    available: Vec<IssuedCid>,
    retired: Vec<u64>,
    retire_prior_to: u64,
    active_limit: usize,
}

impl RemoteCidSet {
    pub fn new(active_limit: usize) -> Self {
        Self {
            available: Vec::new(),
            retired: Vec::new(),
            retire_prior_to: 0,
            active_limit,
        }
    }

    pub fn latest_dcid(&self) -> Option<ConnectionId> {
        self.available.last().map(|i| i.cid)
    }

    /// Handle a `NEW_CONNECTION_ID` frame. Returns the sequence numbers that
    /// must now be retired (because `retire_prior_to` advanced), or an error
    /// if honoring it would exceed `active_connection_id_limit`.
    pub fn on_new_cid(
        &mut self,
        sequence: u64,
        retire_prior_to: u64,
        cid: ConnectionId,
        reset_token: [u8; 16],
    ) -> Result<Vec<u64>, crate::error::QuicError> {
        self.retire_prior_to = self.retire_prior_to.max(retire_prior_to);
        if !self.available.iter().any(|i| i.sequence == sequence) {
            self.available.push(IssuedCid {
                sequence,
                cid,
                reset_token,
            });
        }
        let to_retire: Vec<u64> = self
            .available
            .iter()
            .filter(|i| i.sequence < self.retire_prior_to)
            .map(|i| i.sequence)
            .collect();
        self.available.retain(|i| i.sequence >= self.retire_prior_to);

        if self.available.len() > self.active_limit {
            return Err(crate::error::QuicError::with_default_fty(
                crate::error::ErrorKind::ConnectionIdLimit,
                "peer issued more active connection ids than the negotiated limit",
            ));
        }
        Ok(to_retire)
    }

    /// Record that `sequence` has been retired locally (we sent RETIRE_CONNECTION_ID).
    pub fn mark_retired(&mut self, sequence: u64) {
        self.available.retain(|i| i.sequence != sequence);
        self.retired.push(sequence);
    }

    pub fn room_for_more(&self) -> bool {
        self.available.len() < self.active_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_set_enforces_limit() {
        let mut set = LocalCidSet::new(2);
        assert!(set.issue(ConnectionId::from_slice(b"aaaa"), [0; 16]).is_some());
        assert!(set.issue(ConnectionId::from_slice(b"bbbb"), [0; 16]).is_some());
        assert!(set.issue(ConnectionId::from_slice(b"cccc"), [0; 16]).is_none());
        set.on_retired(0);
        assert!(set.issue(ConnectionId::from_slice(b"cccc"), [0; 16]).is_some());
    }

    #[test]
    fn remote_set_retires_on_retire_prior_to() {
        let mut set = RemoteCidSet::new(4);
        set.on_new_cid(0, 0, ConnectionId::from_slice(b"a"), [0; 16]).unwrap();
        set.on_new_cid(1, 0, ConnectionId::from_slice(b"b"), [0; 16]).unwrap();
        let retired = set.on_new_cid(2, 2, ConnectionId::from_slice(b"c"), [0; 16]).unwrap();
        assert_eq!(retired, vec![0, 1]);
        assert_eq!(set.available.len(), 1);
    }

    #[test]
    fn remote_set_rejects_over_limit() {
        let mut set = RemoteCidSet::new(1);
        set.on_new_cid(0, 0, ConnectionId::from_slice(b"a"), [0; 16]).unwrap();
        assert!(set.on_new_cid(1, 0, ConnectionId::from_slice(b"b"), [0; 16]).is_err());
    }
}
