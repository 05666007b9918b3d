//! Connection-ID lifecycle: issuing local CIDs, tracking the peer's, and
//! scheduling replacements for retired ones (spec §4.5).

use qbase::{
    cid::{ConnectionId, LocalCidSet, RemoteCidSet},
    error::QuicError,
    frame::{NewConnectionIdFrame, RetireConnectionIdFrame},
    varint::VarInt,
};
use rand::RngCore;

/// Both halves of a connection's CID bookkeeping, plus the outgoing work a
/// peer's `RETIRE_CONNECTION_ID` or `NEW_CONNECTION_ID` generates.
///
/// Per the retire-CID timing decision (SPEC_FULL.md §4.3a), a local CID the
/// peer has retired doesn't wait for the next ACK to be replaced: `on_retire`
/// immediately queues a fresh `NEW_CONNECTION_ID`, to be picked up by
/// whichever PN space next assembles an outgoing packet.
#[derive(Debug)]
pub struct CidRegistry {
    pub local: LocalCidSet,
    pub remote: RemoteCidSet,
    cid_len: usize,
    pending_new: Vec<NewConnectionIdFrame>,
    pending_retire: Vec<RetireConnectionIdFrame>,
}

impl CidRegistry {
    pub fn new(local_limit: usize, remote_active_limit: usize, cid_len: usize) -> Self {
        Self {
            local: LocalCidSet::new(local_limit),
            remote: RemoteCidSet::new(remote_active_limit),
            cid_len,
            pending_new: Vec::new(),
            pending_retire: Vec::new(),
        }
    }

    /// Issue an initial locally-chosen CID, e.g. the connection's `scid`.
    pub fn issue_initial(&mut self, cid: ConnectionId, reset_token: [u8; 16]) {
        if let Some(issued) = self.local.issue(cid, reset_token) {
            self.pending_new.push(NewConnectionIdFrame {
                sequence: VarInt::from_u64(issued.sequence).expect("sequence fits in a varint"),
                retire_prior_to: VarInt::from_u64(0).expect("zero fits in a varint"),
                cid: issued.cid,
                reset_token: issued.reset_token,
            });
        }
    }

    /// Top up the local CID set up to its room, generating fresh random CIDs.
    pub fn replenish(&mut self) {
        while self.local.room() > 0 {
            let cid = ConnectionId::random(self.cid_len);
            let mut reset_token = [0u8; 16];
            rand::rng().fill_bytes(&mut reset_token);
            if let Some(issued) = self.local.issue(cid, reset_token) {
                self.pending_new.push(NewConnectionIdFrame {
                    sequence: VarInt::from_u64(issued.sequence).expect("sequence fits in a varint"),
                    retire_prior_to: VarInt::from_u64(0).expect("zero fits in a varint"),
                    cid: issued.cid,
                    reset_token: issued.reset_token,
                });
            } else {
                break;
            }
        }
    }

    /// Handle an incoming `RETIRE_CONNECTION_ID`: frees the slot and
    /// immediately schedules a replacement.
    pub fn on_retire_connection_id(&mut self, frame: &RetireConnectionIdFrame) {
        self.local.on_retired(frame.sequence.into_inner());
        self.replenish();
    }

    /// Handle an incoming `NEW_CONNECTION_ID`, queuing `RETIRE_CONNECTION_ID`
    /// for any sequence numbers the new `retire_prior_to` watermark obsoletes.
    pub fn on_new_connection_id(&mut self, frame: &NewConnectionIdFrame) -> Result<(), QuicError> {
        let to_retire = self.remote.on_new_cid(
            frame.sequence.into_inner(),
            frame.retire_prior_to.into_inner(),
            frame.cid,
            frame.reset_token,
        )?;
        for sequence in to_retire {
            self.remote.mark_retired(sequence);
            self.pending_retire.push(RetireConnectionIdFrame {
                sequence: VarInt::from_u64(sequence).expect("sequence fits in a varint"),
            });
        }
        Ok(())
    }

    pub fn poll_new_connection_id(&mut self) -> impl Iterator<Item = NewConnectionIdFrame> + '_ {
        self.pending_new.drain(..)
    }

    pub fn poll_retire_connection_id(&mut self) -> impl Iterator<Item = RetireConnectionIdFrame> + '_ {
        self.pending_retire.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retiring_a_local_cid_immediately_queues_a_replacement() {
        let mut registry = CidRegistry::new(2, 2, 8);
        registry.issue_initial(ConnectionId::from_slice(b"initial!"), [0; 16]);
        registry.replenish();
        assert_eq!(registry.poll_new_connection_id().count(), 2);

        registry.on_retire_connection_id(&RetireConnectionIdFrame {
            sequence: VarInt::from_u64(0).unwrap(),
        });
        assert_eq!(registry.poll_new_connection_id().count(), 1);
    }
}
