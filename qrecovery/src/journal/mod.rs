//! Per-packet-number-space bookkeeping: what we've sent (and whether it was
//! acked or lost) and what we've received (to synthesize ACK frames from).

mod rcvd;
mod sent;

pub use rcvd::ArcRcvdJournal;
pub use sent::{ArcSentJournal, NewPacketGuard, SentRotateGuard};

/// The journal for one packet-number space, bundling the sent- and
/// received-side bookkeeping that space needs.
#[derive(Debug, Clone)]
pub struct Journal<T> {
    sent: ArcSentJournal<T>,
    rcvd: ArcRcvdJournal,
}

impl<T> Journal<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sent: ArcSentJournal::with_capacity(capacity),
            rcvd: ArcRcvdJournal::new(),
        }
    }

    pub fn sent(&self) -> &ArcSentJournal<T> {
        &self.sent
    }

    pub fn rcvd(&self) -> &ArcRcvdJournal {
        &self.rcvd
    }
}

impl<T> Default for Journal<T> {
    fn default() -> Self {
        Self::with_capacity(16)
    }
}
