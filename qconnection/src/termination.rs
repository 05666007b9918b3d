//! What a connection becomes once it starts closing (spec §4.5): no more
//! frame processing, just a rate-limited CONNECTION_CLOSE echo until the
//! peer gives up or the draining timeout fires.

use std::{
    mem,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use qbase::{cid::ConnectionId, error::Error, frame::ConnectionCloseFrame};
use tokio::time::Instant;

/// Rate-limits how often the closing state re-sends its CONNECTION_CLOSE:
/// once every three received packets, or once a second, whichever comes
/// first (an endpoint MAY limit the rate at which it generates packets in
/// the closing state, RFC 9000 §10.2.1).
///
/// Holds just enough to rebuild the CCF packet: the peer's last-known CIDs
/// and the close frame itself. Dropped once the connection is fully torn down.
pub struct Terminator {
    last_sent: Mutex<Instant>,
    rcvd_since_last_sent: AtomicUsize,
    scid: Option<ConnectionId>,
    dcid: Option<ConnectionId>,
    ccf: ConnectionCloseFrame,
}

impl Terminator {
    pub fn new(ccf: ConnectionCloseFrame, scid: Option<ConnectionId>, dcid: Option<ConnectionId>) -> Self {
        Self {
            last_sent: Mutex::new(Instant::now()),
            rcvd_since_last_sent: AtomicUsize::new(0),
            scid,
            dcid,
            ccf,
        }
    }

    pub fn ccf(&self) -> &ConnectionCloseFrame {
        &self.ccf
    }

    pub fn scid(&self) -> Option<ConnectionId> {
        self.scid
    }

    pub fn dcid(&self) -> Option<ConnectionId> {
        self.dcid
    }

    /// Call once per received packet while closing; returns whether this
    /// arrival should trigger re-sending the CONNECTION_CLOSE.
    pub fn on_packet_rcvd(&self) -> bool {
        let mut last_sent = self.last_sent.lock().unwrap();
        let count = self.rcvd_since_last_sent.fetch_add(1, Ordering::AcqRel) + 1;

        if count >= 3 || last_sent.elapsed() > Duration::from_secs(1) {
            *last_sent = Instant::now();
            self.rcvd_since_last_sent.store(0, Ordering::Release);
            true
        } else {
            false
        }
    }
}

/// What's left of a connection after it starts tearing down.
#[derive(Clone)]
enum State {
    /// Still willing to retransmit CONNECTION_CLOSE in response to incoming packets.
    Closing,
    /// Discarding everything; only waiting out the draining timeout.
    Draining,
}

/// The terminal half of a connection's lifecycle: holds onto the error that
/// caused it and nothing else, since by this point frames are no longer
/// processed and streams are no longer readable or writable.
#[derive(Clone)]
pub struct Termination {
    error: Error,
    state: State,
}

impl Termination {
    pub fn closing(error: Error) -> Self {
        Self {
            error,
            state: State::Closing,
        }
    }

    pub fn draining(error: Error) -> Self {
        Self {
            error,
            state: State::Draining,
        }
    }

    pub fn error(&self) -> Error {
        self.error.clone()
    }

    pub fn is_draining(&self) -> bool {
        matches!(self.state, State::Draining)
    }

    /// Stop retransmitting CONNECTION_CLOSE and just wait out the draining period.
    pub fn enter_draining(&mut self) {
        let _ = mem::replace(&mut self.state, State::Draining);
    }
}

#[cfg(test)]
mod tests {
    use std::{thread::sleep, time::Duration};

    use qbase::error::{ErrorKind, QuicError};

    use super::*;

    fn terminator() -> Terminator {
        Terminator::new(
            ConnectionCloseFrame::quic(ErrorKind::NoError, None, "bye"),
            Some(ConnectionId::from_slice(b"scid")),
            Some(ConnectionId::from_slice(b"dcid")),
        )
    }

    #[test]
    fn resends_on_the_third_received_packet() {
        let term = terminator();
        assert!(!term.on_packet_rcvd());
        assert!(!term.on_packet_rcvd());
        assert!(term.on_packet_rcvd());
    }

    #[test]
    fn resends_after_a_second_regardless_of_count() {
        let term = terminator();
        assert!(!term.on_packet_rcvd());
        sleep(Duration::from_millis(1100));
        assert!(term.on_packet_rcvd());
    }

    #[test]
    fn draining_discards_the_closing_state() {
        let mut termination = Termination::closing(Error::Quic(QuicError::with_default_fty(
            ErrorKind::NoError,
            "done",
        )));
        assert!(!termination.is_draining());
        termination.enter_draining();
        assert!(termination.is_draining());
    }
}
