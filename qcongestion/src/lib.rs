//! Connection-wide RTT estimation, loss detection, PTO arming and New-Reno
//! congestion control for a QUIC transport, see spec §4.4.
//!
//! [`Congestion`] is the per-connection entry point: it owns one
//! [`recovery::SpaceRecovery`] per packet-number [`qbase::Epoch`], plus the
//! shared [`rtt::RttEstimator`] and [`congestion::NewReno`] every space's
//! acks feed into (RFC 9002 keeps RTT and cwnd connection-wide, not
//! per-space). [`status`] holds the lock-free handshake/path flags the rest
//! of the connection needs to read without locking this struct.

pub mod congestion;
pub mod recovery;
pub mod rtt;
pub mod status;

use std::time::Duration;

use qbase::{Epoch, error::QuicError, frame::AckFrame};
use tokio::time::Instant;

pub use congestion::NewReno;
pub use recovery::{AckOutcome, SpaceRecovery};
pub use rtt::RttEstimator;
pub use status::{HandshakeStatus, PathStatus};

/// Tracks whether ECN remains usable on a path: counts reported by peer ACKs
/// must never regress and must stay consistent with what we actually sent
/// with ECT markings. On any inconsistency, ECN is disabled for the path's
/// remaining lifetime (spec §4.4).
#[derive(Debug, Default)]
struct EcnState {
    enabled: bool,
    ect0_sent: u64,
    max_acked_ect0: u64,
    max_acked_ect1: u64,
    max_acked_ce: u64,
}

impl EcnState {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    fn on_packet_sent(&mut self) {
        if self.enabled {
            self.ect0_sent += 1;
        }
    }

    /// Validate newly reported ECN counts against what we've sent so far.
    /// Disables ECN permanently if the peer reports more marked packets
    /// than we ever sent with that marking, or lets a counter go backwards.
    fn verify(&mut self, ect0: u64, ect1: u64, ce: u64) {
        if !self.enabled {
            return;
        }
        let consistent = ect0 >= self.max_acked_ect0
            && ect1 >= self.max_acked_ect1
            && ce >= self.max_acked_ce
            && ect0 + ce <= self.ect0_sent;
        if !consistent {
            self.enabled = false;
            return;
        }
        self.max_acked_ect0 = ect0;
        self.max_acked_ect1 = ect1;
        self.max_acked_ce = ce;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Per-connection loss detection and congestion state: one [`SpaceRecovery`]
/// per packet-number space sharing a single RTT estimate and congestion window.
#[derive(Debug)]
pub struct Congestion {
    spaces: [SpaceRecovery; Epoch::COUNT],
    rtt: RttEstimator,
    cc: NewReno,
    ecn: EcnState,
    ack_delay_exponent: u8,
    max_ack_delay: Duration,
}

impl Congestion {
    pub fn new(max_datagram_size: u64, ack_delay_exponent: u8, max_ack_delay: Duration, ecn_capable: bool) -> Self {
        Self {
            spaces: Default::default(),
            rtt: RttEstimator::default(),
            cc: NewReno::new(max_datagram_size),
            ecn: EcnState::new(ecn_capable),
            ack_delay_exponent,
            max_ack_delay,
        }
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    pub fn cwnd(&self) -> u64 {
        self.cc.cwnd()
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.cc.bytes_in_flight()
    }

    pub fn is_congestion_limited(&self) -> bool {
        self.cc.is_congestion_limited()
    }

    pub fn ecn_enabled(&self) -> bool {
        self.ecn.is_enabled()
    }

    /// Record a freshly sent packet in `epoch`'s space, returning its
    /// assigned packet number.
    pub fn on_packet_sent(&mut self, epoch: Epoch, size: u64, ack_eliciting: bool, in_flight: bool, ect0_marked: bool, now: Instant) -> u64 {
        if in_flight {
            self.cc.on_packet_sent(size);
        }
        if ect0_marked {
            self.ecn.on_packet_sent();
        }
        self.spaces[epoch.index()].on_packet_sent(size, ack_eliciting, in_flight, now)
    }

    /// Process an ACK frame received in `epoch`'s space.
    pub fn on_ack(&mut self, epoch: Epoch, frame: &AckFrame, now: Instant, handshake_confirmed: bool) -> Result<AckOutcome, QuicError> {
        if let Some(ecn) = &frame.ecn {
            self.ecn.verify(ecn.ect0.into_inner(), ecn.ect1.into_inner(), ecn.ce.into_inner());
        }
        let outcome = self.spaces[epoch.index()].process_ack(
            frame,
            now,
            self.ack_delay_exponent,
            self.max_ack_delay,
            handshake_confirmed,
            &mut self.rtt,
            &mut self.cc,
        )?;
        self.spaces[epoch.index()].maybe_persistent_congestion(&self.rtt, self.max_ack_delay, &mut self.cc);
        Ok(outcome)
    }

    /// The earliest instant a probe timeout should fire across every space
    /// with outstanding ack-eliciting data, and which space it belongs to.
    pub fn next_pto(&self) -> Option<(Epoch, Instant)> {
        Epoch::VALUES
            .into_iter()
            .filter_map(|e| self.spaces[e.index()].pto_deadline(&self.rtt, self.max_ack_delay).map(|t| (e, t)))
            .min_by_key(|(_, t)| *t)
    }

    pub fn on_pto_expired(&mut self, epoch: Epoch) {
        self.spaces[epoch.index()].on_pto_expired();
    }

    pub fn space(&self, epoch: Epoch) -> &SpaceRecovery {
        &self.spaces[epoch.index()]
    }

    /// The earliest loss-detection timer across every space, if any space
    /// has an unacked in-flight packet whose time threshold hasn't elapsed yet.
    pub fn next_loss_timer(&self) -> Option<(Epoch, Instant)> {
        Epoch::VALUES
            .into_iter()
            .filter_map(|e| self.spaces[e.index()].loss_timer().map(|t| (e, t)))
            .min_by_key(|(_, t)| *t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inconsistent_ecn_report_disables_ecn() {
        let mut ecn = EcnState::new(true);
        ecn.on_packet_sent();
        // Peer claims more ECT0-marked packets arrived than we ever sent.
        ecn.verify(5, 0, 0);
        assert!(!ecn.is_enabled());
    }

    #[test]
    fn consistent_ecn_counts_keep_ecn_enabled() {
        let mut ecn = EcnState::new(true);
        ecn.on_packet_sent();
        ecn.on_packet_sent();
        ecn.verify(1, 0, 0);
        assert!(ecn.is_enabled());
        ecn.verify(2, 0, 0);
        assert!(ecn.is_enabled());
    }
}
