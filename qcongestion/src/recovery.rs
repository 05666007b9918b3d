//! Per-packet-number-space sent-packet bookkeeping, loss detection and PTO
//! arming, see spec §4.4.

use std::time::Duration;

use qbase::{
    error::{ErrorKind, QuicError},
    frame::AckFrame,
    util::IndexDeque,
    varint::VARINT_MAX,
};
use tokio::time::Instant;

use crate::{congestion::NewReno, rtt::RttEstimator};

/// How many packet numbers back from the largest acked a packet can be
/// before it's declared lost outright (spec §4.4, `kPacketThreshold`).
const PACKET_THRESHOLD: u64 = 3;

/// How many loss-window multiples of packets must all be lost before
/// persistent congestion is declared (spec §4.4).
const PERSISTENT_CONGESTION_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy)]
struct SentPacket {
    size: u64,
    sent_time: Instant,
    ack_eliciting: bool,
    in_flight: bool,
    acked: bool,
    lost: bool,
}

/// Outcome of processing one incoming ACK frame: which packet numbers were
/// newly acknowledged (for the caller to retrieve and retire their frames)
/// and which were newly declared lost (to retransmit).
#[derive(Debug, Default)]
pub struct AckOutcome {
    pub newly_acked: Vec<u64>,
    pub newly_lost: Vec<u64>,
}

/// Sent-packet tracking and loss detection for one packet-number space.
/// RTT and congestion state are connection-wide and passed in by reference
/// rather than owned here, since every space's ACKs feed the same estimator.
#[derive(Debug, Default)]
pub struct SpaceRecovery {
    sent: IndexDeque<SentPacket, VARINT_MAX>,
    largest_acked: Option<u64>,
    /// Earliest time at which an in-flight packet will become lost by the
    /// time threshold alone, used to arm a loss-detection timer.
    loss_time: Option<Instant>,
    pto_count: u32,
}

impl SpaceRecovery {
    /// Record a freshly sent packet. Callers must call this once per packet,
    /// in packet-number order, exactly mirroring the order packet numbers are
    /// allocated from the companion frame journal.
    pub fn on_packet_sent(&mut self, size: u64, ack_eliciting: bool, in_flight: bool, now: Instant) -> u64 {
        self.sent
            .push_back(SentPacket {
                size,
                sent_time: now,
                ack_eliciting,
                in_flight,
                acked: false,
                lost: false,
            })
            .expect("packet number space exhausted")
    }

    pub fn has_in_flight_ack_eliciting(&self) -> bool {
        self.sent.enumerate().any(|(_, p)| p.in_flight && p.ack_eliciting && !p.acked && !p.lost)
    }

    /// The time the next probe timeout should fire, if any ack-eliciting
    /// bytes are outstanding in this space.
    pub fn pto_deadline(&self, rtt: &RttEstimator, max_ack_delay: Duration) -> Option<Instant> {
        let last_sent = self
            .sent
            .enumerate()
            .filter(|(_, p)| p.in_flight && p.ack_eliciting && !p.acked && !p.lost)
            .map(|(_, p)| p.sent_time)
            .max()?;
        let pto = rtt.pto_base(max_ack_delay) * (1u32 << self.pto_count.min(16));
        Some(last_sent + pto)
    }

    pub fn on_pto_expired(&mut self) {
        self.pto_count += 1;
    }

    pub fn on_ack_received_reset_pto(&mut self) {
        self.pto_count = 0;
    }

    /// The next instant a still-unacked, in-flight packet would be declared
    /// lost purely by the time threshold, if any such packet exists.
    pub fn loss_timer(&self) -> Option<Instant> {
        self.loss_time
    }

    /// Process an incoming ACK frame: apply `on_pkt_acked` to every newly
    /// acked PN, then `on_ack_received_1`-style RTT update for the largest
    /// newly-acked ack-eliciting packet, then loss detection.
    pub fn process_ack(
        &mut self,
        frame: &AckFrame,
        now: Instant,
        ack_delay_exponent: u8,
        max_ack_delay: Duration,
        handshake_confirmed: bool,
        rtt: &mut RttEstimator,
        cc: &mut NewReno,
    ) -> Result<AckOutcome, QuicError> {
        // largest() on IndexDeque is "next index to assign"; the highest
        // actually-sent pn is largest()-1. An ack for anything beyond that
        // was never sent.
        if self.sent.largest() == 0 || frame.largest() >= self.sent.largest() {
            return Err(QuicError::with_default_fty(
                ErrorKind::ProtocolViolation,
                "ack frame acknowledges a packet number never sent in this space",
            ));
        }
        self.largest_acked = Some(self.largest_acked.map_or(frame.largest(), |l| l.max(frame.largest())));

        let ack_delay_raw = Duration::from_micros(frame.ack_delay.into_inner() << ack_delay_exponent);
        let ack_delay = if handshake_confirmed { ack_delay_raw.min(max_ack_delay) } else { ack_delay_raw };

        let mut outcome = AckOutcome::default();
        let mut rtt_sample: Option<Instant> = None;

        for (lo, hi) in frame.into_ranges() {
            for pn in lo..=hi {
                let Some(pkt) = self.sent.get_mut(pn) else {
                    continue;
                };
                if pkt.acked || pkt.lost {
                    continue;
                }
                pkt.acked = true;
                if pkt.in_flight {
                    cc.on_packet_acked(pkt.sent_time, pkt.size);
                }
                outcome.newly_acked.push(pn);
                if pn == frame.largest() && pkt.ack_eliciting {
                    rtt_sample = Some(pkt.sent_time);
                }
            }
        }

        if let Some(sent_time) = rtt_sample {
            rtt.update(now, sent_time, ack_delay);
            self.on_ack_received_reset_pto();
        }

        outcome.newly_lost = self.detect_and_remove_lost(now, rtt, cc);
        self.advance();
        Ok(outcome)
    }

    /// Loss detection per spec §4.4: packet-threshold or time-threshold.
    fn detect_and_remove_lost(&mut self, now: Instant, rtt: &mut RttEstimator, cc: &mut NewReno) -> Vec<u64> {
        let Some(largest_acked) = self.largest_acked else {
            return Vec::new();
        };
        let loss_delay = rtt.loss_delay();
        let lost_before = now.checked_sub(loss_delay);

        let mut lost = Vec::new();
        self.loss_time = None;
        for (pn, pkt) in self.sent.enumerate_mut() {
            if pkt.acked || pkt.lost || !pkt.in_flight {
                continue;
            }
            let by_packet_threshold = pn + PACKET_THRESHOLD <= largest_acked;
            let by_time_threshold = matches!(lost_before, Some(t) if pkt.sent_time <= t);
            if by_packet_threshold || by_time_threshold {
                pkt.lost = true;
                cc.on_packet_lost(pkt.size);
                cc.on_congestion_event(pkt.sent_time, now);
                lost.push(pn);
            } else if pn <= largest_acked {
                let deadline = pkt.sent_time + loss_delay;
                self.loss_time = Some(self.loss_time.map_or(deadline, |t| t.min(deadline)));
            }
        }
        lost
    }

    /// Detect persistent congestion: every ack-eliciting packet sent in a
    /// window at least `(smoothed_rtt + 4*rttvar + max_ack_delay) * 3` wide,
    /// bounded by the oldest and newest lost packet, was lost.
    pub fn maybe_persistent_congestion(&mut self, rtt: &RttEstimator, max_ack_delay: Duration, cc: &mut NewReno) {
        let window = (rtt.smoothed_rtt() + 4 * rtt.rttvar() + max_ack_delay) * PERSISTENT_CONGESTION_THRESHOLD;
        let lost_times: Vec<Instant> = self
            .sent
            .enumerate()
            .filter(|(_, p)| p.lost && p.ack_eliciting)
            .map(|(_, p)| p.sent_time)
            .collect();
        let (Some(&first), Some(&last)) = (lost_times.first(), lost_times.last()) else {
            return;
        };
        if last.saturating_duration_since(first) < window {
            return;
        }
        let all_in_span_lost = self
            .sent
            .enumerate()
            .filter(|(_, p)| p.ack_eliciting && p.sent_time >= first && p.sent_time <= last)
            .all(|(_, p)| p.lost);
        if all_in_span_lost {
            cc.on_persistent_congestion();
        }
    }

    /// Drop records that are acked, or lost long enough ago to no longer
    /// matter for persistent-congestion detection, from the front.
    fn advance(&mut self) {
        let n = self
            .sent
            .enumerate()
            .take_while(|(_, p)| p.acked)
            .count();
        self.sent.advance(n);
    }
}

#[cfg(test)]
mod tests {
    use qbase::varint::VarInt;

    use super::*;

    fn ack(largest: u64, first_ack_range: u64) -> AckFrame {
        AckFrame {
            largest_acked: VarInt::try_from(largest).unwrap(),
            ack_delay: VarInt::from_u32(0),
            first_ack_range: VarInt::try_from(first_ack_range).unwrap(),
            ranges: vec![],
            ecn: None,
        }
    }

    #[test]
    fn packet_threshold_declares_old_unacked_packets_lost() {
        let mut space = SpaceRecovery::default();
        let mut rtt = RttEstimator::default();
        let mut cc = NewReno::new(1200);
        let now = Instant::now();
        for _ in 0..14 {
            space.on_packet_sent(1200, true, true, now);
            cc.on_packet_sent(1200);
        }
        // Only PN 13 is acked; PNs 0..=10 should be declared lost (13-10=3).
        let outcome = space.process_ack(&ack(13, 0), now, 3, Duration::from_millis(25), true, &mut rtt, &mut cc).unwrap();
        assert!(outcome.newly_lost.contains(&10));
        assert!(!outcome.newly_lost.contains(&11));
    }

    #[test]
    fn ack_for_unsent_packet_is_protocol_violation() {
        let mut space = SpaceRecovery::default();
        let mut rtt = RttEstimator::default();
        let mut cc = NewReno::new(1200);
        let now = Instant::now();
        space.on_packet_sent(1200, true, true, now);
        assert!(space.process_ack(&ack(5, 0), now, 3, Duration::from_millis(25), true, &mut rtt, &mut cc).is_err());
    }
}
