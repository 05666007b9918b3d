//! New-Reno-style congestion control, see spec §4.4.

use tokio::time::Instant;

/// Floor the slow-start threshold may never drop below.
const MIN_CONGESTION_WINDOW_SEGMENTS: u64 = 2;

#[derive(Debug, Clone, Copy)]
pub struct NewReno {
    max_datagram_size: u64,
    cwnd: u64,
    ssthresh: u64,
    bytes_in_flight: u64,
    recovery_start_time: Option<Instant>,
}

impl NewReno {
    pub fn new(max_datagram_size: u64) -> Self {
        Self {
            max_datagram_size,
            cwnd: 10 * max_datagram_size,
            ssthresh: u64::MAX,
            bytes_in_flight: 0,
            recovery_start_time: None,
        }
    }

    pub fn cwnd(&self) -> u64 {
        self.cwnd
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.bytes_in_flight
    }

    pub fn is_congestion_limited(&self) -> bool {
        self.bytes_in_flight >= self.cwnd
    }

    pub fn on_packet_sent(&mut self, size: u64) {
        self.bytes_in_flight += size;
    }

    /// An ack-eliciting, in-flight packet sent at `sent_time` and worth
    /// `acked_bytes` was just acknowledged.
    pub fn on_packet_acked(&mut self, sent_time: Instant, acked_bytes: u64) {
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(acked_bytes);
        if matches!(self.recovery_start_time, Some(t) if sent_time <= t) {
            return;
        }
        if self.cwnd < self.ssthresh {
            self.cwnd += acked_bytes;
        } else {
            self.cwnd += self.max_datagram_size * acked_bytes / self.cwnd;
        }
    }

    pub fn on_packet_lost(&mut self, size: u64) {
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(size);
    }

    /// A packet sent at `sent_time` was lost, or an ECN-CE mark arrived.
    /// Returns `true` if this actually entered a new recovery period.
    pub fn on_congestion_event(&mut self, sent_time: Instant, now: Instant) -> bool {
        if matches!(self.recovery_start_time, Some(t) if sent_time <= t) {
            return false;
        }
        self.recovery_start_time = Some(now);
        self.ssthresh = (self.cwnd / 2).max(MIN_CONGESTION_WINDOW_SEGMENTS * self.max_datagram_size);
        self.cwnd = self.ssthresh;
        true
    }

    /// All packets sent across a persistent-congestion-length window were
    /// lost: collapse the window per spec §4.4.
    pub fn on_persistent_congestion(&mut self) {
        self.cwnd = MIN_CONGESTION_WINDOW_SEGMENTS * self.max_datagram_size;
        self.recovery_start_time = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn slow_start_grows_cwnd_by_full_acked_bytes() {
        let mut cc = NewReno::new(1200);
        let initial = cc.cwnd();
        cc.on_packet_sent(1200);
        cc.on_packet_acked(Instant::now(), 1200);
        assert_eq!(cc.cwnd(), initial + 1200);
    }

    #[test]
    fn congestion_event_halves_window_once_per_recovery_period() {
        let mut cc = NewReno::new(1200);
        let now = Instant::now();
        let sent_time = now;
        assert!(cc.on_congestion_event(sent_time, now));
        let after_first = cc.cwnd();
        // A second loss from within the same recovery period is ignored.
        assert!(!cc.on_congestion_event(sent_time, now + Duration::from_millis(1)));
        assert_eq!(cc.cwnd(), after_first);
    }

    #[test]
    fn persistent_congestion_collapses_to_minimum() {
        let mut cc = NewReno::new(1200);
        cc.on_persistent_congestion();
        assert_eq!(cc.cwnd(), 2400);
    }
}
