//! Round-trip time estimation, following RFC 9002 §5 with QUIC's ack-delay
//! adjustment.

use std::time::Duration;

use tokio::time::Instant;

/// The granularity QUIC assumes for system timers; loss and PTO intervals
/// never shrink below it.
pub const GRANULARITY: Duration = Duration::from_millis(1);

/// Used before any RTT sample exists, e.g. to arm the first PTO.
const INITIAL_RTT: Duration = Duration::from_millis(333);

#[derive(Debug, Clone, Copy)]
pub struct RttEstimator {
    latest_rtt: Duration,
    min_rtt: Duration,
    smoothed_rtt: Duration,
    rttvar: Duration,
    has_sample: bool,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self {
            latest_rtt: INITIAL_RTT,
            min_rtt: INITIAL_RTT,
            smoothed_rtt: INITIAL_RTT,
            rttvar: INITIAL_RTT / 2,
            has_sample: false,
        }
    }
}

impl RttEstimator {
    pub fn latest_rtt(&self) -> Duration {
        self.latest_rtt
    }

    pub fn min_rtt(&self) -> Duration {
        self.min_rtt
    }

    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt
    }

    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    /// Update the estimate from a newly-acked, ack-eliciting packet: `t_sent`
    /// is when it was sent, `ack_delay` is the peer-reported delay (already
    /// clamped by the caller to `max_ack_delay` once the handshake is confirmed).
    pub fn update(&mut self, now: Instant, t_sent: Instant, ack_delay: Duration) {
        self.latest_rtt = now.saturating_duration_since(t_sent);
        self.min_rtt = self.min_rtt.min(self.latest_rtt);

        let adjusted_rtt = if self.latest_rtt >= self.min_rtt + ack_delay {
            self.latest_rtt - ack_delay
        } else {
            self.latest_rtt
        };

        if !self.has_sample {
            self.has_sample = true;
            self.smoothed_rtt = adjusted_rtt;
            self.rttvar = adjusted_rtt / 2;
        } else {
            let diff = if self.smoothed_rtt > adjusted_rtt {
                self.smoothed_rtt - adjusted_rtt
            } else {
                adjusted_rtt - self.smoothed_rtt
            };
            self.rttvar = (self.rttvar * 3 + diff) / 4;
            self.smoothed_rtt = (self.smoothed_rtt * 7 + adjusted_rtt) / 8;
        }
    }

    /// The base probe-timeout interval (before `2^pto_count` backoff), see spec §4.4.
    pub fn pto_base(&self, max_ack_delay: Duration) -> Duration {
        self.smoothed_rtt + (4 * self.rttvar).max(GRANULARITY) + max_ack_delay
    }

    /// The time-threshold loss window, see spec §4.4 (`kTimeThreshold = 9/8`).
    pub fn loss_delay(&self) -> Duration {
        let threshold = self.smoothed_rtt.max(self.latest_rtt) * 9 / 8;
        threshold.max(GRANULARITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds_smoothed_rtt_and_half_rttvar() {
        let mut rtt = RttEstimator::default();
        let t0 = Instant::now();
        rtt.update(t0 + Duration::from_millis(100), t0, Duration::ZERO);
        assert_eq!(rtt.smoothed_rtt(), Duration::from_millis(100));
        assert_eq!(rtt.rttvar(), Duration::from_millis(50));
    }

    #[test]
    fn ack_delay_is_subtracted_when_it_does_not_violate_min_rtt() {
        let mut rtt = RttEstimator::default();
        let t0 = Instant::now();
        rtt.update(t0 + Duration::from_millis(100), t0, Duration::ZERO);
        rtt.update(t0 + Duration::from_millis(220), t0 + Duration::from_millis(100), Duration::from_millis(20));
        // adjusted_rtt = 120ms - 20ms = 100ms, smoothed moves towards it.
        assert!(rtt.smoothed_rtt() <= Duration::from_millis(100));
    }
}
