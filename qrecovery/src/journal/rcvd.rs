//! Tracks received packet numbers for one packet-number space and
//! synthesizes outgoing ACK/ACK_ECN frames from them.
//!
//! Modeled on [`super::sent::SentJournal`]'s `IndexDeque`-based bookkeeping,
//! but the roles are reversed: here we record which packet numbers the peer
//! has sent us, not which we've sent.

use std::sync::{Arc, Mutex};

use qbase::{
    frame::{AckFrame, EcnCounts},
    varint::VarInt,
};
use tokio::time::Instant;

/// Keep at most this many disjoint received ranges around; older, already
/// long-acknowledged gaps are pruned rather than carried forever.
const MAX_RANGES: usize = 32;

#[derive(Debug, Default)]
struct RcvdJournal {
    /// Disjoint, ascending, inclusive `[start, end]` packet-number ranges received so far.
    ranges: Vec<(u64, u64)>,
    largest_time: Option<Instant>,
    ecn: EcnCounts,
    /// Ack-eliciting packets received since the last ACK frame was generated.
    pending_ack_eliciting: usize,
    ack_immediately: bool,
}

impl RcvdJournal {
    fn largest(&self) -> Option<u64> {
        self.ranges.last().map(|&(_, end)| end)
    }

    fn contains(&self, pn: u64) -> bool {
        self.ranges
            .binary_search_by(|&(s, e)| if pn < s { std::cmp::Ordering::Greater } else if pn > e { std::cmp::Ordering::Less } else { std::cmp::Ordering::Equal })
            .is_ok()
    }

    /// Record a received packet number. Returns `false` if it was a duplicate.
    fn register(&mut self, pn: u64, now: Instant, ack_eliciting: bool, ect0: bool, ect1: bool, ce: bool) -> bool {
        if self.contains(pn) {
            return false;
        }
        let was_contiguous = matches!(self.largest(), Some(largest) if pn == largest + 1);
        let is_new_largest = matches!(self.largest(), None) || pn > self.largest().unwrap();

        let i = self.ranges.partition_point(|&(s, _)| s <= pn);
        self.ranges.insert(i, (pn, pn));
        // Rebuild by merging adjacent/overlapping/touching ranges in one pass.
        let mut merged: Vec<(u64, u64)> = Vec::with_capacity(self.ranges.len());
        for &(s, e) in &self.ranges {
            match merged.last_mut() {
                Some((_, last_end)) if s <= *last_end + 1 => *last_end = (*last_end).max(e),
                _ => merged.push((s, e)),
            }
        }
        self.ranges = merged;
        if self.ranges.len() > MAX_RANGES {
            self.ranges.remove(0);
        }

        if ect0 {
            self.ecn.ect0 = VarInt::try_from(self.ecn.ect0.into_inner() + 1).expect("ecn counter fits a varint");
        }
        if ect1 {
            self.ecn.ect1 = VarInt::try_from(self.ecn.ect1.into_inner() + 1).expect("ecn counter fits a varint");
        }
        if ce {
            self.ecn.ce = VarInt::try_from(self.ecn.ce.into_inner() + 1).expect("ecn counter fits a varint");
        }

        if is_new_largest {
            self.largest_time = Some(now);
        }
        if ack_eliciting {
            self.pending_ack_eliciting += 1;
        }

        // Immediate-ACK triggers (RFC 9000 §13.2.1): out-of-order arrival that
        // opens or fails to close a gap, and every other ack-eliciting packet.
        if ack_eliciting && (!was_contiguous || self.pending_ack_eliciting >= 2) {
            self.ack_immediately = true;
        }
        true
    }

    fn should_ack_immediately(&self) -> bool {
        self.ack_immediately
    }

    /// Build an ACK/ACK_ECN frame for everything received so far, and reset
    /// the "needs immediate ack" bookkeeping.
    fn generate(&mut self, now: Instant, ack_delay_exponent: u8, send_ecn: bool) -> Option<AckFrame> {
        let largest = self.largest()?;
        let largest_time = self.largest_time.unwrap_or(now);
        let delay_micros = now.saturating_duration_since(largest_time).as_micros() as u64;
        let ack_delay = VarInt::try_from(delay_micros >> ack_delay_exponent).unwrap_or(VarInt::from_u32(0));

        let mut iter = self.ranges.iter().rev();
        let (_, first_end) = iter.next().copied().unwrap();
        debug_assert_eq!(first_end, largest);
        let first_start = self.ranges.last().unwrap().0;
        let first_ack_range = VarInt::try_from(first_end - first_start).expect("range fits a varint");

        let mut ranges = Vec::new();
        let mut prev_start = first_start;
        for &(s, e) in self.ranges[..self.ranges.len() - 1].iter().rev() {
            let gap = prev_start - e - 2;
            let len = e - s;
            ranges.push((
                VarInt::try_from(gap).expect("gap fits a varint"),
                VarInt::try_from(len).expect("range length fits a varint"),
            ));
            prev_start = s;
        }

        self.pending_ack_eliciting = 0;
        self.ack_immediately = false;

        Some(AckFrame {
            largest_acked: VarInt::try_from(largest).expect("packet numbers fit a varint"),
            ack_delay,
            first_ack_range,
            ranges,
            ecn: send_ecn.then_some(self.ecn),
        })
    }
}

/// Shared handle to one packet-number space's received-packet bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct ArcRcvdJournal(Arc<Mutex<RcvdJournal>>);

impl ArcRcvdJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly decrypted, validated packet number. Returns `false`
    /// if `pn` is a duplicate and should be discarded by the caller.
    pub fn register(&self, pn: u64, ack_eliciting: bool, ect0: bool, ect1: bool, ce: bool) -> bool {
        self.0.lock().unwrap().register(pn, Instant::now(), ack_eliciting, ect0, ect1, ce)
    }

    pub fn should_ack_immediately(&self) -> bool {
        self.0.lock().unwrap().should_ack_immediately()
    }

    /// Synthesize the next outgoing ACK frame, if anything has been received.
    pub fn generate_ack(&self, ack_delay_exponent: u8, send_ecn: bool) -> Option<AckFrame> {
        self.0.lock().unwrap().generate(Instant::now(), ack_delay_exponent, send_ecn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_packets_need_no_immediate_ack() {
        let journal = ArcRcvdJournal::new();
        assert!(journal.register(0, true, false, false, false));
        assert!(!journal.should_ack_immediately());
    }

    #[test]
    fn out_of_order_packet_triggers_immediate_ack() {
        let journal = ArcRcvdJournal::new();
        journal.register(0, true, false, false, false);
        journal.register(2, true, false, false, false);
        assert!(journal.should_ack_immediately());
    }

    #[test]
    fn duplicate_packet_is_rejected() {
        let journal = ArcRcvdJournal::new();
        assert!(journal.register(5, true, false, false, false));
        assert!(!journal.register(5, true, false, false, false));
    }

    #[test]
    fn generates_gapped_ack_ranges() {
        let journal = ArcRcvdJournal::new();
        journal.register(0, true, false, false, false);
        journal.register(1, true, false, false, false);
        journal.register(5, true, false, false, false);
        let ack = journal.generate_ack(3, false).unwrap();
        assert_eq!(ack.into_ranges(), vec![(5, 5), (0, 1)]);
    }
}
