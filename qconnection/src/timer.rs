//! A connection's timer slots (spec §4.6): a handful of named `Option<Instant>`
//! deadlines the event loop polls the earliest of, rather than a process-wide
//! timer wheel — this core is single-threaded and cooperative, so one small
//! per-connection registry is enough.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    LossDetection,
    Idle,
    CloseDraining,
    AckDelay,
    Pacing,
}

const SLOTS: [TimerId; 5] = [
    TimerId::LossDetection,
    TimerId::Idle,
    TimerId::CloseDraining,
    TimerId::AckDelay,
    TimerId::Pacing,
];

/// Per-connection deadlines. `arm`/`cancel` set or clear one slot;
/// `poll_timeout` reports the earliest deadline still armed, and
/// `poll_expired` drains every slot whose deadline has already passed.
#[derive(Debug, Default)]
pub struct Timers {
    deadlines: [Option<Instant>; 5],
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(id: TimerId) -> usize {
        match id {
            TimerId::LossDetection => 0,
            TimerId::Idle => 1,
            TimerId::CloseDraining => 2,
            TimerId::AckDelay => 3,
            TimerId::Pacing => 4,
        }
    }

    pub fn arm(&mut self, id: TimerId, deadline: Instant) {
        self.deadlines[Self::slot(id)] = Some(deadline);
    }

    pub fn arm_after(&mut self, id: TimerId, now: Instant, delay: Duration) {
        self.arm(id, now + delay);
    }

    pub fn cancel(&mut self, id: TimerId) {
        self.deadlines[Self::slot(id)] = None;
    }

    pub fn get(&self, id: TimerId) -> Option<Instant> {
        self.deadlines[Self::slot(id)]
    }

    /// The earliest armed deadline across every slot, for the event loop to
    /// sleep/select until.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.deadlines.iter().copied().flatten().min()
    }

    /// Every slot whose deadline is at or before `now`, cleared as a side effect.
    pub fn poll_expired(&mut self, now: Instant) -> Vec<TimerId> {
        let mut expired = Vec::new();
        for id in SLOTS {
            let i = Self::slot(id);
            if matches!(self.deadlines[i], Some(d) if d <= now) {
                self.deadlines[i] = None;
                expired.push(id);
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_timeout_returns_the_earliest_slot() {
        let mut timers = Timers::new();
        let now = Instant::now();
        timers.arm(TimerId::Idle, now + Duration::from_secs(30));
        timers.arm(TimerId::LossDetection, now + Duration::from_millis(50));
        assert_eq!(timers.poll_timeout(), Some(now + Duration::from_millis(50)));
    }

    #[test]
    fn poll_expired_drains_only_past_deadlines() {
        let mut timers = Timers::new();
        let now = Instant::now();
        timers.arm(TimerId::LossDetection, now - Duration::from_millis(1));
        timers.arm(TimerId::Idle, now + Duration::from_secs(30));
        let expired = timers.poll_expired(now);
        assert_eq!(expired, vec![TimerId::LossDetection]);
        assert!(timers.get(TimerId::LossDetection).is_none());
        assert!(timers.get(TimerId::Idle).is_some());
    }

    #[test]
    fn cancel_clears_a_slot() {
        let mut timers = Timers::new();
        let now = Instant::now();
        timers.arm(TimerId::Pacing, now);
        timers.cancel(TimerId::Pacing);
        assert!(timers.get(TimerId::Pacing).is_none());
    }
}
