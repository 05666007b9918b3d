use std::{
    collections::VecDeque,
    ops::DerefMut,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use derive_more::{Deref, DerefMut};
use qbase::{
    error::{ErrorKind, QuicError},
    frame::{AckFrame, GetFrameType},
    packet::PacketNumber,
    util::IndexDeque,
    varint::VARINT_MAX,
};
use tokio::time::Instant;

/// The state of one sent packet number: still in flight, retransmitted, or acked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SentPktState {
    Skipped,
    Flighting {
        nframes: usize,
        sent_time: Instant,
        expire_time: Instant,
        retran_time: Instant,
    },
    Retransmitted {
        nframes: usize,
        sent_time: Instant,
        expire_time: Instant,
    },
    Acked {
        nframes: usize,
        sent_time: Instant,
        expire_time: Instant,
    },
}

impl SentPktState {
    #[allow(dead_code)]
    fn skipped() -> Self {
        Self::Skipped
    }

    fn new(nframes: usize, sent_time: Instant, retran_time: Instant, expire_time: Instant) -> Self {
        Self::Flighting {
            nframes,
            sent_time,
            retran_time,
            expire_time,
        }
    }

    fn nframes(&self) -> usize {
        match self {
            SentPktState::Skipped => 0,
            SentPktState::Flighting { nframes, .. } => *nframes,
            SentPktState::Retransmitted { nframes, .. } => *nframes,
            SentPktState::Acked { nframes, .. } => *nframes,
        }
    }

    fn be_acked(&mut self) -> usize {
        match *self {
            SentPktState::Skipped => 0,
            SentPktState::Flighting {
                nframes,
                sent_time,
                expire_time,
                ..
            } => {
                *self = SentPktState::Acked {
                    nframes,
                    sent_time,
                    expire_time,
                };
                nframes
            }
            SentPktState::Retransmitted {
                nframes,
                sent_time,
                expire_time,
                ..
            } => {
                *self = SentPktState::Acked {
                    nframes,
                    sent_time,
                    expire_time,
                };
                nframes
            }
            SentPktState::Acked { .. } => 0,
        }
    }

    fn maybe_lost(&mut self) -> usize {
        match *self {
            SentPktState::Flighting {
                nframes,
                sent_time,
                expire_time,
                ..
            } => {
                *self = SentPktState::Retransmitted {
                    nframes,
                    sent_time,
                    expire_time,
                };
                nframes
            }
            Self::Retransmitted { nframes, .. } => nframes,
            Self::Acked { .. } => unreachable!("acked packet should not be lost"),
            Self::Skipped => 0,
        }
    }

    fn should_retransmit_after(&mut self, now: &Instant) -> bool {
        match *self {
            SentPktState::Flighting {
                sent_time,
                retran_time,
                expire_time,
                ..
            } if retran_time < *now => {
                *self = SentPktState::Retransmitted {
                    nframes: self.nframes(),
                    sent_time,
                    expire_time,
                };
                true
            }
            _ => false,
        }
    }

    fn should_remain_after(&self, pn: u64, now: &Instant) -> bool {
        match self {
            SentPktState::Skipped => false,
            SentPktState::Flighting { .. } => true,
            SentPktState::Retransmitted { expire_time, .. } => {
                if expire_time > now {
                    true
                } else {
                    tracing::debug!("retransmitted packet {pn} is expired without ack");
                    false
                }
            }
            SentPktState::Acked { .. } => false,
        }
    }
}

/// Records frames sent in each packet, trying hard to avoid allocation.
///
/// `queue` holds every frame ever sent, in order; `sent_packets` records, per
/// packet number, how many of those frames belong to that packet and what
/// state the packet is in. Sending a packet appends its frames to `queue`;
/// receiving an ack updates the packet's state (acked does nothing further,
/// lost means those frames must be handed back for retransmission).
#[derive(Debug, Default, Deref, DerefMut)]
struct SentJournal<T> {
    #[deref]
    #[deref_mut]
    queue: VecDeque<T>,
    sent_packets: IndexDeque<SentPktState, VARINT_MAX>,
    largest_acked_pktno: u64,
}

impl<T: Clone> SentJournal<T> {
    fn on_packet_acked(&mut self, pn: u64) -> impl Iterator<Item = T> + '_ {
        let mut len = 0;
        let offset = self
            .sent_packets
            .enumerate()
            .take_while(|(pkt_idx, _)| *pkt_idx < pn)
            .map(|(_, s)| s.nframes())
            .sum::<usize>();
        if let Some(s) = self.sent_packets.get_mut(pn) {
            len = s.be_acked();
        }
        self.queue.range_mut(offset..offset + len).map(|f| f.clone())
    }

    fn may_loss_packet(&mut self, pn: u64) -> impl Iterator<Item = T> + '_ {
        let mut len = 0;
        let offset = self
            .sent_packets
            .enumerate()
            .take_while(|(pkt_idx, _)| *pkt_idx < pn)
            .map(|(_, s)| s.nframes())
            .sum::<usize>();
        if let Some(s) = self.sent_packets.get_mut(pn) {
            len = s.maybe_lost();
        }
        self.queue.range_mut(offset..offset + len).map(|f| f.clone())
    }

    fn fast_retransmit(&mut self) -> impl Iterator<Item = T> + '_ {
        tracing::debug!("fast retransmit");
        self.resize();

        let now = tokio::time::Instant::now();
        self.sent_packets
            .enumerate_mut()
            .take_while(|(pn, _)| *pn < self.largest_acked_pktno)
            .scan(0, move |sum, (_, s)| {
                let start = *sum;
                *sum += s.nframes();
                Some((s.should_retransmit_after(&now), start..*sum))
            })
            .filter(|(should_retran, _)| *should_retran)
            .flat_map(|(_, r)| self.queue.range(r))
            .cloned()
    }
}

impl<T> SentJournal<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity * 4),
            sent_packets: IndexDeque::with_capacity(capacity),
            largest_acked_pktno: 0,
        }
    }

    fn resize(&mut self) {
        let now = Instant::now();
        let (n, f) = self
            .sent_packets
            .enumerate()
            .take_while(|(pn, s)| !s.should_remain_after(*pn, &now))
            .fold((0usize, 0usize), |(n, f), (_, s)| (n + 1, f + s.nframes()));
        self.sent_packets.advance(n);
        _ = self.queue.drain(..f);
    }
}

/// Records for sent packets and the frames in them.
///
/// Stream and crypto senders need to be notified when a frame they sent is
/// acked, or may have been lost. This structure records some frames (type
/// `T`) in each packet sent and feeds back the frames in these packets to
/// the components that sent them when the packet is acknowledged or may be
/// lost.
///
/// The interfaces are on [`NewPacketGuard`] and [`SentRotateGuard`]; this
/// structure only provides the methods to create them. Because concurrent
/// recording would otherwise race, both guards hold the inner [`MutexGuard`].
#[derive(Debug, Default)]
pub struct ArcSentJournal<T>(Arc<Mutex<SentJournal<T>>>);

impl<T> Clone for ArcSentJournal<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> ArcSentJournal<T> {
    /// Create a new empty journal with the given `capacity`.
    ///
    /// The number of records can exceed `capacity`, but the internal
    /// implementation tries to avoid reallocation up to that size.
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Arc::new(Mutex::new(SentJournal::with_capacity(capacity))))
    }

    /// Return a [`SentRotateGuard`] to resolve an ack frame from the peer.
    pub fn rotate(&self) -> SentRotateGuard<'_, T> {
        SentRotateGuard {
            inner: self.0.lock().unwrap(),
        }
    }

    /// Return a [`NewPacketGuard`] to get the next pn and record frames in the packet.
    pub fn new_packet(&self) -> NewPacketGuard<'_, T> {
        let inner = self.0.lock().unwrap();
        let origin_len = inner.queue.len();
        NewPacketGuard {
            trivial: false,
            origin_len,
            inner,
        }
    }
}

/// Handles the peer's ack frame and feeds back the frames in the
/// acknowledged or possibly lost packets to other components.
pub struct SentRotateGuard<'a, T> {
    inner: MutexGuard<'a, SentJournal<T>>,
}

impl<T: Clone> SentRotateGuard<'_, T> {
    /// Handle the `Largest Acknowledged` field of an ack frame from the peer.
    ///
    /// See [section-19.3](https://www.rfc-editor.org/rfc/rfc9000.html#section-19.3).
    pub fn update_largest(&mut self, ack_frame: &AckFrame) -> Result<(), QuicError> {
        if ack_frame.largest() > self.inner.sent_packets.largest() {
            return Err(QuicError::new(
                ErrorKind::ProtocolViolation,
                ack_frame.frame_type().into(),
                "ack frame largest pn is larger than the largest pn sent",
            ));
        }
        if ack_frame.largest() > self.inner.largest_acked_pktno {
            self.inner.largest_acked_pktno = ack_frame.largest();
        }
        Ok(())
    }

    /// Called when the sent packet is acked by the peer; returns the frames in that packet.
    pub fn on_packet_acked(&mut self, pn: u64) -> impl Iterator<Item = T> + '_ {
        self.inner.on_packet_acked(pn)
    }

    /// Called when the sent packet may have been lost; returns the frames in that packet.
    pub fn may_loss_packet(&mut self, pn: u64) -> impl Iterator<Item = T> + '_ {
        self.inner.may_loss_packet(pn)
    }

    pub fn fast_retransmit(&mut self) -> impl Iterator<Item = T> + '_ {
        self.inner.fast_retransmit()
    }
}

impl<T> Drop for SentRotateGuard<'_, T> {
    fn drop(&mut self) {
        self.inner.resize();
    }
}

/// Provides the [encoded] packet number to assemble an outgoing packet, and
/// records the frames that packet will carry.
///
/// One [`NewPacketGuard`] corresponds to one packet. Even once a packet
/// number has been read via [`NewPacketGuard::pn`], it is not consumed
/// unless the packet is actually recorded (via [`NewPacketGuard::record_trivial`]
/// or [`NewPacketGuard::record_frame`]) before the guard is dropped.
///
/// [encoded]: https://www.rfc-editor.org/rfc/rfc9000.html#name-sample-packet-number-encodi
#[derive(Debug)]
pub struct NewPacketGuard<'a, T> {
    trivial: bool,
    origin_len: usize,
    inner: MutexGuard<'a, SentJournal<T>>,
}

impl<T> NewPacketGuard<'_, T> {
    /// Provide a packet number and its [encoded] form to assemble a packet.
    ///
    /// Calling this multiple times on the same guard always returns the same pn.
    ///
    /// [encoded]: https://www.rfc-editor.org/rfc/rfc9000.html#name-sample-packet-number-encodi
    pub fn pn(&self) -> (u64, PacketNumber) {
        let pn = self.inner.sent_packets.largest();
        let encoded_pn = PacketNumber::encode(pn, self.inner.largest_acked_pktno);
        (pn, encoded_pn)
    }

    /// Record that this packet carries only trivial frames (Padding, Ping,
    /// Ack) that need no retransmission, but still occupies a packet number.
    pub fn record_trivial(&mut self) {
        self.trivial = true;
    }

    /// Record a frame in the packet being sent.
    ///
    /// Once this or [`NewPacketGuard::record_trivial`] is called, the packet
    /// number is consumed. When the packet is acked, or may be lost, the
    /// frames in it are fed back to whatever sent them.
    pub fn record_frame(&mut self, frame: T) {
        self.inner.deref_mut().push_back(frame);
    }

    pub fn build_with_time(mut self, retran_timeout: Duration, expire_timeout: Duration) {
        let nframes = self.inner.queue.len() - self.origin_len;
        let sent_time = tokio::time::Instant::now();
        if self.trivial && nframes == 0 {
            self.inner
                .sent_packets
                .push_back(SentPktState::Skipped)
                .expect("packet number never overflows");
        } else if nframes > 0 {
            self.inner
                .sent_packets
                .push_back(SentPktState::new(
                    nframes,
                    sent_time,
                    sent_time + retran_timeout,
                    sent_time + expire_timeout,
                ))
                .expect("packet number never overflows");
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use qbase::varint::VarInt;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DummyFrame(u64);

    #[test]
    fn trivial_packet_consumes_pn_but_no_frames() {
        let journal: ArcSentJournal<DummyFrame> = ArcSentJournal::with_capacity(16);
        let mut guard = journal.new_packet();
        let (pn, _) = guard.pn();
        assert_eq!(pn, 0);
        guard.record_trivial();
        guard.build_with_time(Duration::from_millis(100), Duration::from_secs(1));

        let mut guard = journal.new_packet();
        assert_eq!(guard.pn().0, 1);
        guard.record_frame(DummyFrame(1));
        guard.build_with_time(Duration::from_millis(100), Duration::from_secs(1));
    }

    #[test]
    fn ack_returns_frames_and_rejects_future_largest() {
        let journal: ArcSentJournal<DummyFrame> = ArcSentJournal::with_capacity(16);
        {
            let mut guard = journal.new_packet();
            guard.record_frame(DummyFrame(42));
            guard.build_with_time(Duration::from_millis(100), Duration::from_secs(1));
        }

        let ack = AckFrame {
            largest_acked: VarInt::from_u32(0),
            ack_delay: VarInt::from_u32(0),
            first_ack_range: VarInt::from_u32(0),
            ranges: vec![],
            ecn: None,
        };
        let mut rotate = journal.rotate();
        rotate.update_largest(&ack).unwrap();
        let acked: Vec<_> = rotate.on_packet_acked(0).collect();
        assert_eq!(acked, vec![DummyFrame(42)]);

        let bogus_ack = AckFrame {
            largest_acked: VarInt::from_u32(100),
            ..ack
        };
        assert!(journal.rotate().update_largest(&bogus_ack).is_err());
        let _ = Bytes::new();
    }
}
