//! The connection-wide collection of streams: implicit stream creation,
//! stream-id limit enforcement, and connection-level flow control.

use std::collections::HashMap;

use bytes::Bytes;
use qbase::{
    error::{ErrorKind, QuicError},
    frame::{DataBlockedFrame, MaxDataFrame, MaxStreamsFrame, StreamCtlFrame, StreamDataBlockedFrame, StreamFrame},
    sid::{Dir, Role, StreamId, StreamIdLimits},
};

use crate::{recv::DeliveryEffect, stream::Stream};

/// Connection-level flow control: the aggregate of all streams' data,
/// independent of any one stream's own window (spec §4.2, `max_data`).
#[derive(Debug)]
struct ConnFlowController {
    /// Our advertised limit on data the peer may send across all streams.
    local_max: u64,
    recv_total: u64,
    /// The peer's advertised limit on data we may send across all streams.
    peer_max: u64,
    send_total: u64,
    blocked_at: Option<u64>,
}

impl ConnFlowController {
    fn new(local_max: u64, peer_max: u64) -> Self {
        Self {
            local_max,
            recv_total: 0,
            peer_max,
            send_total: 0,
            blocked_at: None,
        }
    }

    fn on_send(&mut self, n: u64) {
        self.send_total += n;
    }

    fn sendable(&self) -> u64 {
        self.peer_max.saturating_sub(self.send_total)
    }

    fn mark_blocked(&mut self) {
        self.blocked_at = Some(self.peer_max);
    }

    fn blocked(&self) -> Option<u64> {
        self.blocked_at
    }

    fn clear_blocked(&mut self) {
        self.blocked_at = None;
    }

    fn update_peer_max(&mut self, max: u64) {
        self.peer_max = self.peer_max.max(max);
        self.clear_blocked();
    }

    /// `grown_by` is how much a stream's `largest_offset` moved forward by
    /// receiving this frame; the connection-level total only ever grows this way.
    fn on_recv_growth(&mut self, grown_by: u64) -> Result<(), QuicError> {
        self.recv_total += grown_by;
        if self.recv_total > self.local_max {
            return Err(QuicError::with_default_fty(
                ErrorKind::FlowControl,
                "aggregate stream data exceeds the connection's max_data",
            ));
        }
        Ok(())
    }

    fn maybe_grow_local_max(&mut self) -> Option<u64> {
        if self.recv_total * 2 >= self.local_max {
            self.local_max = self.local_max.max(self.recv_total * 2).max(self.local_max + 1);
            Some(self.local_max)
        } else {
            None
        }
    }
}

/// Per-role, per-direction initial window sizes a new stream is created with.
#[derive(Debug, Clone, Copy)]
pub struct StreamWindows {
    pub initial_max_stream_data_bidi_local: u64,
    pub initial_max_stream_data_bidi_remote: u64,
    pub initial_max_stream_data_uni: u64,
}

/// All streams of a connection, plus the connection-level flow controller
/// and stream-id limit bookkeeping.
#[derive(Debug)]
pub struct DataStreams {
    role: Role,
    streams: HashMap<StreamId, Stream>,
    limits: StreamIdLimits,
    flow: ConnFlowController,
    windows: StreamWindows,
}

impl DataStreams {
    pub fn new(
        role: Role,
        max_bidi_remote: u64,
        max_uni_remote: u64,
        conn_local_max_data: u64,
        conn_peer_max_data: u64,
        windows: StreamWindows,
    ) -> Self {
        Self {
            role,
            streams: HashMap::new(),
            limits: StreamIdLimits::new(role, max_bidi_remote, max_uni_remote),
            flow: ConnFlowController::new(conn_local_max_data, conn_peer_max_data),
            windows,
        }
    }

    /// Open a new, locally-initiated stream.
    pub fn open(&mut self, dir: Dir) -> StreamId {
        let sid = self.limits.next_local(dir);
        let (peer_window, local_window) = match dir {
            Dir::Bidi => (self.windows.initial_max_stream_data_bidi_remote, self.windows.initial_max_stream_data_bidi_local),
            Dir::Uni => (self.windows.initial_max_stream_data_uni, 0),
        };
        self.streams.insert(sid, Stream::new(sid, peer_window, local_window));
        sid
    }

    pub fn get(&self, sid: StreamId) -> Option<&Stream> {
        self.streams.get(&sid)
    }

    pub fn get_mut(&mut self, sid: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&sid)
    }

    /// Stream ids with peer-window-permitted data still waiting to be sent,
    /// in ascending order so the packer services older streams first.
    pub fn sendable_streams(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self
            .streams
            .iter()
            .filter(|(_, s)| s.sender().has_sendable())
            .map(|(sid, _)| *sid)
            .collect();
        ids.sort_by_key(|sid| sid.into_inner());
        ids
    }

    /// Stream ids with contiguous, unread bytes sitting in their receive
    /// buffer right now, in ascending order — what an application `read()`
    /// across the whole connection scans to pick a stream.
    pub fn readable_streams(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self
            .streams
            .iter()
            .filter(|(_, s)| s.recver().is_readable())
            .map(|(sid, _)| *sid)
            .collect();
        ids.sort_by_key(|sid| sid.into_inner());
        ids
    }

    /// Ensure `sid` (and, per RFC 9000 §2.1, every lower-numbered stream of
    /// the same initiator/direction) exists, creating any that don't yet.
    /// Only meaningful for peer-initiated stream IDs; errors if the peer
    /// exceeded the limit we advertised.
    fn ensure_open(&mut self, sid: StreamId) -> Result<(), QuicError> {
        if sid.initiator() == self.role {
            // We already created this stream ourselves in `open`; referencing
            // one we haven't is a protocol violation the caller should have
            // already ruled out via local bookkeeping.
            return Ok(());
        }
        self.limits.validate_remote(sid)?;
        let (peer_window, local_window) = match sid.dir() {
            Dir::Bidi => (self.windows.initial_max_stream_data_bidi_remote, self.windows.initial_max_stream_data_bidi_local),
            Dir::Uni => (0, self.windows.initial_max_stream_data_uni),
        };
        for seq in 0..=sid.sequence() {
            let candidate = StreamId::new(sid.initiator(), sid.dir(), seq);
            self.streams
                .entry(candidate)
                .or_insert_with(|| Stream::new(candidate, peer_window, local_window));
        }
        Ok(())
    }

    /// Deliver an incoming STREAM frame, creating the stream if this is its
    /// first reference.
    pub fn recv_stream_frame(&mut self, frame: &StreamFrame, data: Bytes) -> Result<DeliveryEffect, QuicError> {
        self.ensure_open(frame.stream_id)?;
        let stream = self.streams.get_mut(&frame.stream_id).expect("just ensured open");
        let before = stream.recver().largest_offset();
        let effect = stream.recv(frame, data)?;
        let after = stream.recver().largest_offset();
        let grown = after.saturating_sub(before);
        if grown > 0 {
            self.flow.on_recv_growth(grown)?;
        }
        Ok(effect)
    }

    /// Dispatch a stream-control frame, routing per-stream ones to their
    /// stream and handling the connection-scoped ones (MAX_STREAMS,
    /// STREAMS_BLOCKED) here directly.
    pub fn recv_ctrl_frame(&mut self, frame: &StreamCtlFrame) -> Result<Option<StreamCtlFrame>, QuicError> {
        match frame {
            StreamCtlFrame::MaxStreams(f) => {
                self.on_max_streams(f);
                Ok(None)
            }
            StreamCtlFrame::StreamsBlocked(_) => Ok(None),
            StreamCtlFrame::ResetStream(f) => self.ensure_open(f.stream_id).and_then(|_| self.dispatch(f.stream_id, frame)),
            StreamCtlFrame::StopSending(f) => self.ensure_open(f.stream_id).and_then(|_| self.dispatch(f.stream_id, frame)),
            StreamCtlFrame::MaxStreamData(f) => self.dispatch(f.stream_id, frame),
            StreamCtlFrame::StreamDataBlocked(f) => self.dispatch(f.stream_id, frame),
        }
    }

    fn dispatch(&mut self, sid: StreamId, frame: &StreamCtlFrame) -> Result<Option<StreamCtlFrame>, QuicError> {
        match self.streams.get_mut(&sid) {
            Some(stream) => stream.on_ctrl_frame(frame),
            None => Ok(None),
        }
    }

    fn on_max_streams(&mut self, frame: &MaxStreamsFrame) {
        match frame.dir {
            Dir::Bidi => self.limits.update_max_bidi_remote(frame.max_streams.into_inner()),
            Dir::Uni => self.limits.update_max_uni_remote(frame.max_streams.into_inner()),
        }
    }

    pub fn on_max_data(&mut self, frame: &MaxDataFrame) {
        self.flow.update_peer_max(frame.max_data.into_inner());
    }

    pub fn on_data_blocked(&mut self, _frame: &DataBlockedFrame) {
        // The peer is telling us it's blocked on our connection-level window;
        // nothing to do beyond what `maybe_grow_local_max` already handles.
    }

    /// How many more bytes this connection may send right now across all streams.
    pub fn sendable(&self) -> u64 {
        self.flow.sendable()
    }

    pub fn on_send(&mut self, n: u64) {
        self.flow.on_send(n);
    }

    /// Build a DATA_BLOCKED frame if connection-level sending is currently
    /// limited by the peer's `max_data` and one hasn't been sent for this limit yet.
    pub fn blocked(&mut self) -> Option<DataBlockedFrame> {
        if self.flow.sendable() == 0 {
            self.flow.mark_blocked();
        }
        self.flow.blocked().map(|limit| DataBlockedFrame {
            limit: qbase::varint::VarInt::try_from(limit).unwrap_or(qbase::varint::VarInt::ZERO),
        })
    }

    /// If our connection-level receive window should grow, returns the new
    /// limit to encode into an outgoing MAX_DATA frame.
    pub fn maybe_grow_max_data(&mut self) -> Option<MaxDataFrame> {
        self.flow
            .maybe_grow_local_max()
            .map(|max_data| MaxDataFrame { max_data: qbase::varint::VarInt::try_from(max_data).unwrap_or(qbase::varint::VarInt::ZERO) })
    }

    /// Every stream currently send-blocked on its own `max_stream_data`,
    /// paired with the STREAM_DATA_BLOCKED to (re-)emit for it, in ascending
    /// stream-id order.
    pub fn stream_data_blocked(&self) -> Vec<StreamDataBlockedFrame> {
        let mut ids: Vec<StreamId> = self.streams.keys().copied().collect();
        ids.sort_by_key(|sid| sid.into_inner());
        ids.into_iter()
            .filter_map(|sid| self.streams.get(&sid).and_then(Stream::stream_data_blocked))
            .collect()
    }

    /// Drop any streams that have reached a terminal state on both halves.
    pub fn collect_garbage(&mut self) {
        self.streams.retain(|_, s| !s.is_finished());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows(n: u64) -> StreamWindows {
        StreamWindows {
            initial_max_stream_data_bidi_local: n,
            initial_max_stream_data_bidi_remote: n,
            initial_max_stream_data_uni: n,
        }
    }

    /// Spec §8 scenario 5: peer advertises `initial_max_stream_data = 1000`,
    /// the application writes 1500 bytes; exactly 1000 bytes go out and the
    /// stream reports itself blocked until a MAX_STREAM_DATA bump arrives.
    #[test]
    fn stream_flow_control_stall_then_unblock_on_max_stream_data() {
        let mut streams = DataStreams::new(Role::Client, 10, 10, 1 << 20, 1 << 20, windows(1000));
        let sid = streams.open(Dir::Bidi);
        streams.get_mut(sid).unwrap().write(Bytes::from(vec![0u8; 1500]), false).unwrap();

        let mut sent = 0usize;
        loop {
            let conn_budget = streams.sendable();
            let Some((frame, data, is_retransmit)) = streams.get_mut(sid).unwrap().emit(1200, conn_budget) else {
                break;
            };
            assert!(!is_retransmit);
            streams.on_send(data.len() as u64);
            sent += data.len();
            let _ = frame;
        }
        assert_eq!(sent, 1000);
        let blocked = streams.get(sid).unwrap().stream_data_blocked();
        assert_eq!(blocked.unwrap().max_stream_data.into_inner(), 1000);

        streams.recv_ctrl_frame(&StreamCtlFrame::MaxStreamData(qbase::frame::MaxStreamDataFrame {
            stream_id: sid,
            max_stream_data: qbase::varint::VarInt::try_from(2000u64).unwrap(),
        }))
        .unwrap();
        assert!(streams.get(sid).unwrap().stream_data_blocked().is_none());

        let conn_budget = streams.sendable();
        let (_, data, is_retransmit) = streams.get_mut(sid).unwrap().emit(1200, conn_budget).unwrap();
        assert!(!is_retransmit);
        assert_eq!(data.len(), 500);
    }

    /// Spec §3 invariant: total outstanding bytes across streams ≤
    /// connection `max_data`, even when each individual stream's own window
    /// would permit more.
    #[test]
    fn connection_level_flow_control_caps_aggregate_sends() {
        let mut streams = DataStreams::new(Role::Client, 10, 10, 100, 100, windows(1000));
        let a = streams.open(Dir::Bidi);
        let b = streams.open(Dir::Bidi);
        streams.get_mut(a).unwrap().write(Bytes::from(vec![0u8; 1000]), false).unwrap();
        streams.get_mut(b).unwrap().write(Bytes::from(vec![0u8; 1000]), false).unwrap();

        let mut total = 0usize;
        for sid in [a, b, a, b] {
            let conn_budget = streams.sendable();
            if let Some((_, data, is_retransmit)) = streams.get_mut(sid).unwrap().emit(1200, conn_budget) {
                assert!(!is_retransmit);
                streams.on_send(data.len() as u64);
                total += data.len();
            }
        }
        assert_eq!(total, 100);
        assert_eq!(streams.sendable(), 0);
    }

    #[test]
    fn peer_stream_id_beyond_limit_is_protocol_violation() {
        let mut streams = DataStreams::new(Role::Server, 1, 0, 1 << 20, 0, windows(1 << 16));
        // Two bidi streams (sequence 0 and 1) from the client, but the limit is 1.
        let over_limit = StreamId::new(Role::Client, Dir::Bidi, 1);
        let frame = StreamFrame::new(over_limit, 0, 0, false);
        let err = streams.recv_stream_frame(&frame, Bytes::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProtocolViolation);
    }

    #[test]
    fn collect_garbage_drops_finished_streams_only() {
        let mut streams = DataStreams::new(Role::Client, 10, 10, 1 << 20, 1 << 20, windows(1 << 16));
        let finished = streams.open(Dir::Bidi);
        let alive = streams.open(Dir::Bidi);

        // Drive both halves of `finished` to a terminal state: reset sent and
        // acked locally, and (pretending the peer also reset its direction)
        // reset received and read by the application.
        {
            let stream = streams.get_mut(finished).unwrap();
            stream.reset(0);
            stream.sender_mut().on_reset_acked();
            stream.recver_mut().on_reset(0, 0).unwrap();
            stream.recver_mut().on_reset_read();
        }
        assert!(streams.get(finished).unwrap().is_finished());

        streams.collect_garbage();
        assert!(streams.get(finished).is_none());
        assert!(streams.get(alive).is_some());
    }
}
