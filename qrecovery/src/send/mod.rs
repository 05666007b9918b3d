//! The send half of a stream: buffering, per-stream flow control, and FIN sequencing.

pub mod sndbuf;

use bytes::Bytes;
use qbase::{
    error::{ErrorKind, QuicError},
    frame::{ResetStreamFrame, StopSendingFrame, StreamFrame},
    sid::StreamId,
};

use self::sndbuf::SendBuf;

/// State of the local (sending) half of a stream.
///
/// See spec §4.2: `idle -> open -> half-closed-local -> closed`, short-circuited
/// to `closed` the moment a RESET_STREAM is sent and fully acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Ready,
    Sending,
    /// All data (and FIN, if any) has been written to the buffer; still draining unacked bytes.
    DataSent,
    /// Every byte, including FIN, has been acknowledged.
    DataRecvd,
    ResetSent { error_code: u64 },
    ResetRecvd { error_code: u64 },
}

impl SendState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SendState::DataRecvd | SendState::ResetRecvd { .. })
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, SendState::ResetSent { .. } | SendState::ResetRecvd { .. })
    }
}

/// The send side of one stream.
#[derive(Debug)]
pub struct Sender {
    sid: StreamId,
    state: SendState,
    buf: SendBuf,
    /// Peer-advertised `max_stream_data` for data we send on this stream.
    peer_window: u64,
    fin_length: Option<u64>,
    blocked_at: Option<u64>,
    /// Ranges a packet carrying them was declared lost, due to be re-read
    /// from `buf` and re-emitted ahead of any never-before-sent data.
    lost: std::collections::VecDeque<(u64, usize, bool)>,
}

impl Sender {
    pub fn new(sid: StreamId, initial_peer_window: u64) -> Self {
        Self {
            sid,
            state: SendState::Ready,
            buf: SendBuf::default(),
            peer_window: initial_peer_window,
            fin_length: None,
            blocked_at: None,
            lost: std::collections::VecDeque::new(),
        }
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    /// Queue `data` for sending, marking the stream finished if `fin` is set.
    pub fn write(&mut self, data: Bytes, fin: bool) -> Result<(), QuicError> {
        if self.fin_length.is_some() {
            return Err(QuicError::with_default_fty(
                ErrorKind::StreamState,
                format!("{:?}: write after FIN", self.sid),
            ));
        }
        if !data.is_empty() {
            self.buf.write(data);
        }
        if self.state == SendState::Ready {
            self.state = SendState::Sending;
        }
        if fin {
            self.fin_length = Some(self.buf.written());
        }
        Ok(())
    }

    pub fn update_peer_window(&mut self, max: u64) {
        // MAX_STREAM_DATA never regresses the window (spec §8 boundary behavior).
        self.peer_window = self.peer_window.max(max);
    }

    pub fn peer_window(&self) -> u64 {
        self.peer_window
    }

    /// Whether there is data the peer's flow-control window permits sending right now.
    pub fn has_sendable(&self) -> bool {
        !self.state.is_reset() && (!self.lost.is_empty() || (self.buf.sent() < self.peer_window && self.buf.has_pending()))
    }

    /// Draw up to `max_len` unsent bytes, respecting the peer's per-stream
    /// flow-control window and the `conn_budget` bytes the connection-level
    /// controller still permits this stream to consume fresh (spec §3:
    /// "per-stream outstanding bytes ≤ stream `max_stream_data`" and "total
    /// outstanding bytes across streams ≤ connection `max_data`").
    /// Retransmission of a lost range always takes priority over fresh data
    /// and ignores `conn_budget`, since it was already counted against both
    /// windows once. Returns the frame header (without data), the payload,
    /// and whether this was a retransmission (the caller must not re-count
    /// retransmitted bytes against the connection-level controller).
    pub fn emit(&mut self, max_len: usize, conn_budget: u64) -> Option<(StreamFrame, Bytes, bool)> {
        if self.state.is_reset() {
            return None;
        }
        while let Some((offset, len, is_fin)) = self.lost.front().copied() {
            if offset + len as u64 <= self.buf.acked_to() {
                // Acknowledged by a later ACK before the retransmit went out.
                self.lost.pop_front();
                continue;
            }
            let take = len.min(max_len);
            let Some(data) = self.buf.retransmit(offset, take) else {
                self.lost.pop_front();
                continue;
            };
            if take == len {
                self.lost.pop_front();
            } else {
                self.lost[0] = (offset + take as u64, len - take, is_fin);
            }
            return Some((StreamFrame::new(self.sid, offset, data.len(), is_fin && take == len), data, true));
        }
        let budget = self.peer_window.saturating_sub(self.buf.sent()).min(conn_budget);
        if budget == 0 {
            self.blocked_at = Some(self.peer_window);
            return None;
        }
        let (offset, data) = self.buf.pick_up(max_len.min(budget as usize))?;
        let is_fin = self.fin_length == Some(offset + data.len() as u64);
        if is_fin && self.state == SendState::Sending {
            self.state = SendState::DataSent;
        }
        Some((StreamFrame::new(self.sid, offset, data.len(), is_fin), data, false))
    }

    /// A packet carrying `[offset, offset+len)` of this stream's data was
    /// declared lost: queue it for re-emission ahead of fresh data (spec §4.4).
    pub fn queue_lost(&mut self, offset: u64, len: usize, is_fin: bool) {
        if len == 0 && !is_fin {
            return;
        }
        self.lost.push_back((offset, len, is_fin));
    }

    /// Whether a STREAM_DATA_BLOCKED should be (re-)emitted, and at what limit.
    pub fn blocked(&self) -> Option<u64> {
        self.blocked_at
    }

    pub fn clear_blocked(&mut self) {
        self.blocked_at = None;
    }

    /// Re-queue a previously-sent range for retransmission after loss.
    pub fn on_range_lost(&self, offset: u64, len: usize) -> Option<Bytes> {
        self.buf.retransmit(offset, len)
    }

    pub fn on_range_acked(&mut self, offset: u64, len: usize, is_fin: bool) {
        self.buf.ack(offset, offset + len as u64);
        if is_fin || self.buf.is_all_acked() && self.fin_length == Some(self.buf.acked_to()) {
            if matches!(self.state, SendState::DataSent) {
                self.state = SendState::DataRecvd;
            }
        }
    }

    /// Locally abort the send side: emits a RESET_STREAM.
    pub fn reset(&mut self, error_code: u64) -> ResetStreamFrame {
        let final_size = self.fin_length.unwrap_or(self.buf.written());
        self.state = SendState::ResetSent { error_code };
        ResetStreamFrame {
            stream_id: self.sid,
            app_error_code: qbase::varint::VarInt::try_from(error_code).unwrap_or(qbase::varint::VarInt::ZERO),
            final_size: qbase::varint::VarInt::try_from(final_size).unwrap_or(qbase::varint::VarInt::ZERO),
        }
    }

    pub fn on_reset_acked(&mut self) {
        if let SendState::ResetSent { error_code } = self.state {
            self.state = SendState::ResetRecvd { error_code };
        }
    }

    /// Handle an incoming STOP_SENDING: per the Open Questions, this implementation
    /// auto-responds with RESET_STREAM (see SPEC_FULL.md §4.2a); the caller is
    /// responsible for actually queuing the returned frame for transmission.
    pub fn on_stop_sending(&mut self, frame: &StopSendingFrame) -> Option<ResetStreamFrame> {
        if self.state.is_reset() {
            return None;
        }
        Some(self.reset(frame.app_error_code.into_inner()))
    }
}
