//! The receive half of a stream: reassembly, flow control, and FIN detection.

pub mod rcvbuf;

use bytes::{Bytes, BytesMut};
use qbase::{
    error::{ErrorKind, QuicError},
    frame::StreamFrame,
    sid::StreamId,
};

use self::rcvbuf::RecvBuf;

/// State of the remote (receiving) half of a stream.
///
/// See spec §4.2: `idle -> open -> half-closed-remote -> closed`, or directly
/// to a reset state on RESET_STREAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvState {
    Recv,
    /// FIN has been received; everything up to it may still be buffered out of order.
    SizeKnown,
    DataRecvd,
    /// The application has consumed every byte up to and including FIN.
    DataRead,
    ResetRecvd { error_code: u64 },
    ResetRead { error_code: u64 },
}

impl RecvState {
    pub fn is_closed(&self) -> bool {
        matches!(self, RecvState::DataRead | RecvState::ResetRead { .. })
    }
}

/// Outcome of delivering one STREAM frame, telling the caller what follow-up
/// work (if any) it must schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryEffect {
    /// New contiguous bytes became available to read.
    pub became_readable: bool,
    /// The stream's FIN has now been seen (not necessarily read yet).
    pub fin_reached: bool,
    /// An immediate ACK should be scheduled (spec §4.3 ACK-delay rule (a)/(b)).
    pub ack_immediately: bool,
}

/// The receive side of one stream.
#[derive(Debug)]
pub struct Recver {
    sid: StreamId,
    state: RecvState,
    buf: RecvBuf,
    /// Our advertised `max_stream_data` limit for data the peer sends us.
    window: u64,
    final_size: Option<u64>,
}

impl Recver {
    pub fn new(sid: StreamId, initial_window: u64) -> Self {
        Self {
            sid,
            state: RecvState::Recv,
            buf: RecvBuf::default(),
            window: initial_window,
            final_size: None,
        }
    }

    pub fn state(&self) -> RecvState {
        self.state
    }

    /// Whether contiguous, unread bytes are sitting in the receive buffer right now.
    pub fn is_readable(&self) -> bool {
        self.buf.is_readable()
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Deliver a STREAM frame's payload. Implements the delivery algorithm of
    /// spec §4.2 steps 2-5; duplicate/ignored data returns a no-op effect
    /// rather than an error.
    pub fn recv(&mut self, frame: &StreamFrame, data: Bytes) -> Result<DeliveryEffect, QuicError> {
        if self.state.is_closed() || matches!(self.state, RecvState::ResetRecvd { .. }) {
            return Ok(DeliveryEffect::default());
        }

        let offset = frame.offset.into_inner();
        let end = offset + frame.length as u64;

        if let Some(final_size) = self.final_size {
            if end > final_size || (frame.is_fin && end != final_size) {
                return Err(QuicError::with_default_fty(
                    ErrorKind::FinalSize,
                    format!("{:?}: stream data extends past its final size", self.sid),
                ));
            }
        }
        if end > self.window {
            return Err(QuicError::with_default_fty(
                ErrorKind::FlowControl,
                format!("{:?}: stream data exceeds the advertised max_stream_data", self.sid),
            ));
        }

        let was_readable = self.buf.is_readable();
        let gap_closed = !was_readable && end > self.buf.nread() && offset <= self.buf.nread();
        self.buf.recv(offset, data);

        let mut effect = DeliveryEffect {
            became_readable: self.buf.is_readable() && !was_readable,
            ack_immediately: gap_closed,
            fin_reached: false,
        };

        if frame.is_fin {
            self.final_size = Some(end);
            if matches!(self.state, RecvState::Recv) {
                self.state = RecvState::SizeKnown;
            }
        }

        if let Some(final_size) = self.final_size {
            if self.buf.nread() + self.buf.available() >= final_size && matches!(self.state, RecvState::SizeKnown) {
                self.state = RecvState::DataRecvd;
                effect.fin_reached = true;
                effect.ack_immediately = true;
            }
        }

        Ok(effect)
    }

    /// Try to read contiguous bytes into `dst`; returns the number of bytes read.
    pub fn try_read(&mut self, dst: &mut BytesMut) -> usize {
        let n = self.buf.try_read(dst);
        if matches!(self.state, RecvState::DataRecvd) && self.final_size == Some(self.buf.nread()) {
            self.state = RecvState::DataRead;
        }
        n
    }

    pub fn is_fin_delivered(&self) -> bool {
        matches!(self.state, RecvState::DataRecvd | RecvState::DataRead)
    }

    /// How much of the window is consumed; the caller uses this to decide
    /// whether to bump `max_stream_data` (spec §4.2 flow control: "at ≥ half").
    pub fn consumed_ratio(&self) -> (u64, u64) {
        (self.buf.nread(), self.window)
    }

    /// The highest stream offset received so far, used for connection-level
    /// flow control accounting (which counts received, not yet-read, bytes).
    pub fn largest_offset(&self) -> u64 {
        self.buf.largest_offset()
    }

    /// Increase (never decrease) our advertised window, returning the new value
    /// if it actually grew, for the caller to encode into a MAX_STREAM_DATA frame.
    pub fn maybe_grow_window(&mut self) -> Option<u64> {
        let (nread, window) = self.consumed_ratio();
        if nread * 2 >= window {
            let new_window = window.max(nread * 2).max(window + 1);
            self.window = new_window;
            Some(new_window)
        } else {
            None
        }
    }

    /// Receipt of a RESET_STREAM: per spec §4.2, moves the stream directly to closed.
    pub fn on_reset(&mut self, error_code: u64, final_size: u64) -> Result<(), QuicError> {
        if let Some(known) = self.final_size {
            if known != final_size {
                return Err(QuicError::with_default_fty(
                    ErrorKind::FinalSize,
                    format!("{:?}: RESET_STREAM final size disagrees with data already seen", self.sid),
                ));
            }
        }
        self.final_size = Some(final_size);
        self.state = RecvState::ResetRecvd { error_code };
        Ok(())
    }

    pub fn on_reset_read(&mut self) {
        if let RecvState::ResetRecvd { error_code } = self.state {
            self.state = RecvState::ResetRead { error_code };
        }
    }
}

#[cfg(test)]
mod tests {
    use qbase::sid::{Dir, Role};

    use super::*;

    fn sid() -> StreamId {
        StreamId::new(Role::Client, Dir::Bidi, 0)
    }

    #[test]
    fn reordered_frames_deliver_in_order_with_fin() {
        let mut recver = Recver::new(sid(), 1000);
        let second = StreamFrame::new(sid(), 3, 3, true);
        let effect = recver.recv(&second, Bytes::from_static(b"def")).unwrap();
        assert!(!effect.became_readable);

        let first = StreamFrame::new(sid(), 0, 3, false);
        let effect = recver.recv(&first, Bytes::from_static(b"abc")).unwrap();
        assert!(effect.became_readable);
        assert!(effect.fin_reached);

        let mut dst = BytesMut::new();
        recver.try_read(&mut dst);
        assert_eq!(&dst[..], b"abcdef");
        assert!(recver.is_fin_delivered());
    }

    #[test]
    fn zero_length_non_fin_is_noop() {
        let mut recver = Recver::new(sid(), 1000);
        let frame = StreamFrame::new(sid(), 0, 0, false);
        let effect = recver.recv(&frame, Bytes::new()).unwrap();
        assert_eq!(effect, DeliveryEffect::default());
    }

    #[test]
    fn exceeding_window_is_flow_control_error() {
        let mut recver = Recver::new(sid(), 10);
        let frame = StreamFrame::new(sid(), 5, 10, false);
        let err = recver.recv(&frame, Bytes::from_static(b"0123456789")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FlowControl);
    }
}
