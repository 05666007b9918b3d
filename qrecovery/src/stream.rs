//! A full-duplex QUIC stream: the combination of a [`Sender`] and a [`Recver`].

use bytes::{Bytes, BytesMut};
use qbase::{
    frame::{ResetStreamFrame, StopSendingFrame, StreamCtlFrame, StreamDataBlockedFrame, StreamFrame},
    sid::StreamId,
};

use crate::{
    recv::{DeliveryEffect, Recver},
    send::Sender,
};

/// One bidirectional (or the relevant half of a unidirectional) stream.
///
/// A uni stream only ever uses one half; the owning stream map is
/// responsible for not exposing the unused half's API to applications.
#[derive(Debug)]
pub struct Stream {
    sid: StreamId,
    sender: Sender,
    recver: Recver,
}

impl Stream {
    pub fn new(sid: StreamId, initial_peer_window: u64, initial_local_window: u64) -> Self {
        Self {
            sid,
            sender: Sender::new(sid, initial_peer_window),
            recver: Recver::new(sid, initial_local_window),
        }
    }

    pub fn sid(&self) -> StreamId {
        self.sid
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn sender_mut(&mut self) -> &mut Sender {
        &mut self.sender
    }

    pub fn recver(&self) -> &Recver {
        &self.recver
    }

    pub fn recver_mut(&mut self) -> &mut Recver {
        &mut self.recver
    }

    pub fn write(&mut self, data: Bytes, fin: bool) -> Result<(), qbase::error::QuicError> {
        self.sender.write(data, fin)
    }

    pub fn emit(&mut self, max_len: usize, conn_budget: u64) -> Option<(StreamFrame, Bytes, bool)> {
        self.sender.emit(max_len, conn_budget)
    }

    pub fn recv(&mut self, frame: &StreamFrame, data: Bytes) -> Result<DeliveryEffect, qbase::error::QuicError> {
        self.recver.recv(frame, data)
    }

    pub fn try_read(&mut self, dst: &mut BytesMut) -> usize {
        self.recver.try_read(dst)
    }

    /// A STREAM_DATA_BLOCKED to (re-)emit if this stream's send side is
    /// currently limited by the peer's `max_stream_data` (spec §4.2 flow
    /// control, scenario 5's "STREAM_DATA_BLOCKED emitted").
    pub fn stream_data_blocked(&self) -> Option<StreamDataBlockedFrame> {
        self.sender.blocked().map(|limit| StreamDataBlockedFrame {
            stream_id: self.sid,
            max_stream_data: qbase::varint::VarInt::try_from(limit).unwrap_or(qbase::varint::VarInt::ZERO),
        })
    }

    /// Abort the send half locally, returning the RESET_STREAM to transmit.
    pub fn reset(&mut self, error_code: u64) -> ResetStreamFrame {
        self.sender.reset(error_code)
    }

    /// Ask the peer to stop sending, returning the STOP_SENDING to transmit.
    pub fn stop_sending(&self, error_code: u64) -> StopSendingFrame {
        StopSendingFrame {
            stream_id: self.sid,
            app_error_code: qbase::varint::VarInt::try_from(error_code).unwrap_or(qbase::varint::VarInt::ZERO),
        }
    }

    /// Whether both halves have reached a terminal state and the stream's
    /// bookkeeping can be dropped from the owning stream map.
    pub fn is_finished(&self) -> bool {
        self.sender.state().is_terminal() && self.recver.state().is_closed()
    }

    /// Dispatch a stream-control frame (everything except STREAM itself) to
    /// whichever half it concerns. Returns a frame to send back, if the
    /// handling implies one (per spec §4.2a, STOP_SENDING auto-resets).
    pub fn on_ctrl_frame(&mut self, frame: &StreamCtlFrame) -> Result<Option<StreamCtlFrame>, qbase::error::QuicError> {
        match frame {
            StreamCtlFrame::ResetStream(f) => {
                self.recver.on_reset(f.app_error_code.into_inner(), f.final_size.into_inner())?;
                Ok(None)
            }
            StreamCtlFrame::StopSending(f) => Ok(self.sender.on_stop_sending(f).map(StreamCtlFrame::ResetStream)),
            StreamCtlFrame::MaxStreamData(f) => {
                self.sender.update_peer_window(f.max_stream_data.into_inner());
                Ok(None)
            }
            StreamCtlFrame::StreamDataBlocked(_) => Ok(None),
            StreamCtlFrame::MaxStreams(_) | StreamCtlFrame::StreamsBlocked(_) => Ok(None),
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
    fn write_then_emit_round_trips_into_a_peer_stream() {
        let mut local = Stream::new(sid(), 1 << 16, 1 << 16);
        local.write(Bytes::from_static(b"hello"), true).unwrap();
        let (frame, data) = local.emit(1200, 1 << 16).map(|(f, d, _)| (f, d)).unwrap();
        assert!(frame.is_fin);

        let mut remote = Stream::new(sid(), 1 << 16, 1 << 16);
        let effect = remote.recv(&frame, data).unwrap();
        assert!(effect.fin_reached);
        let mut out = BytesMut::new();
        assert_eq!(remote.try_read(&mut out), 5);
        assert_eq!(&out[..], b"hello");
    }

    /// Per SPEC_FULL.md §4.2a: receiving STOP_SENDING auto-emits a RESET_STREAM
    /// in response, resolving the spec's Open Question.
    #[test]
    fn stop_sending_auto_resets_the_send_half() {
        let mut local = Stream::new(sid(), 1 << 16, 1 << 16);
        local.write(Bytes::from_static(b"partial"), false).unwrap();
        let stop = StopSendingFrame {
            stream_id: sid(),
            app_error_code: qbase::varint::VarInt::from_u32(7),
        };
        let reply = local.on_ctrl_frame(&StreamCtlFrame::StopSending(stop)).unwrap();
        assert!(matches!(reply, Some(StreamCtlFrame::ResetStream(_))));
        assert!(matches!(local.sender().state(), crate::send::SendState::ResetSent { error_code: 7 }));
    }

    #[test]
    fn reset_stream_moves_recv_half_directly_to_closed() {
        let mut remote = Stream::new(sid(), 1 << 16, 1 << 16);
        let reset = ResetStreamFrame {
            stream_id: sid(),
            app_error_code: qbase::varint::VarInt::from_u32(1),
            final_size: qbase::varint::VarInt::from_u32(0),
        };
        remote.on_ctrl_frame(&StreamCtlFrame::ResetStream(reset)).unwrap();
        assert!(matches!(
            remote.recver().state(),
            crate::recv::RecvState::ResetRecvd { error_code: 1 }
        ));
    }
}
