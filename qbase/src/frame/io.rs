//! Frame encoding entry point (`WriteFrame`) and the type-dispatching decoder (`be_frame`).

use super::{
    FrameType,
    ack::be_ack_frame,
    close::be_connection_close_frame,
    conn_id::{be_new_connection_id_frame, be_retire_connection_id_frame},
    crypto::be_crypto_frame,
    error::Error,
    flow_control::{be_data_blocked_frame, be_max_data_frame, be_new_token_frame},
    path::{be_path_challenge_frame, be_path_response_frame},
    stream::be_stream_frame,
    stream_ctrl::{
        be_max_stream_data_frame, be_max_streams_frame, be_reset_stream_frame, be_stop_sending_frame,
        be_stream_data_blocked_frame, be_streams_blocked_frame,
    },
};
use crate::{
    frame::{Frame, StreamCtlFrame},
    packet::Type,
    varint::be_varint,
};

/// Encode a concrete frame value onto a buffer, writing its type byte(s) first.
pub trait WriteFrame<F> {
    fn put_frame(&mut self, frame: &F);
}

/// Parse one frame out of `input`, returning the number of bytes consumed,
/// the decoded [`Frame`], and its [`FrameType`].
///
/// `packet_type` is only used to disambiguate extension frames in callers
/// that layer a legality check on top; the bare decoder below does not
/// reject frames illegal for the given packet type, leaving that check to
/// [`FrameType::belongs_to`] at the call site.
pub fn be_frame(input: &[u8], _packet_type: Type) -> Result<(usize, Frame, FrameType), Error> {
    let origin_len = input.len();
    let (remain, raw_type) =
        be_varint(input).map_err(|_| Error::IncompleteType(format!("frame type from {input:?}")))?;
    let frame_type = FrameType::try_from(raw_type)?;

    let (remain, frame) = match frame_type {
        FrameType::Padding => (remain, Frame::Padding(super::simple::PaddingFrame)),
        FrameType::Ping => (remain, Frame::Ping(super::simple::PingFrame)),
        FrameType::Ack(ecn) => {
            let (r, f) = be_ack_frame(ecn == 1, remain)?;
            (r, Frame::Ack(f))
        }
        FrameType::ResetStream => {
            let (r, f) = be_reset_stream_frame(remain)?;
            (r, Frame::StreamCtl(StreamCtlFrame::ResetStream(f)))
        }
        FrameType::StopSending => {
            let (r, f) = be_stop_sending_frame(remain)?;
            (r, Frame::StreamCtl(StreamCtlFrame::StopSending(f)))
        }
        FrameType::Crypto => {
            let (r, (f, data)) = be_crypto_frame(remain)?;
            (r, Frame::Crypto(f, data))
        }
        FrameType::NewToken => {
            let (r, f) = be_new_token_frame(remain)?;
            (r, Frame::NewToken(f))
        }
        FrameType::Stream(bits) => {
            let (r, (f, data)) = be_stream_frame(bits, remain)?;
            (r, Frame::Stream(f, data))
        }
        FrameType::MaxData => {
            let (r, f) = be_max_data_frame(remain)?;
            (r, Frame::MaxData(f))
        }
        FrameType::MaxStreamData => {
            let (r, f) = be_max_stream_data_frame(remain)?;
            (r, Frame::StreamCtl(StreamCtlFrame::MaxStreamData(f)))
        }
        FrameType::MaxStreams(dir) => {
            let (r, f) = be_max_streams_frame(dir, remain)?;
            (r, Frame::StreamCtl(StreamCtlFrame::MaxStreams(f)))
        }
        FrameType::DataBlocked => {
            let (r, f) = be_data_blocked_frame(remain)?;
            (r, Frame::DataBlocked(f))
        }
        FrameType::StreamDataBlocked => {
            let (r, f) = be_stream_data_blocked_frame(remain)?;
            (r, Frame::StreamCtl(StreamCtlFrame::StreamDataBlocked(f)))
        }
        FrameType::StreamsBlocked(dir) => {
            let (r, f) = be_streams_blocked_frame(dir, remain)?;
            (r, Frame::StreamCtl(StreamCtlFrame::StreamsBlocked(f)))
        }
        FrameType::NewConnectionId => {
            let (r, f) = be_new_connection_id_frame(remain)?;
            (r, Frame::NewConnectionId(f))
        }
        FrameType::RetireConnectionId => {
            let (r, f) = be_retire_connection_id_frame(remain)?;
            (r, Frame::RetireConnectionId(f))
        }
        FrameType::PathChallenge => {
            let (r, f) = be_path_challenge_frame(remain)?;
            (r, Frame::Challenge(f))
        }
        FrameType::PathResponse => {
            let (r, f) = be_path_response_frame(remain)?;
            (r, Frame::Response(f))
        }
        FrameType::ConnectionClose(layer) => {
            let (r, f) = be_connection_close_frame(layer, remain)?;
            (r, Frame::Close(f))
        }
        FrameType::HandshakeDone => (remain, Frame::HandshakeDone(super::simple::HandshakeDoneFrame)),
    };

    let consumed = origin_len - remain.len();
    Ok((consumed, frame, frame_type))
}
