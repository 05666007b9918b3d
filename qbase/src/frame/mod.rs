//! QUIC frame types: wire encoding/decoding and the per-epoch legality table.
//!
//! A decoded packet payload is walked with [`FrameReader`], which yields one
//! [`Frame`] at a time. Header protection, AEAD and the UDP datagram itself
//! are handled upstream, by an external collaborator; this module only ever
//! sees a fully decrypted packet payload.

use std::fmt::Debug;

use bytes::{Buf, BufMut, Bytes};
use derive_more::{Deref, DerefMut};
use enum_dispatch::enum_dispatch;

use self::io::WriteFrame;
use crate::{packet::Type, varint::VarInt};

pub mod ack;
pub mod close;
pub mod conn_id;
pub mod crypto;
pub mod error;
pub mod flow_control;
pub mod io;
pub mod path;
pub mod simple;
pub mod stream;
pub mod stream_ctrl;

pub use ack::{AckFrame, EcnCounts};
pub use close::{AppCloseFrame, ConnectionCloseFrame, QuicCloseFrame};
pub use conn_id::{NewConnectionIdFrame, RetireConnectionIdFrame};
pub use crypto::CryptoFrame;
#[doc(hidden)]
pub use error::Error;
pub use flow_control::{DataBlockedFrame, MaxDataFrame, NewTokenFrame};
pub use path::{PathChallengeFrame, PathResponseFrame};
pub use simple::{HandshakeDoneFrame, PaddingFrame, PingFrame};
pub use stream::{EncodingStrategy, STREAM_FRAME_MAX_ENCODING_SIZE, StreamFrame};
pub use stream_ctrl::{
    MaxStreamDataFrame, MaxStreamsFrame, ResetStreamError, ResetStreamFrame, StopSendingFrame,
    StreamCtlFrame, StreamDataBlockedFrame, StreamsBlockedFrame,
};

/// Shared behavior every concrete frame type implements.
#[enum_dispatch]
pub trait GetFrameType: Debug {
    fn frame_type(&self) -> FrameType;
}

/// Size estimation for the packer: an upper bound it can use before a
/// frame's actual fields are known, and an exact size once they are.
#[enum_dispatch]
pub trait EncodeFrame {
    fn max_encoding_size(&self) -> usize {
        1
    }

    fn encoding_size(&self) -> usize {
        1
    }
}

/// Per-frame-type processing rules, see
/// [table-3](https://www.rfc-editor.org/rfc/rfc9000.html#table-3) of
/// [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html).
pub enum Spec {
    /// Packets containing only frames with this marking are not ack-eliciting.
    NonAckEliciting = 1,
    /// Packets containing only frames with this marking don't count as bytes
    /// in flight for congestion control.
    CongestionControlFree = 2,
    /// Frames with this marking may be sent to probe a new path.
    ProbeNewPath = 4,
    /// The contents of frames with this marking are flow controlled.
    FlowControlled = 8,
}

pub trait ContainSpec {
    fn contain(&self, spec: Spec) -> bool;
}

impl ContainSpec for u8 {
    fn contain(&self, spec: Spec) -> bool {
        *self & spec as u8 != 0
    }
}

/// The sum type of all frame types this transport core recognizes.
///
/// Variants that carry a bit pattern (`Ack`, `Stream`, `MaxStreams`,
/// `StreamsBlocked`, `ConnectionClose`) keep the low bits that distinguish
/// their wire encoding, mirroring [section-19](https://www.rfc-editor.org/rfc/rfc9000.html#section-19).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameType {
    Padding,
    Ping,
    Ack(u8),
    ResetStream,
    StopSending,
    Crypto,
    NewToken,
    Stream(u8),
    MaxData,
    MaxStreamData,
    MaxStreams(u8),
    DataBlocked,
    StreamDataBlocked,
    StreamsBlocked(u8),
    NewConnectionId,
    RetireConnectionId,
    PathChallenge,
    PathResponse,
    ConnectionClose(u8),
    HandshakeDone,
}

impl FrameType {
    /// Whether a packet of type `packet_type` is permitted to carry this frame,
    /// per the I/H/0/1 columns of table 3.
    pub fn belongs_to(&self, packet_type: Type) -> bool {
        use crate::packet::LongHeaderType;

        let i = matches!(packet_type, Type::Long(LongHeaderType::Initial));
        let h = matches!(packet_type, Type::Long(LongHeaderType::Handshake));
        let z = matches!(packet_type, Type::Long(LongHeaderType::ZeroRtt));
        let o = matches!(packet_type, Type::Short);

        match self {
            FrameType::Padding | FrameType::Ping => i | h | z | o,
            FrameType::Ack(_) | FrameType::Crypto => i | h | o,
            FrameType::ConnectionClose(layer) => {
                if *layer == 0 { i | h | z | o } else { z | o }
            }
            FrameType::NewToken | FrameType::HandshakeDone | FrameType::PathResponse => o,
            _ => z | o,
        }
    }

    pub fn specs(&self) -> u8 {
        let (n, c, p, f) = (
            Spec::NonAckEliciting as u8,
            Spec::CongestionControlFree as u8,
            Spec::ProbeNewPath as u8,
            Spec::FlowControlled as u8,
        );
        match self {
            FrameType::Padding => n | p,
            FrameType::Ack(_) => n | c,
            FrameType::Stream(_) => f,
            FrameType::NewConnectionId | FrameType::PathChallenge | FrameType::PathResponse => p,
            FrameType::ConnectionClose(_) => n | c,
            _ => 0,
        }
    }
}

impl TryFrom<VarInt> for FrameType {
    type Error = Error;

    fn try_from(frame_type: VarInt) -> Result<Self, Self::Error> {
        Ok(match frame_type.into_inner() {
            0x00 => FrameType::Padding,
            0x01 => FrameType::Ping,
            ty @ (0x02 | 0x03) => FrameType::Ack(ty as u8 & 0b1),
            0x04 => FrameType::ResetStream,
            0x05 => FrameType::StopSending,
            0x06 => FrameType::Crypto,
            0x07 => FrameType::NewToken,
            ty @ 0x08..=0x0f => FrameType::Stream(ty as u8 & 0b111),
            0x10 => FrameType::MaxData,
            0x11 => FrameType::MaxStreamData,
            ty @ (0x12 | 0x13) => FrameType::MaxStreams(ty as u8 & 0b1),
            0x14 => FrameType::DataBlocked,
            0x15 => FrameType::StreamDataBlocked,
            ty @ (0x16 | 0x17) => FrameType::StreamsBlocked(ty as u8 & 0b1),
            0x18 => FrameType::NewConnectionId,
            0x19 => FrameType::RetireConnectionId,
            0x1a => FrameType::PathChallenge,
            0x1b => FrameType::PathResponse,
            ty @ (0x1c | 0x1d) => FrameType::ConnectionClose(ty as u8 & 0x1),
            0x1e => FrameType::HandshakeDone,
            _ => return Err(Error::InvalidType(frame_type)),
        })
    }
}

impl From<FrameType> for VarInt {
    fn from(frame_type: FrameType) -> Self {
        match frame_type {
            FrameType::Padding => VarInt::from_u32(0x00),
            FrameType::Ping => VarInt::from_u32(0x01),
            FrameType::Ack(ecn) => VarInt::from(0x02 | ecn),
            FrameType::ResetStream => VarInt::from_u32(0x04),
            FrameType::StopSending => VarInt::from_u32(0x05),
            FrameType::Crypto => VarInt::from_u32(0x06),
            FrameType::NewToken => VarInt::from_u32(0x07),
            FrameType::Stream(flag) => VarInt::from(0x08 | flag),
            FrameType::MaxData => VarInt::from_u32(0x10),
            FrameType::MaxStreamData => VarInt::from_u32(0x11),
            FrameType::MaxStreams(dir) => VarInt::from(0x12 | dir),
            FrameType::DataBlocked => VarInt::from_u32(0x14),
            FrameType::StreamDataBlocked => VarInt::from_u32(0x15),
            FrameType::StreamsBlocked(dir) => VarInt::from(0x16 | dir),
            FrameType::NewConnectionId => VarInt::from_u32(0x18),
            FrameType::RetireConnectionId => VarInt::from_u32(0x19),
            FrameType::PathChallenge => VarInt::from_u32(0x1a),
            FrameType::PathResponse => VarInt::from_u32(0x1b),
            FrameType::ConnectionClose(layer) => VarInt::from(0x1c | layer),
            FrameType::HandshakeDone => VarInt::from_u32(0x1e),
        }
    }
}

/// Sum type of all the frames. Variants carrying application data keep the
/// frame's fixed fields and the payload [`Bytes`] separately, so the payload
/// can be handed off without copying.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Frame {
    Padding(PaddingFrame),
    Ping(PingFrame),
    Ack(AckFrame),
    Close(ConnectionCloseFrame),
    NewToken(NewTokenFrame),
    MaxData(MaxDataFrame),
    DataBlocked(DataBlockedFrame),
    NewConnectionId(NewConnectionIdFrame),
    RetireConnectionId(RetireConnectionIdFrame),
    HandshakeDone(HandshakeDoneFrame),
    Challenge(PathChallengeFrame),
    Response(PathResponseFrame),
    StreamCtl(StreamCtlFrame),
    Stream(StreamFrame, Bytes),
    Crypto(CryptoFrame, Bytes),
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Padding(f) => f.frame_type(),
            Frame::Ping(f) => f.frame_type(),
            Frame::Ack(f) => f.frame_type(),
            Frame::Close(f) => f.frame_type(),
            Frame::NewToken(f) => f.frame_type(),
            Frame::MaxData(f) => f.frame_type(),
            Frame::DataBlocked(f) => f.frame_type(),
            Frame::NewConnectionId(f) => f.frame_type(),
            Frame::RetireConnectionId(f) => f.frame_type(),
            Frame::HandshakeDone(f) => f.frame_type(),
            Frame::Challenge(f) => f.frame_type(),
            Frame::Response(f) => f.frame_type(),
            Frame::StreamCtl(f) => f.frame_type(),
            Frame::Stream(f, _) => f.frame_type(),
            Frame::Crypto(f, _) => f.frame_type(),
        }
    }
}

/// Frames this endpoint must keep retransmitting until acknowledged, tracked
/// outside of any one stream's send buffer (the stream-data frames retransmit
/// out of the stream's own buffer instead).
#[derive(Debug, Clone, Eq, PartialEq)]
#[enum_dispatch(EncodeFrame, GetFrameType)]
pub enum ReliableFrame {
    NewToken(NewTokenFrame),
    MaxData(MaxDataFrame),
    DataBlocked(DataBlockedFrame),
    NewConnectionId(NewConnectionIdFrame),
    RetireConnectionId(RetireConnectionIdFrame),
    HandshakeDone(HandshakeDoneFrame),
    Stream(StreamCtlFrame),
    Challenge(PathChallengeFrame),
    Response(PathResponseFrame),
}

impl From<ReliableFrame> for Frame {
    fn from(frame: ReliableFrame) -> Self {
        match frame {
            ReliableFrame::NewToken(f) => Frame::NewToken(f),
            ReliableFrame::MaxData(f) => Frame::MaxData(f),
            ReliableFrame::DataBlocked(f) => Frame::DataBlocked(f),
            ReliableFrame::NewConnectionId(f) => Frame::NewConnectionId(f),
            ReliableFrame::RetireConnectionId(f) => Frame::RetireConnectionId(f),
            ReliableFrame::HandshakeDone(f) => Frame::HandshakeDone(f),
            ReliableFrame::Stream(f) => Frame::StreamCtl(f),
            ReliableFrame::Challenge(f) => Frame::Challenge(f),
            ReliableFrame::Response(f) => Frame::Response(f),
        }
    }
}

/// A component that originates frames of type `T` and wants them queued for
/// sending (e.g. a stream wanting to send MAX_STREAM_DATA).
pub trait SendFrame<T> {
    fn send_frame<I: IntoIterator<Item = T>>(&self, iter: I);
}

/// A component that consumes frames of type `T` arriving from the peer.
pub trait ReceiveFrame<T> {
    type Output;

    fn recv_frame(&self, frame: &T) -> Result<Self::Output, crate::error::Error>;
}

/// Walks a decrypted packet payload, yielding one frame at a time.
#[derive(Deref, DerefMut)]
pub struct FrameReader {
    #[deref]
    #[deref_mut]
    payload: Bytes,
    packet_type: Type,
}

impl FrameReader {
    pub fn new(payload: Bytes, packet_type: Type) -> Self {
        Self { payload, packet_type }
    }
}

impl Iterator for FrameReader {
    type Item = Result<(Frame, FrameType), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.payload.is_empty() {
            return None;
        }
        match io::be_frame(&self.payload, self.packet_type) {
            Ok((consumed, frame, frame_type)) => {
                self.payload.advance(consumed);
                Some(Ok((frame, frame_type)))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl<T: BufMut> WriteFrame<ReliableFrame> for T {
    fn put_frame(&mut self, frame: &ReliableFrame) {
        match frame {
            ReliableFrame::NewToken(f) => self.put_frame(f),
            ReliableFrame::MaxData(f) => self.put_frame(f),
            ReliableFrame::DataBlocked(f) => self.put_frame(f),
            ReliableFrame::NewConnectionId(f) => self.put_frame(f),
            ReliableFrame::RetireConnectionId(f) => self.put_frame(f),
            ReliableFrame::HandshakeDone(f) => self.put_frame(f),
            ReliableFrame::Stream(f) => self.put_frame(f),
            ReliableFrame::Challenge(f) => self.put_frame(f),
            ReliableFrame::Response(f) => self.put_frame(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;

    #[test]
    fn frame_type_roundtrips_through_varint() {
        let types = [
            FrameType::Padding,
            FrameType::Ping,
            FrameType::Ack(0),
            FrameType::Ack(1),
            FrameType::Stream(0b101),
            FrameType::MaxData,
            FrameType::ConnectionClose(1),
            FrameType::HandshakeDone,
        ];
        for ty in types {
            let varint: VarInt = ty.into();
            assert_eq!(FrameType::try_from(varint).unwrap(), ty);
        }
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(FrameType::try_from(VarInt::from_u32(0xff)).is_err());
    }

    #[test]
    fn initial_packets_reject_stream_frames() {
        assert!(!FrameType::Stream(0).belongs_to(Type::Long(crate::packet::LongHeaderType::Initial)));
        assert!(FrameType::Crypto.belongs_to(Type::Long(crate::packet::LongHeaderType::Initial)));
    }

    #[test]
    fn frame_reader_walks_padding_then_ping() {
        let mut buf = bytes::BytesMut::new();
        buf.put_u8(0x00);
        buf.put_u8(0x01);
        let mut reader = FrameReader::new(buf.freeze(), Type::Short);

        let (frame, ty) = reader.next().unwrap().unwrap();
        assert!(matches!(frame, Frame::Padding(_)));
        assert!(ty.specs().contain(Spec::NonAckEliciting));

        let (frame, _) = reader.next().unwrap().unwrap();
        assert!(matches!(frame, Frame::Ping(_)));

        assert!(reader.next().is_none());
    }
}
