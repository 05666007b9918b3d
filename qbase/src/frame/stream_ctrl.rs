//! Per-stream control frames that carry no stream data of their own.

use bytes::BufMut;
use enum_dispatch::enum_dispatch;

use super::{EncodeFrame, FrameType, GetFrameType, error::Error, io::WriteFrame};
use crate::{
    sid::{Dir, StreamId},
    varint::{VarInt, WriteVarInt, be_varint},
};

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[error("application error code {0}")]
pub struct ResetStreamError(pub VarInt);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ResetStreamFrame {
    pub stream_id: StreamId,
    pub app_error_code: VarInt,
    pub final_size: VarInt,
}

impl GetFrameType for ResetStreamFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::ResetStream
    }
}

impl EncodeFrame for ResetStreamFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8 + 8 + 8
    }

    fn encoding_size(&self) -> usize {
        let id: VarInt = self.stream_id.into();
        1 + id.encoding_size() + self.app_error_code.encoding_size() + self.final_size.encoding_size()
    }
}

impl<T: BufMut> WriteFrame<ResetStreamFrame> for T {
    fn put_frame(&mut self, frame: &ResetStreamFrame) {
        self.put_u8(0x04);
        self.put_varint(&frame.stream_id.into());
        self.put_varint(&frame.app_error_code);
        self.put_varint(&frame.final_size);
    }
}

pub fn be_reset_stream_frame(input: &[u8]) -> nom::IResult<&[u8], ResetStreamFrame, Error> {
    let (remain, id) = be_varint(input).map_err(|_| nom::Err::Error(Error::IncompleteType("RESET_STREAM id".into())))?;
    let (remain, app_error_code) =
        be_varint(remain).map_err(|_| nom::Err::Error(Error::IncompleteType("RESET_STREAM code".into())))?;
    let (remain, final_size) =
        be_varint(remain).map_err(|_| nom::Err::Error(Error::IncompleteType("RESET_STREAM size".into())))?;
    Ok((
        remain,
        ResetStreamFrame {
            stream_id: id.into(),
            app_error_code,
            final_size,
        },
    ))
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct StopSendingFrame {
    pub stream_id: StreamId,
    pub app_error_code: VarInt,
}

impl GetFrameType for StopSendingFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::StopSending
    }
}

impl EncodeFrame for StopSendingFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8 + 8
    }

    fn encoding_size(&self) -> usize {
        let id: VarInt = self.stream_id.into();
        1 + id.encoding_size() + self.app_error_code.encoding_size()
    }
}

impl<T: BufMut> WriteFrame<StopSendingFrame> for T {
    fn put_frame(&mut self, frame: &StopSendingFrame) {
        self.put_u8(0x05);
        self.put_varint(&frame.stream_id.into());
        self.put_varint(&frame.app_error_code);
    }
}

pub fn be_stop_sending_frame(input: &[u8]) -> nom::IResult<&[u8], StopSendingFrame, Error> {
    let (remain, id) = be_varint(input).map_err(|_| nom::Err::Error(Error::IncompleteType("STOP_SENDING id".into())))?;
    let (remain, app_error_code) =
        be_varint(remain).map_err(|_| nom::Err::Error(Error::IncompleteType("STOP_SENDING code".into())))?;
    Ok((
        remain,
        StopSendingFrame {
            stream_id: id.into(),
            app_error_code,
        },
    ))
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MaxStreamDataFrame {
    pub stream_id: StreamId,
    pub max_stream_data: VarInt,
}

impl GetFrameType for MaxStreamDataFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::MaxStreamData
    }
}

impl EncodeFrame for MaxStreamDataFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8 + 8
    }

    fn encoding_size(&self) -> usize {
        let id: VarInt = self.stream_id.into();
        1 + id.encoding_size() + self.max_stream_data.encoding_size()
    }
}

impl<T: BufMut> WriteFrame<MaxStreamDataFrame> for T {
    fn put_frame(&mut self, frame: &MaxStreamDataFrame) {
        self.put_u8(0x11);
        self.put_varint(&frame.stream_id.into());
        self.put_varint(&frame.max_stream_data);
    }
}

pub fn be_max_stream_data_frame(input: &[u8]) -> nom::IResult<&[u8], MaxStreamDataFrame, Error> {
    let (remain, id) =
        be_varint(input).map_err(|_| nom::Err::Error(Error::IncompleteType("MAX_STREAM_DATA id".into())))?;
    let (remain, max_stream_data) =
        be_varint(remain).map_err(|_| nom::Err::Error(Error::IncompleteType("MAX_STREAM_DATA max".into())))?;
    Ok((
        remain,
        MaxStreamDataFrame {
            stream_id: id.into(),
            max_stream_data,
        },
    ))
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MaxStreamsFrame {
    pub dir: Dir,
    pub max_streams: VarInt,
}

impl GetFrameType for MaxStreamsFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::MaxStreams(if self.dir == Dir::Uni { 1 } else { 0 })
    }
}

impl EncodeFrame for MaxStreamsFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8
    }

    fn encoding_size(&self) -> usize {
        1 + self.max_streams.encoding_size()
    }
}

impl<T: BufMut> WriteFrame<MaxStreamsFrame> for T {
    fn put_frame(&mut self, frame: &MaxStreamsFrame) {
        self.put_u8(if frame.dir == Dir::Uni { 0x13 } else { 0x12 });
        self.put_varint(&frame.max_streams);
    }
}

pub fn be_max_streams_frame(dir_bit: u8, input: &[u8]) -> nom::IResult<&[u8], MaxStreamsFrame, Error> {
    let (remain, max_streams) =
        be_varint(input).map_err(|_| nom::Err::Error(Error::IncompleteType("MAX_STREAMS".into())))?;
    let dir = if dir_bit == 1 { Dir::Uni } else { Dir::Bidi };
    Ok((remain, MaxStreamsFrame { dir, max_streams }))
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct StreamDataBlockedFrame {
    pub stream_id: StreamId,
    pub max_stream_data: VarInt,
}

impl GetFrameType for StreamDataBlockedFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::StreamDataBlocked
    }
}

impl EncodeFrame for StreamDataBlockedFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8 + 8
    }

    fn encoding_size(&self) -> usize {
        let id: VarInt = self.stream_id.into();
        1 + id.encoding_size() + self.max_stream_data.encoding_size()
    }
}

impl<T: BufMut> WriteFrame<StreamDataBlockedFrame> for T {
    fn put_frame(&mut self, frame: &StreamDataBlockedFrame) {
        self.put_u8(0x15);
        self.put_varint(&frame.stream_id.into());
        self.put_varint(&frame.max_stream_data);
    }
}

pub fn be_stream_data_blocked_frame(input: &[u8]) -> nom::IResult<&[u8], StreamDataBlockedFrame, Error> {
    let (remain, id) =
        be_varint(input).map_err(|_| nom::Err::Error(Error::IncompleteType("STREAM_DATA_BLOCKED id".into())))?;
    let (remain, max_stream_data) =
        be_varint(remain).map_err(|_| nom::Err::Error(Error::IncompleteType("STREAM_DATA_BLOCKED max".into())))?;
    Ok((
        remain,
        StreamDataBlockedFrame {
            stream_id: id.into(),
            max_stream_data,
        },
    ))
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct StreamsBlockedFrame {
    pub dir: Dir,
    pub max_streams: VarInt,
}

impl GetFrameType for StreamsBlockedFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::StreamsBlocked(if self.dir == Dir::Uni { 1 } else { 0 })
    }
}

impl EncodeFrame for StreamsBlockedFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8
    }

    fn encoding_size(&self) -> usize {
        1 + self.max_streams.encoding_size()
    }
}

impl<T: BufMut> WriteFrame<StreamsBlockedFrame> for T {
    fn put_frame(&mut self, frame: &StreamsBlockedFrame) {
        self.put_u8(if frame.dir == Dir::Uni { 0x17 } else { 0x16 });
        self.put_varint(&frame.max_streams);
    }
}

pub fn be_streams_blocked_frame(dir_bit: u8, input: &[u8]) -> nom::IResult<&[u8], StreamsBlockedFrame, Error> {
    let (remain, max_streams) =
        be_varint(input).map_err(|_| nom::Err::Error(Error::IncompleteType("STREAMS_BLOCKED".into())))?;
    let dir = if dir_bit == 1 { Dir::Uni } else { Dir::Bidi };
    Ok((remain, StreamsBlockedFrame { dir, max_streams }))
}

/// Sum type of all the stream-control frames (everything stream-related
/// except [`super::stream::StreamFrame`] itself, which carries a data payload).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[enum_dispatch(EncodeFrame, GetFrameType)]
pub enum StreamCtlFrame {
    ResetStream(ResetStreamFrame),
    StopSending(StopSendingFrame),
    MaxStreamData(MaxStreamDataFrame),
    MaxStreams(MaxStreamsFrame),
    StreamDataBlocked(StreamDataBlockedFrame),
    StreamsBlocked(StreamsBlockedFrame),
}

impl<T: BufMut> WriteFrame<StreamCtlFrame> for T {
    fn put_frame(&mut self, frame: &StreamCtlFrame) {
        match frame {
            StreamCtlFrame::ResetStream(f) => self.put_frame(f),
            StreamCtlFrame::StopSending(f) => self.put_frame(f),
            StreamCtlFrame::MaxStreamData(f) => self.put_frame(f),
            StreamCtlFrame::MaxStreams(f) => self.put_frame(f),
            StreamCtlFrame::StreamDataBlocked(f) => self.put_frame(f),
            StreamCtlFrame::StreamsBlocked(f) => self.put_frame(f),
        }
    }
}
