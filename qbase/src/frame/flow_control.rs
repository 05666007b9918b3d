//! Connection-level flow control and token frames: MAX_DATA, DATA_BLOCKED, NEW_TOKEN.

use bytes::{BufMut, Bytes};

use super::{EncodeFrame, FrameType, GetFrameType, error::Error, io::WriteFrame};
use crate::varint::{VarInt, WriteVarInt, be_varint};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MaxDataFrame {
    pub max_data: VarInt,
}

impl GetFrameType for MaxDataFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::MaxData
    }
}

impl EncodeFrame for MaxDataFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8
    }

    fn encoding_size(&self) -> usize {
        1 + self.max_data.encoding_size()
    }
}

impl<T: BufMut> WriteFrame<MaxDataFrame> for T {
    fn put_frame(&mut self, frame: &MaxDataFrame) {
        self.put_u8(0x10);
        self.put_varint(&frame.max_data);
    }
}

pub fn be_max_data_frame(input: &[u8]) -> nom::IResult<&[u8], MaxDataFrame, Error> {
    let (remain, max_data) = be_varint(input)
        .map_err(|_| nom::Err::Error(Error::IncompleteType("MAX_DATA".into())))?;
    Ok((remain, MaxDataFrame { max_data }))
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DataBlockedFrame {
    pub limit: VarInt,
}

impl GetFrameType for DataBlockedFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::DataBlocked
    }
}

impl EncodeFrame for DataBlockedFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8
    }

    fn encoding_size(&self) -> usize {
        1 + self.limit.encoding_size()
    }
}

impl<T: BufMut> WriteFrame<DataBlockedFrame> for T {
    fn put_frame(&mut self, frame: &DataBlockedFrame) {
        self.put_u8(0x14);
        self.put_varint(&frame.limit);
    }
}

pub fn be_data_blocked_frame(input: &[u8]) -> nom::IResult<&[u8], DataBlockedFrame, Error> {
    let (remain, limit) = be_varint(input)
        .map_err(|_| nom::Err::Error(Error::IncompleteType("DATA_BLOCKED".into())))?;
    Ok((remain, DataBlockedFrame { limit }))
}

/// A token the server grants so a future connection attempt can skip address
/// validation. Opaque to this crate beyond its byte contents.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NewTokenFrame {
    pub token: Bytes,
}

impl GetFrameType for NewTokenFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::NewToken
    }
}

impl EncodeFrame for NewTokenFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8 + self.token.len()
    }

    fn encoding_size(&self) -> usize {
        1 + VarInt::try_from(self.token.len() as u64).unwrap().encoding_size() + self.token.len()
    }
}

impl<T: BufMut> WriteFrame<NewTokenFrame> for T {
    fn put_frame(&mut self, frame: &NewTokenFrame) {
        self.put_u8(0x07);
        self.put_varint(&VarInt::try_from(frame.token.len() as u64).expect("token too large"));
        self.put_slice(&frame.token);
    }
}

pub fn be_new_token_frame(input: &[u8]) -> nom::IResult<&[u8], NewTokenFrame, Error> {
    let (remain, len) =
        be_varint(input).map_err(|_| nom::Err::Error(Error::IncompleteType("NEW_TOKEN".into())))?;
    let len = len.into_inner() as usize;
    if remain.len() < len {
        return Err(nom::Err::Error(Error::IncompleteType("NEW_TOKEN token".into())));
    }
    let (token, remain) = remain.split_at(len);
    Ok((
        remain,
        NewTokenFrame {
            token: Bytes::copy_from_slice(token),
        },
    ))
}
