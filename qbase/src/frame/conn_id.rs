//! NEW_CONNECTION_ID and RETIRE_CONNECTION_ID frames.

use bytes::BufMut;

use super::{EncodeFrame, FrameType, GetFrameType, error::Error, io::WriteFrame};
use crate::{
    cid::ConnectionId,
    varint::{VarInt, WriteVarInt, be_varint},
};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct NewConnectionIdFrame {
    pub sequence: VarInt,
    pub retire_prior_to: VarInt,
    pub cid: ConnectionId,
    pub reset_token: [u8; 16],
}

impl GetFrameType for NewConnectionIdFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::NewConnectionId
    }
}

impl EncodeFrame for NewConnectionIdFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8 + 8 + 1 + 20 + 16
    }

    fn encoding_size(&self) -> usize {
        1 + self.sequence.encoding_size()
            + self.retire_prior_to.encoding_size()
            + 1
            + self.cid.len()
            + 16
    }
}

impl<T: BufMut> WriteFrame<NewConnectionIdFrame> for T {
    fn put_frame(&mut self, frame: &NewConnectionIdFrame) {
        self.put_u8(0x18);
        self.put_varint(&frame.sequence);
        self.put_varint(&frame.retire_prior_to);
        self.put_u8(frame.cid.len() as u8);
        self.put_slice(frame.cid.as_slice());
        self.put_slice(&frame.reset_token);
    }
}

pub fn be_new_connection_id_frame(input: &[u8]) -> nom::IResult<&[u8], NewConnectionIdFrame, Error> {
    let (remain, sequence) =
        be_varint(input).map_err(|_| nom::Err::Error(Error::IncompleteType("NCID seq".into())))?;
    let (remain, retire_prior_to) =
        be_varint(remain).map_err(|_| nom::Err::Error(Error::IncompleteType("NCID rpt".into())))?;
    if remain.is_empty() {
        return Err(nom::Err::Error(Error::IncompleteType("NCID len".into())));
    }
    let cid_len = remain[0] as usize;
    let remain = &remain[1..];
    if remain.len() < cid_len + 16 {
        return Err(nom::Err::Error(Error::IncompleteType("NCID body".into())));
    }
    let (cid_bytes, remain) = remain.split_at(cid_len);
    let (token_bytes, remain) = remain.split_at(16);
    let mut reset_token = [0u8; 16];
    reset_token.copy_from_slice(token_bytes);
    Ok((
        remain,
        NewConnectionIdFrame {
            sequence,
            retire_prior_to,
            cid: ConnectionId::from_slice(cid_bytes),
            reset_token,
        },
    ))
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RetireConnectionIdFrame {
    pub sequence: VarInt,
}

impl GetFrameType for RetireConnectionIdFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::RetireConnectionId
    }
}

impl EncodeFrame for RetireConnectionIdFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8
    }

    fn encoding_size(&self) -> usize {
        1 + self.sequence.encoding_size()
    }
}

impl<T: BufMut> WriteFrame<RetireConnectionIdFrame> for T {
    fn put_frame(&mut self, frame: &RetireConnectionIdFrame) {
        self.put_u8(0x19);
        self.put_varint(&frame.sequence);
    }
}

pub fn be_retire_connection_id_frame(input: &[u8]) -> nom::IResult<&[u8], RetireConnectionIdFrame, Error> {
    let (remain, sequence) =
        be_varint(input).map_err(|_| nom::Err::Error(Error::IncompleteType("RCID".into())))?;
    Ok((remain, RetireConnectionIdFrame { sequence }))
}
