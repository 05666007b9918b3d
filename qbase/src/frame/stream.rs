//! STREAM frames: the only frame type whose wire form depends on how it's
//! being encoded (offset/length presence is chosen by the packer, not fixed
//! by the frame's own shape).

use bytes::{BufMut, Bytes};

use super::{EncodeFrame, FrameType, GetFrameType, error::Error, io::WriteFrame};
use crate::{
    sid::StreamId,
    varint::{VarInt, WriteVarInt, be_varint},
};

/// Upper bound on a STREAM frame header's encoding size: type + id + offset + length.
pub const STREAM_FRAME_MAX_ENCODING_SIZE: usize = 1 + 8 + 8 + 8;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct StreamFrame {
    pub stream_id: StreamId,
    pub offset: VarInt,
    pub length: usize,
    pub is_fin: bool,
}

impl StreamFrame {
    pub fn new(stream_id: StreamId, offset: u64, length: usize, is_fin: bool) -> Self {
        Self {
            stream_id,
            offset: VarInt::try_from(offset).expect("stream offsets fit a varint"),
            length,
            is_fin,
        }
    }
}

impl GetFrameType for StreamFrame {
    fn frame_type(&self) -> FrameType {
        let off = (self.offset.into_inner() != 0) as u8;
        let fin = self.is_fin as u8;
        // LEN is always set by this encoder; see [`EncodingStrategy`].
        FrameType::Stream(0b010 | (off << 2) | fin)
    }
}

impl EncodeFrame for StreamFrame {
    fn max_encoding_size(&self) -> usize {
        STREAM_FRAME_MAX_ENCODING_SIZE
    }

    fn encoding_size(&self) -> usize {
        let id: VarInt = self.stream_id.into();
        let len = VarInt::try_from(self.length as u64).expect("stream frame length fits a varint");
        1 + id.encoding_size()
            + if self.offset.into_inner() != 0 { self.offset.encoding_size() } else { 0 }
            + len.encoding_size()
    }
}

/// How a packer chooses to encode the offset/length bits of an outgoing
/// STREAM frame: offset is omitted only at offset 0, length is always
/// written explicitly so several STREAM frames can share a packet.
#[derive(Debug, Clone, Copy)]
pub struct EncodingStrategy;

impl<T: BufMut> WriteFrame<(StreamFrame, Bytes)> for T {
    fn put_frame(&mut self, (frame, data): &(StreamFrame, Bytes)) {
        let fty = frame.frame_type();
        let FrameType::Stream(bits) = fty else {
            unreachable!()
        };
        self.put_u8(0x08 | bits);
        self.put_varint(&frame.stream_id.into());
        if frame.offset.into_inner() != 0 {
            self.put_varint(&frame.offset);
        }
        self.put_varint(&VarInt::try_from(data.len() as u64).expect("stream data too long"));
        self.put_slice(data);
    }
}

pub fn be_stream_frame(bits: u8, input: &[u8]) -> nom::IResult<&[u8], (StreamFrame, Bytes), Error> {
    let has_off = bits & 0b100 != 0;
    let has_len = bits & 0b010 != 0;
    let is_fin = bits & 0b001 != 0;

    let (remain, id) = be_varint(input).map_err(|_| nom::Err::Error(Error::IncompleteType("STREAM id".into())))?;
    let (remain, offset) = if has_off {
        be_varint(remain).map_err(|_| nom::Err::Error(Error::IncompleteType("STREAM offset".into())))?
    } else {
        (remain, VarInt::from_u32(0))
    };
    let (data_bytes, remain) = if has_len {
        let (remain, len) =
            be_varint(remain).map_err(|_| nom::Err::Error(Error::IncompleteType("STREAM len".into())))?;
        let len = len.into_inner() as usize;
        if remain.len() < len {
            return Err(nom::Err::Error(Error::IncompleteType("STREAM data".into())));
        }
        let (data, remain) = remain.split_at(len);
        (data, remain)
    } else {
        // No explicit length: the STREAM data extends to the end of the packet.
        (remain, &remain[remain.len()..])
    };

    let frame = StreamFrame {
        stream_id: id.into(),
        offset,
        length: data_bytes.len(),
        is_fin,
    };
    Ok((remain, (frame, Bytes::copy_from_slice(data_bytes))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sid::{Dir, Role};

    #[test]
    fn roundtrip_with_offset_and_fin() {
        let id = StreamId::new(Role::Client, Dir::Bidi, 3);
        let frame = StreamFrame::new(id, 128, 5, true);
        let data = Bytes::from_static(b"hello");
        let mut buf = bytes::BytesMut::new();
        buf.put_frame(&(frame, data.clone()));
        let FrameType::Stream(bits) = frame.frame_type() else {
            unreachable!()
        };
        let (remain, (parsed, parsed_data)) = be_stream_frame(bits, &buf[1..]).unwrap();
        assert!(remain.is_empty());
        assert_eq!(parsed, frame);
        assert_eq!(parsed_data, data);
        assert!(parsed.is_fin);
    }

    #[test]
    fn zero_offset_is_omitted_on_wire() {
        let id = StreamId::new(Role::Client, Dir::Uni, 0);
        let frame = StreamFrame::new(id, 0, 3, false);
        let FrameType::Stream(bits) = frame.frame_type() else {
            unreachable!()
        };
        assert_eq!(bits & 0b100, 0);
    }
}
