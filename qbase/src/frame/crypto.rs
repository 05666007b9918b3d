//! CRYPTO frames: carry handshake bytes produced/consumed by the external
//! TLS collaborator, addressed by an offset in that epoch's crypto stream.

use bytes::{BufMut, Bytes};

use super::{EncodeFrame, FrameType, GetFrameType, error::Error, io::WriteFrame};
use crate::varint::{VarInt, WriteVarInt, be_varint};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CryptoFrame {
    pub offset: VarInt,
    pub length: usize,
}

impl CryptoFrame {
    pub fn new(offset: u64, length: usize) -> Self {
        Self {
            offset: VarInt::try_from(offset).expect("crypto offsets fit a varint"),
            length,
        }
    }
}

impl GetFrameType for CryptoFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::Crypto
    }
}

impl EncodeFrame for CryptoFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8 + 8
    }

    fn encoding_size(&self) -> usize {
        let len = VarInt::try_from(self.length as u64).expect("crypto frame length fits a varint");
        1 + self.offset.encoding_size() + len.encoding_size()
    }
}

impl<T: BufMut> WriteFrame<(CryptoFrame, Bytes)> for T {
    fn put_frame(&mut self, (frame, data): &(CryptoFrame, Bytes)) {
        self.put_u8(0x06);
        self.put_varint(&frame.offset);
        self.put_varint(&VarInt::try_from(data.len() as u64).expect("crypto data too long"));
        self.put_slice(data);
    }
}

pub fn be_crypto_frame(input: &[u8]) -> nom::IResult<&[u8], (CryptoFrame, Bytes), Error> {
    let (remain, offset) =
        be_varint(input).map_err(|_| nom::Err::Error(Error::IncompleteType("CRYPTO offset".into())))?;
    let (remain, len) =
        be_varint(remain).map_err(|_| nom::Err::Error(Error::IncompleteType("CRYPTO len".into())))?;
    let len = len.into_inner() as usize;
    if remain.len() < len {
        return Err(nom::Err::Error(Error::IncompleteType("CRYPTO data".into())));
    }
    let (data, remain) = remain.split_at(len);
    Ok((
        remain,
        (CryptoFrame { offset, length: len }, Bytes::copy_from_slice(data)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = Bytes::from_static(b"client hello");
        let frame = CryptoFrame::new(42, data.len());
        let mut buf = bytes::BytesMut::new();
        buf.put_frame(&(frame.clone(), data.clone()));
        let (consumed_type, rest) = (buf[0], &buf[1..]);
        assert_eq!(consumed_type, 0x06);
        let (remain, (parsed, parsed_data)) = be_crypto_frame(rest).unwrap();
        assert!(remain.is_empty());
        assert_eq!(parsed, frame);
        assert_eq!(parsed_data, data);
    }
}
