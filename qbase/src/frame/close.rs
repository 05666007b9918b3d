//! CONNECTION_CLOSE: either the transport-layer (0x1c) or application-layer (0x1d) variant.

use bytes::{BufMut, Bytes};

use super::{EncodeFrame, FrameType, GetFrameType, error::Error, io::WriteFrame};
use crate::{
    error::ErrorKind,
    varint::{VarInt, WriteVarInt, be_varint},
};

/// A transport-layer CONNECTION_CLOSE (type 0x1c): carries a transport error
/// code and, optionally, the frame type that triggered it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct QuicCloseFrame {
    pub error_code: VarInt,
    pub frame_type: VarInt,
    pub reason: Bytes,
}

/// An application-layer CONNECTION_CLOSE (type 0x1d): carries an
/// application-defined error code with no frame type.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AppCloseFrame {
    pub error_code: VarInt,
    pub reason: Bytes,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConnectionCloseFrame {
    Quic(QuicCloseFrame),
    App(AppCloseFrame),
}

impl ConnectionCloseFrame {
    pub fn quic(kind: ErrorKind, frame_type: Option<FrameType>, reason: impl Into<Bytes>) -> Self {
        Self::Quic(QuicCloseFrame {
            error_code: kind.into(),
            frame_type: frame_type.map(VarInt::from).unwrap_or(VarInt::from_u32(0)),
            reason: reason.into(),
        })
    }

    pub fn app(error_code: u64, reason: impl Into<Bytes>) -> Self {
        Self::App(AppCloseFrame {
            error_code: VarInt::try_from(error_code).expect("application error code fits a varint"),
            reason: reason.into(),
        })
    }

    pub fn reason(&self) -> &[u8] {
        match self {
            ConnectionCloseFrame::Quic(f) => &f.reason,
            ConnectionCloseFrame::App(f) => &f.reason,
        }
    }
}

impl GetFrameType for ConnectionCloseFrame {
    fn frame_type(&self) -> FrameType {
        match self {
            ConnectionCloseFrame::Quic(_) => FrameType::ConnectionClose(0),
            ConnectionCloseFrame::App(_) => FrameType::ConnectionClose(1),
        }
    }
}

impl EncodeFrame for ConnectionCloseFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8 + 8 + 8 + self.reason().len()
    }

    fn encoding_size(&self) -> usize {
        let reason_len = self.reason().len();
        let reason_len_varint = VarInt::try_from(reason_len as u64).unwrap().encoding_size();
        match self {
            ConnectionCloseFrame::Quic(f) => {
                1 + f.error_code.encoding_size() + f.frame_type.encoding_size() + reason_len_varint + reason_len
            }
            ConnectionCloseFrame::App(f) => 1 + f.error_code.encoding_size() + reason_len_varint + reason_len,
        }
    }
}

impl<T: BufMut> WriteFrame<ConnectionCloseFrame> for T {
    fn put_frame(&mut self, frame: &ConnectionCloseFrame) {
        match frame {
            ConnectionCloseFrame::Quic(f) => {
                self.put_u8(0x1c);
                self.put_varint(&f.error_code);
                self.put_varint(&f.frame_type);
                self.put_varint(&VarInt::try_from(f.reason.len() as u64).expect("reason too long"));
                self.put_slice(&f.reason);
            }
            ConnectionCloseFrame::App(f) => {
                self.put_u8(0x1d);
                self.put_varint(&f.error_code);
                self.put_varint(&VarInt::try_from(f.reason.len() as u64).expect("reason too long"));
                self.put_slice(&f.reason);
            }
        }
    }
}

pub fn be_connection_close_frame(layer: u8, input: &[u8]) -> nom::IResult<&[u8], ConnectionCloseFrame, Error> {
    let (remain, error_code) =
        be_varint(input).map_err(|_| nom::Err::Error(Error::IncompleteType("CC error_code".into())))?;
    if layer == 0 {
        let (remain, frame_type) =
            be_varint(remain).map_err(|_| nom::Err::Error(Error::IncompleteType("CC frame_type".into())))?;
        let (remain, reason_len) =
            be_varint(remain).map_err(|_| nom::Err::Error(Error::IncompleteType("CC reason_len".into())))?;
        let reason_len = reason_len.into_inner() as usize;
        if remain.len() < reason_len {
            return Err(nom::Err::Error(Error::IncompleteType("CC reason".into())));
        }
        let (reason, remain) = remain.split_at(reason_len);
        Ok((
            remain,
            ConnectionCloseFrame::Quic(QuicCloseFrame {
                error_code,
                frame_type,
                reason: Bytes::copy_from_slice(reason),
            }),
        ))
    } else {
        let (remain, reason_len) =
            be_varint(remain).map_err(|_| nom::Err::Error(Error::IncompleteType("CC reason_len".into())))?;
        let reason_len = reason_len.into_inner() as usize;
        if remain.len() < reason_len {
            return Err(nom::Err::Error(Error::IncompleteType("CC reason".into())));
        }
        let (reason, remain) = remain.split_at(reason_len);
        Ok((
            remain,
            ConnectionCloseFrame::App(AppCloseFrame {
                error_code,
                reason: Bytes::copy_from_slice(reason),
            }),
        ))
    }
}
