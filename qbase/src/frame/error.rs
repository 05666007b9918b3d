//! Errors that can occur while parsing a frame out of a packet payload.

use crate::varint::VarInt;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("invalid frame type {0:?}")]
    InvalidType(VarInt),
    #[error("incomplete frame: {0}")]
    IncompleteType(String),
    #[error("frame malformed: {0}")]
    Malformed(String),
}

impl From<Error> for crate::error::QuicError {
    fn from(err: Error) -> Self {
        crate::error::QuicError::with_default_fty(crate::error::ErrorKind::FrameEncoding, err.to_string())
    }
}
