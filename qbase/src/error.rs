//! Connection-level error types.
//!
//! See [section-20](https://www.rfc-editor.org/rfc/rfc9000.html#section-20)
//! of [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html) for the transport
//! error code registry.

use crate::{frame::FrameType, varint::VarInt};

/// QUIC transport error codes.
///
/// See [table-11](https://www.rfc-editor.org/rfc/rfc9000.html#table-11) of
/// [QUIC](https://www.rfc-editor.org/rfc/rfc9000.html).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoError,
    Internal,
    ConnectionRefused,
    FlowControl,
    StreamLimit,
    StreamState,
    FinalSize,
    FrameEncoding,
    TransportParameter,
    ConnectionIdLimit,
    ProtocolViolation,
    InvalidToken,
    Application,
    CryptoBufferExceeded,
    KeyUpdateError,
    AeadLimitReached,
    NoViablePath,
    /// `CRYPTO_ERROR (0x0100-0x01ff)`: the low byte carries the TLS alert.
    Crypto(u8),
}

impl ErrorKind {
    /// Convert to the wire-format `VarInt` code.
    pub const fn code(self) -> u64 {
        match self {
            ErrorKind::NoError => 0x0,
            ErrorKind::Internal => 0x1,
            ErrorKind::ConnectionRefused => 0x2,
            ErrorKind::FlowControl => 0x3,
            ErrorKind::StreamLimit => 0x4,
            ErrorKind::StreamState => 0x5,
            ErrorKind::FinalSize => 0x6,
            ErrorKind::FrameEncoding => 0x7,
            ErrorKind::TransportParameter => 0x8,
            ErrorKind::ConnectionIdLimit => 0x9,
            ErrorKind::ProtocolViolation => 0xa,
            ErrorKind::InvalidToken => 0xb,
            ErrorKind::Application => 0xc,
            ErrorKind::CryptoBufferExceeded => 0xd,
            ErrorKind::KeyUpdateError => 0xe,
            ErrorKind::AeadLimitReached => 0xf,
            ErrorKind::NoViablePath => 0x10,
            ErrorKind::Crypto(alert) => 0x0100 | alert as u64,
        }
    }
}

impl From<ErrorKind> for VarInt {
    fn from(kind: ErrorKind) -> Self {
        VarInt::try_from(kind.code()).expect("transport error codes fit in a varint")
    }
}

/// A connection-level protocol error: an [`ErrorKind`], the frame type that triggered it
/// (if any), and a human-readable reason carried in the CONNECTION_CLOSE frame.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?} ({reason}){}", frame_type.map(|t| format!(" while processing {t:?}")).unwrap_or_default())]
pub struct QuicError {
    pub kind: ErrorKind,
    pub frame_type: Option<FrameType>,
    pub reason: String,
}

impl QuicError {
    pub fn new(kind: ErrorKind, frame_type: impl Into<Option<FrameType>>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            frame_type: frame_type.into(),
            reason: reason.into(),
        }
    }

    pub fn with_default_fty(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self::new(kind, None, reason)
    }
}

/// Either a local protocol error that must close the connection, or the peer's own
/// CONNECTION_CLOSE, received and recorded.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Quic(#[from] QuicError),
    #[error("connection reset by peer: {0:?}")]
    Reset(crate::frame::ConnectionCloseFrame),
}

impl Error {
    pub fn is_local(&self) -> bool {
        matches!(self, Error::Quic(_))
    }
}
