//! Errors the application-facing API (spec §6) can return, distinct from
//! [`qbase::error::QuicError`] which only ever describes wire-protocol faults.

use std::net::SocketAddr;

use qbase::error::QuicError;

/// Failure of one of the abstract operations in spec §6.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The connection-level protocol error that closed the connection, if
    /// this call raced a close caused by one.
    #[error(transparent)]
    Quic(#[from] QuicError),
    /// The connection (or stream) is already closed; no further I/O is possible.
    #[error("connection closed")]
    Closed,
    /// A timeout passed to `accept`/`ready`/`read` elapsed with nothing ready.
    #[error("operation timed out")]
    Timeout,
    /// `read_stream`/`write`/`close_stream` named a stream that doesn't
    /// exist (either never reserved, or already garbage-collected).
    #[error("no such stream")]
    NoSuchStream,
    /// `connect`/`deliver` referenced an address with no listener bound.
    #[error("no listener bound on {0}")]
    NoSuchListener(SocketAddr),
    /// The engine has no connection known by the CID a packet named.
    #[error("unknown connection")]
    UnknownConnection,
}
