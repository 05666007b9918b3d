//! A thin, cloneable handle to one stream on one connection (spec §6's
//! `rsv_stream`/`read_stream`/`write`/`close_stream`, given a concrete
//! receiver instead of threading a `StreamId` through every call site).

use std::sync::Arc;

use bytes::Bytes;
use qbase::sid::StreamId;

use crate::{error::ApiError, handle::ConnectionHandle};

/// One stream, addressed by the connection it belongs to and its id.
#[derive(Clone)]
pub struct Stream {
    conn: Arc<ConnectionHandle>,
    id: StreamId,
}

impl Stream {
    pub(crate) fn new(conn: Arc<ConnectionHandle>, id: StreamId) -> Self {
        Self { conn, id }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Queue `data` for sending, optionally marking the end of the stream.
    pub async fn write(&self, data: Bytes, fin: bool) -> Result<(), ApiError> {
        self.conn.write(self.id, data, fin).await
    }

    /// Wait for, then return, the next chunk of contiguous bytes. `Ok(None)`
    /// once the stream is finished with nothing left to read.
    pub async fn read(&self) -> Result<Option<Bytes>, ApiError> {
        self.conn.read_stream(self.id).await
    }

    /// Locally abort this stream's send side with an application error code.
    pub async fn close(&self, error_code: u64) -> Result<(), ApiError> {
        self.conn.close_stream(self.id, error_code).await
    }
}
