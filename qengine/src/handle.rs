//! A shared, lockable handle to one [`Connection`] (spec §6): the unit the
//! engine demuxes inbound packets into, schedules `poll_transmit` against,
//! and wakes blocked application calls through.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use qbase::{
    frame::ConnectionCloseFrame,
    packet::Type,
    sid::{Dir, StreamId},
};
use qconnection::{
    connection::{Connection, Transmit},
    timer::TimerId,
};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::time::Instant;

use crate::{error::ApiError, stream::Stream};

/// One connection plus the synchronization the engine and application share
/// it through: a lock around the transport state, and the notifications
/// spec §6's blocking operations (`read`, `read_stream`, `ready`) wait on.
pub struct ConnectionHandle {
    id: u64,
    peer_addr: SocketAddr,
    inner: Mutex<Connection>,
    readable: Notify,
    new_stream: Notify,
    closed: Notify,
    ready_tx: mpsc::UnboundedSender<u64>,
    /// Mirrors `Connection::is_closed` for [`crate::engine::Engine::cleanup`],
    /// which needs a synchronous peek rather than taking the lock.
    closed_flag: AtomicBool,
    /// Peer-initiated streams observed but not yet handed out via
    /// [`Self::new_stream`]/[`Self::accept_stream`].
    pending_new_streams: Mutex<VecDeque<StreamId>>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        id: u64,
        peer_addr: SocketAddr,
        connection: Connection,
        ready_tx: mpsc::UnboundedSender<u64>,
    ) -> Self {
        Self {
            id,
            peer_addr,
            inner: Mutex::new(connection),
            readable: Notify::new(),
            new_stream: Notify::new(),
            closed: Notify::new(),
            ready_tx,
            closed_flag: AtomicBool::new(false),
            pending_new_streams: Mutex::new(VecDeque::new()),
        }
    }

    /// A synchronous, possibly-stale snapshot of whether the connection has
    /// fully torn down, for housekeeping that can't await the lock.
    pub fn is_closed_flag(&self) -> bool {
        self.closed_flag.load(Ordering::Acquire)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Feed one decrypted, de-protected packet into the connection (spec §9's
    /// inbound pipeline), then wake whichever application calls the
    /// resulting state change unblocks and nudge the engine's `ready` queue
    /// so `poll_transmit` gets tried again soon.
    pub(crate) async fn recv_packet(&self, packet_type: Type, pn: u64, len: usize, payload: Bytes) -> Result<(), ApiError> {
        let mut conn = self.inner.lock().await;
        conn.on_datagram_received(len);
        conn.recv_packet(packet_type, pn, payload)?;
        let became_readable = !conn.poll_readable_streams().is_empty();
        let new_streams = conn.poll_new_streams();
        let is_closed = conn.is_closed();
        drop(conn);

        if became_readable {
            self.readable.notify_waiters();
        }
        if !new_streams.is_empty() {
            self.pending_new_streams.lock().await.extend(new_streams);
            self.new_stream.notify_waiters();
        }
        if is_closed {
            self.closed_flag.store(true, Ordering::Release);
            self.closed.notify_waiters();
        }
        let _ = self.ready_tx.send(self.id);
        Ok(())
    }

    /// Drive expired timers (spec §4.6): the closing/draining and idle
    /// timers fully tear the connection down, the rest (loss detection, ack
    /// delay, pacing) just need `poll_transmit` retried.
    pub(crate) async fn on_timeout(&self, now: Instant) {
        let mut conn = self.inner.lock().await;
        let expired = conn.poll_expired_timers(now);
        if expired.is_empty() {
            return;
        }
        let mut torn_down = false;
        for id in expired {
            if matches!(id, TimerId::CloseDraining | TimerId::Idle) {
                conn.on_close_timer_expired();
                torn_down = true;
            }
        }
        let is_closed = conn.is_closed();
        drop(conn);
        if torn_down && is_closed {
            self.closed_flag.store(true, Ordering::Release);
            self.closed.notify_waiters();
        }
        let _ = self.ready_tx.send(self.id);
    }

    pub(crate) async fn poll_timeout(&self) -> Option<Instant> {
        self.inner.lock().await.poll_timeout()
    }

    pub(crate) async fn poll_transmit(&self, max_datagram_size: usize) -> Option<Transmit> {
        self.inner.lock().await.poll_transmit(max_datagram_size)
    }

    pub(crate) async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_closed()
    }

    /// Reserve a new, locally-initiated stream (spec §6 `rsv_stream`).
    pub async fn open_stream(&self, dir: Dir) -> StreamId {
        let sid = self.inner.lock().await.open_stream(dir);
        let _ = self.ready_tx.send(self.id);
        sid
    }

    /// Reserve a new, locally-initiated stream and wrap it in a [`Stream`]
    /// handle bound to this connection.
    pub async fn open(self: &Arc<Self>, dir: Dir) -> Stream {
        let sid = self.open_stream(dir).await;
        self.stream(sid)
    }

    /// Address an already-known stream id as a [`Stream`] handle.
    pub fn stream(self: &Arc<Self>, id: StreamId) -> Stream {
        Stream::new(Arc::clone(self), id)
    }

    /// Queue `data` for sending on `sid` (spec §6 `write`).
    pub async fn write(&self, sid: StreamId, data: Bytes, fin: bool) -> Result<(), ApiError> {
        self.inner.lock().await.write_stream(sid, data, fin)?;
        let _ = self.ready_tx.send(self.id);
        Ok(())
    }

    /// Wait until `sid` has contiguous bytes (or a FIN) to deliver, then
    /// return them (spec §6 `read_stream`). `Ok(None)` once the stream is
    /// finished with nothing left to read.
    pub async fn read_stream(&self, sid: StreamId) -> Result<Option<Bytes>, ApiError> {
        loop {
            let notified = self.readable.notified();
            {
                let mut conn = self.inner.lock().await;
                let (readable_now, finished) = match conn.data().streams().get(sid) {
                    Some(stream) => (stream.recver().is_readable(), stream.is_finished()),
                    None => return Err(ApiError::NoSuchStream),
                };
                if readable_now {
                    let mut buf = BytesMut::with_capacity(4096);
                    conn.read_stream(sid, &mut buf);
                    return Ok(Some(buf.freeze()));
                }
                if finished {
                    return Ok(None);
                }
                if conn.is_closed() {
                    return Err(ApiError::Closed);
                }
            }
            notified.await;
        }
    }

    /// Wait until some stream has something to deliver, then return the
    /// first one found and its bytes (spec §6 `read`).
    pub async fn read(&self) -> Result<Option<(StreamId, Bytes)>, ApiError> {
        loop {
            let notified = self.readable.notified();
            {
                let mut conn = self.inner.lock().await;
                if let Some(sid) = conn.data().streams().readable_streams().into_iter().next() {
                    let mut buf = BytesMut::with_capacity(4096);
                    conn.read_stream(sid, &mut buf);
                    return Ok(Some((sid, buf.freeze())));
                }
                if conn.is_closed() {
                    return Ok(None);
                }
            }
            notified.await;
        }
    }

    /// Wait for a peer-initiated stream the application hasn't been told
    /// about yet (spec §6 `accept` on a stream, as distinct from an engine
    /// `accept` on a listener).
    pub async fn new_stream(&self) -> Result<StreamId, ApiError> {
        loop {
            let notified = self.new_stream.notified();
            if let Some(sid) = self.pending_new_streams.lock().await.pop_front() {
                return Ok(sid);
            }
            if self.inner.lock().await.is_closed() {
                return Err(ApiError::Closed);
            }
            notified.await;
        }
    }

    /// Wait for a peer-initiated stream and wrap it in a [`Stream`] handle.
    pub async fn accept_stream(self: &Arc<Self>) -> Result<Stream, ApiError> {
        let sid = self.new_stream().await?;
        Ok(self.stream(sid))
    }

    /// Locally abort a stream's send side (spec §6 `close_stream`).
    pub async fn close_stream(&self, sid: StreamId, error_code: u64) -> Result<(), ApiError> {
        self.inner.lock().await.reset_stream(sid, error_code)?;
        let _ = self.ready_tx.send(self.id);
        Ok(())
    }

    /// Locally close the whole connection with an application error code
    /// (spec §6 `close`).
    pub async fn close(&self, error_code: u64, reason: impl Into<Bytes>) {
        let ccf = ConnectionCloseFrame::app(error_code, reason.into());
        self.inner.lock().await.close(ccf);
        let _ = self.ready_tx.send(self.id);
    }

    /// Resolve once the connection has fully torn down.
    pub async fn closed(&self) {
        loop {
            let notified = self.closed.notified();
            if self.inner.lock().await.is_closed() {
                return;
            }
            notified.await;
        }
    }
}
