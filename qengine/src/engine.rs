//! The engine: process-wide connection indices by CID and by peer address
//! (spec §9's "accept queue, connection indices by CID / by 4-tuple ...
//! gathered into a single engine object with explicit lifecycle"), plus the
//! buffer pool outbound packet assembly draws from.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use qbase::{
    cid::ConnectionId,
    packet::{Header, LongHeaderType, Type},
    sid::Role,
    util::BufferPool,
};
use qconnection::Connection;
use tokio::sync::{Mutex, mpsc};

use crate::{config::Config, error::ApiError, handle::ConnectionHandle, listener::Listener};

/// One outbound UDP payload, addressed to where it's going (spec §6's
/// `poll_transmit` hand-off to "external AEAD + socket").
pub struct Datagram {
    pub peer_addr: SocketAddr,
    pub buf: BytesMut,
}

/// Process-wide state for every connection this endpoint drives: the accept
/// queues, the CID/address demux tables, and the global wake-up queue
/// `ready` drains (spec §6 `init`/`cleanup`).
pub struct Engine {
    config: Config,
    next_id: AtomicU64,
    by_cid: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    /// Fallback demux key for when `enable_zero_len_cid` makes every local
    /// CID the empty string, or a peer's packet simply omits one.
    by_addr: DashMap<SocketAddr, Arc<ConnectionHandle>>,
    by_id: DashMap<u64, Arc<ConnectionHandle>>,
    listeners: DashMap<SocketAddr, mpsc::UnboundedSender<Arc<ConnectionHandle>>>,
    ready_tx: mpsc::UnboundedSender<u64>,
    ready_rx: Mutex<mpsc::UnboundedReceiver<u64>>,
    buffers: Mutex<BufferPool>,
}

impl Engine {
    /// `init(config) → engine_handle` (spec §6).
    pub fn new(config: Config) -> Arc<Self> {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let num_bufs = config.num_bufs;
        let max_udp_payload_size = config.max_udp_payload_size as usize;
        Arc::new(Self {
            config,
            next_id: AtomicU64::new(0),
            by_cid: DashMap::new(),
            by_addr: DashMap::new(),
            by_id: DashMap::new(),
            listeners: DashMap::new(),
            ready_tx,
            ready_rx: Mutex::new(ready_rx),
            buffers: Mutex::new(BufferPool::new(num_bufs, max_udp_payload_size)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn insert(&self, peer_addr: SocketAddr, scid: ConnectionId, connection: Connection) -> Arc<ConnectionHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(ConnectionHandle::new(id, peer_addr, connection, self.ready_tx.clone()));
        self.by_cid.insert(scid, Arc::clone(&handle));
        self.by_addr.insert(peer_addr, Arc::clone(&handle));
        self.by_id.insert(id, Arc::clone(&handle));
        handle
    }

    /// `connect(engine, peer_addr, ...) → connection` (spec §6). TLS/ALPN/
    /// early-data negotiation is the external handshake collaborator's job;
    /// this only stands up the transport-layer state and the opening CID pair.
    pub fn connect(&self, peer_addr: SocketAddr) -> Arc<ConnectionHandle> {
        let scid = ConnectionId::random(self.config.local_cid_len());
        let dcid = ConnectionId::random(8);
        let local_params = self.config.to_transport_parameters();
        let mut connection = Connection::new(Role::Client, peer_addr, local_params, scid, dcid);
        connection.enter_opening();
        self.insert(peer_addr, scid, connection)
    }

    /// `bind(engine, local_addr) → listener` (spec §6).
    pub fn bind(&self, local_addr: SocketAddr) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.insert(local_addr, tx);
        Listener::new(local_addr, rx)
    }

    fn spawn_server(&self, peer_addr: SocketAddr, dcid: ConnectionId, accept: mpsc::UnboundedSender<Arc<ConnectionHandle>>) -> Arc<ConnectionHandle> {
        let scid = ConnectionId::random(self.config.local_cid_len());
        let local_params = self.config.to_transport_parameters();
        let mut connection = Connection::new(Role::Server, peer_addr, local_params, scid, dcid);
        connection.enter_opening();
        let handle = self.insert(peer_addr, scid, connection);
        let _ = accept.send(Arc::clone(&handle));
        handle
    }

    fn lookup(&self, header: &Header, local_addr: SocketAddr, peer_addr: SocketAddr) -> Result<Arc<ConnectionHandle>, ApiError> {
        if !header.dcid.is_empty() {
            if let Some(handle) = self.by_cid.get(&header.dcid) {
                return Ok(Arc::clone(handle.value()));
            }
        }
        if let Some(handle) = self.by_addr.get(&peer_addr) {
            return Ok(Arc::clone(handle.value()));
        }
        if !matches!(header.ty, Type::Long(LongHeaderType::Initial)) {
            return Err(ApiError::UnknownConnection);
        }
        let accept = self
            .listeners
            .get(&local_addr)
            .map(|entry| entry.value().clone())
            .ok_or(ApiError::NoSuchListener(local_addr))?;
        let dcid = header.scid.ok_or(ApiError::UnknownConnection)?;
        Ok(self.spawn_server(peer_addr, dcid, accept))
    }

    /// Hand a decrypted packet off to its connection (spec §2's "Data flow
    /// (receive): decrypted packet + header ..."), demuxing by CID (or, for
    /// a fresh Initial, spawning a new server connection behind a bound
    /// [`Listener`]) and feeding it in.
    pub async fn deliver(
        &self,
        header: Header,
        pn: u64,
        datagram_len: usize,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        payload: Bytes,
    ) -> Result<(), ApiError> {
        let handle = self.lookup(&header, local_addr, peer_addr)?;
        handle.recv_packet(header.ty, pn, datagram_len, payload).await
    }

    async fn acquire_buffer(&self) -> BytesMut {
        let mut buffers = self.buffers.lock().await;
        buffers
            .acquire()
            .unwrap_or_else(|| BytesMut::with_capacity(self.config.max_udp_payload_size as usize))
    }

    /// Return a [`Datagram`] buffer to the pool once the external socket
    /// collaborator is done sending it.
    pub async fn release_buffer(&self, buf: BytesMut) {
        self.buffers.lock().await.release(buf);
    }

    /// Draw the next datagram any connection has ready to send, pulled from
    /// the shared buffer pool (spec §5's `num_bufs`).
    pub async fn poll_transmit(&self) -> Option<Datagram> {
        let ids: Vec<u64> = self.by_id.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            let Some(handle) = self.by_id.get(&id).map(|entry| Arc::clone(entry.value())) else {
                continue;
            };
            if let Some(transmit) = handle.poll_transmit(self.config.max_udp_payload_size as usize).await {
                let mut buf = self.acquire_buffer().await;
                buf.extend_from_slice(&transmit.payload);
                return Some(Datagram { peer_addr: handle.peer_addr(), buf });
            }
        }
        None
    }

    /// Drive every connection's expired timers; the event loop calls this
    /// once per wake-up alongside `poll_transmit`.
    pub async fn poll_timers(&self) {
        let now = tokio::time::Instant::now();
        let handles: Vec<Arc<ConnectionHandle>> = self.by_id.iter().map(|entry| Arc::clone(entry.value())).collect();
        for handle in handles {
            handle.on_timeout(now).await;
        }
    }

    /// `ready(engine, [timeout]) → connection`: the multiplexed wake-up any
    /// connection's inbound packet, timer, or local write nudges (spec §6).
    pub async fn ready(&self) -> Option<Arc<ConnectionHandle>> {
        let id = self.ready_rx.lock().await.recv().await?;
        self.by_id.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// As [`Self::ready`], but gives up after `timeout`.
    pub async fn ready_timeout(&self, timeout: Duration) -> Result<Arc<ConnectionHandle>, ApiError> {
        match tokio::time::timeout(timeout, self.ready()).await {
            Ok(Some(handle)) => Ok(handle),
            Ok(None) => Err(ApiError::Closed),
            Err(_) => Err(ApiError::Timeout),
        }
    }

    /// `cleanup(engine)`: drop every index entry for a connection that has
    /// fully torn down.
    pub fn cleanup(&self) {
        self.by_cid.retain(|_, handle| !handle.is_closed_flag());
        self.by_addr.retain(|_, handle| !handle.is_closed_flag());
        self.by_id.retain(|_, handle| !handle.is_closed_flag());
    }
}
