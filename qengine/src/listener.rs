//! A bound server address (spec §6 `bind`/`accept`): the per-address queue
//! [`crate::engine::Engine::deliver`] drops newly-spawned server connections
//! into.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::{error::ApiError, handle::ConnectionHandle};

/// One bound local address, handed out by [`crate::engine::Engine::bind`].
/// Dropping it unregisters the address from the engine.
pub struct Listener {
    local_addr: SocketAddr,
    incoming: mpsc::UnboundedReceiver<Arc<ConnectionHandle>>,
}

impl Listener {
    pub(crate) fn new(local_addr: SocketAddr, incoming: mpsc::UnboundedReceiver<Arc<ConnectionHandle>>) -> Self {
        Self { local_addr, incoming }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next inbound connection (spec §6 `accept`).
    pub async fn accept(&mut self) -> Option<Arc<ConnectionHandle>> {
        self.incoming.recv().await
    }

    /// As [`Self::accept`], but gives up after `timeout`.
    pub async fn accept_timeout(&mut self, timeout: Duration) -> Result<Arc<ConnectionHandle>, ApiError> {
        match tokio::time::timeout(timeout, self.accept()).await {
            Ok(Some(conn)) => Ok(conn),
            Ok(None) => Err(ApiError::Closed),
            Err(_) => Err(ApiError::Timeout),
        }
    }
}
