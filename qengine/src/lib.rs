//! Engine lifecycle and the application-facing API (spec §6): `connect`,
//! `bind`/`accept`, `rsv_stream`/`read`/`write`/`close_stream`, and the
//! multiplexed `ready` wake-up, layered over [`qconnection`]'s per-connection
//! transport core.
//!
//! Everything below the connection boundary — frame codec, stream
//! reassembly, ACK/loss/congestion, CID lifecycle, the state machine itself
//! — lives in [`qconnection`], [`qrecovery`] and [`qcongestion`]; this crate
//! only adds the process-wide bookkeeping (CID/address demux tables, accept
//! queues, the shared buffer pool) and the locking/notification an
//! application needs to drive many connections concurrently.

pub mod config;
pub mod engine;
pub mod error;
pub mod handle;
pub mod listener;
pub mod stream;

pub use config::Config;
pub use engine::{Datagram, Engine};
pub use error::ApiError;
pub use handle::ConnectionHandle;
pub use listener::Listener;
pub use stream::Stream;
