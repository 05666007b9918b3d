//! The per-connection transport core: frame dispatch, the connection state
//! machine, CID lifecycle and path validation built on [`qbase`]'s wire
//! types, [`qrecovery`]'s stream/buffer reassembly, and [`qcongestion`]'s
//! loss detection and congestion control.
//!
//! Encryption, the TLS handshake itself, and UDP I/O are external
//! collaborators this crate never touches directly; it only holds the state
//! a connection's event loop drives between them.

pub mod cid;
pub mod connection;
pub mod crypto;
pub mod frame;
pub mod path;
pub mod space;
pub mod termination;
pub mod timer;

pub use connection::{Connection, ConnectionState, Transmit};
