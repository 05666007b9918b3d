//! Stream reassembly, flow control, and per-packet-number-space ACK
//! bookkeeping for a QUIC transport connection.
//!
//! This crate has no notion of a connection's lifecycle, encryption, or
//! wire I/O; it only holds the state a connection drives through its own
//! event loop: [`streams::DataStreams`] for application data, and
//! [`journal::Journal`] per packet-number space for loss detection and ACK
//! synthesis.

pub mod journal;
pub mod recv;
pub mod send;
pub mod stream;
pub mod streams;

pub use streams::{DataStreams, StreamWindows};
