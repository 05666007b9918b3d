//! Packet headers and packet-number codec.
//!
//! The core consumes packets that have already had header protection removed
//! and the AEAD payload decrypted by an external collaborator (see spec §1);
//! this module only knows about the decoded long/short header shape and the
//! packet-number truncation scheme.

pub mod header;
pub mod number;
pub mod signal;

pub use header::{Header, LongHeaderType, Type};
pub use number::PacketNumber;
