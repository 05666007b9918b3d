//! The record stored per sent packet for everything that must survive loss:
//! enough to re-derive the original frame (or re-read its bytes) without
//! keeping the packet buffer itself alive.
//!
//! Stream and crypto data frames only need an `(offset, length)` pointer
//! back into the sender's own buffer (see [`qrecovery::send::Sender::on_range_lost`]);
//! everything else is small enough to just clone and resend verbatim.

use qbase::{frame::ReliableFrame, sid::StreamId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuaranteedFrame {
    Crypto { offset: u64, len: usize },
    Stream { sid: StreamId, offset: u64, len: usize, is_fin: bool },
    Reliable(ReliableFrame),
}
