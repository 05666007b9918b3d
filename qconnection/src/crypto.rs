//! The per-epoch handshake byte stream: CRYPTO frames carry bytes produced
//! and consumed by the external TLS collaborator (see spec §1); this is
//! just the reassembly/buffering half of that handoff, built on the same
//! byte-range buffers a stream's send/recv halves use.

use bytes::{Bytes, BytesMut};
use qbase::{
    error::{ErrorKind, QuicError},
    frame::CryptoFrame,
};
use qrecovery::{recv::rcvbuf::RecvBuf, send::sndbuf::SendBuf};

/// One epoch's handshake byte stream: outgoing bytes handed to us by the
/// TLS collaborator to emit in CRYPTO frames, and incoming bytes reassembled
/// from received CRYPTO frames for the collaborator to read back out.
#[derive(Debug, Default)]
pub struct CryptoStream {
    recv: RecvBuf,
    send: SendBuf,
    /// Ranges a packet carrying them was declared lost, due to be re-read
    /// and re-emitted ahead of any never-before-sent handshake data.
    lost: std::collections::VecDeque<(u64, usize)>,
}

impl CryptoStream {
    /// Queue handshake bytes (from the external TLS collaborator) for sending.
    pub fn write(&mut self, data: Bytes) {
        self.send.write(data);
    }

    /// Draw up to `max_len` bytes, prioritizing a previously-lost range over
    /// never-before-sent data (spec §4.4).
    pub fn emit(&mut self, max_len: usize) -> Option<(CryptoFrame, Bytes)> {
        while let Some((offset, len)) = self.lost.front().copied() {
            if offset + len as u64 <= self.send.acked_to() {
                self.lost.pop_front();
                continue;
            }
            let take = len.min(max_len);
            let Some(data) = self.send.retransmit(offset, take) else {
                self.lost.pop_front();
                continue;
            };
            if take == len {
                self.lost.pop_front();
            } else {
                self.lost[0] = (offset + take as u64, len - take);
            }
            return Some((CryptoFrame::new(offset, data.len()), data));
        }
        let (offset, data) = self.send.pick_up(max_len)?;
        Some((CryptoFrame::new(offset, data.len()), data))
    }

    /// A packet carrying `[offset, offset+len)` of handshake data was
    /// declared lost: queue it for re-emission ahead of fresh data.
    pub fn queue_lost(&mut self, offset: u64, len: usize) {
        if len == 0 {
            return;
        }
        self.lost.push_back((offset, len));
    }

    /// Re-read a previously-sent range verbatim, for retransmission after loss.
    pub fn on_range_lost(&self, offset: u64, len: usize) -> Option<Bytes> {
        self.send.retransmit(offset, len)
    }

    /// A previously-sent range was acknowledged: drop it from the retransmission buffer.
    pub fn on_range_acked(&mut self, offset: u64, len: usize) {
        self.send.ack(offset, offset + len as u64);
    }

    /// Deliver a received CRYPTO frame's payload, out-of-order tolerant.
    pub fn recv(&mut self, frame: &CryptoFrame, data: Bytes) -> Result<(), QuicError> {
        if data.len() != frame.length {
            return Err(QuicError::with_default_fty(
                ErrorKind::FrameEncoding,
                "CRYPTO frame length disagrees with its payload",
            ));
        }
        self.recv.recv(frame.offset.into_inner(), data);
        Ok(())
    }

    /// Read out contiguous handshake bytes for the TLS collaborator to consume.
    pub fn try_read(&mut self, dst: &mut BytesMut) -> usize {
        self.recv.try_read(dst)
    }
}
