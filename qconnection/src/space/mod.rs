//! Per-packet-number-space state (spec §4.3): what each of the three epochs
//! carries, wired to the shared [`qrecovery::journal::Journal`] for
//! retransmission bookkeeping.
//!
//! Initial and Handshake only ever carry a [`crate::crypto::CryptoStream`]
//! plus the handful of frame types [`qbase::frame::FrameType::belongs_to`]
//! allows there; [`DataSpace`] carries everything else: application streams,
//! connection-level flow control, and CID/path housekeeping.

use bytes::{Bytes, BytesMut};
use qbase::{
    error::QuicError,
    frame::{
        CryptoFrame, DataBlockedFrame, MaxDataFrame, ReliableFrame, StreamCtlFrame, StreamFrame,
        io::WriteFrame,
    },
};
use qrecovery::{DataStreams, journal::Journal, recv::DeliveryEffect};

use crate::{cid::CidRegistry, crypto::CryptoStream, frame::GuaranteedFrame};

/// Room a CRYPTO/STREAM frame's header needs beyond its payload, so the
/// packer never draws so much data that the frame can't fit the budget.
const FRAME_HEADER_SLACK: usize = 16;

/// The Initial or Handshake packet-number space: a handshake byte stream and
/// the retransmission journal for it, nothing else.
#[derive(Debug)]
pub struct CryptoSpace {
    crypto: CryptoStream,
    journal: Journal<GuaranteedFrame>,
}

impl CryptoSpace {
    pub fn new() -> Self {
        Self {
            crypto: CryptoStream::default(),
            journal: Journal::with_capacity(16),
        }
    }

    pub fn journal(&self) -> &Journal<GuaranteedFrame> {
        &self.journal
    }

    /// Queue handshake bytes from the TLS collaborator for sending in this epoch.
    pub fn write_crypto(&mut self, data: Bytes) {
        self.crypto.write(data);
    }

    /// Draw the next outgoing CRYPTO frame, if this epoch has unsent handshake data.
    pub fn emit_crypto(&mut self, max_len: usize) -> Option<(CryptoFrame, Bytes)> {
        self.crypto.emit(max_len)
    }

    pub fn on_crypto_range_lost(&self, offset: u64, len: usize) -> Option<Bytes> {
        self.crypto.on_range_lost(offset, len)
    }

    /// A CRYPTO frame covering `[offset, offset+len)` was declared lost:
    /// queue it for re-emission ahead of fresh handshake data.
    pub fn queue_crypto_lost(&mut self, offset: u64, len: usize) {
        self.crypto.queue_lost(offset, len);
    }

    pub fn on_crypto_range_acked(&mut self, offset: u64, len: usize) {
        self.crypto.on_range_acked(offset, len);
    }

    /// Deliver a received CRYPTO frame's payload to the TLS collaborator's inbox.
    pub fn recv_crypto(&mut self, frame: &CryptoFrame, data: Bytes) -> Result<(), QuicError> {
        self.crypto.recv(frame, data)
    }

    /// Read out contiguous handshake bytes for the TLS collaborator to consume.
    pub fn read_crypto(&mut self, dst: &mut BytesMut) -> usize {
        self.crypto.try_read(dst)
    }

    /// Assemble as much of this epoch's outgoing payload as fits in
    /// `max_len`: a pending ACK first, then CRYPTO data, packing as many
    /// frames as the budget allows (spec §4.1). Returns the encoded bytes,
    /// the retransmission records for whatever was written, and whether the
    /// packet is ack-eliciting.
    pub fn emit_packet(&mut self, max_len: usize, ack_delay_exponent: u8) -> (BytesMut, Vec<GuaranteedFrame>, bool) {
        let mut buf = BytesMut::with_capacity(max_len);
        let mut frames = Vec::new();
        let mut ack_eliciting = false;

        if let Some(ack) = self.journal.rcvd().generate_ack(ack_delay_exponent, false) {
            buf.put_frame(&ack);
        }

        while buf.len() + FRAME_HEADER_SLACK < max_len {
            let budget = max_len - buf.len() - FRAME_HEADER_SLACK;
            match self.crypto.emit(budget) {
                Some((frame, data)) => {
                    frames.push(GuaranteedFrame::Crypto { offset: frame.offset.into_inner(), len: frame.length });
                    buf.put_frame(&(frame, data));
                    ack_eliciting = true;
                }
                None => break,
            }
        }
        (buf, frames, ack_eliciting)
    }
}

impl Default for CryptoSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// The Application (1-RTT) packet-number space: streams, connection-level
/// flow control, and everything CID/path related rides in STREAM_CTL/NEW_
/// CONNECTION_ID/PATH_* frames here.
#[derive(Debug)]
pub struct DataSpace {
    streams: DataStreams,
    cids: CidRegistry,
    journal: Journal<GuaranteedFrame>,
    /// Reliable (non-STREAM) frames a packet carrying them was declared
    /// lost, due to be re-emitted verbatim ahead of freshly generated ones.
    retransmit_reliable: Vec<ReliableFrame>,
    /// Freshly originated reliable frames (e.g. a local RESET_STREAM or
    /// STOP_SENDING) waiting for their first transmission.
    pending_reliable: Vec<ReliableFrame>,
}

impl DataSpace {
    pub fn new(streams: DataStreams, cids: CidRegistry) -> Self {
        Self {
            streams,
            cids,
            journal: Journal::with_capacity(64),
            retransmit_reliable: Vec::new(),
            pending_reliable: Vec::new(),
        }
    }

    pub fn journal(&self) -> &Journal<GuaranteedFrame> {
        &self.journal
    }

    pub fn streams(&self) -> &DataStreams {
        &self.streams
    }

    pub fn streams_mut(&mut self) -> &mut DataStreams {
        &mut self.streams
    }

    pub fn cids(&self) -> &CidRegistry {
        &self.cids
    }

    pub fn cids_mut(&mut self) -> &mut CidRegistry {
        &mut self.cids
    }

    /// Deliver a received STREAM frame. The returned effect tells the caller
    /// whether a blocked reader should be woken or an ACK hurried along.
    pub fn recv_stream(&mut self, frame: &StreamFrame, data: Bytes) -> Result<DeliveryEffect, QuicError> {
        self.streams.recv_stream_frame(frame, data)
    }

    /// Deliver a received stream-control frame (everything stream-shaped
    /// except STREAM and the connection-level MAX_DATA/DATA_BLOCKED).
    pub fn recv_stream_ctrl(&mut self, frame: &StreamCtlFrame) -> Result<Option<StreamCtlFrame>, QuicError> {
        self.streams.recv_ctrl_frame(frame)
    }

    pub fn recv_max_data(&mut self, frame: &MaxDataFrame) {
        self.streams.on_max_data(frame);
    }

    pub fn recv_data_blocked(&mut self, frame: &DataBlockedFrame) {
        self.streams.on_data_blocked(frame);
    }

    /// Re-read a previously-sent stream byte range verbatim, for
    /// retransmission after loss. `None` if the stream is gone or the range
    /// was already acked out from under it.
    pub fn stream_retransmit_bytes(&self, sid: qbase::sid::StreamId, offset: u64, len: usize) -> Option<Bytes> {
        self.streams.get(sid)?.sender().on_range_lost(offset, len)
    }

    /// A STREAM frame covering `[offset, offset+len)` of `sid` was declared
    /// lost: queue it for re-emission ahead of fresh data on that stream.
    /// No-op if the stream is already gone.
    pub fn queue_stream_lost(&mut self, sid: qbase::sid::StreamId, offset: u64, len: usize, is_fin: bool) {
        if let Some(stream) = self.streams.get_mut(sid) {
            stream.sender_mut().queue_lost(offset, len, is_fin);
        }
    }

    /// A reliable (non-STREAM) frame was declared lost: queue it for
    /// verbatim re-emission ahead of freshly generated CID/flow-control frames.
    pub fn queue_reliable_lost(&mut self, frame: ReliableFrame) {
        self.retransmit_reliable.push(frame);
    }

    /// Queue a freshly originated reliable frame (RESET_STREAM,
    /// STOP_SENDING, ...) for its first transmission.
    pub fn queue_reliable(&mut self, frame: ReliableFrame) {
        self.pending_reliable.push(frame);
    }

    /// Assemble as much of the application epoch's outgoing payload as fits
    /// in `max_len`: ACK first, then CID housekeeping and connection-level
    /// flow control, then as many STREAM frames as the budget and each
    /// stream's own window allow.
    pub fn emit_packet(&mut self, max_len: usize, ack_delay_exponent: u8) -> (BytesMut, Vec<GuaranteedFrame>, bool) {
        let mut buf = BytesMut::with_capacity(max_len);
        let mut frames = Vec::new();
        let mut ack_eliciting = false;

        if let Some(ack) = self.journal.rcvd().generate_ack(ack_delay_exponent, false) {
            buf.put_frame(&ack);
        }

        for frame in self.retransmit_reliable.drain(..).collect::<Vec<_>>() {
            if buf.len() + FRAME_HEADER_SLACK >= max_len {
                self.retransmit_reliable.push(frame);
                continue;
            }
            buf.put_frame(&frame);
            frames.push(GuaranteedFrame::Reliable(frame));
            ack_eliciting = true;
        }
        for frame in self.pending_reliable.drain(..).collect::<Vec<_>>() {
            if buf.len() + FRAME_HEADER_SLACK >= max_len {
                self.pending_reliable.push(frame);
                continue;
            }
            buf.put_frame(&frame);
            frames.push(GuaranteedFrame::Reliable(frame));
            ack_eliciting = true;
        }

        for cid_frame in self.cids.poll_new_connection_id().collect::<Vec<_>>() {
            buf.put_frame(&cid_frame);
            frames.push(GuaranteedFrame::Reliable(ReliableFrame::NewConnectionId(cid_frame)));
            ack_eliciting = true;
        }
        for cid_frame in self.cids.poll_retire_connection_id().collect::<Vec<_>>() {
            buf.put_frame(&cid_frame);
            frames.push(GuaranteedFrame::Reliable(ReliableFrame::RetireConnectionId(cid_frame)));
            ack_eliciting = true;
        }
        if let Some(max_data) = self.streams.maybe_grow_max_data() {
            buf.put_frame(&max_data);
            frames.push(GuaranteedFrame::Reliable(ReliableFrame::MaxData(max_data)));
            ack_eliciting = true;
        }
        if let Some(blocked) = self.streams.blocked() {
            buf.put_frame(&blocked);
            frames.push(GuaranteedFrame::Reliable(ReliableFrame::DataBlocked(blocked)));
            ack_eliciting = true;
        }
        for blocked in self.streams.stream_data_blocked() {
            if buf.len() + FRAME_HEADER_SLACK >= max_len {
                break;
            }
            buf.put_frame(&blocked);
            frames.push(GuaranteedFrame::Reliable(ReliableFrame::Stream(StreamCtlFrame::StreamDataBlocked(blocked))));
            ack_eliciting = true;
        }

        for sid in self.streams.sendable_streams() {
            if buf.len() + FRAME_HEADER_SLACK >= max_len {
                break;
            }
            let packet_budget = max_len - buf.len() - FRAME_HEADER_SLACK;
            let conn_budget = self.streams.sendable();
            let emitted = self.streams.get_mut(sid).and_then(|stream| stream.emit(packet_budget, conn_budget));
            let Some((frame, data, is_retransmit)) = emitted else { continue };
            if !is_retransmit {
                self.streams.on_send(data.len() as u64);
            }
            frames.push(GuaranteedFrame::Stream {
                sid,
                offset: frame.offset.into_inner(),
                len: frame.length,
                is_fin: frame.is_fin,
            });
            buf.put_frame(&(frame, data));
            ack_eliciting = true;
        }
        (buf, frames, ack_eliciting)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use qbase::{
        sid::{Dir, Role},
        varint::VarInt,
    };
    use qrecovery::StreamWindows;

    use super::*;

    #[test]
    fn crypto_space_round_trips_handshake_bytes() {
        let mut space = CryptoSpace::new();
        space.write_crypto(Bytes::from_static(b"client hello"));
        let (frame, data) = space.emit_crypto(1200).unwrap();
        assert_eq!(data, Bytes::from_static(b"client hello"));

        let mut peer = CryptoSpace::new();
        peer.recv_crypto(&frame, data).unwrap();
        let mut out = BytesMut::new();
        assert_eq!(peer.read_crypto(&mut out), 12);
        assert_eq!(&out[..], b"client hello");
    }

    #[test]
    fn data_space_delivers_stream_frames() {
        let windows = StreamWindows {
            initial_max_stream_data_bidi_local: 1 << 16,
            initial_max_stream_data_bidi_remote: 1 << 16,
            initial_max_stream_data_uni: 1 << 16,
        };
        let streams = DataStreams::new(Role::Server, 10, 10, 1 << 20, 1 << 20, windows);
        let cids = CidRegistry::new(4, 4, 8);
        let mut space = DataSpace::new(streams, cids);

        let sid = qbase::sid::StreamId::new(Role::Client, Dir::Bidi, 0);
        let frame = StreamFrame::new(sid, 0, 5, false);
        space.recv_stream(&frame, Bytes::from_static(b"hello")).unwrap();
        assert!(space.streams().get(sid).is_some());
        let _ = VarInt::from_u32(0);
    }
}
