//! The connection state machine (spec §4.5): frame dispatch, the idle →
//! opening → established → closing/draining → closed lifecycle, and the
//! wiring between [`crate::space`], [`qcongestion::Congestion`] and
//! [`crate::path::Path`] that a connection's event loop drives.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use qbase::{
    Epoch,
    cid::ConnectionId,
    error::{Error, ErrorKind, QuicError},
    frame::{
        ConnectionCloseFrame, ContainSpec, Frame, FrameType, GetFrameType, PathResponseFrame, ReliableFrame, Spec,
        StreamCtlFrame,
    },
    packet::Type,
    param::TransportParameters,
    sid::{Dir, Role, StreamId},
};
use qcongestion::{Congestion, HandshakeStatus};
use qrecovery::{DataStreams, StreamWindows};
use tokio::time::Instant;

use crate::{
    cid::CidRegistry,
    frame::GuaranteedFrame,
    path::Path,
    space::{CryptoSpace, DataSpace},
    termination::{Terminator, Termination},
    timer::{TimerId, Timers},
};

/// Where a connection currently stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Opening,
    Established,
    Closing,
    Draining,
    Closed,
}

/// A single QUIC connection: the three packet-number spaces, the shared
/// congestion/loss-detection state, the active path, and the lifecycle that
/// binds them together.
pub struct Connection {
    role: Role,
    state: ConnectionState,
    local_params: TransportParameters,
    remote_params: Option<TransportParameters>,

    initial: CryptoSpace,
    handshake: CryptoSpace,
    data: DataSpace,

    congestion: Congestion,
    handshake_status: HandshakeStatus,

    path: Path,
    timers: Timers,

    termination: Option<Termination>,
    terminator: Option<Terminator>,

    /// Streams a just-processed packet made readable (new contiguous bytes,
    /// or FIN), queued for the event loop to notify via [`Self::poll_readable_streams`].
    readable: Vec<qbase::sid::StreamId>,
    /// Peer-initiated streams a just-processed packet opened the first
    /// reference to, queued for the event loop to notify via
    /// [`Self::poll_new_streams`].
    new_streams: Vec<qbase::sid::StreamId>,
}

impl Connection {
    /// Build a connection in the `idle` state. `scid`/`dcid` are the initial
    /// source/destination CIDs chosen for the handshake.
    pub fn new(
        role: Role,
        peer_addr: SocketAddr,
        local_params: TransportParameters,
        scid: ConnectionId,
        dcid: ConnectionId,
    ) -> Self {
        let windows = StreamWindows {
            initial_max_stream_data_bidi_local: local_params.initial_max_stream_data_bidi_local,
            initial_max_stream_data_bidi_remote: local_params.initial_max_stream_data_bidi_remote,
            initial_max_stream_data_uni: local_params.initial_max_stream_data_uni,
        };
        let streams = DataStreams::new(
            role,
            local_params.initial_max_streams_bidi,
            local_params.initial_max_streams_uni,
            local_params.initial_max_data,
            0,
            windows,
        );
        let mut cids = CidRegistry::new(
            local_params.active_connection_id_limit as usize,
            4,
            scid.len(),
        );
        cids.issue_initial(scid, rand_reset_token());
        cids.remote.on_new_cid(0, 0, dcid, [0; 16]).expect("first dcid always fits");

        let congestion = Congestion::new(
            local_params.max_udp_payload_size,
            local_params.ack_delay_exponent,
            local_params.max_ack_delay(),
            true,
        );

        let mut timers = Timers::new();
        if let Some(idle) = local_params.max_idle_timeout() {
            timers.arm_after(TimerId::Idle, Instant::now(), idle);
        }

        Self {
            role,
            state: ConnectionState::Idle,
            local_params,
            remote_params: None,
            initial: CryptoSpace::new(),
            handshake: CryptoSpace::new(),
            data: DataSpace::new(streams, cids),
            congestion,
            handshake_status: HandshakeStatus::new(role == Role::Server),
            path: Path::initial(peer_addr),
            timers,
            termination: None,
            terminator: None,
            readable: Vec::new(),
            new_streams: Vec::new(),
        }
    }

    /// Drain the set of streams that became readable since the last poll, for
    /// the event loop to wake blocked `read`/`read_stream` callers with.
    pub fn poll_readable_streams(&mut self) -> Vec<qbase::sid::StreamId> {
        std::mem::take(&mut self.readable)
    }

    /// Drain the set of peer-initiated streams that arrived since the last
    /// poll and haven't been handed to the application via `read`/`accept` yet.
    pub fn poll_new_streams(&mut self) -> Vec<qbase::sid::StreamId> {
        std::mem::take(&mut self.new_streams)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &DataSpace {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut DataSpace {
        &mut self.data
    }

    /// Reserve a new, locally-initiated stream (spec §6 `rsv_stream`).
    pub fn open_stream(&mut self, dir: Dir) -> StreamId {
        self.data.streams_mut().open(dir)
    }

    /// Queue `data` for sending on `sid` (spec §6 `write`).
    pub fn write_stream(&mut self, sid: StreamId, data: Bytes, fin: bool) -> Result<(), QuicError> {
        let stream = self.data.streams_mut().get_mut(sid).ok_or_else(|| {
            QuicError::with_default_fty(ErrorKind::StreamState, format!("{sid:?}: no such stream"))
        })?;
        stream.write(data, fin)
    }

    /// Read out contiguous bytes available on `sid` right now (spec §6 `read_stream`).
    /// Returns `None` if the stream doesn't exist.
    pub fn read_stream(&mut self, sid: StreamId, dst: &mut bytes::BytesMut) -> Option<usize> {
        let stream = self.data.streams_mut().get_mut(sid)?;
        Some(stream.try_read(dst))
    }

    /// Locally abort a stream's send side, emitting RESET_STREAM (spec §6 `close_stream`).
    pub fn reset_stream(&mut self, sid: StreamId, error_code: u64) -> Result<(), QuicError> {
        let stream = self.data.streams_mut().get_mut(sid).ok_or_else(|| {
            QuicError::with_default_fty(ErrorKind::StreamState, format!("{sid:?}: no such stream"))
        })?;
        let frame = stream.reset(error_code);
        self.data.queue_reliable(ReliableFrame::Stream(StreamCtlFrame::ResetStream(frame)));
        Ok(())
    }

    pub fn congestion(&self) -> &Congestion {
        &self.congestion
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    fn space_mut(&mut self, epoch: Epoch) -> Option<&mut CryptoSpace> {
        match epoch {
            Epoch::Initial => Some(&mut self.initial),
            Epoch::Handshake => Some(&mut self.handshake),
            Epoch::Data => None,
        }
    }

    /// Move from `idle` on a client's `connect()` or a server's first
    /// received Initial packet.
    pub fn enter_opening(&mut self) {
        if self.state == ConnectionState::Idle {
            self.state = ConnectionState::Opening;
        }
    }

    /// Move to `established` once the TLS handshake completes and a 1-RTT
    /// packet has been successfully exchanged.
    pub fn enter_established(&mut self, remote_params: TransportParameters) {
        if self.state == ConnectionState::Opening {
            self.remote_params = Some(remote_params.clone());
            self.data.streams_mut().on_max_data(&qbase::frame::MaxDataFrame {
                max_data: qbase::varint::VarInt::try_from(remote_params.initial_max_data)
                    .unwrap_or(qbase::varint::VarInt::ZERO),
            });
            self.handshake_status.handshake_confirmed();
            self.state = ConnectionState::Established;
        }
    }

    /// Local close: emit CONNECTION_CLOSE and arm the closing timer at 3·PTO.
    pub fn close(&mut self, ccf: ConnectionCloseFrame) {
        if matches!(self.state, ConnectionState::Closing | ConnectionState::Draining | ConnectionState::Closed) {
            return;
        }
        let scid = self.data.cids().local.initial_scid();
        let dcid = self.data.cids().remote.latest_dcid();
        self.terminator = Some(Terminator::new(ccf.clone(), scid, dcid));
        self.termination = Some(Termination::closing(Error::Quic(QuicError::with_default_fty(
            ErrorKind::Internal,
            "locally closed",
        ))));
        self.state = ConnectionState::Closing;
        self.arm_closing_timer();
    }

    /// Peer-initiated close: no more frames are emitted, only the received
    /// CONNECTION_CLOSE may echo back on duplicate arrival.
    pub fn on_peer_close(&mut self, ccf: ConnectionCloseFrame) {
        if matches!(self.state, ConnectionState::Closing | ConnectionState::Draining | ConnectionState::Closed) {
            return;
        }
        self.termination = Some(Termination::draining(Error::Reset(ccf)));
        self.state = ConnectionState::Draining;
        self.arm_closing_timer();
    }

    fn arm_closing_timer(&mut self) {
        let pto = self
            .congestion
            .rtt()
            .pto_base(self.local_params.max_ack_delay())
            * 3;
        self.timers.arm_after(TimerId::CloseDraining, Instant::now(), pto);
    }

    /// The closing/draining timer fired: the connection is fully torn down.
    pub fn on_close_timer_expired(&mut self) {
        self.state = ConnectionState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Record that a datagram of `len` bytes arrived on the active path,
    /// crediting the anti-amplification limit if the path isn't validated yet.
    pub fn on_datagram_received(&mut self, len: usize) {
        self.path.on_rcvd(len);
        if let Some(idle) = self.local_params.max_idle_timeout() {
            self.timers.arm_after(TimerId::Idle, Instant::now(), idle);
        }
        if let Some(terminator) = &self.terminator {
            if terminator.on_packet_rcvd() {
                self.timers.arm_after(TimerId::CloseDraining, Instant::now(), Duration::ZERO);
            }
        }
    }

    /// Process one decrypted packet's frames, after the external collaborator
    /// has removed header protection and recovered its packet number `pn`.
    /// Duplicate packet numbers are dropped (spec §4.3: "if already in the
    /// set, drop as duplicate"). Returns an error (to be surfaced as a local
    /// CONNECTION_CLOSE) on any protocol violation.
    pub fn recv_packet(&mut self, packet_type: Type, pn: u64, payload: Bytes) -> Result<(), QuicError> {
        if matches!(self.state, ConnectionState::Closing | ConnectionState::Draining | ConnectionState::Closed) {
            return Ok(());
        }
        let epoch = packet_type.epoch().ok_or_else(|| {
            QuicError::with_default_fty(ErrorKind::ProtocolViolation, "no packet-number space for this header type")
        })?;
        let reader = qbase::frame::FrameReader::new(payload, packet_type);
        let mut frames = Vec::new();
        for item in reader {
            let (frame, frame_type) = item.map_err(|e| QuicError::from(e))?;
            if !frame_type.belongs_to(packet_type) {
                return Err(QuicError::new(
                    ErrorKind::ProtocolViolation,
                    Some(frame_type),
                    "frame type is not permitted in this packet's epoch",
                ));
            }
            frames.push((frame, frame_type));
        }

        let ack_eliciting = frames.iter().any(|(_, ft)| !ft.specs().contain(Spec::NonAckEliciting));
        let journal = match epoch {
            Epoch::Initial => self.initial.journal(),
            Epoch::Handshake => self.handshake.journal(),
            Epoch::Data => self.data.journal(),
        };
        if !journal.rcvd().register(pn, ack_eliciting, false, false, false) {
            tracing::debug!(pn, ?epoch, "duplicate packet number, dropping");
            return Ok(());
        }

        for (frame, frame_type) in frames {
            self.handle_frame(epoch, frame, frame_type)?;
        }
        Ok(())
    }

    fn handle_frame(&mut self, epoch: Epoch, frame: Frame, frame_type: FrameType) -> Result<(), QuicError> {
        match frame {
            Frame::Padding(_) | Frame::Ping(_) => {}
            Frame::Ack(ack) => {
                let now = Instant::now();
                let hs_confirmed = self.handshake_status.is_handshake_confirmed();
                let outcome = self.congestion.on_ack(epoch, &ack, now, hs_confirmed).map_err(|e| {
                    if let Error::Quic(e) = e { e } else { unreachable!() }
                })?;
                let (acked, lost) = if let Some(space) = self.space_mut(epoch) {
                    let journal = space.journal().clone();
                    let mut rotate = journal.sent().rotate();
                    rotate.update_largest(&ack)?;
                    let acked: Vec<_> = outcome.newly_acked.iter().flat_map(|pn| rotate.on_packet_acked(*pn).collect::<Vec<_>>()).collect();
                    let lost: Vec<_> = outcome.newly_lost.iter().flat_map(|pn| rotate.may_loss_packet(*pn).collect::<Vec<_>>()).collect();
                    (acked, lost)
                } else {
                    let journal = self.data.journal().clone();
                    let mut rotate = journal.sent().rotate();
                    rotate.update_largest(&ack)?;
                    let acked: Vec<_> = outcome.newly_acked.iter().flat_map(|pn| rotate.on_packet_acked(*pn).collect::<Vec<_>>()).collect();
                    let lost: Vec<_> = outcome.newly_lost.iter().flat_map(|pn| rotate.may_loss_packet(*pn).collect::<Vec<_>>()).collect();
                    (acked, lost)
                };

                let is_crypto_epoch = self.space_mut(epoch).is_some();
                for frame in acked {
                    match frame {
                        GuaranteedFrame::Crypto { offset, len } => {
                            if let Some(space) = self.space_mut(epoch) {
                                space.on_crypto_range_acked(offset, len);
                            }
                        }
                        GuaranteedFrame::Stream { sid, offset, len, is_fin } => {
                            if let Some(stream) = self.data.streams_mut().get_mut(sid) {
                                stream.sender_mut().on_range_acked(offset, len, is_fin);
                            }
                        }
                        GuaranteedFrame::Reliable(_) => {
                            // Acknowledged reliable frames need no further action.
                        }
                    }
                }
                for frame in lost {
                    match frame {
                        GuaranteedFrame::Crypto { offset, len } => {
                            if is_crypto_epoch {
                                if let Some(space) = self.space_mut(epoch) {
                                    space.queue_crypto_lost(offset, len);
                                }
                            }
                        }
                        GuaranteedFrame::Stream { sid, offset, len, is_fin } => {
                            self.data.queue_stream_lost(sid, offset, len, is_fin);
                        }
                        GuaranteedFrame::Reliable(f) => {
                            self.data.queue_reliable_lost(f);
                        }
                    }
                }
            }
            Frame::Close(ccf) => self.on_peer_close(ccf),
            Frame::Crypto(cf, data) => match self.space_mut(epoch) {
                Some(space) => space.recv_crypto(&cf, data)?,
                None => {
                    return Err(QuicError::new(
                        ErrorKind::ProtocolViolation,
                        Some(frame_type),
                        "CRYPTO frames do not belong in the application epoch",
                    ));
                }
            },
            Frame::Stream(sf, data) => {
                let is_new = self.data.streams().get(sf.stream_id).is_none();
                let effect = self.data.recv_stream(&sf, data)?;
                if is_new && sf.stream_id.initiator() != self.role {
                    self.new_streams.push(sf.stream_id);
                }
                if effect.became_readable || effect.fin_reached {
                    self.readable.push(sf.stream_id);
                }
            }
            Frame::StreamCtl(ctl) => {
                self.data.recv_stream_ctrl(&ctl)?;
            }
            Frame::MaxData(f) => self.data.recv_max_data(&f),
            Frame::DataBlocked(f) => self.data.recv_data_blocked(&f),
            Frame::NewConnectionId(f) => self.data.cids_mut().on_new_connection_id(&f)?,
            Frame::RetireConnectionId(f) => self.data.cids_mut().on_retire_connection_id(&f),
            Frame::Challenge(challenge) => {
                self.data.queue_reliable(ReliableFrame::Response(PathResponseFrame { data: challenge.data }));
            }
            Frame::Response(response) => {
                if self.path.on_response(&response) {
                    self.data.cids_mut().replenish();
                }
            }
            Frame::NewToken(_) | Frame::HandshakeDone(_) => {}
        }
        Ok(())
    }

    /// A new 4-tuple was observed: start path validation on it, queuing the
    /// PATH_CHALLENGE that must go out on the new path (spec §4.5).
    pub fn on_path_changed(&mut self, new_peer_addr: SocketAddr) {
        if new_peer_addr != self.path.peer_addr() {
            self.path = Path::new_unvalidated(new_peer_addr);
            if let Some(challenge) = self.path.challenge() {
                self.data.queue_reliable(ReliableFrame::Challenge(challenge));
            }
        }
    }

    /// The earliest deadline across loss detection, PTO, idle, closing and
    /// ack-delay timers, for the event loop to await.
    pub fn poll_timeout(&mut self) -> Option<Instant> {
        if let Some((_, t)) = self.congestion.next_loss_timer() {
            self.timers.arm(TimerId::LossDetection, t);
        } else {
            self.timers.cancel(TimerId::LossDetection);
        }
        self.timers.poll_timeout()
    }

    pub fn poll_expired_timers(&mut self, now: Instant) -> Vec<TimerId> {
        self.timers.poll_expired(now)
    }

    /// Draw the next outgoing packet, if this connection has anything to
    /// send right now, respecting the path's anti-amplification budget (spec
    /// §4.5) and the congestion window (spec §4.4). The scheduler polls each
    /// PN space in turn (spec §2, "Data flow (transmit)"); `payload` is ready
    /// for the external AEAD + header-protection collaborator to encrypt and send.
    pub fn poll_transmit(&mut self, max_datagram_size: usize) -> Option<Transmit> {
        if self.state == ConnectionState::Draining || self.state == ConnectionState::Closed {
            return None;
        }
        let budget = match self.path.send_budget() {
            Some(b) => b.min(max_datagram_size),
            None => return None,
        };
        if budget == 0 {
            return None;
        }
        if self.state == ConnectionState::Closing {
            return self.poll_close_transmit(budget);
        }
        for epoch in [Epoch::Initial, Epoch::Handshake, Epoch::Data] {
            if let Some(t) = self.poll_epoch_transmit(epoch, budget) {
                return Some(t);
            }
        }
        None
    }

    /// While closing, the only thing ever sent again is the CONNECTION_CLOSE,
    /// rate-limited by the terminator (spec §4.5's "possibly retransmitted
    /// once per received packet, rate-limited").
    fn poll_close_transmit(&mut self, max_len: usize) -> Option<Transmit> {
        let terminator = self.terminator.as_ref()?;
        let ccf = terminator.ccf().clone();
        let epoch = Epoch::Data;
        let journal = self.data.journal().clone();
        let mut guard = journal.sent().new_packet();
        let (pn, encoded_pn) = guard.pn();
        guard.record_trivial();
        guard.build_with_time(Duration::from_secs(3600), Duration::from_secs(3600));

        let mut payload = bytes::BytesMut::with_capacity(max_len.min(128));
        use qbase::frame::io::WriteFrame;
        payload.put_frame(&ccf);
        Some(Transmit {
            epoch,
            pn,
            encoded_pn,
            payload,
            ack_eliciting: false,
        })
    }

    /// Ask one PN space to assemble its next packet: a pending ACK, then
    /// whatever that epoch's own scheduler has ready (CRYPTO data, or
    /// STREAM/control frames for the application epoch), allocating a packet
    /// number and recording the retransmittable content in its journal, and
    /// feeding the result to congestion control's bytes-in-flight accounting.
    fn poll_epoch_transmit(&mut self, epoch: Epoch, max_len: usize) -> Option<Transmit> {
        let ack_delay_exponent = self.local_params.ack_delay_exponent;
        let cc_blocked = self.congestion.bytes_in_flight() >= self.congestion.cwnd();
        let journal = match epoch {
            Epoch::Initial => self.initial.journal().clone(),
            Epoch::Handshake => self.handshake.journal().clone(),
            Epoch::Data => self.data.journal().clone(),
        };
        if cc_blocked && !journal.rcvd().should_ack_immediately() {
            // Congestion-limited: only a due ACK may still go out (ACKs of
            // ack-eliciting packets are themselves congestion-control-exempt).
            return None;
        }

        let (mut payload, frames, ack_eliciting) = match epoch {
            Epoch::Initial => self.initial.emit_packet(max_len, ack_delay_exponent),
            Epoch::Handshake => self.handshake.emit_packet(max_len, ack_delay_exponent),
            Epoch::Data => self.data.emit_packet(max_len, ack_delay_exponent),
        };
        if payload.is_empty() {
            return None;
        }
        if cc_blocked && ack_eliciting {
            // Shouldn't happen given the gate above, but never ship
            // ack-eliciting content past the window.
            payload.clear();
            return None;
        }

        let mut guard = journal.sent().new_packet();
        let (pn, encoded_pn) = guard.pn();
        if frames.is_empty() {
            guard.record_trivial();
        } else {
            for frame in frames {
                guard.record_frame(frame);
            }
        }
        let retran_timeout = self.congestion.rtt().pto_base(self.local_params.max_ack_delay());
        let expire_timeout = retran_timeout * 3;
        guard.build_with_time(retran_timeout, expire_timeout);

        let now = Instant::now();
        self.congestion.on_packet_sent(epoch, payload.len() as u64, ack_eliciting, true, false, now);
        self.path.on_sent(payload.len());

        Some(Transmit {
            epoch,
            pn,
            encoded_pn,
            payload,
            ack_eliciting,
        })
    }
}

/// One outbound payload for a single packet-number space: a decoded packet
/// number and a frame-only payload, ready for the external collaborator to
/// apply header protection and AEAD before sending (spec §1's "external
/// collaborators").
#[derive(Debug)]
pub struct Transmit {
    pub epoch: Epoch,
    pub pn: u64,
    pub encoded_pn: qbase::packet::PacketNumber,
    pub payload: bytes::BytesMut,
    pub ack_eliciting: bool,
}

fn rand_reset_token() -> [u8; 16] {
    use rand::RngCore;
    let mut token = [0u8; 16];
    rand::rng().fill_bytes(&mut token);
    token
}

#[cfg(test)]
mod tests {
    use qbase::packet::LongHeaderType;

    use super::*;

    fn conn(role: Role) -> Connection {
        Connection::new(
            role,
            "127.0.0.1:9000".parse().unwrap(),
            TransportParameters::default(),
            ConnectionId::from_slice(b"scid1234"),
            ConnectionId::from_slice(b"dcid1234"),
        )
    }

    #[test]
    fn lifecycle_progresses_idle_to_established() {
        let mut c = conn(Role::Client);
        assert_eq!(c.state(), ConnectionState::Idle);
        c.enter_opening();
        assert_eq!(c.state(), ConnectionState::Opening);
        c.enter_established(TransportParameters::default());
        assert_eq!(c.state(), ConnectionState::Established);
    }

    #[test]
    fn local_close_moves_to_closing_then_closed_on_timer() {
        let mut c = conn(Role::Server);
        c.enter_opening();
        c.enter_established(TransportParameters::default());
        c.close(ConnectionCloseFrame::quic(ErrorKind::NoError, None, "bye"));
        assert_eq!(c.state(), ConnectionState::Closing);
        c.on_close_timer_expired();
        assert!(c.is_closed());
    }

    #[test]
    fn peer_close_moves_to_draining() {
        let mut c = conn(Role::Server);
        c.enter_opening();
        c.enter_established(TransportParameters::default());
        c.recv_packet(
            Type::Short,
            0,
            {
                let mut buf = bytes::BytesMut::new();
                use qbase::frame::io::WriteFrame;
                buf.put_frame(&ConnectionCloseFrame::quic(ErrorKind::NoError, None, "done"));
                buf.freeze()
            },
        )
        .unwrap();
        assert_eq!(c.state(), ConnectionState::Draining);
    }

    #[test]
    fn disallowed_frame_in_initial_is_rejected() {
        let mut c = conn(Role::Client);
        c.enter_opening();
        let mut buf = bytes::BytesMut::new();
        use qbase::frame::io::WriteFrame;
        let sid = qbase::sid::StreamId::new(Role::Server, qbase::sid::Dir::Bidi, 0);
        buf.put_frame(&(qbase::frame::StreamFrame::new(sid, 0, 0, false), Bytes::new()));
        let err = c
            .recv_packet(Type::Long(LongHeaderType::Initial), 0, buf.freeze())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProtocolViolation);
    }

    /// Spec §8 scenario 6: a new 4-tuple is observed, a PATH_CHALLENGE goes
    /// out on it, and the matching PATH_RESPONSE validates the path and
    /// tops up the local CID set.
    #[test]
    fn path_migration_challenges_and_validates_the_new_path() {
        use qbase::frame::{PathResponseFrame, io::WriteFrame};

        let mut c = conn(Role::Server);
        c.enter_opening();
        c.enter_established(TransportParameters::default());

        let new_addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        c.on_path_changed(new_addr);
        assert!(!c.path().is_validated());
        assert_eq!(c.path().peer_addr(), new_addr);

        // Credit the still-unvalidated path so the anti-amplification limit
        // doesn't block the PATH_CHALLENGE from going out.
        c.on_datagram_received(1200);

        let transmit = c.poll_transmit(1200).expect("a PATH_CHALLENGE should be due on the new path");
        let reader = qbase::frame::FrameReader::new(transmit.payload.freeze(), Type::Short);
        let nonce = reader
            .filter_map(|item| item.ok())
            .find_map(|(frame, _)| match frame {
                Frame::Challenge(f) => Some(f.data),
                _ => None,
            })
            .expect("PATH_CHALLENGE frame on the wire");

        let mut buf = bytes::BytesMut::new();
        buf.put_frame(&PathResponseFrame { data: nonce });
        c.recv_packet(Type::Short, 1, buf.freeze()).unwrap();
        assert!(c.path().is_validated());

        let follow_up = c.poll_transmit(1200).expect("room for a NEW_CONNECTION_ID should have opened up");
        let reader = qbase::frame::FrameReader::new(follow_up.payload.freeze(), Type::Short);
        assert!(
            reader
                .filter_map(|item| item.ok())
                .any(|(frame, _)| matches!(frame, Frame::NewConnectionId(_))),
            "validating the path should have replenished the local CID set"
        );
    }
}
