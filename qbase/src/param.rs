//! Transport parameters the peers negotiate during the handshake.
//!
//! Only the subset this transport core actually consumes is modeled here —
//! the external TLS collaborator owns encoding/decoding these into the
//! handshake's `quic_transport_parameters` extension; this crate just needs
//! somewhere to hold the negotiated values once that collaborator hands
//! them over.

use std::time::Duration;

/// Transport parameters relevant to flow control, CID limits, and timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportParameters {
    pub initial_max_data: u64,
    pub initial_max_stream_data_bidi_local: u64,
    pub initial_max_stream_data_bidi_remote: u64,
    pub initial_max_stream_data_uni: u64,
    pub initial_max_streams_bidi: u64,
    pub initial_max_streams_uni: u64,
    pub max_idle_timeout_ms: u64,
    pub max_udp_payload_size: u64,
    pub ack_delay_exponent: u8,
    pub max_ack_delay_ms: u64,
    pub active_connection_id_limit: u64,
    pub disable_active_migration: bool,
}

impl Default for TransportParameters {
    fn default() -> Self {
        Self {
            initial_max_data: 1 << 20,
            initial_max_stream_data_bidi_local: 1 << 16,
            initial_max_stream_data_bidi_remote: 1 << 16,
            initial_max_stream_data_uni: 1 << 16,
            initial_max_streams_bidi: 100,
            initial_max_streams_uni: 100,
            max_idle_timeout_ms: 30_000,
            max_udp_payload_size: 1452,
            ack_delay_exponent: 3,
            max_ack_delay_ms: 25,
            active_connection_id_limit: 4,
            disable_active_migration: false,
        }
    }
}

impl TransportParameters {
    pub fn max_idle_timeout(&self) -> Option<Duration> {
        (self.max_idle_timeout_ms > 0).then(|| Duration::from_millis(self.max_idle_timeout_ms))
    }

    pub fn max_ack_delay(&self) -> Duration {
        Duration::from_millis(self.max_ack_delay_ms)
    }
}

/// Previously-remembered transport parameters from an earlier connection to the
/// same server name, used to size 0-RTT-era sending windows optimistically.
#[derive(Debug, Clone, Default)]
pub struct RememberedParameters {
    pub server_transport_parameters: Option<TransportParameters>,
}
