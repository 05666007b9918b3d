//! Engine-wide configuration (spec §6 "Configuration options"), plus the
//! recovery/flow-control tunables a connection needs negotiated up front.

use std::path::PathBuf;

use qbase::param::TransportParameters;

/// Knobs for an [`crate::engine::Engine`] and the connections it creates.
///
/// Builder-style: construct with [`Config::default`] and chain `with_*`
/// setters, mirroring the teacher's client/server builders.
#[derive(Debug, Clone)]
pub struct Config {
    pub idle_timeout_ms: u64,
    pub enable_udp_zero_checksums: bool,
    pub tls_key_update_frequency: u32,
    pub version: u32,
    pub enable_spinbit: bool,
    pub enable_tls_key_updates: bool,
    pub disable_active_migration: bool,
    pub enable_zero_len_cid: bool,
    pub num_bufs: usize,
    pub qlog_path: Option<PathBuf>,

    pub max_ack_delay_ms: u64,
    pub max_udp_payload_size: u64,
    pub ack_delay_exponent: u8,
    pub initial_max_data: u64,
    pub initial_max_stream_data_bidi_local: u64,
    pub initial_max_stream_data_bidi_remote: u64,
    pub initial_max_stream_data_uni: u64,
    pub initial_max_streams_bidi: u64,
    pub initial_max_streams_uni: u64,
    pub active_connection_id_limit: u64,
}

impl Default for Config {
    fn default() -> Self {
        let params = TransportParameters::default();
        Self {
            idle_timeout_ms: params.max_idle_timeout_ms,
            enable_udp_zero_checksums: false,
            tls_key_update_frequency: 0,
            version: 1,
            enable_spinbit: false,
            enable_tls_key_updates: false,
            disable_active_migration: params.disable_active_migration,
            enable_zero_len_cid: false,
            num_bufs: 32,
            qlog_path: None,
            max_ack_delay_ms: params.max_ack_delay_ms,
            max_udp_payload_size: params.max_udp_payload_size,
            ack_delay_exponent: params.ack_delay_exponent,
            initial_max_data: params.initial_max_data,
            initial_max_stream_data_bidi_local: params.initial_max_stream_data_bidi_local,
            initial_max_stream_data_bidi_remote: params.initial_max_stream_data_bidi_remote,
            initial_max_stream_data_uni: params.initial_max_stream_data_uni,
            initial_max_streams_bidi: params.initial_max_streams_bidi,
            initial_max_streams_uni: params.initial_max_streams_uni,
            active_connection_id_limit: params.active_connection_id_limit,
        }
    }
}

impl Config {
    pub fn with_idle_timeout_ms(mut self, ms: u64) -> Self {
        self.idle_timeout_ms = ms;
        self
    }

    pub fn with_enable_udp_zero_checksums(mut self, enable: bool) -> Self {
        self.enable_udp_zero_checksums = enable;
        self
    }

    pub fn with_tls_key_update_frequency(mut self, frequency: u32) -> Self {
        self.tls_key_update_frequency = frequency;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_enable_spinbit(mut self, enable: bool) -> Self {
        self.enable_spinbit = enable;
        self
    }

    pub fn with_enable_tls_key_updates(mut self, enable: bool) -> Self {
        self.enable_tls_key_updates = enable;
        self
    }

    pub fn with_disable_active_migration(mut self, disable: bool) -> Self {
        self.disable_active_migration = disable;
        self
    }

    pub fn with_enable_zero_len_cid(mut self, enable: bool) -> Self {
        self.enable_zero_len_cid = enable;
        self
    }

    pub fn with_num_bufs(mut self, num_bufs: usize) -> Self {
        self.num_bufs = num_bufs;
        self
    }

    pub fn with_qlog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.qlog_path = Some(path.into());
        self
    }

    pub fn with_initial_max_data(mut self, max_data: u64) -> Self {
        self.initial_max_data = max_data;
        self
    }

    pub fn with_initial_max_streams_bidi(mut self, max: u64) -> Self {
        self.initial_max_streams_bidi = max;
        self
    }

    pub fn with_initial_max_streams_uni(mut self, max: u64) -> Self {
        self.initial_max_streams_uni = max;
        self
    }

    pub fn with_active_connection_id_limit(mut self, limit: u64) -> Self {
        self.active_connection_id_limit = limit;
        self
    }

    /// The connection ID length new local CIDs are generated with; `0` iff
    /// `enable_zero_len_cid` was set (only meaningful for a client that never
    /// needs the server to demux packets by CID).
    pub fn local_cid_len(&self) -> usize {
        if self.enable_zero_len_cid { 0 } else { 8 }
    }

    /// Project the negotiable subset of this configuration into the
    /// transport parameters a [`qconnection::Connection`] is built with.
    pub fn to_transport_parameters(&self) -> TransportParameters {
        TransportParameters {
            initial_max_data: self.initial_max_data,
            initial_max_stream_data_bidi_local: self.initial_max_stream_data_bidi_local,
            initial_max_stream_data_bidi_remote: self.initial_max_stream_data_bidi_remote,
            initial_max_stream_data_uni: self.initial_max_stream_data_uni,
            initial_max_streams_bidi: self.initial_max_streams_bidi,
            initial_max_streams_uni: self.initial_max_streams_uni,
            max_idle_timeout_ms: self.idle_timeout_ms,
            max_udp_payload_size: self.max_udp_payload_size,
            ack_delay_exponent: self.ack_delay_exponent,
            max_ack_delay_ms: self.max_ack_delay_ms,
            active_connection_id_limit: self.active_connection_id_limit,
            disable_active_migration: self.disable_active_migration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_only_requested_fields() {
        let config = Config::default().with_idle_timeout_ms(5_000).with_num_bufs(4);
        assert_eq!(config.idle_timeout_ms, 5_000);
        assert_eq!(config.num_bufs, 4);
        assert_eq!(config.initial_max_data, TransportParameters::default().initial_max_data);
    }

    #[test]
    fn transport_parameters_reflect_overrides() {
        let config = Config::default().with_initial_max_streams_bidi(7);
        let params = config.to_transport_parameters();
        assert_eq!(params.initial_max_streams_bidi, 7);
    }
}
