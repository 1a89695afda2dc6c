//! Configuration shapes consumed by the core (spec §6 `ConfigurationProvider`). Parsing JSON
//! (or any other on-disk format) into these structures is an external collaborator's job —
//! this crate only ever receives already-validated values through the
//! `ConfigurationProvider` trait, the same way `flux::logging::init` takes a parsed
//! `sloggers::LoggerConfig` rather than reading a file itself.

use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Deserialize)]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

/// One entry of the endpoint table: a local bind address plus the properties that govern how
/// its socket is opened and configured (spec §3 "Endpoints").
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub address: IpAddr,
    pub port: u16,
    pub protocol: TransportProtocol,
    pub secured: bool,
    pub mtu: usize,
    /// Name of the `TlsProviderConfig` to use when `secured` is set; ignored otherwise.
    pub tls_provider: Option<String>,
    pub socket_options: SocketOptionsConfig,
}

/// Concrete socket knobs from spec §6, applied once per connection/endpoint open (see
/// `socket_options::SocketOptions`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SocketOptionsConfig {
    /// IP QoS/DSCP traffic class, 0-7.
    pub priority: Option<u8>,
    pub keep_alive: Option<KeepAliveConfig>,
    pub linger: Option<Duration>,
    pub nagle_enabled: bool,
    pub multicast_join: Option<MulticastJoinConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct KeepAliveConfig {
    pub interval: Duration,
    pub retry_count: u32,
    pub idle_time: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MulticastJoinConfig {
    pub group: IpAddr,
    pub source_interface: IpAddr,
}

/// TP parameters for one (service, method/event, direction) entry, spec §4.5.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TpParameters {
    pub segment_length: usize,
    pub separation_time: Duration,
    pub burst_size: usize,
    pub max_message_length: usize,
}

/// TCP error-threshold parameters, spec §4.7. `invalid_limit = 0` disables the mechanism.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ErrorThresholdConfig {
    pub invalid_limit: u32,
    pub valid_run_required: u32,
}

impl Default for ErrorThresholdConfig {
    fn default() -> Self {
        ErrorThresholdConfig { invalid_limit: 0, valid_run_required: 0 }
    }
}

/// UDP bulk-read policy, spec §4.8.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BulkReadConfig {
    pub bulk_read_count: usize,
    pub min_datagrams_to_continue: usize,
    pub max_consecutive_calls: usize,
    pub bulk_read_receive_period: Option<Duration>,
    /// Outbound accumulation threshold; `0` disables coalescing (spec §4.8).
    pub collection_buffer_size_threshold: usize,
}

impl Default for BulkReadConfig {
    fn default() -> Self {
        BulkReadConfig {
            bulk_read_count: 1,
            min_datagrams_to_continue: 1,
            max_consecutive_calls: 1,
            bulk_read_receive_period: None,
            collection_buffer_size_threshold: 0,
        }
    }
}

/// Narrow read-only view over parsed configuration, consumed by the endpoint manager, router
/// and TP engines. Implementations live outside this crate (JSON parsing is out of scope,
/// spec §1); tests use a plain in-memory implementation.
pub trait ConfigurationProvider {
    fn endpoints(&self) -> &[EndpointConfig];
    fn tp_parameters(&self, service_id: u16, method_or_event_id: u16) -> Option<TpParameters>;
    fn error_threshold(&self) -> ErrorThresholdConfig;
    fn bulk_read(&self) -> BulkReadConfig;
}

/// A fixed in-memory `ConfigurationProvider`, suitable for tests and for a daemon binary that
/// has already parsed its configuration elsewhere.
pub struct StaticConfiguration {
    pub endpoints: Vec<EndpointConfig>,
    pub tp_parameters: Vec<((u16, u16), TpParameters)>,
    pub error_threshold: ErrorThresholdConfig,
    pub bulk_read: BulkReadConfig,
}

impl ConfigurationProvider for StaticConfiguration {
    fn endpoints(&self) -> &[EndpointConfig] {
        &self.endpoints
    }

    fn tp_parameters(&self, service_id: u16, method_or_event_id: u16) -> Option<TpParameters> {
        self.tp_parameters
            .iter()
            .find(|((s, m), _)| *s == service_id && *m == method_or_event_id)
            .map(|(_, params)| *params)
    }

    fn error_threshold(&self) -> ErrorThresholdConfig {
        self.error_threshold
    }

    fn bulk_read(&self) -> BulkReadConfig {
        self.bulk_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StaticConfiguration {
        StaticConfiguration {
            endpoints: Vec::new(),
            tp_parameters: vec![(
                (0x1234, 0x8001),
                TpParameters {
                    segment_length: 1408,
                    separation_time: Duration::from_millis(1),
                    burst_size: 2,
                    max_message_length: 65536,
                },
            )],
            error_threshold: ErrorThresholdConfig { invalid_limit: 3, valid_run_required: 2 },
            bulk_read: BulkReadConfig::default(),
        }
    }

    #[test]
    fn looks_up_tp_parameters_by_service_and_event() {
        let config = sample();
        assert!(config.tp_parameters(0x1234, 0x8001).is_some());
        assert!(config.tp_parameters(0x1234, 0x9999).is_none());
    }

    #[test]
    fn default_error_threshold_is_disabled() {
        assert_eq!(ErrorThresholdConfig::default().invalid_limit, 0);
    }
}
