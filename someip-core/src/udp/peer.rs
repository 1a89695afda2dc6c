//! Per-remote-peer state attached to a UDP endpoint (spec §4.8 "Demux"). For secure endpoints
//! this carries the peer's own `TlsBridge`; for plain endpoints it carries nothing beyond
//! bookkeeping, since the reassembly table itself lives on the endpoint keyed by peer address.

use crate::tls::TlsBridge;
use std::net::SocketAddr;
use std::time::Instant;

pub struct PeerRecord {
    pub addr: SocketAddr,
    pub bridge: Option<TlsBridge<Box<dyn crate::tls::TlsProvider>>>,
    pub last_seen: Instant,
    /// Bytes accumulated for this peer but not yet flushed to the socket (spec §4.8 outbound
    /// accumulation).
    pub outbound_accum: Vec<u8>,
}

impl PeerRecord {
    pub fn new(addr: SocketAddr, now: Instant) -> PeerRecord {
        PeerRecord { addr, bridge: None, last_seen: now, outbound_accum: Vec::new() }
    }

    pub fn secured(addr: SocketAddr, now: Instant, bridge: TlsBridge<Box<dyn crate::tls::TlsProvider>>) -> PeerRecord {
        PeerRecord { addr, bridge: Some(bridge), last_seen: now, outbound_accum: Vec::new() }
    }
}
