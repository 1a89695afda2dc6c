//! Interning arena for endpoints, spec §3 ("at most one endpoint exists per `(address, port,
//! protocol, secured)`") and §9 ("shared-ownership endpoints... arena keyed by `(address, port,
//! protocol, secured)` with reference-counted handles"). TCP connections already carry their own
//! `acquire`/`release` reference count (multiple local applications may share a connection to the
//! same peer); this module adds the same sharing discipline for UDP endpoints and is the single
//! place that owns either kind. Lookups from a `mio::Token` back to the owning key are kept as a
//! plain `HashMap`, a non-owning back-pointer that sidesteps any cycle between an endpoint and
//! whatever in the reactor is watching it (spec §9 "no cyclic references").

use crate::config::{BulkReadConfig, TransportProtocol};
use crate::tcp::TcpConnection;
use crate::udp::UdpEndpoint;
use mio::Token;
use std::collections::HashMap;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct EndpointKey {
    pub addr: SocketAddr,
    pub protocol: TransportProtocol,
    pub secured: bool,
}

struct UdpEntry {
    endpoint: UdpEndpoint,
    users: u32,
}

/// Owns every live TCP connection and UDP endpoint, interned by `EndpointKey`. The manager never
/// initiates I/O itself; callers pass in an already-constructed connection/endpoint the first
/// time a key is seen, and get back a shared handle on every call after that.
#[derive(Default)]
pub struct EndpointManager {
    tcp: HashMap<EndpointKey, TcpConnection>,
    udp: HashMap<EndpointKey, UdpEntry>,
    tokens: HashMap<Token, EndpointKey>,
}

impl EndpointManager {
    pub fn new() -> EndpointManager {
        EndpointManager::default()
    }

    /// Looks up the TCP connection for `key`, constructing and interning it with `make` if this
    /// is the first caller to reference it, and increments its reference count.
    pub fn acquire_tcp<F>(&mut self, key: EndpointKey, make: F) -> &mut TcpConnection
    where
        F: FnOnce() -> TcpConnection,
    {
        let connection = self.tcp.entry(key).or_insert_with(make);
        connection.acquire();
        connection
    }

    /// Releases one reference to the TCP connection at `key`. Once the count reaches zero the
    /// connection is closed and dropped from the arena; returns `true` in that case.
    pub fn release_tcp(&mut self, key: &EndpointKey) -> bool {
        let Some(connection) = self.tcp.get_mut(key) else { return false };
        if connection.release() {
            connection.close();
            self.tcp.remove(key);
            self.tokens.retain(|_, owner| owner != key);
            true
        } else {
            false
        }
    }

    pub fn tcp_mut(&mut self, key: &EndpointKey) -> Option<&mut TcpConnection> {
        self.tcp.get_mut(key)
    }

    pub fn tcp_count(&self) -> usize {
        self.tcp.len()
    }

    /// Looks up the UDP endpoint for `key`, constructing and interning it with `make` if this is
    /// the first caller to reference it, and increments its reference count.
    pub fn acquire_udp<F>(
        &mut self,
        key: EndpointKey,
        bulk_read: BulkReadConfig,
        collection_threshold: usize,
        reassembly_max_keys: usize,
        reassembly_max_size: usize,
        make_socket: F,
    ) -> std::io::Result<&mut UdpEndpoint>
    where
        F: FnOnce() -> std::io::Result<mio::net::UdpSocket>,
    {
        if !self.udp.contains_key(&key) {
            let socket = make_socket()?;
            let endpoint = UdpEndpoint::new(
                socket,
                reassembly_max_keys,
                reassembly_max_size,
                collection_threshold,
                bulk_read,
            );
            self.udp.insert(key, UdpEntry { endpoint, users: 0 });
        }
        let entry = self.udp.get_mut(&key).expect("just inserted or already present");
        entry.users += 1;
        Ok(&mut entry.endpoint)
    }

    /// Releases one reference to the UDP endpoint at `key`, dropping it from the arena once
    /// unreferenced. Returns `true` when that happened.
    pub fn release_udp(&mut self, key: &EndpointKey) -> bool {
        let Some(entry) = self.udp.get_mut(key) else { return false };
        entry.users = entry.users.saturating_sub(1);
        if entry.users == 0 {
            self.udp.remove(key);
            self.tokens.retain(|_, owner| owner != key);
            true
        } else {
            false
        }
    }

    pub fn udp_mut(&mut self, key: &EndpointKey) -> Option<&mut UdpEndpoint> {
        self.udp.get_mut(key).map(|entry| &mut entry.endpoint)
    }

    pub fn udp_count(&self) -> usize {
        self.udp.len()
    }

    /// Records which endpoint a `mio::Token` belongs to, so a readiness event can be routed back
    /// to its owner without the reactor holding a second owning reference to the endpoint.
    pub fn bind_token(&mut self, token: Token, key: EndpointKey) {
        self.tokens.insert(token, key);
    }

    pub fn owner_of(&self, token: Token) -> Option<&EndpointKey> {
        self.tokens.get(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportProtocol;

    fn key() -> EndpointKey {
        EndpointKey {
            addr: "127.0.0.1:30509".parse().unwrap(),
            protocol: TransportProtocol::Tcp,
            secured: false,
        }
    }

    #[test]
    fn acquiring_twice_shares_one_connection_and_counts_users() {
        let mut manager = EndpointManager::new();
        let key = key();

        manager.acquire_tcp(key, || TcpConnection::new(key.addr, 65536, 1 << 20, 0, 0));
        manager.acquire_tcp(key, || panic!("should not construct twice"));

        assert_eq!(manager.tcp_mut(&key).unwrap().users(), 2);
        assert_eq!(manager.tcp_count(), 1);
    }

    #[test]
    fn release_drops_entry_once_unreferenced() {
        let mut manager = EndpointManager::new();
        let key = key();

        manager.acquire_tcp(key, || TcpConnection::new(key.addr, 65536, 1 << 20, 0, 0));
        assert!(!manager.release_tcp(&key));
        assert_eq!(manager.tcp_count(), 1);

        manager.acquire_tcp(key, || panic!("still interned"));
        assert!(!manager.release_tcp(&key));
        assert!(manager.release_tcp(&key));
        assert_eq!(manager.tcp_count(), 0);
    }

    #[test]
    fn token_lookup_is_cleared_on_release() {
        let mut manager = EndpointManager::new();
        let key = key();
        let token = Token(7);

        manager.acquire_tcp(key, || TcpConnection::new(key.addr, 65536, 1 << 20, 0, 0));
        manager.bind_token(token, key);
        assert_eq!(manager.owner_of(token), Some(&key));

        manager.release_tcp(&key);
        assert_eq!(manager.owner_of(token), None);
    }

    #[test]
    fn udp_endpoints_are_interned_and_refcounted() {
        let mut manager = EndpointManager::new();
        let key = EndpointKey {
            addr: "127.0.0.1:0".parse().unwrap(),
            protocol: TransportProtocol::Udp,
            secured: false,
        };

        manager
            .acquire_udp(key, BulkReadConfig::default(), 0, 16, 65536, || {
                mio::net::UdpSocket::bind("127.0.0.1:0".parse().unwrap())
            })
            .unwrap();
        manager
            .acquire_udp(key, BulkReadConfig::default(), 0, 16, 65536, || {
                panic!("should not bind twice")
            })
            .unwrap();

        assert_eq!(manager.udp_count(), 1);
        assert!(!manager.release_udp(&key));
        assert!(manager.release_udp(&key));
        assert_eq!(manager.udp_count(), 0);
    }
}
