//! Standalone binary wiring `someip-core`'s reactor, endpoint manager, packet router and
//! interface monitor into a running daemon process. Grounded on the authenticator service's
//! `main.rs`: a `clap::App` for argument parsing, a config file loaded with `serde_json`, and
//! `daemon_support::logging` for the root logger — generalized from that service's one-shot HTTP
//! setup into a long-running reactor loop (spec §5).

use clap::{App, Arg};
use daemon_support::logging::{self, Logger};
use mio::net::{TcpListener, UdpSocket};
use mio::Token;
use serde::Deserialize;
use someip_core::config::{
    BulkReadConfig, ConfigurationProvider, EndpointConfig, ErrorThresholdConfig, StaticConfiguration,
    TpParameters, TransportProtocol,
};
use someip_core::endpoint_manager::{EndpointKey, EndpointManager};
use someip_core::header::SomeIpHeader;
use someip_core::interface_monitor::{InterfaceMonitor, LinkState};
use someip_core::reactor::{Reactor, ReactorEvent};
use someip_core::router::{PacketRouter, RouteOutcome};
use someip_core::tcp::TcpConnection;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::net::SocketAddr;

const DEFAULT_MAX_PAYLOAD: usize = 1 << 20;
const DEFAULT_MAX_QUEUED_BYTES: usize = 4 << 20;
const REASSEMBLY_MAX_KEYS: usize = 256;
const REASSEMBLY_MAX_SIZE: usize = 1 << 20;

#[derive(Deserialize)]
struct TpParameterEntry {
    service_id: u16,
    method_or_event_id: u16,
    parameters: TpParameters,
}

#[derive(Deserialize)]
struct DaemonConfigFile {
    endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    tp_parameters: Vec<TpParameterEntry>,
    #[serde(default)]
    error_threshold: ErrorThresholdConfig,
    #[serde(default)]
    bulk_read: BulkReadConfig,
}

fn load_configuration(path: &str) -> StaticConfiguration {
    let file = fs::File::open(path).expect("error opening config file");
    let parsed: DaemonConfigFile = serde_json::from_reader(file).expect("error parsing config file");

    StaticConfiguration {
        endpoints: parsed.endpoints,
        tp_parameters: parsed
            .tp_parameters
            .into_iter()
            .map(|entry| ((entry.service_id, entry.method_or_event_id), entry.parameters))
            .collect(),
        error_threshold: parsed.error_threshold,
        bulk_read: parsed.bulk_read,
    }
}

/// Encodes a complete SOME/IP message (header plus payload) ready to hand to a connection or
/// endpoint's send path.
fn encode_message(header: &SomeIpHeader, payload: &[u8]) -> Vec<u8> {
    let mut wire = vec![0u8; someip_core::header::SOMEIP_HEADER_SIZE];
    header.encode(&mut wire).expect("header buffer is large enough");
    wire.extend_from_slice(payload);
    wire
}

/// Owns everything the reactor loop touches across iterations.
struct Daemon {
    log: Logger,
    reactor: Reactor,
    endpoints: EndpointManager,
    router: PacketRouter<SocketAddr>,
    interfaces: InterfaceMonitor,
    listeners: HashMap<Token, TcpListener>,
    next_token: usize,
    config: StaticConfiguration,
}

impl Daemon {
    fn new(log: Logger, config: StaticConfiguration) -> io::Result<Daemon> {
        Ok(Daemon {
            log,
            reactor: Reactor::new(1024)?,
            endpoints: EndpointManager::new(),
            router: PacketRouter::new(),
            interfaces: InterfaceMonitor::new(),
            listeners: HashMap::new(),
            next_token: 1,
            config,
        })
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Opens every endpoint named in the configuration: a listening socket for TCP, a bound
    /// datagram socket (interned immediately) for UDP. Spec §4.11: every endpoint's local
    /// address is also registered with the interface monitor so a later link-down notification
    /// can find it.
    fn open_configured_endpoints(&mut self) -> io::Result<()> {
        let endpoints = self.config.endpoints().to_vec();
        for endpoint in &endpoints {
            self.interfaces.observe(&endpoint.address.to_string());
            self.open_endpoint(endpoint)?;
        }
        Ok(())
    }

    /// Opens a single configured endpoint, used both at startup and to reopen an endpoint whose
    /// interface has just come back up (spec §4.11, §8 scenario 6 "Link flap").
    fn open_endpoint(&mut self, endpoint: &EndpointConfig) -> io::Result<()> {
        let addr = SocketAddr::new(endpoint.address, endpoint.port);
        match endpoint.protocol {
            TransportProtocol::Tcp => {
                let mut listener = TcpListener::bind(addr)?;
                let token = self.alloc_token();
                self.reactor.registry().register(&mut listener, token, mio::Interest::READABLE)?;
                logging::info!(self.log, "listening"; "addr" => %addr, "protocol" => "tcp");
                self.listeners.insert(token, listener);
            }
            TransportProtocol::Udp => {
                let key = EndpointKey { addr, protocol: TransportProtocol::Udp, secured: endpoint.secured };
                let bulk_read = self.config.bulk_read();
                let udp_endpoint = self.endpoints.acquire_udp(
                    key,
                    bulk_read,
                    bulk_read.collection_buffer_size_threshold,
                    REASSEMBLY_MAX_KEYS,
                    endpoint.mtu.max(REASSEMBLY_MAX_SIZE),
                    || UdpSocket::bind(addr),
                )?;
                let token = self.alloc_token();
                udp_endpoint.register(self.reactor.registry(), token)?;
                self.endpoints.bind_token(token, key);
                logging::info!(self.log, "listening"; "addr" => %addr, "protocol" => "udp");
            }
        }
        Ok(())
    }

    /// Closes whatever is currently listening/bound at `addr`, used when the hosting interface
    /// goes down (spec §4.11). TCP's listener is dropped outright; a UDP endpoint goes through
    /// the endpoint manager's normal release path so any other user of it is respected (though
    /// in practice a configured endpoint has exactly one).
    fn close_endpoint(&mut self, addr: SocketAddr, protocol: TransportProtocol, secured: bool) {
        match protocol {
            TransportProtocol::Tcp => {
                let token = self
                    .listeners
                    .iter()
                    .find(|(_, listener)| listener.local_addr().ok() == Some(addr))
                    .map(|(token, _)| *token);
                if let Some(token) = token {
                    if let Some(mut listener) = self.listeners.remove(&token) {
                        let _ = self.reactor.registry().deregister(&mut listener);
                    }
                }
            }
            TransportProtocol::Udp => {
                let key = EndpointKey { addr, protocol: TransportProtocol::Udp, secured };
                if let Some(endpoint) = self.endpoints.udp_mut(&key) {
                    let _ = endpoint.deregister(self.reactor.registry());
                }
                self.endpoints.release_udp(&key);
            }
        }
    }

    /// Drains queued link transitions and opens/closes the endpoints hosted on the affected
    /// interface accordingly (spec §4.11, §8 scenario 6 "Link flap").
    fn handle_link_changes(&mut self) {
        let changes: Vec<_> = self.interfaces.changes().collect();
        if changes.is_empty() {
            return;
        }

        let endpoints = self.config.endpoints().to_vec();
        for change in changes {
            for endpoint in endpoints.iter().filter(|e| e.address.to_string() == change.interface) {
                let addr = SocketAddr::new(endpoint.address, endpoint.port);
                match change.state {
                    LinkState::Down => {
                        logging::warn!(self.log, "interface down, closing endpoint"; "addr" => %addr);
                        self.close_endpoint(addr, endpoint.protocol, endpoint.secured);
                    }
                    LinkState::Up => {
                        logging::info!(self.log, "interface up, reopening endpoint"; "addr" => %addr);
                        if let Err(err) = self.open_endpoint(endpoint) {
                            logging::error!(self.log, "failed to reopen endpoint"; "addr" => %addr, "error" => %err);
                        }
                    }
                }
            }
        }
    }

    fn accept_loop(&mut self, token: Token) -> io::Result<()> {
        let Some(listener) = self.listeners.get_mut(&token) else { return Ok(()) };

        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let key = EndpointKey { addr: peer, protocol: TransportProtocol::Tcp, secured: false };
                    let error_threshold = self.config.error_threshold();
                    let connection = self.endpoints.acquire_tcp(key, || {
                        TcpConnection::new(
                            peer,
                            DEFAULT_MAX_PAYLOAD,
                            DEFAULT_MAX_QUEUED_BYTES,
                            error_threshold.invalid_limit,
                            error_threshold.valid_run_required,
                        )
                    });
                    connection.accept(stream);
                    let conn_token = self.alloc_token();
                    connection.register(self.reactor.registry(), conn_token)?;
                    self.endpoints.bind_token(conn_token, key);
                    logging::info!(self.log, "accepted connection"; "peer" => %peer);
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Routes one inbound message, replying with a SOME/IP error response when it is unroutable
    /// and the reply can actually be sent back (method requests only, spec §4.9).
    fn route_and_log(&mut self, origin: SocketAddr, header: SomeIpHeader) -> Option<(SocketAddr, SomeIpHeader)> {
        match self.router.route_inbound(&header) {
            RouteOutcome::Local(instance_id) => {
                logging::debug!(self.log, "routed to local instance"; "instance_id" => instance_id, "service_id" => header.service_id);
                None
            }
            RouteOutcome::Remote(remote, instance_id) => {
                logging::debug!(self.log, "routed to remote instance"; "instance_id" => instance_id, "peer" => %remote);
                None
            }
            RouteOutcome::Unroutable(code) => {
                logging::warn!(self.log, "unroutable message"; "service_id" => header.service_id, "code" => code);
                PacketRouter::<SocketAddr>::error_response(&header, code).map(|response| (origin, response))
            }
        }
    }

    fn run(&mut self) -> io::Result<()> {
        loop {
            let events = self.reactor.poll()?;
            self.handle_link_changes();
            for event in events {
                let ReactorEvent::Io { token, readable, .. } = event else { continue };
                if !readable {
                    continue;
                }

                if self.listeners.contains_key(&token) {
                    if let Err(err) = self.accept_loop(token) {
                        logging::error!(self.log, "accept failed"; "error" => %err);
                    }
                    continue;
                }

                let Some(key) = self.endpoints.owner_of(token).copied() else { continue };
                match key.protocol {
                    TransportProtocol::Tcp => self.drain_tcp(key),
                    TransportProtocol::Udp => self.drain_udp(key),
                }
            }
        }
    }

    fn drain_tcp(&mut self, key: EndpointKey) {
        let now = std::time::Instant::now();
        let Some(connection) = self.endpoints.tcp_mut(&key) else { return };

        let result = connection.on_readable(now);
        let tripped = connection.record_outcome(&result);
        let Ok(messages) = result else {
            logging::warn!(self.log, "tcp read error"; "peer" => %key.addr);
            if tripped {
                self.endpoints.release_tcp(&key);
            }
            return;
        };

        let mut replies = Vec::new();
        for message in messages {
            if let Some(reply) = self.route_and_log(key.addr, message.header) {
                replies.push(reply);
            }
        }

        if let Some(connection) = self.endpoints.tcp_mut(&key) {
            for (_, reply_header) in replies {
                let wire = encode_message(&reply_header, &[]);
                let _ = connection.send(wire);
            }
        }
    }

    fn drain_udp(&mut self, key: EndpointKey) {
        let now = std::time::Instant::now();
        let Some(endpoint) = self.endpoints.udp_mut(&key) else { return };

        let Ok(messages) = endpoint.on_readable(now) else {
            logging::warn!(self.log, "udp read error"; "addr" => %key.addr);
            return;
        };

        let mut replies = Vec::new();
        for message in messages {
            if let Some(reply) = self.route_and_log(message.peer, message.header) {
                replies.push(reply);
            }
        }

        if let Some(endpoint) = self.endpoints.udp_mut(&key) {
            for (peer, reply_header) in replies {
                let wire = encode_message(&reply_header, &[]);
                let _ = endpoint.send(peer, &wire, now);
            }
        }
    }
}

fn main() {
    let matches = App::new("SOME/IP Daemon")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs the SOME/IP transport and dispatch daemon.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the daemon's JSON configuration file")
                .required(true),
        )
        .arg(Arg::with_name("verbose").short("v").long("verbose").help("Enable debug logging"))
        .get_matches();

    let config_file_path = matches.value_of("CONFIG_FILE").unwrap();
    let verbose = matches.is_present("verbose");

    let log = logging::root_logger(verbose);
    logging::info!(log, "starting someip daemon");

    let config = load_configuration(config_file_path);
    let mut daemon = Daemon::new(log.clone(), config).expect("failed to initialize reactor");

    daemon.open_configured_endpoints().expect("failed to open configured endpoints");
    logging::info!(daemon.log, "entering reactor loop");

    if let Err(err) = daemon.run() {
        logging::error!(daemon.log, "reactor loop exited"; "error" => %err);
    }
}
