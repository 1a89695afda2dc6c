//! Concrete socket knobs from spec §6, applied exactly once: right after a TCP connection
//! transitions to `Connected` (spec §4.7's "apply socket options, enable read-interest" state
//! action) and once at UDP endpoint-open time. `mio`'s `TcpStream`/`UdpSocket` don't expose
//! `SO_LINGER`, keep-alive tuning or DSCP marking directly, so this goes through `socket2`,
//! the conventional escape hatch for raw socket options in the Rust networking ecosystem.

use crate::config::SocketOptionsConfig;
use socket2::SockRef;
use std::io;
use std::net::{IpAddr, Ipv4Addr};

/// Applies the configured socket options to an already-open socket-like value (anything that
/// can produce a `SockRef`, i.e. `mio::net::TcpStream`/`UdpSocket` via `AsFd`/`AsRawFd`).
pub fn apply(options: &SocketOptionsConfig, socket: SockRef<'_>) -> io::Result<()> {
    if let Some(priority) = options.priority {
        apply_priority(&socket, priority)?;
    }

    if let Some(keep_alive) = &options.keep_alive {
        let config = socket2::TcpKeepalive::new()
            .with_time(keep_alive.idle_time)
            .with_interval(keep_alive.interval);
        #[cfg(not(any(target_os = "windows", target_os = "openbsd")))]
        let config = config.with_retries(keep_alive.retry_count);
        socket.set_tcp_keepalive(&config)?;
    }

    if let Some(linger) = options.linger {
        socket.set_linger(Some(linger))?;
    }

    // `nagle_enabled = false` is the common SOME/IP-over-TCP configuration (low-latency
    // request/response); only touch TCP_NODELAY when the socket is actually TCP.
    if socket.r#type()? == socket2::Type::STREAM {
        socket.set_nodelay(!options.nagle_enabled)?;
    }

    Ok(())
}

fn apply_priority(socket: &SockRef<'_>, priority: u8) -> io::Result<()> {
    // DSCP/traffic-class marking; IPv4 uses IP_TOS, IPv6 uses IPV6_TCLASS. `socket2` exposes
    // both as `set_tos`/`set_tclass_v6`.
    match socket.domain()? {
        socket2::Domain::IPV4 => socket.set_tos(u32::from(priority) << 5),
        socket2::Domain::IPV6 => socket.set_tclass_v6(u32::from(priority) << 5),
        _ => Ok(()),
    }
}

/// Joins a multicast group on the interface named by `source_interface`, spec §6. Only
/// meaningful for UDP sockets bound to an endpoint configured as `Multicast`.
pub fn join_multicast(socket: SockRef<'_>, group: IpAddr, source_interface: IpAddr) -> io::Result<()> {
    match (group, source_interface) {
        (IpAddr::V4(group), IpAddr::V4(iface)) => socket.join_multicast_v4(&group, &iface),
        (IpAddr::V6(group), IpAddr::V4(_)) => {
            // No source-interface index available in this shape; join on the default interface.
            socket.join_multicast_v6(&group, 0)
        }
        _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "mismatched multicast address families")),
    }
}

/// Leaves a previously-joined multicast group.
pub fn leave_multicast(socket: SockRef<'_>, group: IpAddr) -> io::Result<()> {
    match group {
        IpAddr::V4(group) => socket.leave_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(group) => socket.leave_multicast_v6(&group, 0),
    }
}
