//! Multicast socket setup for the sonar receiver

use crate::config::SonarConfig;
use crate::error::Result;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

/// Blocking receive timeout; bounds how long a reconfiguration waits
pub const RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Bind to the sonar port and join the multicast group.
///
/// The port is bound with `SO_REUSEADDR` so other listeners on the same
/// group can coexist. Binds the wildcard address first. Some platforms
/// (macOS) refuse that when another process holds the port, so a failed
/// bind is retried on the group address itself before giving up.
pub fn open_multicast(config: &SonarConfig) -> Result<UdpSocket> {
    let group = config.group()?;

    let socket = match bind_reusable(Ipv4Addr::UNSPECIFIED, config.port) {
        Ok(socket) => socket,
        Err(e) => {
            log::debug!(
                "Bind 0.0.0.0:{} failed ({}), retrying on {}:{}",
                config.port,
                e,
                group,
                config.port
            );
            bind_reusable(group, config.port)?
        }
    };

    socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_read_timeout(Some(RECV_TIMEOUT))?;
    Ok(socket)
}

/// UDP socket bound to `addr:port` with address reuse enabled
pub fn bind_reusable(addr: Ipv4Addr, port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddr::from((addr, port)).into())?;
    Ok(socket.into())
}

/// Whether a receive error is just the read timeout expiring
#[inline]
pub fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}
