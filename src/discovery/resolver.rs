//! Local address resolution
//!
//! Aims a connectionless UDP socket at a public address so the OS picks the
//! outbound interface. Nothing is sent.

use std::io;
use std::net::{IpAddr, Ipv4Addr};
use tokio::net::UdpSocket;

/// Target used only for route selection
pub const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

/// Placeholder used when no route exists
pub const LOOPBACK_PLACEHOLDER: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Resolve the address this host uses on the local network
///
/// Falls back to the loopback placeholder; self-filtering of announcements is
/// then best-effort.
pub async fn resolve_local_ip() -> IpAddr {
    match probe_route(ROUTE_PROBE_ADDR).await {
        Ok(ip) => ip,
        Err(e) => {
            tracing::warn!(
                "Could not resolve local address ({}), using {}",
                e,
                LOOPBACK_PLACEHOLDER
            );
            LOOPBACK_PLACEHOLDER
        }
    }
}

/// Local address the OS would use to reach `target`
pub async fn probe_route(target: &str) -> io::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(target).await?;
    let ip = socket.local_addr()?.ip();

    if ip.is_unspecified() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no route to probe address",
        ));
    }
    Ok(ip)
}
