//! UDP socket construction

use std::io;
use std::net::SocketAddrV4;
use tokio::net::UdpSocket;

/// Bind a UDP socket with address (and, where available, port) reuse so that
/// several instances on one host can share the discovery port.
#[cfg(unix)]
pub(crate) fn bind_reusable(addr: SocketAddrV4) -> io::Result<UdpSocket> {
    use nix::sys::socket::{
        bind, setsockopt, socket, sockopt, AddressFamily, SockFlag, SockType, SockaddrIn,
    };
    use std::os::fd::AsRawFd;

    let fd = socket(
        AddressFamily::Inet,
        SockType::Datagram,
        SockFlag::empty(),
        None,
    )?;
    setsockopt(&fd, sockopt::ReuseAddr, &true)?;
    #[cfg(not(any(target_os = "illumos", target_os = "solaris")))]
    setsockopt(&fd, sockopt::ReusePort, &true)?;
    bind(fd.as_raw_fd(), &SockaddrIn::from(addr))?;

    let socket = std::net::UdpSocket::from(fd);
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket)
}

#[cfg(not(unix))]
pub(crate) fn bind_reusable(addr: SocketAddrV4) -> io::Result<UdpSocket> {
    let socket = std::net::UdpSocket::bind(addr)?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket)
}
