//! Protocol module - Defines the wire formats for LanChat communication
//!
//! Two formats share one JSON tagged union:
//! - UDP discovery datagrams: `{"type": "HELLO", "user": .., "port": ..}`
//! - TCP message frames: `{"type": "CHAT" | "GROUP", "msg_id": .., "sender": ..,
//!   "content": .., "timestamp": .., "lamport_clock": ..}`
//!
//! Each TCP connection carries exactly one frame; the frame ends when the
//! sender closes its write half.

mod message;
mod codec;

pub use message::*;
pub use codec::*;

/// Default TCP port for message frames
pub const DEFAULT_TCP_PORT: u16 = 6000;

/// Default UDP port for discovery datagrams
pub const DEFAULT_DISCOVERY_PORT: u16 = 5005;

/// Largest datagram or frame accepted on the wire
pub const MAX_FRAME_SIZE: usize = 4096;

/// Derive a discovery port from a TCP port so that several instances on one
/// host (6000/7000, 6001/7001, ...) do not collide.
pub fn derived_discovery_port(tcp_port: u16) -> u16 {
    let offset = tcp_port.saturating_sub(DEFAULT_TCP_PORT);
    7000u16.saturating_add(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_discovery_port() {
        assert_eq!(derived_discovery_port(6000), 7000);
        assert_eq!(derived_discovery_port(6002), 7002);
        // Ports below the base fall back to the base offset
        assert_eq!(derived_discovery_port(80), 7000);
    }
}
