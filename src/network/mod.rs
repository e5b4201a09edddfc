//! Network module - Handles TCP message delivery between peers
//!
//! Provides:
//! - Server accepting one message frame per inbound connection
//! - Sender opening one connection per outbound message (unicast or group fan-out)
//! - Connection wrapper for bounded single-frame I/O

mod server;
mod sender;
mod connection;

pub use server::*;
pub use sender::*;
pub use connection::*;

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::{DEFAULT_TCP_PORT, MAX_FRAME_SIZE};

/// Configuration for network operations
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Port to listen on
    pub port: u16,
    /// Connect and send timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Inbound frame read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Maximum frame size
    pub max_frame_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_TCP_PORT,
            connect_timeout_ms: 5000,
            read_timeout_ms: 5000,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl NetworkConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Resolve a hostname to a socket address
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = format!("{}:{}", host, port);
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}
