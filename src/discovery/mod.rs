//! Discovery module
//!
//! Presence on the local network is advertised with periodic UDP broadcast
//! announcements and tracked by a listener that feeds the peer table.

mod broadcaster;
mod listener;
mod resolver;
mod socket;

pub use broadcaster::*;
pub use listener::*;
pub use resolver::*;

use std::net::SocketAddr;
use thiserror::Error;

use crate::protocol::CodecError;

/// Discovery errors
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
