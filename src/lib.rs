//! LanChat - serverless chat for the local network
//!
//! Peers announce themselves with periodic UDP broadcasts, track each other's
//! liveness, and exchange direct and group messages over short-lived TCP
//! connections. Every message carries a Lamport clock value for ordering.

pub mod clock;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod events;
pub mod network;
pub mod peers;
pub mod protocol;

pub use clock::LamportClock;
pub use config::Config;
pub use engine::{Engine, EngineConfig, EngineError};
pub use events::{ChannelSink, EngineEvent, Envelope, EventSink, Origin, TracingSink};
pub use network::{SendError, SendResult};
pub use peers::{PeerRecord, PeerStatus, PeerTable};
pub use protocol::{ChatMessage, Message, MessageKind};
