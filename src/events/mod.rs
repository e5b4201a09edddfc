//! Outbound event interface
//!
//! The engine reports to its collaborators (CLI, GUI, test harness) through
//! the [`EventSink`] trait. Collaborators only ever receive snapshots.

mod history;

pub use history::*;

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::peers::PeerRecord;
use crate::protocol::{ChatMessage, MessageKind};

/// Where a delivered message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Echo of a message this engine sent
    Local,
    /// Received from the given transport address
    Remote(SocketAddr),
}

/// A chat message together with its delivery metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: MessageKind,
    pub message: ChatMessage,
    pub origin: Origin,
}

impl Envelope {
    pub fn remote(kind: MessageKind, message: ChatMessage, from: SocketAddr) -> Self {
        Self {
            kind,
            message,
            origin: Origin::Remote(from),
        }
    }

    pub fn local(kind: MessageKind, message: ChatMessage) -> Self {
        Self {
            kind,
            message,
            origin: Origin::Local,
        }
    }

    pub fn is_local(&self) -> bool {
        self.origin == Origin::Local
    }

    /// Lamport value first, wall clock as tie-breaker
    pub fn cmp_causal(&self, other: &Envelope) -> std::cmp::Ordering {
        self.message
            .lamport_clock
            .cmp(&other.message.lamport_clock)
            .then_with(|| self.message.timestamp.total_cmp(&other.message.timestamp))
    }
}

/// Receiver of engine notifications
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Human-readable status line
    async fn on_log(&self, text: String);

    /// Full peer set after a membership or liveness change
    async fn on_peer_list_update(&self, peers: Vec<PeerRecord>);

    /// A message was received, or a local send should be echoed
    async fn on_message(&self, envelope: Envelope);
}

/// Events forwarded by [`ChannelSink`]
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Log(String),
    PeerListUpdate(Vec<PeerRecord>),
    Message(Envelope),
}

/// Sink that forwards notifications into a bounded mpsc channel
///
/// Never waits for the receiver: when the channel is full the event is
/// dropped, so a stalled consumer cannot hold up the engine's tasks.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver its events arrive on
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    fn forward(&self, event: EngineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::debug!("Event channel full, dropping {:?}", event);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Event receiver dropped");
            }
        }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn on_log(&self, text: String) {
        self.forward(EngineEvent::Log(text));
    }

    async fn on_peer_list_update(&self, peers: Vec<PeerRecord>) {
        self.forward(EngineEvent::PeerListUpdate(peers));
    }

    async fn on_message(&self, envelope: Envelope) {
        self.forward(EngineEvent::Message(envelope));
    }
}

/// Sink that only writes to the tracing subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn on_log(&self, text: String) {
        tracing::info!("{}", text);
    }

    async fn on_peer_list_update(&self, peers: Vec<PeerRecord>) {
        let online = peers.iter().filter(|p| p.is_online()).count();
        tracing::info!("Peer list: {} known, {} online", peers.len(), online);
    }

    async fn on_message(&self, envelope: Envelope) {
        tracing::info!(
            "[{}] {}: {} (clock {})",
            envelope.kind,
            envelope.message.sender,
            envelope.message.content,
            envelope.message.lamport_clock
        );
    }
}
