//! Messaging engine
//!
//! Owns the peer table, the Lamport clock and the running flag, and spawns
//! one task each for the broadcaster, the discovery listener, the liveness
//! monitor and the message server. A subsystem that fails to bind is logged
//! and skipped; the rest keep running.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::LamportClock;
use crate::discovery::{resolve_local_ip, Broadcaster, Listener};
use crate::events::{Envelope, EventSink, MessageLog};
use crate::network::{Inbox, MessageSender, MessageServer, NetworkConfig, SendResult};
use crate::peers::{LivenessMonitor, PeerRecord, PeerTable};
use crate::protocol::{Announcement, ChatMessage, Codec};

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine already running")]
    AlreadyRunning,

    #[error("Engine not running")]
    NotRunning,
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Construction parameters for an engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Display name announced to peers
    pub name: String,
    /// TCP listener and sender settings
    pub network: NetworkConfig,
    /// UDP port announcements are received on
    pub discovery_port: u16,
    /// Destination address of announcements
    pub broadcast_address: IpAddr,
    /// First destination port of announcements
    pub broadcast_port: u16,
    /// Extra announcement ports above `broadcast_port`
    pub broadcast_port_span: u16,
    /// Overrides address resolution for self-filtering
    pub local_address: Option<IpAddr>,
    pub announce_interval: Duration,
    pub sweep_interval: Duration,
    pub offline_after: Duration,
    pub group_window: Duration,
}

impl EngineConfig {
    pub fn new(name: impl Into<String>, tcp_port: u16, discovery_port: u16) -> Self {
        Self {
            name: name.into(),
            network: NetworkConfig::new(tcp_port),
            discovery_port,
            broadcast_address: IpAddr::V4(Ipv4Addr::BROADCAST),
            broadcast_port: discovery_port,
            broadcast_port_span: 0,
            local_address: None,
            announce_interval: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(2),
            offline_after: Duration::from_secs(15),
            group_window: Duration::from_secs(30),
        }
    }
}

/// Peer discovery and messaging engine
pub struct Engine {
    config: EngineConfig,
    table: Arc<PeerTable>,
    clock: Arc<LamportClock>,
    history: Arc<MessageLog>,
    sink: Arc<dyn EventSink>,
    sender: MessageSender,
    /// Running flag shared with every task
    running: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
    local_ip: Option<IpAddr>,
    tcp_addr: Option<SocketAddr>,
}

impl Engine {
    /// Create an engine reporting to `sink`
    pub fn new(config: EngineConfig, sink: Arc<dyn EventSink>) -> Self {
        let table = Arc::new(PeerTable::new());
        let clock = Arc::new(LamportClock::new());
        let history = Arc::new(MessageLog::new());

        let sender = MessageSender::new(
            config.name.clone(),
            &config.network,
            config.group_window,
            clock.clone(),
            table.clone(),
            history.clone(),
            sink.clone(),
        );

        Self {
            config,
            table,
            clock,
            history,
            sink,
            sender,
            running: None,
            tasks: Vec::new(),
            local_ip: None,
            tcp_addr: None,
        }
    }

    /// Start all subsystems
    pub async fn start(&mut self) -> EngineResult<()> {
        if self.running.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let (running_tx, running_rx) = watch::channel(true);
        self.running = Some(running_tx);

        self.tcp_addr = None;

        let local_ip = match self.config.local_address {
            Some(ip) => ip,
            None => resolve_local_ip().await,
        };
        self.local_ip = Some(local_ip);

        tracing::info!(
            "Starting engine '{}' on {} (TCP: {}, UDP: {})",
            self.config.name,
            local_ip,
            self.config.network.port,
            self.config.discovery_port
        );
        self.sink
            .on_log(format!(
                "Starting P2P engine on {} (TCP: {}, UDP: {})",
                local_ip, self.config.network.port, self.config.discovery_port
            ))
            .await;

        // Message server first: its bound port is what we announce
        let inbox = Inbox::new(self.clock.clone(), self.history.clone(), self.sink.clone());
        let mut tcp_port = self.config.network.port;
        match MessageServer::bind(&self.config.network, inbox).await {
            Ok(server) => {
                if let Ok(addr) = server.local_addr() {
                    tcp_port = addr.port();
                    self.tcp_addr = Some(SocketAddr::new(local_ip, tcp_port));
                }
                self.sink.on_log("Chat server listening...".to_string()).await;
                self.tasks.push(tokio::spawn(server.run(running_rx.clone())));
            }
            Err(e) => {
                tracing::error!("Message server disabled: {}", e);
                self.sink.on_log(format!("TCP bind error: {}", e)).await;
            }
        }

        let self_key = SocketAddr::new(local_ip, tcp_port);
        match Listener::bind(
            self.config.discovery_port,
            self_key,
            Codec::new(self.config.network.max_frame_size),
            self.table.clone(),
            self.sink.clone(),
        )
        .await
        {
            Ok(listener) => {
                self.tasks.push(tokio::spawn(listener.run(running_rx.clone())));
            }
            Err(e) => {
                tracing::error!("Discovery listener disabled: {}", e);
                self.sink.on_log(format!("Error binding UDP port: {}", e)).await;
            }
        }

        let announcement = Announcement::new(self.config.name.clone(), tcp_port);
        match Broadcaster::new(
            &announcement,
            self.config.broadcast_address,
            self.config.broadcast_port,
            self.config.broadcast_port_span,
            self.config.announce_interval,
            self.sink.clone(),
        )
        .await
        {
            Ok(broadcaster) => {
                self.tasks.push(tokio::spawn(broadcaster.run(running_rx.clone())));
            }
            Err(e) => {
                tracing::error!("Broadcaster disabled: {}", e);
                self.sink.on_log(format!("Broadcast setup error: {}", e)).await;
            }
        }

        let monitor = LivenessMonitor::new(
            self.table.clone(),
            self.sink.clone(),
            self.config.sweep_interval,
            self.config.offline_after,
        );
        self.tasks.push(tokio::spawn(monitor.run(running_rx)));

        Ok(())
    }

    /// Clear the running flag and wait for the long-lived tasks to exit
    pub async fn stop(&mut self) -> EngineResult<()> {
        let running = self.running.take().ok_or(EngineError::NotRunning)?;
        let _ = running.send(false);

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!("Engine task ended abnormally: {}", e);
            }
        }

        tracing::info!("Engine '{}' stopped", self.config.name);
        Ok(())
    }

    /// Send a direct message; echoed locally on success
    pub async fn send_unicast(&self, addr: SocketAddr, content: &str) -> SendResult<ChatMessage> {
        self.sender.send_unicast(addr, content).await
    }

    /// Send to every recently seen peer; returns the number of deliveries
    pub async fn send_group(&self, content: &str) -> usize {
        self.sender.send_group(content).await
    }

    /// Snapshot of the peer table
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.table.snapshot()
    }

    /// Message log ordered by Lamport value
    pub fn messages(&self) -> Vec<Envelope> {
        self.history.ordered()
    }

    /// Current Lamport clock value
    pub fn clock(&self) -> u64 {
        self.clock.value()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Resolved local address, once started
    pub fn local_ip(&self) -> Option<IpAddr> {
        self.local_ip
    }

    /// Address peers reach our message server on, if it is running
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.send(false);
        }
    }
}
