//! Presence broadcaster

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;

use super::{DiscoveryError, DiscoveryResult};
use crate::events::EventSink;
use crate::protocol::{Announcement, Codec, Message};

/// Periodically announces this engine's name and TCP port
pub struct Broadcaster {
    socket: UdpSocket,
    payload: Vec<u8>,
    targets: Vec<SocketAddr>,
    interval: Duration,
    sink: Arc<dyn EventSink>,
}

impl Broadcaster {
    /// Create a broadcaster sending to `target:discovery_port` and the next
    /// `port_span` ports above it
    pub async fn new(
        announcement: &Announcement,
        target: IpAddr,
        discovery_port: u16,
        port_span: u16,
        interval: Duration,
        sink: Arc<dyn EventSink>,
    ) -> DiscoveryResult<Self> {
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], 0));
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| DiscoveryError::BindFailed {
                addr: bind_addr,
                source,
            })?;
        socket.set_broadcast(true)?;

        let payload = Codec::default().encode_to_vec(&Message::Hello(announcement.clone()))?;

        let targets = (0..=port_span)
            .filter_map(|offset| discovery_port.checked_add(offset))
            .map(|port| SocketAddr::new(target, port))
            .collect();

        Ok(Self {
            socket,
            payload,
            targets,
            interval,
            sink,
        })
    }

    pub fn targets(&self) -> &[SocketAddr] {
        &self.targets
    }

    /// Send one announcement to every target; returns how many sends succeeded
    pub async fn announce_once(&self) -> usize {
        let mut sent = 0;
        for target in &self.targets {
            match self.socket.send_to(&self.payload, target).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    tracing::warn!("Broadcast to {} failed: {}", target, e);
                    self.sink.on_log(format!("Broadcast error: {}", e)).await;
                }
            }
        }
        sent
    }

    /// Announce on a fixed interval until the running flag clears
    pub async fn run(self, mut running: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(self.interval);

        while *running.borrow() {
            tokio::select! {
                _ = timer.tick() => {
                    self.announce_once().await;
                }
                changed = running.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Broadcaster stopped");
    }
}
