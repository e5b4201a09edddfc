//! Announcement listener

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;

use super::socket::bind_reusable;
use super::{DiscoveryError, DiscoveryResult};
use crate::events::EventSink;
use crate::peers::{PeerTable, UpsertOutcome};
use crate::protocol::Codec;

/// Receives announcements and records them in the peer table
pub struct Listener {
    socket: UdpSocket,
    codec: Codec,
    table: Arc<PeerTable>,
    sink: Arc<dyn EventSink>,
    /// This engine's own `(resolved address, tcp port)`
    self_key: SocketAddr,
}

impl Listener {
    /// Bind the discovery port on all interfaces
    pub async fn bind(
        discovery_port: u16,
        self_key: SocketAddr,
        codec: Codec,
        table: Arc<PeerTable>,
        sink: Arc<dyn EventSink>,
    ) -> DiscoveryResult<Self> {
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, discovery_port);
        let socket = bind_reusable(addr).map_err(|source| DiscoveryError::BindFailed {
            addr: SocketAddr::V4(addr),
            source,
        })?;

        Ok(Self::with_socket(socket, self_key, codec, table, sink))
    }

    /// Wrap an already bound socket
    pub fn with_socket(
        socket: UdpSocket,
        self_key: SocketAddr,
        codec: Codec,
        table: Arc<PeerTable>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            socket,
            codec,
            table,
            sink,
            self_key,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Process one datagram from `from`
    ///
    /// Returns `None` when the datagram was dropped (malformed or our own).
    pub async fn handle_datagram(&self, buf: &[u8], from: SocketAddr) -> Option<UpsertOutcome> {
        let hello = match self.codec.decode_announcement(buf) {
            Ok(hello) => hello,
            Err(e) => {
                tracing::debug!("Dropping datagram from {}: {}", from, e);
                return None;
            }
        };

        let key = SocketAddr::new(from.ip(), hello.port);
        if key == self.self_key {
            return None;
        }

        let outcome = self.table.upsert(key, &hello.user);
        match outcome {
            UpsertOutcome::Inserted => {
                tracing::info!("Found peer {} at {}", hello.user, key);
                self.sink
                    .on_log(format!("Found peer: {} ({})", hello.user, key))
                    .await;
            }
            UpsertOutcome::Revived => {
                tracing::info!("Peer {} at {} back online", hello.user, key);
                self.sink
                    .on_log(format!("Peer {} back online", hello.user))
                    .await;
            }
            UpsertOutcome::Refreshed => {}
        }

        if outcome.newly_online() {
            self.sink.on_peer_list_update(self.table.snapshot()).await;
        }
        Some(outcome)
    }

    /// Receive until the running flag clears
    pub async fn run(self, mut running: watch::Receiver<bool>) {
        let mut buf = vec![0u8; self.codec.max_frame_size()];

        while *running.borrow() {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((n, from)) => {
                            self.handle_datagram(&buf[..n], from).await;
                        }
                        Err(e) => {
                            tracing::debug!("Discovery receive error: {}", e);
                        }
                    }
                }
                changed = running.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Discovery listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelSink, EngineEvent};
    use tokio::sync::mpsc;

    async fn listener(self_key: SocketAddr) -> (Listener, Arc<PeerTable>, mpsc::Receiver<EngineEvent>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let table = Arc::new(PeerTable::new());
        let (sink, rx) = ChannelSink::new(32);
        let listener = Listener::with_socket(
            socket,
            self_key,
            Codec::default(),
            table.clone(),
            Arc::new(sink),
        );
        (listener, table, rx)
    }

    fn hello(user: &str, port: u16) -> Vec<u8> {
        format!(r#"{{"type": "HELLO", "user": "{}", "port": {}}}"#, user, port).into_bytes()
    }

    #[tokio::test]
    async fn test_new_peer_emits_single_update() {
        let (listener, table, mut rx) = listener(SocketAddr::from(([192, 168, 1, 2], 6000))).await;
        let from = SocketAddr::from(([192, 168, 1, 7], 54321));

        assert_eq!(
            listener.handle_datagram(&hello("bob", 6001), from).await,
            Some(UpsertOutcome::Inserted)
        );
        assert_eq!(
            listener.handle_datagram(&hello("bob", 6001), from).await,
            Some(UpsertOutcome::Refreshed)
        );

        assert_eq!(table.len(), 1);
        let record = table.get(&SocketAddr::from(([192, 168, 1, 7], 6001))).unwrap();
        assert_eq!(record.display_name, "bob");

        drop(listener);
        let mut updates = 0;
        while let Some(event) = rx.recv().await {
            if let EngineEvent::PeerListUpdate(peers) = event {
                assert_eq!(peers.len(), 1);
                updates += 1;
            }
        }
        assert_eq!(updates, 1);
    }

    #[tokio::test]
    async fn test_offline_peer_back_online() {
        let (listener, table, mut rx) = listener(SocketAddr::from(([192, 168, 1, 2], 6000))).await;
        let from = SocketAddr::from(([192, 168, 1, 8], 40000));

        listener.handle_datagram(&hello("dora", 6000), from).await;
        let gone = table.sweep_at(
            std::time::Duration::from_secs(15),
            std::time::Instant::now() + std::time::Duration::from_secs(16),
        );
        assert_eq!(gone.len(), 1);

        assert_eq!(
            listener.handle_datagram(&hello("dora", 6000), from).await,
            Some(UpsertOutcome::Revived)
        );
        assert_eq!(
            listener.handle_datagram(&hello("dora", 6000), from).await,
            Some(UpsertOutcome::Refreshed)
        );
        assert!(table.snapshot()[0].is_online());

        drop(listener);
        let mut logs = Vec::new();
        let mut updates = 0;
        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::Log(text) => logs.push(text),
                EngineEvent::PeerListUpdate(peers) => {
                    assert!(peers.iter().all(|p| p.is_online()));
                    updates += 1;
                }
                EngineEvent::Message(_) => panic!("unexpected message"),
            }
        }
        // One update for the first sighting, one for the revival
        assert_eq!(updates, 2);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1], "Peer dora back online");
    }

    #[tokio::test]
    async fn test_own_announcement_ignored() {
        let own = SocketAddr::from(([192, 168, 1, 2], 6000));
        let (listener, table, _rx) = listener(own).await;

        let from = SocketAddr::from(([192, 168, 1, 2], 40000));
        assert!(listener.handle_datagram(&hello("me", 6000), from).await.is_none());
        assert!(table.is_empty());

        // Same host, different instance
        assert!(listener.handle_datagram(&hello("twin", 6001), from).await.is_some());
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_datagrams_dropped() {
        let (listener, table, _rx) = listener(SocketAddr::from(([10, 0, 0, 1], 6000))).await;
        let from = SocketAddr::from(([10, 0, 0, 9], 1234));

        for junk in [
            &b"garbage"[..],
            br#"{"type": "HELLO", "user": "x"}"#,
            br#"{"type": "CHAT", "msg_id": "1", "sender": "x", "content": "y", "timestamp": 1.0}"#,
            br#"{"type": "WHO", "user": "x", "port": 1}"#,
        ] {
            assert!(listener.handle_datagram(junk, from).await.is_none());
        }
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_run_receives_from_socket() {
        let (listener, table, _rx) = listener(SocketAddr::from(([10, 0, 0, 1], 6000))).await;
        let addr = listener.local_addr().unwrap();
        let (running_tx, running_rx) = watch::channel(true);
        let task = tokio::spawn(listener.run(running_rx));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"noise", addr).await.unwrap();
        sender.send_to(&hello("carol", 6100), addr).await.unwrap();

        for _ in 0..50 {
            if !table.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(table.snapshot()[0].display_name, "carol");

        running_tx.send(false).unwrap();
        task.await.unwrap();
    }
}
