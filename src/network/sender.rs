//! LanChat message sender
//!
//! Opens one connection per outbound message. Group sends fan out over the
//! unicast path to every recently seen peer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::connection::{Connection, ConnectionError};
use super::NetworkConfig;
use crate::clock::LamportClock;
use crate::events::{Envelope, EventSink, MessageLog};
use crate::peers::PeerTable;
use crate::protocol::{ChatMessage, Codec, Message, MessageKind};

/// Send errors
#[derive(Error, Debug)]
pub enum SendError {
    #[error("Could not reach {addr}: {source}")]
    Unreachable {
        addr: SocketAddr,
        #[source]
        source: ConnectionError,
    },

    #[error("Delivery to {addr} failed: {source}")]
    Delivery {
        addr: SocketAddr,
        #[source]
        source: ConnectionError,
    },
}

pub type SendResult<T> = Result<T, SendError>;

/// Outbound half of the messaging engine
pub struct MessageSender {
    /// Our display name, stamped on every message
    name: String,
    codec: Codec,
    timeout: Duration,
    /// Peers seen within this window receive group messages
    group_window: Duration,
    clock: Arc<LamportClock>,
    table: Arc<PeerTable>,
    history: Arc<MessageLog>,
    sink: Arc<dyn EventSink>,
}

impl MessageSender {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        config: &NetworkConfig,
        group_window: Duration,
        clock: Arc<LamportClock>,
        table: Arc<PeerTable>,
        history: Arc<MessageLog>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            name: name.into(),
            codec: Codec::new(config.max_frame_size),
            timeout: config.connect_timeout(),
            group_window,
            clock,
            table,
            history,
            sink,
        }
    }

    /// Send a direct message and echo it locally on success
    pub async fn send_unicast(&self, addr: SocketAddr, content: &str) -> SendResult<ChatMessage> {
        let message = self.deliver(addr, MessageKind::Chat, content).await?;
        self.echo(Envelope::local(MessageKind::Chat, message.clone()))
            .await;
        Ok(message)
    }

    /// Send to every peer seen within the group window
    ///
    /// Failures are logged and skipped. Exactly one local echo is emitted,
    /// whatever the number of recipients. Returns the number of deliveries.
    pub async fn send_group(&self, content: &str) -> usize {
        let now = Instant::now();
        let recipients: Vec<SocketAddr> = self
            .table
            .snapshot()
            .into_iter()
            .filter(|peer| peer.seen_within(self.group_window, now))
            .map(|peer| peer.key())
            .collect();

        let mut delivered = 0;
        for addr in &recipients {
            if self.deliver(*addr, MessageKind::Group, content).await.is_ok() {
                delivered += 1;
            }
        }

        tracing::info!(
            "Group message delivered to {}/{} peers",
            delivered,
            recipients.len()
        );

        let echo = ChatMessage::new(self.name.clone(), content, self.clock.value());
        self.echo(Envelope::local(MessageKind::Group, echo)).await;
        delivered
    }

    /// Connect, stamp, write, close. No echo.
    async fn deliver(&self, addr: SocketAddr, kind: MessageKind, content: &str) -> SendResult<ChatMessage> {
        let result = self.try_deliver(addr, kind, content).await;
        if let Err(e) = &result {
            tracing::warn!("{}", e);
            self.sink
                .on_log(format!("Failed to send to {}: {}", addr, e))
                .await;
        }
        result
    }

    async fn try_deliver(&self, addr: SocketAddr, kind: MessageKind, content: &str) -> SendResult<ChatMessage> {
        let mut conn = Connection::connect(addr, self.codec, self.timeout)
            .await
            .map_err(|source| SendError::Unreachable { addr, source })?;

        let body = ChatMessage::new(self.name.clone(), content, self.clock.tick());
        let frame = Message::from_chat(kind, body.clone());

        conn.send_timeout(&frame, self.timeout)
            .await
            .map_err(|source| SendError::Delivery { addr, source })?;
        let _ = conn.close().await;

        tracing::debug!("{} to {} (clock {})", kind, addr, body.lamport_clock);
        Ok(body)
    }

    async fn echo(&self, envelope: Envelope) {
        self.history.push(envelope.clone());
        self.sink.on_message(envelope).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelSink, EngineEvent};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn sender(
        table: Arc<PeerTable>,
        clock: Arc<LamportClock>,
    ) -> (MessageSender, Arc<MessageLog>, mpsc::Receiver<EngineEvent>) {
        let (sink, rx) = ChannelSink::new(64);
        let history = Arc::new(MessageLog::new());
        let sender = MessageSender::new(
            "tester",
            &NetworkConfig::new(0).with_connect_timeout(1000),
            Duration::from_secs(30),
            clock,
            table,
            history.clone(),
            Arc::new(sink),
        );
        (sender, history, rx)
    }

    /// Accept connections and hand back each received frame
    async fn receiver() -> (SocketAddr, mpsc::Receiver<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf).await.unwrap();
                if tx.send(buf).await.is_err() {
                    break;
                }
            }
        });
        (addr, rx)
    }

    async fn closed_port() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_unicast_ticks_clock_and_echoes() {
        let clock = Arc::new(LamportClock::new());
        let (sender, history, mut events) = sender(Arc::new(PeerTable::new()), clock.clone());
        let (addr, mut frames) = receiver().await;

        let sent = sender.send_unicast(addr, "hello").await.unwrap();
        assert_eq!(sent.lamport_clock, 1);
        assert_eq!(clock.value(), 1);

        let frame = frames.recv().await.unwrap();
        let (kind, body) = Codec::default().decode_chat(&frame).unwrap();
        assert_eq!(kind, MessageKind::Chat);
        assert_eq!(body, sent);

        let echoes: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::Message(env) => Some(env),
                _ => None,
            })
            .collect();
        assert_eq!(echoes.len(), 1);
        assert!(echoes[0].is_local());
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_unicast_failure_returned_not_echoed() {
        let (sender, history, mut events) =
            sender(Arc::new(PeerTable::new()), Arc::new(LamportClock::new()));
        let addr = closed_port().await;

        let err = sender.send_unicast(addr, "anyone?").await.unwrap_err();
        assert!(matches!(err, SendError::Unreachable { .. }));
        assert!(history.is_empty());
        assert!(drain(&mut events)
            .iter()
            .all(|e| matches!(e, EngineEvent::Log(_))));
    }

    #[tokio::test]
    async fn test_group_skips_unreachable_peer() {
        let table = Arc::new(PeerTable::new());
        let (a, mut frames_a) = receiver().await;
        let (b, mut frames_b) = receiver().await;
        let dead = closed_port().await;
        for (addr, name) in [(a, "a"), (b, "b"), (dead, "dead")] {
            table.upsert(addr, name);
        }

        let clock = Arc::new(LamportClock::new());
        let (sender, history, mut events) = sender(table, clock.clone());

        assert_eq!(sender.send_group("to all").await, 2);

        for frames in [&mut frames_a, &mut frames_b] {
            let frame = frames.recv().await.unwrap();
            let (kind, body) = Codec::default().decode_chat(&frame).unwrap();
            assert_eq!(kind, MessageKind::Group);
            assert_eq!(body.content, "to all");
        }

        // One tick per delivered copy
        assert_eq!(clock.value(), 2);

        let echoes: Vec<_> = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::Message(_)))
            .collect();
        assert_eq!(echoes.len(), 1);
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_group_skips_stale_peers_and_still_echoes() {
        let table = Arc::new(PeerTable::new());
        let (stale, _frames) = receiver().await;
        table.upsert(stale, "stale");

        let (sink, mut events) = ChannelSink::new(16);
        let sender = MessageSender::new(
            "tester",
            &NetworkConfig::new(0),
            Duration::from_millis(20),
            Arc::new(LamportClock::new()),
            table,
            Arc::new(MessageLog::new()),
            Arc::new(sink),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(sender.send_group("nobody").await, 0);
        let echoes = drain(&mut events);
        assert_eq!(echoes.len(), 1);
        assert!(matches!(&echoes[0], EngineEvent::Message(env) if env.kind == MessageKind::Group));
    }
}
