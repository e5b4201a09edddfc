//! LanChat message server
//!
//! Accepts inbound connections and ingests one message frame from each.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use super::connection::{Connection, ConnectionError};
use super::NetworkConfig;
use crate::clock::LamportClock;
use crate::events::{Envelope, EventSink, MessageLog};
use crate::protocol::{ChatMessage, Codec, MessageKind};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Shared state every connection handler needs
pub struct Inbox {
    clock: Arc<LamportClock>,
    history: Arc<MessageLog>,
    sink: Arc<dyn EventSink>,
}

impl Inbox {
    pub fn new(clock: Arc<LamportClock>, history: Arc<MessageLog>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            clock,
            history,
            sink,
        }
    }

    /// Fold the sender's clock in, record the message and notify
    pub async fn deliver(&self, kind: MessageKind, message: ChatMessage, from: SocketAddr) -> Envelope {
        let local = self.clock.observe(message.lamport_clock);
        tracing::debug!(
            "{} from {} ({}), clock {} -> {}",
            kind,
            message.sender,
            from,
            message.lamport_clock,
            local
        );

        let envelope = Envelope::remote(kind, message, from);
        self.history.push(envelope.clone());
        self.sink.on_message(envelope.clone()).await;
        envelope
    }
}

/// TCP accept loop for inbound messages
pub struct MessageServer {
    listener: TcpListener,
    codec: Codec,
    read_timeout: Duration,
    inbox: Arc<Inbox>,
}

impl MessageServer {
    /// Bind the configured port on all interfaces
    pub async fn bind(config: &NetworkConfig, inbox: Inbox) -> ServerResult<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::BindFailed { addr, source })?;

        tracing::info!("Message server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            codec: Codec::new(config.max_frame_size),
            read_timeout: config.read_timeout(),
            inbox: Arc::new(inbox),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until the running flag clears
    pub async fn run(self, mut running: watch::Receiver<bool>) {
        let mut failures: u32 = 0;

        while *running.borrow() {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            failures = 0;
                            tracing::debug!("New connection from {}", addr);

                            let inbox = self.inbox.clone();
                            let codec = self.codec;
                            let read_timeout = self.read_timeout;

                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, codec, read_timeout, inbox).await {
                                    tracing::debug!("Dropped frame from {}: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            failures = failures.saturating_add(1);
                            let delay = accept_backoff(failures);
                            tracing::warn!("Accept error: {} (retrying in {:?})", e, delay);
                            tokio::time::sleep(delay).await;
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

        tracing::info!("Message server stopped");
    }
}

/// Pause after the `failures`-th consecutive accept error
///
/// Doubles from 10ms up to one second, so a persistent error such as
/// descriptor exhaustion does not spin the loop.
fn accept_backoff(failures: u32) -> Duration {
    const BASE_MS: u64 = 10;
    const MAX_MS: u64 = 1000;

    let shift = failures.saturating_sub(1).min(16);
    Duration::from_millis((BASE_MS << shift).min(MAX_MS))
}

/// Handle one inbound connection: read a single frame, deliver it, close
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    codec: Codec,
    read_timeout: Duration,
    inbox: Arc<Inbox>,
) -> Result<(), ConnectionError> {
    let mut conn = Connection::new(stream, addr, codec);
    let (kind, message) = conn.recv_timeout(read_timeout).await?;

    inbox.deliver(kind, message, conn.remote_addr()).await;

    let _ = conn.close().await;
    Ok(())
}
