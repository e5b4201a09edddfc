//! Connection handling for LanChat
//!
//! Every TCP connection carries exactly one frame: the sender writes it and
//! closes, the receiver reads until end of stream or the frame limit.

use bytes::BytesMut;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::{ChatMessage, Codec, CodecError, Message, MessageKind};

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] CodecError),

    #[error("Connection timeout")]
    Timeout,

    #[error("Connection closed")]
    Closed,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Connection statistics
#[derive(Debug, Default, Clone)]
pub struct ConnectionStats {
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
}

/// A single-frame connection to a remote peer
pub struct Connection {
    /// Remote peer address
    remote_addr: SocketAddr,
    /// The TCP stream
    stream: TcpStream,
    /// Frame codec
    codec: Codec,
    /// Read buffer
    read_buf: BytesMut,
    /// Write buffer
    write_buf: BytesMut,
    /// Statistics
    stats: ConnectionStats,
}

impl Connection {
    /// Wrap an established TCP stream
    pub fn new(stream: TcpStream, remote_addr: SocketAddr, codec: Codec) -> Self {
        Self {
            remote_addr,
            stream,
            codec,
            read_buf: BytesMut::with_capacity(codec.max_frame_size()),
            write_buf: BytesMut::new(),
            stats: ConnectionStats::default(),
        }
    }

    /// Open a connection, failing after `timeout`
    pub async fn connect(addr: SocketAddr, codec: Codec, timeout: Duration) -> ConnectionResult<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ConnectionError::Timeout)??;
        Ok(Self::new(stream, addr, codec))
    }

    /// Get the remote address
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Get connection statistics
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Write one message
    pub async fn send(&mut self, message: &Message) -> ConnectionResult<()> {
        self.write_buf.clear();
        self.codec.encode(message, &mut self.write_buf)?;

        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;

        self.stats.bytes_sent += self.write_buf.len() as u64;
        Ok(())
    }

    /// Write one message, failing after `timeout`
    pub async fn send_timeout(&mut self, message: &Message, timeout: Duration) -> ConnectionResult<()> {
        match tokio::time::timeout(timeout, self.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout),
        }
    }

    /// Read the connection's single chat frame
    ///
    /// Reads until the peer closes or one byte past the frame limit, so an
    /// oversized frame is reported instead of silently truncated.
    pub async fn recv(&mut self) -> ConnectionResult<(MessageKind, ChatMessage)> {
        let limit = self.codec.max_frame_size() as u64 + 1;
        let mut reader = (&mut self.stream).take(limit);

        loop {
            let n = reader.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                break;
            }
            self.stats.bytes_received += n as u64;
        }

        if self.read_buf.is_empty() {
            return Err(ConnectionError::Closed);
        }

        Ok(self.codec.decode_chat(&self.read_buf)?)
    }

    /// Read the frame, failing after `timeout`
    pub async fn recv_timeout(&mut self, timeout: Duration) -> ConnectionResult<(MessageKind, ChatMessage)> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout),
        }
    }

    /// Shut down the write half
    pub async fn close(&mut self) -> ConnectionResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
