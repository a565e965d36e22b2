//! TCP transport: line-delimited JSON, one connection per delivery attempt.

use super::wire::{Ack, Message};
use super::{ListenAddress, Transport, TransportError};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::trace;

/// Default frame limit when none is configured (1 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
    io_timeout: Duration,
    max_frame_bytes: usize,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration, io_timeout: Duration, max_frame_bytes: usize) -> Self {
        Self {
            connect_timeout,
            io_timeout,
            max_frame_bytes,
        }
    }

    async fn exchange(
        &self,
        stream: TcpStream,
        message: &Message,
    ) -> Result<Ack, TransportError> {
        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(self.max_frame_bytes));
        let line =
            serde_json::to_string(message).map_err(|e| TransportError::Protocol(e.to_string()))?;
        if line.len() > self.max_frame_bytes {
            return Err(TransportError::Rejected(format!(
                "message of {} bytes exceeds frame limit of {} bytes",
                line.len(),
                self.max_frame_bytes
            )));
        }

        let io_ms = self.io_timeout.as_millis() as u64;
        timeout(self.io_timeout, framed.send(line))
            .await
            .map_err(|_| TransportError::Timeout(io_ms))?
            .map_err(|e| TransportError::Io(e.to_string()))?;

        let reply = timeout(self.io_timeout, framed.next())
            .await
            .map_err(|_| TransportError::Timeout(io_ms))?
            .ok_or_else(|| TransportError::Io("connection closed before acknowledgment".into()))?
            .map_err(|e| TransportError::Io(e.to_string()))?;

        serde_json::from_str(&reply).map_err(|e| TransportError::Protocol(e.to_string()))
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(2),
            Duration::from_secs(5),
            DEFAULT_MAX_FRAME_BYTES,
        )
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn deliver(
        &self,
        addr: &ListenAddress,
        message: &Message,
    ) -> Result<String, TransportError> {
        let target = addr.socket_target();
        let stream = timeout(self.connect_timeout, TcpStream::connect(target.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout.as_millis() as u64))?
            .map_err(|e| TransportError::Connect {
                addr: addr.to_string(),
                detail: e.to_string(),
            })?;

        trace!(addr = %addr, message_id = %message.id, "Connected to recipient");

        match self.exchange(stream, message).await? {
            Ack::Accepted { message_id } => Ok(message_id),
            Ack::Busy => Err(TransportError::Busy),
            Ack::Rejected { reason } => Err(TransportError::Rejected(reason)),
        }
    }
}
