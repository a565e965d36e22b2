//! Point-to-point transport between the router and agent execution contexts.

pub mod address;
pub mod tcp;
pub mod wire;

pub use address::{Host, ListenAddress};
pub use tcp::TcpTransport;
pub use wire::{Ack, Message, SenderRef};

use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single delivery attempt.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connect to {addr} failed: {detail}")]
    Connect { addr: String, detail: String },

    #[error("i/o error: {0}")]
    Io(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("recipient inbox is full")]
    Busy,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Rejected(_))
    }
}

/// Delivers one message to a listen address and returns the accepted message id.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, addr: &ListenAddress, message: &Message)
        -> Result<String, TransportError>;
}
