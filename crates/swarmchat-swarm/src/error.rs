//! Error types for the swarm transport

use std::net::SocketAddr;

/// Failures joining the swarm or establishing a connection
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Handshake failed: {reason}")]
    Handshake { reason: String },
    #[error("Peer joined a different topic ({remote})")]
    TopicMismatch { remote: String },
    #[error("Refusing connection to ourselves")]
    SelfConnection,
    #[error("Timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    #[error("Invalid key: {reason}")]
    InvalidKey { reason: String },
    #[error("Swarm event channel closed")]
    EventChannelClosed,
}

impl SwarmError {
    pub(crate) fn handshake(reason: impl Into<String>) -> Self {
        SwarmError::Handshake {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SwarmError>;
