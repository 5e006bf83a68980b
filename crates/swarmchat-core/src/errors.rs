//! Error types for the SwarmChat session layer
//!
//! Every error here is recoverable: decode and send failures are logged by
//! the caller and the affected session stays registered.

use crate::types::PeerIdentifier;

// ----------------------------------------------------------------------------
// Codec Errors
// ----------------------------------------------------------------------------

/// Failure to turn inbound bytes into a [`Message`](crate::Message)
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed message: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("Invalid message: {reason}")]
    InvalidMessage { reason: String },
}

impl DecodeError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        DecodeError::InvalidMessage {
            reason: reason.into(),
        }
    }
}

/// Failure to serialize an outbound message
#[derive(Debug, thiserror::Error)]
#[error("Failed to encode message: {0}")]
pub struct EncodeError(#[from] pub serde_json::Error);

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Errors reported by a session stream or the transport behind it
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Stream is closed")]
    Closed,
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
}

// ----------------------------------------------------------------------------
// Send Errors
// ----------------------------------------------------------------------------

/// Failure to deliver a message to one session
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("No session registered for peer {peer}")]
    NoSuchPeer { peer: PeerIdentifier },
    #[error("Write to peer {peer} failed: {source}")]
    WriteFailed {
        peer: PeerIdentifier,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

// ----------------------------------------------------------------------------
// Node Errors
// ----------------------------------------------------------------------------

/// Errors from the imperative UI-facing operations
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("Cannot broadcast an empty message")]
    EmptyMessage,
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Umbrella error for the crate
#[derive(Debug, thiserror::Error)]
pub enum SwarmchatError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl SwarmchatError {
    /// Create an invalid input error
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        SwarmchatError::InvalidInput {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = core::result::Result<T, SwarmchatError>;
