//! Application layer message structures
//!
//! This module defines the closed set of messages exchanged over a session.
//! Every message carries the sender's self-chosen display name and the
//! sender-side capture time; neither is verified.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

// ----------------------------------------------------------------------------
// Message Kind
// ----------------------------------------------------------------------------

/// Discriminant of a [`Message`], matching the wire `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Welcome,
    Chat,
    Broadcast,
    Ping,
    Pong,
}

impl MessageKind {
    /// All kinds recognized on the wire
    pub const ALL: [MessageKind; 5] = [
        MessageKind::Welcome,
        MessageKind::Chat,
        MessageKind::Broadcast,
        MessageKind::Ping,
        MessageKind::Pong,
    ];

    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Welcome => "welcome",
            MessageKind::Chat => "chat",
            MessageKind::Broadcast => "broadcast",
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
        }
    }

    /// Look up a kind by its wire name
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Whether this kind carries a free-text `message` body
    pub fn has_text(&self) -> bool {
        matches!(
            self,
            MessageKind::Welcome | MessageKind::Chat | MessageKind::Broadcast
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// A protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Greeting sent once right after a session opens
    Welcome {
        from: String,
        timestamp: Timestamp,
        message: String,
    },
    /// Free-form message addressed to one peer
    Chat {
        from: String,
        timestamp: Timestamp,
        message: String,
    },
    /// Message fanned out to every open session
    Broadcast {
        from: String,
        timestamp: Timestamp,
        message: String,
    },
    /// Latency check
    Ping { from: String, timestamp: Timestamp },
    /// Reply to a ping carrying the ping's timestamp back
    Pong {
        from: String,
        timestamp: Timestamp,
        #[serde(rename = "originalTimestamp")]
        original_timestamp: Timestamp,
    },
}

impl Message {
    /// Create a welcome message
    pub fn welcome(from: impl Into<String>, message: impl Into<String>, timestamp: Timestamp) -> Self {
        Message::Welcome {
            from: from.into(),
            timestamp,
            message: message.into(),
        }
    }

    /// Create a chat message
    pub fn chat(from: impl Into<String>, message: impl Into<String>, timestamp: Timestamp) -> Self {
        Message::Chat {
            from: from.into(),
            timestamp,
            message: message.into(),
        }
    }

    /// Create a broadcast message
    pub fn broadcast(from: impl Into<String>, message: impl Into<String>, timestamp: Timestamp) -> Self {
        Message::Broadcast {
            from: from.into(),
            timestamp,
            message: message.into(),
        }
    }

    /// Create a ping
    pub fn ping(from: impl Into<String>, timestamp: Timestamp) -> Self {
        Message::Ping {
            from: from.into(),
            timestamp,
        }
    }

    /// Create the pong answering a ping sent at `original_timestamp`
    pub fn pong(from: impl Into<String>, original_timestamp: Timestamp, timestamp: Timestamp) -> Self {
        Message::Pong {
            from: from.into(),
            timestamp,
            original_timestamp,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Welcome { .. } => MessageKind::Welcome,
            Message::Chat { .. } => MessageKind::Chat,
            Message::Broadcast { .. } => MessageKind::Broadcast,
            Message::Ping { .. } => MessageKind::Ping,
            Message::Pong { .. } => MessageKind::Pong,
        }
    }

    /// Sender's display name
    pub fn from(&self) -> &str {
        match self {
            Message::Welcome { from, .. }
            | Message::Chat { from, .. }
            | Message::Broadcast { from, .. }
            | Message::Ping { from, .. }
            | Message::Pong { from, .. } => from,
        }
    }

    /// Sender-side capture time
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Message::Welcome { timestamp, .. }
            | Message::Chat { timestamp, .. }
            | Message::Broadcast { timestamp, .. }
            | Message::Ping { timestamp, .. }
            | Message::Pong { timestamp, .. } => *timestamp,
        }
    }

    /// Text body, for the kinds that have one
    pub fn text(&self) -> Option<&str> {
        match self {
            Message::Welcome { message, .. }
            | Message::Chat { message, .. }
            | Message::Broadcast { message, .. } => Some(message),
            Message::Ping { .. } | Message::Pong { .. } => None,
        }
    }
}
