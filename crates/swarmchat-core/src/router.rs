//! Message router
//!
//! Records every decoded inbound message in an append-only history, then
//! reacts according to its kind. Received broadcasts are not re-forwarded:
//! the topology is a direct mesh.

use tracing::{info, warn};

use crate::protocol::Message;
use crate::registry::PeerRegistry;
use crate::types::{PeerIdentifier, StdTimeSource, TimeSource, Timestamp};

// ----------------------------------------------------------------------------
// Message History
// ----------------------------------------------------------------------------

/// One inbound message as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub message: Message,
    pub peer: PeerIdentifier,
    pub received_at: Timestamp,
}

/// Insertion-ordered log of inbound messages
///
/// Entries are never mutated or removed while the process runs.
#[derive(Debug, Clone, Default)]
pub struct MessageHistory {
    entries: Vec<HistoryEntry>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// The most recent `count` entries, oldest first
    pub fn recent(&self, count: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(count);
        &self.entries[start..]
    }
}

// ----------------------------------------------------------------------------
// Route Outcome
// ----------------------------------------------------------------------------

/// The reaction the router took for one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Welcome acknowledged
    Acknowledged,
    /// Chat or broadcast logged
    Logged,
    /// Ping answered with a pong
    PongSent,
    /// Ping could not be answered
    PongFailed,
    /// Pong received; round trip measured against the local clock
    LatencyMeasured { latency_ms: u64 },
}

// ----------------------------------------------------------------------------
// Message Router
// ----------------------------------------------------------------------------

/// Dispatches decoded messages to their reaction
pub struct MessageRouter<T: TimeSource = StdTimeSource> {
    local_name: String,
    history: MessageHistory,
    time_source: T,
}

impl MessageRouter<StdTimeSource> {
    /// Create a router on the system clock
    pub fn with_system_clock(local_name: impl Into<String>) -> Self {
        Self::new(local_name, StdTimeSource)
    }
}

impl<T: TimeSource> MessageRouter<T> {
    pub fn new(local_name: impl Into<String>, time_source: T) -> Self {
        Self {
            local_name: local_name.into(),
            history: MessageHistory::new(),
            time_source,
        }
    }

    /// Display name used on replies
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    pub fn time_source(&self) -> &T {
        &self.time_source
    }

    /// Record `message` from `peer` and react to it
    pub fn route(
        &mut self,
        registry: &PeerRegistry,
        peer: &PeerIdentifier,
        message: Message,
    ) -> RouteOutcome {
        let received_at = self.time_source.now();
        self.history.append(HistoryEntry {
            message: message.clone(),
            peer: peer.clone(),
            received_at,
        });

        match message {
            Message::Welcome { from, message, .. } => {
                info!(peer = %peer, "Welcome from {}: {}", from, message);
                RouteOutcome::Acknowledged
            }
            Message::Chat { from, message, .. } => {
                info!(peer = %peer, "[{}] {}: {}", peer, from, message);
                RouteOutcome::Logged
            }
            Message::Broadcast { from, message, .. } => {
                info!(peer = %peer, "[broadcast] {}: {}", from, message);
                RouteOutcome::Logged
            }
            Message::Ping { from, timestamp } => {
                let pong = Message::pong(self.local_name.as_str(), timestamp, self.time_source.now());
                match registry.send(peer, &pong) {
                    Ok(()) => {
                        info!(peer = %peer, "Ping from {}, replied with pong", from);
                        RouteOutcome::PongSent
                    }
                    Err(e) => {
                        warn!(peer = %peer, "Failed to answer ping from {}: {}", from, e);
                        RouteOutcome::PongFailed
                    }
                }
            }
            Message::Pong {
                from,
                original_timestamp,
                ..
            } => {
                let latency_ms = received_at - original_timestamp;
                info!(peer = %peer, latency_ms, "Pong from {}: {}ms", from, latency_ms);
                RouteOutcome::LatencyMeasured { latency_ms }
            }
        }
    }
}
