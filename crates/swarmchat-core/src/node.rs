//! Chat node facade
//!
//! [`ChatNode`] is the surface the CLI talks to: queries over the live
//! sessions and history, plus the imperative broadcast/ping/shutdown
//! operations. It owns the lifecycle handler, which in turn owns the registry
//! and router. All methods run on the single task that drains transport
//! events.

use tokio::sync::watch;
use tracing::{debug, info};

use crate::errors::{EncodeError, NodeError};
use crate::lifecycle::SessionLifecycleHandler;
use crate::protocol::Message;
use crate::registry::{BroadcastReport, SessionInfo};
use crate::router::{HistoryEntry, MessageHistory};
use crate::transport::{dispatch_event, TransportEvent};
use crate::types::{PeerIdentifier, PublicKey, StdTimeSource, TimeSource};

/// Local identity of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Self-chosen display name put in the `from` field
    pub display_name: String,
    /// Our transport public key
    pub public_key: PublicKey,
}

/// Composed session layer for one process
pub struct ChatNode<T: TimeSource = StdTimeSource> {
    display_name: String,
    handler: SessionLifecycleHandler<T>,
    shut_down: bool,
}

impl ChatNode<StdTimeSource> {
    /// Create a node on the system clock
    pub fn with_system_clock(identity: NodeIdentity) -> Self {
        Self::new(identity, StdTimeSource)
    }
}

impl<T: TimeSource> ChatNode<T> {
    pub fn new(identity: NodeIdentity, time_source: T) -> Self {
        Self {
            handler: SessionLifecycleHandler::new(
                identity.public_key,
                identity.display_name.clone(),
                time_source,
            ),
            display_name: identity.display_name,
            shut_down: false,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn public_key(&self) -> &PublicKey {
        self.handler.local_key()
    }

    /// Our own short identifier
    pub fn identifier(&self) -> PeerIdentifier {
        self.handler.local_key().identifier()
    }

    pub fn handler(&self) -> &SessionLifecycleHandler<T> {
        &self.handler
    }

    /// Feed one transport event through the lifecycle handler
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connection(connection) if self.shut_down => {
                debug!(connection_id = %connection.connection_id, "Refusing connection after shutdown");
                if let Err(e) = connection.stream.end() {
                    debug!(connection_id = %connection.connection_id, "Failed to end refused stream: {}", e);
                }
            }
            event => dispatch_event(&mut self.handler, event),
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn session_count(&self) -> usize {
        self.handler.registry().size()
    }

    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.handler.registry().list()
    }

    pub fn history(&self) -> &MessageHistory {
        self.handler.router().history()
    }

    pub fn recent_history(&self, count: usize) -> &[HistoryEntry] {
        self.history().recent(count)
    }

    /// Watch channel carrying the live session count
    pub fn live_count(&self) -> watch::Receiver<usize> {
        self.handler.registry().subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Broadcast `text` to every open session
    pub fn send_broadcast(&self, text: &str) -> Result<BroadcastReport, NodeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(NodeError::EmptyMessage);
        }

        let now = self.handler.router().time_source().now();
        let message = Message::broadcast(self.display_name.as_str(), text, now);
        let report = self.handler.registry().broadcast(&message)?;
        info!(
            attempted = report.attempted,
            failed = report.failed,
            "Broadcast sent"
        );
        Ok(report)
    }

    /// Ping every open session
    pub fn ping_all(&self) -> Result<BroadcastReport, EncodeError> {
        let report = self
            .handler
            .registry()
            .ping_all(&self.display_name, self.handler.router().time_source())?;
        info!(attempted = report.attempted, failed = report.failed, "Pinged peers");
        Ok(report)
    }

    /// Close every session; later calls do nothing and return 0
    pub fn shutdown(&mut self) -> usize {
        if self.shut_down {
            return 0;
        }
        self.shut_down = true;
        self.handler.registry_mut().close_all()
    }
}
