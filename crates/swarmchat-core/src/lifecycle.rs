//! Session lifecycle handler
//!
//! Turns transport events into registry mutations. The transport only reports
//! connections that already finished its handshake, so a new connection goes
//! straight to `Open`; a close is terminal and a reconnect arrives as a fresh
//! connection.
//!
//! Two connections can land on the same [`PeerIdentifier`]:
//! - same public key: a duplicate (simultaneous dial or reconnect). Both
//!   sides keep the same survivor: with equal directions the newest wins,
//!   otherwise the connection initiated by the smaller public key wins.
//! - different public key: an identifier collision. The newcomer is rejected
//!   so the established session is never silently replaced.

use hashbrown::HashMap;
use tracing::{debug, error, info, warn};

use crate::errors::TransportError;
use crate::protocol::{decode, Message};
use crate::registry::{PeerRegistry, PeerSession};
use crate::router::{MessageRouter, RouteOutcome};
use crate::transport::{IncomingConnection, SessionEvents};
use crate::types::{ConnectionId, Direction, PeerIdentifier, PublicKey, StdTimeSource, TimeSource};

/// Drives the registry and router from transport events
pub struct SessionLifecycleHandler<T: TimeSource = StdTimeSource> {
    local_key: PublicKey,
    registry: PeerRegistry,
    router: MessageRouter<T>,
    connections: HashMap<ConnectionId, PeerIdentifier>,
    last_outcome: Option<RouteOutcome>,
}

impl<T: TimeSource> SessionLifecycleHandler<T> {
    pub fn new(local_key: PublicKey, local_name: impl Into<String>, time_source: T) -> Self {
        Self {
            local_key,
            registry: PeerRegistry::new(),
            router: MessageRouter::new(local_name, time_source),
            connections: HashMap::new(),
            last_outcome: None,
        }
    }

    pub fn local_key(&self) -> &PublicKey {
        &self.local_key
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PeerRegistry {
        &mut self.registry
    }

    pub fn router(&self) -> &MessageRouter<T> {
        &self.router
    }

    /// Reaction to the most recently routed message
    pub fn last_outcome(&self) -> Option<RouteOutcome> {
        self.last_outcome
    }

    /// Whether a connection is currently attributed to a peer
    pub fn is_tracked(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    fn welcome_message(&self) -> Message {
        let name = self.router.local_name();
        Message::welcome(name, format!("Hello from {}!", name), self.router.time_source().now())
    }

    /// Whether a duplicate connection from the same key should replace the registered one
    fn prefers_new(&self, existing: Direction, incoming: Direction, remote: &PublicKey) -> bool {
        if existing == incoming {
            return true;
        }
        let we_initiated_incoming = incoming == Direction::Outbound;
        we_initiated_incoming == (self.local_key < *remote)
    }
}

impl<T: TimeSource> SessionEvents for SessionLifecycleHandler<T> {
    fn on_connection(&mut self, connection: IncomingConnection) {
        let identifier = connection.public_key.identifier();
        let connection_id = connection.connection_id;

        if let Some(existing) = self.registry.get(&identifier) {
            let keep_new = if existing.public_key() != &connection.public_key {
                warn!(
                    peer = %identifier,
                    connection_id = %connection_id,
                    "Identifier collision with a different public key, rejecting connection"
                );
                false
            } else {
                self.prefers_new(existing.direction(), connection.direction, &connection.public_key)
            };

            if !keep_new {
                debug!(peer = %identifier, connection_id = %connection_id, "Dropping redundant connection");
                if let Err(e) = connection.stream.end() {
                    debug!(connection_id = %connection_id, "Failed to end rejected stream: {}", e);
                }
                return;
            }
        }

        let direction = connection.direction;
        let remote_addr = connection.remote_addr;
        let session = PeerSession::new(connection, self.router.time_source().now());
        self.connections.insert(connection_id, identifier.clone());

        if let Some(mut displaced) = self.registry.register(session) {
            info!(
                peer = %identifier,
                old = %displaced.connection_id(),
                new = %connection_id,
                "Replacing duplicate session"
            );
            self.connections.remove(&displaced.connection_id());
            if let Err(e) = displaced.end() {
                debug!(peer = %identifier, "Failed to end displaced stream: {}", e);
            }
        }

        info!(
            peer = %identifier,
            %direction,
            remote = ?remote_addr,
            sessions = self.registry.size(),
            "Peer connected"
        );

        let welcome = self.welcome_message();
        if let Err(e) = self.registry.send(&identifier, &welcome) {
            warn!(peer = %identifier, "Failed to send welcome: {}", e);
        }
    }

    fn on_data(&mut self, connection_id: ConnectionId, bytes: &[u8]) {
        let Some(identifier) = self.connections.get(&connection_id) else {
            debug!(connection_id = %connection_id, "Data on untracked connection ignored");
            return;
        };

        match decode(bytes) {
            Ok(message) => {
                let outcome = self.router.route(&self.registry, identifier, message);
                self.last_outcome = Some(outcome);
            }
            Err(e) => {
                warn!(peer = %identifier, len = bytes.len(), "Discarding undecodable message: {}", e);
            }
        }
    }

    fn on_close(&mut self, connection_id: ConnectionId) {
        let Some(identifier) = self.connections.remove(&connection_id) else {
            debug!(connection_id = %connection_id, "Close on untracked connection ignored");
            return;
        };

        let registered = self
            .registry
            .get(&identifier)
            .map(PeerSession::connection_id);
        if registered == Some(connection_id) {
            self.registry.unregister(&identifier);
            info!(peer = %identifier, sessions = self.registry.size(), "Peer disconnected");
        } else {
            debug!(peer = %identifier, connection_id = %connection_id, "Stale connection closed");
        }
    }

    fn on_error(&mut self, connection_id: ConnectionId, error: TransportError) {
        match self.connections.get(&connection_id) {
            Some(identifier) => error!(peer = %identifier, connection_id = %connection_id, "Connection error: {}", error),
            None => error!(connection_id = %connection_id, "Connection error: {}", error),
        }
    }
}
