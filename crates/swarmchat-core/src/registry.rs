//! Peer session registry
//!
//! The registry is the single source of truth for who is connected. It maps
//! each [`PeerIdentifier`] to the one live [`PeerSession`] for that peer and
//! performs all outbound writes: unicast, fan-out and graceful close.
//!
//! A failed write never removes a session. Sessions leave the registry only
//! when the transport reports the stream closed.

use std::net::SocketAddr;
use std::sync::Arc;

use hashbrown::HashMap;
use smallvec::SmallVec;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::{EncodeError, SendError};
use crate::protocol::{encode, Message};
use crate::transport::{IncomingConnection, SessionStream};
use crate::types::{
    ConnectionId, Direction, PeerIdentifier, PublicKey, SessionState, TimeSource, Timestamp,
};

// ----------------------------------------------------------------------------
// Peer Session
// ----------------------------------------------------------------------------

/// One live duplex connection to a remote peer
pub struct PeerSession {
    identifier: PeerIdentifier,
    public_key: PublicKey,
    connection_id: ConnectionId,
    direction: Direction,
    remote_addr: Option<SocketAddr>,
    state: SessionState,
    opened_at: Timestamp,
    stream: Arc<dyn SessionStream>,
}

impl PeerSession {
    /// Create an open session from a freshly reported connection
    pub fn new(connection: IncomingConnection, opened_at: Timestamp) -> Self {
        Self {
            identifier: connection.public_key.identifier(),
            public_key: connection.public_key,
            connection_id: connection.connection_id,
            direction: connection.direction,
            remote_addr: connection.remote_addr,
            state: SessionState::Open,
            opened_at,
            stream: connection.stream,
        }
    }

    pub fn identifier(&self) -> &PeerIdentifier {
        &self.identifier
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Remote address, for display only
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn opened_at(&self) -> Timestamp {
        self.opened_at
    }

    /// Request a graceful close of the underlying stream
    pub fn end(&mut self) -> Result<(), crate::errors::TransportError> {
        self.state = SessionState::Closing;
        self.stream.end()
    }

    /// Snapshot of the session metadata
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            identifier: self.identifier.clone(),
            public_key: self.public_key,
            connection_id: self.connection_id,
            direction: self.direction,
            remote_addr: self.remote_addr,
            state: self.state,
            opened_at: self.opened_at,
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<(), SendError> {
        self.stream
            .write(bytes)
            .map_err(|source| SendError::WriteFailed {
                peer: self.identifier.clone(),
                source,
            })
    }
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("identifier", &self.identifier)
            .field("connection_id", &self.connection_id)
            .field("direction", &self.direction)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Inspection view of a registered session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub identifier: PeerIdentifier,
    pub public_key: PublicKey,
    pub connection_id: ConnectionId,
    pub direction: Direction,
    pub remote_addr: Option<SocketAddr>,
    pub state: SessionState,
    pub opened_at: Timestamp,
}

// ----------------------------------------------------------------------------
// Broadcast Report
// ----------------------------------------------------------------------------

/// Outcome of a fan-out write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions a write was attempted on
    pub attempted: usize,
    /// Writes that failed
    pub failed: usize,
    /// Peers whose write failed
    pub failed_peers: SmallVec<[PeerIdentifier; 4]>,
}

impl BroadcastReport {
    /// Writes that were accepted by the transport
    pub fn delivered(&self) -> usize {
        self.attempted - self.failed
    }
}

// ----------------------------------------------------------------------------
// Peer Registry
// ----------------------------------------------------------------------------

/// Owns the identifier to session mapping
pub struct PeerRegistry {
    sessions: HashMap<PeerIdentifier, PeerSession>,
    live_count: watch::Sender<usize>,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    pub fn new() -> Self {
        let (live_count, _) = watch::channel(0);
        Self {
            sessions: HashMap::new(),
            live_count,
        }
    }

    /// Watch the number of registered sessions
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.live_count.subscribe()
    }

    /// Insert or replace the session for its identifier
    ///
    /// A displaced session is returned to the caller untouched; its stream is
    /// not closed here.
    pub fn register(&mut self, session: PeerSession) -> Option<PeerSession> {
        let identifier = session.identifier.clone();
        debug!(peer = %identifier, connection_id = %session.connection_id, "Registering session");

        let previous = self.sessions.insert(identifier, session);
        self.publish_count();
        previous
    }

    /// Remove the session for `identifier`, if any
    pub fn unregister(&mut self, identifier: &PeerIdentifier) -> Option<PeerSession> {
        let removed = self.sessions.remove(identifier);
        if removed.is_some() {
            debug!(peer = %identifier, "Unregistered session");
            self.publish_count();
        }
        removed
    }

    pub fn get(&self, identifier: &PeerIdentifier) -> Option<&PeerSession> {
        self.sessions.get(identifier)
    }

    pub fn contains(&self, identifier: &PeerIdentifier) -> bool {
        self.sessions.contains_key(identifier)
    }

    /// Encode `message` and write it to exactly one session
    ///
    /// Failures are returned, not logged; the caller knows what was being sent.
    pub fn send(&self, identifier: &PeerIdentifier, message: &Message) -> Result<(), SendError> {
        let session = self
            .sessions
            .get(identifier)
            .ok_or_else(|| SendError::NoSuchPeer {
                peer: identifier.clone(),
            })?;

        let bytes = encode(message)?;
        session.write(&bytes)
    }

    /// Write `message` to every registered session
    ///
    /// The message is encoded once. A failing session is logged and skipped;
    /// the remaining sessions are still written to.
    pub fn broadcast(&self, message: &Message) -> Result<BroadcastReport, EncodeError> {
        let bytes = encode(message)?;
        let mut report = BroadcastReport::default();

        for session in self.sessions.values() {
            report.attempted += 1;
            if let Err(e) = session.write(&bytes) {
                warn!(peer = %session.identifier, kind = %message.kind(), "Fan-out write failed: {}", e);
                report.failed += 1;
                report.failed_peers.push(session.identifier.clone());
            }
        }

        debug!(
            kind = %message.kind(),
            attempted = report.attempted,
            failed = report.failed,
            "Fan-out complete"
        );
        Ok(report)
    }

    /// Send a ping to every registered session
    pub fn ping_all<T: TimeSource>(
        &self,
        from: &str,
        time_source: &T,
    ) -> Result<BroadcastReport, EncodeError> {
        self.broadcast(&Message::ping(from, time_source.now()))
    }

    /// Gracefully close every session, returning how many closed cleanly
    pub fn close_all(&mut self) -> usize {
        let mut closed = 0;
        for session in self.sessions.values_mut() {
            match session.end() {
                Ok(()) => closed += 1,
                Err(e) => warn!(peer = %session.identifier, "Failed to close session: {}", e),
            }
        }
        info!(closed, total = self.sessions.len(), "Closed all sessions");
        closed
    }

    /// Number of registered sessions
    pub fn size(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Metadata for every registered session, ordered by identifier
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self.sessions.values().map(PeerSession::info).collect();
        sessions.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        sessions
    }

    fn publish_count(&self) {
        self.live_count.send_replace(self.sessions.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode;
    use crate::transport::MemoryStream;

    fn key(prefix: u8) -> PublicKey {
        let mut bytes = [0u8; 32];
        bytes[0] = prefix;
        PublicKey::new(bytes)
    }

    fn session(prefix: u8, connection: u64, stream: &MemoryStream) -> PeerSession {
        PeerSession::new(
            IncomingConnection {
                connection_id: ConnectionId::new(connection),
                stream: Arc::new(stream.clone()),
                public_key: key(prefix),
                direction: Direction::Outbound,
                remote_addr: None,
            },
            Timestamp::new(0),
        )
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = PeerRegistry::new();
        let stream = MemoryStream::new();

        assert!(registry.register(session(0xa1, 1, &stream)).is_none());
        let id = key(0xa1).identifier();

        assert_eq!(registry.size(), 1);
        assert_eq!(registry.get(&id).unwrap().connection_id(), ConnectionId::new(1));
    }

    #[test]
    fn test_register_overwrites_without_closing() {
        let mut registry = PeerRegistry::new();
        let first = MemoryStream::new();
        let second = MemoryStream::new();

        registry.register(session(0xa1, 1, &first));
        let displaced = registry.register(session(0xa1, 2, &second)).unwrap();

        assert_eq!(displaced.connection_id(), ConnectionId::new(1));
        assert_eq!(registry.size(), 1);
        assert!(!first.is_ended());
        assert_eq!(
            registry.get(&key(0xa1).identifier()).unwrap().connection_id(),
            ConnectionId::new(2)
        );
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let mut registry = PeerRegistry::new();
        let id: PeerIdentifier = "deadbeef".parse().unwrap();
        assert!(registry.unregister(&id).is_none());
        assert_eq!(registry.size(), 0);
    }

    #[test]
    fn test_send_to_unknown_peer() {
        let registry = PeerRegistry::new();
        let id: PeerIdentifier = "deadbeef".parse().unwrap();
        let result = registry.send(&id, &Message::ping("me", Timestamp::new(1)));
        assert!(matches!(result, Err(SendError::NoSuchPeer { .. })));
    }

    #[test]
    fn test_send_write_failure_keeps_session() {
        let mut registry = PeerRegistry::new();
        registry.register(session(0xa1, 1, &MemoryStream::failing()));
        let id = key(0xa1).identifier();

        let result = registry.send(&id, &Message::ping("me", Timestamp::new(1)));
        assert!(matches!(result, Err(SendError::WriteFailed { .. })));
        assert!(registry.contains(&id));
    }

    #[test]
    fn test_broadcast_continues_past_failures() {
        let mut registry = PeerRegistry::new();
        let healthy_a = MemoryStream::new();
        let broken = MemoryStream::failing();
        let healthy_b = MemoryStream::new();
        registry.register(session(0x01, 1, &healthy_a));
        registry.register(session(0x02, 2, &broken));
        registry.register(session(0x03, 3, &healthy_b));

        let message = Message::broadcast("me", "hi", Timestamp::new(7));
        let report = registry.broadcast(&message).unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered(), 2);
        assert_eq!(report.failed_peers.as_slice(), &[key(0x02).identifier()]);
        assert_eq!(broken.write_attempts(), 1);
        assert_eq!(decode(&healthy_a.frames()[0]).unwrap(), message);
        assert_eq!(decode(&healthy_b.frames()[0]).unwrap(), message);
        assert_eq!(registry.size(), 3);
    }

    #[test]
    fn test_broadcast_with_no_sessions() {
        let registry = PeerRegistry::new();
        let report = registry
            .broadcast(&Message::broadcast("me", "hi", Timestamp::new(1)))
            .unwrap();
        assert_eq!((report.attempted, report.failed), (0, 0));
    }

    #[test]
    fn test_close_all_ends_every_stream() {
        let mut registry = PeerRegistry::new();
        let a = MemoryStream::new();
        let b = MemoryStream::new();
        registry.register(session(0x01, 1, &a));
        registry.register(session(0x02, 2, &b));
        b.end().unwrap();

        assert_eq!(registry.close_all(), 1);
        assert!(a.is_ended());
        assert!(registry
            .list()
            .iter()
            .all(|info| info.state == SessionState::Closing));
    }

    #[test]
    fn test_live_count_tracks_membership() {
        let mut registry = PeerRegistry::new();
        let count = registry.subscribe();

        registry.register(session(0x01, 1, &MemoryStream::new()));
        registry.register(session(0x02, 2, &MemoryStream::new()));
        assert_eq!(*count.borrow(), 2);

        registry.unregister(&key(0x01).identifier());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_list_is_sorted() {
        let mut registry = PeerRegistry::new();
        registry.register(session(0x30, 1, &MemoryStream::new()));
        registry.register(session(0x10, 2, &MemoryStream::new()));

        let ids: Vec<String> = registry.list().into_iter().map(|s| s.identifier.to_string()).collect();
        assert_eq!(ids, vec!["10000000", "30000000"]);
    }
}
