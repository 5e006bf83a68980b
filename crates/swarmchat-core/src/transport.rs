//! Transport boundary for the session layer
//!
//! The swarm/transport collaborator discovers peers and establishes streams;
//! this module is the narrow contract it shares with the core. The transport
//! pushes [`TransportEvent`]s in, and the core writes back through
//! [`SessionStream`] handles.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::TransportError;
use crate::types::{ConnectionId, Direction, PublicKey};

// ----------------------------------------------------------------------------
// Session Stream
// ----------------------------------------------------------------------------

/// Write half of one duplex connection
///
/// Calls hand a complete frame to the transport and return without waiting
/// for it to reach the wire.
pub trait SessionStream: Send + Sync {
    /// Queue one message frame
    fn write(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Request a graceful close
    fn end(&self) -> Result<(), TransportError>;
}

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// A connection that completed the transport's own handshake
pub struct IncomingConnection {
    pub connection_id: ConnectionId,
    pub stream: Arc<dyn SessionStream>,
    pub public_key: PublicKey,
    pub direction: Direction,
    pub remote_addr: Option<SocketAddr>,
}

impl fmt::Debug for IncomingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingConnection")
            .field("connection_id", &self.connection_id)
            .field("public_key", &self.public_key.to_string())
            .field("direction", &self.direction)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

/// Events emitted by the transport
#[derive(Debug)]
pub enum TransportEvent {
    /// New session ready for use
    Connection(IncomingConnection),
    /// One frame arrived on a connection
    Data {
        connection_id: ConnectionId,
        bytes: Vec<u8>,
    },
    /// Connection closed; emitted exactly once per connection
    Closed { connection_id: ConnectionId },
    /// Connection failed; always followed by `Closed`
    Error {
        connection_id: ConnectionId,
        error: TransportError,
    },
}

impl TransportEvent {
    /// Connection the event belongs to
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            TransportEvent::Connection(connection) => connection.connection_id,
            TransportEvent::Data { connection_id, .. }
            | TransportEvent::Closed { connection_id }
            | TransportEvent::Error { connection_id, .. } => *connection_id,
        }
    }
}

/// Receiver of transport events, one method per event kind
pub trait SessionEvents {
    fn on_connection(&mut self, connection: IncomingConnection);

    fn on_data(&mut self, connection_id: ConnectionId, bytes: &[u8]);

    fn on_close(&mut self, connection_id: ConnectionId);

    fn on_error(&mut self, connection_id: ConnectionId, error: TransportError);
}

/// Route an event to the matching [`SessionEvents`] method
pub fn dispatch_event<H: SessionEvents + ?Sized>(handler: &mut H, event: TransportEvent) {
    match event {
        TransportEvent::Connection(connection) => handler.on_connection(connection),
        TransportEvent::Data {
            connection_id,
            bytes,
        } => handler.on_data(connection_id, &bytes),
        TransportEvent::Closed { connection_id } => handler.on_close(connection_id),
        TransportEvent::Error {
            connection_id,
            error,
        } => handler.on_error(connection_id, error),
    }
}

// ----------------------------------------------------------------------------
// Memory Stream
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryStreamState {
    frames: Vec<Vec<u8>>,
    write_attempts: usize,
    ended: bool,
    fail_writes: bool,
}

/// In-process stream that records every frame written to it
///
/// Clones share the same recording, so a test can keep one handle while the
/// registry owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStream {
    state: Arc<Mutex<MemoryStreamState>>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stream whose writes always fail
    pub fn failing() -> Self {
        let stream = Self::default();
        stream.set_fail_writes(true);
        stream
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Frames successfully written so far
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().frames.clone()
    }

    /// Every write call, including failed ones
    pub fn write_attempts(&self) -> usize {
        self.lock().write_attempts
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStreamState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStream for MemoryStream {
    fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.write_attempts += 1;
        if state.fail_writes || state.ended {
            return Err(TransportError::Closed);
        }
        state.frames.push(bytes.to_vec());
        Ok(())
    }

    fn end(&self) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.ended {
            return Err(TransportError::Closed);
        }
        state.ended = true;
        Ok(())
    }
}
