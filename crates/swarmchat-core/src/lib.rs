//! SwarmChat Core
//!
//! Peer session layer and message protocol for processes that meet on a shared
//! rendezvous topic. The crate turns transport-reported duplex connections
//! into addressable peer sessions and exchanges a small typed message set
//! (welcome, chat, broadcast, ping/pong) over them.
//!
//! Discovery and stream establishment live behind [`transport::SessionStream`]
//! and [`transport::TransportEvent`]; this crate never touches sockets.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod discovery;
pub mod errors;
pub mod lifecycle;
pub mod node;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use discovery::{wait_for_peers, DiscoveryOutcome, DiscoveryPolicy};
pub use errors::{
    DecodeError, EncodeError, NodeError, Result, SendError, SwarmchatError, TransportError,
};
pub use lifecycle::SessionLifecycleHandler;
pub use node::{ChatNode, NodeIdentity};
pub use protocol::{decode, encode, Message, MessageKind};
pub use registry::{BroadcastReport, PeerRegistry, PeerSession, SessionInfo};
pub use router::{HistoryEntry, MessageHistory, MessageRouter, RouteOutcome};
pub use transport::{
    dispatch_event, IncomingConnection, MemoryStream, SessionEvents, SessionStream, TransportEvent,
};
pub use types::{
    ConnectionId, Direction, PeerIdentifier, PublicKey, SessionState, StdTimeSource, TimeSource,
    Timestamp,
};
