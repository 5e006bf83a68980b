//! TCP topic swarm transport for SwarmChat
//!
//! Peers that join the same topic name find each other through a listener
//! and a list of bootstrap addresses, exchange a hello naming the topic
//! digest and their ed25519 public key, and then carry length-prefixed
//! frames. Connections surface as [`swarmchat_core::TransportEvent`]s.

pub mod config;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod swarm;
pub mod topic;

pub use config::SwarmConfig;
pub use connection::FramedStreamHandle;
pub use error::{Result, SwarmError};
pub use identity::Identity;
pub use swarm::{Swarm, SwarmEvents};
pub use topic::Topic;
