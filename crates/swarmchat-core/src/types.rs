//! Core types for the SwarmChat session layer
//!
//! This module defines the fundamental types used throughout the session and
//! message layers, using newtype patterns for semantic validation and type safety.

use core::fmt;
use core::ops::{Add, Deref, Sub};
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::errors::SwarmchatError;

// ----------------------------------------------------------------------------
// Public Key
// ----------------------------------------------------------------------------

/// A remote peer's 32-byte public key as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Create a public key from raw bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short identifier derived from this key
    pub fn identifier(&self) -> PeerIdentifier {
        PeerIdentifier::from_public_key(self)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for PublicKey {
    type Err = SwarmchatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean_str = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(clean_str)
            .map_err(|_| SwarmchatError::invalid_input("Invalid hex in PublicKey"))?;

        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SwarmchatError::invalid_input("PublicKey must be exactly 32 bytes"))?;
        Ok(Self(key))
    }
}

impl Deref for PublicKey {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// Peer Identifier
// ----------------------------------------------------------------------------

/// Number of hex characters kept from the public key
pub const PEER_IDENTIFIER_LEN: usize = 8;

/// Short, human-displayable peer identifier (first 8 hex chars of the public key)
///
/// Distinct keys sharing the same prefix map to the same identifier; the
/// lifecycle handler is responsible for noticing that case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerIdentifier(String);

impl PeerIdentifier {
    /// Derive the identifier for a public key
    pub fn from_public_key(key: &PublicKey) -> Self {
        let mut encoded = hex::encode(key.as_bytes());
        encoded.truncate(PEER_IDENTIFIER_LEN);
        Self(encoded)
    }

    /// Identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerIdentifier {
    type Err = SwarmchatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != PEER_IDENTIFIER_LEN || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SwarmchatError::invalid_input(format!(
                "Peer identifier must be {} hex characters, got '{}'",
                PEER_IDENTIFIER_LEN, s
            )));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, other: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(other))
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Milliseconds since the epoch
    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Time Source
// ----------------------------------------------------------------------------

/// Clock abstraction so latency and history timestamps can be pinned in tests
pub trait TimeSource {
    /// Get the current time
    fn now(&self) -> Timestamp;
}

/// System clock
#[derive(Debug, Clone, Copy, Default)]
pub struct StdTimeSource;

impl TimeSource for StdTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// ----------------------------------------------------------------------------
// Connection Metadata
// ----------------------------------------------------------------------------

/// Transport-assigned handle for one accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which side initiated a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The remote peer dialed us
    Inbound,
    /// We dialed the remote peer
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}

/// Session states in the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered and writable
    Open,
    /// A graceful close was requested locally
    Closing,
}
