//! Swarm transport configuration

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for listening, dialing and framing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Address the listener binds to
    pub listen_addr: SocketAddr,
    /// Peers dialed right after joining
    pub bootstrap_peers: Vec<SocketAddr>,
    /// Per-attempt TCP connect timeout (milliseconds)
    pub connect_timeout_ms: u64,
    /// Time allowed for the remote hello (milliseconds)
    pub handshake_timeout_ms: u64,
    /// Connect attempts per bootstrap peer
    pub dial_attempts: u32,
    /// Pause between connect attempts (milliseconds)
    pub dial_retry_delay_ms: u64,
    /// Largest accepted frame in bytes
    pub max_frame_length: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            bootstrap_peers: Vec::new(),
            connect_timeout_ms: 5_000,
            handshake_timeout_ms: 5_000,
            dial_attempts: 3,
            dial_retry_delay_ms: 1_000,
            max_frame_length: 64 * 1024,
        }
    }
}

impl SwarmConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn dial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.dial_retry_delay_ms)
    }
}
