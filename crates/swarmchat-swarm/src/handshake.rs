//! Connection hello
//!
//! The first frame each side writes is a JSON hello naming the topic digest
//! and the sender's public key. A connection is only surfaced to the session
//! layer once the remote hello names our topic and a key other than ours.

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use swarmchat_core::PublicKey;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::{Result, SwarmError};
use crate::topic::Topic;

/// Hello frame payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    /// Hex topic digest
    pub topic: String,
    /// Hex public key of the sender
    pub public_key: String,
}

impl Hello {
    pub fn new(topic: &Topic, public_key: &PublicKey) -> Self {
        Self {
            topic: topic.digest_hex(),
            public_key: public_key.to_string(),
        }
    }

    /// Check a remote hello against our topic and key, returning the remote key
    pub fn verify(&self, topic: &Topic, local_key: &PublicKey) -> Result<PublicKey> {
        if self.topic != topic.digest_hex() {
            return Err(SwarmError::TopicMismatch {
                remote: self.topic.clone(),
            });
        }

        let remote: PublicKey = self.public_key.parse().map_err(|_| SwarmError::InvalidKey {
            reason: format!("unparsable public key '{}'", self.public_key),
        })?;
        if &remote == local_key {
            return Err(SwarmError::SelfConnection);
        }
        Ok(remote)
    }
}

/// Send our hello, then wait up to `timeout` for the peer's and verify it
pub async fn exchange<S>(
    framed: &mut Framed<S, LengthDelimitedCodec>,
    topic: &Topic,
    local_key: &PublicKey,
    timeout: Duration,
) -> Result<PublicKey>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ours = serde_json::to_vec(&Hello::new(topic, local_key))
        .map_err(|e| SwarmError::handshake(e.to_string()))?;
    framed.send(Bytes::from(ours)).await?;

    let frame = tokio::time::timeout(timeout, framed.next())
        .await
        .map_err(|_| SwarmError::Timeout {
            duration_ms: timeout.as_millis() as u64,
        })?
        .ok_or_else(|| SwarmError::handshake("connection closed before hello"))??;

    let theirs: Hello = serde_json::from_slice(&frame)
        .map_err(|e| SwarmError::handshake(format!("malformed hello: {}", e)))?;
    theirs.verify(topic, local_key)
}
