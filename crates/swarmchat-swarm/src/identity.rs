//! Node identity
//!
//! Each node holds an ed25519 keypair; the verifying key is the public key
//! peers see and derive our identifier from.

use std::fmt;

use ed25519_dalek::SigningKey;
use rand_core::OsRng;
use swarmchat_core::PublicKey;

use crate::error::{Result, SwarmError};

/// Local ed25519 keypair
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Fresh random identity
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Load an identity from a 64-character hex secret
    pub fn from_secret_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret.trim()).map_err(|e| SwarmError::InvalidKey {
            reason: format!("secret is not hex: {}", e),
        })?;
        let secret: [u8; 32] = bytes.try_into().map_err(|_| SwarmError::InvalidKey {
            reason: "secret must be exactly 32 bytes".to_string(),
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.signing_key.verifying_key().to_bytes())
    }

    /// Hex secret, suitable for `identity.secret_key` in the config file
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key().to_string())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_round_trip_keeps_public_key() {
        let identity = Identity::generate();
        let restored = Identity::from_secret_hex(&identity.secret_hex()).unwrap();
        assert_eq!(restored.public_key(), identity.public_key());
    }

    #[test]
    fn test_rejects_bad_secrets() {
        assert!(Identity::from_secret_hex("xyz").is_err());
        assert!(Identity::from_secret_hex("abcd").is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let identity = Identity::generate();
        let rendered = format!("{:?}", identity);
        assert!(!rendered.contains(&identity.secret_hex()));
    }
}
