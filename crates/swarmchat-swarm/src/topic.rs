//! Rendezvous topics

use std::fmt;

use sha2::{Digest, Sha256};

/// A rendezvous topic: the SHA-256 digest of a human-readable name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    name: String,
    digest: [u8; 32],
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let digest = Sha256::digest(name.as_bytes()).into();
        Self { name, digest }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    /// Hex form exchanged in the hello
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, &self.digest_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_sha256_of_name() {
        let topic = Topic::new("abc");
        assert_eq!(
            topic.digest_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(topic.name(), "abc");
    }

    #[test]
    fn test_distinct_names_distinct_topics() {
        assert_ne!(Topic::new("lobby"), Topic::new("lobby2"));
        assert_eq!(Topic::new("lobby"), Topic::new("lobby"));
    }
}
