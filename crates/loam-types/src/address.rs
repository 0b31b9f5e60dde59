use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Stable identity of an actor.
///
/// An `ActorAddress` is derived deterministically from seed material (for
/// example the hash of the actor's constructor message) using BLAKE3. The
/// same seed always produces the same address. Addresses key the per-session
/// storage registry and order its flushes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorAddress {
    hash: [u8; 32],
}

impl ActorAddress {
    /// Derive an `ActorAddress` from seed bytes.
    pub fn derive(seed: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"loam-actor-v1:");
        hasher.update(seed);
        Self {
            hash: *hasher.finalize().as_bytes(),
        }
    }

    /// Create an ephemeral (random) address for tests and demos.
    pub fn ephemeral() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self::derive(&bytes)
    }

    /// Create from a raw 32-byte hash. Use `derive()` for production code.
    pub fn from_raw(hash: [u8; 32]) -> Self {
        Self { hash }
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Full hex-encoded string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Short identifier (first 8 hex characters).
    pub fn short_id(&self) -> String {
        format!("act:{}", hex::encode(&self.hash[..4]))
    }

    /// Parse from a hex string (64 hex characters).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.strip_prefix("act:").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self { hash: arr })
    }
}

impl fmt::Debug for ActorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorAddress({})", self.short_id())
    }
}

impl fmt::Display for ActorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_id())
    }
}
