//! Stable party identities.
//!
//! An [`Identity`] is the opaque public value a party is known by — for the
//! original deployment, a wallet's public key. It is immutable once
//! established, safe to publish, and the sole input the peer key resolver
//! needs. Key material derived *from* an identity is handled elsewhere;
//! this module only validates, encodes and fingerprints the value itself.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::SealError;

/// Longest identity value accepted, in bytes. Wallet public keys are 32
/// bytes; signature-sized canonical material is 64. Anything beyond 128 is
/// rejected as malformed rather than hashed blindly.
pub const MAX_IDENTITY_LEN: usize = 128;

/// Opaque, globally unique, stable public identity of a party.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(Vec<u8>);

impl Identity {
    /// Build an identity from raw bytes, rejecting empty or oversized input.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, SealError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(SealError::InvalidPeerIdentity("empty identity".into()));
        }
        if bytes.len() > MAX_IDENTITY_LEN {
            return Err(SealError::InvalidPeerIdentity(format!(
                "identity too long: {} bytes (max {})",
                bytes.len(),
                MAX_IDENTITY_LEN
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self, SealError> {
        let bytes = URL_SAFE_NO_PAD.decode(s)?;
        Self::from_bytes(bytes)
    }

    /// Short human-readable fingerprint: BLAKE3 of the identity bytes,
    /// truncated to 8 bytes, hex-encoded. Used anywhere an identity appears
    /// in logs — raw identity bytes never reach a log line.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        hex::encode(&hash.as_bytes()[..8])
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.fingerprint())
    }
}
