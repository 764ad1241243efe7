//! Peer public-key resolution.
//!
//! Every participant derives its encryption keypair with the same
//! deterministic rule over its canonical identity material, so a peer's
//! encryption public key can be recomputed locally from the peer's stable
//! identity value — same HKDF, same domain tag, same clamping — with no
//! key-exchange round trip and no directory lookup.
//!
//! Trade-off, stated here because it is easy to assume away: anyone who
//! learns a party's stable identity can compute that party's encryption
//! public key. That is intentional (it is what makes bootstrapping
//! contact-free) but it means identities double as public-key commitments
//! and carry no anonymity.

use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize;

use crate::{
    error::SealError,
    identity::Identity,
    kdf::{self, DOMAIN_TAG},
};

/// Recompute a peer's X25519 encryption public key from its identity.
///
/// Closed-form function of the identity bytes alone; deterministic, no I/O,
/// no cache. Malformed identities are rejected by [`Identity`] construction,
/// so the only failure left here is HKDF itself.
pub fn resolve_peer_public_key(peer: &Identity) -> Result<[u8; 32], SealError> {
    resolve_with_tag(peer, DOMAIN_TAG)
}

/// Resolution under an explicit domain tag. Split out so tests can show
/// that different application contexts yield unrelated keys.
pub(crate) fn resolve_with_tag(peer: &Identity, domain_tag: &[u8]) -> Result<[u8; 32], SealError> {
    let mut scalar = kdf::scalar_from_seed(peer.as_bytes(), domain_tag)
        .map_err(|e| SealError::InvalidPeerIdentity(e.to_string()))?;
    let secret = StaticSecret::from(scalar);
    let public = X25519Public::from(&secret).to_bytes();
    scalar.zeroize();
    Ok(public)
}
