//! External signing authority.
//!
//! Key derivation is seeded by a one-time signature produced outside this
//! crate (a wallet, a hardware signer, a user-interactive prompt). The
//! crate never holds the signing key and never fabricates a fallback
//! keypair when signing fails — a decline is surfaced as-is and the caller
//! decides whether to ask again.

use crate::error::SealError;

/// Collaborator that can sign an opaque byte string on behalf of the local
/// identity.
///
/// Implementations return [`SealError::SigningDeclined`] when the user (or
/// policy) refuses, and [`SealError::SigningUnavailable`] when no signer is
/// reachable. Both leave the session untouched.
pub trait SigningAuthority {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SealError>;
}
