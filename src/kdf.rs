//! Key derivation.
//!
//! `derive_keypair` — HKDF-SHA256 over a wallet signature, clamped into an
//!   X25519 private scalar. The core of the scheme: the same signature and
//!   domain tag always yield the same keypair, so key material is
//!   recoverable from a fresh signature and never has to be stored.
//!
//! `derive_direction_key` — per-direction message key bound to
//!   sender/recipient, derived from a cached ECDH shared secret.
//!
//! `signing_challenge` — the constant human-readable string the signing
//!   authority is asked to sign, seeded with the local identity and the
//!   domain tag so a signature cannot be replayed into another application.

use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{error::SealError, identity::Identity};

/// Domain tag mixed into every HKDF invocation. Changing it re-keys the
/// entire deployment.
pub const DOMAIN_TAG: &[u8] = b"sealwire/e2e-keys/v1";

/// Fixed extract salt, shared by all derivations in this protocol.
const PROTOCOL_SALT: &[u8] = b"sealwire-hkdf-v1";

/// Expected signature length: 64-byte Ed25519 wallet signature.
pub const SIGNATURE_LEN: usize = 64;

// ── KeyPair ──────────────────────────────────────────────────────────────────

/// Derived X25519 keypair. The secret scalar is zeroized on drop and never
/// leaves the crate.
#[derive(ZeroizeOnDrop)]
pub struct KeyPair {
    secret: [u8; 32],
    #[zeroize(skip)]
    public: [u8; 32],
}

impl KeyPair {
    pub fn public_bytes(&self) -> &[u8; 32] {
        &self.public
    }

    /// X25519 with a peer's public point; returns the raw shared secret.
    pub(crate) fn diffie_hellman(&self, peer_public: &[u8; 32]) -> [u8; 32] {
        let secret = StaticSecret::from(self.secret);
        let shared = secret.diffie_hellman(&X25519Public::from(*peer_public));
        shared.to_bytes()
    }
}

// ── HKDF-SHA256 ──────────────────────────────────────────────────────────────

/// Expand `ikm` + `info` into `output.len()` bytes under the protocol salt.
pub(crate) fn hkdf_expand(ikm: &[u8], info: &[u8], output: &mut [u8]) -> Result<(), SealError> {
    let hk = Hkdf::<Sha256>::new(Some(PROTOCOL_SALT), ikm);
    hk.expand(info, output)
        .map_err(|e| SealError::KeyDerivation(e.to_string()))
}

/// RFC 7748 §5 clamp: clear the low 3 bits of the first byte, clear the
/// high bit and set the second-highest bit of the last byte.
pub(crate) fn clamp_scalar(scalar: &mut [u8; 32]) {
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
}

/// Derive a clamped private scalar from arbitrary seed material.
pub(crate) fn scalar_from_seed(seed: &[u8], domain_tag: &[u8]) -> Result<[u8; 32], SealError> {
    let mut scalar = [0u8; 32];
    hkdf_expand(seed, domain_tag, &mut scalar)?;
    clamp_scalar(&mut scalar);
    Ok(scalar)
}

// ── Keypair derivation ───────────────────────────────────────────────────────

/// Derive the local X25519 keypair from a wallet signature.
///
/// HKDF-SHA256(salt = protocol salt, ikm = signature, info = domain tag)
/// → 32-byte seed → clamp → private scalar → public = scalar · basepoint.
///
/// Deterministic: given a valid 64-byte signature there is no failure path,
/// and repeated calls return byte-identical keypairs.
pub fn derive_keypair(signature: &[u8], domain_tag: &[u8]) -> Result<KeyPair, SealError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(SealError::InvalidKey(format!(
            "signature must be {SIGNATURE_LEN} bytes, got {}",
            signature.len()
        )));
    }
    let mut scalar = scalar_from_seed(signature, domain_tag)?;
    let secret = StaticSecret::from(scalar);
    let public = X25519Public::from(&secret).to_bytes();
    scalar.zeroize();
    Ok(KeyPair {
        secret: secret.to_bytes(),
        public,
    })
}

/// Derive the 32-byte AEAD key for one direction of a conversation.
///
/// Both ends of a static shared secret send from counter zero, so sealing
/// both directions under the raw secret would repeat (key, nonce) pairs.
/// Binding sender and recipient into the HKDF info gives each direction an
/// independent key while keeping a single cached ECDH secret per peer.
pub(crate) fn derive_direction_key(
    shared_secret: &[u8; 32],
    sender: &Identity,
    recipient: &Identity,
) -> Result<[u8; 32], SealError> {
    let mut info = Vec::with_capacity(DOMAIN_TAG.len() + 10 + sender.as_bytes().len() + recipient.as_bytes().len());
    info.extend_from_slice(DOMAIN_TAG);
    info.extend_from_slice(b"/msg");
    // Length-prefix the sender so (sender, recipient) pairs cannot collide
    // under concatenation.
    info.extend_from_slice(&(sender.as_bytes().len() as u32).to_le_bytes());
    info.extend_from_slice(sender.as_bytes());
    info.extend_from_slice(recipient.as_bytes());
    let mut key = [0u8; 32];
    hkdf_expand(shared_secret, &info, &mut key)?;
    Ok(key)
}

// ── Signing challenge ────────────────────────────────────────────────────────

/// The constant, human-readable challenge presented to the signing
/// authority. Unique to this application via the domain tag; seeded with
/// the local identity so the text shown to the user names the account
/// being unlocked.
pub fn signing_challenge(local_identity: &Identity) -> String {
    format!(
        "sealwire key derivation v1\n\
         \n\
         Sign this message to unlock end-to-end encrypted messaging.\n\
         Account: {}\n\
         Context: {}\n\
         \n\
         This signature stays on your device and authorises nothing else.",
        local_identity.to_b64(),
        String::from_utf8_lossy(DOMAIN_TAG),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(byte: u8) -> Vec<u8> {
        vec![byte; SIGNATURE_LEN]
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_keypair(&sig(0x42), DOMAIN_TAG).unwrap();
        let b = derive_keypair(&sig(0x42), DOMAIN_TAG).unwrap();
        assert_eq!(a.public_bytes(), b.public_bytes());
        assert_eq!(a.secret, b.secret);
    }

    #[test]
    fn domain_tag_separates_keys() {
        let a = derive_keypair(&sig(0x42), DOMAIN_TAG).unwrap();
        let b = derive_keypair(&sig(0x42), b"other-app/v1").unwrap();
        assert_ne!(a.public_bytes(), b.public_bytes());
    }

    #[test]
    fn scalar_is_clamped() {
        let scalar = scalar_from_seed(&sig(0xFF), DOMAIN_TAG).unwrap();
        assert_eq!(scalar[0] & 0b0000_0111, 0);
        assert_eq!(scalar[31] & 0b1000_0000, 0);
        assert_eq!(scalar[31] & 0b0100_0000, 0b0100_0000);
    }

    #[test]
    fn rejects_wrong_signature_length() {
        assert!(matches!(
            derive_keypair(&[0u8; 63], DOMAIN_TAG),
            Err(SealError::InvalidKey(_))
        ));
        assert!(matches!(
            derive_keypair(&[], DOMAIN_TAG),
            Err(SealError::InvalidKey(_))
        ));
    }

    #[test]
    fn direction_keys_differ_per_direction() {
        let alice = Identity::from_bytes(vec![1u8; 32]).unwrap();
        let bob = Identity::from_bytes(vec![2u8; 32]).unwrap();
        let shared = [7u8; 32];
        let a_to_b = derive_direction_key(&shared, &alice, &bob).unwrap();
        let b_to_a = derive_direction_key(&shared, &bob, &alice).unwrap();
        assert_ne!(a_to_b, b_to_a);
        // Deterministic per direction
        assert_eq!(a_to_b, derive_direction_key(&shared, &alice, &bob).unwrap());
    }

    #[test]
    fn challenge_names_the_identity() {
        let id = Identity::from_bytes(vec![5u8; 32]).unwrap();
        let challenge = signing_challenge(&id);
        assert!(challenge.contains(&id.to_b64()));
        assert!(challenge.contains("sealwire"));
    }
}
