//! Encrypted messaging sessions.
//!
//! One [`Session`] per local identity. Lifecycle:
//!
//! ```text
//! Uninitialized ── begin_initialization ──▶ Initializing
//! Initializing ── complete_initialization ─▶ Ready
//! Initializing ── abandon_initialization ──▶ Uninitialized
//! any state ───── clear ────────────────────▶ Cleared   (terminal)
//! ```
//!
//! From `Ready`, any number of [`Session::encrypt`] / [`Session::decrypt`]
//! calls may occur. `Cleared` is terminal: key material is dropped
//! (zeroized) and a fresh `Session` with a fresh signature is required.
//!
//! Per peer, the session caches exactly one ECDH shared secret (plus the
//! two direction keys derived from it) and one outgoing message counter.
//! All mutable state sits behind a single mutex, which makes the
//! read-then-increment of a counter atomic under concurrent encrypts; no
//! counter value is ever reissued, so counter-derived nonces never repeat.

use std::collections::HashMap;

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::{
    error::SealError,
    identity::Identity,
    kdf::{self, KeyPair, DOMAIN_TAG},
    resolver,
    signer::SigningAuthority,
};

/// Poly1305 tag length appended to every ciphertext.
pub const AEAD_TAG_LEN: usize = 16;

/// AAD bound into every message; versions the wire format.
const MSG_AAD: &[u8] = b"sealwire/msg/v1";

// ── Wire type ────────────────────────────────────────────────────────────────

/// An encrypted payload handed to the transport.
///
/// Opaque everywhere except [`Session::decrypt`]. The counter is the
/// sender's outgoing nonce counter for this conversation — not secret,
/// only unique — and must travel with the ciphertext because the receiver
/// rebuilds the nonce from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    pub counter: u64,
    #[serde(with = "b64_bytes")]
    pub ciphertext: Vec<u8>,
}

impl EncryptedMessage {
    pub fn to_json(&self) -> Result<String, SealError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, SealError> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Serde helper: ciphertext as base64url-no-pad on the JSON wire.
mod b64_bytes {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        URL_SAFE_NO_PAD.decode(s).map_err(serde::de::Error::custom)
    }
}

// ── Session state ────────────────────────────────────────────────────────────

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Uninitialized,
    Initializing,
    Ready,
    Cleared,
}

/// Cached key material for one peer: the raw ECDH secret and the AEAD key
/// for each direction of the conversation. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
struct PeerKeys {
    shared_secret: [u8; 32],
    /// Key for messages we send to this peer.
    seal_key: [u8; 32],
    /// Key for messages this peer sends to us.
    open_key: [u8; 32],
}

struct ReadyState {
    keys: KeyPair,
    secrets: HashMap<Identity, PeerKeys>,
    counters: HashMap<Identity, u64>,
}

impl ReadyState {
    /// Look up the cached key material for `peer`, computing it on first
    /// use. At most one ECDH per distinct peer per session.
    fn peer_keys(&mut self, local: &Identity, peer: &Identity) -> Result<&PeerKeys, SealError> {
        if !self.secrets.contains_key(peer) {
            let peer_public = resolver::resolve_peer_public_key(peer)?;
            let shared_secret = self.keys.diffie_hellman(&peer_public);
            let seal_key = kdf::derive_direction_key(&shared_secret, local, peer)?;
            let open_key = kdf::derive_direction_key(&shared_secret, peer, local)?;
            debug!(peer = %peer, "computed shared secret for peer");
            self.secrets.insert(
                peer.clone(),
                PeerKeys {
                    shared_secret,
                    seal_key,
                    open_key,
                },
            );
        }
        Ok(&self.secrets[peer])
    }
}

enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready(ReadyState),
    Cleared,
}

// ── Session ──────────────────────────────────────────────────────────────────

/// Signature-derived end-to-end encryption session for one local identity.
///
/// Methods take `&self`; the session is `Send + Sync` and may be shared
/// across threads. Concurrent calls serialise on the internal mutex —
/// a single critical section covering the shared-secret cache and the
/// nonce counters, as the nonce-uniqueness invariant requires.
pub struct Session {
    local: Identity,
    inner: Mutex<Lifecycle>,
}

impl Session {
    /// New session in the `Uninitialized` state.
    pub fn new(local_identity: Identity) -> Self {
        Self {
            local: local_identity,
            inner: Mutex::new(Lifecycle::Uninitialized),
        }
    }

    pub fn local_identity(&self) -> &Identity {
        &self.local
    }

    pub fn status(&self) -> SessionStatus {
        match *self.inner.lock() {
            Lifecycle::Uninitialized => SessionStatus::Uninitialized,
            Lifecycle::Initializing => SessionStatus::Initializing,
            Lifecycle::Ready(_) => SessionStatus::Ready,
            Lifecycle::Cleared => SessionStatus::Cleared,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Enter `Initializing` and return the challenge string to hand to the
    /// signing authority. Idempotent while already `Initializing` (the
    /// pending state carries no entropy, so the same challenge comes back).
    pub fn begin_initialization(&self) -> Result<String, SealError> {
        let mut guard = self.inner.lock();
        match *guard {
            Lifecycle::Uninitialized => {
                *guard = Lifecycle::Initializing;
                debug!(session = %self.local, "session initialisation begun");
                Ok(kdf::signing_challenge(&self.local))
            }
            Lifecycle::Initializing => Ok(kdf::signing_challenge(&self.local)),
            Lifecycle::Ready(_) => Err(SealError::AlreadyInitialized),
            Lifecycle::Cleared => Err(SealError::SessionCleared),
        }
    }

    /// Complete initialization with the signature produced over the
    /// challenge. On success the session is `Ready` and the derived keypair
    /// is owned exclusively by this session until [`Session::clear`].
    pub fn complete_initialization(&self, signature: &[u8]) -> Result<(), SealError> {
        let mut guard = self.inner.lock();
        match *guard {
            Lifecycle::Initializing => {
                let keys = kdf::derive_keypair(signature, DOMAIN_TAG)?;
                *guard = Lifecycle::Ready(ReadyState {
                    keys,
                    secrets: HashMap::new(),
                    counters: HashMap::new(),
                });
                debug!(session = %self.local, "session ready");
                Ok(())
            }
            Lifecycle::Uninitialized => Err(SealError::NotInitialized),
            Lifecycle::Ready(_) => Err(SealError::AlreadyInitialized),
            Lifecycle::Cleared => Err(SealError::SessionCleared),
        }
    }

    /// Abandon a pending initialization; the session returns to
    /// `Uninitialized`. No-op in any other state.
    pub fn abandon_initialization(&self) {
        let mut guard = self.inner.lock();
        if matches!(*guard, Lifecycle::Initializing) {
            *guard = Lifecycle::Uninitialized;
            debug!(session = %self.local, "session initialisation abandoned");
        }
    }

    /// Two-phase initialization in one call: the signing authority is asked
    /// to sign the challenge, and a decline leaves the session
    /// `Uninitialized`. No retry, no fallback key — re-invoke explicitly if
    /// the caller wants another attempt.
    pub fn initialize_with(&self, signer: &dyn SigningAuthority) -> Result<(), SealError> {
        let challenge = self.begin_initialization()?;
        // The lock is not held here: signing may block on user interaction.
        let signature = match signer.sign(challenge.as_bytes()) {
            Ok(sig) => sig,
            Err(e) => {
                self.abandon_initialization();
                return Err(e);
            }
        };
        self.complete_initialization(&signature)
    }

    /// Tear down the session. Drops (and thereby zeroizes) the keypair,
    /// every cached shared secret and every counter. Terminal.
    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        if !matches!(*guard, Lifecycle::Cleared) {
            *guard = Lifecycle::Cleared;
            debug!(session = %self.local, "session cleared");
        }
    }

    // ── Message cipher ───────────────────────────────────────────────────────

    /// Encrypt `plaintext` for `peer`.
    ///
    /// Reads then increments the peer's outgoing counter under the session
    /// lock, derives the nonce from the value read, and seals under the
    /// sending-direction key. The returned counter is consumed even if a
    /// later step fails, so a retried call can never reuse a nonce.
    pub fn encrypt(&self, plaintext: &[u8], peer: &Identity) -> Result<EncryptedMessage, SealError> {
        let mut guard = self.inner.lock();
        let ready = ready_mut(&mut guard)?;
        let seal_key = ready.peer_keys(&self.local, peer)?.seal_key;
        let slot = ready.counters.entry(peer.clone()).or_insert(0);
        let counter = *slot;
        *slot += 1;
        let ciphertext = seal(&seal_key, counter, plaintext)?;
        Ok(EncryptedMessage { counter, ciphertext })
    }

    /// Decrypt a message received from `peer`.
    ///
    /// Uses the same cached shared secret as sending to that peer (ECDH is
    /// symmetric), but the nonce comes from the **sender's** counter carried
    /// inside the message. Authentication failure — corrupt payload, wrong
    /// key or tampering — yields [`SealError::DecryptionFailed`] and no
    /// partial plaintext.
    pub fn decrypt(
        &self,
        message: &EncryptedMessage,
        peer: &Identity,
    ) -> Result<Zeroizing<Vec<u8>>, SealError> {
        let mut guard = self.inner.lock();
        let ready = ready_mut(&mut guard)?;
        let open_key = ready.peer_keys(&self.local, peer)?.open_key;
        open(&open_key, message.counter, &message.ciphertext)
    }

    // ── Counter management ───────────────────────────────────────────────────

    /// Next counter value that `encrypt` would use for `peer`. Read-only;
    /// zero for a peer no message has been addressed to.
    pub fn message_counter(&self, peer: &Identity) -> Result<u64, SealError> {
        let mut guard = self.inner.lock();
        let ready = ready_mut(&mut guard)?;
        Ok(ready.counters.get(peer).copied().unwrap_or(0))
    }

    /// Explicitly consume and return the next counter value for `peer`,
    /// for callers that pre-reserve a value for an external layer. The
    /// returned value will never be used by a subsequent `encrypt`.
    pub fn reserve_counter(&self, peer: &Identity) -> Result<u64, SealError> {
        let mut guard = self.inner.lock();
        let ready = ready_mut(&mut guard)?;
        let slot = ready.counters.entry(peer.clone()).or_insert(0);
        let reserved = *slot;
        *slot += 1;
        Ok(reserved)
    }
}

fn ready_mut(guard: &mut Lifecycle) -> Result<&mut ReadyState, SealError> {
    match guard {
        Lifecycle::Ready(state) => Ok(state),
        _ => Err(SealError::NotInitialized),
    }
}

// ── AEAD under counter-derived nonces ────────────────────────────────────────

/// 24-byte XChaCha20-Poly1305 nonce: 8-byte little-endian counter,
/// zero-padded. Collision-free as long as the counter is never reset.
fn nonce_from_counter(counter: u64) -> XNonce {
    let mut nonce = [0u8; 24];
    nonce[..8].copy_from_slice(&counter.to_le_bytes());
    XNonce::from(nonce)
}

fn seal(key: &[u8; 32], counter: u64, plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| SealError::EncryptionFailed)?;
    cipher
        .encrypt(
            &nonce_from_counter(counter),
            Payload {
                msg: plaintext,
                aad: MSG_AAD,
            },
        )
        .map_err(|_| SealError::EncryptionFailed)
}

fn open(key: &[u8; 32], counter: u64, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, SealError> {
    if ciphertext.len() < AEAD_TAG_LEN {
        return Err(SealError::DecryptionFailed);
    }
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| SealError::DecryptionFailed)?;
    let plaintext = cipher
        .decrypt(
            &nonce_from_counter(counter),
            Payload {
                msg: ciphertext,
                aad: MSG_AAD,
            },
        )
        .map_err(|_| SealError::DecryptionFailed)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::SIGNATURE_LEN;

    /// A wallet whose canonical signed material doubles as its published
    /// identity bytes (the derivation rule's coherence assumption).
    fn wallet(tag: u8) -> (Identity, Vec<u8>) {
        let material = vec![tag; SIGNATURE_LEN];
        (Identity::from_bytes(material.clone()).unwrap(), material)
    }

    fn ready_session(tag: u8) -> Session {
        let (id, sig) = wallet(tag);
        let session = Session::new(id);
        session.begin_initialization().unwrap();
        session.complete_initialization(&sig).unwrap();
        session
    }

    #[test]
    fn lifecycle_happy_path() {
        let (id, sig) = wallet(1);
        let session = Session::new(id);
        assert_eq!(session.status(), SessionStatus::Uninitialized);
        let challenge = session.begin_initialization().unwrap();
        assert!(challenge.contains("sealwire"));
        assert_eq!(session.status(), SessionStatus::Initializing);
        session.complete_initialization(&sig).unwrap();
        assert_eq!(session.status(), SessionStatus::Ready);
        session.clear();
        assert_eq!(session.status(), SessionStatus::Cleared);
    }

    #[test]
    fn begin_is_idempotent_while_pending() {
        let (id, _) = wallet(2);
        let session = Session::new(id);
        let first = session.begin_initialization().unwrap();
        let second = session.begin_initialization().unwrap();
        assert_eq!(first, second);
        assert_eq!(session.status(), SessionStatus::Initializing);
    }

    #[test]
    fn complete_without_begin_fails() {
        let (id, sig) = wallet(3);
        let session = Session::new(id);
        assert!(matches!(
            session.complete_initialization(&sig),
            Err(SealError::NotInitialized)
        ));
    }

    #[test]
    fn abandon_returns_to_uninitialized() {
        let (id, sig) = wallet(4);
        let session = Session::new(id);
        session.begin_initialization().unwrap();
        session.abandon_initialization();
        assert_eq!(session.status(), SessionStatus::Uninitialized);
        // A fresh cycle still works.
        session.begin_initialization().unwrap();
        session.complete_initialization(&sig).unwrap();
        assert_eq!(session.status(), SessionStatus::Ready);
    }

    #[test]
    fn ready_session_rejects_reinitialization() {
        let session = ready_session(5);
        assert!(matches!(
            session.begin_initialization(),
            Err(SealError::AlreadyInitialized)
        ));
    }

    #[test]
    fn cleared_is_terminal() {
        let session = ready_session(6);
        session.clear();
        assert!(matches!(
            session.begin_initialization(),
            Err(SealError::SessionCleared)
        ));
        assert!(matches!(
            session.complete_initialization(&[0u8; SIGNATURE_LEN]),
            Err(SealError::SessionCleared)
        ));
        // abandon and clear stay no-ops
        session.abandon_initialization();
        session.clear();
        assert_eq!(session.status(), SessionStatus::Cleared);
    }

    #[test]
    fn operations_before_ready_fail_not_initialized() {
        let (id, _) = wallet(7);
        let (peer, _) = wallet(8);
        let session = Session::new(id);
        assert!(matches!(
            session.encrypt(b"x", &peer),
            Err(SealError::NotInitialized)
        ));
        assert!(matches!(
            session.message_counter(&peer),
            Err(SealError::NotInitialized)
        ));
        assert!(matches!(
            session.reserve_counter(&peer),
            Err(SealError::NotInitialized)
        ));
    }

    #[test]
    fn counter_reads_and_reservations() {
        let session = ready_session(9);
        let (peer, _) = wallet(10);
        assert_eq!(session.message_counter(&peer).unwrap(), 0);
        assert_eq!(session.reserve_counter(&peer).unwrap(), 0);
        assert_eq!(session.message_counter(&peer).unwrap(), 1);
        let msg = session.encrypt(b"after reservation", &peer).unwrap();
        // The reserved value 0 was consumed; encrypt uses 1.
        assert_eq!(msg.counter, 1);
        assert_eq!(session.message_counter(&peer).unwrap(), 2);
    }

    #[test]
    fn counters_are_tracked_per_peer() {
        let session = ready_session(11);
        let (peer_a, _) = wallet(12);
        let (peer_b, _) = wallet(13);
        session.encrypt(b"one", &peer_a).unwrap();
        session.encrypt(b"two", &peer_a).unwrap();
        let to_b = session.encrypt(b"three", &peer_b).unwrap();
        assert_eq!(to_b.counter, 0);
        assert_eq!(session.message_counter(&peer_a).unwrap(), 2);
        assert_eq!(session.message_counter(&peer_b).unwrap(), 1);
    }

    #[test]
    fn wire_json_roundtrip() {
        let msg = EncryptedMessage {
            counter: 42,
            ciphertext: vec![0xDE, 0xAD, 0xBE, 0xEF],
        };
        let json = msg.to_json().unwrap();
        // Ciphertext travels as base64, not a byte array.
        assert!(json.contains("3q2-7w"));
        assert_eq!(EncryptedMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn nonce_encodes_counter_little_endian() {
        let nonce = nonce_from_counter(0x0102_0304_0506_0708);
        assert_eq!(&nonce[..8], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert!(nonce[8..].iter().all(|&b| b == 0));
    }
}
