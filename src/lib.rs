//! sealwire — signature-derived end-to-end encryption sessions
//!
//! Lets two wallet-identified parties exchange confidential messages with
//! no server-held key material: a one-time wallet signature over a constant
//! challenge deterministically seeds an X25519 keypair, a peer's encryption
//! public key is recomputed locally from the peer's stable identity, and
//! messages are sealed with XChaCha20-Poly1305 under per-peer monotonic
//! counter nonces.
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Deterministic derivation over stored keys: the keypair is recoverable
//!   from a fresh signature, so nothing secret is ever persisted.
//! - Zeroize all secret material on drop; secrets never appear in logs.
//! - Typed failures, no internal retries, no fallback key generation.
//!
//! # Module layout
//! - `identity` — opaque stable party identities + fingerprints
//! - `signer`   — external signing-authority collaborator trait
//! - `kdf`      — HKDF-SHA256 keypair derivation, clamping, challenge text
//! - `resolver` — closed-form peer public-key resolution
//! - `session`  — lifecycle state machine, shared-secret cache, message cipher
//! - `error`    — unified error type
//!
//! # Usage
//! ```no_run
//! use sealwire::{Identity, Session};
//!
//! # fn demo(wallet: &dyn sealwire::SigningAuthority) -> Result<(), sealwire::SealError> {
//! let me = Identity::from_bytes([0u8; 32].to_vec())?;
//! let peer = Identity::from_bytes([1u8; 32].to_vec())?;
//!
//! let session = Session::new(me);
//! session.initialize_with(wallet)?;
//!
//! let sealed = session.encrypt(b"hello", &peer)?;
//! let transport_blob = sealed.to_json()?;
//! # let _ = transport_blob;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod identity;
pub mod kdf;
pub mod resolver;
pub mod session;
pub mod signer;

pub use error::SealError;
pub use identity::Identity;
pub use kdf::{derive_keypair, signing_challenge, KeyPair, DOMAIN_TAG, SIGNATURE_LEN};
pub use resolver::resolve_peer_public_key;
pub use session::{EncryptedMessage, Session, SessionStatus};
pub use signer::SigningAuthority;
