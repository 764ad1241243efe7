use thiserror::Error;

#[derive(Debug, Error)]
pub enum SealError {
    #[error("Signing declined by the authority")]
    SigningDeclined,

    #[error("Signing authority unavailable: {0}")]
    SigningUnavailable(String),

    #[error("Session not initialised")]
    NotInitialized,

    #[error("Session has been cleared and cannot be reused")]
    SessionCleared,

    #[error("Session already initialised")]
    AlreadyInitialized,

    #[error("Invalid peer identity: {0}")]
    InvalidPeerIdentity(String),

    #[error("AEAD decryption failed (authentication tag mismatch — possible tampering)")]
    DecryptionFailed,

    #[error("AEAD encryption failed")]
    EncryptionFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Serialisation error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
