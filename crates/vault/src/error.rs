//! Vault error types.

use crate::store::StorageError;

/// Errors produced by vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Passphrase shorter than the configured minimum.
    #[error("passphrase must be at least {min} characters")]
    WeakPassphrase { min: usize },

    /// The cryptographic primitives failed to initialize (or lack Argon2id).
    #[error("cryptographic primitives unavailable: {0}")]
    PrimitivesUnavailable(String),

    /// The primitives have not finished initializing yet.
    #[error("cryptographic primitives are not ready")]
    PrimitivesNotReady,

    /// No vault metadata exists; run setup first.
    #[error("vault is not configured")]
    NotConfigured,

    /// A vault already exists; clear it before setting up a new one.
    #[error("vault is already initialized")]
    AlreadyInitialized,

    /// The passphrase did not match the verification hash.
    #[error("incorrect passphrase")]
    IncorrectPassphrase,

    /// The verification hash could not be checked (library or data error).
    ///
    /// Displays exactly like [`IncorrectPassphrase`](Self::IncorrectPassphrase).
    #[error("incorrect passphrase")]
    VerificationFailed,

    /// Vault metadata could not be written during setup.
    #[error("failed to persist vault metadata: {0}")]
    PersistFailure(String),

    /// The vault is locked, no key is held in memory.
    #[error("vault is locked")]
    KeyNotSet,

    /// The held key does not match the cipher's key size.
    #[error("invalid key length: {actual} (expected {expected})")]
    InvalidKey { expected: usize, actual: usize },

    /// No encryption hooks are installed (vault locked or never unlocked).
    #[error("encryption unavailable")]
    EncryptionUnavailable,

    /// Key derivation did not finish within the configured timeout.
    #[error("key derivation timed out")]
    Timeout,

    /// An envelope opened, but its payload is not UTF-8 text.
    #[error("decrypted payload is binary, not utf-8 text")]
    BinaryPayload,

    /// Encryption or decryption failed (tampered data, wrong key).
    #[error("cipher error: {0}")]
    Cipher(String),

    /// Byte-store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Base64 decoding failed.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    /// Whether this error is a failed passphrase check of either kind.
    ///
    /// UIs should present both as the same "try again" outcome.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, Self::IncorrectPassphrase | Self::VerificationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failures_share_message() {
        assert_eq!(
            VaultError::IncorrectPassphrase.to_string(),
            VaultError::VerificationFailed.to_string()
        );
        assert!(VaultError::VerificationFailed.is_credential_failure());
        assert!(!VaultError::NotConfigured.is_credential_failure());
    }
}
