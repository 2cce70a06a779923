//! Cipher trait for swappable authenticated encryption backends.

use crate::error::VaultError;

/// Trait for authenticated encryption with associated data (AEAD).
///
/// The nonce is supplied by the caller so it can travel separately from the
/// ciphertext (the envelope stores them in distinct fields).
pub trait Cipher: Send + Sync {
    /// Algorithm identifier written into envelopes and vault metadata.
    fn algorithm(&self) -> &'static str;

    /// Required key length in bytes.
    fn key_len(&self) -> usize;

    /// Required nonce length in bytes.
    fn nonce_len(&self) -> usize;

    /// Encrypt `plaintext`, returning `ciphertext || tag`.
    fn encrypt(
        &self,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, VaultError>;

    /// Decrypt a buffer previously produced by [`encrypt`](Self::encrypt).
    fn decrypt(
        &self,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, VaultError>;
}
