//! XChaCha20-Poly1305 implementation of the [`Cipher`] trait.

#[allow(deprecated)] // upstream generic-array 0.x deprecation
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::{error::VaultError, traits::Cipher};

/// Algorithm identifier stored in envelopes (`"v"`) and metadata.
pub const ALGORITHM: &str = "xchacha20-poly1305";

/// Key size for XChaCha20-Poly1305 (32 bytes).
pub const KEY_LEN: usize = 32;

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag size.
const TAG_LEN: usize = 16;

/// XChaCha20-Poly1305 AEAD cipher.
///
/// Output layout: `[ciphertext + Poly1305 tag: N + 16 bytes]`; the 24-byte
/// nonce is carried separately by the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct XChaCha20Poly1305Cipher;

impl XChaCha20Poly1305Cipher {
    fn build(key: &[u8]) -> Result<XChaCha20Poly1305, VaultError> {
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| VaultError::InvalidKey {
            expected: KEY_LEN,
            actual: key.len(),
        })
    }

    fn check_nonce(nonce: &[u8]) -> Result<(), VaultError> {
        if nonce.len() != NONCE_LEN {
            return Err(VaultError::Cipher(format!(
                "invalid nonce length: {} (expected {NONCE_LEN})",
                nonce.len()
            )));
        }
        Ok(())
    }
}

impl Cipher for XChaCha20Poly1305Cipher {
    fn algorithm(&self) -> &'static str {
        ALGORITHM
    }

    fn key_len(&self) -> usize {
        KEY_LEN
    }

    fn nonce_len(&self) -> usize {
        NONCE_LEN
    }

    #[allow(deprecated)]
    fn encrypt(
        &self,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        Self::check_nonce(nonce)?;
        let cipher = Self::build(key)?;

        cipher
            .encrypt(XNonce::from_slice(nonce), Payload {
                msg: plaintext,
                aad,
            })
            .map_err(|e| VaultError::Cipher(e.to_string()))
    }

    #[allow(deprecated)]
    fn decrypt(
        &self,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        Self::check_nonce(nonce)?;
        if ciphertext.len() < TAG_LEN {
            return Err(VaultError::Cipher("ciphertext too short".to_string()));
        }
        let cipher = Self::build(key)?;

        cipher
            .decrypt(XNonce::from_slice(nonce), Payload {
                msg: ciphertext,
                aad,
            })
            .map_err(|e| VaultError::Cipher(e.to_string()))
    }
}
