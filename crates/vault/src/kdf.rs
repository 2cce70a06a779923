//! Argon2id key derivation and passphrase verification hashes.

use {
    argon2::{
        Argon2,
        password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    },
    base64::Engine,
    zeroize::Zeroizing,
};

use crate::error::VaultError;

/// Algorithm identifier recorded in vault metadata.
pub const ALGORITHM: &str = "argon2id";

/// Argon2id cost parameters, libsodium style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KdfParams {
    /// Number of passes over memory.
    pub opslimit: u64,
    /// Memory cost in bytes.
    pub memlimit: u64,
}

impl KdfParams {
    /// Argon2 counts memory in KiB; a `memlimit` remainder below 1 KiB is
    /// truncated. Config validation only admits whole KiB.
    fn to_argon2(self, output_len: Option<usize>) -> Result<Argon2<'static>, VaultError> {
        let t_cost = u32::try_from(self.opslimit)
            .map_err(|_| VaultError::Cipher(format!("opslimit out of range: {}", self.opslimit)))?;
        let m_cost = u32::try_from(self.memlimit / 1024)
            .map_err(|_| VaultError::Cipher(format!("memlimit out of range: {}", self.memlimit)))?;

        let params = argon2::Params::new(m_cost, t_cost, 1, output_len)
            .map_err(|e| VaultError::Cipher(format!("invalid KDF params: {e}")))?;

        Ok(Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        ))
    }
}

/// Derive a `key_len`-byte key from a passphrase and salt using Argon2id.
///
/// Identical inputs always produce the identical key.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    params: &KdfParams,
    key_len: usize,
) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let argon2 = params.to_argon2(Some(key_len))?;

    let mut output = Zeroizing::new(vec![0u8; key_len]);
    argon2
        .hash_password_into(passphrase, salt, output.as_mut_slice())
        .map_err(|e| VaultError::Cipher(format!("KDF failed: {e}")))?;

    Ok(output)
}

/// Produce a self-salted PHC string (`$argon2id$v=19$...`) for `passphrase`.
///
/// The hash carries its own salt and is unrelated to the data-encryption key.
pub fn hash_passphrase(
    passphrase: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<String, VaultError> {
    let salt = SaltString::encode_b64(salt)
        .map_err(|e| VaultError::Cipher(format!("invalid verification salt: {e}")))?;
    let hash = params
        .to_argon2(None)?
        .hash_password(passphrase, &salt)
        .map_err(|e| VaultError::Cipher(format!("failed to hash passphrase: {e}")))?;
    Ok(hash.to_string())
}

/// Check `passphrase` against a PHC string from [`hash_passphrase`].
///
/// `Ok(false)` means a clean mismatch. Any parse or library failure is
/// reported as [`VaultError::VerificationFailed`], never as a match.
pub fn verify_passphrase(passphrase: &[u8], hash: &str) -> Result<bool, VaultError> {
    let parsed = PasswordHash::new(hash).map_err(|_| VaultError::VerificationFailed)?;
    if parsed.algorithm.as_str() != ALGORITHM {
        return Err(VaultError::VerificationFailed);
    }

    match Argon2::default().verify_password(passphrase, &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(_) => Err(VaultError::VerificationFailed),
    }
}

/// Encode bytes with the standard (non URL-safe) base64 alphabet.
pub fn encode_b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode standard base64.
pub fn decode_b64(b64: &str) -> Result<Vec<u8>, VaultError> {
    base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(VaultError::Base64)
}
