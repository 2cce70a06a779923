//! Lazily initialized cryptographic primitive provider.
//!
//! [`PrimitiveProvider::ready`] loads and self-tests the primitives exactly
//! once per provider; concurrent first callers await the same in-flight
//! initialization. A failed load surfaces as
//! [`VaultError::PrimitivesUnavailable`], never as a degraded mode.

use std::sync::Arc;

use {rand::RngCore, tally_config::KdfPreset, tokio::sync::OnceCell, zeroize::Zeroize};

use crate::{
    error::VaultError,
    kdf::{self, KdfParams},
    traits::Cipher,
    xchacha20::XChaCha20Poly1305Cipher,
};

/// Salt length used when the reported one is unusable.
pub const FALLBACK_SALT_LEN: usize = 16;

/// libsodium-compatible Argon2id presets.
const OPSLIMIT_INTERACTIVE: u64 = 2;
const MEMLIMIT_INTERACTIVE: u64 = 64 * 1024 * 1024;
const OPSLIMIT_MODERATE: u64 = 3;
const MEMLIMIT_MODERATE: u64 = 256 * 1024 * 1024;
const OPSLIMIT_SENSITIVE: u64 = 4;
const MEMLIMIT_SENSITIVE: u64 = 1024 * 1024 * 1024;

/// Loader used by a provider; swapped out in tests to simulate failures.
pub type PrimitiveLoader = fn() -> Result<Primitives, VaultError>;

/// Handle to the initialized primitives: KDF, verification hashing, AEAD,
/// randomness and zeroing.
pub struct Primitives {
    cipher: Box<dyn Cipher>,
    salt_len: usize,
}

impl std::fmt::Debug for Primitives {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Primitives")
            .field("cipher", &self.cipher.algorithm())
            .field("salt_len", &self.salt_len)
            .finish()
    }
}

impl Primitives {
    /// Build primitives around `cipher`, with the salt length reported by
    /// the password-hashing backend.
    ///
    /// A reported length below Argon2's minimum is replaced by
    /// [`FALLBACK_SALT_LEN`] (with a warning); a zero-length salt is never
    /// used.
    pub fn new(cipher: Box<dyn Cipher>, reported_salt_len: usize) -> Self {
        let salt_len = if reported_salt_len < argon2::MIN_SALT_LEN {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                reported = reported_salt_len,
                fallback = FALLBACK_SALT_LEN,
                "invalid salt length reported by primitives, using fallback"
            );
            FALLBACK_SALT_LEN
        } else {
            reported_salt_len
        };
        Self { cipher, salt_len }
    }

    /// Default loader: Argon2id + XChaCha20-Poly1305, self-tested.
    pub fn load() -> Result<Self, VaultError> {
        let primitives = Self::new(
            Box::new(XChaCha20Poly1305Cipher),
            argon2::RECOMMENDED_SALT_LEN,
        );
        primitives.self_test()?;
        Ok(primitives)
    }

    /// Exercise every primitive once with minimal cost so a broken backend
    /// fails here instead of during setup.
    fn self_test(&self) -> Result<(), VaultError> {
        let unavailable = |what: &str, e: VaultError| {
            VaultError::PrimitivesUnavailable(format!("{what} self-test failed: {e}"))
        };
        let params = KdfParams {
            opslimit: 1,
            memlimit: 8 * 1024,
        };
        let salt = [0u8; FALLBACK_SALT_LEN];

        let hash = kdf::hash_passphrase(b"self-test", &salt, &params)
            .map_err(|e| unavailable(kdf::ALGORITHM, e))?;
        if !kdf::verify_passphrase(b"self-test", &hash).map_err(|e| unavailable(kdf::ALGORITHM, e))? {
            return Err(VaultError::PrimitivesUnavailable(
                "argon2id verification self-test mismatch".into(),
            ));
        }

        let key = kdf::derive_key(b"self-test", &salt, &params, self.cipher.key_len())
            .map_err(|e| unavailable(kdf::ALGORITHM, e))?;
        let nonce = vec![0u8; self.cipher.nonce_len()];
        let sealed = self
            .cipher
            .encrypt(&key, &nonce, b"self-test", b"")
            .map_err(|e| unavailable(self.cipher.algorithm(), e))?;
        let opened = self
            .cipher
            .decrypt(&key, &nonce, &sealed, b"")
            .map_err(|e| unavailable(self.cipher.algorithm(), e))?;
        if opened != b"self-test" {
            return Err(VaultError::PrimitivesUnavailable(format!(
                "{} self-test mismatch",
                self.cipher.algorithm()
            )));
        }
        Ok(())
    }

    /// The AEAD cipher.
    pub fn cipher(&self) -> &dyn Cipher {
        self.cipher.as_ref()
    }

    /// Salt length for key derivation, resolved once at construction.
    pub fn salt_len(&self) -> usize {
        self.salt_len
    }

    /// Argon2id cost for a preset, with explicit overrides applied.
    pub fn kdf_params(
        &self,
        preset: KdfPreset,
        opslimit: Option<u64>,
        memlimit: Option<u64>,
    ) -> KdfParams {
        let (ops, mem) = match preset {
            KdfPreset::Interactive => (OPSLIMIT_INTERACTIVE, MEMLIMIT_INTERACTIVE),
            KdfPreset::Moderate => (OPSLIMIT_MODERATE, MEMLIMIT_MODERATE),
            KdfPreset::Sensitive => (OPSLIMIT_SENSITIVE, MEMLIMIT_SENSITIVE),
        };
        KdfParams {
            opslimit: opslimit.unwrap_or(ops),
            memlimit: memlimit.unwrap_or(mem),
        }
    }

    /// Fill a fresh buffer with `len` random bytes.
    pub fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        rand::rng().fill_bytes(&mut bytes);
        bytes
    }

    /// AEAD-encrypt with no additional data.
    pub fn seal(&self, key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
        self.cipher.encrypt(key, nonce, plaintext, b"")
    }

    /// AEAD-decrypt with no additional data.
    pub fn open(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, VaultError> {
        self.cipher.decrypt(key, nonce, ciphertext, b"")
    }

    /// Best-effort overwrite of sensitive memory.
    pub fn memzero(buf: &mut [u8]) {
        buf.zeroize();
    }
}

/// One-time, task-safe initializer for [`Primitives`].
///
/// Cloning shares the same underlying handle.
#[derive(Clone)]
pub struct PrimitiveProvider {
    cell: Arc<OnceCell<Arc<Primitives>>>,
    loader: PrimitiveLoader,
}

impl std::fmt::Debug for PrimitiveProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimitiveProvider")
            .field("ready", &self.cell.initialized())
            .finish()
    }
}

impl Default for PrimitiveProvider {
    fn default() -> Self {
        Self::with_loader(Primitives::load)
    }
}

impl PrimitiveProvider {
    /// Provider backed by a custom loader.
    pub fn with_loader(loader: PrimitiveLoader) -> Self {
        Self {
            cell: Arc::new(OnceCell::new()),
            loader,
        }
    }

    /// Wait for the primitives, initializing them on first use.
    ///
    /// The loader runs on the blocking pool. A failure leaves the provider
    /// uninitialized.
    pub async fn ready(&self) -> Result<Arc<Primitives>, VaultError> {
        let loader = self.loader;
        self.cell
            .get_or_try_init(|| async move {
                let primitives = tokio::task::spawn_blocking(loader)
                    .await
                    .map_err(|e| VaultError::PrimitivesUnavailable(e.to_string()))??;

                #[cfg(feature = "tracing")]
                tracing::debug!(cipher = primitives.cipher().algorithm(), "primitives ready");

                Ok::<_, VaultError>(Arc::new(primitives))
            })
            .await
            .cloned()
    }

    /// The primitives if already initialized, without waiting.
    pub fn ready_sync(&self) -> Option<Arc<Primitives>> {
        self.cell.get().cloned()
    }
}
