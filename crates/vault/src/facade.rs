//! String and byte encryption bound to the key held by an unlocked vault.

use std::sync::Arc;

use {parking_lot::RwLock, zeroize::Zeroizing};

use crate::{
    envelope::{BytesEnvelope, Decrypted, Envelope, Plaintext},
    error::VaultError,
    hooks::EncryptionHooks,
    kdf,
    primitives::{PrimitiveProvider, Primitives},
};

/// The in-memory data-encryption key. `None` means locked.
///
/// Zeroing is best-effort: it overwrites this buffer but cannot reach copies
/// the allocator or OS may have made.
#[derive(Clone, Default)]
pub(crate) struct KeyRing {
    key: Arc<RwLock<Option<Zeroizing<Vec<u8>>>>>,
}

impl KeyRing {
    pub(crate) fn install(&self, key: Zeroizing<Vec<u8>>) {
        if let Some(mut old) = self.key.write().replace(key) {
            Primitives::memzero(&mut old);
        }
    }

    pub(crate) fn clear(&self) {
        if let Some(mut key) = self.key.write().take() {
            Primitives::memzero(&mut key);
        }
    }

    pub(crate) fn is_set(&self) -> bool {
        self.key.read().is_some()
    }
}

/// Encrypts and decrypts with whatever key the vault currently holds.
///
/// Cheap to clone; every clone follows lock/unlock of the owning vault.
#[derive(Clone)]
pub struct Encryptor {
    provider: PrimitiveProvider,
    key: KeyRing,
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryptor")
            .field("key_set", &self.key.is_set())
            .finish()
    }
}

impl Encryptor {
    pub(crate) fn new(provider: PrimitiveProvider, key: KeyRing) -> Self {
        Self { provider, key }
    }

    fn with_key<T>(
        &self,
        f: impl FnOnce(&Primitives, &[u8]) -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        let guard = self.key.key.read();
        let key = guard.as_ref().ok_or(VaultError::KeyNotSet)?;
        let primitives = self
            .provider
            .ready_sync()
            .ok_or(VaultError::PrimitivesNotReady)?;

        let expected = primitives.cipher().key_len();
        if key.len() != expected {
            return Err(VaultError::InvalidKey {
                expected,
                actual: key.len(),
            });
        }
        f(primitives.as_ref(), key.as_slice())
    }

    fn seal(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>, &'static str), VaultError> {
        self.with_key(|primitives, key| {
            let nonce = primitives.random_bytes(primitives.cipher().nonce_len());
            let ciphertext = primitives.seal(key, &nonce, plaintext)?;
            Ok((nonce, ciphertext, primitives.cipher().algorithm()))
        })
    }

    fn open_b64(&self, nonce_b64: &str, ciphertext_b64: &str) -> Result<Vec<u8>, VaultError> {
        let nonce = kdf::decode_b64(nonce_b64)?;
        let ciphertext = kdf::decode_b64(ciphertext_b64)?;
        self.with_key(|primitives, key| primitives.open(key, &nonce, &ciphertext))
    }

    /// Encrypt a message with a fresh random nonce into an [`Envelope`].
    pub fn encrypt_string<'a>(
        &self,
        message: impl Into<Plaintext<'a>>,
    ) -> Result<Envelope, VaultError> {
        let bytes = message.into().to_bytes()?;
        let (nonce, ciphertext, algorithm) = self.seal(&bytes)?;
        Ok(Envelope {
            v: algorithm.to_string(),
            n: kdf::encode_b64(&nonce),
            c: kdf::encode_b64(&ciphertext),
        })
    }

    /// Serialize `value` as JSON and encrypt it.
    pub fn encrypt_json<T: serde::Serialize>(&self, value: &T) -> Result<Envelope, VaultError> {
        let json = serde_json::to_value(value)?;
        self.encrypt_string(&json)
    }

    /// Decrypt a serialized envelope.
    ///
    /// Input that is not an envelope, or that fails to decrypt for any
    /// reason, is returned unchanged. Use [`try_decrypt_string`] to tell the
    /// two apart.
    ///
    /// [`try_decrypt_string`]: Self::try_decrypt_string
    pub fn decrypt_string(&self, input: &str) -> String {
        match self.try_decrypt_string(input) {
            Ok(decrypted) => decrypted.into_inner(),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %_e, "decrypt failed, returning input unchanged");
                input.to_string()
            },
        }
    }

    /// Decrypt, reporting failures on envelope-shaped input as errors.
    ///
    /// An envelope holding a non-UTF-8 buffer fails with
    /// [`VaultError::BinaryPayload`]; open it with
    /// [`decrypt_envelope_bytes`](Self::decrypt_envelope_bytes) instead.
    pub fn try_decrypt_string(&self, input: &str) -> Result<Decrypted, VaultError> {
        let Some(envelope) = Envelope::parse(input) else {
            return Ok(Decrypted::Passthrough(input.to_string()));
        };
        let plaintext = self.decrypt_envelope_bytes(&envelope)?;
        let text = String::from_utf8(plaintext).map_err(|_| VaultError::BinaryPayload)?;
        Ok(Decrypted::Plaintext(text))
    }

    /// Open an envelope and return its payload as raw bytes.
    pub fn decrypt_envelope_bytes(&self, envelope: &Envelope) -> Result<Vec<u8>, VaultError> {
        self.with_key(|primitives, _| {
            let algorithm = primitives.cipher().algorithm();
            if envelope.v != algorithm {
                return Err(VaultError::Cipher(format!(
                    "unsupported envelope algorithm {:?} (expected {algorithm})",
                    envelope.v
                )));
            }
            Ok(())
        })?;
        self.open_b64(&envelope.n, &envelope.c)
    }

    /// Encrypt raw bytes without envelope wrapping.
    pub fn encrypt_bytes(&self, bytes: &[u8]) -> Result<BytesEnvelope, VaultError> {
        let (nonce, ciphertext, _) = self.seal(bytes)?;
        Ok(BytesEnvelope {
            nonce: kdf::encode_b64(&nonce),
            cipher: kdf::encode_b64(&ciphertext),
        })
    }

    /// Decrypt a [`BytesEnvelope`]. Unlike [`decrypt_string`](Self::decrypt_string)
    /// this never passes input through: failures are errors.
    pub fn decrypt_bytes(&self, sealed: &BytesEnvelope) -> Result<Vec<u8>, VaultError> {
        self.open_b64(&sealed.nonce, &sealed.cipher)
    }
}

impl EncryptionHooks for Encryptor {
    fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        self.encrypt_string(plaintext)?.to_json()
    }

    fn decrypt(&self, ciphertext: &str) -> String {
        self.decrypt_string(ciphertext)
    }

    fn try_decrypt(&self, ciphertext: &str) -> Result<String, VaultError> {
        Ok(self.try_decrypt_string(ciphertext)?.into_inner())
    }
}
