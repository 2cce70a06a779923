//! Encryption capability handed to storage code.
//!
//! Storage code receives a [`HookSlot`] at construction time instead of
//! reaching for process-global functions. The vault fills the slot while
//! unlocked and empties it on lock; callers that find it empty must fail
//! closed rather than write plaintext.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{envelope::is_envelope, error::VaultError};

/// Encrypt/decrypt functions installed by an unlocked vault.
pub trait EncryptionHooks: Send + Sync {
    /// Encrypt `plaintext` into a serialized envelope.
    fn encrypt(&self, plaintext: &str) -> Result<String, VaultError>;

    /// Decrypt a serialized envelope; non-envelopes and undecryptable input
    /// come back unchanged.
    fn decrypt(&self, ciphertext: &str) -> String;

    /// Decrypt, failing when envelope-shaped input cannot be opened.
    /// Non-envelopes still come back unchanged.
    fn try_decrypt(&self, ciphertext: &str) -> Result<String, VaultError> {
        let plaintext = self.decrypt(ciphertext);
        if plaintext == ciphertext && is_envelope(ciphertext) {
            return Err(VaultError::Cipher("envelope could not be decrypted".into()));
        }
        Ok(plaintext)
    }
}

/// Shared slot holding the currently installed [`EncryptionHooks`], if any.
///
/// Clones observe the same slot. Only the vault installs or revokes.
#[derive(Clone, Default)]
pub struct HookSlot {
    hooks: Arc<RwLock<Option<Arc<dyn EncryptionHooks>>>>,
}

impl std::fmt::Debug for HookSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSlot")
            .field("installed", &self.is_installed())
            .finish()
    }
}

impl HookSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self) -> bool {
        self.hooks.read().is_some()
    }

    /// Encrypt through the installed hooks, or fail with
    /// [`VaultError::EncryptionUnavailable`].
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let hooks = self.current().ok_or(VaultError::EncryptionUnavailable)?;
        hooks.encrypt(plaintext)
    }

    /// Decrypt through the installed hooks, or fail with
    /// [`VaultError::EncryptionUnavailable`].
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, VaultError> {
        let hooks = self.current().ok_or(VaultError::EncryptionUnavailable)?;
        Ok(hooks.decrypt(ciphertext))
    }

    /// Decrypt through the installed hooks. Unlike [`decrypt`](Self::decrypt)
    /// an envelope that cannot be opened is an error, not a passthrough.
    pub fn try_decrypt(&self, ciphertext: &str) -> Result<String, VaultError> {
        let hooks = self.current().ok_or(VaultError::EncryptionUnavailable)?;
        hooks.try_decrypt(ciphertext)
    }

    // Cloned out so hook calls never run under the slot lock.
    fn current(&self) -> Option<Arc<dyn EncryptionHooks>> {
        self.hooks.read().clone()
    }

    pub(crate) fn install(&self, hooks: Arc<dyn EncryptionHooks>) {
        *self.hooks.write() = Some(hooks);
    }

    pub(crate) fn revoke(&self) {
        self.hooks.write().take();
    }
}
