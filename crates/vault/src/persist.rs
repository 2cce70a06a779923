//! Persistence adapter for application state that must only be stored
//! encrypted.
//!
//! While the vault is locked there is *no data*: reads return `None`,
//! writes fail closed and rehydration leaves in-memory state alone instead
//! of resetting it to defaults.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};

use crate::{error::VaultError, hooks::HookSlot, store::ByteStore};

/// Outcome of [`GatedStorage::rehydrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rehydration {
    /// The vault is locked; state was not touched.
    Locked,
    /// Nothing stored under the name; state was not touched.
    Missing,
    /// State was replaced with the stored snapshot.
    Restored,
}

/// Key-value persistence gated on an unlocked vault.
#[derive(Clone)]
pub struct GatedStorage {
    hooks: HookSlot,
    store: Arc<dyn ByteStore>,
}

impl std::fmt::Debug for GatedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatedStorage")
            .field("available", &self.is_available())
            .finish_non_exhaustive()
    }
}

impl GatedStorage {
    pub fn new(hooks: HookSlot, store: Arc<dyn ByteStore>) -> Self {
        Self { hooks, store }
    }

    /// Whether reads and writes currently go through.
    pub fn is_available(&self) -> bool {
        self.hooks.is_installed()
    }

    /// Read and decrypt `name`. `Ok(None)` while locked; an error when the
    /// stored envelope does not open with the current key.
    pub fn get_item(&self, name: &str) -> Result<Option<String>, VaultError> {
        if !self.is_available() {
            return Ok(None);
        }
        let Some(raw) = self.store.get(name)? else {
            return Ok(None);
        };
        // An envelope the current key cannot open is an error, never data.
        match self.hooks.try_decrypt(&raw) {
            Ok(plaintext) => Ok(Some(plaintext)),
            // Locked between the check and the read.
            Err(VaultError::EncryptionUnavailable) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Encrypt and write `value`. Fails with
    /// [`VaultError::EncryptionUnavailable`] while locked.
    pub fn set_item(&self, name: &str, value: &str) -> Result<(), VaultError> {
        let sealed = self.hooks.encrypt(value)?;
        self.store.set(name, &sealed)?;
        Ok(())
    }

    /// Remove `name`. Allowed while locked.
    pub fn remove_item(&self, name: &str) -> Result<(), VaultError> {
        self.store.remove(name)?;
        Ok(())
    }

    /// Serialize `state` as JSON and store it encrypted under `name`.
    pub fn persist<T: Serialize>(&self, name: &str, state: &T) -> Result<(), VaultError> {
        let json = serde_json::to_string(state)?;
        self.set_item(name, &json)
    }

    /// Replace `state` with the snapshot stored under `name`, if one is
    /// available. On any error `state` is left untouched.
    pub fn rehydrate<T: DeserializeOwned>(
        &self,
        name: &str,
        state: &mut T,
    ) -> Result<Rehydration, VaultError> {
        if !self.is_available() {
            #[cfg(feature = "tracing")]
            tracing::debug!(name, "vault locked, skipping rehydration");
            return Ok(Rehydration::Locked);
        }
        let Some(json) = self.get_item(name)? else {
            return Ok(if self.is_available() {
                Rehydration::Missing
            } else {
                Rehydration::Locked
            });
        };
        *state = serde_json::from_str(&json)?;
        Ok(Rehydration::Restored)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{envelope::is_envelope, hooks::EncryptionHooks, store::MemoryStore},
    };

    struct Tagging;

    impl EncryptionHooks for Tagging {
        fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
            Ok(format!("sealed:{plaintext}"))
        }

        fn decrypt(&self, ciphertext: &str) -> String {
            ciphertext
                .strip_prefix("sealed:")
                .unwrap_or(ciphertext)
                .to_string()
        }
    }

    #[derive(Debug, Default, PartialEq, Serialize, serde::Deserialize)]
    struct Journal {
        entries: Vec<String>,
    }

    fn storage() -> (HookSlot, Arc<MemoryStore>, GatedStorage) {
        let slot = HookSlot::new();
        let raw = Arc::new(MemoryStore::new());
        let storage = GatedStorage::new(slot.clone(), raw.clone());
        (slot, raw, storage)
    }

    #[test]
    fn locked_reads_are_empty_and_writes_fail_closed() {
        let (_slot, raw, storage) = storage();
        raw.set("journal", "sealed:{}").unwrap();

        assert!(storage.get_item("journal").unwrap().is_none());
        assert!(matches!(
            storage.set_item("journal", "plain"),
            Err(VaultError::EncryptionUnavailable)
        ));
        assert_eq!(raw.get("journal").unwrap().as_deref(), Some("sealed:{}"));
    }

    #[test]
    fn locked_rehydrate_keeps_state() {
        let (_slot, raw, storage) = storage();
        raw.set("journal", r#"sealed:{"entries":[]}"#).unwrap();

        let mut state = Journal {
            entries: vec!["in memory".into()],
        };
        assert_eq!(
            storage.rehydrate("journal", &mut state).unwrap(),
            Rehydration::Locked
        );
        assert_eq!(state.entries, vec!["in memory"]);
    }

    #[test]
    fn unlocked_round_trip() {
        let (slot, raw, storage) = storage();
        slot.install(Arc::new(Tagging));

        let state = Journal {
            entries: vec!["slept well".into()],
        };
        storage.persist("journal", &state).unwrap();
        assert!(raw.get("journal").unwrap().unwrap().starts_with("sealed:"));

        let mut restored = Journal::default();
        assert_eq!(
            storage.rehydrate("journal", &mut restored).unwrap(),
            Rehydration::Restored
        );
        assert_eq!(restored, state);

        let mut untouched = Journal::default();
        assert_eq!(
            storage.rehydrate("missing", &mut untouched).unwrap(),
            Rehydration::Missing
        );

        storage.remove_item("journal").unwrap();
        assert!(storage.get_item("journal").unwrap().is_none());
    }

    #[tokio::test]
    async fn encrypts_through_vault_hooks() {
        use crate::{Vault, VaultConfig};

        let raw = Arc::new(MemoryStore::new());
        let vault = Vault::new(raw.clone(), VaultConfig {
            opslimit: Some(1),
            memlimit: Some(64 * 1024),
            ..VaultConfig::default()
        });
        let storage = GatedStorage::new(vault.hook_slot(), raw.clone());

        vault
            .setup_passphrase("correct horse battery staple")
            .await
            .unwrap();
        storage.set_item("app:prefs", "{\"theme\":\"dark\"}").unwrap();
        assert!(is_envelope(&raw.get("app:prefs").unwrap().unwrap()));
        assert_eq!(
            storage.get_item("app:prefs").unwrap().as_deref(),
            Some("{\"theme\":\"dark\"}")
        );

        vault.lock().await;
        assert!(storage.get_item("app:prefs").unwrap().is_none());
    }

    #[tokio::test]
    async fn rekeyed_vault_keeps_state_when_snapshot_does_not_open() {
        use crate::{Vault, VaultConfig};

        let raw = Arc::new(MemoryStore::new());
        let vault = Vault::new(raw.clone(), VaultConfig {
            opslimit: Some(1),
            memlimit: Some(64 * 1024),
            ..VaultConfig::default()
        });
        let storage = GatedStorage::new(vault.hook_slot(), raw.clone());

        vault
            .setup_passphrase("correct horse battery staple")
            .await
            .unwrap();
        storage
            .persist("app:state", &Journal {
                entries: vec!["ran 5k".into()],
            })
            .unwrap();
        let sealed = raw.get("app:state").unwrap().unwrap();

        vault.clear_all().await.unwrap();
        vault
            .setup_passphrase("an entirely new passphrase")
            .await
            .unwrap();

        let mut state = Journal {
            entries: vec!["in memory".into()],
        };
        assert!(matches!(
            storage.rehydrate("app:state", &mut state),
            Err(VaultError::Cipher(_))
        ));
        assert_eq!(state.entries, vec!["in memory"]);
        assert!(matches!(
            storage.get_item("app:state"),
            Err(VaultError::Cipher(_))
        ));
        assert_eq!(raw.get("app:state").unwrap().as_deref(), Some(sealed.as_str()));
    }
}
