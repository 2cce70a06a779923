//! End-to-end vault lifecycle tests over in-memory and file-backed stores.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tally_vault::{
    ByteStore, FileStore, GatedStorage, MemoryStore, PrimitiveProvider, Primitives, Rehydration,
    StorageError, Vault, VaultConfig, VaultError, VaultMetadata, VaultState, is_envelope,
};

const PASSPHRASE: &str = "correct horse battery staple";

fn fast_config() -> VaultConfig {
    VaultConfig {
        opslimit: Some(1),
        memlimit: Some(64 * 1024),
        ..VaultConfig::default()
    }
}

/// Costly enough that derivation outlasts a one-millisecond timeout.
fn slow_config(derivation_timeout_ms: Option<u64>) -> VaultConfig {
    VaultConfig {
        opslimit: Some(2),
        memlimit: Some(16 * 1024 * 1024),
        derivation_timeout_ms,
        ..VaultConfig::default()
    }
}

fn memory_vault() -> (Arc<MemoryStore>, Vault) {
    let raw = Arc::new(MemoryStore::new());
    let vault = Vault::new(raw.clone(), fast_config());
    (raw, vault)
}

fn missing_argon2() -> Result<Primitives, VaultError> {
    Err(VaultError::PrimitivesUnavailable(
        "argon2id not available".into(),
    ))
}

/// Byte store whose writes can be switched off.
#[derive(Default)]
struct ReadOnlySwitch {
    inner: MemoryStore,
    read_only: AtomicBool,
}

impl ByteStore for ReadOnlySwitch {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("store is read-only".into()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("store is read-only".into()));
        }
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.keys()
    }
}

#[tokio::test]
async fn setup_lock_unlock_keeps_data_readable() {
    let (_raw, vault) = memory_vault();
    vault.initialize().await;
    vault.setup_passphrase(PASSPHRASE).await.unwrap();

    let messages = ["", "mood: 7/10", "ünïcødé ✓ 日本語"];
    let sealed: Vec<String> = messages
        .iter()
        .map(|m| vault.encryptor().encrypt_string(*m).unwrap().to_json().unwrap())
        .collect();

    vault.lock().await;
    assert!(!vault.is_unlocked());
    vault.unlock(PASSPHRASE).await.unwrap();
    assert!(vault.is_unlocked());

    for (message, envelope) in messages.iter().zip(&sealed) {
        assert_eq!(vault.encryptor().decrypt_string(envelope), *message);
    }
}

#[tokio::test]
async fn wrong_passphrase_leaves_vault_locked() {
    let (_raw, vault) = memory_vault();
    vault.setup_passphrase(PASSPHRASE).await.unwrap();
    vault.lock().await;

    let err = vault.unlock("correct horse battery stapler").await.unwrap_err();
    assert!(matches!(err, VaultError::IncorrectPassphrase));
    assert_eq!(err.to_string(), VaultError::VerificationFailed.to_string());
    assert_eq!(vault.state(), VaultState::Locked);
    assert!(matches!(
        vault.encryptor().encrypt_string("x"),
        Err(VaultError::KeyNotSet)
    ));
}

#[tokio::test]
async fn corrupt_verification_hash_is_verification_failure() {
    let (raw, vault) = memory_vault();
    vault.setup_passphrase(PASSPHRASE).await.unwrap();
    vault.lock().await;

    let stored = raw.get("pt:vault:metadata").unwrap().unwrap();
    let mut metadata: VaultMetadata = serde_json::from_str(&stored).unwrap();
    metadata.verification.hash = "not-a-phc-string".into();
    raw.set("pt:vault:metadata", &serde_json::to_string(&metadata).unwrap())
        .unwrap();

    let err = vault.unlock(PASSPHRASE).await.unwrap_err();
    assert!(matches!(err, VaultError::VerificationFailed));
    assert!(err.is_credential_failure());
    assert_eq!(vault.state(), VaultState::Locked);
}

#[tokio::test]
async fn legacy_entry_is_migrated_on_unlock() {
    let (raw, vault) = memory_vault();
    vault.setup_passphrase(PASSPHRASE).await.unwrap();
    vault.lock().await;

    raw.set("pt:legacy", "hello").unwrap();
    let report = vault.unlock(PASSPHRASE).await.unwrap();
    assert_eq!(report.migrated, 1);
    assert_eq!(report.skipped, 0);

    let value = raw.get("pt:legacy").unwrap().unwrap();
    assert!(is_envelope(&value));
    assert_eq!(vault.encryptor().decrypt_string(&value), "hello");

    let stored: VaultMetadata =
        serde_json::from_str(&raw.get("pt:vault:metadata").unwrap().unwrap()).unwrap();
    assert!(stored.migrations.legacy_completed_at.is_some());
}

#[tokio::test]
async fn repeated_sweeps_converge() {
    let (raw, vault) = memory_vault();
    raw.set("pt:a", "alpha").unwrap();
    raw.set("pt:b", "{\"steps\":1200}").unwrap();

    let first = vault.setup_passphrase(PASSPHRASE).await.unwrap();
    assert_eq!(first.migrated, 2);
    let snapshot = raw.keys().unwrap();
    let values: Vec<_> = snapshot.iter().map(|k| raw.get(k).unwrap()).collect();

    let second = vault.run_migration().await.unwrap();
    assert_eq!(second.migrated, 0);
    assert_eq!(second.already_encrypted, 2);
    let after: Vec<_> = snapshot.iter().map(|k| raw.get(k).unwrap()).collect();
    assert_eq!(values, after);
}

#[tokio::test]
async fn migration_requires_unlocked_vault() {
    let (_raw, vault) = memory_vault();
    vault.setup_passphrase(PASSPHRASE).await.unwrap();
    vault.lock().await;
    assert!(matches!(
        vault.run_migration().await,
        Err(VaultError::KeyNotSet)
    ));
}

#[tokio::test]
async fn clear_all_then_initialize_is_uninitialized() {
    let (raw, vault) = memory_vault();
    vault.setup_passphrase(PASSPHRASE).await.unwrap();
    vault.clear_all().await.unwrap();

    assert!(raw.get("pt:vault:metadata").unwrap().is_none());
    let status = vault.initialize().await;
    assert_eq!(status.state, VaultState::Uninitialized);
    assert!(status.metadata.is_none());

    vault.setup_passphrase("a different passphrase").await.unwrap();
    assert!(vault.is_unlocked());
}

#[tokio::test]
async fn primitive_failure_is_terminal_error() {
    let raw: Arc<dyn ByteStore> = Arc::new(MemoryStore::new());
    let vault = Vault::with_provider(
        raw,
        fast_config(),
        PrimitiveProvider::with_loader(missing_argon2),
    );

    let status = vault.initialize().await;
    assert_eq!(status.state, VaultState::Error);
    assert!(!status.primitives_ready);

    assert!(matches!(
        vault.setup_passphrase(PASSPHRASE).await,
        Err(VaultError::PrimitivesUnavailable(_))
    ));
    assert!(matches!(
        vault.unlock(PASSPHRASE).await,
        Err(VaultError::PrimitivesUnavailable(_))
    ));
    vault.lock().await;
    assert_eq!(vault.state(), VaultState::Error);
    assert!(!vault.hook_slot().is_installed());
}

#[tokio::test]
async fn setup_fails_when_metadata_cannot_be_written() {
    let raw = Arc::new(ReadOnlySwitch::default());
    raw.read_only.store(true, Ordering::SeqCst);
    let vault = Vault::new(raw.clone(), fast_config());

    assert!(matches!(
        vault.setup_passphrase(PASSPHRASE).await,
        Err(VaultError::PersistFailure(_))
    ));
    assert!(!vault.is_unlocked());
    assert!(!vault.hook_slot().is_installed());
    assert_eq!(vault.state(), VaultState::Uninitialized);
}

#[tokio::test]
async fn clear_all_failure_leaves_vault_locked() {
    let raw = Arc::new(ReadOnlySwitch::default());
    let vault = Vault::new(raw.clone(), fast_config());
    vault.setup_passphrase(PASSPHRASE).await.unwrap();

    raw.read_only.store(true, Ordering::SeqCst);
    assert!(matches!(
        vault.clear_all().await,
        Err(VaultError::Storage(_))
    ));
    assert_eq!(vault.state(), VaultState::Locked);
    assert!(raw.get("pt:vault:metadata").unwrap().is_some());
}

#[tokio::test]
async fn unlock_timeout_leaves_vault_locked() {
    let raw = Arc::new(MemoryStore::new());
    let patient = Vault::new(raw.clone(), slow_config(None));
    patient.setup_passphrase(PASSPHRASE).await.unwrap();
    patient.lock().await;

    let impatient = Vault::new(raw.clone(), slow_config(Some(1)));
    assert_eq!(impatient.initialize().await.state, VaultState::Locked);
    assert!(matches!(
        impatient.unlock(PASSPHRASE).await,
        Err(VaultError::Timeout)
    ));
    assert_eq!(impatient.state(), VaultState::Locked);
    assert!(!impatient.hook_slot().is_installed());
    assert!(matches!(
        impatient.encryptor().encrypt_string("x"),
        Err(VaultError::KeyNotSet)
    ));

    patient.unlock(PASSPHRASE).await.unwrap();
    assert!(patient.is_unlocked());
    assert!(patient.hook_slot().is_installed());
}

#[tokio::test]
async fn setup_timeout_writes_no_metadata() {
    let raw = Arc::new(MemoryStore::new());
    let vault = Vault::new(raw.clone(), slow_config(Some(1)));

    assert!(matches!(
        vault.setup_passphrase(PASSPHRASE).await,
        Err(VaultError::Timeout)
    ));
    assert!(raw.get("pt:vault:metadata").unwrap().is_none());
    assert_eq!(vault.state(), VaultState::Uninitialized);
    assert!(!vault.hook_slot().is_installed());
}

#[tokio::test]
async fn concurrent_unlocks_are_serialized() {
    let (_raw, vault) = memory_vault();
    vault.setup_passphrase(PASSPHRASE).await.unwrap();
    vault.lock().await;

    let vault = Arc::new(vault);
    let good = {
        let vault = Arc::clone(&vault);
        tokio::spawn(async move { vault.unlock(PASSPHRASE).await })
    };
    let bad = {
        let vault = Arc::clone(&vault);
        tokio::spawn(async move { vault.unlock("wrong passphrase entirely").await })
    };
    let good = good.await.unwrap();
    let bad = bad.await.unwrap();

    assert!(good.is_ok());
    assert!(bad.is_err());
    // Whichever ran last decides the state; it is never half-unlocked.
    match vault.state() {
        VaultState::Unlocked => assert!(vault.hook_slot().is_installed()),
        VaultState::Locked => assert!(!vault.hook_slot().is_installed()),
        other => panic!("unexpected state {other:?}"),
    }
}

#[tokio::test]
async fn file_store_vault_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    {
        let store = Arc::new(FileStore::open(&path).unwrap());
        let vault = Vault::new(store.clone(), fast_config());
        vault.setup_passphrase(PASSPHRASE).await.unwrap();
        let gated = GatedStorage::new(vault.hook_slot(), store);
        gated.set_item("pt:journal", "{\"entries\":[\"ran 5k\"]}").unwrap();
    }

    let store = Arc::new(FileStore::open(&path).unwrap());
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains("ran 5k"));

    let vault = Vault::new(store.clone(), fast_config());
    assert_eq!(vault.initialize().await.state, VaultState::Locked);

    let gated = GatedStorage::new(vault.hook_slot(), store);
    let mut state = serde_json::json!({ "entries": ["unsaved"] });
    assert_eq!(
        gated.rehydrate("pt:journal", &mut state).unwrap(),
        Rehydration::Locked
    );
    assert_eq!(state["entries"][0], "unsaved");

    vault.unlock(PASSPHRASE).await.unwrap();
    assert_eq!(
        gated.rehydrate("pt:journal", &mut state).unwrap(),
        Rehydration::Restored
    );
    assert_eq!(state["entries"][0], "ran 5k");
}
