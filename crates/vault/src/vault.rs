//! Vault state machine: setup, unlock, lock, clear and status publication.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    parking_lot::{Mutex, RwLock},
    tally_config::VaultConfig,
    zeroize::Zeroizing,
};

use crate::{
    error::VaultError,
    facade::{Encryptor, KeyRing},
    hooks::HookSlot,
    kdf,
    metadata::{MetadataStore, VaultMetadata},
    migration::{self, SweepReport},
    primitives::{PrimitiveProvider, Primitives},
    store::{ByteStore, Namespaced},
};

/// Lifecycle state of a [`Vault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultState {
    /// No metadata persisted; setup required.
    Uninitialized,
    /// Metadata exists but no key is held.
    Locked,
    /// A passphrase is being verified.
    Unlocking,
    /// The key is held in memory.
    Unlocked,
    /// Primitives failed to initialize. Terminal for this process.
    Error,
}

/// Full observable status, handed to subscribers on every change.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStatusSnapshot {
    pub state: VaultState,
    pub metadata: Option<VaultMetadata>,
    pub primitives_ready: bool,
}

/// Handle returned by [`Vault::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&VaultStatusSnapshot) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Inner {
    state: VaultState,
    metadata: Option<VaultMetadata>,
}

/// Passphrase-protected encryption vault over a namespaced byte store.
///
/// Setup, unlock, lock and clear are serialized against each other; the
/// encryption façade and status queries are lock-free with respect to them.
pub struct Vault {
    config: VaultConfig,
    provider: PrimitiveProvider,
    store: Namespaced,
    metadata_store: MetadataStore,
    key: KeyRing,
    encryptor: Encryptor,
    hooks: HookSlot,
    inner: RwLock<Inner>,
    op_lock: tokio::sync::Mutex<()>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("state", &self.state())
            .field("namespace", &self.store.prefix())
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Create a vault over `store` with the default primitive loader.
    pub fn new(store: Arc<dyn ByteStore>, config: VaultConfig) -> Self {
        Self::with_provider(store, config, PrimitiveProvider::default())
    }

    /// Create a vault sharing an existing primitive provider.
    pub fn with_provider(
        store: Arc<dyn ByteStore>,
        config: VaultConfig,
        provider: PrimitiveProvider,
    ) -> Self {
        let store = Namespaced::new(store, config.namespace.clone());
        let metadata_store = MetadataStore::new(store.clone(), config.metadata_key.clone());
        let key = KeyRing::default();
        let encryptor = Encryptor::new(provider.clone(), key.clone());
        Self {
            config,
            provider,
            store,
            metadata_store,
            key,
            encryptor,
            hooks: HookSlot::new(),
            inner: RwLock::new(Inner {
                state: VaultState::Uninitialized,
                metadata: None,
            }),
            op_lock: tokio::sync::Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    // ── Status ──────────────────────────────────────────────────────────

    pub fn state(&self) -> VaultState {
        self.inner.read().state
    }

    pub fn is_unlocked(&self) -> bool {
        self.state() == VaultState::Unlocked && self.key.is_set()
    }

    /// Last loaded or written metadata.
    pub fn metadata(&self) -> Option<VaultMetadata> {
        self.inner.read().metadata.clone()
    }

    pub fn status(&self) -> VaultStatusSnapshot {
        let inner = self.inner.read();
        VaultStatusSnapshot {
            state: inner.state,
            metadata: inner.metadata.clone(),
            primitives_ready: self.provider.ready_sync().is_some(),
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Capability to hand to storage code that should encrypt through this
    /// vault. Empty while locked.
    pub fn hook_slot(&self) -> HookSlot {
        self.hooks.clone()
    }

    /// Direct encryption façade bound to this vault's key.
    pub fn encryptor(&self) -> &Encryptor {
        &self.encryptor
    }

    /// Register `callback` for every status change.
    pub fn subscribe(
        &self,
        callback: impl Fn(&VaultStatusSnapshot) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    fn update(&self, f: impl FnOnce(&mut Inner)) {
        let changed = {
            let mut inner = self.inner.write();
            let before = inner.clone();
            f(&mut inner);
            *inner != before
        };
        if changed {
            self.notify();
        }
    }

    fn notify(&self) {
        let snapshot = self.status();
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in subscribers {
            callback(&snapshot);
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Load primitives and metadata and settle into the matching state.
    pub async fn initialize(&self) -> VaultStatusSnapshot {
        let _guard = self.op_lock.lock().await;
        if self.primitives().await.is_err() {
            return self.status();
        }

        let metadata = self.metadata_store.load();
        let state = match (&metadata, self.key.is_set()) {
            (Some(_), true) => VaultState::Unlocked,
            (Some(_), false) => VaultState::Locked,
            (None, _) => VaultState::Uninitialized,
        };
        if state != VaultState::Unlocked {
            self.deactivate();
        }

        #[cfg(feature = "tracing")]
        tracing::info!(state = ?state, "vault initialized");

        self.update(|inner| {
            inner.state = state;
            inner.metadata = metadata;
        });
        self.status()
    }

    /// Create a new vault protected by `passphrase` and unlock it.
    ///
    /// Fails with [`VaultError::AlreadyInitialized`] if metadata exists.
    pub async fn setup_passphrase(&self, passphrase: &str) -> Result<SweepReport, VaultError> {
        let min = self.config.min_passphrase_length;
        if passphrase.chars().count() < min {
            return Err(VaultError::WeakPassphrase { min });
        }

        let _guard = self.op_lock.lock().await;
        let primitives = self.primitives().await?;
        if self.metadata_store.load().is_some() {
            return Err(VaultError::AlreadyInitialized);
        }

        let salt_len = primitives.salt_len();
        let salt = primitives.random_bytes(salt_len);
        let verification_salt = primitives.random_bytes(salt_len);
        let params = primitives.kdf_params(
            self.config.kdf_preset,
            self.config.opslimit,
            self.config.memlimit,
        );
        let key_len = primitives.cipher().key_len();

        let secret = Zeroizing::new(passphrase.as_bytes().to_vec());
        let derivation_salt = salt.clone();
        let (key, hash) = self
            .run_kdf(move || {
                let key = kdf::derive_key(&secret, &derivation_salt, &params, key_len)?;
                let hash = kdf::hash_passphrase(&secret, &verification_salt, &params)?;
                Ok((key, hash))
            })
            .await?;

        let metadata = VaultMetadata::new(&salt, params, hash, primitives.cipher());
        if let Err(e) = self.metadata_store.save(&metadata) {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "failed to persist vault metadata during setup");
            return Err(VaultError::PersistFailure(e.to_string()));
        }

        self.activate(key, metadata);

        #[cfg(feature = "metrics")]
        tally_metrics::counter!(
            tally_metrics::vault::SETUPS_TOTAL,
            tally_metrics::labels::PRESET => self.config.kdf_preset.as_str()
        )
        .increment(1);
        #[cfg(feature = "tracing")]
        tracing::info!(
            preset = %self.config.kdf_preset,
            opslimit = params.opslimit,
            memlimit = params.memlimit,
            "vault set up"
        );

        Ok(self.sweep_after_unlock())
    }

    /// Verify `passphrase`, re-derive the key and unlock.
    ///
    /// Unlocking an unlocked vault re-verifies; a failure leaves it locked.
    pub async fn unlock(&self, passphrase: &str) -> Result<SweepReport, VaultError> {
        let _guard = self.op_lock.lock().await;
        let primitives = self.primitives().await?;
        let metadata = self
            .metadata_store
            .load()
            .ok_or(VaultError::NotConfigured)?;

        #[cfg(feature = "metrics")]
        tally_metrics::counter!(tally_metrics::vault::UNLOCK_ATTEMPTS_TOTAL).increment(1);

        self.deactivate();
        self.update(|inner| {
            inner.state = VaultState::Unlocking;
            inner.metadata = Some(metadata.clone());
        });

        let result = match metadata.validate(primitives.cipher()) {
            Ok(()) => {
                let secret = Zeroizing::new(passphrase.as_bytes().to_vec());
                let hash = metadata.verification.hash.clone();
                let derivation = metadata.derivation.clone();
                self.run_kdf(move || {
                    if !kdf::verify_passphrase(&secret, &hash)? {
                        return Err(VaultError::IncorrectPassphrase);
                    }
                    let salt =
                        kdf::decode_b64(&derivation.salt).map_err(|_| VaultError::VerificationFailed)?;
                    kdf::derive_key(
                        &secret,
                        &salt,
                        &derivation.kdf_params(),
                        derivation.key_length,
                    )
                    .map_err(|_| VaultError::VerificationFailed)
                })
                .await
            },
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "vault metadata rejected");
                Err(VaultError::VerificationFailed)
            },
        };

        match result {
            Ok(key) => {
                self.activate(key, metadata);
                #[cfg(feature = "tracing")]
                tracing::info!("vault unlocked");
                Ok(self.sweep_after_unlock())
            },
            Err(e) => {
                self.update(|inner| inner.state = VaultState::Locked);

                #[cfg(feature = "metrics")]
                tally_metrics::counter!(tally_metrics::vault::UNLOCK_FAILURES_TOTAL).increment(1);
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "vault unlock failed");

                Err(e)
            },
        }
    }

    /// Zero the key, revoke hooks and return to `locked`.
    ///
    /// No state change when uninitialized or in error.
    pub async fn lock(&self) {
        let _guard = self.op_lock.lock().await;
        self.deactivate();

        let was_open = matches!(self.state(), VaultState::Unlocked | VaultState::Unlocking);
        self.update(|inner| {
            if matches!(inner.state, VaultState::Unlocked | VaultState::Unlocking) {
                inner.state = VaultState::Locked;
            }
        });

        if was_open {
            #[cfg(feature = "metrics")]
            tally_metrics::counter!(tally_metrics::vault::LOCKS_TOTAL).increment(1);
            #[cfg(feature = "tracing")]
            tracing::info!("vault locked");
        }
    }

    /// Lock and delete persisted metadata, returning to `uninitialized`.
    ///
    /// Encrypted entries are left in place; without the old passphrase they
    /// can no longer be opened.
    pub async fn clear_all(&self) -> Result<(), VaultError> {
        let _guard = self.op_lock.lock().await;
        self.deactivate();

        if let Err(e) = self.metadata_store.remove() {
            self.update(|inner| {
                if matches!(inner.state, VaultState::Unlocked | VaultState::Unlocking) {
                    inner.state = VaultState::Locked;
                }
            });
            return Err(e.into());
        }

        self.update(|inner| {
            if inner.state != VaultState::Error {
                inner.state = VaultState::Uninitialized;
            }
            inner.metadata = None;
        });

        #[cfg(feature = "tracing")]
        tracing::info!("vault cleared");
        Ok(())
    }

    /// Run the legacy sweep now. Requires an unlocked vault.
    pub async fn run_migration(&self) -> Result<SweepReport, VaultError> {
        let _guard = self.op_lock.lock().await;
        if !self.is_unlocked() {
            return Err(VaultError::KeyNotSet);
        }
        self.sweep()
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// Wait for primitives; a failure moves the vault to `error` for good.
    async fn primitives(&self) -> Result<Arc<Primitives>, VaultError> {
        if self.state() == VaultState::Error {
            return Err(VaultError::PrimitivesUnavailable(
                "vault is in error state".into(),
            ));
        }
        match self.provider.ready().await {
            Ok(primitives) => Ok(primitives),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, "cryptographic primitives failed to initialize");
                self.deactivate();
                self.update(|inner| inner.state = VaultState::Error);
                Err(e)
            },
        }
    }

    /// Run Argon2id work on the blocking pool, bounded by the configured
    /// timeout if any.
    async fn run_kdf<T, F>(&self, work: F) -> Result<T, VaultError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, VaultError> + Send + 'static,
    {
        let started = Instant::now();
        let task = tokio::task::spawn_blocking(work);
        let joined = match self.config.derivation_timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), task)
                .await
                .map_err(|_| VaultError::Timeout)?,
            None => task.await,
        };

        #[cfg(feature = "metrics")]
        tally_metrics::histogram!(tally_metrics::vault::KDF_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        #[cfg(feature = "tracing")]
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "key derivation finished"
        );
        #[cfg(not(any(feature = "metrics", feature = "tracing")))]
        let _ = started;

        joined.map_err(|e| VaultError::Cipher(format!("key derivation task failed: {e}")))?
    }

    fn activate(&self, key: Zeroizing<Vec<u8>>, metadata: VaultMetadata) {
        self.key.install(key);
        self.hooks.install(Arc::new(self.encryptor.clone()));
        self.update(|inner| {
            inner.state = VaultState::Unlocked;
            inner.metadata = Some(metadata);
        });

        #[cfg(feature = "metrics")]
        tally_metrics::gauge!(tally_metrics::vault::UNLOCKED).set(1.0);
    }

    fn deactivate(&self) {
        self.hooks.revoke();
        self.key.clear();

        #[cfg(feature = "metrics")]
        tally_metrics::gauge!(tally_metrics::vault::UNLOCKED).set(0.0);
    }

    /// Sweep once after setup or unlock. Failures are logged; the vault
    /// stays unlocked and the sweep is retried on the next unlock.
    fn sweep_after_unlock(&self) -> SweepReport {
        match self.sweep() {
            Ok(report) => report,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "legacy sweep failed");
                SweepReport::default()
            },
        }
    }

    fn sweep(&self) -> Result<SweepReport, VaultError> {
        let report =
            migration::sweep_legacy(&self.store, self.metadata_store.key(), &self.encryptor)?;
        if report.changed()
            && let Some(mut metadata) = self.metadata()
        {
            metadata.record_sweep(report.skipped);
            self.metadata_store.save(&metadata)?;
            self.update(|inner| inner.metadata = Some(metadata));
        }
        Ok(report)
    }
}
