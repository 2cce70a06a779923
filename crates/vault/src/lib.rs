//! Passphrase-protected encryption-at-rest for locally stored entries.
//!
//! A data-encryption key is derived from the user's passphrase with
//! Argon2id and held only while the vault is unlocked. Values are sealed
//! with XChaCha20-Poly1305 into a tagged JSON [`Envelope`]. On every unlock
//! a sweep re-encrypts legacy plaintext entries in place.
//!
//! Storage code receives a [`HookSlot`] (or a [`GatedStorage`]) instead of
//! a vault reference and fails closed while the vault is locked.

pub mod envelope;
pub mod error;
pub mod facade;
pub mod hooks;
pub mod kdf;
pub mod metadata;
pub mod migration;
pub mod persist;
pub mod primitives;
pub mod store;
pub mod traits;
pub mod vault;
pub mod xchacha20;

pub use {
    envelope::{BytesEnvelope, Decrypted, Envelope, Plaintext, is_envelope},
    error::VaultError,
    facade::Encryptor,
    hooks::{EncryptionHooks, HookSlot},
    metadata::VaultMetadata,
    migration::SweepReport,
    persist::{GatedStorage, Rehydration},
    primitives::{PrimitiveProvider, Primitives},
    store::{ByteStore, FileStore, MemoryStore, Namespaced, StorageError},
    tally_config::{KdfPreset, VaultConfig},
    traits::Cipher,
    vault::{SubscriptionId, Vault, VaultState, VaultStatusSnapshot},
    xchacha20::XChaCha20Poly1305Cipher,
};
