//! Persisted vault metadata: salt, KDF cost, verification hash, cipher
//! parameters and migration markers.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::{
    error::VaultError,
    kdf::{self, KdfParams},
    store::{ByteStore, Namespaced, StorageError},
    traits::Cipher,
};

/// Metadata format version written on create.
pub const METADATA_VERSION: &str = "1.0.0";

/// Single metadata document describing a configured vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultMetadata {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub derivation: Derivation,
    pub verification: Verification,
    pub cipher: CipherParams,
    #[serde(default)]
    pub migrations: Migrations,
}

/// Data-encryption key derivation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Derivation {
    pub algorithm: String,
    /// Standard base64.
    pub salt: String,
    pub opslimit: u64,
    pub memlimit: u64,
    pub key_length: usize,
}

impl Derivation {
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            opslimit: self.opslimit,
            memlimit: self.memlimit,
        }
    }
}

/// Passphrase check, independent of the data-encryption key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub algorithm: String,
    /// Self-salted PHC string.
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherParams {
    pub algorithm: String,
    pub nonce_length: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Migrations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_completed_at: Option<DateTime<Utc>>,
}

impl VaultMetadata {
    /// Fresh metadata for a vault being set up now.
    pub fn new(
        salt: &[u8],
        params: KdfParams,
        verification_hash: String,
        cipher: &dyn Cipher,
    ) -> Self {
        let now = Utc::now();
        Self {
            version: METADATA_VERSION.to_string(),
            created_at: now,
            updated_at: now,
            derivation: Derivation {
                algorithm: kdf::ALGORITHM.to_string(),
                salt: kdf::encode_b64(salt),
                opslimit: params.opslimit,
                memlimit: params.memlimit,
                key_length: cipher.key_len(),
            },
            verification: Verification {
                algorithm: kdf::ALGORITHM.to_string(),
                hash: verification_hash,
            },
            cipher: CipherParams {
                algorithm: cipher.algorithm().to_string(),
                nonce_length: cipher.nonce_len(),
            },
            migrations: Migrations::default(),
        }
    }

    /// Check the invariants the vault relies on against `cipher`.
    pub fn validate(&self, cipher: &dyn Cipher) -> Result<(), VaultError> {
        let invalid = |what: &str| VaultError::Cipher(format!("invalid vault metadata: {what}"));

        if self.derivation.algorithm != kdf::ALGORITHM
            || self.verification.algorithm != kdf::ALGORITHM
        {
            return Err(invalid("unsupported kdf"));
        }
        if self.cipher.algorithm != cipher.algorithm() {
            return Err(invalid("unsupported cipher"));
        }
        if self.derivation.key_length != cipher.key_len() {
            return Err(invalid("key length does not match cipher"));
        }
        if self.cipher.nonce_length != cipher.nonce_len() {
            return Err(invalid("nonce length does not match cipher"));
        }
        if kdf::decode_b64(&self.derivation.salt)?.is_empty() {
            return Err(invalid("empty salt"));
        }
        Ok(())
    }

    /// Record a sweep that touched entries. The completion marker is only
    /// set once nothing was left behind.
    pub fn record_sweep(&mut self, outstanding: usize) {
        let now = Utc::now();
        self.updated_at = now;
        if outstanding == 0 {
            self.migrations.legacy_completed_at = Some(now);
        }
    }
}

/// Reads and writes [`VaultMetadata`] under one well-known key.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    store: Namespaced,
    key: String,
}

impl MetadataStore {
    pub fn new(store: Namespaced, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Key (relative to the namespace) holding the metadata.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load metadata. Absent, unreadable or malformed data all yield `None`.
    pub fn load(&self) -> Option<VaultMetadata> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "failed to read vault metadata");
                return None;
            },
        };

        match serde_json::from_str(&raw) {
            Ok(metadata) => Some(metadata),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "vault metadata is corrupt, treating as not set up");
                None
            },
        }
    }

    pub fn save(&self, metadata: &VaultMetadata) -> Result<(), StorageError> {
        let json = serde_json::to_string(metadata)?;
        self.store.set(&self.key, &json)
    }

    pub fn remove(&self) -> Result<(), StorageError> {
        self.store.remove(&self.key)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use {
        super::*,
        crate::{store::MemoryStore, xchacha20::XChaCha20Poly1305Cipher},
    };

    fn sample() -> VaultMetadata {
        VaultMetadata::new(
            &[7u8; 16],
            KdfParams {
                opslimit: 3,
                memlimit: 268_435_456,
            },
            "$argon2id$v=19$m=8,t=1,p=1$c2FsdHNhbHQ$aGFzaA".into(),
            &XChaCha20Poly1305Cipher,
        )
    }

    fn metadata_store() -> (Arc<MemoryStore>, MetadataStore) {
        let raw = Arc::new(MemoryStore::new());
        let store = MetadataStore::new(Namespaced::new(raw.clone(), "pt:"), "vault:metadata");
        (raw, store)
    }

    #[test]
    fn wire_format_is_camel_case() {
        let json: serde_json::Value = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["derivation"]["algorithm"], "argon2id");
        assert_eq!(json["derivation"]["keyLength"], 32);
        assert_eq!(json["derivation"]["salt"], kdf::encode_b64(&[7u8; 16]));
        assert_eq!(json["cipher"]["algorithm"], "xchacha20-poly1305");
        assert_eq!(json["cipher"]["nonceLength"], 24);
        assert!(json["createdAt"].is_string());
        assert!(json["migrations"].get("legacyCompletedAt").is_none());
    }

    #[test]
    fn save_load_remove() {
        let (raw, store) = metadata_store();
        assert!(store.load().is_none());

        let metadata = sample();
        store.save(&metadata).unwrap();
        assert!(raw.get("pt:vault:metadata").unwrap().is_some());
        assert_eq!(store.load().unwrap(), metadata);

        store.remove().unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn corrupt_metadata_reads_as_absent() {
        let (raw, store) = metadata_store();
        raw.set("pt:vault:metadata", "{\"version\":").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn validate_checks_cipher_parameters() {
        let cipher = XChaCha20Poly1305Cipher;
        let mut metadata = sample();
        metadata.validate(&cipher).unwrap();

        metadata.derivation.key_length = 16;
        assert!(metadata.validate(&cipher).is_err());
    }

    #[test]
    fn record_sweep_only_completes_without_outstanding_entries() {
        let mut metadata = sample();
        metadata.record_sweep(2);
        assert!(metadata.migrations.legacy_completed_at.is_none());

        metadata.record_sweep(0);
        assert!(metadata.migrations.legacy_completed_at.is_some());
    }
}
