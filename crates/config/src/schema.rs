//! Config schema types (vault, storage).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Minimum passphrase length the vault will accept, whatever the config says.
pub const MIN_PASSPHRASE_FLOOR: usize = 12;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    pub vault: VaultConfig,
    pub storage: StorageConfig,
}

impl TallyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vault.validate()
    }
}

/// Argon2id cost preset, named after the libsodium constants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfPreset {
    Interactive,
    #[default]
    Moderate,
    Sensitive,
}

impl KdfPreset {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Moderate => "moderate",
            Self::Sensitive => "sensitive",
        }
    }
}

impl std::fmt::Display for KdfPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vault behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Prefix of every vault-managed key in the byte store.
    pub namespace: String,
    /// Metadata key, relative to `namespace`.
    pub metadata_key: String,
    pub min_passphrase_length: usize,
    pub kdf_preset: KdfPreset,
    /// Overrides the preset's iteration count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opslimit: Option<u64>,
    /// Overrides the preset's memory cost, in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memlimit: Option<u64>,
    /// Abort key derivation after this many milliseconds. Unbounded when
    /// unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation_timeout_ms: Option<u64>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            namespace: "pt:".into(),
            metadata_key: "vault:metadata".into(),
            min_passphrase_length: MIN_PASSPHRASE_FLOOR,
            kdf_preset: KdfPreset::default(),
            opslimit: None,
            memlimit: None,
            derivation_timeout_ms: None,
        }
    }
}

impl VaultConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::Invalid("vault.namespace must not be empty".into()));
        }
        if self.metadata_key.is_empty() {
            return Err(ConfigError::Invalid(
                "vault.metadata_key must not be empty".into(),
            ));
        }
        if self.min_passphrase_length < MIN_PASSPHRASE_FLOOR {
            return Err(ConfigError::Invalid(format!(
                "vault.min_passphrase_length must be at least {MIN_PASSPHRASE_FLOOR}"
            )));
        }
        if self.opslimit == Some(0) {
            return Err(ConfigError::Invalid("vault.opslimit must be positive".into()));
        }
        if let Some(memlimit) = self.memlimit {
            if memlimit < 8 * 1024 {
                return Err(ConfigError::Invalid(
                    "vault.memlimit must be at least 8192 bytes".into(),
                ));
            }
            if !memlimit.is_multiple_of(1024) {
                return Err(ConfigError::Invalid(format!(
                    "vault.memlimit must be a multiple of 1024 bytes, got {memlimit}"
                )));
            }
        }
        if self.derivation_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "vault.derivation_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// File-backed byte store used by the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Store file. Defaults to `store.json` in the user data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}
