//! Metric name and label definitions.
//!
//! Centralized so the set of exported metrics is documented in one place.

/// Vault lifecycle and migration metrics
pub mod vault {
    /// Successful passphrase setups
    pub const SETUPS_TOTAL: &str = "tally_vault_setups_total";
    /// Unlock attempts, successful or not
    pub const UNLOCK_ATTEMPTS_TOTAL: &str = "tally_vault_unlock_attempts_total";
    /// Unlock attempts rejected (wrong passphrase, verification error, timeout)
    pub const UNLOCK_FAILURES_TOTAL: &str = "tally_vault_unlock_failures_total";
    /// Transitions from unlocked to locked
    pub const LOCKS_TOTAL: &str = "tally_vault_locks_total";
    /// 1 while a key is held, 0 otherwise
    pub const UNLOCKED: &str = "tally_vault_unlocked";
    /// Argon2id derivation (and verification) wall time
    pub const KDF_DURATION_SECONDS: &str = "tally_vault_kdf_duration_seconds";
    /// Legacy entries re-encrypted by the sweep
    pub const MIGRATED_ENTRIES_TOTAL: &str = "tally_vault_migrated_entries_total";
    /// Legacy entries the sweep could not migrate
    pub const SKIPPED_ENTRIES_TOTAL: &str = "tally_vault_skipped_entries_total";
}

/// Common label keys
pub mod labels {
    /// KDF cost preset (`interactive`, `moderate`, `sensitive`)
    pub const PRESET: &str = "preset";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_metric_names_share_prefix() {
        for name in [
            vault::SETUPS_TOTAL,
            vault::UNLOCK_ATTEMPTS_TOTAL,
            vault::UNLOCK_FAILURES_TOTAL,
            vault::LOCKS_TOTAL,
            vault::UNLOCKED,
            vault::KDF_DURATION_SECONDS,
            vault::MIGRATED_ENTRIES_TOTAL,
            vault::SKIPPED_ENTRIES_TOTAL,
        ] {
            assert!(name.starts_with("tally_vault_"), "{name}");
        }
    }
}
