//! Re-encrypt legacy plaintext entries in place.
//!
//! Runs after every successful setup or unlock. Entries that already have
//! envelope shape are left alone, so repeated sweeps converge. A failure on
//! one entry is counted and logged but never stops the sweep; the entry is
//! retried on the next unlock.

use crate::{
    envelope::is_envelope,
    error::VaultError,
    facade::Encryptor,
    store::{ByteStore, Namespaced},
};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    /// Entries encrypted and written back.
    pub migrated: usize,
    /// Entries that could not be read, encrypted or written.
    pub skipped: usize,
    /// Entries already in envelope form.
    pub already_encrypted: usize,
}

impl SweepReport {
    /// Whether the sweep touched (or tried to touch) any entry.
    pub fn changed(&self) -> bool {
        self.migrated > 0 || self.skipped > 0
    }
}

/// Encrypt every plaintext entry in `store` except `metadata_key`.
///
/// Fails only if the store cannot be enumerated.
pub fn sweep_legacy(
    store: &Namespaced,
    metadata_key: &str,
    encryptor: &Encryptor,
) -> Result<SweepReport, VaultError> {
    let mut report = SweepReport::default();

    for key in store.keys()? {
        if key == metadata_key {
            continue;
        }
        match migrate_entry(store, &key, encryptor) {
            Ok(true) => report.migrated += 1,
            Ok(false) => report.already_encrypted += 1,
            Err(_e) => {
                report.skipped += 1;
                #[cfg(feature = "tracing")]
                tracing::warn!(key = %key, error = %_e, "skipped legacy entry");
            },
        }
    }

    #[cfg(feature = "metrics")]
    {
        use tally_metrics::{counter, vault as vault_metrics};
        counter!(vault_metrics::MIGRATED_ENTRIES_TOTAL).increment(report.migrated as u64);
        counter!(vault_metrics::SKIPPED_ENTRIES_TOTAL).increment(report.skipped as u64);
    }

    if report.changed() {
        #[cfg(feature = "tracing")]
        tracing::info!(
            migrated = report.migrated,
            skipped = report.skipped,
            "legacy sweep finished"
        );
    }

    Ok(report)
}

/// Returns `Ok(true)` if the entry was rewritten, `Ok(false)` if it was
/// already encrypted or vanished.
fn migrate_entry(store: &Namespaced, key: &str, encryptor: &Encryptor) -> Result<bool, VaultError> {
    let Some(raw) = store.get(key)? else {
        return Ok(false);
    };
    if is_envelope(&raw) {
        return Ok(false);
    }
    let sealed = encryptor.encrypt_string(raw.as_str())?.to_json()?;
    store.set(key, &sealed)?;
    Ok(true)
}
