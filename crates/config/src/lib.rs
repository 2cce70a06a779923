//! Configuration loading, validation and env substitution.
//!
//! Config files: `tally.toml` or `tally.json`
//! Searched in `./` then `~/.config/tally/`.
//!
//! Supports `${ENV_VAR}` substitution in the raw file text.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::ConfigError,
    loader::{config_dir, data_dir, discover_and_load, load_config, resolve_store_path},
    schema::{KdfPreset, MIN_PASSPHRASE_FLOOR, StorageConfig, TallyConfig, VaultConfig},
};
