use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, error::ConfigError, schema::TallyConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["tally.toml", "tally.json"];

/// Load and validate config from the given path.
pub fn load_config(path: &Path) -> Result<TallyConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    let config = parse_config(&raw, path)?;
    config.validate()?;
    Ok(config)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./tally.{toml,json}` (project-local)
/// 2. `~/.config/tally/tally.{toml,json}` (user-global)
///
/// Returns `TallyConfig::default()` if no usable config file is found.
pub fn discover_and_load() -> TallyConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    TallyConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "tally")
}

/// Returns the user-global config directory (`~/.config/tally/`).
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().to_path_buf())
}

/// Returns the user data directory (`~/.local/share/tally/`).
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.data_dir().to_path_buf())
}

/// Store file from config, falling back to `store.json` in [`data_dir`].
pub fn resolve_store_path(config: &TallyConfig) -> PathBuf {
    config.storage.path.clone().unwrap_or_else(|| {
        data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("store.json")
    })
}

fn parse_config(raw: &str, path: &Path) -> Result<TallyConfig, ConfigError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}
