use std::path::PathBuf;

/// Errors raised while reading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported config format: .{0}")]
    UnsupportedFormat(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
