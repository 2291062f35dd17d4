//! Typed error hierarchy for Jarvis.
//!
//! Two enums cover the two places where something can go wrong:
//! - `ConfigError`: options, `package.json` and `jarvis.toml` problems
//! - `ChannelError`: the dashboard socket server failing to come up
//!
//! Neither is ever fatal to a build. Callers log them and fall back to
//! defaults.

use thiserror::Error;

/// Errors from resolving configuration and project metadata.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the specified port ({value}) is not valid")]
    InvalidPort { value: String },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    ManifestParse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Errors from starting the broadcast channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to bind dashboard server to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read bound address: {0}")]
    LocalAddr(#[source] std::io::Error),
}
