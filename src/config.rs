//! Plugin options and the resolved runtime configuration.
//!
//! Options are layered file → environment → CLI. The file is an optional
//! `jarvis.toml` in the project directory:
//!
//! ```toml
//! port = 1337
//! host = "localhost"
//!
//! [[commands]]
//! label = "lint"
//! script = "eslint src --watch"
//! ```
//!
//! Nothing in here is fatal. A bad port falls back to [`DEFAULT_PORT`] with a
//! warning, and the explicit commands are appended to whatever the project's
//! `package.json` declares under `scripts`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ConfigError;
use crate::project::{PackageManifest, parse_scripts};

/// Port used when none is given or the given one is unusable.
pub const DEFAULT_PORT: u16 = 1337;

/// Host used when the options don't name one.
pub const DEFAULT_HOST: &str = "localhost";

/// File name looked up in the project directory.
pub const CONFIG_FILE_NAME: &str = "jarvis.toml";

/// A labelled shell command run alongside the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub label: String,
    pub script: String,
}

impl CommandSpec {
    pub fn new(label: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            script: script.into(),
        }
    }
}

/// Raw port value as written by the user, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortSetting {
    Number(i64),
    Float(f64),
    Text(String),
    Other(serde_json::Value),
}

impl std::fmt::Display for PortSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortSetting::Number(n) => write!(f, "{}", n),
            PortSetting::Float(x) => write!(f, "{}", x),
            PortSetting::Text(s) => write!(f, "{}", s),
            PortSetting::Other(v) => write!(f, "{}", v),
        }
    }
}

impl From<u16> for PortSetting {
    fn from(port: u16) -> Self {
        PortSetting::Number(i64::from(port))
    }
}

impl From<&str> for PortSetting {
    fn from(port: &str) -> Self {
        PortSetting::Text(port.to_string())
    }
}

/// Inbound plugin options. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginOptions {
    #[serde(default)]
    pub port: Option<PortSetting>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub commands: Option<Vec<CommandSpec>>,
}

impl PluginOptions {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load options from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `jarvis.toml` from `project_dir` if it exists.
    ///
    /// A missing file yields empty options; an unreadable or malformed one is
    /// logged and also yields empty options.
    pub fn load_from_project(project_dir: &Path) -> Self {
        let path = project_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(options) => options,
            Err(e) => {
                warn!("[jarvis] ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Layer `overrides` on top of `self`. Fields set in `overrides` win.
    pub fn merge(self, overrides: PluginOptions) -> PluginOptions {
        PluginOptions {
            port: overrides.port.or(self.port),
            host: overrides.host.or(self.host),
            commands: overrides.commands.or(self.commands),
        }
    }
}

/// Validate a raw port value.
///
/// An absent or empty value resolves to [`DEFAULT_PORT`]. Integers and
/// numeric strings in `0..=65535` are taken as-is; anything else is an
/// [`ConfigError::InvalidPort`].
pub fn resolve_port(raw: Option<&PortSetting>) -> Result<u16, ConfigError> {
    let invalid = |setting: &PortSetting| ConfigError::InvalidPort {
        value: setting.to_string(),
    };

    match raw {
        None | Some(PortSetting::Other(serde_json::Value::Null)) => Ok(DEFAULT_PORT),
        Some(PortSetting::Text(s)) if s.trim().is_empty() => Ok(DEFAULT_PORT),
        Some(setting @ PortSetting::Number(n)) => {
            u16::try_from(*n).map_err(|_| invalid(setting))
        }
        Some(setting @ PortSetting::Float(x)) => {
            if x.is_finite() && x.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(x) {
                Ok(*x as u16)
            } else {
                Err(invalid(setting))
            }
        }
        Some(setting @ PortSetting::Text(s)) => s.trim().parse::<u16>().map_err(|_| invalid(setting)),
        Some(setting @ PortSetting::Other(_)) => Err(invalid(setting)),
    }
}

/// Effective configuration after defaults and validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub commands: Vec<CommandSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            commands: Vec::new(),
        }
    }
}

impl Config {
    /// Resolve options against the project manifest.
    ///
    /// Commands discovered in `manifest.scripts` come first, in declaration
    /// order, followed by the explicit `options.commands`.
    pub fn resolve(options: &PluginOptions, manifest: &PackageManifest) -> Self {
        let port = match resolve_port(options.port.as_ref()) {
            Ok(port) => port,
            Err(e) => {
                warn!("[jarvis] error: {}, falling back to {}...", e, DEFAULT_PORT);
                DEFAULT_PORT
            }
        };

        let host = options
            .host
            .clone()
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let mut commands = manifest
            .scripts
            .as_ref()
            .map(parse_scripts)
            .unwrap_or_default();
        if let Some(explicit) = &options.commands {
            commands.extend(explicit.iter().cloned());
        }

        Self {
            port,
            host,
            commands,
        }
    }

    /// `host:port` as handed to the listener. IPv6 literals are bracketed.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
