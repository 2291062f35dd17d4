//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `serve`    | `Serve`          |
//! | `commands` | `Commands`       |

pub mod commands;
pub mod serve;

pub use commands::cmd_commands;
pub use serve::cmd_serve;

use std::path::Path;

use anyhow::{Context, Result};
use jarvis::config::{PluginOptions, PortSetting};

/// Layer `jarvis.toml` (or `--config`) under the CLI/environment overrides.
pub fn load_options(
    project_dir: &Path,
    config_path: Option<&Path>,
    port: Option<&str>,
    host: Option<&str>,
) -> Result<PluginOptions> {
    let file = match config_path {
        Some(path) => PluginOptions::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PluginOptions::load_from_project(project_dir),
    };

    let overrides = PluginOptions {
        port: port.map(PortSetting::from),
        host: host.map(str::to_string),
        commands: None,
    };

    Ok(file.merge(overrides))
}
