//! Command list view (`jarvis commands`).

use std::path::Path;

use anyhow::Result;
use jarvis::config::{Config, PluginOptions};
use jarvis::project::PackageManifest;

pub fn cmd_commands(project_dir: &Path, options: &PluginOptions) -> Result<()> {
    let manifest = PackageManifest::load_or_default(project_dir);
    let config = Config::resolve(options, &manifest);

    println!("Dashboard: ws://{}/ws", config.bind_addr());
    if config.commands.is_empty() {
        println!("No commands configured.");
        return Ok(());
    }

    println!("Commands run for each viewer:");
    for command in &config.commands {
        println!("  {}: {}", command.label, command.script);
    }
    Ok(())
}
