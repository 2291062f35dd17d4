use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cmd;

#[derive(Parser)]
#[command(name = "jarvis")]
#[command(version, about = "Build dashboard sidecar for bundler progress, stats and script output")]
pub struct Cli {
    /// Project directory holding package.json (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Path to a config file. Defaults to jarvis.toml in the project directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Dashboard port. Invalid values fall back to 1337
    #[arg(short, long, global = true, env = "JARVIS_PORT")]
    pub port: Option<String>,

    /// Dashboard host
    #[arg(long, global = true, env = "JARVIS_HOST")]
    pub host: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the dashboard, reading lifecycle events as JSON lines from stdin
    Serve {
        /// Compile-time definition as KEY=VALUE, e.g. process.env.NODE_ENV=production
        #[arg(long = "define", value_name = "KEY=VALUE")]
        defines: Vec<String>,
    },
    /// Show the commands each dashboard session runs
    Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jarvis=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let options = cmd::load_options(
        &project_dir,
        cli.config.as_deref(),
        cli.port.as_deref(),
        cli.host.as_deref(),
    )?;

    match &cli.command {
        Commands::Serve { defines } => cmd::cmd_serve(&project_dir, &options, defines).await?,
        Commands::Commands => cmd::cmd_commands(&project_dir, &options)?,
    }

    Ok(())
}
