//! Dashboard server command (`jarvis serve`).
//!
//! Plays the host bundler's part: lifecycle events arrive on stdin as one
//! JSON object per line, e.g.
//!
//! ```text
//! {"hook": "watch-run"}
//! {"hook": "progress", "percentage": 0.42, "message": "building modules"}
//! {"hook": "done", "stats": { ... }}
//! ```

use std::path::Path;

use anyhow::{Context, Result, bail};
use jarvis::Jarvis;
use jarvis::config::PluginOptions;
use jarvis::host::{CompilerOptions, LifecycleEvent, PluginDescriptor};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

pub async fn cmd_serve(project_dir: &Path, options: &PluginOptions, defines: &[String]) -> Result<()> {
    let compiler = compiler_options(defines)?;
    let mut jarvis = Jarvis::new(options, project_dir);
    jarvis.apply(&compiler).await;

    // One listener for the whole session so a Ctrl+C during a handler is kept.
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let input = BufReader::new(tokio::io::stdin());
    match pump_events(&mut jarvis, input, &mut ctrl_c).await? {
        Pump::Interrupted => jarvis.close(),
        Pump::InputFinished => {
            if jarvis.is_channel_open() {
                info!("[jarvis] input finished, dashboard stays up until Ctrl+C");
                (&mut ctrl_c)
                    .await
                    .context("Failed to install Ctrl+C handler")?;
                jarvis.close();
            }
        }
    }
    jarvis.wait_closed().await;
    Ok(())
}

/// Why [`pump_events`] stopped.
#[derive(Debug, PartialEq, Eq)]
enum Pump {
    InputFinished,
    Interrupted,
}

/// Feed lifecycle events from `input` to the plugin until EOF or `shutdown`.
async fn pump_events<R, S>(jarvis: &mut Jarvis, input: R, shutdown: S) -> Result<Pump>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(shutdown);
    let mut lines = input.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read lifecycle events from stdin")? else {
                    return Ok(Pump::InputFinished);
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<LifecycleEvent>(line) {
                    Ok(event) => {
                        debug!("[jarvis] {}", event.name());
                        jarvis.handle(event);
                    }
                    Err(e) => warn!("[jarvis] ignoring malformed event: {}", e),
                }
            }
            result = &mut shutdown => {
                result.context("Failed to install Ctrl+C handler")?;
                return Ok(Pump::Interrupted);
            }
        }
    }
}

/// Turn `--define KEY=VALUE` flags into a constant-defining plugin.
fn compiler_options(defines: &[String]) -> Result<CompilerOptions> {
    if defines.is_empty() {
        return Ok(CompilerOptions::default());
    }
    let definitions = defines
        .iter()
        .map(|d| parse_define(d))
        .collect::<Result<Vec<_>>>()?;
    Ok(CompilerOptions::with_plugins(vec![PluginDescriptor::define(definitions)]))
}

/// `KEY=VALUE`; the value is read as JSON when it parses, as a plain string
/// otherwise.
fn parse_define(define: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, value)) = define.split_once('=') else {
        bail!("Invalid define '{}': expected KEY=VALUE", define);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid define '{}': empty key", define);
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
