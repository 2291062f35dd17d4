//! Command runner.
//!
//! Spawns the configured commands as long-lived child processes and streams
//! their output, line by line, to an [`OutputSink`].
//!
//! The runner keeps a handle to every task it starts but never kills a
//! child or times one out: processes run until they exit on their own or the
//! host process goes away. Closing the dashboard does not stop them.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::CommandSpec;

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives the output of spawned commands.
pub trait OutputSink: Send + Sync + 'static {
    /// One line of output, without its trailing newline.
    fn line(&self, label: &str, stream: OutputStream, line: &str);

    /// The command exited. `code` is `None` when it was killed by a signal or
    /// never started.
    fn exited(&self, _label: &str, _code: Option<i32>) {}
}

/// A command the runner started.
struct Supervised {
    label: String,
    task: JoinHandle<()>,
}

/// Spawns commands and keeps track of the tasks driving them.
pub struct CommandRunner {
    working_dir: PathBuf,
    tasks: Mutex<Vec<Supervised>>,
}

impl CommandRunner {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Start every command and forward its output to `sink`.
    ///
    /// Returns immediately; output arrives asynchronously. A command that
    /// fails to start is reported to the sink as a stderr line followed by
    /// an exit without a code. Must be called from within a tokio runtime.
    pub fn spawn(&self, commands: &[CommandSpec], sink: Arc<dyn OutputSink>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.task.is_finished());

        for command in commands {
            let task = self.spawn_one(command, Arc::clone(&sink));
            tasks.push(Supervised {
                label: command.label.clone(),
                task,
            });
        }
    }

    /// Number of commands whose output is still being streamed.
    pub fn active(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| !t.task.is_finished())
            .count()
    }

    /// Labels of the commands still running, in start order.
    pub fn active_labels(&self) -> Vec<String> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| !t.task.is_finished())
            .map(|t| t.label.clone())
            .collect()
    }

    fn spawn_one(&self, command: &CommandSpec, sink: Arc<dyn OutputSink>) -> JoinHandle<()> {
        let label = command.label.clone();
        let spawned = shell(&command.script)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!("[jarvis] failed to spawn '{}' ({}): {}", label, command.script, e);
                sink.line(
                    &label,
                    OutputStream::Stderr,
                    &format!("failed to start '{}': {}", command.script, e),
                );
                sink.exited(&label, None);
                return tokio::spawn(async {});
            }
        };

        debug!("[jarvis] spawned '{}' (pid {:?})", label, child.id());

        tokio::spawn(async move {
            let stdout = child.stdout.take();
            let stderr = child.stderr.take();
            tokio::join!(
                forward_lines(stdout, &label, OutputStream::Stdout, sink.as_ref()),
                forward_lines(stderr, &label, OutputStream::Stderr, sink.as_ref()),
            );

            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!("[jarvis] failed to wait for '{}': {}", label, e);
                    None
                }
            };
            debug!("[jarvis] '{}' exited with {:?}", label, code);
            sink.exited(&label, code);
        })
    }
}

#[cfg(not(windows))]
fn shell(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    cmd
}

#[cfg(windows)]
fn shell(script: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(script);
    cmd
}

/// Forward each line of `reader` to the sink until EOF.
///
/// Output is decoded lossily so a stray non-UTF-8 byte never stops the
/// stream. After a read error the pipe is still drained, keeping the child
/// from dying on a closed pipe.
async fn forward_lines<R>(reader: Option<R>, label: &str, stream: OutputStream, sink: &dyn OutputSink)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => sink.line(label, stream, &String::from_utf8_lossy(trim_newline(&buf))),
            Err(e) => {
                debug!("[jarvis] stopped forwarding {:?} of '{}': {}", stream, label, e);
                let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                break;
            }
        }
    }
}

fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
