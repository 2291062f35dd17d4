use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::server::ChannelState;
use crate::project::ProjectReport;
use crate::reports::Progress;
use crate::runner::{OutputSink, OutputStream};
use crate::stats::NormalizedStats;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── WebSocket message types ──────────────────────────────────────────

/// A frame sent to viewers, encoded as `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ChannelEvent {
    Project(ProjectReport),
    Progress(Progress),
    Stats(NormalizedStats),
    /// Sent once per completed build; the payload is always `null`.
    CompilerDone(()),

    // Per-viewer command output
    CommandOutput {
        label: String,
        stream: OutputStream,
        line: String,
    },
    CommandExit {
        label: String,
        code: Option<i32>,
    },
}

impl ChannelEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::Project(_) => "project",
            ChannelEvent::Progress(_) => "progress",
            ChannelEvent::Stats(_) => "stats",
            ChannelEvent::CompilerDone(_) => "compiler_done",
            ChannelEvent::CommandOutput { .. } => "command_output",
            ChannelEvent::CommandExit { .. } => "command_exit",
        }
    }
}

// ── Per-viewer command output ────────────────────────────────────────

/// Routes command output to a single viewer connection.
pub struct ViewerSink {
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl ViewerSink {
    pub fn new(tx: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        Self { tx }
    }
}

impl OutputSink for ViewerSink {
    fn line(&self, label: &str, stream: OutputStream, line: &str) {
        // The viewer may already be gone; the command keeps running regardless.
        let _ = self.tx.send(ChannelEvent::CommandOutput {
            label: label.to_string(),
            stream,
            line: line.to_string(),
        });
    }

    fn exited(&self, label: &str, code: Option<i32>) {
        let _ = self.tx.send(ChannelEvent::CommandExit {
            label: label.to_string(),
            code,
        });
    }
}

// ── WebSocket handler ────────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ChannelState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Replay the snapshot, start the viewer's commands, then stream live events.
async fn handle_socket(socket: WebSocket, state: Arc<ChannelState>) {
    let viewer = Uuid::new_v4();
    info!(%viewer, "[jarvis] viewer connected");

    let (mut sender, receiver) = socket.split();
    let (rx, replay) = state.hub.subscribe_with_replay();

    for event in &replay {
        if send_event(&mut sender, event).await.is_err() {
            debug!(%viewer, "[jarvis] viewer left during replay");
            return;
        }
    }

    let (viewer_tx, viewer_rx) = mpsc::unbounded_channel();
    state
        .runner
        .spawn(&state.commands, Arc::new(ViewerSink::new(viewer_tx)));

    run_socket_loop(sender, receiver, rx, viewer_rx, state.shutdown.clone()).await;
    info!(%viewer, "[jarvis] viewer disconnected");
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ChannelEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!("[jarvis] Failed to serialize {} event: {}", event.name(), e);
            Ok(())
        }
    }
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Combines broadcast forwarding, per-viewer command output, client message
/// receiving and periodic ping/pong health checking into a single select
/// loop. If no Pong is received within [`PONG_TIMEOUT`] after a Ping is sent,
/// the connection is considered dead and the loop exits. Cancelling
/// `shutdown` ends the loop as well.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<String>,
    mut viewer_rx: mpsc::UnboundedReceiver<ChannelEvent>,
    shutdown: CancellationToken,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately; consume it so the first real
    // ping fires after PING_INTERVAL has elapsed.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;
    let mut viewer_open = true;

    loop {
        tokio::select! {
            // ── Channel closed: flush what is already queued ────────
            _ = shutdown.cancelled() => {
                loop {
                    match rx.try_recv() {
                        Ok(msg) => {
                            if sender.send(Message::Text(msg.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }
                break;
            }

            // ── Periodic ping ───────────────────────────────────────
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            // ── Broadcast forwarding ────────────────────────────────
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!("[jarvis] viewer lagged, skipped {} frames", missed);
                        continue;
                    }
                }
            }

            // ── Command output for this viewer ──────────────────────
            event = viewer_rx.recv(), if viewer_open => {
                match event {
                    Some(event) => {
                        if send_event(&mut sender, &event).await.is_err() {
                            break;
                        }
                    }
                    // Every command has exited.
                    None => viewer_open = false,
                }
            }

            // ── Client messages (pong, close, etc.) ─────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Best-effort close frame
    let _ = sender.send(Message::Close(None)).await;
}

// ── Broadcast helper ─────────────────────────────────────────────────

/// Serialize and broadcast a ChannelEvent to all connected viewers.
/// Returns silently even if no viewers are connected.
pub fn broadcast_message(tx: &broadcast::Sender<String>, event: &ChannelEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            let _ = tx.send(json); // Ignore error if no receivers
        }
        Err(e) => {
            warn!("[jarvis] Failed to serialize {} event: {}", event.name(), e);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Author;

    #[test]
    fn test_project_event_serialization() {
        let msg = ChannelEvent::Project(ProjectReport {
            name: "demo".to_string(),
            version: "1.0.0".to_string(),
            makers: Author {
                name: "Jane".to_string(),
                ..Default::default()
            },
        });
        let parsed: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(parsed["event"], "project");
        assert_eq!(parsed["data"]["name"], "demo");
        assert_eq!(parsed["data"]["makers"]["name"], "Jane");
        assert_eq!(parsed["data"]["makers"]["email"], "");
    }

    #[test]
    fn test_progress_event_serialization() {
        let msg = ChannelEvent::Progress(Progress::new(0.5, "emitting"));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"event\":\"progress\""));
        assert!(json.contains("\"percentage\":0.5"));
        assert!(json.contains("\"message\":\"emitting\""));
    }

    #[test]
    fn test_stats_event_carries_is_dev() {
        let stats = NormalizedStats {
            is_dev: true,
            ..Default::default()
        };
        let parsed = serde_json::to_value(ChannelEvent::Stats(stats)).unwrap();
        assert_eq!(parsed["event"], "stats");
        assert_eq!(parsed["data"]["isDev"], true);
    }

    #[test]
    fn test_compiler_done_payload_is_null() {
        let parsed = serde_json::to_value(ChannelEvent::CompilerDone(())).unwrap();
        assert_eq!(parsed, serde_json::json!({"event": "compiler_done", "data": null}));

        let back: ChannelEvent =
            serde_json::from_str(r#"{"event":"compiler_done","data":null}"#).unwrap();
        assert_eq!(back, ChannelEvent::CompilerDone(()));
    }

    #[test]
    fn test_command_output_serialization() {
        let msg = ChannelEvent::CommandOutput {
            label: "lint".to_string(),
            stream: OutputStream::Stderr,
            line: "1 problem".to_string(),
        };
        let parsed = serde_json::to_value(&msg).unwrap();
        assert_eq!(parsed["event"], "command_output");
        assert_eq!(parsed["data"]["label"], "lint");
        assert_eq!(parsed["data"]["stream"], "stderr");
    }

    #[test]
    fn test_event_names_match_wire_tags() {
        let events = [
            ChannelEvent::Progress(Progress::default()),
            ChannelEvent::CompilerDone(()),
            ChannelEvent::CommandExit {
                label: "x".to_string(),
                code: Some(0),
            },
        ];
        for event in events {
            let parsed = serde_json::to_value(&event).unwrap();
            assert_eq!(parsed["event"], event.name());
        }
    }

    #[test]
    fn test_viewer_sink_forwards_output() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ViewerSink::new(tx);
        sink.line("build", OutputStream::Stdout, "compiled");
        sink.exited("build", Some(0));

        assert_eq!(
            rx.try_recv().unwrap(),
            ChannelEvent::CommandOutput {
                label: "build".to_string(),
                stream: OutputStream::Stdout,
                line: "compiled".to_string(),
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ChannelEvent::CommandExit {
                label: "build".to_string(),
                code: Some(0),
            }
        );
    }

    #[test]
    fn test_viewer_sink_ignores_departed_viewer() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        ViewerSink::new(tx).line("build", OutputStream::Stdout, "nobody listening");
    }

    #[tokio::test]
    async fn test_broadcast_channel_delivers_to_subscribers() {
        let (tx, _) = broadcast::channel::<String>(16);
        let mut rx1 = tx.subscribe();
        let mut rx2 = tx.subscribe();

        broadcast_message(&tx, &ChannelEvent::CompilerDone(()));

        let received1 = rx1.recv().await.unwrap();
        let received2 = rx2.recv().await.unwrap();
        assert!(received1.contains("compiler_done"));
        assert_eq!(received1, received2);
    }

    #[tokio::test]
    async fn test_broadcast_no_receivers_does_not_panic() {
        let (tx, _) = broadcast::channel::<String>(16);
        broadcast_message(&tx, &ChannelEvent::CompilerDone(()));
    }

    #[test]
    fn test_keepalive_constants() {
        assert!(PONG_TIMEOUT > PING_INTERVAL);
        assert_eq!(PING_INTERVAL, Duration::from_secs(30));
        assert_eq!(PONG_TIMEOUT, Duration::from_secs(60));
    }
}
