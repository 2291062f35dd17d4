//! Broadcast channel: the WebSocket endpoint dashboards connect to.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐ WebSocket ┌──────────────────────────────────────────────┐
//! │  Viewer  │ <──────── │  server.rs  (axum Router, BroadcastChannel)  │
//! │ (browser)│           │    └─ ws.rs  (ChannelEvent, socket loop)     │
//! └──────────┘           │         │                                    │
//!                        │         │ subscribe_with_replay()            │
//!                        │         v                                    │
//!                        │  hub.rs  (ReportHub: snapshot + broadcast)   │
//!                        │         ^                                    │
//!                        │         │ record_progress() / record_stats() │
//!                        │  plugin::Jarvis                              │
//!                        └──────────────────────────────────────────────┘
//! ```
//!
//! ## Connection Flow
//!
//! 1. `GET /ws` upgrades → `ws::handle_socket()`
//! 2. The viewer subscribes to live frames and copies the snapshot in one
//!    step, then receives `project`, `progress`, `stats` in that order.
//! 3. The configured commands are spawned for this viewer; their output is
//!    sent to it alone as `command_output` / `command_exit` frames.
//! 4. Live frames (`progress`, `stats`, `compiler_done`) follow until the
//!    viewer leaves or the channel is closed.

pub mod hub;
pub mod server;
pub mod ws;

pub use hub::ReportHub;
pub use server::BroadcastChannel;
pub use ws::ChannelEvent;
