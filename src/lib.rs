//! Jarvis, a build dashboard sidecar.
//!
//! Hooks into a bundler's build lifecycle, keeps the latest progress and
//! statistics, and streams them to browser dashboards over a local
//! WebSocket. Each dashboard session also gets the output of the project's
//! scripts, run in the background.
//!
//! | Module     | Responsibility                                           |
//! |------------|----------------------------------------------------------|
//! | `plugin`   | `Jarvis`, the aggregator the host drives                 |
//! | `host`     | Host plugin list and lifecycle event types               |
//! | `channel`  | WebSocket server, snapshot replay and live broadcast     |
//! | `runner`   | Background shell commands and their output               |
//! | `stats`    | Raw build stats → dashboard report                       |
//! | `project`  | `package.json` metadata, author and scripts              |
//! | `config`   | Options, port validation, command list                   |
//! | `reports`  | Environment flags and the report snapshot                |
//! | `errors`   | Typed errors                                             |

pub mod channel;
pub mod config;
pub mod errors;
pub mod host;
pub mod plugin;
pub mod project;
pub mod reports;
pub mod runner;
pub mod stats;

pub use plugin::Jarvis;
