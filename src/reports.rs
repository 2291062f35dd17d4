//! In-memory state: the environment flags and the report snapshot replayed to
//! new viewers.

use serde::{Deserialize, Serialize};

use crate::project::ProjectReport;
use crate::stats::NormalizedStats;

/// Build environment flags.
///
/// `running` only ever goes from `false` to `true`. `watching` flips on every
/// build start and decides whether the dashboard closes after the build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Environment {
    pub production: bool,
    pub running: bool,
    pub watching: bool,
}

/// Latest progress report from the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub percentage: f64,
    pub message: String,
}

impl Progress {
    pub fn new(percentage: f64, message: impl Into<String>) -> Self {
        Self {
            percentage,
            message: message.into(),
        }
    }
}

/// Everything a viewer needs to render the dashboard from scratch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSnapshot {
    pub project: ProjectReport,
    pub progress: Progress,
    pub stats: NormalizedStats,
}
