//! Shared report snapshot plus the live broadcast sender.
//!
//! Every update to the snapshot and the matching broadcast happen while the
//! snapshot lock is held, and a joining viewer subscribes and copies the
//! snapshot under the same lock. A viewer therefore sees each value exactly
//! once: either in its replay or as a live frame, never both, never neither.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use super::ws::{ChannelEvent, broadcast_message};
use crate::project::ProjectReport;
use crate::reports::{Progress, ReportSnapshot};
use crate::stats::NormalizedStats;

/// Frames buffered per viewer before a slow viewer starts skipping.
const BROADCAST_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct ReportHub {
    snapshot: Arc<Mutex<ReportSnapshot>>,
    tx: broadcast::Sender<String>,
}

impl Default for ReportHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel::<String>(BROADCAST_CAPACITY);
        Self {
            snapshot: Arc::new(Mutex::new(ReportSnapshot::default())),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReportSnapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> ReportSnapshot {
        self.lock().clone()
    }

    /// Replace the project section. Not broadcast; viewers get it on connect.
    pub fn set_project(&self, project: ProjectReport) {
        self.lock().project = project;
    }

    pub fn record_progress(&self, progress: Progress) {
        let mut snapshot = self.lock();
        snapshot.progress = progress.clone();
        broadcast_message(&self.tx, &ChannelEvent::Progress(progress));
    }

    /// Store the stats of a finished build and announce it: `stats` then
    /// `compiler_done`.
    pub fn record_stats(&self, stats: NormalizedStats) {
        let mut snapshot = self.lock();
        snapshot.stats = stats.clone();
        broadcast_message(&self.tx, &ChannelEvent::Stats(stats));
        broadcast_message(&self.tx, &ChannelEvent::CompilerDone(()));
    }

    /// Subscribe to live frames and take the replay sequence, atomically
    /// with respect to updates.
    pub fn subscribe_with_replay(&self) -> (broadcast::Receiver<String>, [ChannelEvent; 3]) {
        let snapshot = self.lock();
        let rx = self.tx.subscribe();
        let replay = [
            ChannelEvent::Project(snapshot.project.clone()),
            ChannelEvent::Progress(snapshot.progress.clone()),
            ChannelEvent::Stats(snapshot.stats.clone()),
        ];
        (rx, replay)
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
