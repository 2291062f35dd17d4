//! The build event aggregator.
//!
//! [`Jarvis`] is the single owner of the environment flags and the report
//! snapshot. The host calls [`Jarvis::apply`] once per compiler and then feeds
//! lifecycle callbacks, either through the `on_*` methods or through
//! [`Jarvis::handle`]. None of these ever fail: dashboard problems are logged
//! and the build carries on.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channel::{BroadcastChannel, ReportHub};
use crate::config::{Config, PluginOptions};
use crate::host::{CompilerOptions, LifecycleEvent};
use crate::project::{PackageManifest, ProjectReport};
use crate::reports::{Environment, Progress, ReportSnapshot};
use crate::runner::CommandRunner;
use crate::stats;

pub struct Jarvis {
    config: Config,
    manifest: PackageManifest,
    env: Environment,
    hub: ReportHub,
    runner: Arc<CommandRunner>,
    channel: Option<BroadcastChannel>,
}

impl Jarvis {
    /// Create the plugin for the project in `project_dir`, reading its
    /// `package.json`.
    pub fn new(options: &PluginOptions, project_dir: impl AsRef<Path>) -> Self {
        let manifest = PackageManifest::load_or_default(project_dir.as_ref());
        Self::with_manifest(options, manifest, project_dir)
    }

    /// Create the plugin from an already loaded manifest. Commands run in
    /// `project_dir`.
    pub fn with_manifest(
        options: &PluginOptions,
        manifest: PackageManifest,
        project_dir: impl AsRef<Path>,
    ) -> Self {
        let config = Config::resolve(options, &manifest);
        Self {
            config,
            manifest,
            env: Environment::default(),
            hub: ReportHub::new(),
            runner: Arc::new(CommandRunner::new(project_dir)),
            channel: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn environment(&self) -> Environment {
        self.env
    }

    pub fn snapshot(&self) -> ReportSnapshot {
        self.hub.snapshot()
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    /// Address the dashboard is bound to, once it has started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.channel.as_ref().map(BroadcastChannel::local_addr)
    }

    /// Whether viewers can currently connect.
    pub fn is_channel_open(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| !c.is_closed())
    }

    /// Hook into a compiler.
    ///
    /// Refreshes the project report, starts the dashboard if it is not
    /// running yet and infers the build mode from the compiler's plugins.
    /// Calling it again (one call per compiler in multi-compiler setups) never
    /// starts a second server, and never reopens one that has been closed.
    pub async fn apply(&mut self, compiler: &CompilerOptions) {
        self.hub
            .set_project(ProjectReport::from_manifest(&self.manifest));

        if !self.env.running {
            self.start_channel().await;
        }

        if let Some(production) = compiler.production_mode() {
            self.env.production = production;
        }
        debug!("[jarvis] applied, production = {}", self.env.production);
    }

    async fn start_channel(&mut self) {
        let addr = self.config.bind_addr();
        match BroadcastChannel::start(
            &addr,
            self.hub.clone(),
            Arc::clone(&self.runner),
            self.config.commands.clone(),
        )
        .await
        {
            Ok(channel) => {
                self.env.running = true;
                self.channel = Some(channel);
            }
            Err(e) => warn!("[jarvis] {}; the dashboard is unavailable", e),
        }
    }

    /// A watch-mode build is starting.
    pub fn on_watch_run(&mut self) {
        self.env.watching = true;
    }

    /// A single-run build is starting.
    pub fn on_run(&mut self) {
        self.env.watching = false;
    }

    pub fn on_progress(&mut self, percentage: f64, message: impl Into<String>) {
        self.hub.record_progress(Progress::new(percentage, message));
    }

    /// The build finished. Single-run builds close the dashboard afterwards.
    pub fn on_done(&mut self, raw_stats: &serde_json::Value) {
        let mut stats = stats::normalize(raw_stats);
        stats.is_dev = !self.env.production;
        info!(
            "[jarvis] build done in {}ms ({} errors, {} warnings)",
            stats.time,
            stats.errors.len(),
            stats.warnings.len()
        );
        self.hub.record_stats(stats);

        if !self.env.watching
            && let Some(channel) = &self.channel
        {
            channel.close();
        }
    }

    /// Route a lifecycle event to its handler.
    pub fn handle(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::WatchRun => self.on_watch_run(),
            LifecycleEvent::Run => self.on_run(),
            LifecycleEvent::Progress {
                percentage,
                message,
            } => self.on_progress(percentage, message),
            LifecycleEvent::Done { stats } => self.on_done(&stats),
        }
    }

    /// Wait for a closed dashboard to finish shutting down.
    pub async fn wait_closed(&mut self) {
        if let Some(channel) = self.channel.as_mut()
            && channel.is_closed()
        {
            channel.wait_closed().await;
        }
    }

    /// Close the dashboard regardless of mode. Spawned commands keep running.
    pub fn close(&self) {
        if let Some(channel) = &self.channel {
            channel.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortSetting;
    use crate::host::{NODE_ENV_KEY, PluginDescriptor};
    use serde_json::json;

    fn local_options() -> PluginOptions {
        PluginOptions {
            port: Some(PortSetting::from(0u16)),
            host: Some("127.0.0.1".to_string()),
            commands: None,
        }
    }

    fn plugin() -> Jarvis {
        Jarvis::with_manifest(&local_options(), PackageManifest::default(), ".")
    }

    fn define_env(value: &str) -> CompilerOptions {
        CompilerOptions::with_plugins(vec![PluginDescriptor::define([(NODE_ENV_KEY, json!(value))])])
    }

    #[test]
    fn test_watching_follows_build_entry() {
        let mut jarvis = plugin();
        jarvis.on_watch_run();
        assert!(jarvis.environment().watching);
        jarvis.on_run();
        assert!(!jarvis.environment().watching);
        jarvis.handle(LifecycleEvent::WatchRun);
        assert!(jarvis.environment().watching);
    }

    #[test]
    fn test_progress_overwrites_snapshot() {
        let mut jarvis = plugin();
        jarvis.on_progress(0.2, "building");
        jarvis.handle(LifecycleEvent::Progress {
            percentage: 0.6,
            message: "sealing".to_string(),
        });
        assert_eq!(jarvis.snapshot().progress, Progress::new(0.6, "sealing"));
    }

    #[test]
    fn test_done_stamps_is_dev() {
        let mut jarvis = plugin();
        jarvis.on_done(&json!({"hash": "h1"}));
        let stats = jarvis.snapshot().stats;
        assert_eq!(stats.hash, "h1");
        assert!(stats.is_dev);
    }

    #[tokio::test]
    async fn test_apply_starts_channel_once() {
        let mut jarvis = plugin();
        jarvis.apply(&CompilerOptions::default()).await;
        assert!(jarvis.environment().running);
        let addr = jarvis.local_addr().unwrap();

        jarvis.apply(&CompilerOptions::default()).await;
        assert_eq!(jarvis.local_addr(), Some(addr));
        jarvis.close();
    }

    #[tokio::test]
    async fn test_apply_sets_project_report() {
        let manifest = PackageManifest {
            name: Some("demo".to_string()),
            version: Some("2.0.0".to_string()),
            author: Some(json!("Jane Doe <jane@x.com>")),
            scripts: None,
        };
        let mut jarvis = Jarvis::with_manifest(&local_options(), manifest, ".");
        jarvis.apply(&CompilerOptions::default()).await;

        let project = jarvis.snapshot().project;
        assert_eq!(project.name, "demo");
        assert_eq!(project.version, "2.0.0");
        assert_eq!(project.makers.email, "jane@x.com");
        jarvis.close();
    }

    #[tokio::test]
    async fn test_production_detection_and_is_dev() {
        let mut jarvis = plugin();
        jarvis.apply(&define_env("production")).await;
        assert!(jarvis.environment().production);

        jarvis.on_watch_run();
        jarvis.on_done(&json!({}));
        assert!(!jarvis.snapshot().stats.is_dev);

        // No define plugin: the previous mode stands.
        jarvis.apply(&CompilerOptions::default()).await;
        assert!(jarvis.environment().production);

        jarvis.apply(&define_env("development")).await;
        assert!(!jarvis.environment().production);
        jarvis.close();
    }

    #[tokio::test]
    async fn test_single_run_closes_channel() {
        let mut jarvis = plugin();
        jarvis.apply(&CompilerOptions::default()).await;
        jarvis.on_run();
        jarvis.on_done(&json!({}));
        assert!(!jarvis.is_channel_open());
        // Running never resets.
        assert!(jarvis.environment().running);

        tokio::time::timeout(std::time::Duration::from_secs(5), jarvis.wait_closed())
            .await
            .unwrap();

        // A closed dashboard is not reopened.
        jarvis.apply(&CompilerOptions::default()).await;
        assert!(!jarvis.is_channel_open());
    }

    #[tokio::test]
    async fn test_watch_run_keeps_channel_open() {
        let mut jarvis = plugin();
        jarvis.apply(&CompilerOptions::default()).await;
        jarvis.on_watch_run();
        jarvis.on_done(&json!({}));
        jarvis.on_done(&json!({}));
        assert!(jarvis.is_channel_open());
        jarvis.close();
    }

    #[tokio::test]
    async fn test_bind_failure_is_not_fatal() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let options = PluginOptions {
            port: Some(PortSetting::from(taken.local_addr().unwrap().port())),
            host: Some("127.0.0.1".to_string()),
            commands: None,
        };
        let mut jarvis = Jarvis::with_manifest(&options, PackageManifest::default(), ".");
        jarvis.apply(&CompilerOptions::default()).await;

        assert!(!jarvis.environment().running);
        assert!(jarvis.local_addr().is_none());

        // Lifecycle callbacks still work without a dashboard.
        jarvis.on_run();
        jarvis.on_progress(1.0, "done");
        jarvis.on_done(&json!({}));
        assert_eq!(jarvis.snapshot().progress.percentage, 1.0);
    }
}
