//! The host bundler surface Jarvis consumes.
//!
//! The host describes its configured plugins with [`CompilerOptions`] and
//! reports its lifecycle as a stream of [`LifecycleEvent`]s. Jarvis never
//! initiates either; it only reacts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Definition key that carries the build mode.
pub const NODE_ENV_KEY: &str = "process.env.NODE_ENV";

/// A plugin configured on the host compiler.
///
/// Plugins that inject compile-time constants expose them through
/// `definitions`; everything else leaves it empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definitions: Option<Map<String, Value>>,
}

impl PluginDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definitions: None,
        }
    }

    /// A constant-defining plugin with the given definitions.
    pub fn define<K, I>(definitions: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self {
            name: "DefinePlugin".to_string(),
            definitions: Some(
                definitions
                    .into_iter()
                    .map(|(k, v)| (k.into(), v))
                    .collect(),
            ),
        }
    }

    pub fn definition(&self, key: &str) -> Option<&Value> {
        self.definitions.as_ref()?.get(key)
    }
}

/// The parts of the host compiler configuration Jarvis inspects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilerOptions {
    #[serde(default)]
    pub plugins: Vec<PluginDescriptor>,
}

impl CompilerOptions {
    pub fn with_plugins(plugins: Vec<PluginDescriptor>) -> Self {
        Self { plugins }
    }

    /// The `NODE_ENV` definition of the first plugin that defines one.
    pub fn node_env(&self) -> Option<&Value> {
        self.plugins
            .iter()
            .find_map(|plugin| plugin.definition(NODE_ENV_KEY))
    }

    /// Build mode inferred from the plugin list.
    ///
    /// `None` when no plugin defines `NODE_ENV`; otherwise whether the
    /// definition is exactly the string `"production"`.
    pub fn production_mode(&self) -> Option<bool> {
        self.node_env()
            .map(|value| value.as_str() == Some("production"))
    }
}

/// A lifecycle callback from the host, in the order the host fires them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "hook", rename_all = "kebab-case")]
pub enum LifecycleEvent {
    /// A watch-mode build is starting.
    WatchRun,
    /// A single-run build is starting.
    Run,
    Progress {
        percentage: f64,
        #[serde(default)]
        message: String,
    },
    /// The build finished; `stats` is the bundler's raw stats JSON.
    Done {
        #[serde(default)]
        stats: Value,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::WatchRun => "watch-run",
            LifecycleEvent::Run => "run",
            LifecycleEvent::Progress { .. } => "progress",
            LifecycleEvent::Done { .. } => "done",
        }
    }
}
