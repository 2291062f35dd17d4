//! Host project metadata, read from `package.json`.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::CommandSpec;
use crate::errors::ConfigError;

/// `Name <email> (url)`, where every part is optional.
static AUTHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([^<(]*?)\s*(?:<([^>]*)>)?\s*(?:\(([^)]*)\))?\s*$")
        .expect("author pattern is valid")
});

/// The subset of `package.json` the dashboard cares about.
///
/// `author` and `scripts` are kept as raw JSON because both come in more than
/// one shape in the wild.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<serde_json::Value>,
    #[serde(default)]
    pub scripts: Option<serde_json::Value>,
}

impl PackageManifest {
    pub fn from_json_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|source| ConfigError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `package.json` from `project_dir`.
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let path = project_dir.join("package.json");
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadFailed {
            path: path.clone(),
            source,
        })?;
        Self::from_json_str(&content, &path)
    }

    /// Like [`PackageManifest::load`], but logs and returns an empty manifest
    /// on failure.
    pub fn load_or_default(project_dir: &Path) -> Self {
        Self::load(project_dir).unwrap_or_else(|e| {
            warn!("[jarvis] project metadata unavailable: {}", e);
            Self::default()
        })
    }
}

/// Normalized package author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub url: String,
}

/// Project section of the report, sent to viewers as the `project` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectReport {
    pub name: String,
    pub version: String,
    pub makers: Author,
}

impl ProjectReport {
    pub fn from_manifest(manifest: &PackageManifest) -> Self {
        Self {
            name: manifest.name.clone().unwrap_or_default(),
            version: manifest.version.clone().unwrap_or_default(),
            makers: manifest
                .author
                .as_ref()
                .map(parse_author)
                .unwrap_or_default(),
        }
    }
}

/// Normalize an `author` field.
///
/// Strings follow the `Name <email> (url)` convention; for a comma-separated
/// list only the first entry is used. Objects pass through when they carry a
/// non-empty `name`. Everything else yields an empty author.
pub fn parse_author(author: &serde_json::Value) -> Author {
    match author {
        serde_json::Value::String(s) => parse_author_str(s).unwrap_or_default(),
        serde_json::Value::Object(map) => {
            let field = |key: &str| map.get(key).and_then(|v| v.as_str()).unwrap_or_default();
            let name = field("name");
            if name.is_empty() {
                return Author::default();
            }
            // Non-string email or url fields are dropped, keeping the name.
            Author {
                name: name.to_string(),
                email: field("email").to_string(),
                url: field("url").to_string(),
            }
        }
        _ => Author::default(),
    }
}

fn parse_author_str(s: &str) -> Option<Author> {
    let first = s.split(',').map(str::trim).find(|part| !part.is_empty())?;
    let caps = AUTHOR_RE.captures(first)?;
    let part = |i: usize| {
        caps.get(i)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    };
    let author = Author {
        name: part(1),
        email: part(2),
        url: part(3),
    };
    if author == Author::default() {
        None
    } else {
        Some(author)
    }
}

/// Turn a `scripts` table into commands, keeping declaration order.
///
/// Entries whose value is not a string are skipped.
pub fn parse_scripts(scripts: &serde_json::Value) -> Vec<CommandSpec> {
    let Some(table) = scripts.as_object() else {
        return Vec::new();
    };

    table
        .iter()
        .filter_map(|(label, script)| match script.as_str() {
            Some(script) => Some(CommandSpec::new(label.clone(), script)),
            None => {
                warn!("[jarvis] skipping script '{}': not a string", label);
                None
            }
        })
        .collect()
}
