//! Build statistics formatter.
//!
//! Turns the bundler's raw stats JSON (webpack's `stats.toJson({ chunkModules:
//! true })` shape) into the compact report the dashboard renders. The
//! function is pure; every missing field falls back to its default.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One emitted asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReport {
    pub name: String,
    pub size: u64,
    pub chunks: Vec<String>,
    pub over_size_limit: bool,
}

/// One chunk and the number of modules it carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReport {
    pub id: String,
    pub names: Vec<String>,
    pub size: u64,
    pub modules: usize,
    pub entry: bool,
    pub initial: bool,
}

/// Normalized statistics for one completed build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedStats {
    pub hash: String,
    pub version: String,
    pub time: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub assets: Vec<AssetReport>,
    pub total_asset_size: u64,
    pub chunks: Vec<ChunkReport>,
    pub module_count: usize,
    pub is_dev: bool,
}

impl NormalizedStats {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Normalize raw build statistics. `is_dev` is left `false`; the caller
/// stamps it from the detected build mode.
pub fn normalize(raw: &Value) -> NormalizedStats {
    let mut assets: Vec<AssetReport> = array(raw, "assets").iter().map(asset_report).collect();
    // Largest first, name as tiebreak so the order is stable.
    assets.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));
    let total_asset_size = assets.iter().map(|a| a.size).sum();

    let chunks: Vec<ChunkReport> = array(raw, "chunks").iter().map(chunk_report).collect();
    let module_count = match raw.get("modules").and_then(Value::as_array) {
        Some(modules) => modules.len(),
        None => chunks.iter().map(|c| c.modules).sum(),
    };

    NormalizedStats {
        hash: string(raw, "hash"),
        version: string(raw, "version"),
        time: raw.get("time").and_then(Value::as_u64).unwrap_or(0),
        errors: array(raw, "errors").iter().map(message_text).collect(),
        warnings: array(raw, "warnings").iter().map(message_text).collect(),
        assets,
        total_asset_size,
        chunks,
        module_count,
        is_dev: false,
    }
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn string(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Ids and chunk references are numbers in some bundler versions and
/// strings in others.
fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Errors and warnings are plain strings in older stats and
/// `{ message, ... }` objects in newer ones.
fn message_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

fn asset_report(asset: &Value) -> AssetReport {
    AssetReport {
        name: string(asset, "name"),
        size: asset.get("size").and_then(Value::as_u64).unwrap_or(0),
        chunks: array(asset, "chunks").iter().map(id_text).collect(),
        over_size_limit: asset
            .get("isOverSizeLimit")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

fn chunk_report(chunk: &Value) -> ChunkReport {
    ChunkReport {
        id: chunk.get("id").map(id_text).unwrap_or_default(),
        names: array(chunk, "names")
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        size: chunk.get("size").and_then(Value::as_u64).unwrap_or(0),
        modules: array(chunk, "modules").len(),
        entry: chunk.get("entry").and_then(Value::as_bool).unwrap_or(false),
        initial: chunk.get("initial").and_then(Value::as_bool).unwrap_or(false),
    }
}
