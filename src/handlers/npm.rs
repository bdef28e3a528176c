//! `package.json` manifests.

use std::path::Path;

use anyhow::{
    Context,
    Result,
};
use serde::Serialize;
use serde_json::{
    Map,
    Value,
};
use tracing::info;

use super::{
    StoredVersions,
    VersionHandler,
    read_text,
    text_version,
    write_if_changed,
};
use crate::pattern::VersionedSet;

const DEFAULT_INDENT: &str = "  ";

pub struct NpmHandler;

/// Key holding the version, matched case-insensitively.
fn version_key(object: &Map<String, Value>) -> Option<String> {
    object
        .keys()
        .find(|k| k.eq_ignore_ascii_case("version"))
        .cloned()
}

/// Indentation of the first indented line.
fn detect_indent(content: &str) -> String {
    content
        .lines()
        .skip(1)
        .find_map(|line| {
            let trimmed = line.trim_start();
            let width = line.len() - trimmed.len();
            (width > 0 && !trimmed.is_empty()).then(|| line[..width].to_string())
        })
        .unwrap_or_else(|| DEFAULT_INDENT.to_string())
}

fn to_pretty_json(value: &Value, indent: &str) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .context("Failed to serialize package.json")?;
    String::from_utf8(buf).context("package.json serialized to invalid UTF-8")
}

/// Set the version field, keeping key order, indentation and the trailing
/// newline of the original document.
pub fn set_version(content: &str, version: &str) -> Result<String> {
    let mut value: Value = serde_json::from_str(content).context("Invalid package.json")?;
    let object = value
        .as_object_mut()
        .context("package.json is not a JSON object")?;
    let key = version_key(object).unwrap_or_else(|| "version".to_string());
    object.insert(key, Value::String(version.to_string()));

    let mut out = to_pretty_json(&value, &detect_indent(content))?;
    if content.contains("\r\n") {
        out = out.replace('\n', "\r\n");
    }
    if content.ends_with("\r\n") {
        out.push_str("\r\n");
    } else if content.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

impl VersionHandler for NpmHandler {
    fn extract(&self, path: &Path) -> Result<StoredVersions> {
        let content = read_text(path)?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?;
        let version = value
            .as_object()
            .and_then(|o| version_key(o).and_then(|k| o.get(&k).cloned()))
            .and_then(|v| v.as_str().map(str::to_string));
        Ok(version.map(StoredVersions::single).unwrap_or_default())
    }

    fn apply(&self, path: &Path, set: &VersionedSet, suffix: Option<&str>) -> Result<()> {
        let content = read_text(path)?;
        let version = text_version(set, suffix);
        let updated = set_version(&content, &version)
            .with_context(|| format!("Failed to update {}", path.display()))?;
        if write_if_changed(path, &content, &updated)? {
            info!(file = %path.display(), %version, "Updated package.json");
        }
        Ok(())
    }
}
