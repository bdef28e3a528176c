//! `Cargo.toml` manifests.
//!
//! Edited through `toml_edit::DocumentMut`, so comments, whitespace and
//! table order survive. The version can live in two places:
//!
//! 1. `[package] version = "X.Y.Z"`
//! 2. `[workspace.package] version = "X.Y.Z"`
//!
//! A package that inherits its version (`version.workspace = true`) is left
//! alone; the workspace table carries the value instead.

use std::path::Path;

use anyhow::{
    Context,
    Result,
};
use toml_edit::{
    DocumentMut,
    Item,
    Table,
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

pub struct CargoHandler;

/// Replace a string value in place, keeping its surrounding whitespace and
/// trailing comment.
fn replace_keeping_decor(item: &mut Item, version: &str) -> bool {
    let Some(current) = item.as_value_mut() else {
        return false;
    };
    if current.as_str().is_none() {
        return false;
    }
    let decor = current.decor().clone();
    *current = Value::from(version);
    *current.decor_mut() = decor;
    true
}

fn workspace_package_mut(doc: &mut DocumentMut) -> Option<&mut Table> {
    doc.get_mut("workspace")
        .and_then(Item::as_table_mut)
        .and_then(|w| w.get_mut("package"))
        .and_then(Item::as_table_mut)
}

/// Set the manifest version and return the new document text.
pub fn set_manifest_version(content: &str, version: &str) -> Result<String> {
    let mut doc = content
        .parse::<DocumentMut>()
        .context("Failed to parse Cargo.toml")?;

    let mut package_updated = false;
    let mut workspace_updated = false;

    if let Some(package) = doc.get_mut("package").and_then(Item::as_table_mut) {
        match package.get_mut("version") {
            Some(item) => package_updated = replace_keeping_decor(item, version),
            None => {
                package.insert("version", toml_edit::value(version));
                package_updated = true;
            }
        }
    }

    if let Some(workspace_package) = workspace_package_mut(&mut doc)
        && let Some(item) = workspace_package.get_mut("version")
    {
        workspace_updated = replace_keeping_decor(item, version);
    }

    if !package_updated && !workspace_updated {
        anyhow::bail!("Could not find version in [package] or [workspace.package] section");
    }
    Ok(doc.to_string())
}

/// Version declared by the manifest, package first.
pub fn manifest_version(content: &str) -> Result<Option<String>> {
    let doc = content
        .parse::<DocumentMut>()
        .context("Failed to parse Cargo.toml")?;
    let package = doc
        .get("package")
        .and_then(|p| p.get("version"))
        .and_then(Item::as_str);
    let workspace = doc
        .get("workspace")
        .and_then(|w| w.get("package"))
        .and_then(|p| p.get("version"))
        .and_then(Item::as_str);
    Ok(package.or(workspace).map(str::to_string))
}

impl VersionHandler for CargoHandler {
    fn extract(&self, path: &Path) -> Result<StoredVersions> {
        let content = read_text(path)?;
        let version = manifest_version(&content)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?;
        Ok(version.map(StoredVersions::single).unwrap_or_default())
    }

    fn apply(&self, path: &Path, set: &VersionedSet, suffix: Option<&str>) -> Result<()> {
        let content = read_text(path)?;
        let version = text_version(set, suffix);
        let updated = set_manifest_version(&content, &version)
            .with_context(|| format!("Failed to update {}", path.display()))?;
        if write_if_changed(path, &content, &updated)? {
            info!(file = %path.display(), %version, "Updated Cargo manifest");
        }
        Ok(())
    }
}
