//! Top-level `version:` keys in YAML files.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use regex::{
    Captures,
    Regex,
};
use tracing::{
    info,
    warn,
};

use super::{
    StoredVersions,
    VersionHandler,
    read_text,
    text_version,
    write_if_changed,
};
use crate::pattern::VersionedSet;

/// A `version:` key at column zero, with an optionally quoted value.
static TOP_LEVEL_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?mR)^(?P<head>version:[ \t]*["']?)"#,
        r#"(?P<value>[^"'\r\n]*?)"#,
        r#"(?P<tail>["']?[ \t]*(?:#[^\r\n]*)?)$"#,
    ))
    .unwrap()
});

pub struct YamlHandler {
    insert_missing: bool,
}

impl YamlHandler {
    /// Helm `Chart.yaml`: the key is required, so it is added when absent.
    pub fn chart() -> Self {
        Self {
            insert_missing: true,
        }
    }

    /// Compose and other YAML files: only an existing key is updated.
    pub fn generic() -> Self {
        Self {
            insert_missing: false,
        }
    }
}

pub fn top_level_version(content: &str) -> Option<String> {
    TOP_LEVEL_VERSION
        .captures(content)
        .map(|caps| caps["value"].trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Replace every top-level `version:` value. `None` when there is none.
pub fn replace_top_level_version(content: &str, version: &str) -> Option<String> {
    if !TOP_LEVEL_VERSION.is_match(content) {
        return None;
    }
    Some(
        TOP_LEVEL_VERSION
            .replace_all(content, |caps: &Captures<'_>| {
                format!("{}{}{}", &caps["head"], version, &caps["tail"])
            })
            .into_owned(),
    )
}

impl VersionHandler for YamlHandler {
    fn extract(&self, path: &Path) -> Result<StoredVersions> {
        let content = read_text(path)?;
        Ok(top_level_version(&content)
            .map(StoredVersions::single)
            .unwrap_or_default())
    }

    fn apply(&self, path: &Path, set: &VersionedSet, suffix: Option<&str>) -> Result<()> {
        let content = read_text(path)?;
        let version = text_version(set, suffix);
        let updated = match replace_top_level_version(&content, &version) {
            Some(updated) => updated,
            None if self.insert_missing => format!("version: {}\n{}", version, content),
            None => {
                warn!(file = %path.display(), "No version field found in YAML file");
                return Ok(());
            }
        };
        if write_if_changed(path, &content, &updated)? {
            info!(file = %path.display(), %version, "Updated YAML version");
        }
        Ok(())
    }
}
