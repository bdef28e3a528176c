//! Dockerfiles and compose files.
//!
//! A Dockerfile carries the version twice: as a build argument
//! (`ARG VERSION=...`, placed right after the first `FROM`) and as a
//! `# Version: ...` comment at the top. Compose files only get the comment;
//! their `version:` key is handled by the YAML handler. Both edits replace
//! in place when present, so re-running never duplicates lines.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::info;

use super::{
    StoredVersions,
    VersionHandler,
    read_text,
    text_version,
    write_if_changed,
};
use crate::pattern::VersionedSet;

static ARG_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^(?P<indent>[ \t]*)ARG[ \t]+VERSION[ \t]*=(?P<value>[^\r\n]*)").unwrap()
});
static ARG_VERSION_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^[ \t]*ARG[ \t]+VERSION[ \t]*$").unwrap());
static FIRST_FROM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^FROM[ \t]+[^\r\n]+").unwrap());
static VERSION_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)#[ \t]*Version:[ \t]*(?P<value>[^\r\n]*)").unwrap());

pub struct DockerHandler {
    compose: bool,
}

impl DockerHandler {
    pub fn new(compose: bool) -> Self {
        Self { compose }
    }
}

/// Set `ARG VERSION=<version>`, inserting it after the first `FROM` line
/// (or at the top when there is none).
pub fn upsert_build_arg(content: &str, version: &str) -> String {
    if ARG_VERSION.is_match(content) {
        return ARG_VERSION
            .replace_all(content, |caps: &regex::Captures<'_>| {
                format!("{}ARG VERSION={}", &caps["indent"], version)
            })
            .into_owned();
    }
    if ARG_VERSION_BARE.is_match(content) {
        return ARG_VERSION_BARE
            .replace_all(content, format!("ARG VERSION={}", version).as_str())
            .into_owned();
    }
    match FIRST_FROM.find(content) {
        Some(from) => format!(
            "{}\nARG VERSION={}{}",
            &content[..from.end()],
            version,
            &content[from.end()..]
        ),
        None => format!("ARG VERSION={}\n{}", version, content),
    }
}

/// Set the `# Version: <version>` comment, prepending it when absent.
pub fn upsert_version_comment(content: &str, version: &str) -> String {
    if VERSION_COMMENT.is_match(content) {
        VERSION_COMMENT
            .replace(content, format!("# Version: {}", version).as_str())
            .into_owned()
    } else {
        format!("# Version: {}\n{}", version, content)
    }
}

impl VersionHandler for DockerHandler {
    fn extract(&self, path: &Path) -> Result<StoredVersions> {
        let content = read_text(path)?;
        let from_arg = ARG_VERSION
            .captures(&content)
            .map(|caps| caps["value"].trim().to_string());
        let from_comment = VERSION_COMMENT
            .captures(&content)
            .map(|caps| caps["value"].trim().to_string());
        Ok(from_arg
            .or(from_comment)
            .filter(|v| !v.is_empty())
            .map(StoredVersions::single)
            .unwrap_or_default())
    }

    fn apply(&self, path: &Path, set: &VersionedSet, suffix: Option<&str>) -> Result<()> {
        let content = read_text(path)?;
        let version = text_version(set, suffix);
        let mut updated = content.clone();
        if !self.compose {
            updated = upsert_build_arg(&updated, &version);
        }
        updated = upsert_version_comment(&updated, &version);
        if write_if_changed(path, &content, &updated)? {
            info!(file = %path.display(), %version, "Updated container definition");
        }
        Ok(())
    }
}
