//! Go modules: `go.mod` and `version.go`.
//!
//! `go.mod` has no version field, so the version is kept as a trailing
//! comment on the module line (`module example.com/app // version 1.2.3`).
//! `version.go` holds a `Version = "..."` declaration.

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
    file_name,
    read_text,
    text_version,
    write_if_changed,
};
use crate::pattern::VersionedSet;

static MODULE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?m)^(?P<module>module[ \t]+[^\s]+)",
        r"(?P<sep>[ \t]+//[ \t]+version[ \t]+)",
        r"(?P<value>[^\r\n]+)",
    ))
    .unwrap()
});
static MODULE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^module[ \t]+[^\s]+").unwrap());
static VERSION_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<head>Version\s*=\s*["'`])(?P<value>[^"'`]*)(?P<tail>["'`])"#).unwrap()
});
static PACKAGE_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^package[ \t]+\w+[^\r\n]*").unwrap());

pub struct GoHandler;

/// Replace or append the `// version` comment on the module line.
pub fn set_module_version(content: &str, version: &str) -> Option<String> {
    if MODULE_VERSION.is_match(content) {
        return Some(
            MODULE_VERSION
                .replace(content, |caps: &Captures<'_>| {
                    format!("{}{}{}", &caps["module"], &caps["sep"], version)
                })
                .into_owned(),
        );
    }
    let module = MODULE_LINE.find(content)?;
    Some(format!(
        "{} // version {}{}",
        &content[..module.end()],
        version,
        &content[module.end()..]
    ))
}

/// Replace `Version = "..."`, or declare `var Version` after the package
/// clause.
pub fn set_version_decl(content: &str, version: &str) -> String {
    if VERSION_DECL.is_match(content) {
        return VERSION_DECL
            .replace(content, |caps: &Captures<'_>| {
                format!("{}{}{}", &caps["head"], version, &caps["tail"])
            })
            .into_owned();
    }
    match PACKAGE_CLAUSE.find(content) {
        Some(package) => format!(
            "{}\n\nvar Version = \"{}\"{}",
            &content[..package.end()],
            version,
            &content[package.end()..]
        ),
        None => format!("var Version = \"{}\"\n{}", version, content),
    }
}

impl VersionHandler for GoHandler {
    fn extract(&self, path: &Path) -> Result<StoredVersions> {
        let content = read_text(path)?;
        let version = if file_name(path) == "go.mod" {
            MODULE_VERSION
                .captures(&content)
                .map(|caps| caps["value"].trim().to_string())
        } else {
            VERSION_DECL
                .captures(&content)
                .map(|caps| caps["value"].to_string())
        };
        Ok(version.map(StoredVersions::single).unwrap_or_default())
    }

    fn apply(&self, path: &Path, set: &VersionedSet, suffix: Option<&str>) -> Result<()> {
        let content = read_text(path)?;
        let version = text_version(set, suffix);
        let updated = if file_name(path) == "go.mod" {
            match set_module_version(&content, &version) {
                Some(updated) => updated,
                None => {
                    warn!(file = %path.display(), "go.mod has no module line");
                    return Ok(());
                }
            }
        } else {
            set_version_decl(&content, &version)
        };
        if write_if_changed(path, &content, &updated)? {
            info!(file = %path.display(), %version, "Updated Go version");
        }
        Ok(())
    }
}
