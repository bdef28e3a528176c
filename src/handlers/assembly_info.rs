//! `AssemblyInfo.cs` attributes of legacy (non-SDK) projects.
//!
//! The project file itself is left alone. Versions live in attribute lines
//! such as
//!
//! ```text
//! [assembly: AssemblyVersion("1.0.0.0")]
//! [assembly: System.Reflection.AssemblyInformationalVersionAttribute(@"1.0.0.0+abc")]
//! ```
//!
//! Only the version token inside the quotes is replaced; anything after it
//! on the same line stays as it was.

use std::path::{
    Path,
    PathBuf,
};
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
    write_if_changed,
};
use crate::pattern::{
    VersionedSet,
    with_suffix,
};

const ATTRIBUTE_PATTERN: &str = concat!(
    r#"(?m)(^\s*\[\s*assembly\s*:\s*"#,
    r#"((System\s*\.)?\s*Reflection\s*\.)?\s*TYPE(Attribute)?\s*\(\s*@?")"#,
    r#"(?P<version>(([0-9\*])+\.?)+(\W(\w)+)?)"#,
    r#"(?P<rest>.+)?("\s*\)\s*\])"#,
);

fn attribute_regex(attribute: &str) -> Regex {
    Regex::new(&ATTRIBUTE_PATTERN.replace("TYPE", attribute))
        .unwrap_or_else(|e| panic!("invalid {} pattern: {}", attribute, e))
}

static FILE_VERSION: LazyLock<Regex> = LazyLock::new(|| attribute_regex("AssemblyFileVersion"));
static INFO_VERSION: LazyLock<Regex> =
    LazyLock::new(|| attribute_regex("AssemblyInformationalVersion"));
static ASSEMBLY_VERSION: LazyLock<Regex> = LazyLock::new(|| attribute_regex("AssemblyVersion"));

/// Version token of the first matching attribute line.
fn find_version(regex: &Regex, content: &str) -> Option<String> {
    regex
        .captures(content)
        .and_then(|caps| caps.name("version"))
        .map(|m| m.as_str().to_string())
}

/// Replace the version token of every matching attribute line.
pub fn replace_version(regex: &Regex, content: &str, version: &str) -> String {
    regex
        .replace_all(content, |caps: &Captures<'_>| {
            let (Some(whole), Some(token)) = (caps.get(0), caps.name("version")) else {
                return caps.get(0).map_or(String::new(), |m| m.as_str().to_string());
            };
            format!(
                "{}{}{}",
                &content[whole.start()..token.start()],
                version,
                &content[token.end()..whole.end()]
            )
        })
        .into_owned()
}

/// Rewrite all three attributes. The suffix only goes on the informational
/// version.
pub fn rewrite(content: &str, set: &VersionedSet, suffix: Option<&str>) -> String {
    let content = replace_version(&ASSEMBLY_VERSION, content, &set.assembly_version);
    let content = replace_version(
        &INFO_VERSION,
        &content,
        &with_suffix(&set.assembly_info_version, suffix),
    );
    replace_version(&FILE_VERSION, &content, &set.assembly_file_version)
}

pub struct AssemblyInfoHandler {
    relative: String,
}

impl AssemblyInfoHandler {
    /// `relative` is the AssemblyInfo path relative to the project
    /// directory.
    pub fn new(relative: &str) -> Self {
        Self {
            relative: relative.replace('\\', "/"),
        }
    }

    /// AssemblyInfo file belonging to the project at `project_path`.
    pub fn assembly_info_path(&self, project_path: &Path) -> PathBuf {
        project_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&self.relative)
    }
}

impl VersionHandler for AssemblyInfoHandler {
    fn extract(&self, path: &Path) -> Result<StoredVersions> {
        let file = self.assembly_info_path(path);
        if !file.is_file() {
            warn!(file = %file.display(), "AssemblyInfo file not found");
            return Ok(StoredVersions::default());
        }
        let content = read_text(&file)?;
        Ok(StoredVersions {
            assembly_version: find_version(&ASSEMBLY_VERSION, &content),
            file_version: find_version(&FILE_VERSION, &content),
            info_version: find_version(&INFO_VERSION, &content),
            description: None,
        })
    }

    fn apply(&self, path: &Path, set: &VersionedSet, suffix: Option<&str>) -> Result<()> {
        let file = self.assembly_info_path(path);
        if !file.is_file() {
            warn!(file = %file.display(), "AssemblyInfo file not found, nothing to update");
            return Ok(());
        }
        let content = read_text(&file)?;
        if write_if_changed(&file, &content, &rewrite(&content, set, suffix))? {
            info!(file = %file.display(), version = %set.assembly_version, "Updated AssemblyInfo");
        }
        Ok(())
    }
}
