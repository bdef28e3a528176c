//! NuGet `.nuspec` manifests.
//!
//! Only `package/metadata/version` is touched. Manifests whose file name
//! embeds a version (`Lib.1.0.0.nuspec`) are renamed to carry the new one.

use std::fs;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::LazyLock;

use anyhow::{
    Context,
    Result,
};
use regex::Regex;
use tracing::{
    debug,
    info,
    warn,
};

use super::xml::{
    Document,
    Element,
};
use super::{
    StoredVersions,
    VersionHandler,
    file_name,
    text_version,
};
use crate::pattern::VersionedSet;

/// A version token inside a file stem, introduced by `.` or `-`.
static STEM_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[.\-](?P<version>(?:0|[1-9]\d*)(?:\.(?:0|[1-9]\d*)){1,3})").unwrap()
});

pub struct NuSpecHandler {
    enabled: bool,
    create_missing: bool,
}

impl NuSpecHandler {
    /// `enabled` mirrors the `AssemblyVersionSet` flag; `create_missing` adds
    /// a `<version>` element to manifests that lack one.
    pub fn new(enabled: bool, create_missing: bool) -> Self {
        Self {
            enabled,
            create_missing,
        }
    }
}

/// File name with the embedded version replaced, or `None` when the stem
/// carries no version.
pub fn versioned_file_name(file_name: &str, version: &str) -> Option<String> {
    let (stem, extension) = match file_name.rsplit_once('.') {
        Some((stem, extension)) => (stem, Some(extension)),
        None => (file_name, None),
    };
    let token = STEM_VERSION.captures(stem)?.name("version")?;
    let renamed = format!("{}{}{}", &stem[..token.start()], version, &stem[token.end()..]);
    Some(match extension {
        Some(extension) => format!("{}.{}", renamed, extension),
        None => renamed,
    })
}

/// Move `path` to the versioned file name. Returns the new path, or `None`
/// when nothing was renamed.
fn rename_versioned(path: &Path, version: &str) -> Result<Option<PathBuf>> {
    let Some(new_name) = versioned_file_name(&file_name(path), version) else {
        return Ok(None);
    };
    let target = path.with_file_name(&new_name);
    if target == path {
        return Ok(None);
    }
    if target.exists() {
        fs::remove_file(&target)
            .with_context(|| format!("Failed to replace {}", target.display()))?;
    }
    fs::rename(path, &target)
        .with_context(|| format!("Failed to rename {} to {}", path.display(), new_name))?;
    Ok(Some(target))
}

fn metadata<'d>(doc: &'d Document, path: &Path) -> Result<&'d Element> {
    doc.root()
        .child("metadata")
        .with_context(|| format!("{} has no <metadata> element", path.display()))
}

impl VersionHandler for NuSpecHandler {
    fn extract(&self, path: &Path) -> Result<StoredVersions> {
        let doc = Document::load(path)?;
        let version = metadata(&doc, path)?.child("version").map(Element::text);
        Ok(StoredVersions {
            assembly_version: version,
            ..StoredVersions::default()
        })
    }

    fn apply(&self, path: &Path, set: &VersionedSet, suffix: Option<&str>) -> Result<()> {
        if !self.enabled {
            debug!(file = %path.display(), "Assembly version updates disabled, skipping nuspec");
            return Ok(());
        }
        let mut doc = Document::load(path)?;
        metadata(&doc, path)?;
        let version = text_version(set, suffix);

        let (root, layout) = doc.root_and_layout();
        let metadata = root
            .child_mut("metadata")
            .context("nuspec has no <metadata> element")?;
        match metadata.child_mut("version") {
            Some(element) => element.set_text(&version),
            None if self.create_missing => {
                metadata.insert_after("id", Element::with_text("version", &version), 1, layout);
            }
            None => {
                warn!(file = %path.display(), "nuspec has no <version> element");
                return Ok(());
            }
        }
        root.prune_empty_leaves();
        doc.save_with_backup(path)?;
        info!(file = %path.display(), %version, "Updated nuspec version");

        if let Some(renamed) = rename_versioned(path, &set.assembly_version)? {
            info!(from = %path.display(), to = %renamed.display(), "Renamed nuspec");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const NUSPEC: &str = r#"<?xml version="1.0"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>Contoso.Lib</id>
    <version>1.0.0</version>
    <authors>Contoso</authors>
  </metadata>
</package>
"#;

    fn set() -> VersionedSet {
        VersionedSet::new("25.10.3", "25.10.3+abc", "25.10.3", "", "", "abc")
    }

    #[test]
    fn test_versioned_file_name() {
        assert_eq!(
            versioned_file_name("Contoso.Lib.1.0.0.nuspec", "25.10.3").as_deref(),
            Some("Contoso.Lib.25.10.3.nuspec")
        );
        assert_eq!(
            versioned_file_name("tool-2.1.nuspec", "25.10.3").as_deref(),
            Some("tool-25.10.3.nuspec")
        );
        assert_eq!(versioned_file_name("Contoso.Lib.nuspec", "25.10.3"), None);
        assert_eq!(versioned_file_name("lib2.nuspec", "25.10.3"), None);
    }

    #[test]
    fn test_updates_namespaced_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Contoso.Lib.nuspec");
        fs::write(&path, NUSPEC).unwrap();

        let handler = NuSpecHandler::new(true, false);
        assert_eq!(
            handler.extract(&path).unwrap().assembly_version.as_deref(),
            Some("1.0.0")
        );
        handler.apply(&path, &set(), Some("rc1")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            NUSPEC.replace("<version>1.0.0</version>", "<version>25.10.3-rc1</version>")
        );
    }

    #[test]
    fn test_missing_version_created_only_when_asked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkg.nuspec");
        let without = NUSPEC.replace("    <version>1.0.0</version>\n", "");
        fs::write(&path, &without).unwrap();

        NuSpecHandler::new(true, false).apply(&path, &set(), None).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), without);

        NuSpecHandler::new(true, true).apply(&path, &set(), None).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), NUSPEC.replace("1.0.0", "25.10.3"));
    }

    #[test]
    fn test_versioned_manifest_is_renamed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Contoso.Lib.1.0.0.nuspec");
        fs::write(&path, NUSPEC).unwrap();

        NuSpecHandler::new(true, false).apply(&path, &set(), None).unwrap();
        assert!(!path.exists());
        assert!(dir.path().join("Contoso.Lib.25.10.3.nuspec").is_file());
    }

    #[test]
    fn test_disabled_handler_leaves_file_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkg.nuspec");
        fs::write(&path, NUSPEC).unwrap();
        NuSpecHandler::new(false, true).apply(&path, &set(), None).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), NUSPEC);
    }
}
