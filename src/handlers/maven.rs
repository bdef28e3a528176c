//! Maven `pom.xml` files.
//!
//! Only the project's own `<version>` (a direct child of `<project>`) is
//! touched; `<parent><version>` and dependency versions are left alone.
//! Element names are matched by local name, so namespaced and plain POMs
//! behave the same.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use super::xml::{
    Document,
    Element,
};
use super::{
    StoredVersions,
    VersionHandler,
    text_version,
};
use crate::pattern::VersionedSet;

pub struct MavenHandler;

fn project_root<'d>(doc: &'d Document, path: &Path) -> Result<&'d Element> {
    let root = doc.root();
    if !root.is("project") {
        anyhow::bail!("{} is not a Maven POM (root is <{}>)", path.display(), root.name);
    }
    Ok(root)
}

impl VersionHandler for MavenHandler {
    fn extract(&self, path: &Path) -> Result<StoredVersions> {
        let doc = Document::load(path)?;
        let version = project_root(&doc, path)?
            .child("version")
            .map(|e| e.text().trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(version.map(StoredVersions::single).unwrap_or_default())
    }

    fn apply(&self, path: &Path, set: &VersionedSet, suffix: Option<&str>) -> Result<()> {
        let mut doc = Document::load(path)?;
        project_root(&doc, path)?;
        let version = text_version(set, suffix);

        let (project, layout) = doc.root_and_layout();
        match project.child_mut("version") {
            Some(element) => element.set_text(&version),
            None => {
                let element = Element::with_text("version", &version);
                project.insert_after("artifactId", element, 0, layout)
            }
        }
        doc.save_with_backup(path)?;
        info!(file = %path.display(), %version, "Updated Maven version");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    const POM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
    <modelVersion>4.0.0</modelVersion>
    <parent>
        <groupId>org.example</groupId>
        <artifactId>parent</artifactId>
        <version>7</version>
    </parent>
    <artifactId>app</artifactId>
    <version>1.0-SNAPSHOT</version>
</project>
"#;

    fn write_pom(content: &str) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pom.xml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    fn set(version: &str) -> VersionedSet {
        VersionedSet::new(version, version, version, "", "", "")
    }

    #[test]
    fn test_project_version_replaced_parent_untouched() {
        let (_dir, path) = write_pom(POM);
        assert_eq!(
            MavenHandler.extract(&path).unwrap(),
            StoredVersions::single("1.0-SNAPSHOT")
        );

        MavenHandler.apply(&path, &set("25.10.12"), None).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            POM.replace("<version>1.0-SNAPSHOT</version>", "<version>25.10.12</version>")
        );
        assert!(path.with_file_name("pom.xml.bak").is_file());
    }

    #[test]
    fn test_missing_version_added_after_artifact_id() {
        let (_dir, path) = write_pom(&POM.replace("    <version>1.0-SNAPSHOT</version>\n", ""));
        MavenHandler.apply(&path, &set("2.0.0"), Some("beta")).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            POM.replace("1.0-SNAPSHOT", "2.0.0-beta")
        );
    }

    #[test]
    fn test_non_pom_is_rejected() {
        let (_dir, path) = write_pom("<settings/>");
        assert!(MavenHandler.extract(&path).is_err());
    }
}
