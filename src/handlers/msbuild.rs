//! SDK-style `.csproj` and `.props` files.
//!
//! Version fields live in an unconditioned `<PropertyGroup>`. A rewrite:
//!
//! 1. strips `Version`, `FileVersion`, `AssemblyVersion` and `Description`
//!    from every conditioned group;
//! 2. removes the fields that are about to be rewritten (per the config
//!    flags) and any `PackageVersion`;
//! 3. writes the new fields into the first unconditioned group, creating one
//!    when the project has none;
//! 4. prunes elements left empty and saves, keeping a `.bak` copy.
//!
//! With a prerelease suffix, `VersionPrefix`/`VersionSuffix` are written in
//! place of `Version`.

use std::path::Path;

use anyhow::{
    Context,
    Result,
};
use tracing::{
    debug,
    info,
};

use super::xml::{
    Document,
    Element,
    Layout,
};
use super::{
    StoredVersions,
    VersionHandler,
};
use crate::config::{
    DEFAULT_VERSION,
    VersioningConfig,
};
use crate::pattern::VersionedSet;

pub(crate) const PROPERTY_GROUP: &str = "PropertyGroup";
const CONDITION: &str = "Condition";

/// Fields that never belong in a conditioned group.
const CONDITIONED_FIELDS: [&str; 4] = ["Version", "FileVersion", "AssemblyVersion", "Description"];

/// Fields whose presence counts as "the project is versioned".
const VERSION_FIELDS: [&str; 4] = [
    "Version",
    "AssemblyVersion",
    "FileVersion",
    "AssemblyInformationalVersion",
];

/// Fields seeded into a project that declares none.
const SEEDED_FIELDS: [&str; 3] = ["Version", "AssemblyVersion", "FileVersion"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectKind {
    Sdk,
    Props,
}

/// Whether the project's root element carries an `Sdk` attribute.
pub fn is_sdk_project(path: &Path) -> Result<bool> {
    let doc = Document::load(path)?;
    Ok(doc.root().is("Project") && doc.root().attribute("Sdk").is_some())
}

pub struct MsBuildHandler<'a> {
    config: &'a VersioningConfig,
    kind: ProjectKind,
}

impl<'a> MsBuildHandler<'a> {
    pub fn new(config: &'a VersioningConfig, kind: ProjectKind) -> Self {
        Self { config, kind }
    }

    /// Fields removed from unconditioned groups before the rewrite.
    fn replaced_fields(&self) -> Vec<&'static str> {
        let mut fields = vec!["PackageVersion"];
        if self.config.assembly_info_version_set {
            fields.push("Version");
        }
        if self.config.assembly_version_set {
            fields.extend(["AssemblyVersion", "VersionPrefix", "VersionSuffix"]);
        }
        if self.config.assembly_file_version_set {
            fields.push("FileVersion");
        }
        if self.config.hash_as_description {
            fields.push("Description");
        }
        fields
    }

    /// New field elements, in the order they are written.
    fn new_fields(&self, set: &VersionedSet, suffix: Option<&str>) -> Vec<Element> {
        let config = self.config;
        let mut fields = Vec::new();
        match suffix.filter(|s| !s.is_empty()) {
            None => {
                if config.assembly_info_version_set {
                    fields.push(Element::with_text("Version", &set.assembly_info_version));
                }
            }
            Some(suffix) => {
                if config.assembly_version_set {
                    fields.push(Element::with_text("VersionPrefix", &set.assembly_version));
                    fields.push(Element::with_text("VersionSuffix", suffix));
                }
            }
        }
        if config.assembly_version_set {
            fields.push(Element::with_text("AssemblyVersion", &set.assembly_version));
        }
        if config.assembly_file_version_set {
            fields.push(Element::with_text("FileVersion", &set.assembly_file_version));
        }
        if config.hash_as_description {
            fields.push(Element::with_text("Description", &set.description));
        }
        fields
    }
}

pub(crate) fn is_conditioned(group: &Element) -> bool {
    group.attribute(CONDITION).is_some()
}

fn unconditioned_groups(project: &Element) -> impl Iterator<Item = &Element> {
    project
        .elements()
        .filter(|e| e.is(PROPERTY_GROUP) && !is_conditioned(e))
}

/// First unconditioned `PropertyGroup`, appended to the project when there
/// is none.
pub(crate) fn first_unconditioned_group<'e>(
    project: &'e mut Element,
    layout: &Layout,
) -> Result<&'e mut Element> {
    let exists = project
        .elements()
        .any(|e| e.is(PROPERTY_GROUP) && !is_conditioned(e));
    if !exists {
        debug!("Creating PropertyGroup for version fields");
        project.append_child(Element::new(PROPERTY_GROUP), 0, layout);
    }
    project
        .elements_mut()
        .find(|e| e.is(PROPERTY_GROUP) && !is_conditioned(e))
        .context("Project has no unconditioned PropertyGroup")
}

fn project_root<'d>(doc: &'d Document, path: &Path) -> Result<&'d Element> {
    let root = doc.root();
    if !root.is("Project") {
        anyhow::bail!("{} has no <Project> root element", path.display());
    }
    Ok(root)
}

impl VersionHandler for MsBuildHandler<'_> {
    fn extract(&self, path: &Path) -> Result<StoredVersions> {
        let doc = Document::load(path)?;
        let project = project_root(&doc, path)?;

        let mut stored = StoredVersions::default();
        for group in unconditioned_groups(project) {
            let read = |name: &str| group.child(name).map(Element::text);
            if let Some(v) = read("Version") {
                stored.info_version = Some(v);
            }
            if let Some(v) = read("AssemblyVersion") {
                stored.assembly_version = Some(v);
            }
            if let Some(v) = read("FileVersion") {
                stored.file_version = Some(v);
            }
            if let Some(v) = read("Description") {
                stored.description = Some(v);
            }
        }
        debug!(file = %path.display(), kind = ?self.kind, ?stored, "Extracted project versions");
        Ok(stored)
    }

    fn apply(&self, path: &Path, set: &VersionedSet, suffix: Option<&str>) -> Result<()> {
        let mut doc = Document::load(path)?;
        project_root(&doc, path)?;

        let replaced = self.replaced_fields();
        let new_fields = self.new_fields(set, suffix);
        let (project, layout) = doc.root_and_layout();

        for group in project.elements_mut().filter(|e| e.is(PROPERTY_GROUP)) {
            let fields: &[&str] = if is_conditioned(group) {
                &CONDITIONED_FIELDS
            } else {
                &replaced
            };
            for field in fields {
                group.remove_children(field);
            }
        }

        let group = first_unconditioned_group(project, layout)?;
        for field in new_fields {
            group.append_child(field, 1, layout);
        }

        let pruned = project.prune_empty_leaves();
        debug!(pruned, "Pruned empty elements");
        doc.save_with_backup(path)?;
        info!(file = %path.display(), version = %set.assembly_version, "Updated project versions");
        Ok(())
    }

    fn ensure_version_fields(&self, path: &Path) -> Result<bool> {
        let mut doc = Document::load(path)?;
        let project = project_root(&doc, path)?;

        let versioned = unconditioned_groups(project).any(|group| {
            VERSION_FIELDS.iter().any(|f| group.child(f).is_some())
                || (group.child("VersionPrefix").is_some()
                    && group.child("VersionSuffix").is_some())
        });
        if versioned {
            return Ok(false);
        }

        info!(
            file = %path.display(),
            kind = ?self.kind,
            default = DEFAULT_VERSION,
            "Adding missing version properties"
        );
        let (project, layout) = doc.root_and_layout();
        let group = first_unconditioned_group(project, layout)?;
        for field in SEEDED_FIELDS {
            group.append_child(Element::with_text(field, DEFAULT_VERSION), 1, layout);
        }
        doc.save_with_backup(path)?;
        Ok(true)
    }
}
