//! Per-format version handlers.
//!
//! Every artifact kind has one [`VersionHandler`]: it reads the versions a
//! file currently stores, writes a computed [`VersionedSet`] back, and can
//! seed missing version fields. Handlers touch only the version-bearing
//! parts of a file; everything else is written back unchanged.
//!
//! [`handler_for`] picks the handler for a discovered artifact with a plain
//! `match` on its kind.

use std::fs;
use std::path::Path;

use anyhow::{
    Context,
    Result,
};

use crate::config::VersioningConfig;
use crate::discovery::{
    ArtifactInfo,
    ArtifactKind,
};
use crate::pattern::VersionedSet;

pub mod assembly_info;
pub mod cargo;
pub mod docker;
pub mod go;
pub mod maven;
pub mod msbuild;
pub mod npm;
pub mod nuspec;
pub mod python;
pub mod xml;
pub mod yaml;

/// Versions found in a file before it is rewritten.
///
/// `None` means the file does not declare that field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredVersions {
    pub assembly_version: Option<String>,
    pub file_version: Option<String>,
    pub info_version: Option<String>,
    pub description: Option<String>,
}

impl StoredVersions {
    /// The same version in all three fields.
    pub fn single(version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            assembly_version: Some(version.clone()),
            file_version: Some(version.clone()),
            info_version: Some(version),
            description: None,
        }
    }
}

/// Extract, patch and seed version fields of one file format.
pub trait VersionHandler {
    /// Versions currently stored in `path`.
    fn extract(&self, path: &Path) -> Result<StoredVersions>;

    /// Write `set` into `path`. `suffix` is an already sanitized prerelease
    /// suffix.
    fn apply(&self, path: &Path, set: &VersionedSet, suffix: Option<&str>) -> Result<()>;

    /// Add default version fields when the file has none. Returns whether
    /// the file was changed.
    fn ensure_version_fields(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }
}

/// How a handler is being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Each artifact computes its own version.
    Single,
    /// One version is broadcast to the whole tree.
    Global,
}

/// Choose the handler for `artifact`.
///
/// `.csproj` files are split between SDK-style projects (edited as MSBuild
/// XML) and legacy projects (versioned through their AssemblyInfo file).
pub fn handler_for<'a>(
    artifact: &ArtifactInfo,
    config: &'a VersioningConfig,
    mode: Mode,
) -> Result<Box<dyn VersionHandler + 'a>> {
    let handler: Box<dyn VersionHandler + 'a> = match artifact.kind {
        ArtifactKind::DotNet => {
            if msbuild::is_sdk_project(&artifact.file_path)? {
                Box::new(msbuild::MsBuildHandler::new(config, msbuild::ProjectKind::Sdk))
            } else {
                Box::new(assembly_info::AssemblyInfoHandler::new(&config.assembly_info_file))
            }
        }
        ArtifactKind::Props => {
            Box::new(msbuild::MsBuildHandler::new(config, msbuild::ProjectKind::Props))
        }
        ArtifactKind::NuGet => Box::new(nuspec::NuSpecHandler::new(
            config.assembly_version_set,
            mode == Mode::Global,
        )),
        ArtifactKind::Npm => Box::new(npm::NpmHandler),
        ArtifactKind::Docker => Box::new(docker::DockerHandler::new(
            artifact.meta("Type") == Some("DockerCompose"),
        )),
        ArtifactKind::Python => Box::new(python::PythonHandler),
        ArtifactKind::Go => Box::new(go::GoHandler),
        ArtifactKind::Rust => Box::new(cargo::CargoHandler),
        ArtifactKind::Java => Box::new(maven::MavenHandler),
        ArtifactKind::Helm => Box::new(yaml::YamlHandler::chart()),
        ArtifactKind::Yaml => Box::new(yaml::YamlHandler::generic()),
    };
    Ok(handler)
}

/// The version text-based formats store: the assembly version plus the
/// prerelease suffix.
pub(crate) fn text_version(set: &VersionedSet, suffix: Option<&str>) -> String {
    crate::pattern::with_suffix(&set.assembly_version, suffix)
}

pub(crate) fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Write `content` when it differs from `original`. Returns whether the
/// file was written.
pub(crate) fn write_if_changed(path: &Path, original: &str, content: &str) -> Result<bool> {
    if original == content {
        return Ok(false);
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

/// File name of `path` as a string, empty when it has none.
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
