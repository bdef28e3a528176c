//! CI parameter lines.
//!
//! Results are reported as TeamCity service messages on stdout:
//!
//! ```text
//! ##teamcity[setParameter name='env.BuildLabel' value='REV_20251014_0930_abc1234']
//! ```
//!
//! Parameters are collected during a run and printed together at the end,
//! so logs on stderr never interleave with them.

use std::io::Write;

use anyhow::{
    Context,
    Result,
};
use serde::Serialize;
use tracing::debug;

use crate::pattern::VersionedSet;

pub const BUILD_LABEL: &str = "env.BuildLabel";
pub const ARTIFACT_VERSION: &str = "env.ArtifactVersion";
pub const BUILD_NUSPEC_VERSION: &str = "env.BuildNuspecVersion";
pub const DOCKER_BUILD_LABEL: &str = "env.DockerBuildLabel";
pub const ALL_BUILD_LABEL: &str = "env.allBuildLabel";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CiParameter {
    pub name: String,
    pub value: String,
}

impl CiParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn service_message(&self) -> String {
        format!(
            "##teamcity[setParameter name='{}' value='{}']",
            escape_value(&self.name),
            escape_value(&self.value)
        )
    }
}

/// Escape a value for a TeamCity service message.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '|' => out.push_str("||"),
            '\'' => out.push_str("|'"),
            '[' => out.push_str("|["),
            ']' => out.push_str("|]"),
            '\n' => out.push_str("|n"),
            '\r' => out.push_str("|r"),
            c => out.push(c),
        }
    }
    out
}

/// Parameter-name form of an artifact directory relative to the working
/// folder: `/` becomes `_`, and the folder itself is `.`.
pub fn parameter_dir(relative_dir: &str) -> String {
    let trimmed = relative_dir.trim_matches('/');
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        trimmed.replace('/', "_")
    }
}

#[derive(Debug, Clone, Default)]
pub struct CiOutput {
    parameters: Vec<CiParameter>,
}

impl CiOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let parameter = CiParameter::new(name, value);
        debug!(name = %parameter.name, value = %parameter.value, "CI parameter");
        self.parameters.push(parameter);
    }

    /// `Version.<dir>`, plus `VersionInfo.<dir>` and `VersionFile.<dir>`
    /// unless the artifact is an npm package.
    pub fn project_versions(&mut self, relative_dir: &str, set: &VersionedSet, npm: bool) {
        let dir = parameter_dir(relative_dir);
        self.push(format!("Version.{}", dir), set.assembly_version.as_str());
        if !npm {
            self.push(format!("VersionInfo.{}", dir), set.assembly_info_version.as_str());
            self.push(format!("VersionFile.{}", dir), set.assembly_file_version.as_str());
        }
    }

    pub fn parameters(&self) -> &[CiParameter] {
        &self.parameters
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .rev()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    pub fn lines(&self) -> Vec<String> {
        self.parameters.iter().map(CiParameter::service_message).collect()
    }

    pub fn emit(&self, out: &mut impl Write) -> Result<()> {
        for line in self.lines() {
            writeln!(out, "{}", line).context("Failed to write CI output")?;
        }
        out.flush().context("Failed to flush CI output")
    }

    /// Every parameter as `name=value`, joined with `|`.
    pub fn all_build_label(&self) -> String {
        self.parameters
            .iter()
            .map(|p| format!("{}={}", p.name, p.value))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Export the labels to this process's environment for debugging
    /// runs.
    pub fn export_debug_env(&self) {
        let mut exported = Vec::new();
        if let Some(label) = self.value(BUILD_LABEL) {
            exported.push((BUILD_LABEL, label.to_string()));
        }
        if let Some(label) = self.value(DOCKER_BUILD_LABEL) {
            exported.push((DOCKER_BUILD_LABEL, label.to_string()));
        }
        exported.push((ALL_BUILD_LABEL, self.all_build_label()));
        for (name, value) in exported {
            debug!(name, %value, "Exporting debug environment variable");
            // SAFETY: called from the main thread after all pipeline work is
            // done and before the webhook runtime starts.
            unsafe { std::env::set_var(name, value) };
        }
    }
}
