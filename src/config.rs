//! Configuration files read at the start of a run.
//!
//! Three JSON documents shape a run:
//!
//! - the versioning configuration (`--config-file`): a `Default` entry plus
//!   per-project `Items` carrying template strings and field flags;
//! - `ProjectOverride.json` in the working folder, pinning
//!   `Major`/`Minor`/`Patch`/`Hotfix`;
//! - the custom project settings (`--custom-project-config`), widening the
//!   history scope of individual projects to extra directories.
//!
//! # Configuration format
//!
//! ```json
//! {
//!   "Default": { "HashAsDescription": false },
//!   "Items": [
//!     {
//!       "ProjectFile": "src/Api/Api.csproj",
//!       "AssemblyVersionFormat": "{0}.{1}.0.0",
//!       "Directories": ["src/Api", "src/Shared"]
//!     }
//!   ]
//! }
//! ```
//!
//! Keys missing from an item are taken from `Default`; keys missing from
//! `Default` are the built-in defaults.

use std::fs;
use std::path::{
    Path,
    PathBuf,
};

use anyhow::{
    Context,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use tracing::{
    debug,
    info,
    warn,
};

use crate::error::FatalError;

/// Name of the override file looked up in the working folder.
pub const OVERRIDE_FILE_NAME: &str = "ProjectOverride.json";

/// Version used for any field a project does not declare yet.
pub const DEFAULT_VERSION: &str = "1.0.0.0";

const FLAG_KEYS: [&str; 4] = [
    "AssemblyVersionSet",
    "AssemblyFileVersionSet",
    "AssemblyInfoVersionSet",
    "HashAsDescription",
];

const FORMAT_KEYS: [&str; 3] = [
    "AssemblyVersionFormat",
    "AssemblyFileVersionFormat",
    "AssemblyInfoVersionFormat",
];

/// Templates and flags for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VersioningConfig {
    pub assembly_info_file: String,

    pub assembly_file_version_set: bool,
    pub assembly_file_version_format: String,
    pub assembly_file_version_format_override: String,

    pub assembly_version_set: bool,
    pub assembly_version_format: String,
    pub assembly_version_format_override: String,

    #[serde(rename = "AssemblyVersionFormatJS")]
    pub assembly_version_format_js: String,
    #[serde(rename = "AssemblyVersionFormatJSOverride")]
    pub assembly_version_format_js_override: String,

    pub assembly_info_version_set: bool,
    pub assembly_info_version_format: String,
    pub assembly_info_version_format_override: String,

    pub hash_as_description: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_file: Option<String>,

    pub directories: Vec<String>,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            assembly_info_file: "Properties/AssemblyInfo.cs".to_string(),
            assembly_file_version_set: true,
            assembly_file_version_format: "*.{0:00}{1:00}.{5}.{2}".to_string(),
            assembly_file_version_format_override: "{0:00}.{1:00}.{5}.{2}".to_string(),
            assembly_version_set: true,
            assembly_version_format: "*.{0:00}{1:00}.{5}.{2}".to_string(),
            assembly_version_format_override: "{0:00}.{1:00}.{5}.{2}".to_string(),
            assembly_version_format_js: "*.{0:00}{1:00}.{2}".to_string(),
            assembly_version_format_js_override: "{0:00}.{1:00}.{2}".to_string(),
            assembly_info_version_set: true,
            assembly_info_version_format: "*.{0:00}{1:00}.{5}.{2}+{3}".to_string(),
            assembly_info_version_format_override: "{0:00}.{1:00}.{5}.{2}+{3}".to_string(),
            hash_as_description: true,
            project_file: None,
            directories: Vec::new(),
        }
    }
}

/// The whole versioning configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VersioningConfigFile {
    pub default: VersioningConfig,
    pub items: Vec<VersioningConfig>,
}

impl VersioningConfigFile {
    /// Parse, validate and default-fill a configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut value: Value = serde_json::from_str(json)
            .map_err(|e| FatalError::InvalidConfig(format!("Invalid JSON format: {}", e)))?;

        let report = validate(&value);
        for warning in &report.warnings {
            warn!("Configuration: {}", warning);
        }
        if !report.errors.is_empty() {
            return Err(FatalError::InvalidConfig(report.errors.join("; ")).into());
        }

        fill_items_with_defaults(&mut value)?;
        let config = serde_json::from_value(value)
            .map_err(|e| FatalError::InvalidConfig(e.to_string()))?;
        Ok(config)
    }

    /// Load the configuration file, or the built-in defaults without one.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("No configuration file given, using defaults");
            return Ok(Self::default());
        };
        if !path.is_file() {
            return Err(FatalError::InvalidConfig(format!(
                "Configuration file not found: {}",
                path.display()
            ))
            .into());
        }
        info!(path = %path.display(), "Loading configuration");
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Configuration for the project at `relative_path`.
    ///
    /// The first item whose `ProjectFile` equals the path (ignoring case)
    /// wins; otherwise the default entry is used.
    pub fn resolve(&self, relative_path: &str) -> VersioningConfig {
        let mut config = self
            .items
            .iter()
            .find(|item| {
                item.project_file
                    .as_deref()
                    .is_some_and(|p| p.eq_ignore_ascii_case(relative_path))
            })
            .unwrap_or(&self.default)
            .clone();
        config.project_file = Some(relative_path.to_string());
        config
    }
}

/// Problems found while validating a configuration document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check the raw configuration before deserializing it.
pub fn validate(value: &Value) -> ConfigValidation {
    let mut report = ConfigValidation::default();
    let Some(root) = value.as_object() else {
        report.errors.push("Configuration must be a JSON object".to_string());
        return report;
    };

    for key in root.keys() {
        if key != "Default" && key != "Items" {
            report.warnings.push(format!(
                "Unknown configuration key: '{}'. Allowed keys: Default, Items",
                key
            ));
        }
    }

    if let Some(default) = root.get("Default") {
        validate_entry(default, "Default", &mut report);
    }
    if let Some(items) = root.get("Items").and_then(Value::as_array) {
        for (i, item) in items.iter().enumerate() {
            validate_entry(item, &format!("Items[{}]", i), &mut report);
        }
    }
    report
}

fn validate_entry(entry: &Value, path: &str, report: &mut ConfigValidation) {
    let Some(obj) = entry.as_object() else {
        report.errors.push(format!("{}: Expected object", path));
        return;
    };

    for key in FORMAT_KEYS {
        let Some(format) = obj.get(key) else {
            continue;
        };
        let format = format.as_str().unwrap_or_default();
        if format.trim().is_empty() {
            report
                .warnings
                .push(format!("{}.{}: Format string is empty", path, key));
        } else if !["{0}", "{1}", "{2}"].iter().any(|p| format.contains(p)) {
            report.warnings.push(format!(
                "{}.{}: Format string may not contain version placeholders ({{0}}, {{1}}, {{2}})",
                path, key
            ));
        }
    }

    for key in FLAG_KEYS {
        if let Some(flag) = obj.get(key)
            && !flag.is_boolean()
        {
            report.errors.push(format!(
                "{}.{}: Expected boolean value, got {}",
                path, key, flag
            ));
        }
    }

    if let Some(file) = obj.get("AssemblyInfoFile").and_then(Value::as_str)
        && file.contains(['<', '>', '|', '?', '*'])
    {
        report.warnings.push(format!(
            "{}.AssemblyInfoFile: Contains potentially invalid characters (<, >, |, ?, *)",
            path
        ));
    }
}

/// Copy every key missing from an `Items` entry out of `Default`.
fn fill_items_with_defaults(value: &mut Value) -> Result<()> {
    let default: VersioningConfig = match value.get("Default") {
        Some(default) => serde_json::from_value(default.clone())
            .map_err(|e| FatalError::InvalidConfig(format!("Default: {}", e)))?,
        None => VersioningConfig::default(),
    };
    let Value::Object(default_map) = serde_json::to_value(&default)? else {
        anyhow::bail!("Default configuration did not serialize to an object");
    };

    let Some(items) = value.get_mut("Items").and_then(Value::as_array_mut) else {
        return Ok(());
    };
    for (index, item) in items.iter_mut().enumerate() {
        let Some(item) = item.as_object_mut() else {
            return Err(FatalError::ConfigDefaults {
                index,
                reason: "entry is not an object".to_string(),
            }
            .into());
        };
        for (key, default_value) in &default_map {
            if key == "ProjectFile" || key == "Directories" {
                continue;
            }
            item.entry(key.clone())
                .or_insert_with(|| default_value.clone());
        }
    }
    Ok(())
}

/// Pinned version parts from `ProjectOverride.json`.
///
/// Only applied when `major` is non-zero. Each non-zero field replaces the
/// calendar-derived value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VersionOverride {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub hotfix: u32,
}

impl Default for VersionOverride {
    fn default() -> Self {
        Self {
            major: 1,
            minor: 0,
            patch: 0,
            hotfix: 0,
        }
    }
}

impl VersionOverride {
    pub fn is_active(&self) -> bool {
        self.major != 0
    }

    /// Look for `ProjectOverride.json` in `folder`.
    ///
    /// A defined patch from the command line replaces the file's `Patch`.
    pub fn load(folder: &Path, defined_patch: Option<&str>) -> Result<Option<(PathBuf, Self)>> {
        let path = folder.join(OVERRIDE_FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        debug!(path = %path.display(), "Loading project override");
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut model: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if let Some(patch) = defined_patch {
            model.patch = parse_defined_patch(patch)?;
        }
        Ok(Some((path, model)))
    }
}

/// Parse the `--defined-patch` value.
pub fn parse_defined_patch(value: &str) -> Result<u32> {
    value
        .trim()
        .parse::<u32>()
        .with_context(|| format!("Invalid defined patch: {}", value))
}

/// Extra history directories for individual projects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CustomProjectSettings {
    pub project_settings: Vec<CustomSingleProjectSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CustomSingleProjectSettings {
    pub project_name: String,
    pub directories: Vec<String>,
}

impl CustomProjectSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read custom project settings {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse custom project settings {}", path.display()))
    }

    /// Directories configured for the project whose file stem is `stem`.
    pub fn directories_for(&self, stem: &str) -> Option<&[String]> {
        self.project_settings
            .iter()
            .find(|s| s.project_name.eq_ignore_ascii_case(stem))
            .map(|s| s.directories.as_slice())
    }
}
