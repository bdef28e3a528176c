//! Artifact discovery.
//!
//! Walks a tree and classifies well-known file names into artifact kinds.
//! Paths are filtered through exclusion patterns: a built-in list of build
//! and tool directories plus the lines of `.versionerignore` at the root.
//!
//! # Exclusion patterns
//!
//! Patterns are matched case-insensitively against the `/`-separated path
//! relative to the root:
//!
//! - `test/**` excludes anything inside a `test` directory;
//! - `gen*` excludes paths starting with `gen` or containing `/gen`;
//! - `bin` excludes paths with a `bin` segment.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{
    Path,
    PathBuf,
};

use anyhow::{
    Context,
    Result,
};
use serde::Serialize;
use tracing::{
    debug,
    info,
};
use walkdir::WalkDir;

use crate::error::FatalError;

/// Ignore file read from the discovery root.
pub const IGNORE_FILE_NAME: &str = ".versionerignore";

const DEFAULT_EXCLUSIONS: [&str; 8] = [
    "node_modules",
    "bin",
    "obj",
    ".git",
    "venv",
    "target",
    ".vs",
    ".idea",
];

/// Kinds of versionable artifacts, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    DotNet,
    Props,
    NuGet,
    Npm,
    Docker,
    Python,
    Go,
    Rust,
    Java,
    Helm,
    Yaml,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 11] = [
        ArtifactKind::DotNet,
        ArtifactKind::Props,
        ArtifactKind::NuGet,
        ArtifactKind::Npm,
        ArtifactKind::Docker,
        ArtifactKind::Python,
        ArtifactKind::Go,
        ArtifactKind::Rust,
        ArtifactKind::Java,
        ArtifactKind::Helm,
        ArtifactKind::Yaml,
    ];

    /// Name used by `--version-items`.
    pub fn name(self) -> &'static str {
        match self {
            ArtifactKind::DotNet => "dotnet",
            ArtifactKind::Props => "props",
            ArtifactKind::NuGet => "nuget",
            ArtifactKind::Npm => "npm",
            ArtifactKind::Docker => "docker",
            ArtifactKind::Python => "python",
            ArtifactKind::Go => "go",
            ArtifactKind::Rust => "rust",
            ArtifactKind::Java => "java",
            ArtifactKind::Helm => "helm",
            ArtifactKind::Yaml => "yaml",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse a comma-separated `--version-items` list.
///
/// An empty list means every kind.
pub fn parse_kind_filter(items: Option<&str>) -> Result<Vec<ArtifactKind>> {
    let Some(items) = items.filter(|s| !s.trim().is_empty()) else {
        return Ok(Vec::new());
    };

    let mut kinds = Vec::new();
    let mut invalid = Vec::new();
    for item in items.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match ArtifactKind::from_name(item) {
            Some(kind) if !kinds.contains(&kind) => kinds.push(kind),
            Some(_) => {}
            None => invalid.push(item.to_string()),
        }
    }

    if !invalid.is_empty() {
        let mut valid: Vec<&str> = ArtifactKind::ALL.iter().map(|k| k.name()).collect();
        valid.sort_unstable();
        return Err(FatalError::InvalidKindFilter {
            invalid: invalid.join(", "),
            valid: valid.join(", "),
        }
        .into());
    }
    Ok(kinds)
}

/// One discovered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    pub file_path: PathBuf,
    pub kind: ArtifactKind,
    pub directory: PathBuf,
    pub metadata: BTreeMap<String, String>,
}

impl ArtifactInfo {
    pub(crate) fn new(file_path: &Path, kind: ArtifactKind, key: &str, value: &str) -> Self {
        Self {
            file_path: file_path.to_path_buf(),
            kind,
            directory: file_path.parent().map(Path::to_path_buf).unwrap_or_default(),
            metadata: BTreeMap::from([(key.to_string(), value.to_string())]),
        }
    }

    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Kinds a file name belongs to, with their metadata entry.
fn classify(file_name: &str) -> Vec<(ArtifactKind, &'static str, &'static str)> {
    let lower = file_name.to_ascii_lowercase();
    let mut kinds = Vec::new();

    if lower.ends_with(".csproj") {
        kinds.push((ArtifactKind::DotNet, "Extension", ".csproj"));
    }
    if lower.ends_with(".props") {
        kinds.push((ArtifactKind::Props, "Extension", ".props"));
    }
    if lower.ends_with(".nuspec") {
        kinds.push((ArtifactKind::NuGet, "Extension", ".nuspec"));
    }
    match file_name {
        "package.json" => kinds.push((ArtifactKind::Npm, "Extension", "package.json")),
        "Dockerfile" => kinds.push((ArtifactKind::Docker, "Type", "Dockerfile")),
        "docker-compose.yml" | "compose.yml" => {
            kinds.push((ArtifactKind::Docker, "Type", "DockerCompose"));
            kinds.push((ArtifactKind::Yaml, "Format", "DockerCompose"));
        }
        "pyproject.toml" => kinds.push((ArtifactKind::Python, "Format", "pyproject.toml")),
        "setup.py" => kinds.push((ArtifactKind::Python, "Format", "setup.py")),
        "setup.cfg" => kinds.push((ArtifactKind::Python, "Format", "setup.cfg")),
        "__version__.py" => kinds.push((ArtifactKind::Python, "Format", "__version__.py")),
        "go.mod" => kinds.push((ArtifactKind::Go, "Format", "go.mod")),
        "version.go" => kinds.push((ArtifactKind::Go, "Format", "version.go")),
        "Cargo.toml" => kinds.push((ArtifactKind::Rust, "Format", "Cargo.toml")),
        "pom.xml" => kinds.push((ArtifactKind::Java, "Format", "pom.xml")),
        "Chart.yaml" => kinds.push((ArtifactKind::Helm, "Format", "Chart.yaml")),
        _ if lower.ends_with(".dockerfile") => {
            kinds.push((ArtifactKind::Docker, "Type", "Dockerfile"))
        }
        _ => {}
    }
    kinds
}

/// Discovery rooted at one directory.
#[derive(Debug, Clone)]
pub struct ArtifactDiscovery {
    root: PathBuf,
    exclusions: Vec<String>,
}

impl ArtifactDiscovery {
    /// Built-in exclusions plus `.versionerignore` under `root`, if present.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let mut exclusions: Vec<String> =
            DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect();

        let ignore_file = root.join(IGNORE_FILE_NAME);
        if ignore_file.is_file() {
            let content = fs::read_to_string(&ignore_file)
                .with_context(|| format!("Failed to read {}", ignore_file.display()))?;
            let patterns = parse_ignore_file(&content);
            debug!(count = patterns.len(), "Loaded patterns from {}", IGNORE_FILE_NAME);
            exclusions.extend(patterns);
        }
        Ok(Self { root, exclusions })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a root-relative path is excluded.
    pub fn should_exclude(&self, relative: &str) -> bool {
        let path = relative.replace('\\', "/").to_ascii_lowercase();
        self.exclusions
            .iter()
            .any(|pattern| pattern_matches(&path, pattern))
    }

    /// Find artifacts of the allowed kinds (all kinds when empty).
    ///
    /// Results are grouped by kind in [`ArtifactKind`] order and sorted by
    /// path within each kind.
    pub fn discover(&self, recursive: bool, allowed: &[ArtifactKind]) -> Result<Vec<ArtifactInfo>> {
        info!(root = %self.root.display(), "Starting artifact discovery");

        let mut walker = WalkDir::new(&self.root).follow_links(false);
        if !recursive {
            walker = walker.max_depth(1);
        }

        let mut by_kind: BTreeMap<ArtifactKind, Vec<ArtifactInfo>> = BTreeMap::new();
        let entries = walker.into_iter().filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            !self.should_exclude(&format!("{}/", self.relative(entry.path())))
        });

        for entry in entries {
            let entry = entry.with_context(|| {
                format!("Failed to walk directory {}", self.root.display())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = self.relative(entry.path());
            if self.should_exclude(&relative) {
                debug!(file = %relative, "Excluding file (matched pattern)");
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            for (kind, key, value) in classify(&file_name) {
                if !allowed.is_empty() && !allowed.contains(&kind) {
                    continue;
                }
                if kind == ArtifactKind::Npm && relative.split('/').any(|s| s == "node_modules") {
                    continue;
                }
                by_kind
                    .entry(kind)
                    .or_default()
                    .push(ArtifactInfo::new(entry.path(), kind, key, value));
            }
        }

        let mut artifacts = Vec::new();
        for (kind, mut found) in by_kind {
            found.sort_by(|a, b| a.file_path.cmp(&b.file_path));
            debug!(kind = %kind, count = found.len(), "Discovered artifacts");
            artifacts.extend(found);
        }
        info!(total = artifacts.len(), "Artifact discovery completed");
        Ok(artifacts)
    }

    /// `/`-separated path relative to the root.
    pub fn relative(&self, path: &Path) -> String {
        relative_path(&self.root, path)
    }
}

/// `/`-separated form of `path` relative to `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Non-blank, non-comment lines of an ignore file.
pub fn parse_ignore_file(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// `path` must already be lower-case and `/`-separated.
fn pattern_matches(path: &str, pattern: &str) -> bool {
    let pattern = pattern.replace('\\', "/").trim().to_ascii_lowercase();
    if pattern.is_empty() {
        return false;
    }
    if let Some(prefix) = pattern.strip_suffix("/**") {
        path.contains(&format!("/{}/", prefix)) || path.starts_with(&format!("{}/", prefix))
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        path.starts_with(prefix) || path.contains(&format!("/{}", prefix))
    } else {
        path.contains(&format!("/{}/", pattern))
            || path.starts_with(&format!("{}/", pattern))
            || path.ends_with(&format!("/{}", pattern))
    }
}

/// Discover artifacts under `root` with the default exclusions and the
/// root's ignore file.
pub fn discover_artifacts(
    root: &Path,
    recursive: bool,
    allowed: &[ArtifactKind],
) -> Result<Vec<ArtifactInfo>> {
    ArtifactDiscovery::new(root)?.discover(recursive, allowed)
}
