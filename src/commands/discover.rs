//! List the artifacts a run would version.
//!
//! # Examples
//!
//! ```bash
//! versioner discover -w .
//! versioner discover -w . --version-items python,rust --format json
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{
    Context,
    Result,
};
use clap::Parser;
use console::style;
use serde::Serialize;

use crate::discovery::{
    ArtifactDiscovery,
    ArtifactInfo,
    ArtifactKind,
    parse_kind_filter,
};

/// Arguments for the `discover` command.
#[derive(Parser, Debug, Clone)]
pub struct DiscoverArgs {
    /// Folder to search.
    #[arg(long, short = 'w', default_value = ".")]
    pub working_folder: PathBuf,

    /// Comma-separated artifact kinds to list.
    #[arg(long)]
    pub version_items: Option<String>,

    /// Only look at the folder itself, not its sub-directories.
    #[arg(long)]
    pub no_recursive: bool,

    /// Output format: `text` or `json`.
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveredArtifact {
    kind: ArtifactKind,
    path: String,
    directory: String,
    metadata: BTreeMap<String, String>,
}

fn describe(discovery: &ArtifactDiscovery, artifact: &ArtifactInfo) -> DiscoveredArtifact {
    DiscoveredArtifact {
        kind: artifact.kind,
        path: discovery.relative(&artifact.file_path),
        directory: discovery.relative(&artifact.directory),
        metadata: artifact.metadata.clone(),
    }
}

fn render(format: &str, artifacts: &[DiscoveredArtifact]) -> Result<String> {
    match format {
        "json" => serde_json::to_string_pretty(artifacts).context("Failed to serialize artifacts"),
        "text" => Ok(artifacts
            .iter()
            .map(|a| format!("{} {}", style(format!("{:<8}", a.kind.name())).bold(), a.path))
            .collect::<Vec<_>>()
            .join("\n")),
        other => anyhow::bail!("Invalid format: {}. Must be 'text' or 'json'", other),
    }
}

/// Print the artifacts found under the working folder.
pub fn discover(args: DiscoverArgs) -> Result<()> {
    let allowed = parse_kind_filter(args.version_items.as_deref())?;
    let discovery = ArtifactDiscovery::new(&args.working_folder)?;
    let artifacts: Vec<DiscoveredArtifact> = discovery
        .discover(!args.no_recursive, &allowed)?
        .iter()
        .map(|a| describe(&discovery, a))
        .collect();

    let output = render(&args.format, &artifacts)?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
