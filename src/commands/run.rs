//! Version a working folder and report the result to CI.
//!
//! This is the main command. It computes versions, writes them into every
//! artifact, prints TeamCity parameter lines on stdout and optionally
//! notifies a webhook.
//!
//! # Examples
//!
//! ```bash
//! # Version every project under the checkout, each from its own history
//! versioner run -w .
//!
//! # One version for the whole repository, stored in version.txt
//! versioner run -w . --mono-repo --store-version-file
//!
//! # Prerelease build of a feature branch, .NET and npm only
//! versioner run -w . -x "feature/login" --version-items dotnet,npm
//! ```

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{
    Local,
    SecondsFormat,
    Utc,
};
use clap::Parser;
use tracing::debug;

use crate::context::{
    RunContext,
    RunOptions,
};
use crate::git::GitCli;
use crate::orchestrator::RunSummary;
use crate::webhook::{
    self,
    VersioningResult,
};

/// Arguments for the `run` command.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Folder to version. History and discovery are rooted here.
    #[arg(long, short = 'w')]
    pub working_folder: PathBuf,

    /// Versioning configuration file (`{ "Default": ..., "Items": [...] }`).
    ///
    /// Built-in templates are used when omitted.
    #[arg(long, short = 'c')]
    pub config_file: Option<PathBuf>,

    /// Write `version.txt` next to each project (or once at the repository
    /// root in mono-repo mode).
    #[arg(long, short = 's')]
    pub store_version_file: bool,

    /// Compute one version for the whole repository and write it
    /// everywhere.
    #[arg(long, short = 'm')]
    pub mono_repo: bool,

    /// Keep a stable `ProjectGuid` in every SDK-style project.
    ///
    /// Requires `--guid-config`.
    #[arg(long, short = 'g')]
    pub set_project_guid: bool,

    /// GUID map file used by `--set-project-guid`.
    #[arg(long, short = 'f')]
    pub guid_config: Option<PathBuf>,

    /// Per-project history directories
    /// (`{ "ProjectSettings": [{ "ProjectName", "Directories" }] }`).
    #[arg(long, short = 'u')]
    pub custom_project_config: Option<PathBuf>,

    /// Prerelease suffix, e.g. the branch name. Unsafe characters become
    /// `-`.
    #[arg(long, short = 'x')]
    pub prerelease_suffix: Option<String>,

    /// Use this number instead of the commit count.
    #[arg(long, short = 'z')]
    pub defined_patch: Option<String>,

    /// Comma-separated artifact kinds to version (dotnet, props, nuget,
    /// npm, docker, python, go, rust, java, helm, yaml).
    #[arg(long)]
    pub version_items: Option<String>,

    /// URL notified with a JSON summary when the run succeeds.
    #[arg(long, env = "VERSIONER_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Secret used to sign the webhook payload.
    #[arg(long, env = "VERSIONER_WEBHOOK_TOKEN", hide_env_values = true)]
    pub webhook_token: Option<String>,

    /// Export the build labels to the process environment.
    #[arg(long)]
    pub debug_env: bool,

    /// git executable.
    #[arg(long, default_value = "git")]
    pub git: String,
}

impl RunArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            working_folder: self.working_folder.clone(),
            config_file: self.config_file.clone(),
            store_version_file: self.store_version_file,
            mono_repo: self.mono_repo,
            set_project_guid: self.set_project_guid,
            guid_config: self.guid_config.clone(),
            custom_project_config: self.custom_project_config.clone(),
            prerelease_suffix: self.prerelease_suffix.clone(),
            defined_patch: self.defined_patch.clone(),
            version_items: self.version_items.clone(),
            webhook_url: self.webhook_url.clone(),
            webhook_token: self.webhook_token.clone(),
            debug_env: self.debug_env,
        }
    }
}

/// Build the webhook payload for a finished run.
pub fn versioning_result(options: &RunOptions, summary: &RunSummary) -> VersioningResult {
    VersioningResult {
        build_label: summary.build_label.clone(),
        artifact_version: summary.artifact_version.clone(),
        git_hash: summary.git_hash.clone(),
        working_folder: options.working_folder.display().to_string(),
        is_mono_repo: options.mono_repo,
        artifacts_versioned: summary.artifacts_versioned,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

/// Version the working folder.
///
/// # Errors
///
/// Fails with a [`crate::error::FatalError`] for conditions that abort the
/// run (no artifacts, bad configuration, missing history, git errors).
/// Failures of individual artifacts are logged and do not fail the run.
pub fn run(args: RunArgs) -> Result<()> {
    let options = args.options().normalize();
    let history = GitCli::new(args.git.as_str(), options.working_folder.as_path());
    let today = Local::now().date_naive();
    let mut ctx = RunContext::new(&options, Box::new(history), today)?;

    let summary = crate::orchestrator::run(&mut ctx)?;
    ctx.output.emit(&mut io::stdout().lock())?;

    if options.debug_env {
        ctx.output.export_debug_env();
    }

    let result = versioning_result(&options, &summary);
    debug!(?result, "Run summary");
    webhook::dispatch(
        options.webhook_url.as_deref(),
        options.webhook_token.as_deref(),
        &result,
    );
    Ok(())
}
