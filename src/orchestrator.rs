//! The versioning pipeline.
//!
//! [`run`] reports the build label and artifact version, then versions the
//! tree either project by project (single mode, this module) or with one
//! shared version (mono-repo mode, [`crate::global`]).
//!
//! In single mode every artifact goes through the same steps: resolve its
//! configuration, load its history, compute the three versions from the
//! calendar and templates, reconcile them with what the file stores, write
//! them back and report them. Missing history aborts the run; any other
//! failure only skips the artifact.

use std::fs;
use std::path::Path;

use anyhow::{
    Context,
    Result,
};
use tracing::{
    debug,
    error,
    info,
    warn,
};

use crate::config::{
    DEFAULT_VERSION,
    VersioningConfig,
};
use crate::context::RunContext;
use crate::discovery::{
    ArtifactDiscovery,
    ArtifactInfo,
    ArtifactKind,
};
use crate::error::FatalError;
use crate::git::{
    Commit,
    project_history,
};
use crate::handlers::{
    Mode,
    handler_for,
    msbuild,
};
use crate::output::{
    ARTIFACT_VERSION,
    BUILD_LABEL,
    BUILD_NUSPEC_VERSION,
    DOCKER_BUILD_LABEL,
};
use crate::pattern::{
    CalendarVersion,
    VersionComponents,
    VersionKind,
    VersionedSet,
    artifact_version,
    calculate_from_pattern,
    docker_version,
    generate_pattern,
    hash_description,
    to_npm_semver,
    with_suffix,
};

pub const VERSION_FILE_NAME: &str = "version.txt";
const COMMIT_INFO_PATH: [&str; 3] = ["ClientApp", "src", "assemblyinfo.ts"];

/// What a finished run reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub build_label: String,
    pub artifact_version: String,
    pub git_hash: String,
    pub artifacts_versioned: usize,
}

/// Version the working folder of `ctx`.
pub fn run(ctx: &mut RunContext) -> Result<RunSummary> {
    let working_folder = ctx.working_folder.clone();
    if ctx.mono_repo && !ctx.history.is_repository(&working_folder) {
        return Err(FatalError::NotARepository(working_folder).into());
    }

    let build_label = ctx
        .history
        .build_label(&working_folder)
        .context("Failed to determine the build label")?;
    info!(%build_label, "Build label");
    ctx.output.push(BUILD_LABEL, build_label.as_str());

    let commit_count = ctx.history.log(&working_folder)?.len();
    let artifact_version = artifact_version(ctx.today, commit_count);
    info!(%artifact_version, commits = commit_count, "Artifact version");
    ctx.output.push(ARTIFACT_VERSION, artifact_version.as_str());

    let git_hash = ctx.history.head_short_hash(&working_folder)?;

    let artifacts_versioned = if ctx.mono_repo {
        info!("Running mono-repo versioning");
        crate::global::version_repository(ctx, &build_label)?
    } else {
        info!("Running single-project versioning");
        version_projects(ctx, &build_label, commit_count)?
    };

    ctx.flush_guids()?;
    info!(count = artifacts_versioned, "Versioning completed");

    Ok(RunSummary {
        build_label,
        artifact_version,
        git_hash,
        artifacts_versioned,
    })
}

/// Single mode: give every discovered artifact its own version.
pub fn version_projects(
    ctx: &mut RunContext,
    build_label: &str,
    commit_count: usize,
) -> Result<usize> {
    let discovery = ArtifactDiscovery::new(&ctx.working_folder)?;
    let artifacts = discovery.discover(true, &ctx.allowed_kinds)?;
    if artifacts.is_empty() {
        return Err(FatalError::NoArtifacts(ctx.working_folder.clone()).into());
    }

    let mut versioned = 0;
    for artifact in &artifacts {
        if artifact.kind == ArtifactKind::Props {
            info!(
                file = %ctx.relative(&artifact.file_path),
                "Skipping .props file in single-project mode"
            );
            continue;
        }
        if version_project(ctx, artifact, build_label)?.is_set {
            versioned += 1;
        }
    }

    let has_dockerfile = discovery
        .discover(true, &[ArtifactKind::Docker])?
        .iter()
        .any(|a| a.meta("Type") == Some("Dockerfile"));
    if has_dockerfile {
        let label = docker_version(ctx.today, commit_count, ctx.version_override.as_ref());
        info!(%label, "Docker build label");
        ctx.output.push(DOCKER_BUILD_LABEL, label);
    }

    Ok(versioned)
}

/// Version one artifact. Missing history is fatal; any later failure is
/// logged and yields [`VersionedSet::unset`].
pub fn version_project(
    ctx: &mut RunContext,
    artifact: &ArtifactInfo,
    build_label: &str,
) -> Result<VersionedSet> {
    let relative = ctx.relative(&artifact.file_path);
    info!(file = %relative, kind = %artifact.kind, "Loading file");

    let mut config = ctx.config.resolve(&relative);
    let stem = artifact
        .file_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Some(directories) = ctx.custom_settings.directories_for(&stem) {
        debug!(project = %stem, ?directories, "Using custom project directories");
        config.directories = directories.to_vec();
    }

    let commits = project_history(
        ctx.history.as_ref(),
        &ctx.working_folder,
        &artifact.directory,
        &config.directories,
    )?;
    if commits.is_empty() {
        error!(file = %relative, "Error while calculating version for project");
        return Err(FatalError::NoHistory(relative).into());
    }

    match apply_versions(ctx, artifact, &relative, &config, &commits, build_label) {
        Ok(set) => Ok(set),
        Err(e) => {
            error!(
                file = %relative,
                error = %format!("{:#}", e),
                "Failed to version artifact, skipping"
            );
            Ok(VersionedSet::unset())
        }
    }
}

/// Kinds that store one plain version and use the JS template.
fn uses_single_template(kind: ArtifactKind) -> bool {
    !matches!(kind, ArtifactKind::DotNet | ArtifactKind::Props | ArtifactKind::NuGet)
}

/// Everything after history: compute, reconcile, write and report.
fn apply_versions(
    ctx: &mut RunContext,
    artifact: &ArtifactInfo,
    relative: &str,
    config: &VersioningConfig,
    commits: &[Commit],
    build_label: &str,
) -> Result<VersionedSet> {
    let path = artifact.file_path.as_path();
    let newest = &commits[0];
    let window = ctx.calendar.lookup(newest.timestamp.date());
    let calendar_version = CalendarVersion::new(&window, ctx.version_override.as_ref());
    let components =
        VersionComponents::new(&calendar_version, newest, commits.len(), ctx.defined_patch);

    let single = uses_single_template(artifact.kind);
    let assembly_pattern = generate_pattern(config, VersionKind::Assembly, &components, single)?;
    let file_pattern = generate_pattern(config, VersionKind::File, &components, single)?;
    let info_pattern = generate_pattern(config, VersionKind::Informational, &components, single)?;
    debug!(%assembly_pattern, %file_pattern, %info_pattern, "Version patterns");

    let handler = handler_for(artifact, config, Mode::Single)?;
    if handler.ensure_version_fields(path)? {
        info!(file = %relative, "Added missing version properties");
    }
    let stored = handler.extract(path)?;

    let assembly = stored.assembly_version.unwrap_or_else(|| DEFAULT_VERSION.to_string());
    let mut info_version = stored.info_version.unwrap_or_else(|| DEFAULT_VERSION.to_string());
    let file_version = stored.file_version.unwrap_or_else(|| DEFAULT_VERSION.to_string());
    if info_version != assembly {
        info_version = assembly.clone();
    }

    let mut assembly = calculate_from_pattern(&assembly, &assembly_pattern);
    let mut info_version = calculate_from_pattern(&info_version, &info_pattern);
    let mut file_version = calculate_from_pattern(&file_version, &file_pattern);
    if single && assembly.split('.').count() == 4 {
        assembly = to_npm_semver(&assembly)?;
        info_version = assembly.clone();
        file_version = assembly.clone();
    }

    let old_description = stored.description.unwrap_or_default();
    let description = if config.hash_as_description {
        hash_description(&newest.short_hash, build_label, &old_description)
    } else {
        old_description
    };

    let set = VersionedSet::new(
        assembly,
        info_version,
        file_version,
        build_label,
        description,
        newest.short_hash.as_str(),
    );
    info!(
        file = %relative,
        version = %set.assembly_version,
        info = %set.assembly_info_version,
        file_version = %set.assembly_file_version,
        "Calculated versions"
    );

    let npm = artifact.kind == ArtifactKind::Npm;
    let relative_dir = ctx.relative(&artifact.directory);
    ctx.output.project_versions(&relative_dir, &set, npm);
    if ctx.store_version_file && !npm {
        write_version_file(&artifact.directory, &set.assembly_version, ctx.suffix());
    }

    handler.apply(path, &set, ctx.suffix())?;

    if artifact.kind == ArtifactKind::DotNet
        && let Some(tracking) = ctx.guids.as_mut()
        && msbuild::is_sdk_project(path)?
    {
        tracking.map.maintain_file(path, relative)?;
    }

    if artifact.kind == ArtifactKind::NuGet && !set.assembly_version.is_empty() {
        info!(version = %set.assembly_version, "BuildNuspecVersion");
        ctx.output.push(BUILD_NUSPEC_VERSION, set.assembly_version.as_str());
    }

    write_commit_info(&artifact.directory, &set)?;
    Ok(set)
}

/// Store `version` (with the suffix) in `version.txt` under `dir`. Failures
/// are only logged.
pub fn write_version_file(dir: &Path, version: &str, suffix: Option<&str>) {
    let path = dir.join(VERSION_FILE_NAME);
    let content = with_suffix(version, suffix);
    match fs::write(&path, &content) {
        Ok(()) => info!(file = %path.display(), version = %content, "Stored version file"),
        Err(e) => warn!(file = %path.display(), error = %e, "Problem creating version.txt file"),
    }
}

/// Contents of the TypeScript commit information class.
pub fn commit_info_ts(set: &VersionedSet) -> String {
    let fields = [
        ("Commit", set.short_hash.as_str()),
        ("BuildLabel", set.build_label.as_str()),
        ("Description", ""),
        ("AssemblyVersion", set.assembly_version.as_str()),
        ("FileVersion", set.assembly_file_version.as_str()),
        ("InformationalVersion", set.assembly_info_version.as_str()),
    ];
    let mut out = String::from("export class CommitInformation {\n");
    for (name, value) in fields {
        out.push_str(&format!("    {}: string = \"{}\";\n", name, value));
    }
    out.push('}');
    out
}

/// Regenerate `ClientApp/src/assemblyinfo.ts` under `project_dir` when the
/// file exists. Returns whether it was written.
pub fn write_commit_info(project_dir: &Path, set: &VersionedSet) -> Result<bool> {
    let path = COMMIT_INFO_PATH
        .iter()
        .fold(project_dir.to_path_buf(), |p, part| p.join(part));
    if !path.is_file() {
        return Ok(false);
    }
    info!(file = %path.display(), "Generating TypeScript assemblyinfo.ts");
    fs::write(&path, commit_info_ts(set))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}
