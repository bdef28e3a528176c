//! Mono-repo mode: one version for the whole repository.
//!
//! The version is `yy.MM.{commits}` of the repository root history, with an
//! optional root `ProjectOverride.json` replacing major, minor and patch. The
//! resulting set is written unchanged into every discovered artifact.

use std::path::Path;

use anyhow::{
    Context,
    Result,
};
use tracing::{
    debug,
    info,
    warn,
};

use crate::config::VersionOverride;
use crate::context::RunContext;
use crate::discovery::{
    ArtifactDiscovery,
    ArtifactInfo,
    ArtifactKind,
};
use crate::error::FatalError;
use crate::handlers::{
    Mode,
    handler_for,
    msbuild,
};
use crate::orchestrator::write_version_file;
use crate::pattern::{
    VersionedSet,
    artifact_version,
};

const DIRECTORY_BUILD_PROPS: &str = "Directory.Build.props";

/// `yy.MM.{count}` with the root override applied: major and minor always
/// replace the first two parts, patch the third when non-zero.
pub fn global_version(base: &str, version_override: Option<&VersionOverride>) -> String {
    let Some(o) = version_override else {
        return base.to_string();
    };
    let mut parts: Vec<String> = base.split('.').map(str::to_string).collect();
    parts.resize(3, "0".to_string());
    parts[0] = o.major.to_string();
    parts[1] = o.minor.to_string();
    if o.patch > 0 {
        parts[2] = o.patch.to_string();
    }
    parts.join(".")
}

/// The set broadcast to every artifact.
pub fn global_set(version: &str, hash: &str, build_label: &str) -> VersionedSet {
    VersionedSet::new(
        version,
        format!("{}+{}", version, hash),
        version,
        build_label,
        format!("Version: {}", build_label),
        hash,
    )
}

/// Version every artifact under the repository root. Returns how many
/// were written.
pub fn version_repository(ctx: &mut RunContext, build_label: &str) -> Result<usize> {
    let root = ctx
        .history
        .repository_root(&ctx.working_folder)
        .context("Failed to find the repository root")?;
    info!(root = %root.display(), "Starting global repository versioning");

    let commits = ctx.history.log(&root)?;
    if commits.is_empty() {
        return Err(FatalError::NoHistory(root.display().to_string()).into());
    }
    let defined_patch = ctx.defined_patch.map(|p| p.to_string());
    let root_override = VersionOverride::load(&root, defined_patch.as_deref())?.map(|(_, o)| o);
    let version = global_version(
        &artifact_version(ctx.today, commits.len()),
        root_override.as_ref(),
    );
    let hash = ctx.history.head_short_hash(&root)?;
    let set = global_set(&version, &hash, build_label);
    info!(%version, %hash, "Global version");

    let allowed: Vec<ArtifactKind> = if ctx.allowed_kinds.is_empty() {
        ArtifactKind::ALL.to_vec()
    } else {
        ctx.allowed_kinds.clone()
    };
    let discovery_kinds: Vec<ArtifactKind> = allowed
        .iter()
        .copied()
        .filter(|k| *k != ArtifactKind::Props)
        .collect();
    let artifacts = ArtifactDiscovery::new(&root)?.discover(true, &discovery_kinds)?;
    if artifacts.is_empty() {
        return Err(FatalError::NoArtifacts(root).into());
    }

    let (projects, others): (Vec<&ArtifactInfo>, Vec<&ArtifactInfo>) = artifacts
        .iter()
        .partition(|a| a.kind == ArtifactKind::DotNet);

    let mut versioned = 0;
    let props = root.join(DIRECTORY_BUILD_PROPS);
    let use_props = allowed.contains(&ArtifactKind::DotNet) && props.is_file();
    let dotnet_targets: Vec<ArtifactInfo> = if use_props {
        info!("Found Directory.Build.props in repository root, versioning it");
        vec![ArtifactInfo::new(&props, ArtifactKind::Props, "Extension", ".props")]
    } else {
        projects.iter().map(|a| (*a).clone()).collect()
    };
    for target in dotnet_targets.iter().chain(others.iter().copied()) {
        if apply(ctx, &root, target, &set) {
            versioned += 1;
        }
    }

    if let Some(tracking) = ctx.guids.as_mut() {
        for project in &projects {
            let relative = crate::discovery::relative_path(&root, &project.file_path);
            let result = msbuild::is_sdk_project(&project.file_path).and_then(|sdk| {
                if sdk {
                    tracking.map.maintain_file(&project.file_path, &relative)
                } else {
                    Ok(false)
                }
            });
            if let Err(e) = result {
                warn!(
                    file = %relative,
                    error = %format!("{:#}", e),
                    "Failed to maintain ProjectGuid"
                );
            }
        }
    }

    if ctx.store_version_file && versioned > 0 {
        write_version_file(&root, &set.assembly_version, ctx.suffix());
    }
    info!(count = versioned, "Global repository versioning completed");
    Ok(versioned)
}

/// Write `set` into one artifact; failures are logged and reported as
/// `false`.
fn apply(ctx: &mut RunContext, root: &Path, artifact: &ArtifactInfo, set: &VersionedSet) -> bool {
    let relative = crate::discovery::relative_path(root, &artifact.file_path);
    let config = ctx.config.resolve(&relative);
    let result = handler_for(artifact, &config, Mode::Global).and_then(|handler| {
        handler.ensure_version_fields(&artifact.file_path)?;
        handler.apply(&artifact.file_path, set, ctx.suffix())
    });
    match result {
        Ok(()) => {
            debug!(file = %relative, kind = %artifact.kind, "Versioned artifact");
            let relative_dir = crate::discovery::relative_path(root, &artifact.directory);
            ctx.output
                .project_versions(&relative_dir, set, artifact.kind == ArtifactKind::Npm);
            true
        }
        Err(e) => {
            warn!(
                file = %relative,
                kind = %artifact.kind,
                error = %format!("{:#}", e),
                "Failed to version artifact"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::*;
    use crate::context::RunOptions;
    use crate::error::exit_code_for;
    use crate::git::ScriptedHistory;
    use crate::orchestrator::run;

    fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn context(
        root: &Path,
        history: ScriptedHistory,
        configure: impl FnOnce(&mut RunOptions),
    ) -> RunContext {
        let mut options = RunOptions {
            working_folder: root.to_path_buf(),
            mono_repo: true,
            ..RunOptions::default()
        };
        configure(&mut options);
        let today = NaiveDate::from_ymd_opt(2025, 10, 20).unwrap();
        RunContext::new(&options.normalize(), Box::new(history), today).unwrap()
    }

    fn history(root: &Path) -> ScriptedHistory {
        ScriptedHistory::new()
            .with_root(root)
            .commit(root.join("a"), "2025-10-01 08:00:00", 1)
            .commit(root.join("b"), "2025-10-14 09:30:00", 2)
    }

    #[test]
    fn test_global_version_override() {
        let o = VersionOverride {
            major: 3,
            minor: 4,
            patch: 0,
            hotfix: 0,
        };
        assert_eq!(global_version("25.10.7", None), "25.10.7");
        assert_eq!(global_version("25.10.7", Some(&o)), "3.4.7");
        let o = VersionOverride { patch: 9, ..o };
        assert_eq!(global_version("25.10.7", Some(&o)), "3.4.9");
        let zero_major = VersionOverride { major: 0, ..o };
        assert_eq!(global_version("25.10.7", Some(&zero_major)), "0.4.9");
    }

    #[test]
    fn test_global_set_shape() {
        let set = global_set("25.10.7", "abc1234", "REV_X");
        assert_eq!(set.assembly_info_version, "25.10.7+abc1234");
        assert_eq!(set.assembly_file_version, "25.10.7");
        assert_eq!(set.description, "Version: REV_X");
        assert!(set.is_set);
    }

    #[test]
    fn test_not_a_repository_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(dir.path(), ScriptedHistory::new(), |_| {});
        let err = run(&mut ctx).unwrap_err();
        assert_eq!(exit_code_for(&err), 502);
    }

    #[test]
    fn test_broadcast_to_projects_and_packages() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let api = write(
            root,
            "a/Api.csproj",
            concat!(
                "<Project Sdk=\"Microsoft.NET.Sdk\">\n",
                "  <PropertyGroup>\n",
                "    <Version>0.1.0</Version>\n",
                "  </PropertyGroup>\n",
                "</Project>",
            ),
        );
        let package = write(root, "b/package.json", "{\n  \"version\": \"0.0.1\"\n}\n");
        let cargo = write(root, "b/Cargo.toml", "[package]\nname = \"b\"\nversion = \"0.1.0\"\n");

        let mut ctx = context(root, history(root), |o| o.store_version_file = true);
        let summary = run(&mut ctx).unwrap();

        assert_eq!(summary.artifacts_versioned, 3);
        let project = fs::read_to_string(&api).unwrap();
        assert!(project.contains("<Version>25.10.2+abc0002</Version>"));
        assert!(project.contains("<AssemblyVersion>25.10.2</AssemblyVersion>"));
        assert!(fs::read_to_string(&package).unwrap().contains("\"version\": \"25.10.2\""));
        assert!(fs::read_to_string(&cargo).unwrap().contains("version = \"25.10.2\""));
        assert_eq!(fs::read_to_string(root.join("version.txt")).unwrap(), "25.10.2");
        assert!(!root.join("a/version.txt").exists());
    }

    #[test]
    fn test_directory_build_props_is_sole_dotnet_target() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let project = concat!(
            "<Project Sdk=\"Microsoft.NET.Sdk\">\n",
            "  <PropertyGroup>\n",
            "    <Nullable>enable</Nullable>\n",
            "  </PropertyGroup>\n",
            "</Project>",
        );
        let api = write(root, "a/Api.csproj", project);
        let props = write(
            root,
            "Directory.Build.props",
            concat!(
                "<Project>\n",
                "  <PropertyGroup>\n",
                "    <Authors>team</Authors>\n",
                "  </PropertyGroup>\n",
                "</Project>",
            ),
        );
        write(root, "a/Nested.props", "<Project>\n</Project>");

        let mut ctx = context(root, history(root), |o| {
            o.prerelease_suffix = Some("rc1".to_string())
        });
        let summary = run(&mut ctx).unwrap();

        assert_eq!(summary.artifacts_versioned, 1);
        assert_eq!(fs::read_to_string(&api).unwrap(), project);
        let props = fs::read_to_string(&props).unwrap();
        assert!(props.contains("<VersionPrefix>25.10.2</VersionPrefix>"));
        assert!(props.contains("<VersionSuffix>rc1</VersionSuffix>"));
        assert_eq!(
            fs::read_to_string(root.join("a/Nested.props")).unwrap(),
            "<Project>\n</Project>"
        );
    }

    #[test]
    fn test_root_override_applies() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "ProjectOverride.json", r#"{"Major": 7, "Minor": 1, "Patch": 5, "Hotfix": 0}"#);
        let chart = write(root, "b/Chart.yaml", "apiVersion: v2\nname: b\nversion: 0.1.0\n");

        let mut ctx = context(root, history(root), |_| {});
        run(&mut ctx).unwrap();
        assert!(fs::read_to_string(&chart).unwrap().contains("version: 7.1.5\n"));
        assert_eq!(ctx.output.value("Version.b"), Some("7.1.5"));
    }

    #[test]
    fn test_defined_patch_replaces_root_override_patch() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "ProjectOverride.json", r#"{"Major": 7, "Minor": 1, "Patch": 0, "Hotfix": 0}"#);
        let chart = write(root, "b/Chart.yaml", "apiVersion: v2\nname: b\nversion: 0.1.0\n");

        let mut ctx = context(root, history(root), |o| {
            o.defined_patch = Some("42".to_string())
        });
        run(&mut ctx).unwrap();
        assert_eq!(
            fs::read_to_string(&chart).unwrap(),
            "apiVersion: v2\nname: b\nversion: 7.1.42\n"
        );
    }

    #[test]
    fn test_root_override_with_zero_major() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "ProjectOverride.json", r#"{"Major": 0, "Minor": 5, "Patch": 0, "Hotfix": 0}"#);
        let cargo = write(root, "b/Cargo.toml", "[package]\nname = \"b\"\nversion = \"0.1.0\"\n");

        let mut ctx = context(root, history(root), |_| {});
        run(&mut ctx).unwrap();
        assert!(fs::read_to_string(&cargo).unwrap().contains("version = \"0.5.2\""));
    }
}
