//! Commit history queries.
//!
//! The versioning pipeline only needs four facts from version control: the
//! commits touching a directory, a build label, the head short hash and the
//! repository root. [`GitHistoryProvider`] captures those so the pipeline can
//! run against the real `git` binary ([`GitCli`]) or an in-memory history
//! ([`ScriptedHistory`]).

use std::collections::BTreeMap;
use std::path::{
    Path,
    PathBuf,
};
use std::process::Command;

use anyhow::{
    Context,
    Result,
};
use chrono::NaiveDateTime;
use tracing::{
    debug,
    error,
    warn,
};

use crate::error::FatalError;

const LOG_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One commit from `git log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub timestamp: NaiveDateTime,
    pub long_hash: String,
    pub short_hash: String,
    pub directory: PathBuf,
}

/// Source of commit history for the versioning pipeline.
pub trait GitHistoryProvider {
    /// Commits touching `dir`, newest first.
    fn log(&self, dir: &Path) -> Result<Vec<Commit>>;

    /// `REV_{yyyy}{MM}{dd}_{HH}{mm}_{shortHash}` of the newest commit.
    fn build_label(&self, dir: &Path) -> Result<String>;

    fn head_short_hash(&self, dir: &Path) -> Result<String>;

    fn repository_root(&self, dir: &Path) -> Result<PathBuf>;

    fn is_repository(&self, dir: &Path) -> bool;
}

/// Commits for a project, merging every configured sub-directory.
///
/// With no extra directories this is just the history of `project_dir`.
/// Otherwise each directory is resolved under `working_folder`; missing ones
/// are logged and skipped. Commits reachable from several directories are
/// counted once per directory.
pub fn project_history(
    provider: &dyn GitHistoryProvider,
    working_folder: &Path,
    project_dir: &Path,
    directories: &[String],
) -> Result<Vec<Commit>> {
    if directories.is_empty() {
        return provider.log(project_dir);
    }

    debug!(
        count = directories.len(),
        "Project defines several directories, summing their commits"
    );
    let mut commits = Vec::new();
    for sub_dir in directories {
        let dir = working_folder.join(sub_dir.replace('\\', "/"));
        if !dir.is_dir() {
            error!(directory = %sub_dir, "Directory does not exist");
            continue;
        }
        commits.extend(provider.log(&dir)?);
    }
    sort_newest_first(&mut commits);
    Ok(commits)
}

fn sort_newest_first(commits: &mut [Commit]) {
    commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Parse `git log --pretty=format:%ad,%H,%h` output.
///
/// Blank lines are skipped; the result is sorted newest first.
pub fn parse_log(output: &str, directory: &Path) -> Result<Vec<Commit>> {
    let mut commits = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut fields = line.split(',');
            let (Some(date), Some(long_hash), Some(short_hash)) =
                (fields.next(), fields.next(), fields.next())
            else {
                anyhow::bail!("Malformed git log line: {}", line);
            };
            let timestamp = NaiveDateTime::parse_from_str(date, LOG_DATE_FORMAT)
                .with_context(|| format!("Invalid commit date in git log line: {}", line))?;
            Ok(Commit {
                timestamp,
                long_hash: long_hash.to_string(),
                short_hash: short_hash.to_string(),
                directory: directory.to_path_buf(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    sort_newest_first(&mut commits);
    Ok(commits)
}

/// Fields of `git log -1 --date=format:%Y,%y,%m,%d,%H,%M,%S --format=format:%ad,%H,%h`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadInfo {
    pub year: String,
    pub month: String,
    pub day: String,
    pub hour: String,
    pub minute: String,
    pub long_hash: String,
    pub short_hash: String,
}

impl HeadInfo {
    pub fn parse(output: &str) -> Result<Self> {
        let fields: Vec<&str> = output.trim().split(',').collect();
        if fields.len() < 9 {
            anyhow::bail!("Unexpected git head output: {}", output.trim());
        }
        Ok(Self {
            year: fields[0].to_string(),
            month: format!("{:0>2}", fields[2]),
            day: fields[3].to_string(),
            hour: fields[4].to_string(),
            minute: fields[5].to_string(),
            long_hash: fields[7].to_string(),
            short_hash: fields[8].to_string(),
        })
    }

    pub fn build_label(&self) -> String {
        format!(
            "REV_{}{}{}_{}{}_{}",
            self.year, self.month, self.day, self.hour, self.minute, self.short_hash
        )
    }
}

/// History provider backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    git: String,
    working_folder: PathBuf,
}

impl GitCli {
    /// `git` is run with `working_folder` as its current directory.
    pub fn new(git: impl Into<String>, working_folder: impl Into<PathBuf>) -> Self {
        Self {
            git: git.into(),
            working_folder: working_folder.into(),
        }
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<(String, String, bool)> {
        let output = Command::new(&self.git)
            .args(args)
            .current_dir(dir)
            .output()
            .with_context(|| format!("Failed to execute {}. Is git installed?", self.git))?;
        Ok((
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
            output.status.success(),
        ))
    }

    fn head(&self, dir: &Path) -> Result<HeadInfo> {
        let (stdout, stderr, _) = self.run(
            dir,
            &[
                "log",
                "-1",
                "--date=format:%Y,%y,%m,%d,%H,%M,%S",
                "--format=format:%ad,%H,%h",
            ],
        )?;
        if !stderr.trim().is_empty() {
            anyhow::bail!("Failed to read head commit: {}", stderr.trim());
        }
        HeadInfo::parse(&stdout)
    }
}

impl GitHistoryProvider for GitCli {
    fn log(&self, dir: &Path) -> Result<Vec<Commit>> {
        let dir_arg = dir.to_string_lossy();
        let (stdout, stderr, _) = self.run(
            &self.working_folder,
            &[
                "log",
                "--date=format:%Y-%m-%d %H:%M:%S",
                "--pretty=format:%ad,%H,%h",
                "--",
                dir_arg.as_ref(),
            ],
        )?;
        if !stderr.trim().is_empty() {
            return Err(FatalError::GitLogFailed {
                dir: dir.to_path_buf(),
                stderr: stderr.trim().to_string(),
            }
            .into());
        }
        if stdout.trim().is_empty() {
            warn!(directory = %dir.display(), "git log is empty");
            return Ok(Vec::new());
        }
        parse_log(&stdout, dir)
    }

    fn build_label(&self, dir: &Path) -> Result<String> {
        Ok(self.head(dir)?.build_label())
    }

    fn head_short_hash(&self, dir: &Path) -> Result<String> {
        Ok(self.head(dir)?.short_hash)
    }

    fn repository_root(&self, dir: &Path) -> Result<PathBuf> {
        let (stdout, stderr, success) = self.run(dir, &["rev-parse", "--show-toplevel"])?;
        if !success || !stderr.trim().is_empty() {
            anyhow::bail!("Failed to get git repository root: {}", stderr.trim());
        }
        let root = stdout.trim();
        if root.is_empty() {
            anyhow::bail!("Git repository root path is empty");
        }
        Ok(PathBuf::from(root))
    }

    fn is_repository(&self, dir: &Path) -> bool {
        matches!(
            self.run(dir, &["rev-parse", "--git-dir"]),
            Ok((_, stderr, true)) if stderr.trim().is_empty()
        )
    }
}

/// In-memory history keyed by directory.
///
/// `log(dir)` returns every scripted commit recorded for `dir` or any
/// directory below it, which mirrors `git log -- <dir>` for the purposes of
/// the pipeline. Useful for tests and for dry runs outside a repository.
#[derive(Debug, Clone, Default)]
pub struct ScriptedHistory {
    commits: BTreeMap<PathBuf, Vec<Commit>>,
    root: Option<PathBuf>,
}

impl ScriptedHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `root` as the repository root; without one,
    /// [`GitHistoryProvider::is_repository`] is false.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Record a commit touching `dir`. The hashes are derived from `seq`.
    pub fn commit(mut self, dir: impl Into<PathBuf>, timestamp: &str, seq: u32) -> Self {
        let dir = dir.into();
        let timestamp = NaiveDateTime::parse_from_str(timestamp, LOG_DATE_FORMAT)
            .unwrap_or_default();
        let long_hash = format!("{:040x}", 0xabc0000 + seq as u64);
        let commit = Commit {
            timestamp,
            short_hash: long_hash[33..].to_string(),
            long_hash,
            directory: dir.clone(),
        };
        self.commits.entry(dir).or_default().push(commit);
        self
    }

    fn newest(&self, dir: &Path) -> Option<Commit> {
        self.log_unsorted(dir)
            .into_iter()
            .max_by_key(|c| c.timestamp)
    }

    fn log_unsorted(&self, dir: &Path) -> Vec<Commit> {
        self.commits
            .iter()
            .filter(|(path, _)| path.starts_with(dir))
            .flat_map(|(_, commits)| commits.iter().cloned())
            .collect()
    }
}

impl GitHistoryProvider for ScriptedHistory {
    fn log(&self, dir: &Path) -> Result<Vec<Commit>> {
        let mut commits = self.log_unsorted(dir);
        sort_newest_first(&mut commits);
        Ok(commits)
    }

    fn build_label(&self, dir: &Path) -> Result<String> {
        let head = self
            .newest(dir)
            .with_context(|| format!("No scripted commits under {}", dir.display()))?;
        Ok(format!(
            "REV_{}_{}",
            head.timestamp.format("%Y%m%d_%H%M"),
            head.short_hash
        ))
    }

    fn head_short_hash(&self, dir: &Path) -> Result<String> {
        self.newest(dir)
            .map(|c| c.short_hash)
            .with_context(|| format!("No scripted commits under {}", dir.display()))
    }

    fn repository_root(&self, dir: &Path) -> Result<PathBuf> {
        self.root
            .clone()
            .with_context(|| format!("{} is not inside a scripted repository", dir.display()))
    }

    fn is_repository(&self, dir: &Path) -> bool {
        self.root.as_ref().is_some_and(|root| dir.starts_with(root))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_parse_log_sorts_newest_first() {
        let output = "2025-01-02 10:00:00,aaaa1111,aaaa\n\
                      \n\
                      2025-03-04 08:30:00,bbbb2222,bbbb\n\
                      2024-12-31 23:59:59,cccc3333,cccc\n";
        let commits = parse_log(output, Path::new("src")).unwrap();
        assert_eq!(commits.len(), 3);
        assert_eq!(commits[0].short_hash, "bbbb");
        assert_eq!(commits[2].short_hash, "cccc");
        assert_eq!(commits[0].directory, PathBuf::from("src"));
    }

    #[test]
    fn test_parse_log_rejects_bad_date() {
        let result = parse_log("yesterday,aaaa,bbbb", Path::new("."));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_log_rejects_missing_fields() {
        assert!(parse_log("2025-01-01 00:00:00,onlyonehash", Path::new(".")).is_err());
    }

    #[test]
    fn test_head_info_build_label() {
        let head = HeadInfo::parse("2025,25,3,14,09,05,07,0123456789abcdef,0123456").unwrap();
        assert_eq!(head.build_label(), "REV_20250314_0905_0123456");
        assert_eq!(head.short_hash, "0123456");
        assert_eq!(head.long_hash, "0123456789abcdef");
    }

    #[test]
    fn test_head_info_rejects_short_output() {
        assert!(HeadInfo::parse("2025,25,03").is_err());
    }

    #[test]
    fn test_scripted_log_includes_subdirectories() {
        let history = ScriptedHistory::new()
            .commit("/repo/web", "2025-01-01 10:00:00", 1)
            .commit("/repo/web/api", "2025-02-01 10:00:00", 2)
            .commit("/repo/lib", "2025-03-01 10:00:00", 3);
        let commits = history.log(Path::new("/repo/web")).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].timestamp.format("%m").to_string(), "02");
        assert_eq!(history.log(Path::new("/repo")).unwrap().len(), 3);
    }

    #[test]
    fn test_scripted_build_label_uses_newest_commit() {
        let history = ScriptedHistory::new()
            .commit("/repo", "2025-01-01 10:00:00", 1)
            .commit("/repo", "2025-05-06 07:08:09", 2);
        let label = history.build_label(Path::new("/repo")).unwrap();
        let hash = history.head_short_hash(Path::new("/repo")).unwrap();
        assert_eq!(label, format!("REV_20250506_0708_{}", hash));
    }

    #[test]
    fn test_scripted_repository_detection() {
        let history = ScriptedHistory::new().with_root("/repo");
        assert!(history.is_repository(Path::new("/repo/sub")));
        assert!(!history.is_repository(Path::new("/elsewhere")));
        assert!(ScriptedHistory::new().repository_root(Path::new("/")).is_err());
    }

    #[test]
    fn test_project_history_merges_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        let history = ScriptedHistory::new()
            .commit(dir.path().join("a"), "2025-01-01 10:00:00", 1)
            .commit(dir.path().join("b"), "2025-04-01 10:00:00", 2)
            .commit(dir.path().join("a"), "2025-02-01 10:00:00", 3);

        let commits = project_history(
            &history,
            dir.path(),
            &dir.path().join("a"),
            &["a".to_string(), "b".to_string(), "missing".to_string()],
        )
        .unwrap();
        assert_eq!(commits.len(), 3);
        assert_eq!(commits[0].directory, dir.path().join("b"));
    }

    #[test]
    fn test_project_history_without_directories_uses_project_dir() {
        let history = ScriptedHistory::new()
            .commit("/repo/a", "2025-01-01 10:00:00", 1)
            .commit("/repo/b", "2025-01-02 10:00:00", 2);
        let commits =
            project_history(&history, Path::new("/repo"), Path::new("/repo/a"), &[]).unwrap();
        assert_eq!(commits.len(), 1);
    }
}
