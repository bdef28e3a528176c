//! Fatal run errors and their process exit codes.
//!
//! Most failures in this crate are ordinary `anyhow` errors: a single
//! artifact that cannot be parsed is logged and skipped. The variants here are
//! the few conditions that abort a whole run. CI pipelines tell them apart by
//! the exit code.
//!
//! | code | cause |
//! |------|-------|
//! | 500  | no artifacts found, or configuration could not be read |
//! | 501  | unknown artifact kind in `--version-items` |
//! | 502  | working folder is not a git repository |
//! | 600  | any other unexpected error |
//! | 602  | a project has no commit history |
//! | 603  | `git log` reported an error |
//! | 701  | configuration item could not be filled from defaults |

use std::path::PathBuf;

use thiserror::Error;

/// Exit code used for errors that carry no [`FatalError`].
pub const UNEXPECTED_EXIT_CODE: i32 = 600;

/// Conditions that abort the run with a dedicated exit code.
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("No version-based files found under {0}")]
    NoArtifacts(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid artifact types: {invalid}. Valid types: {valid}")]
    InvalidKindFilter { invalid: String, valid: String },

    #[error("{0} is not a git repository")]
    NotARepository(PathBuf),

    #[error("No commits found for project {0}")]
    NoHistory(String),

    #[error("git log failed for {dir}: {stderr}")]
    GitLogFailed { dir: PathBuf, stderr: String },

    #[error("Error filling configuration item {index} with defaults: {reason}")]
    ConfigDefaults { index: usize, reason: String },
}

impl FatalError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalError::NoArtifacts(_) | FatalError::InvalidConfig(_) => 500,
            FatalError::InvalidKindFilter { .. } => 501,
            FatalError::NotARepository(_) => 502,
            FatalError::NoHistory(_) => 602,
            FatalError::GitLogFailed { .. } => 603,
            FatalError::ConfigDefaults { .. } => 701,
        }
    }
}

/// Find the exit code for an error returned from a run.
///
/// Walks the `anyhow` chain so a [`FatalError`] wrapped in extra context is
/// still recognised.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<FatalError>())
        .map_or(UNEXPECTED_EXIT_CODE, FatalError::exit_code)
}
