//! Print the build label of a folder.
//!
//! The label is `REV_{yyyy}{MM}{dd}_{HH}{mm}_{shortHash}` of the newest
//! commit touching the folder.
//!
//! # Examples
//!
//! ```bash
//! versioner label
//! # REV_20251014_0930_abc1234
//!
//! versioner label -w services/api --format json
//! # {"buildLabel":"REV_20251014_0930_abc1234","shortHash":"abc1234"}
//! ```

use std::path::{
    Path,
    PathBuf,
};

use anyhow::{
    Context,
    Result,
};
use clap::Parser;
use serde::Serialize;

use crate::git::{
    GitCli,
    GitHistoryProvider,
};

/// Arguments for the `label` command.
#[derive(Parser, Debug, Clone)]
pub struct LabelArgs {
    /// Folder whose history is used.
    #[arg(long, short = 'w', default_value = ".")]
    pub working_folder: PathBuf,

    /// Output format: `version` (just the label) or `json`.
    #[arg(long, default_value = "version")]
    pub format: String,

    /// git executable.
    #[arg(long, default_value = "git")]
    pub git: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LabelOutput {
    build_label: String,
    short_hash: String,
}

fn render(format: &str, provider: &dyn GitHistoryProvider, dir: &Path) -> Result<String> {
    let build_label = provider.build_label(dir)?;
    match format {
        "version" => Ok(build_label),
        "json" => {
            let output = LabelOutput {
                build_label,
                short_hash: provider.head_short_hash(dir)?,
            };
            serde_json::to_string(&output).context("Failed to serialize build label")
        }
        other => anyhow::bail!("Invalid format: {}. Must be 'version' or 'json'", other),
    }
}

/// Print the build label for the working folder.
pub fn label(args: LabelArgs) -> Result<()> {
    let provider = GitCli::new(args.git.as_str(), args.working_folder.as_path());
    println!("{}", render(&args.format, &provider, &args.working_folder)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::ScriptedHistory;

    fn history() -> ScriptedHistory {
        ScriptedHistory::new()
            .with_root("/repo")
            .commit("/repo/api", "2025-10-14 09:30:00", 5)
            .commit("/repo/web", "2025-10-15 16:05:00", 6)
    }

    #[test]
    fn test_version_format() {
        assert_eq!(
            render("version", &history(), Path::new("/repo/api")).unwrap(),
            "REV_20251014_0930_abc0005"
        );
    }

    #[test]
    fn test_json_format() {
        assert_eq!(
            render("json", &history(), Path::new("/repo")).unwrap(),
            r#"{"buildLabel":"REV_20251015_1605_abc0006","shortHash":"abc0006"}"#
        );
    }

    #[test]
    fn test_unknown_format_fails() {
        assert!(render("yaml", &history(), Path::new("/repo")).is_err());
    }
}
