//! Everything one run needs, resolved up front.
//!
//! [`RunOptions`] is what the user asked for; [`RunContext`] is what the
//! pipeline works with: loaded configuration, override, custom project
//! settings, GUID map, kind filter, sanitized suffix, the history provider
//! and the CI output collected along the way.

use std::path::{
    Path,
    PathBuf,
};

use anyhow::{
    Context,
    Result,
};
use chrono::NaiveDate;
use tracing::{
    debug,
    info,
    warn,
};

use crate::calendar::TimeFrameCalendar;
use crate::config::{
    CustomProjectSettings,
    VersionOverride,
    VersioningConfigFile,
    parse_defined_patch,
};
use crate::discovery::{
    ArtifactKind,
    parse_kind_filter,
};
use crate::git::GitHistoryProvider;
use crate::guids::ProjectGuidMap;
use crate::output::CiOutput;
use crate::pattern::sanitize_suffix;

/// Options for a versioning run, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub working_folder: PathBuf,
    pub config_file: Option<PathBuf>,
    pub store_version_file: bool,
    pub mono_repo: bool,
    pub set_project_guid: bool,
    pub guid_config: Option<PathBuf>,
    pub custom_project_config: Option<PathBuf>,
    pub prerelease_suffix: Option<String>,
    pub defined_patch: Option<String>,
    pub version_items: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_token: Option<String>,
    pub debug_env: bool,
}

impl RunOptions {
    /// Switch off option combinations that cannot work together.
    pub fn normalize(mut self) -> Self {
        if self.set_project_guid && self.guid_config.is_none() {
            warn!("--set-project-guid needs --guid-config; GUID maintenance is disabled");
            self.set_project_guid = false;
        }
        if self.mono_repo && self.custom_project_config.is_some() {
            warn!("Custom project configuration is ignored in mono-repo mode");
            self.custom_project_config = None;
        }
        self
    }
}

/// GUID map together with the file it is flushed to.
pub struct GuidTracking {
    pub path: PathBuf,
    pub map: ProjectGuidMap,
}

pub struct RunContext {
    pub working_folder: PathBuf,
    pub config: VersioningConfigFile,
    pub version_override: Option<VersionOverride>,
    pub custom_settings: CustomProjectSettings,
    /// Sanitized; `None` when empty.
    pub suffix: Option<String>,
    pub defined_patch: Option<u32>,
    pub store_version_file: bool,
    pub mono_repo: bool,
    pub guids: Option<GuidTracking>,
    pub allowed_kinds: Vec<ArtifactKind>,
    pub today: NaiveDate,
    pub calendar: TimeFrameCalendar,
    pub history: Box<dyn GitHistoryProvider>,
    pub output: CiOutput,
}

impl RunContext {
    /// Resolve `options` into a context. `today` drives the calendar and
    /// the artifact version.
    pub fn new(
        options: &RunOptions,
        history: Box<dyn GitHistoryProvider>,
        today: NaiveDate,
    ) -> Result<Self> {
        let working_folder = options.working_folder.clone();
        if !working_folder.is_dir() {
            anyhow::bail!("Working folder {} does not exist", working_folder.display());
        }

        let config = VersioningConfigFile::load(options.config_file.as_deref())?;
        let allowed_kinds = parse_kind_filter(options.version_items.as_deref())?;
        if !allowed_kinds.is_empty() {
            let names: Vec<&str> = allowed_kinds.iter().map(|k| k.name()).collect();
            info!(kinds = %names.join(", "), "Artifact kind filter applied");
        }

        let defined_patch = options
            .defined_patch
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(parse_defined_patch)
            .transpose()?;

        let patch_text = defined_patch.map(|p| p.to_string());
        let loaded = VersionOverride::load(&working_folder, patch_text.as_deref())?;
        let version_override = match loaded {
            Some((path, model)) => {
                info!(
                    path = %path.display(),
                    major = model.major,
                    minor = model.minor,
                    patch = model.patch,
                    hotfix = model.hotfix,
                    "Using project override"
                );
                Some(model)
            }
            None => None,
        };

        let custom_settings = match &options.custom_project_config {
            Some(path) if path.is_file() => {
                let settings = CustomProjectSettings::load(path)?;
                debug!(count = settings.project_settings.len(), "Loaded custom project settings");
                settings
            }
            Some(path) => {
                warn!(path = %path.display(), "Custom project configuration not found");
                CustomProjectSettings::default()
            }
            None => CustomProjectSettings::default(),
        };

        let guids = match (&options.guid_config, options.set_project_guid) {
            (Some(path), true) => Some(GuidTracking {
                map: ProjectGuidMap::load(path)?,
                path: path.clone(),
            }),
            _ => None,
        };

        let suffix = options
            .prerelease_suffix
            .as_deref()
            .map(sanitize_suffix)
            .filter(|s| !s.is_empty());

        Ok(Self {
            working_folder,
            config,
            version_override,
            custom_settings,
            suffix,
            defined_patch,
            store_version_file: options.store_version_file,
            mono_repo: options.mono_repo,
            guids,
            allowed_kinds,
            today,
            calendar: TimeFrameCalendar::generate(today),
            history,
            output: CiOutput::new(),
        })
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// `/`-separated path of `path` relative to the working folder.
    pub fn relative(&self, path: &Path) -> String {
        crate::discovery::relative_path(&self.working_folder, path)
    }

    /// Flush the GUID map if anything changed.
    pub fn flush_guids(&self) -> Result<()> {
        if let Some(tracking) = &self.guids {
            tracking
                .map
                .save_if_changed(&tracking.path)
                .context("Failed to save the GUID map")?;
        }
        Ok(())
    }
}
