//! Stable `ProjectGuid` values for SDK-style projects.
//!
//! The GUID map file pairs the SHA-256 of each project's repository-relative
//! path with the GUID it was given:
//!
//! ```json
//! {
//!   "Entities": [
//!     { "ProjectHash": "9f86d0...", "ProjectGuid": "{6B29FC40-CA47-1067-B31D-00DD010662DA}" }
//!   ]
//! }
//! ```
//!
//! A project keeps the GUID it already declares; the map learns it. A
//! project without one gets the mapped GUID, or a fresh one. The map is
//! written back only when an entry was added or changed.

use std::fs;
use std::path::Path;

use anyhow::{
    Context,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use tracing::{
    debug,
    info,
};
use uuid::Uuid;

use crate::handlers::msbuild::{
    PROPERTY_GROUP,
    first_unconditioned_group,
    is_conditioned,
};
use crate::handlers::xml::{
    Document,
    Element,
    Layout,
};

const PROJECT_GUID: &str = "ProjectGuid";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProjectGuidEntry {
    pub project_hash: String,
    pub project_guid: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProjectGuidMap {
    #[serde(default)]
    pub entities: Vec<ProjectGuidEntry>,
    #[serde(skip)]
    changed: bool,
}

/// Lower-case hex SHA-256 of a repository-relative path.
pub fn project_hash(relative: &str) -> String {
    hex::encode(Sha256::digest(relative.as_bytes()))
}

/// Braced upper-case form, `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}`.
pub fn format_guid(guid: &Uuid) -> String {
    format!("{{{}}}", guid.hyphenated().to_string().to_ascii_uppercase())
}

pub fn parse_guid(text: &str) -> Option<Uuid> {
    Uuid::parse_str(text.trim()).ok()
}

impl ProjectGuidMap {
    /// Load the map, starting empty when the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(file = %path.display(), "GUID map not found, starting empty");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid GUID map {}", path.display()))
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn guid_for(&self, relative: &str) -> Option<&str> {
        let hash = project_hash(relative);
        self.entities
            .iter()
            .find(|e| e.project_hash == hash)
            .map(|e| e.project_guid.as_str())
    }

    fn record(&mut self, hash: String, guid: String) {
        match self.entities.iter_mut().find(|e| e.project_hash == hash) {
            Some(entry) if entry.project_guid == guid => {}
            Some(entry) => {
                entry.project_guid = guid;
                self.changed = true;
            }
            None => {
                self.entities.push(ProjectGuidEntry {
                    project_hash: hash,
                    project_guid: guid,
                });
                self.changed = true;
            }
        }
    }

    /// Give `project` its GUID. Returns whether the project tree changed.
    pub fn maintain(
        &mut self,
        project: &mut Element,
        layout: &Layout,
        relative: &str,
    ) -> Result<bool> {
        let hash = project_hash(relative);
        let mut guid = self
            .guid_for(relative)
            .and_then(parse_guid)
            .unwrap_or_else(Uuid::new_v4);
        let mut modified = false;

        for group in project
            .elements_mut()
            .filter(|e| e.is(PROPERTY_GROUP) && is_conditioned(e))
        {
            if let Some(found) = group.child(PROJECT_GUID).and_then(|e| parse_guid(&e.text())) {
                guid = found;
            }
            if group.remove_children(PROJECT_GUID) > 0 {
                modified = true;
            }
        }

        let group = first_unconditioned_group(project, layout)?;
        match group.child_mut(PROJECT_GUID) {
            Some(existing) => match parse_guid(&existing.text()) {
                Some(found) => guid = found,
                None => {
                    existing.set_text(&format_guid(&guid));
                    modified = true;
                }
            },
            None => {
                let element = Element::with_text(PROJECT_GUID, &format_guid(&guid));
                group.prepend_child(element, 1, layout);
                modified = true;
            }
        }

        self.record(hash, format_guid(&guid));
        Ok(modified)
    }

    /// Load the project at `path`, maintain its GUID and save it (with a
    /// `.bak` copy) when it changed.
    pub fn maintain_file(&mut self, path: &Path, relative: &str) -> Result<bool> {
        let mut doc = Document::load(path)?;
        let (project, layout) = doc.root_and_layout();
        let modified = self.maintain(project, layout, relative)?;
        if modified {
            project.prune_empty_leaves();
            doc.save_with_backup(path)?;
            info!(file = %path.display(), "Updated ProjectGuid");
        }
        Ok(modified)
    }

    /// Write the map when entries were added or changed.
    pub fn save_if_changed(&self, path: &Path) -> Result<bool> {
        if !self.changed {
            return Ok(false);
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize GUID map")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(file = %path.display(), entries = self.entities.len(), "Saved GUID map");
        Ok(true)
    }
}
