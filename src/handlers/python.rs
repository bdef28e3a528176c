//! Python packaging files.
//!
//! | file | location of the version |
//! |---|---|
//! | `pyproject.toml` | `[project] version` (or `[tool.poetry] version`) |
//! | `setup.py` | `version="..."` argument of `setup(` |
//! | `setup.cfg` | `version =` in `[metadata]` |
//! | `__version__.py` | `__version__ = "..."` |
//!
//! Each one is updated in place, or the field is added when missing.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{
    Context,
    Result,
};
use regex::{
    Captures,
    Regex,
};
use toml_edit::{
    DocumentMut,
    Item,
    Value,
};
use tracing::{
    info,
    warn,
};

use super::{
    StoredVersions,
    VersionHandler,
    file_name,
    read_text,
    text_version,
    write_if_changed,
};
use crate::pattern::VersionedSet;

static SETUP_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<head>\bversion\s*=\s*["'])(?P<value>[^"']+)(?P<tail>["'])"#).unwrap()
});
static SETUP_CALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bsetup\(").unwrap());
static DUNDER_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<head>__version__\s*=\s*["'])(?P<value>[^"']+)(?P<tail>["'])"#).unwrap()
});
static CFG_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<head>[ \t]*version[ \t]*[=:][ \t]*)(?P<value>[^\r\n]*)").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PythonFormat {
    PyProject,
    SetupPy,
    SetupCfg,
    VersionPy,
}

impl PythonFormat {
    fn detect(path: &Path) -> Option<Self> {
        match file_name(path).to_ascii_lowercase().as_str() {
            "pyproject.toml" => Some(Self::PyProject),
            "setup.py" => Some(Self::SetupPy),
            "setup.cfg" => Some(Self::SetupCfg),
            "__version__.py" => Some(Self::VersionPy),
            _ => None,
        }
    }
}

pub struct PythonHandler;

/// `[project]` table, falling back to `[tool.poetry]`.
fn pyproject_table_name(doc: &DocumentMut) -> Option<&'static str> {
    if doc.get("project").is_some_and(Item::is_table) {
        Some("project")
    } else if doc
        .get("tool")
        .and_then(|t| t.get("poetry"))
        .is_some_and(Item::is_table)
    {
        Some("tool.poetry")
    } else {
        None
    }
}

pub fn pyproject_version(content: &str) -> Result<Option<String>> {
    let doc = content
        .parse::<DocumentMut>()
        .context("Failed to parse pyproject.toml")?;
    let version = match pyproject_table_name(&doc) {
        Some("project") => doc["project"].get("version"),
        Some(_) => doc["tool"]["poetry"].get("version"),
        None => None,
    };
    Ok(version.and_then(Item::as_str).map(str::to_string))
}

pub fn set_pyproject_version(content: &str, version: &str) -> Result<Option<String>> {
    let mut doc = content
        .parse::<DocumentMut>()
        .context("Failed to parse pyproject.toml")?;
    let table = match pyproject_table_name(&doc) {
        Some("project") => doc["project"].as_table_mut(),
        Some(_) => doc["tool"]["poetry"].as_table_mut(),
        None => None,
    };
    let Some(table) = table else {
        return Ok(None);
    };
    match table.get_mut("version").and_then(Item::as_value_mut) {
        Some(current) => {
            let decor = current.decor().clone();
            *current = Value::from(version);
            *current.decor_mut() = decor;
        }
        None => {
            table.insert("version", toml_edit::value(version));
        }
    }
    Ok(Some(doc.to_string()))
}

pub fn set_setup_py_version(content: &str, version: &str) -> Option<String> {
    if SETUP_VERSION.is_match(content) {
        return Some(splice(&SETUP_VERSION, content, version));
    }
    let call = SETUP_CALL.find(content)?;
    Some(format!(
        "{}\n    version=\"{}\",{}",
        &content[..call.end()],
        version,
        &content[call.end()..]
    ))
}

pub fn set_dunder_version(content: &str, version: &str) -> String {
    if DUNDER_VERSION.is_match(content) {
        splice(&DUNDER_VERSION, content, version)
    } else {
        format!("__version__ = \"{}\"\n{}", version, content)
    }
}

fn splice(regex: &Regex, content: &str, version: &str) -> String {
    regex
        .replace_all(content, |caps: &Captures<'_>| {
            format!("{}{}{}", &caps["head"], version, &caps["tail"])
        })
        .into_owned()
}

/// Byte range of the body of the INI section `name`: from the end of its
/// header line to the start of the next header (or end of input).
fn ini_section(content: &str, name: &str) -> Option<(usize, usize)> {
    let mut offset = 0;
    let mut body_start = None;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            if body_start.is_some() {
                return body_start.map(|start| (start, offset));
            }
            if trimmed[1..trimmed.len() - 1].trim().eq_ignore_ascii_case(name) {
                body_start = Some(offset + line.len());
            }
        }
        offset += line.len();
    }
    body_start.map(|start| (start, content.len()))
}

pub fn setup_cfg_version(content: &str) -> Option<String> {
    let (start, end) = ini_section(content, "metadata")?;
    content[start..end]
        .lines()
        .find_map(|line| CFG_VERSION.captures(line))
        .map(|caps| caps["value"].trim().to_string())
}

pub fn set_setup_cfg_version(content: &str, version: &str) -> Option<String> {
    let (start, end) = ini_section(content, "metadata")?;
    let mut offset = start;
    for line in content[start..end].split_inclusive('\n') {
        if let Some(caps) = CFG_VERSION.captures(line)
            && let Some(value) = caps.name("value")
        {
            return Some(format!(
                "{}{}{}",
                &content[..offset + value.start()],
                version,
                &content[offset + value.end()..]
            ));
        }
        offset += line.len();
    }
    let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let header_break = if start > 0 && content[..start].ends_with('\n') {
        ""
    } else {
        newline
    };
    Some(format!(
        "{}{}version = {}{}{}",
        &content[..start],
        header_break,
        version,
        newline,
        &content[start..]
    ))
}

impl VersionHandler for PythonHandler {
    fn extract(&self, path: &Path) -> Result<StoredVersions> {
        let Some(format) = PythonFormat::detect(path) else {
            return Ok(StoredVersions::default());
        };
        let content = read_text(path)?;
        let version = match format {
            PythonFormat::PyProject => pyproject_version(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?,
            PythonFormat::SetupPy => SETUP_VERSION
                .captures(&content)
                .map(|caps| caps["value"].to_string()),
            PythonFormat::SetupCfg => setup_cfg_version(&content),
            PythonFormat::VersionPy => DUNDER_VERSION
                .captures(&content)
                .map(|caps| caps["value"].to_string()),
        };
        Ok(version.map(StoredVersions::single).unwrap_or_default())
    }

    fn apply(&self, path: &Path, set: &VersionedSet, suffix: Option<&str>) -> Result<()> {
        let Some(format) = PythonFormat::detect(path) else {
            warn!(file = %path.display(), "Not a recognised Python packaging file");
            return Ok(());
        };
        let content = read_text(path)?;
        let version = text_version(set, suffix);
        let updated = match format {
            PythonFormat::PyProject => set_pyproject_version(&content, &version)
                .with_context(|| format!("Failed to update {}", path.display()))?,
            PythonFormat::SetupPy => set_setup_py_version(&content, &version),
            PythonFormat::SetupCfg => set_setup_cfg_version(&content, &version),
            PythonFormat::VersionPy => Some(set_dunder_version(&content, &version)),
        };
        let Some(updated) = updated else {
            warn!(file = %path.display(), "No place to store a version, leaving file unchanged");
            return Ok(());
        };
        if write_if_changed(path, &content, &updated)? {
            info!(file = %path.display(), %version, "Updated Python version");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_pyproject_project_table() {
        let content = concat!(
            "[project]\n",
            "name = \"svc\"\n",
            "version = \"0.1.0\" # managed\n",
            "\n",
            "[tool.black]\n",
            "line-length = 100\n",
        );
        let updated = set_pyproject_version(content, "25.10.3").unwrap().unwrap();
        assert_eq!(updated, content.replace("0.1.0", "25.10.3"));
        assert_eq!(pyproject_version(&updated).unwrap().as_deref(), Some("25.10.3"));
    }

    #[test]
    fn test_pyproject_poetry_and_missing_tables() {
        let poetry = "[tool.poetry]\nname = \"svc\"\n";
        let updated = set_pyproject_version(poetry, "1.0.0").unwrap().unwrap();
        assert_eq!(pyproject_version(&updated).unwrap().as_deref(), Some("1.0.0"));

        assert_eq!(set_pyproject_version("[build-system]\n", "1.0.0").unwrap(), None);
    }

    #[test]
    fn test_setup_py() {
        let content =
            "from setuptools import setup\n\nsetup(\n    name='svc',\n    version='0.1',\n)\n";
        assert_eq!(
            set_setup_py_version(content, "2.0.0").unwrap(),
            content.replace("'0.1'", "'2.0.0'")
        );

        let without = "setup(name='svc')\n";
        assert_eq!(
            set_setup_py_version(without, "2.0.0").unwrap(),
            "setup(\n    version=\"2.0.0\",name='svc')\n"
        );
        assert_eq!(set_setup_py_version("print('hi')\n", "2.0.0"), None);
    }

    #[test]
    fn test_setup_cfg_only_metadata_section() {
        let content = "[options]\nversion = ignored\n\n[metadata]\nname = svc\nversion = 0.1\n";
        let updated = set_setup_cfg_version(content, "3.1.4").unwrap();
        assert_eq!(
            updated,
            "[options]\nversion = ignored\n\n[metadata]\nname = svc\nversion = 3.1.4\n"
        );
        assert_eq!(setup_cfg_version(&updated).as_deref(), Some("3.1.4"));
    }

    #[test]
    fn test_setup_cfg_version_inserted_under_header() {
        let content = "[metadata]\nname = svc\n[options]\nzip_safe = False\n";
        assert_eq!(
            set_setup_cfg_version(content, "1.2.3").unwrap(),
            "[metadata]\nversion = 1.2.3\nname = svc\n[options]\nzip_safe = False\n"
        );
        assert_eq!(set_setup_cfg_version("[options]\n", "1.2.3"), None);
    }

    #[test]
    fn test_dunder_version() {
        assert_eq!(set_dunder_version("__version__ = '0.0.1'\n", "1.0"), "__version__ = '1.0'\n");
        assert_eq!(
            set_dunder_version("# generated\n", "1.0"),
            "__version__ = \"1.0\"\n# generated\n"
        );
    }

    #[test]
    fn test_handler_dispatches_on_file_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("__version__.py");
        fs::write(&path, "__version__ = \"0.0.1\"\n").unwrap();
        let set = VersionedSet::new("25.10.3", "25.10.3", "25.10.3", "", "", "");

        PythonHandler.apply(&path, &set, Some("dev")).unwrap();
        assert_eq!(PythonHandler.extract(&path).unwrap(), StoredVersions::single("25.10.3-dev"));
    }
}
