//! Version templates and wildcard reconciliation.
//!
//! A version is produced in two steps. First a template such as
//! `*.{0:00}{1:00}.{5}.{2}` is rendered with six positional components:
//!
//! | index | component |
//! |-------|-----------|
//! | `{0}` | major (two-digit year, or the override major) |
//! | `{1}` | minor (month padded to two digits, or the override minor) |
//! | `{2}` | commit count (or the defined patch / override hotfix) |
//! | `{3}` | short hash of the newest commit |
//! | `{4}` | long hash of the newest commit |
//! | `{5}` | day of year of the newest commit (or the override patch) |
//!
//! A format suffix (`{0:00}`) is accepted but ignored: the components are
//! already strings. Then the rendered pattern is reconciled against the
//! version currently stored in the artifact. Every `*` segment carries the
//! stored value forward:
//!
//! ```
//! use versioner::pattern::calculate_from_pattern;
//!
//! assert_eq!(calculate_from_pattern("3.0.0.0", "*.2503.73.12"), "3.2503.73.12");
//! assert_eq!(calculate_from_pattern("", "*.2503.73.12"), "1.2503.73.12");
//! assert_eq!(calculate_from_pattern("3.0.0.0", "25.03.73.12"), "25.03.73.12");
//! ```

use anyhow::{
    Context,
    Result,
};
use chrono::{
    Datelike,
    NaiveDate,
};
use serde::Serialize;

use crate::calendar::TimeFrameWindow;
use crate::config::{
    DEFAULT_VERSION,
    VersionOverride,
    VersioningConfig,
};
use crate::git::Commit;

/// Characters replaced by `-` in a prerelease suffix.
const SUFFIX_FORBIDDEN: [char; 10] = ['/', '\\', ' ', ':', '*', '?', '"', '<', '>', '|'];

/// Descriptions at least this long are replaced rather than extended.
const MAX_CHAINED_DESCRIPTION: usize = 100;

/// Which of the three stored versions a template produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    Assembly,
    File,
    Informational,
}

/// Calendar major/minor after applying an optional override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub hotfix: u32,
    /// Set when an override file replaced any part; selects the override
    /// template variants.
    pub local_override: bool,
}

impl CalendarVersion {
    /// Combine a calendar window with an optional override.
    ///
    /// An override only applies when its major is non-zero; then each
    /// non-zero field replaces the window value.
    pub fn new(window: &TimeFrameWindow, version_override: Option<&VersionOverride>) -> Self {
        let mut version = Self {
            major: window.major,
            minor: window.minor,
            patch: 0,
            hotfix: 0,
            local_override: false,
        };
        if let Some(o) = version_override.filter(|o| o.is_active()) {
            version.major = o.major;
            if o.minor != 0 {
                version.minor = o.minor;
            }
            if o.patch != 0 {
                version.patch = o.patch;
            }
            if o.hotfix != 0 {
                version.hotfix = o.hotfix;
            }
            version.local_override = true;
        }
        version
    }
}

/// The six positional template arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionComponents {
    values: [String; 6],
    local_override: bool,
}

impl VersionComponents {
    pub fn new(
        version: &CalendarVersion,
        newest: &Commit,
        commit_count: usize,
        defined_patch: Option<u32>,
    ) -> Self {
        let mut major = version.major.to_string();
        if major == "0" {
            major = "1".to_string();
        }
        let minor = if version.local_override {
            version.minor.to_string()
        } else {
            format!("{:02}", version.minor)
        };
        let mut count = defined_patch.map_or(commit_count as u64, u64::from).to_string();
        let mut day_of_year = newest.timestamp.ordinal().to_string();

        if version.local_override {
            if version.patch != 0 {
                day_of_year = version.patch.to_string();
            }
            if version.hotfix != 0 {
                count = version.hotfix.to_string();
            }
        }

        Self {
            values: [
                major,
                minor,
                count,
                newest.short_hash.clone(),
                newest.long_hash.clone(),
                day_of_year,
            ],
            local_override: version.local_override,
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn local_override(&self) -> bool {
        self.local_override
    }
}

/// Substitute `{N}` / `{N:fmt}` placeholders with components.
///
/// `{{` and `}}` produce literal braces.
pub fn render_template(template: &str, components: &VersionComponents) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut placeholder = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => placeholder.push(ch),
                        None => anyhow::bail!("Unclosed placeholder in template: {}", template),
                    }
                }
                let index = placeholder.split(':').next().unwrap_or_default().trim();
                let index: usize = index.parse().with_context(|| {
                    format!("Invalid placeholder {{{}}} in template: {}", placeholder, template)
                })?;
                let value = components.get(index).with_context(|| {
                    format!("Placeholder {{{}}} out of range in template: {}", index, template)
                })?;
                out.push_str(value);
            }
            '}' => anyhow::bail!("Unmatched '}}' in template: {}", template),
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Render the template for `kind`, picking the override variant when the
/// components came from an override. npm artifacts use the JS template for
/// every kind.
pub fn generate_pattern(
    config: &VersioningConfig,
    kind: VersionKind,
    components: &VersionComponents,
    npm: bool,
) -> Result<String> {
    let over = components.local_override();
    let template = match (npm, kind, over) {
        (true, _, false) => &config.assembly_version_format_js,
        (true, _, true) => &config.assembly_version_format_js_override,
        (false, VersionKind::Assembly, false) => &config.assembly_version_format,
        (false, VersionKind::Assembly, true) => &config.assembly_version_format_override,
        (false, VersionKind::File, false) => &config.assembly_file_version_format,
        (false, VersionKind::File, true) => &config.assembly_file_version_format_override,
        (false, VersionKind::Informational, false) => &config.assembly_info_version_format,
        (false, VersionKind::Informational, true) => {
            &config.assembly_info_version_format_override
        }
    };
    render_template(template, components)
}

/// Reconcile a rendered pattern with the stored version.
///
/// Without a `*` the pattern is returned as is. Otherwise each `*` segment
/// takes the stored segment at the same position (or `position + 1` when the
/// stored version is shorter) and blank segments are dropped.
pub fn calculate_from_pattern(current: &str, pattern: &str) -> String {
    let current = if current.is_empty() {
        DEFAULT_VERSION
    } else {
        current
    };
    if pattern.is_empty() || !pattern.contains('*') {
        return pattern.to_string();
    }

    let stored: Vec<&str> = current.split('.').collect();
    pattern
        .split('.')
        .enumerate()
        .map(|(i, segment)| {
            if segment.contains('*') {
                stored
                    .get(i)
                    .map_or_else(|| (i + 1).to_string(), |s| s.to_string())
            } else {
                segment.to_string()
            }
        })
        .filter(|segment| !segment.trim().is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Make a prerelease suffix safe for file names and package versions.
pub fn sanitize_suffix(suffix: &str) -> String {
    suffix
        .chars()
        .map(|c| if SUFFIX_FORBIDDEN.contains(&c) { '-' } else { c })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

/// Append `-suffix` when a suffix is given.
pub fn with_suffix(version: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(s) if !s.is_empty() => format!("{}-{}", version, s),
        _ => version.to_string(),
    }
}

/// Convert a four-part version `a.b.c.d` to the npm form `a.b.d`.
pub fn to_npm_semver(version: &str) -> Result<String> {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() < 4 {
        anyhow::bail!("Version must have four parts to convert to npm semver, got: {}", version);
    }
    Ok(format!("{}.{}.{}", parts[0], parts[1], parts[3]))
}

/// `yy.MM.{count}` for the date a run happens on.
pub fn artifact_version(today: NaiveDate, commit_count: usize) -> String {
    format!(
        "{:02}.{:02}.{}",
        today.year().rem_euclid(100),
        today.month(),
        commit_count
    )
}

/// `1.{yyMM}.{count}`, or `{major}.{minor}.{count}` with an override.
pub fn docker_version(
    today: NaiveDate,
    commit_count: usize,
    version_override: Option<&VersionOverride>,
) -> String {
    match version_override {
        Some(o) => format!("{}.{}.{}", o.major, o.minor, commit_count),
        None => format!(
            "1.{:02}{:02}.{}",
            today.year().rem_euclid(100),
            today.month(),
            commit_count
        ),
    }
}

/// Description chaining the change hash and build label onto the old one.
pub fn hash_description(short_hash: &str, build_label: &str, old: &str) -> String {
    if old.len() < MAX_CHAINED_DESCRIPTION && !old.contains('|') {
        format!("ChangeHash:{},BuildLabel:{}|{}", short_hash, build_label, old)
    } else {
        format!("ChangeHash:{},BuildLabel:{}", short_hash, build_label)
    }
}

/// The computed versions handed to every handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedSet {
    pub assembly_version: String,
    pub assembly_info_version: String,
    pub assembly_file_version: String,
    pub build_label: String,
    pub description: String,
    pub short_hash: String,
    pub is_set: bool,
}

impl VersionedSet {
    pub fn new(
        assembly_version: impl Into<String>,
        assembly_info_version: impl Into<String>,
        assembly_file_version: impl Into<String>,
        build_label: impl Into<String>,
        description: impl Into<String>,
        short_hash: impl Into<String>,
    ) -> Self {
        Self {
            assembly_version: assembly_version.into(),
            assembly_info_version: assembly_info_version.into(),
            assembly_file_version: assembly_file_version.into(),
            build_label: build_label.into(),
            description: description.into(),
            short_hash: short_hash.into(),
            is_set: true,
        }
    }

    /// The empty result, for artifacts that were skipped.
    pub fn unset() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;
    use proptest::prelude::*;

    use super::*;

    fn window(major: u32, minor: u32) -> TimeFrameWindow {
        let date = NaiveDate::from_ymd_opt(2000 + major as i32, minor, 1).unwrap();
        TimeFrameWindow {
            name: format!("20{}-{}", major, minor),
            date_start: date,
            date_end: date,
            major,
            minor,
        }
    }

    fn commit(date: &str) -> Commit {
        Commit {
            timestamp: NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S").unwrap(),
            long_hash: "0123456789abcdef0123456789abcdef01234567".to_string(),
            short_hash: "0123456".to_string(),
            directory: ".".into(),
        }
    }

    fn components(
        over: Option<&VersionOverride>,
        count: usize,
        patch: Option<u32>,
    ) -> VersionComponents {
        let version = CalendarVersion::new(&window(25, 3), over);
        VersionComponents::new(&version, &commit("2025-03-14 10:00:00"), count, patch)
    }

    #[test]
    fn test_components_from_calendar() {
        let c = components(None, 42, None);
        let values: Vec<&str> = (0..6).map(|i| c.get(i).unwrap()).collect();
        assert_eq!(
            values,
            [
                "25",
                "03",
                "42",
                "0123456",
                "0123456789abcdef0123456789abcdef01234567",
                "73"
            ]
        );
        assert!(!c.local_override());
    }

    #[test]
    fn test_defined_patch_replaces_commit_count() {
        let c = components(None, 42, Some(7));
        assert_eq!(c.get(2), Some("7"));
    }

    #[test]
    fn test_override_replaces_parts_and_skips_padding() {
        let over = VersionOverride {
            major: 4,
            minor: 2,
            patch: 9,
            hotfix: 5,
        };
        let c = components(Some(&over), 42, None);
        assert!(c.local_override());
        assert_eq!(c.get(0), Some("4"));
        assert_eq!(c.get(1), Some("2"));
        assert_eq!(c.get(2), Some("5"));
        assert_eq!(c.get(5), Some("9"));
    }

    #[test]
    fn test_override_zero_fields_keep_calendar_values() {
        let over = VersionOverride {
            major: 4,
            minor: 0,
            patch: 0,
            hotfix: 0,
        };
        let c = components(Some(&over), 42, None);
        assert_eq!(c.get(1), Some("3"));
        assert_eq!(c.get(2), Some("42"));
        assert_eq!(c.get(5), Some("73"));
    }

    #[test]
    fn test_inactive_override_is_ignored() {
        let over = VersionOverride {
            major: 0,
            minor: 9,
            patch: 0,
            hotfix: 0,
        };
        let c = components(Some(&over), 1, None);
        assert!(!c.local_override());
        assert_eq!(c.get(1), Some("03"));
    }

    #[test]
    fn test_major_zero_renders_as_one() {
        let version = CalendarVersion::new(&window(0, 1), None);
        let c = VersionComponents::new(&version, &commit("2000-01-05 00:00:00"), 1, None);
        assert_eq!(c.get(0), Some("1"));
    }

    #[test]
    fn test_render_template_ignores_format_suffix() {
        let c = components(None, 42, None);
        assert_eq!(
            render_template("*.{0:00}{1:00}.{5}.{2}+{3}", &c).unwrap(),
            "*.2503.73.42+0123456"
        );
        assert_eq!(render_template("{{v{0}}}", &c).unwrap(), "{v25}");
    }

    #[test]
    fn test_render_template_errors() {
        let c = components(None, 1, None);
        assert!(render_template("{6}", &c).is_err());
        assert!(render_template("{x}", &c).is_err());
        assert!(render_template("{0", &c).is_err());
        assert!(render_template("0}", &c).is_err());
    }

    #[test]
    fn test_generate_pattern_selects_template() {
        let config = VersioningConfig::default();
        let c = components(None, 42, None);
        assert_eq!(
            generate_pattern(&config, VersionKind::Informational, &c, false).unwrap(),
            "*.2503.73.42+0123456"
        );
        assert_eq!(
            generate_pattern(&config, VersionKind::Informational, &c, true).unwrap(),
            "*.2503.42"
        );

        let over = VersionOverride {
            major: 4,
            minor: 2,
            patch: 0,
            hotfix: 0,
        };
        let c = components(Some(&over), 42, None);
        assert_eq!(
            generate_pattern(&config, VersionKind::Assembly, &c, false).unwrap(),
            "4.2.73.42"
        );
    }

    #[test]
    fn test_calculate_from_pattern() {
        assert_eq!(calculate_from_pattern("3.1.1.1", "*.2503.73.12"), "3.2503.73.12");
        assert_eq!(calculate_from_pattern("", "*.*.73.12"), "1.0.73.12");
        assert_eq!(calculate_from_pattern("7", "*.*.*"), "7.2.3");
        assert_eq!(calculate_from_pattern("1.0.0.0", ""), "");
        assert_eq!(calculate_from_pattern("1.0.0.0", "2.0"), "2.0");
        assert_eq!(calculate_from_pattern("1..0", "*.*.5"), "1.5");
    }

    #[test]
    fn test_sanitize_suffix() {
        assert_eq!(sanitize_suffix("feature/my branch"), "feature-my-branch");
        assert_eq!(sanitize_suffix("/rc:1|"), "rc-1");
        assert_eq!(sanitize_suffix("beta"), "beta");
        assert_eq!(sanitize_suffix("***"), "");
    }

    #[test]
    fn test_to_npm_semver() {
        assert_eq!(to_npm_semver("1.2503.73.12").unwrap(), "1.2503.12");
        assert!(to_npm_semver("1.2.3").is_err());
    }

    #[test]
    fn test_artifact_and_docker_versions() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(artifact_version(today, 17), "25.03.17");
        assert_eq!(docker_version(today, 17, None), "1.2503.17");
        let over = VersionOverride {
            major: 5,
            minor: 1,
            patch: 0,
            hotfix: 0,
        };
        assert_eq!(docker_version(today, 17, Some(&over)), "5.1.17");
    }

    #[test]
    fn test_hash_description() {
        assert_eq!(
            hash_description("abc1234", "REV_1", "Web API"),
            "ChangeHash:abc1234,BuildLabel:REV_1|Web API"
        );
        assert_eq!(
            hash_description("abc1234", "REV_2", "ChangeHash:old,BuildLabel:REV_1|Web API"),
            "ChangeHash:abc1234,BuildLabel:REV_2"
        );
        let long = "x".repeat(100);
        assert_eq!(
            hash_description("abc1234", "REV_2", &long),
            "ChangeHash:abc1234,BuildLabel:REV_2"
        );
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(with_suffix("1.2.3", Some("rc")), "1.2.3-rc");
        assert_eq!(with_suffix("1.2.3", Some("")), "1.2.3");
        assert_eq!(with_suffix("1.2.3", None), "1.2.3");
    }

    proptest! {
        #[test]
        fn reconciliation_is_idempotent(
            current in "[0-9]{1,4}(\\.[0-9]{1,4}){0,3}",
            pattern in "(\\*|[0-9]{1,4})(\\.(\\*|[0-9]{1,4})){0,3}",
        ) {
            let once = calculate_from_pattern(&current, &pattern);
            let twice = calculate_from_pattern(&once, &pattern);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn pattern_without_wildcard_ignores_current(
            current in "[0-9.]{0,12}",
            pattern in "[0-9]{1,4}(\\.[0-9]{1,4}){0,3}",
        ) {
            prop_assert_eq!(calculate_from_pattern(&current, &pattern), pattern);
        }

        #[test]
        fn sanitized_suffix_has_no_forbidden_chars(s in ".{0,40}") {
            let clean = sanitize_suffix(&s);
            prop_assert!(!clean.contains(SUFFIX_FORBIDDEN));
            prop_assert!(!clean.starts_with('-'));
            prop_assert!(!clean.ends_with('-'));
        }
    }
}
