//! Build configuration: package identity plus the filesystem layout convention.
//!
//! Defaults are compiled in. A `psu-packager.toml` in the working directory
//! (or an explicit path) overrides individual fields:
//!
//! ```toml
//! [package]
//! name = "psu"
//! version = "0.1.0"
//! architecture = "all"
//!
//! [layout]
//! payload_dir = "interpreter"
//! metadata_dir = "packages/debian"
//! build_root = "build"
//! control_dir = "DEBIAN"
//! format = "deb"
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{one_line, PackageError, Result};
use crate::identity::PackageIdentity;

pub const CONFIG_FILENAME: &str = "psu-packager.toml";

pub const DEFAULT_NAME: &str = "psu";
pub const DEFAULT_VERSION: &str = "0.1.0";
pub const DEFAULT_ARCHITECTURE: &str = "all";

/// Relative layout convention, resolved against the invocation's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub payload_dir: PathBuf,
    pub metadata_dir: PathBuf,
    pub build_root: PathBuf,
    pub control_dir: PathBuf,
    pub format: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            payload_dir: PathBuf::from("interpreter"),
            metadata_dir: PathBuf::from("packages/debian"),
            build_root: PathBuf::from("build"),
            control_dir: PathBuf::from("DEBIAN"),
            format: "deb".to_string(),
        }
    }
}

impl Layout {
    /// Reject layouts where resetting the build root would delete an input tree.
    ///
    /// The build root must name a real subdirectory and must neither equal,
    /// contain, nor sit inside the payload or metadata directory.
    pub fn validate(&self) -> Result<()> {
        let build_root = lexical(&self.build_root);
        if build_root.as_os_str().is_empty() {
            return Err(PackageError::Config(format!(
                "build_root '{}' must name a subdirectory of the working directory",
                self.build_root.display()
            )));
        }
        if lexical(&self.control_dir).as_os_str().is_empty() {
            return Err(PackageError::Config("control_dir must not be empty".into()));
        }

        for (field, source) in [
            ("payload_dir", &self.payload_dir),
            ("metadata_dir", &self.metadata_dir),
        ] {
            let source = lexical(source);
            if source.starts_with(&build_root) || build_root.starts_with(&source) {
                return Err(PackageError::Config(format!(
                    "build_root '{}' overlaps {field} '{}'",
                    self.build_root.display(),
                    source.display()
                )));
            }
        }
        Ok(())
    }
}

/// `path` without `.` components, so `./build` and `build` compare equal.
fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

#[derive(Debug, Clone)]
pub struct PackagerConfig {
    pub identity: PackageIdentity,
    pub layout: Layout,
}

impl PackagerConfig {
    pub fn new(identity: PackageIdentity, layout: Layout) -> Self {
        Self { identity, layout }
    }

    /// Built-in constants with the default layout.
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(
            PackageIdentity::new(DEFAULT_NAME, DEFAULT_VERSION, DEFAULT_ARCHITECTURE)?,
            Layout::default(),
        ))
    }

    /// Load the config for `work_dir`.
    ///
    /// An explicit path must exist. Without one, `psu-packager.toml` in
    /// `work_dir` is used when present and the built-in defaults otherwise.
    pub fn load(work_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => work_dir.join(path),
            None => {
                let candidate = work_dir.join(CONFIG_FILENAME);
                if !candidate.is_file() {
                    debug!("no {} in {}, using defaults", CONFIG_FILENAME, work_dir.display());
                    return Self::builtin();
                }
                candidate
            }
        };

        let text = fs::read_to_string(&path).map_err(|e| {
            PackageError::Config(format!("reading config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&text)
            .map_err(|e| PackageError::Config(format!("config '{}': {e}", path.display())))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let parsed: PackagerToml =
            toml::from_str(text).map_err(|e| PackageError::Config(one_line(&e.to_string())))?;

        let package = parsed.package.unwrap_or_default();
        let identity = PackageIdentity::new(
            package.name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
            package.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            package
                .architecture
                .unwrap_or_else(|| DEFAULT_ARCHITECTURE.to_string()),
        )?;

        let defaults = Layout::default();
        let layout = match parsed.layout {
            None => defaults,
            Some(raw) => Layout {
                payload_dir: relative_or(raw.payload_dir, defaults.payload_dir, "payload_dir")?,
                metadata_dir: relative_or(raw.metadata_dir, defaults.metadata_dir, "metadata_dir")?,
                build_root: relative_or(raw.build_root, defaults.build_root, "build_root")?,
                control_dir: relative_or(raw.control_dir, defaults.control_dir, "control_dir")?,
                format: raw.format.unwrap_or(defaults.format),
            },
        };

        layout.validate()?;
        Ok(Self::new(identity, layout))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackagerToml {
    package: Option<PackageToml>,
    layout: Option<LayoutToml>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackageToml {
    name: Option<String>,
    version: Option<String>,
    architecture: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutToml {
    payload_dir: Option<String>,
    metadata_dir: Option<String>,
    build_root: Option<String>,
    control_dir: Option<String>,
    format: Option<String>,
}

fn relative_or(raw: Option<String>, default: PathBuf, field: &str) -> Result<PathBuf> {
    match raw {
        Some(raw) => parse_relative_path(&raw, field),
        None => Ok(default),
    }
}

fn parse_relative_path(raw: &str, field: &str) -> Result<PathBuf> {
    let candidate = Path::new(raw.trim());
    if candidate.is_absolute() {
        return Err(PackageError::Config(format!(
            "{field} must be relative, got absolute path '{raw}'"
        )));
    }
    for component in candidate.components() {
        if matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        ) {
            return Err(PackageError::Config(format!(
                "{field} contains invalid traversal/root component in '{raw}'"
            )));
        }
    }
    Ok(candidate.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_defaults() {
        let config = PackagerConfig::builtin().unwrap();
        assert_eq!(config.identity.stem(), "psu_0.1.0_all");
        assert_eq!(config.layout, Layout::default());
    }

    #[test]
    fn test_partial_override() {
        let config = PackagerConfig::from_toml(
            r#"
            [package]
            version = "0.2.0"
            architecture = "amd64"

            [layout]
            format = "tar-zst"
            "#,
        )
        .unwrap();
        assert_eq!(config.identity.stem(), "psu_0.2.0_amd64");
        assert_eq!(config.layout.format, "tar-zst");
        assert_eq!(config.layout.payload_dir, PathBuf::from("interpreter"));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = PackagerConfig::from_toml("[package]\nmaintainer = \"x\"\n").unwrap_err();
        assert!(matches!(err, PackageError::Config(_)));
    }

    #[test]
    fn test_rejects_invalid_identity() {
        let err = PackagerConfig::from_toml("[package]\nname = \"a/b\"\n").unwrap_err();
        assert!(matches!(err, PackageError::InvalidIdentity { .. }));
    }

    #[test]
    fn test_parse_relative_path_rejects_parent_traversal() {
        assert!(parse_relative_path("../etc/passwd", "test").is_err());
        assert!(parse_relative_path("/abs/build", "test").is_err());
        assert!(parse_relative_path("nested/build", "test").is_ok());
    }

    fn layout_with_build_root(build_root: &str) -> Layout {
        Layout {
            build_root: PathBuf::from(build_root),
            ..Layout::default()
        }
    }

    #[test]
    fn test_build_root_cannot_be_working_dir() {
        for root in [".", "./", "./."] {
            let err = layout_with_build_root(root).validate().unwrap_err();
            assert!(matches!(err, PackageError::Config(_)), "{root}");
        }
        assert!(PackagerConfig::from_toml("[layout]\nbuild_root = \".\"\n").is_err());
    }

    #[test]
    fn test_build_root_cannot_contain_sources() {
        // packages/ holds the metadata template
        let err = layout_with_build_root("packages").validate().unwrap_err();
        assert!(err.to_string().contains("metadata_dir"));
        let err = layout_with_build_root("./interpreter").validate().unwrap_err();
        assert!(err.to_string().contains("payload_dir"));
    }

    #[test]
    fn test_build_root_cannot_sit_inside_sources() {
        let err = layout_with_build_root("interpreter/build").validate().unwrap_err();
        assert!(err.to_string().contains("payload_dir"));
        let err = layout_with_build_root("packages/debian/build").validate().unwrap_err();
        assert!(err.to_string().contains("metadata_dir"));
    }

    #[test]
    fn test_build_root_sibling_names_are_fine() {
        // prefix match is per component, not per character
        layout_with_build_root("interpreter-build").validate().unwrap();
        layout_with_build_root("packages-build").validate().unwrap();
        Layout::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_empty_control_dir() {
        let err = PackagerConfig::from_toml("[layout]\ncontrol_dir = \"\"\n").unwrap_err();
        assert!(err.to_string().contains("control_dir"));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = PackagerConfig::load(temp.path(), None).unwrap();
        assert_eq!(config.identity.name(), "psu");
    }

    #[test]
    fn test_load_picks_up_working_dir_file() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILENAME),
            "[package]\nname = \"other\"\n",
        )
        .unwrap();
        let config = PackagerConfig::load(temp.path(), None).unwrap();
        assert_eq!(config.identity.stem(), "other_0.1.0_all");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp = TempDir::new().unwrap();
        let err = PackagerConfig::load(temp.path(), Some(Path::new("nope.toml"))).unwrap_err();
        assert!(matches!(err, PackageError::Config(_)));
    }
}
