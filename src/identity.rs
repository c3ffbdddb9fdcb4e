//! Package identity: the (name, version, architecture) triple.
//!
//! The identity is validated once when it is constructed and is immutable
//! for the rest of a build. It determines the staging directory name, the
//! payload install path and the artifact filename.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{PackageError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageIdentity {
    name: String,
    version: String,
    architecture: String,
}

impl PackageIdentity {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        architecture: impl Into<String>,
    ) -> Result<Self> {
        let identity = Self {
            name: name.into(),
            version: version.into(),
            architecture: architecture.into(),
        };
        validate_component("name", &identity.name)?;
        validate_component("version", &identity.version)?;
        validate_component("architecture", &identity.architecture)?;
        Ok(identity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    /// `name_version_architecture`, shared by the staging directory and the artifact.
    pub fn stem(&self) -> String {
        format!("{}_{}_{}", self.name, self.version, self.architecture)
    }

    pub fn artifact_filename(&self, extension: &str) -> String {
        format!("{}.{}", self.stem(), extension)
    }

    /// Payload install path relative to the staging root.
    pub fn payload_install_path(&self) -> PathBuf {
        PathBuf::from("usr/lib").join(&self.name).join("interpreter")
    }

    pub fn doc_path(&self) -> PathBuf {
        PathBuf::from("usr/share/doc").join(&self.name)
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}

fn validate_component(field: &'static str, value: &str) -> Result<()> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.contains(['/', '\\']) {
        Some("must not contain path separators")
    } else if value == "." || value == ".." {
        Some("must not be a relative path component")
    } else if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("must not contain whitespace or control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(PackageError::InvalidIdentity {
            field,
            value: value.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
