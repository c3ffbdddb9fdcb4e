//! Package emitters.
//!
//! A backend serializes a fully composed, permission-normalized staging tree
//! into one archive inside the build root. Backends never touch the staging
//! or composition logic, so a new package format is one more implementation
//! of [`PackageBackend`]:
//! - [`deb`] - Debian packages via `dpkg-deb`
//! - [`tarball`] - zstd-compressed tarballs, built in-process

pub mod deb;
pub mod tarball;

use std::path::{Path, PathBuf};

use crate::error::{PackageError, Result};
use crate::identity::PackageIdentity;

pub use deb::DebBackend;
pub use tarball::TarZstBackend;

/// Names accepted by [`backend_for`].
pub const BACKEND_NAMES: &[&str] = &[deb::NAME, tarball::NAME];

pub trait PackageBackend {
    /// Short name used in configuration and on the command line.
    fn name(&self) -> &'static str;

    /// Artifact file extension, without the leading dot.
    fn extension(&self) -> &'static str;

    /// Host tools needed by [`PackageBackend::emit`], as (command, providing package).
    fn required_tools(&self) -> Vec<(&str, &'static str)> {
        Vec::new()
    }

    /// Serialize `staging_root` and return the produced artifact path.
    ///
    /// The artifact lands next to `staging_root` and is named
    /// `{staging dir name}.{extension}`.
    fn emit(&self, staging_root: &Path, identity: &PackageIdentity) -> Result<PathBuf>;

    /// Shell command that installs `artifact`.
    fn install_hint(&self, artifact: &str, identity: &PackageIdentity) -> String;

    /// Shell command that removes everything installing `artifact` put in place.
    fn remove_hint(&self, artifact: &str, identity: &PackageIdentity) -> String;
}

pub fn backend_for(name: &str, control_dir: &Path) -> Result<Box<dyn PackageBackend>> {
    match name {
        deb::NAME => Ok(Box::new(DebBackend::new(control_dir))),
        tarball::NAME => Ok(Box::new(TarZstBackend::new(control_dir))),
        other => Err(PackageError::Config(format!(
            "unknown package format '{}' (expected one of: {})",
            other,
            BACKEND_NAMES.join(", ")
        ))),
    }
}

/// `{parent}/{staging dir name}.{extension}`.
pub(crate) fn artifact_path_for(staging_root: &Path, extension: &str) -> Result<PathBuf> {
    let stem = staging_root
        .file_name()
        .and_then(|part| part.to_str())
        .ok_or_else(|| {
            PackageError::Config(format!(
                "staging root '{}' has no usable directory name",
                staging_root.display()
            ))
        })?;
    let parent = staging_root.parent().unwrap_or(Path::new("."));
    Ok(parent.join(format!("{stem}.{extension}")))
}
