//! Permission normalization for the staged tree.
//!
//! The package manager executes control scripts directly, so the control
//! subtree is made executable. Documentation and man pages are static and are
//! stripped of execute bits. Modes are applied per path class, never to the
//! whole tree.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::error::{PackageError, Result};
use crate::identity::PackageIdentity;

pub const EXECUTABLE_MODE: u32 = 0o755;
pub const READ_ONLY_MODE: u32 = 0o644;
pub const DIR_MODE: u32 = 0o755;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Control,
    Documentation,
    ManPages,
}

/// One row of the permission table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRule {
    pub class: PathClass,
    /// Relative to the staging root.
    pub path: PathBuf,
    pub file_mode: u32,
    pub dir_mode: u32,
    /// A required class whose path is missing means an earlier stage broke the layout.
    pub required: bool,
}

/// The fixed table for `identity` with control files under `control_dir`.
pub fn permission_table(identity: &PackageIdentity, control_dir: &Path) -> Vec<PermissionRule> {
    vec![
        PermissionRule {
            class: PathClass::Control,
            path: control_dir.to_path_buf(),
            file_mode: EXECUTABLE_MODE,
            dir_mode: DIR_MODE,
            required: true,
        },
        PermissionRule {
            class: PathClass::Documentation,
            path: identity.doc_path(),
            file_mode: READ_ONLY_MODE,
            dir_mode: DIR_MODE,
            required: true,
        },
        PermissionRule {
            class: PathClass::ManPages,
            path: PathBuf::from("usr/share/man"),
            file_mode: READ_ONLY_MODE,
            dir_mode: DIR_MODE,
            required: false,
        },
    ]
}

/// Apply every rule in `table` under `staging_root`.
#[instrument(skip_all, fields(root = %staging_root.display()))]
pub fn normalize(staging_root: &Path, table: &[PermissionRule]) -> Result<()> {
    for rule in table {
        let target = staging_root.join(&rule.path);
        if fs::symlink_metadata(&target).is_err() {
            if rule.required {
                return Err(PackageError::PermissionFailure {
                    path: target,
                    mode: rule.file_mode,
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "expected path missing from staged tree",
                    ),
                });
            }
            debug!(class = ?rule.class, path = %target.display(), "optional path absent, skipping");
            continue;
        }

        let touched = apply_rule(&target, rule)?;
        debug!(class = ?rule.class, entries = touched, "permissions applied");
    }
    Ok(())
}

fn apply_rule(target: &Path, rule: &PermissionRule) -> Result<u64> {
    let mut touched = 0;
    for entry in WalkDir::new(target).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(target).to_path_buf();
            PackageError::PermissionFailure {
                path,
                mode: rule.file_mode,
                source: e.into(),
            }
        })?;

        let file_type = entry.file_type();
        let mode = if file_type.is_symlink() {
            continue;
        } else if file_type.is_dir() {
            rule.dir_mode
        } else {
            rule.file_mode
        };

        set_mode(entry.path(), mode)?;
        touched += 1;
    }
    Ok(touched)
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
        PackageError::PermissionFailure {
            path: path.to_path_buf(),
            mode,
            source,
        }
    })
}
