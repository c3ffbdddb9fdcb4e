//! Staging area management.
//!
//! A build stages into `{build_root}/{name_version_architecture}`. The build
//! root is wiped before every build ([`reset`]) and, through the
//! [`StagingArea`] guard, removed again when the build finishes or fails.
//! An exclusive lock next to the build root rejects a second concurrent
//! build against the same root.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::config::Layout;
use crate::error::{PackageError, Result};
use crate::identity::PackageIdentity;

/// Recursively delete `build_root` if it exists.
///
/// A regular file or symlink at that path is removed as well, so a stray file
/// never blocks the next build.
pub fn reset(build_root: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(build_root) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(PackageError::staging("inspecting build root", build_root, e)),
    };

    debug!(path = %build_root.display(), "removing previous build root");
    if metadata.is_dir() {
        fs::remove_dir_all(build_root)
            .map_err(|e| PackageError::staging("removing build root", build_root, e))
    } else {
        fs::remove_file(build_root)
            .map_err(|e| PackageError::staging("removing stale build root file", build_root, e))
    }
}

/// Create the staging root plus the control subtree and the payload install path.
pub fn create_layout(
    build_root: &Path,
    identity: &PackageIdentity,
    control_dir: &Path,
) -> Result<PathBuf> {
    let root = build_root.join(identity.stem());
    for dir in [root.join(control_dir), root.join(identity.payload_install_path())] {
        fs::create_dir_all(&dir)
            .map_err(|e| PackageError::staging("creating staging directory", &dir, e))?;
    }
    Ok(root)
}

/// Scoped staging workspace.
///
/// Created fresh by [`StagingArea::acquire`]; the build root is removed when
/// the guard is dropped unless [`StagingArea::keep`] was called.
#[derive(Debug)]
pub struct StagingArea {
    build_root: PathBuf,
    root: PathBuf,
    control: PathBuf,
    payload: PathBuf,
    keep: bool,
    _lock: BuildLock,
}

impl StagingArea {
    pub fn acquire(work_dir: &Path, layout: &Layout, identity: &PackageIdentity) -> Result<Self> {
        let build_root = work_dir.join(&layout.build_root);
        let lock = BuildLock::acquire(&build_root)?;

        reset(&build_root)?;
        let root = create_layout(&build_root, identity, &layout.control_dir)?;

        Ok(Self {
            control: root.join(&layout.control_dir),
            payload: root.join(identity.payload_install_path()),
            build_root,
            root,
            keep: false,
            _lock: lock,
        })
    }

    /// Leave the build root on disk after the guard is dropped.
    pub fn keep(&mut self) {
        self.keep = true;
    }

    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    /// `{build_root}/{stem}`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn control_dir(&self) -> &Path {
        &self.control
    }

    pub fn payload_dir(&self) -> &Path {
        &self.payload
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.keep {
            debug!(path = %self.build_root.display(), "keeping staging tree");
            return;
        }
        if let Err(e) = reset(&self.build_root) {
            warn!("failed to clean up staging tree: {e}");
        }
    }
}

/// Exclusive lock file `.{build_root}.lock` beside the build root.
///
/// The file is left in place on release. Every build locks the same inode,
/// so a build that opened it before the previous holder let go still
/// contends with later ones.
#[derive(Debug)]
struct BuildLock {
    file: File,
    path: PathBuf,
}

impl BuildLock {
    fn acquire(build_root: &Path) -> Result<Self> {
        let parent = build_root.parent().unwrap_or(Path::new("."));
        let name = build_root
            .file_name()
            .and_then(|part| part.to_str())
            .unwrap_or("build");
        let path = parent.join(format!(".{name}.lock"));

        fs::create_dir_all(parent)
            .map_err(|e| PackageError::staging("creating build root parent", parent, e))?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| PackageError::staging("opening build lock", &path, e))?;
        file.try_lock_exclusive().map_err(|e| {
            PackageError::staging("locking build root (another build is running?)", &path, e)
        })?;

        Ok(Self { file, path })
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(lock = %self.path.display(), "failed to release build lock: {e}");
        }
    }
}
