//! Tree composition: copies the metadata template and the interpreter payload
//! into the staging tree.
//!
//! Both copies are whole-tree and non-incremental. Sources are never
//! modified. A failed copy leaves whatever was already written; cleanup is
//! the staging guard's job.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, instrument};

use crate::error::{PackageError, Result};

/// Copy the metadata template into the staging root, preserving structure.
#[instrument(skip_all, fields(src = %src.display()))]
pub fn copy_template(src: &Path, staging_root: &Path) -> Result<u64> {
    let copied = copy_dir_recursive(src, staging_root)?;
    debug!(files = copied, "template copied");
    Ok(copied)
}

/// Copy the interpreter tree into the fixed payload install path.
#[instrument(skip_all, fields(src = %src.display()))]
pub fn copy_payload(src: &Path, payload_dir: &Path) -> Result<u64> {
    let copied = copy_dir_recursive(src, payload_dir)?;
    debug!(files = copied, "payload copied");
    Ok(copied)
}

/// Recursively copy a directory, preserving symlinks.
///
/// Creates `dst` if needed and overwrites files that already exist there.
/// Returns the number of files and symlinks written. An empty `src`
/// produces an empty `dst`.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<u64> {
    let fail = |from: &Path, to: &Path| {
        let (from, to) = (from.to_path_buf(), to.to_path_buf());
        move |source: io::Error| PackageError::CopyFailure { from, to, source }
    };

    fs::create_dir_all(dst).map_err(fail(src, dst))?;

    let mut copied = 0;
    for entry in fs::read_dir(src).map_err(fail(src, dst))? {
        let entry = entry.map_err(fail(src, dst))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(fail(&src_path, &dst_path))?;

        if file_type.is_symlink() {
            let target = fs::read_link(&src_path).map_err(fail(&src_path, &dst_path))?;
            if fs::symlink_metadata(&dst_path).is_ok() {
                fs::remove_file(&dst_path).map_err(fail(&src_path, &dst_path))?;
            }
            std::os::unix::fs::symlink(&target, &dst_path).map_err(fail(&src_path, &dst_path))?;
            copied += 1;
        } else if file_type.is_dir() {
            copied += copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).map_err(fail(&src_path, &dst_path))?;
            copied += 1;
        }
    }

    Ok(copied)
}
