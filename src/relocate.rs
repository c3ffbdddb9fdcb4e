//! Artifact relocation from the build root to the stable output location.
//!
//! Within one filesystem this is a single `rename`, which atomically replaces
//! any previous artifact of the same name. Only when `rename` reports `EXDEV`
//! (source and destination on different filesystems) is the artifact copied to a hidden temporary file in the destination directory and then
//! renamed over the final name; the destination name still only ever refers
//! to a complete file, but the source is removed only after the rename, so an
//! interruption can leave the temporary file or the source behind.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{PackageError, Result};

/// Move `produced` into `destination_dir`, keeping its file name.
pub fn relocate(produced: &Path, destination_dir: &Path) -> Result<PathBuf> {
    move_with(produced, destination_dir, |from, to| fs::rename(from, to))
}

fn move_with<F>(produced: &Path, destination_dir: &Path, rename: F) -> Result<PathBuf>
where
    F: Fn(&Path, &Path) -> io::Result<()>,
{
    let file_name = produced.file_name().ok_or_else(|| PackageError::RelocateFailure {
        from: produced.to_path_buf(),
        to: destination_dir.to_path_buf(),
        detail: "produced artifact has no file name".to_string(),
    })?;
    let destination = destination_dir.join(file_name);
    let fail = |detail: String| PackageError::RelocateFailure {
        from: produced.to_path_buf(),
        to: destination.clone(),
        detail,
    };

    if destination.is_dir() {
        return Err(fail("destination exists and is a directory".to_string()));
    }

    match rename(produced, &destination) {
        Ok(()) => {}
        Err(e) if e.raw_os_error() != Some(libc::EXDEV) => {
            return Err(fail(format!("rename: {e}")));
        }
        Err(rename_err) => {
            debug!("rename crosses filesystems ({rename_err}), falling back to copy");
            copy_then_rename(produced, &destination)
                .map_err(|e| fail(format!("rename: {rename_err}; copy fallback: {e}")))?;
            if let Err(e) = fs::remove_file(produced) {
                warn!("relocated artifact but could not remove '{}': {e}", produced.display());
            }
        }
    }

    Ok(destination)
}

fn copy_then_rename(src: &Path, dst: &Path) -> io::Result<()> {
    let parent = dst.parent().unwrap_or(Path::new("."));
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = parent.join(format!(".{name}.partial"));

    let result = fs::copy(src, &partial)
        .and_then(|_| File::open(&partial)?.sync_all())
        .and_then(|_| fs::rename(&partial, dst));
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

/// Hex-encoded SHA-256 of `path`.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}
