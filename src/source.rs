//! Artifact source resolution.
//!
//! Computes the interpreter payload tree and the metadata template tree from
//! the working directory and the layout convention. Resolution only reads the
//! filesystem; both sources are checked before any stage mutates anything.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Layout;
use crate::error::{PackageError, Result};

/// Both input trees, verified to exist as directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSources {
    pub payload: PathBuf,
    pub metadata: PathBuf,
}

pub fn resolve(work_dir: &Path, layout: &Layout) -> Result<ResolvedSources> {
    let payload = require_dir(work_dir.join(&layout.payload_dir), "payload tree")?;
    let metadata = require_dir(work_dir.join(&layout.metadata_dir), "metadata template")?;
    debug!(
        payload = %payload.display(),
        metadata = %metadata.display(),
        "resolved sources"
    );
    Ok(ResolvedSources { payload, metadata })
}

fn require_dir(path: PathBuf, what: &'static str) -> Result<PathBuf> {
    if path.is_dir() {
        Ok(path)
    } else {
        Err(PackageError::MissingSource { what, path })
    }
}
