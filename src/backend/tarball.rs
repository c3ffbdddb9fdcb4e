//! zstd-compressed tarball backend.
//!
//! Built in-process with `tar` + `zstd`. Entries are written in sorted order
//! with ownership and mtimes pinned, so the same staged tree always yields
//! the same bytes.
//!
//! The archive is extracted straight onto `/`, so it carries only the
//! installed tree. The control directory stays out, and directory entries
//! are written only for directories the package owns. Shared parents such
//! as `usr/share/man` are created by tar on extraction and are never listed.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use tar::{Builder as TarBuilder, EntryType, Header};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use super::{artifact_path_for, PackageBackend};
use crate::error::{PackageError, Result};
use crate::identity::PackageIdentity;

pub const NAME: &str = "tar-zst";
const ZSTD_LEVEL: i32 = 19;

#[derive(Debug, Clone)]
pub struct TarZstBackend {
    control_dir: PathBuf,
}

impl TarZstBackend {
    pub fn new(control_dir: &Path) -> Self {
        let control_dir = control_dir
            .components()
            .filter(|component| !matches!(component, Component::CurDir))
            .collect();
        Self { control_dir }
    }
}

/// Directories removed wholesale on uninstall, relative to `/`.
fn owned_dirs(identity: &PackageIdentity) -> Vec<PathBuf> {
    let payload = identity.payload_install_path();
    let install_root = payload.parent().map(Path::to_path_buf).unwrap_or(payload);
    vec![install_root, identity.doc_path()]
}

impl PackageBackend for TarZstBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn extension(&self) -> &'static str {
        "tar.zst"
    }

    #[instrument(skip_all, fields(backend = NAME, package = %identity))]
    fn emit(&self, staging_root: &Path, identity: &PackageIdentity) -> Result<PathBuf> {
        let output = artifact_path_for(staging_root, self.extension())?;
        let owned = owned_dirs(identity);
        write_archive(staging_root, &output, &self.control_dir, &owned).map_err(|e| {
            PackageError::backend(NAME, staging_root, format!("writing '{}': {e}", output.display()))
        })?;
        info!(artifact = %output.display(), "built tarball");
        Ok(output)
    }

    fn install_hint(&self, artifact: &str, _identity: &PackageIdentity) -> String {
        format!("sudo tar --zstd -xpf {artifact} -C /")
    }

    fn remove_hint(&self, artifact: &str, identity: &PackageIdentity) -> String {
        let owned = owned_dirs(identity)
            .iter()
            .map(|dir| format!("/{}", dir.display()))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "sudo rm -rf {owned} && tar --zstd -tf {artifact} | sed 's|^|/|' | sudo xargs -d '\\n' rm -f --"
        )
    }
}

fn write_archive(
    staging_root: &Path,
    output: &Path,
    control_dir: &Path,
    owned: &[PathBuf],
) -> io::Result<()> {
    let file = File::create(output)?;
    let encoder = zstd::stream::Encoder::new(BufWriter::new(file), ZSTD_LEVEL)?;
    let mut builder = TarBuilder::new(encoder);

    let walker = WalkDir::new(staging_root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry
                .path()
                .strip_prefix(staging_root)
                .map_or(true, |rel| !rel.starts_with(control_dir))
        });

    for entry in walker {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(staging_root)
            .map_err(io::Error::other)?;
        if entry.file_type().is_dir() && !owned.iter().any(|dir| rel.starts_with(dir)) {
            debug!(path = %rel.display(), "shared directory, not archived");
            continue;
        }
        append_entry(&mut builder, entry.path(), rel)?;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?.flush()
}

fn append_entry<W: Write>(builder: &mut TarBuilder<W>, path: &Path, rel: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    let mut header = Header::new_gnu();
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("root")?;
    header.set_groupname("root")?;

    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        header.set_entry_type(EntryType::Symlink);
        header.set_mode(0o777);
        header.set_size(0);
        builder.append_link(&mut header, rel, fs::read_link(path)?)
    } else if file_type.is_dir() {
        header.set_entry_type(EntryType::Directory);
        header.set_mode(mode_bits(&metadata));
        header.set_size(0);
        builder.append_data(&mut header, rel, io::empty())
    } else {
        header.set_entry_type(EntryType::Regular);
        header.set_mode(mode_bits(&metadata));
        header.set_size(metadata.len());
        builder.append_data(&mut header, rel, File::open(path)?)
    }
}

fn mode_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}
