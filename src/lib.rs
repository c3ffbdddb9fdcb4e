//! Packages the PSU interpreter tree into an installable system package.
//!
//! The crate is a linear, fail-fast pipeline:
//!
//! - **Source resolution** - locate the payload and metadata template trees
//! - **Staging** - a fresh, locked, self-cleaning build root
//! - **Composition** - copy the template and payload into the staging tree
//! - **Permissions** - executable control scripts, read-only docs and man pages
//! - **Emission** - serialize the tree through a [`backend::PackageBackend`]
//! - **Relocation** - move the artifact into the working directory
//!
//! # Architecture
//!
//! ```text
//! psu-packager (binary)
//!     │
//!     └── Pipeline ── resolve ── StagingArea ── compose ── permissions
//!                                                            │
//!                        relocate ── PackageBackend (deb | tar-zst)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use psu_packager::{PackagerConfig, Pipeline};
//! use std::path::Path;
//!
//! let work_dir = Path::new(".");
//! let config = PackagerConfig::load(work_dir, None)?;
//! let report = Pipeline::new(config, work_dir)?.run()?;
//! println!("built {}", report.artifact_name);
//! # Ok::<(), psu_packager::PackageError>(())
//! ```

pub mod backend;
pub mod compose;
pub mod config;
pub mod error;
pub mod identity;
pub mod permissions;
pub mod pipeline;
pub mod preflight;
pub mod relocate;
pub mod source;
pub mod staging;

pub use config::{Layout, PackagerConfig};
pub use error::{PackageError, Result};
pub use identity::PackageIdentity;
pub use pipeline::{BuildReport, Pipeline, PipelineState};
