//! The package assembly pipeline.
//!
//! Stages run strictly in order and each must succeed before the next
//! starts:
//!
//! ```text
//! Idle -> Resolved -> Staged -> Composed -> PermissionsApplied
//!      -> Emitted -> Relocated -> Done
//! ```
//!
//! The first error moves the pipeline to `Failed` and aborts the rest. There
//! are no retries; the staging guard removes the build root on the way out.
//! Running two pipelines against the same build root at once is not
//! supported; the second one fails on the build lock.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::backend::{backend_for, PackageBackend};
use crate::compose::{copy_payload, copy_template};
use crate::config::PackagerConfig;
use crate::error::{PackageError, Result};
use crate::identity::PackageIdentity;
use crate::permissions::{normalize, permission_table};
use crate::preflight::check_required_tools;
use crate::relocate::{relocate, sha256_file};
use crate::source::{resolve, ResolvedSources};
use crate::staging::StagingArea;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Resolved,
    Staged,
    Composed,
    PermissionsApplied,
    Emitted,
    Relocated,
    Done,
    Failed,
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub identity: PackageIdentity,
    pub format: &'static str,
    pub artifact: PathBuf,
    pub artifact_name: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub install_hint: String,
    pub remove_hint: String,
}

pub struct Pipeline {
    config: PackagerConfig,
    work_dir: PathBuf,
    backend: Box<dyn PackageBackend>,
    keep_staging: bool,
    state: PipelineState,
}

impl Pipeline {
    /// Pipeline using the backend named by `config.layout.format`.
    pub fn new(config: PackagerConfig, work_dir: impl Into<PathBuf>) -> Result<Self> {
        let backend = backend_for(&config.layout.format, &config.layout.control_dir)?;
        Ok(Self::with_backend(config, work_dir, backend))
    }

    pub fn with_backend(
        config: PackagerConfig,
        work_dir: impl Into<PathBuf>,
        backend: Box<dyn PackageBackend>,
    ) -> Self {
        Self {
            config,
            work_dir: work_dir.into(),
            backend,
            keep_staging: false,
            state: PipelineState::Idle,
        }
    }

    /// Leave the staging tree under the build root after the run.
    pub fn keep_staging(mut self, keep: bool) -> Self {
        self.keep_staging = keep;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn backend(&self) -> &dyn PackageBackend {
        self.backend.as_ref()
    }

    /// Resolve sources and check host tools without touching the filesystem.
    pub fn check(&self) -> Result<ResolvedSources> {
        self.config.layout.validate()?;
        let sources = resolve(&self.work_dir, &self.config.layout)?;
        check_required_tools(&self.backend.required_tools())?;
        Ok(sources)
    }

    /// Run every stage once.
    #[instrument(skip_all, fields(package = %self.config.identity, format = self.backend.name()))]
    pub fn run(&mut self) -> Result<BuildReport> {
        if self.state != PipelineState::Idle {
            return Err(PackageError::Config(format!(
                "pipeline already ran (state {:?})",
                self.state
            )));
        }

        match self.run_stages() {
            Ok(report) => {
                self.advance(PipelineState::Done);
                Ok(report)
            }
            Err(e) => {
                debug!(stage = e.stage(), "build failed after {:?}", self.state);
                self.state = PipelineState::Failed;
                Err(e)
            }
        }
    }

    fn run_stages(&mut self) -> Result<BuildReport> {
        let sources = self.check()?;
        self.advance(PipelineState::Resolved);

        let identity = self.config.identity.clone();
        let layout = self.config.layout.clone();
        let mut staging = StagingArea::acquire(&self.work_dir, &layout, &identity)?;
        if self.keep_staging {
            staging.keep();
        }
        self.advance(PipelineState::Staged);

        copy_template(&sources.metadata, staging.root())?;
        copy_payload(&sources.payload, staging.payload_dir())?;
        self.advance(PipelineState::Composed);

        normalize(
            staging.root(),
            &permission_table(&identity, &layout.control_dir),
        )?;
        self.advance(PipelineState::PermissionsApplied);

        let produced = self.backend.emit(staging.root(), &identity)?;
        self.advance(PipelineState::Emitted);

        let artifact = relocate(&produced, &self.work_dir)?;
        self.advance(PipelineState::Relocated);

        self.report(&identity, artifact)
    }

    fn report(&self, identity: &PackageIdentity, artifact: PathBuf) -> Result<BuildReport> {
        let hash_failure = |detail: String| PackageError::RelocateFailure {
            from: artifact.clone(),
            to: artifact.clone(),
            detail,
        };
        let size_bytes = fs::metadata(&artifact)
            .map_err(|e| hash_failure(format!("reading relocated artifact: {e}")))?
            .len();
        let sha256 =
            sha256_file(&artifact).map_err(|e| hash_failure(format!("hashing artifact: {e}")))?;
        let artifact_name = identity.artifact_filename(self.backend.extension());

        Ok(BuildReport {
            identity: identity.clone(),
            format: self.backend.name(),
            install_hint: self.backend.install_hint(&artifact_name, identity),
            remove_hint: self.backend.remove_hint(&artifact_name, identity),
            artifact,
            artifact_name,
            size_bytes,
            sha256,
        })
    }

    fn advance(&mut self, next: PipelineState) {
        info!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Build with the configuration found in `work_dir`.
pub fn build_in(work_dir: &Path) -> Result<BuildReport> {
    let config = PackagerConfig::load(work_dir, None)?;
    Pipeline::new(config, work_dir)?.run()
}
