//! Error taxonomy for the packaging pipeline.
//!
//! Every variant is fatal. The pipeline never retries and never attempts a
//! partial rollback; the first error aborts all later stages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = PackageError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("invalid package identity: {field} {reason} (got '{value}')")]
    InvalidIdentity {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("{0}")]
    Config(String),

    #[error("{what} not found at '{}'", path.display())]
    MissingSource { what: &'static str, path: PathBuf },

    #[error("missing host tools: {0}")]
    MissingTool(String),

    #[error("{action} '{}': {source}", path.display())]
    StagingFailure {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("copying '{}' -> '{}': {source}", from.display(), to.display())]
    CopyFailure {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("setting mode {mode:o} on '{}': {source}", path.display())]
    PermissionFailure {
        path: PathBuf,
        mode: u32,
        #[source]
        source: io::Error,
    },

    #[error("{backend} rejected '{}': {detail}", staging.display())]
    BackendValidationFailure {
        backend: &'static str,
        staging: PathBuf,
        detail: String,
    },

    #[error("moving '{}' -> '{}': {detail}", from.display(), to.display())]
    RelocateFailure {
        from: PathBuf,
        to: PathBuf,
        detail: String,
    },
}

impl PackageError {
    /// Pipeline stage that produced the error, used as the diagnostic prefix.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidIdentity { .. } | Self::Config(_) => "config",
            Self::MissingSource { .. } => "resolve",
            Self::MissingTool(_) => "preflight",
            Self::StagingFailure { .. } => "staging",
            Self::CopyFailure { .. } => "compose",
            Self::PermissionFailure { .. } => "permissions",
            Self::BackendValidationFailure { .. } => "emit",
            Self::RelocateFailure { .. } => "relocate",
        }
    }

    /// `error: <stage>: <detail>`, always a single line.
    pub fn diagnostic(&self) -> String {
        one_line(&format!("error: {}: {}", self.stage(), self))
    }

    pub(crate) fn staging(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::StagingFailure {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn backend(
        backend: &'static str,
        staging: impl Into<PathBuf>,
        detail: impl Into<String>,
    ) -> Self {
        Self::BackendValidationFailure {
            backend,
            staging: staging.into(),
            detail: detail.into(),
        }
    }
}

/// Fold multi-line tool output onto one line, joining non-blank lines with `; `.
pub(crate) fn one_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}
