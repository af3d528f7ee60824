//! Error types for the versioning crate.

use std::path::PathBuf;

use rulebook_history::HistoryError;
use rulebook_staging::StagingError;
use rulebook_types::{PackageId, VersionId};

/// Errors produced by the versioning service.
#[derive(Debug, thiserror::Error)]
pub enum VersioningError {
    /// The package is not configured.
    #[error("unknown package: {0}")]
    UnknownPackage(PackageId),

    /// Approve, reject or a pending query with nothing staged.
    #[error("no pending staging for package {0}")]
    NoPendingStaging(PackageId),

    #[error("version not found: {0}")]
    VersionNotFound(VersionId),

    /// The path is in neither tree of a version or pending staging.
    #[error("file {path} not found in {scope}")]
    FileNotFound { scope: String, path: String },

    /// The fetcher could not produce a tree.
    #[error("fetching {package} failed: {source}")]
    Fetch {
        package: PackageId,
        #[source]
        source: FetchError,
    },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] rulebook_store::StoreError),

    #[error("history error: {0}")]
    History(HistoryError),

    #[error("staging error: {0}")]
    Staging(StagingError),

    #[error("diff error: {0}")]
    Diff(#[from] rulebook_diff::DiffError),

    #[error("profile error: {0}")]
    Profile(#[from] rulebook_profile::ProfileError),
}

impl VersioningError {
    /// The referenced package, version, pending entry or file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownPackage(_) | Self::VersionNotFound(_) | Self::FileNotFound { .. }
        ) || matches!(self, Self::Profile(rulebook_profile::ProfileError::NotFound(_)))
    }

    /// The operation is not valid in the package's current state.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::NoPendingStaging(_))
    }
}

impl From<HistoryError> for VersioningError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::VersionNotFound(id) => Self::VersionNotFound(id),
            HistoryError::FileNotFound { version, path } => Self::FileNotFound {
                scope: format!("version {version}"),
                path,
            },
            other => Self::History(other),
        }
    }
}

impl From<StagingError> for VersioningError {
    fn from(e: StagingError) -> Self {
        match e {
            StagingError::NoPending(package) => Self::NoPendingStaging(package),
            StagingError::FileNotFound { package, path } => Self::FileNotFound {
                scope: format!("pending staging of {package}"),
                path,
            },
            StagingError::Store(e) => Self::Store(e),
            StagingError::Diff(e) => Self::Diff(e),
            other => Self::Staging(other),
        }
    }
}

/// Errors raised while fetching a package.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The package has no source the fetcher can read.
    #[error("no source configured")]
    NoSource,

    #[error("source {0} does not exist")]
    SourceMissing(PathBuf),

    #[error(transparent)]
    Store(#[from] rulebook_store::StoreError),

    #[error("{0}")]
    Other(String),
}

/// Errors raised while loading service configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(String),

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Convenience alias for versioning results.
pub type VersioningResult<T> = Result<T, VersioningError>;
