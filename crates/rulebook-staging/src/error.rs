//! Error types for the staging crate.

use rulebook_types::PackageId;

/// Errors that can occur during staging operations.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// Nothing is staged for the package.
    #[error("no pending staging for package {0}")]
    NoPending(PackageId),

    /// An entry was offered to another package's slot.
    #[error("staging entry for {actual} offered to slot of {expected}")]
    PackageMismatch {
        expected: PackageId,
        actual: PackageId,
    },

    /// The path exists in neither the staged nor the base tree.
    #[error("file {path} not found in pending staging of {package}")]
    FileNotFound { package: PackageId, path: String },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] rulebook_store::StoreError),

    /// Diff computation failed.
    #[error("diff error: {0}")]
    Diff(#[from] rulebook_diff::DiffError),
}

/// Convenience alias for staging results.
pub type StagingResult<T> = Result<T, StagingError>;
