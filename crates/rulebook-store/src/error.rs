use std::path::PathBuf;

use rulebook_types::PackageId;

/// Errors from asset tree operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O failure on a specific path.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal failed.
    #[error("failed to walk {root}: {reason}")]
    Walk { root: PathBuf, reason: String },

    /// A path expected to be a directory is something else.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The package has no live directory registered.
    #[error("unknown package: {0}")]
    UnknownPackage(PackageId),
}

impl StoreError {
    /// Adapter for `map_err` that attaches the offending path.
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
