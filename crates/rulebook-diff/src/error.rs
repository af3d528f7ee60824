//! Error types for the diff crate.

/// Errors that can occur during diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// The path exists in neither tree.
    #[error("file not found in either tree: {0}")]
    FileNotFound(String),

    /// Reading one side of the comparison failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Tree operation failed.
    #[error("store error: {0}")]
    Store(#[from] rulebook_store::StoreError),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
