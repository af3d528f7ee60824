use rulebook_types::VersionId;

/// Errors produced by history operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("version not found: {0}")]
    VersionNotFound(VersionId),

    #[error("file {path} not found in version {version}")]
    FileNotFound { version: VersionId, path: String },

    #[error("history index is corrupt at line {line}: {reason}")]
    CorruptIndex { line: usize, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    Store(#[from] rulebook_store::StoreError),

    #[error("diff error: {0}")]
    Diff(#[from] rulebook_diff::DiffError),
}

pub type HistoryResult<T> = Result<T, HistoryError>;
