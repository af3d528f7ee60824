use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid package id {0:?}: must be non-empty and contain no path separators")]
    InvalidPackageId(String),

    #[error("invalid version id {0:?}: expected <package>/v<number>")]
    InvalidVersionId(String),
}
