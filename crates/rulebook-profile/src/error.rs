//! Error types for the profile crate.

/// Errors produced by profile operations.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// No profile with this name exists.
    #[error("profile not found: {0}")]
    NotFound(String),

    /// Following `extends` revisited a profile.
    #[error("cyclic profile inheritance: {}", chain.join(" -> "))]
    Cycle { profile: String, chain: Vec<String> },

    /// A profile extends one that does not exist.
    #[error("profile '{profile}' extends unknown profile '{parent}'")]
    MissingParent { profile: String, parent: String },

    /// Profile names must be non-blank.
    #[error("invalid profile name: {0:?}")]
    InvalidName(String),

    /// The profile document could not be parsed or written.
    #[error("profile document error: {0}")]
    Document(String),

    /// Reading or writing the document failed.
    #[error("store error: {0}")]
    Store(#[from] rulebook_store::StoreError),

    /// Comparing staged Schematron files failed.
    #[error("diff error: {0}")]
    Diff(#[from] rulebook_diff::DiffError),
}

/// Convenience alias for profile results.
pub type ProfileResult<T> = Result<T, ProfileError>;
