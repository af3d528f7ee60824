//! Foundation types for rulebook.
//!
//! This crate provides the identifiers and records shared by every other
//! rulebook crate: which package a tree belongs to, which historical version
//! a snapshot is, and how two trees differ.
//!
//! # Key Types
//!
//! - [`PackageId`] -- Name of an externally published asset package (`efatura`, `edefter`)
//! - [`VersionId`] -- Package-scoped, monotonically increasing version number (`efatura/v3`)
//! - [`ContentHash`] -- BLAKE3 digest of a file's content
//! - [`FileDiffSummary`] / [`FileDiffDetail`] -- Per-file change classification and unified diff
//! - [`AssetVersion`] -- Immutable history record produced by an approval
//! - [`SyncPreview`] -- What an approval would do, shown to the operator before committing
//! - [`SuppressionWarning`] -- Suppression rules affected by a staged rule-set change

pub mod diff;
pub mod error;
pub mod hash;
pub mod package;
pub mod version;

pub use diff::{FileChangeStatus, FileDiffDetail, FileDiffSummary, FilesSummary};
pub use error::TypeError;
pub use hash::ContentHash;
pub use package::{PackageId, VersionId};
pub use version::{AssetVersion, ImpactKind, SuppressionWarning, SyncPreview, WarningSeverity};
