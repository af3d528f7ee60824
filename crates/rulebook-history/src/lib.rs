//! Version history for rulebook.
//!
//! Every approval of a staged package appends one [`AssetVersion`] to the
//! history. A version owns a copy of the live tree as it was just before the
//! approval and a copy of the tree that replaced it, so the full diff of any
//! past approval can be recomputed at any time. Nothing in the history is
//! ever updated or removed.
//!
//! # Key Types
//!
//! - [`VersionStore`] -- Read/append boundary for history
//! - [`FsVersionStore`] -- Directory-per-version store with a JSON-lines index
//! - [`SnapshotRequest`] -- The trees captured by one approval
//!
//! [`AssetVersion`]: rulebook_types::AssetVersion

pub mod error;
pub mod fs;
pub mod traits;

pub use error::{HistoryError, HistoryResult};
pub use fs::FsVersionStore;
pub use traits::{SnapshotRequest, VersionStore};
