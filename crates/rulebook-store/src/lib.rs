//! Asset tree storage for rulebook.
//!
//! Everything that touches asset directories on disk goes through this crate:
//! scanning a directory into a content-hashed [`AssetTree`], copying trees,
//! replacing a directory in one rename, and the [`LiveTrees`] boundary that
//! owns each package's live directory.
//!
//! # Key Types
//!
//! - [`AssetTree`] / [`TreeEntry`] -- Path-sorted view of a directory with content hashes
//! - [`LiveTrees`] -- Narrow read/replace interface over the live asset directories
//! - [`FsLiveTrees`] -- Filesystem implementation backed by a package-to-directory map
//! - [`PackageLocks`] -- Per-package mutual exclusion

pub mod error;
pub mod fs;
pub mod live;
pub mod locks;
pub mod tree;

pub use error::{StoreError, StoreResult};
pub use fs::{copy_tree, remove_tree, replace_dir};
pub use live::{FsLiveTrees, LiveTrees};
pub use locks::PackageLocks;
pub use tree::{resolve_relative, AssetTree, TreeEntry};
