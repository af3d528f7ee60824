use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use rulebook_types::PackageId;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::fs::{copy_tree, replace_dir};
use crate::tree::AssetTree;

/// Owner of the live asset directory of every package.
///
/// The live tree is what the validation and transformation engines read.
/// Replacement is the only mutation, and callers are expected to have
/// snapshotted the current tree into history before calling
/// [`LiveTrees::replace`]. Implementations must not let `scan` or `copy_to`
/// observe a package midway through `replace`.
pub trait LiveTrees: Send + Sync {
    /// Location of the package's live directory.
    fn location(&self, package: &PackageId) -> StoreResult<&Path>;

    /// Hash the package's current live tree.
    fn scan(&self, package: &PackageId) -> StoreResult<AssetTree>;

    /// Copy the package's current live tree into `dst`.
    fn copy_to(&self, package: &PackageId, dst: &Path) -> StoreResult<usize>;

    /// Make `replacement` the package's live tree.
    fn replace(&self, package: &PackageId, replacement: &Path) -> StoreResult<()>;

    /// Every package with a live directory.
    fn packages(&self) -> Vec<PackageId>;
}

#[derive(Debug)]
struct LiveDir {
    path: PathBuf,
    /// Readers share it; `replace` holds it exclusively across its renames.
    guard: RwLock<()>,
}

/// Filesystem-backed [`LiveTrees`].
#[derive(Debug, Default)]
pub struct FsLiveTrees {
    dirs: BTreeMap<PackageId, LiveDir>,
}

impl FsLiveTrees {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the live directory of a package.
    pub fn register(&mut self, package: PackageId, dir: impl Into<PathBuf>) {
        self.dirs.insert(
            package,
            LiveDir {
                path: dir.into(),
                guard: RwLock::new(()),
            },
        );
    }

    /// Builder form of [`Self::register`].
    pub fn with(mut self, package: PackageId, dir: impl Into<PathBuf>) -> Self {
        self.register(package, dir);
        self
    }

    fn dir(&self, package: &PackageId) -> StoreResult<&LiveDir> {
        self.dirs
            .get(package)
            .ok_or_else(|| StoreError::UnknownPackage(package.clone()))
    }

    /// Run `f` on the package's live directory with replacement held off.
    fn read<T>(&self, package: &PackageId, f: impl FnOnce(&Path) -> StoreResult<T>) -> StoreResult<T> {
        let dir = self.dir(package)?;
        let _read = dir.guard.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&dir.path)
    }
}

impl LiveTrees for FsLiveTrees {
    fn location(&self, package: &PackageId) -> StoreResult<&Path> {
        self.dir(package).map(|dir| dir.path.as_path())
    }

    fn scan(&self, package: &PackageId) -> StoreResult<AssetTree> {
        self.read(package, AssetTree::scan)
    }

    fn copy_to(&self, package: &PackageId, dst: &Path) -> StoreResult<usize> {
        self.read(package, |live| copy_tree(live, dst))
    }

    fn replace(&self, package: &PackageId, replacement: &Path) -> StoreResult<()> {
        let dir = self.dir(package)?;
        let _write = dir.guard.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        replace_dir(&dir.path, replacement)?;
        info!(package = %package, live = %dir.path.display(), "live tree replaced");
        Ok(())
    }

    fn packages(&self) -> Vec<PackageId> {
        self.dirs.keys().cloned().collect()
    }
}
