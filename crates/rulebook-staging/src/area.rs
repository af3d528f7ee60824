//! The staging area: one pending entry per package.
//!
//! Two kinds of lock are involved. Each package has a slot mutex that
//! serializes everything that changes what is staged for it (`put`, `take`,
//! and callers that hold the slot across a longer operation through
//! [`StagingArea::with_slot`]). The entry map itself sits behind a
//! short-lived `RwLock`, so reads never wait for a slot holder.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use rulebook_store::{remove_tree, PackageLocks, StoreError};
use rulebook_types::PackageId;
use tracing::{debug, info, warn};

use crate::entry::{StagingDraft, StagingEntry};
use crate::error::{StagingError, StagingResult};

const DRAFT_PREFIX: &str = ".draft-";

/// Holding area for fetched, not yet approved package trees.
pub struct StagingArea {
    root: PathBuf,
    slots: PackageLocks,
    entries: RwLock<HashMap<PackageId, Arc<StagingEntry>>>,
}

impl std::fmt::Debug for StagingArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingArea")
            .field("root", &self.root)
            .field("pending", &self.len())
            .finish()
    }
}

impl StagingArea {
    /// Open the staging area rooted at `root`.
    ///
    /// Pending entries do not survive a restart; directories left behind by
    /// a previous process are removed.
    pub fn open(root: impl Into<PathBuf>) -> StagingResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(StoreError::io(&root))?;

        let stale: Vec<PathBuf> = fs::read_dir(&root)
            .map_err(StoreError::io(&root))?
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(DRAFT_PREFIX))
            .map(|e| e.path())
            .collect();
        for dir in stale {
            debug!(dir = %dir.display(), "removing stale staging directory");
            remove_tree(&dir)?;
        }

        Ok(Self {
            root,
            slots: PackageLocks::new(),
            entries: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a working directory for staging `package`.
    pub fn draft(&self, package: &PackageId) -> StagingResult<StagingDraft> {
        let workdir = tempfile::Builder::new()
            .prefix(&format!("{DRAFT_PREFIX}{package}-"))
            .tempdir_in(&self.root)
            .map_err(StoreError::io(&self.root))?;
        let draft = StagingDraft::new(package.clone(), workdir);
        for dir in [draft.tree_dir(), draft.base_dir()] {
            fs::create_dir_all(&dir).map_err(StoreError::io(&dir))?;
        }
        Ok(draft)
    }

    /// Stage `entry`, replacing and returning any entry pending for the
    /// same package.
    pub fn put(&self, entry: StagingEntry) -> Option<Arc<StagingEntry>> {
        let package = entry.package().clone();
        self.slots.with(&package, || self.insert(entry))
    }

    /// The entry pending for `package`, if any.
    pub fn get(&self, package: &PackageId) -> Option<Arc<StagingEntry>> {
        self.read_entries().get(package).cloned()
    }

    /// Remove and return the entry pending for `package`.
    pub fn take(&self, package: &PackageId) -> StagingResult<Arc<StagingEntry>> {
        self.slots.with(package, || self.remove(package))
    }

    /// Every pending entry, ordered by package id.
    pub fn all(&self) -> Vec<Arc<StagingEntry>> {
        let mut entries: Vec<_> = self.read_entries().values().cloned().collect();
        entries.sort_by(|a, b| a.package().cmp(b.package()));
        entries
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` with exclusive access to `package`'s slot.
    ///
    /// Concurrent `put`/`take` calls for the same package wait until `f`
    /// returns; reads and other packages are unaffected.
    pub fn with_slot<T>(&self, package: &PackageId, f: impl FnOnce(&Slot<'_>) -> T) -> T {
        self.slots.with(package, || f(&Slot { area: self, package }))
    }

    fn insert(&self, entry: StagingEntry) -> Option<Arc<StagingEntry>> {
        let package = entry.package().clone();
        let summary = entry.summary();
        let workdir = entry.workdir().display().to_string();
        let previous = self
            .entries
            .write()
            .expect("staging entries lock poisoned")
            .insert(package.clone(), Arc::new(entry));

        if previous.is_some() {
            info!(package = %package, %summary, workdir = %workdir, "replaced pending staging");
        } else {
            info!(package = %package, %summary, workdir = %workdir, "staged package");
        }
        previous
    }

    fn remove(&self, package: &PackageId) -> StagingResult<Arc<StagingEntry>> {
        self.entries
            .write()
            .expect("staging entries lock poisoned")
            .remove(package)
            .ok_or_else(|| StagingError::NoPending(package.clone()))
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PackageId, Arc<StagingEntry>>> {
        self.entries.read().expect("staging entries lock poisoned")
    }
}

/// One package's slot, valid while its lock is held.
pub struct Slot<'a> {
    area: &'a StagingArea,
    package: &'a PackageId,
}

impl Slot<'_> {
    pub fn package(&self) -> &PackageId {
        self.package
    }

    pub fn get(&self) -> Option<Arc<StagingEntry>> {
        self.area.get(self.package)
    }

    pub fn take(&self) -> StagingResult<Arc<StagingEntry>> {
        self.area.remove(self.package)
    }

    pub fn put(&self, entry: StagingEntry) -> StagingResult<Option<Arc<StagingEntry>>> {
        self.check(entry.package())?;
        Ok(self.area.insert(entry))
    }

    /// Put back an entry previously taken from this slot.
    ///
    /// Does nothing if another entry has been staged in the meantime.
    pub fn restore(&self, entry: Arc<StagingEntry>) -> StagingResult<()> {
        self.check(entry.package())?;
        let mut entries = self.area.entries.write().expect("staging entries lock poisoned");
        if entries.contains_key(self.package) {
            warn!(package = %self.package, "not restoring staging; slot already refilled");
        } else {
            entries.insert(self.package.clone(), entry);
            debug!(package = %self.package, "restored pending staging");
        }
        Ok(())
    }

    fn check(&self, actual: &PackageId) -> StagingResult<()> {
        if actual == self.package {
            Ok(())
        } else {
            Err(StagingError::PackageMismatch {
                expected: self.package.clone(),
                actual: actual.clone(),
            })
        }
    }
}
