//! Filesystem-backed version history.
//!
//! Layout under the history root:
//!
//! ```text
//! versions.jsonl            one AssetVersion per line, in append order
//! <package>/v<n>/before/    live tree just before version n was approved
//! <package>/v<n>/after/     tree that version n made live
//! ```
//!
//! A version directory is assembled in a temporary sibling and renamed into
//! place once complete; the index line is appended last. A version exists
//! once its index line exists.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use rulebook_diff::{diff_file, diff_trees, DiffError, DiffOptions};
use rulebook_store::{copy_tree, remove_tree, AssetTree, PackageLocks, StoreError};
use rulebook_types::{AssetVersion, FileDiffDetail, FilesSummary, PackageId, VersionId};
use tracing::{debug, info, warn};

use crate::error::{HistoryError, HistoryResult};
use crate::traits::{SnapshotRequest, VersionStore};

const INDEX_FILE: &str = "versions.jsonl";
const BEFORE_DIR: &str = "before";
const AFTER_DIR: &str = "after";

/// Directory-per-version history with a JSON-lines index.
pub struct FsVersionStore {
    root: PathBuf,
    options: DiffOptions,
    locks: PackageLocks,
    versions: RwLock<Vec<AssetVersion>>,
    append: Mutex<()>,
}

impl std::fmt::Debug for FsVersionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsVersionStore")
            .field("root", &self.root)
            .field("options", &self.options)
            .finish()
    }
}

impl FsVersionStore {
    /// Open (or create) the history rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, options: DiffOptions) -> HistoryResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(StoreError::io(&root))?;
        let versions = load_index(&root.join(INDEX_FILE))?;
        debug!(root = %root.display(), versions = versions.len(), "opened version history");

        Ok(Self {
            root,
            options,
            locks: PackageLocks::new(),
            versions: RwLock::new(versions),
            append: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the pre-approval tree of `version`.
    pub fn snapshot_path(&self, version: &AssetVersion) -> PathBuf {
        self.root.join(&version.snapshot)
    }

    fn version_dir(&self, id: &VersionId) -> PathBuf {
        self.root.join(id.package().as_str()).join(id.label())
    }

    fn snapshot_locked(&self, request: &SnapshotRequest<'_>) -> HistoryResult<AssetVersion> {
        let id = self.next_version(request.package)?;
        let package_dir = self.root.join(request.package.as_str());
        fs::create_dir_all(&package_dir).map_err(StoreError::io(&package_dir))?;

        let target = self.version_dir(&id);
        if target.exists() {
            // Left over from an attempt that never reached the index.
            warn!(version = %id, "discarding unrecorded snapshot directory");
            remove_tree(&target)?;
        }

        let work = tempfile::Builder::new()
            .prefix(".snapshot-")
            .tempdir_in(&package_dir)
            .map_err(StoreError::io(&package_dir))?;
        let before = work.path().join(BEFORE_DIR);
        let after = work.path().join(AFTER_DIR);
        copy_tree(request.before, &before)?;
        copy_tree(request.after, &after)?;
        let files = diff_trees(&AssetTree::scan(&before)?, &AssetTree::scan(&after)?);

        fs::rename(work.path(), &target).map_err(StoreError::io(&target))?;

        let version = AssetVersion {
            id: id.clone(),
            display_name: request.display_name.to_string(),
            created_at: Utc::now(),
            snapshot: format!("{}/{}/{BEFORE_DIR}", id.package(), id.label()),
            summary: FilesSummary::from_diffs(&files),
            files,
        };

        if let Err(e) = self.record(&version) {
            if let Err(cleanup) = remove_tree(&target) {
                warn!(version = %id, error = %cleanup, "failed to remove unrecorded snapshot");
            }
            return Err(e);
        }

        info!(
            version = %id,
            changed = version.summary.changed(),
            files = version.summary.total(),
            "recorded version"
        );
        Ok(version)
    }

    /// Append `version` to the index file, then to the in-memory list.
    fn record(&self, version: &AssetVersion) -> HistoryResult<()> {
        let _append = self.append.lock().expect("history append lock poisoned");

        let mut line = serde_json::to_string(version)
            .map_err(|e| HistoryError::Serialization(e.to_string()))?;
        line.push('\n');

        let path = self.root.join(INDEX_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(StoreError::io(&path))?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.sync_data())
            .map_err(StoreError::io(&path))?;

        self.versions
            .write()
            .expect("history index lock poisoned")
            .push(version.clone());
        Ok(())
    }
}

impl VersionStore for FsVersionStore {
    fn next_version(&self, package: &PackageId) -> HistoryResult<VersionId> {
        let versions = self.versions.read().expect("history index lock poisoned");
        let latest = versions
            .iter()
            .filter(|v| v.package() == package)
            .map(|v| v.id.number())
            .max()
            .unwrap_or(0);
        Ok(VersionId::new(package.clone(), latest + 1))
    }

    fn snapshot(&self, request: &SnapshotRequest<'_>) -> HistoryResult<AssetVersion> {
        self.locks
            .with(request.package, || self.snapshot_locked(request))
    }

    fn list(&self, package: Option<&PackageId>) -> HistoryResult<Vec<AssetVersion>> {
        let versions = self.versions.read().expect("history index lock poisoned");
        Ok(versions
            .iter()
            .rev()
            .filter(|v| package.map_or(true, |p| v.package() == p))
            .cloned()
            .collect())
    }

    fn get(&self, id: &VersionId) -> HistoryResult<AssetVersion> {
        let versions = self.versions.read().expect("history index lock poisoned");
        versions
            .iter()
            .find(|v| &v.id == id)
            .cloned()
            .ok_or_else(|| HistoryError::VersionNotFound(id.clone()))
    }

    fn file_diff(&self, id: &VersionId, path: &str) -> HistoryResult<FileDiffDetail> {
        self.get(id)?;
        let dir = self.version_dir(id);
        diff_file(&dir.join(BEFORE_DIR), &dir.join(AFTER_DIR), path, &self.options).map_err(
            |e| match e {
                DiffError::FileNotFound(path) => HistoryError::FileNotFound {
                    version: id.clone(),
                    path,
                },
                other => HistoryError::Diff(other),
            },
        )
    }
}

/// Read the index.
///
/// A torn final line (interrupted append) is cut off, and a final record
/// missing its newline gets one, so the next append starts on a line of its
/// own.
fn load_index(path: &Path) -> HistoryResult<Vec<AssetVersion>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path)(e).into()),
    };

    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let mut versions = Vec::with_capacity(lines.len());
    let mut intact = 0;
    for (n, raw) in lines.iter().enumerate() {
        let line = raw.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            intact += raw.len();
            continue;
        }
        match serde_json::from_str::<AssetVersion>(line) {
            Ok(version) => {
                versions.push(version);
                intact += raw.len();
            }
            Err(e) if n + 1 == lines.len() => {
                warn!(line = n + 1, error = %e, "discarding incomplete trailing history entry");
            }
            Err(e) => {
                return Err(HistoryError::CorruptIndex {
                    line: n + 1,
                    reason: e.to_string(),
                })
            }
        }
    }

    let unterminated = intact > 0 && !content[..intact].ends_with('\n');
    if intact < content.len() || unterminated {
        repair_tail(path, intact as u64, unterminated)?;
    }
    Ok(versions)
}

/// Truncate the index to `len` bytes, then terminate its last line.
fn repair_tail(path: &Path, len: u64, terminate: bool) -> HistoryResult<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(StoreError::io(path))?;
    file.set_len(len).map_err(StoreError::io(path))?;
    if terminate {
        file.write_all(b"\n").map_err(StoreError::io(path))?;
    }
    file.sync_data().map_err(StoreError::io(path))?;
    debug!(index = %path.display(), len, "repaired history index tail");
    Ok(())
}
