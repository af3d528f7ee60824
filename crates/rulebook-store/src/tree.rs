//! Content-hashed view of a directory.
//!
//! An [`AssetTree`] records every regular file below a root, keyed by its
//! `/`-separated relative path. Entries are kept in a `BTreeMap`, so
//! iteration order is lexicographic regardless of how the filesystem
//! enumerates directories.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use rulebook_types::ContentHash;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};

/// A single file in an [`AssetTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub hash: ContentHash,
    pub size: u64,
}

/// Path-sorted, content-hashed listing of a directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetTree {
    entries: BTreeMap<String, TreeEntry>,
}

impl AssetTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from pre-computed entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, TreeEntry)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Scan `root` and hash every regular file below it.
    ///
    /// A missing root yields an empty tree: a package that has never been
    /// approved has no live directory yet. Symbolic links are not followed.
    pub fn scan(root: &Path) -> StoreResult<Self> {
        if !root.exists() {
            return Ok(Self::new());
        }
        if !root.is_dir() {
            return Err(StoreError::NotADirectory(root.to_path_buf()));
        }

        let mut entries = BTreeMap::new();
        for item in WalkDir::new(root).follow_links(false) {
            let item = item.map_err(|e| StoreError::Walk {
                root: root.to_path_buf(),
                reason: e.to_string(),
            })?;
            if !item.file_type().is_file() {
                continue;
            }

            let path = item.path();
            let file = File::open(path).map_err(StoreError::io(path))?;
            let size = file.metadata().map_err(StoreError::io(path))?.len();
            let hash = ContentHash::of_reader(file).map_err(StoreError::io(path))?;
            entries.insert(relative_path(root, path)?, TreeEntry { hash, size });
        }
        Ok(Self { entries })
    }

    pub fn get(&self, path: &str) -> Option<&TreeEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in lexicographic path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TreeEntry)> {
        self.entries.iter().map(|(p, e)| (p.as_str(), e))
    }

    /// Paths in lexicographic order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Sum of all file sizes.
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }
}

/// `/`-separated path of `path` relative to `root`.
fn relative_path(root: &Path, path: &Path) -> StoreResult<String> {
    let rel = path.strip_prefix(root).map_err(|_| StoreError::Walk {
        root: root.to_path_buf(),
        reason: format!("{} escapes the tree root", path.display()),
    })?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Resolve a `/`-separated relative path below `root`.
///
/// Returns `None` for absolute paths and paths that climb out of the root,
/// so callers can treat them the same as a file that does not exist.
pub fn resolve_relative(root: &Path, rel: &str) -> Option<PathBuf> {
    if rel.is_empty() || rel.starts_with('/') || rel.contains('\\') {
        return None;
    }
    let mut resolved = root.to_path_buf();
    for part in rel.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            part => resolved.push(part),
        }
    }
    Some(resolved)
}
