//! Directory-level filesystem primitives.

use std::fs;
use std::path::Path;

use tracing::{debug, error};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};

/// Recursively copy the contents of `src` into `dst`, creating `dst`.
///
/// A missing `src` produces an empty `dst`. Symbolic links are skipped.
/// Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> StoreResult<usize> {
    fs::create_dir_all(dst).map_err(StoreError::io(dst))?;
    if !src.exists() {
        return Ok(0);
    }

    let mut copied = 0;
    for item in WalkDir::new(src).follow_links(false).min_depth(1) {
        let item = item.map_err(|e| StoreError::Walk {
            root: src.to_path_buf(),
            reason: e.to_string(),
        })?;
        let rel = item
            .path()
            .strip_prefix(src)
            .map_err(|_| StoreError::Walk {
                root: src.to_path_buf(),
                reason: format!("{} escapes the tree root", item.path().display()),
            })?;
        let target = dst.join(rel);

        if item.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(StoreError::io(&target))?;
        } else if item.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(StoreError::io(parent))?;
            }
            fs::copy(item.path(), &target).map_err(StoreError::io(item.path()))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Remove a directory tree if it exists.
pub fn remove_tree(path: &Path) -> StoreResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path)(e)),
    }
}

/// Replace the directory at `live` with a copy of `replacement`.
///
/// The copy is built next to `live` first, so the only window in which
/// readers can observe a change is the pair of renames at the end. The old
/// tree is moved aside before the swap and restored if the swap fails.
pub fn replace_dir(live: &Path, replacement: &Path) -> StoreResult<()> {
    let parent = live
        .parent()
        .ok_or_else(|| StoreError::NotADirectory(live.to_path_buf()))?;
    fs::create_dir_all(parent).map_err(StoreError::io(parent))?;

    let incoming = tempfile::Builder::new()
        .prefix(".incoming-")
        .tempdir_in(parent)
        .map_err(StoreError::io(parent))?;
    let staged = incoming.path().join("tree");
    let files = copy_tree(replacement, &staged)?;

    let retired = tempfile::Builder::new()
        .prefix(".retired-")
        .tempdir_in(parent)
        .map_err(StoreError::io(parent))?;
    let retired_tree = retired.path().join("tree");

    let had_live = live.exists();
    if had_live {
        fs::rename(live, &retired_tree).map_err(StoreError::io(live))?;
    }

    if let Err(e) = fs::rename(&staged, live) {
        if had_live {
            if let Err(restore) = fs::rename(&retired_tree, live) {
                error!(
                    live = %live.display(),
                    error = %restore,
                    "failed to restore previous tree after aborted replace"
                );
            }
        }
        return Err(StoreError::io(live)(e));
    }

    debug!(live = %live.display(), files, "replaced directory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::AssetTree;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn copy_tree_preserves_structure() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "a/b/c.xsd", "c");
        write(src.path(), "top.sch", "t");
        fs::create_dir_all(src.path().join("empty")).unwrap();

        let target = dst.path().join("copy");
        assert_eq!(copy_tree(src.path(), &target).unwrap(), 2);
        assert_eq!(
            AssetTree::scan(src.path()).unwrap(),
            AssetTree::scan(&target).unwrap()
        );
        assert!(target.join("empty").is_dir());
    }

    #[test]
    fn copy_tree_from_missing_source_creates_empty_dir() {
        let dst = tempfile::tempdir().unwrap();
        let target = dst.path().join("copy");
        assert_eq!(copy_tree(&dst.path().join("nope"), &target).unwrap(), 0);
        assert!(target.is_dir());
    }

    #[test]
    fn replace_dir_swaps_contents() {
        let root = tempfile::tempdir().unwrap();
        let live = root.path().join("live/efatura");
        let next = root.path().join("next");
        write(&live, "old.xsd", "old");
        write(&next, "new.xsd", "new");

        replace_dir(&live, &next).unwrap();

        assert!(!live.join("old.xsd").exists());
        assert_eq!(fs::read_to_string(live.join("new.xsd")).unwrap(), "new");
        // The replacement source is left untouched.
        assert!(next.join("new.xsd").exists());
        // No temporary directories are left behind.
        let leftovers: Vec<_> = fs::read_dir(root.path().join("live"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("efatura")]);
    }

    #[test]
    fn replace_dir_creates_missing_live() {
        let root = tempfile::tempdir().unwrap();
        let live = root.path().join("live/edefter");
        let next = root.path().join("next");
        write(&next, "x.sch", "x");

        replace_dir(&live, &next).unwrap();
        assert!(live.join("x.sch").exists());
    }

    #[test]
    fn remove_tree_ignores_missing() {
        let root = tempfile::tempdir().unwrap();
        remove_tree(&root.path().join("missing")).unwrap();
        write(root.path(), "d/f", "f");
        remove_tree(&root.path().join("d")).unwrap();
        assert!(!root.path().join("d").exists());
    }
}
