//! File-level diff: unified diff of one path between two tree roots.
//!
//! Uses the `similar` crate (Myers diff algorithm). Binary files and files
//! above the configured size cap are classified but never diffed textually.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::Path;

use rulebook_store::resolve_relative;
use rulebook_types::{ContentHash, FileChangeStatus, FileDiffDetail};
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

use crate::error::{DiffError, DiffResult};

/// Number of leading bytes inspected for a NUL when detecting binary files.
const BINARY_PROBE_LEN: usize = 8192;

/// Limits applied when producing a [`FileDiffDetail`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Files larger than this are reported as binary.
    pub max_file_size: u64,
    /// Unchanged lines shown around each hunk.
    pub context_lines: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            context_lines: 3,
        }
    }
}

/// One side of a file comparison.
enum Side {
    Missing,
    Oversized(ContentHash),
    Loaded(Vec<u8>),
}

impl Side {
    fn load(root: &Path, rel: &str, options: &DiffOptions) -> DiffResult<Self> {
        let Some(path) = resolve_relative(root, rel) else {
            return Ok(Self::Missing);
        };
        let io_err = |source| DiffError::Io {
            path: path.display().to_string(),
            source,
        };

        let meta = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(Self::Missing),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::Missing),
            Err(e) => return Err(io_err(e)),
        };

        if meta.len() > options.max_file_size {
            let file = File::open(&path).map_err(io_err)?;
            let hash = ContentHash::of_reader(file).map_err(io_err)?;
            return Ok(Self::Oversized(hash));
        }
        fs::read(&path).map(Self::Loaded).map_err(io_err)
    }

    fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    fn is_binary(&self) -> bool {
        match self {
            Self::Missing => false,
            Self::Oversized(_) => true,
            Self::Loaded(bytes) => {
                bytes[..bytes.len().min(BINARY_PROBE_LEN)].contains(&0)
                    || std::str::from_utf8(bytes).is_err()
            }
        }
    }

    fn same_content(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Loaded(a), Self::Loaded(b)) => a == b,
            (Self::Oversized(a), Self::Oversized(b)) => a == b,
            _ => false,
        }
    }

    fn text(&self) -> Option<String> {
        match self {
            Self::Loaded(bytes) => String::from_utf8(bytes.clone()).ok(),
            _ => None,
        }
    }
}

/// Compare `path` between the trees rooted at `old_root` and `new_root`.
///
/// Fails with [`DiffError::FileNotFound`] when the path exists in neither
/// tree. Paths that try to leave a root are treated as absent.
pub fn diff_file(
    old_root: &Path,
    new_root: &Path,
    path: &str,
    options: &DiffOptions,
) -> DiffResult<FileDiffDetail> {
    let old = Side::load(old_root, path, options)?;
    let new = Side::load(new_root, path, options)?;

    let status = match (old.is_missing(), new.is_missing()) {
        (true, true) => return Err(DiffError::FileNotFound(path.to_string())),
        (true, false) => FileChangeStatus::Added,
        (false, true) => FileChangeStatus::Removed,
        (false, false) if old.same_content(&new) => FileChangeStatus::Unchanged,
        (false, false) => FileChangeStatus::Modified,
    };

    let is_binary = old.is_binary() || new.is_binary();
    let mut detail = FileDiffDetail {
        path: path.to_string(),
        status,
        unified_diff: None,
        old_content: None,
        new_content: None,
        is_binary,
        additions: 0,
        deletions: 0,
    };
    if is_binary {
        return Ok(detail);
    }

    detail.old_content = old.text();
    detail.new_content = new.text();
    match (status, &detail.old_content, &detail.new_content) {
        (FileChangeStatus::Modified, Some(before), Some(after)) => {
            let (text, additions, deletions) =
                unified_diff(before, after, path, options.context_lines);
            detail.unified_diff = Some(text);
            detail.additions = additions;
            detail.deletions = deletions;
        }
        (FileChangeStatus::Added, _, Some(after)) => detail.additions = after.lines().count(),
        (FileChangeStatus::Removed, Some(before), _) => detail.deletions = before.lines().count(),
        _ => {}
    }
    Ok(detail)
}

fn unified_diff(old: &str, new: &str, path: &str, context: usize) -> (String, usize, usize) {
    let diff = TextDiff::from_lines(old, new);

    let mut additions = 0;
    let mut deletions = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => additions += 1,
            ChangeTag::Delete => deletions += 1,
            ChangeTag::Equal => {}
        }
    }

    let old_header = format!("a/{path}");
    let new_header = format!("b/{path}");
    let text = diff
        .unified_diff()
        .context_radius(context)
        .header(&old_header, &new_header)
        .to_string();
    (text, additions, deletions)
}
