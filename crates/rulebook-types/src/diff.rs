use std::fmt;

use serde::{Deserialize, Serialize};

/// How a single file differs between two trees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeStatus {
    Added,
    Removed,
    Modified,
    Unchanged,
}

impl FileChangeStatus {
    /// Returns `true` for anything other than `Unchanged`.
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for FileChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
            Self::Unchanged => "unchanged",
        };
        f.write_str(label)
    }
}

/// Per-file classification between an old and a new tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiffSummary {
    /// Path relative to the tree root, `/`-separated.
    pub path: String,
    pub status: FileChangeStatus,
    /// Size in the old tree; `None` when the file is absent there.
    pub old_size: Option<u64>,
    /// Size in the new tree; `None` when the file is absent there.
    pub new_size: Option<u64>,
}

/// Counts of each change class in a diff.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub unchanged: usize,
}

impl FilesSummary {
    /// Tally a diff.
    pub fn from_diffs<'a>(diffs: impl IntoIterator<Item = &'a FileDiffSummary>) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.status {
                FileChangeStatus::Added => summary.added += 1,
                FileChangeStatus::Removed => summary.removed += 1,
                FileChangeStatus::Modified => summary.modified += 1,
                FileChangeStatus::Unchanged => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Number of files examined.
    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified + self.unchanged
    }

    /// Number of files that differ.
    pub fn changed(&self) -> usize {
        self.added + self.removed + self.modified
    }
}

impl fmt::Display for FilesSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} -{} ~{} ={}",
            self.added, self.removed, self.modified, self.unchanged
        )
    }
}

/// Full comparison of one file between two trees.
///
/// A textual unified diff is only produced when the file exists on both
/// sides, differs, and is not binary. Added and removed files carry the
/// content of the side that exists instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiffDetail {
    pub path: String,
    pub status: FileChangeStatus,
    /// Unified diff with `a/<path>` and `b/<path>` headers.
    pub unified_diff: Option<String>,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
    pub is_binary: bool,
    pub additions: usize,
    pub deletions: usize,
}
