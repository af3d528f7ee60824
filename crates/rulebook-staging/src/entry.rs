//! Staged package trees.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rulebook_diff::{diff_file, DiffError, DiffOptions};
use rulebook_types::{FileDiffDetail, FileDiffSummary, FilesSummary, PackageId, SuppressionWarning};
use tempfile::TempDir;

use crate::error::{StagingError, StagingResult};

const BASE_DIR: &str = "base";
const TREE_DIR: &str = "tree";

/// Working directory for a package being staged.
///
/// The fetcher writes the new tree into [`Self::tree_dir`]; the caller copies
/// the live tree into [`Self::base_dir`] and computes the diff. Dropping a
/// draft deletes both.
pub struct StagingDraft {
    package: PackageId,
    workdir: TempDir,
}

impl StagingDraft {
    pub(crate) fn new(package: PackageId, workdir: TempDir) -> Self {
        Self { package, workdir }
    }

    pub fn package(&self) -> &PackageId {
        &self.package
    }

    /// Where the fetched tree goes.
    pub fn tree_dir(&self) -> PathBuf {
        self.workdir.path().join(TREE_DIR)
    }

    /// Where the copy of the live tree goes.
    pub fn base_dir(&self) -> PathBuf {
        self.workdir.path().join(BASE_DIR)
    }

    /// Turn the draft into a pending entry.
    pub fn finish(self, files: Vec<FileDiffSummary>, fetch_warnings: Vec<String>) -> StagingEntry {
        StagingEntry {
            summary: FilesSummary::from_diffs(&files),
            package: self.package,
            staged_at: Utc::now(),
            workdir: self.workdir,
            files,
            fetch_warnings,
            suppression_warnings: Vec::new(),
        }
    }
}

impl fmt::Debug for StagingDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingDraft")
            .field("package", &self.package)
            .field("workdir", &self.workdir.path())
            .finish()
    }
}

/// A fetched package tree awaiting approval or rejection.
///
/// The entry's directory is removed when the last reference to it drops, so
/// a reader that obtained the entry before it was taken can finish its diff.
pub struct StagingEntry {
    package: PackageId,
    staged_at: DateTime<Utc>,
    workdir: TempDir,
    files: Vec<FileDiffSummary>,
    summary: FilesSummary,
    fetch_warnings: Vec<String>,
    suppression_warnings: Vec<SuppressionWarning>,
}

impl StagingEntry {
    /// Attach suppression-impact warnings.
    pub fn with_suppression_warnings(mut self, warnings: Vec<SuppressionWarning>) -> Self {
        self.suppression_warnings = warnings;
        self
    }

    pub fn package(&self) -> &PackageId {
        &self.package
    }

    pub fn staged_at(&self) -> DateTime<Utc> {
        self.staged_at
    }

    /// The staged tree.
    pub fn tree_dir(&self) -> PathBuf {
        self.workdir.path().join(TREE_DIR)
    }

    /// The live tree as it was when this entry was staged.
    pub fn base_dir(&self) -> PathBuf {
        self.workdir.path().join(BASE_DIR)
    }

    /// Diff from the base tree to the staged tree.
    pub fn files(&self) -> &[FileDiffSummary] {
        &self.files
    }

    pub fn summary(&self) -> FilesSummary {
        self.summary
    }

    pub fn fetch_warnings(&self) -> &[String] {
        &self.fetch_warnings
    }

    pub fn suppression_warnings(&self) -> &[SuppressionWarning] {
        &self.suppression_warnings
    }

    /// Unified diff of one file from the base tree to the staged tree.
    pub fn file_diff(&self, path: &str, options: &DiffOptions) -> StagingResult<FileDiffDetail> {
        diff_file(&self.base_dir(), &self.tree_dir(), path, options).map_err(|e| match e {
            DiffError::FileNotFound(path) => StagingError::FileNotFound {
                package: self.package.clone(),
                path,
            },
            other => StagingError::Diff(other),
        })
    }

    pub(crate) fn workdir(&self) -> &Path {
        self.workdir.path()
    }
}

impl fmt::Debug for StagingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingEntry")
            .field("package", &self.package)
            .field("staged_at", &self.staged_at)
            .field("summary", &self.summary)
            .field("fetch_warnings", &self.fetch_warnings.len())
            .field("suppression_warnings", &self.suppression_warnings.len())
            .finish()
    }
}
