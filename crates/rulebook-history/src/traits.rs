use std::path::Path;

use rulebook_types::{AssetVersion, FileDiffDetail, FileDiffSummary, PackageId, VersionId};

use crate::error::HistoryResult;

/// The trees captured by one approval.
#[derive(Clone, Copy, Debug)]
pub struct SnapshotRequest<'a> {
    pub package: &'a PackageId,
    pub display_name: &'a str,
    /// The live tree about to be replaced.
    pub before: &'a Path,
    /// The tree replacing it.
    pub after: &'a Path,
}

/// Append-only store of package versions.
///
/// Implementations must hand out version numbers per package in strictly
/// increasing order, starting at 1, and must not consume a number when a
/// snapshot fails.
pub trait VersionStore: Send + Sync {
    /// The id the next successful snapshot of `package` will receive.
    fn next_version(&self, package: &PackageId) -> HistoryResult<VersionId>;

    /// Copy both trees into history under a new version id.
    fn snapshot(&self, request: &SnapshotRequest<'_>) -> HistoryResult<AssetVersion>;

    /// Versions of one package, or of all packages, newest first.
    fn list(&self, package: Option<&PackageId>) -> HistoryResult<Vec<AssetVersion>>;

    fn get(&self, id: &VersionId) -> HistoryResult<AssetVersion>;

    /// Per-file classification recorded for a version.
    fn diff(&self, id: &VersionId) -> HistoryResult<Vec<FileDiffSummary>> {
        Ok(self.get(id)?.files)
    }

    /// Unified diff of one file between a version's before and after trees.
    fn file_diff(&self, id: &VersionId, path: &str) -> HistoryResult<FileDiffDetail>;
}
