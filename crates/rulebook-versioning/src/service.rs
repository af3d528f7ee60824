//! The package lifecycle state machine.
//!
//! Per package: `NONE --sync--> STAGED_PENDING --approve|reject--> NONE`.
//! Syncing again while pending replaces the staged tree. Everything that
//! changes a package's staging slot or live tree runs under that package's
//! slot lock, so a sync and an approval of the same package never interleave;
//! different packages never wait on each other.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rulebook_diff::{diff_trees, DiffOptions};
use rulebook_history::{SnapshotRequest, VersionStore};
use rulebook_profile::ProfileRegistry;
use rulebook_reload::{ReloadCoordinator, ReloadReport};
use rulebook_staging::{StagingArea, StagingEntry};
use rulebook_store::{AssetTree, LiveTrees};
use rulebook_types::{AssetVersion, FileDiffDetail, FileDiffSummary, PackageId, SyncPreview, VersionId};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::PackageConfig;
use crate::error::{VersioningError, VersioningResult};
use crate::fetch::PackageFetcher;

/// Result of a successful approval.
///
/// The version is committed even when `reload` reports failures; reloading
/// can be retried on its own.
#[derive(Clone, Debug, Serialize)]
pub struct ApprovalOutcome {
    pub version: AssetVersion,
    pub reload: ReloadReport,
}

/// Result of staging every configured package.
#[derive(Debug, Default)]
pub struct SyncAllOutcome {
    pub previews: Vec<SyncPreview>,
    pub failures: Vec<(PackageId, VersioningError)>,
}

impl SyncAllOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Orchestrates fetching, staging, approval and history of packages.
pub struct AssetVersioningService {
    packages: BTreeMap<PackageId, PackageConfig>,
    fetcher: Arc<dyn PackageFetcher>,
    live: Arc<dyn LiveTrees>,
    history: Arc<dyn VersionStore>,
    staging: StagingArea,
    coordinator: Arc<ReloadCoordinator>,
    profiles: Option<Arc<ProfileRegistry>>,
    options: DiffOptions,
}

impl AssetVersioningService {
    pub fn new(
        packages: impl IntoIterator<Item = PackageConfig>,
        fetcher: Arc<dyn PackageFetcher>,
        live: Arc<dyn LiveTrees>,
        history: Arc<dyn VersionStore>,
        staging: StagingArea,
        coordinator: Arc<ReloadCoordinator>,
    ) -> Self {
        Self {
            packages: packages.into_iter().map(|p| (p.id.clone(), p)).collect(),
            fetcher,
            live,
            history,
            staging,
            coordinator,
            profiles: None,
            options: DiffOptions::default(),
        }
    }

    /// Analyze staged Schematron changes against these profiles.
    pub fn with_profiles(mut self, profiles: Arc<ProfileRegistry>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn with_diff_options(mut self, options: DiffOptions) -> Self {
        self.options = options;
        self
    }

    /// Configured packages, by id.
    pub fn packages(&self) -> impl Iterator<Item = &PackageConfig> {
        self.packages.values()
    }

    pub fn package(&self, id: &PackageId) -> VersioningResult<&PackageConfig> {
        self.packages
            .get(id)
            .ok_or_else(|| VersioningError::UnknownPackage(id.clone()))
    }

    pub fn coordinator(&self) -> &Arc<ReloadCoordinator> {
        &self.coordinator
    }

    // ---- Staging ----

    /// Fetch `package` and stage it, replacing anything already pending.
    ///
    /// The fetch runs without holding the package's slot. If it fails, the
    /// previously pending entry, if any, stays as it was.
    pub fn sync_to_staging(&self, package: &PackageId) -> VersioningResult<SyncPreview> {
        let definition = self.package(package)?;
        let start = Instant::now();
        info!(package = %package, "staging sync started");

        let draft = self.staging.draft(package)?;
        let fetch_warnings = self
            .fetcher
            .fetch(definition, &draft.tree_dir())
            .map_err(|source| VersioningError::Fetch {
                package: package.clone(),
                source,
            })?;

        let entry = self.staging.with_slot(package, |slot| -> VersioningResult<Arc<StagingEntry>> {
            // Copied under the slot lock so no approval replaces the live
            // tree while the base is taken.
            self.live.copy_to(package, &draft.base_dir())?;
            let base = AssetTree::scan(&draft.base_dir())?;
            let staged = AssetTree::scan(&draft.tree_dir())?;
            let files = diff_trees(&base, &staged);

            let suppression_warnings = match &self.profiles {
                Some(profiles) => profiles
                    .analyze_impact(&draft.base_dir(), &draft.tree_dir(), &files)
                    .unwrap_or_else(|e| {
                        warn!(package = %package, error = %e, "suppression impact analysis failed");
                        Vec::new()
                    }),
                None => Vec::new(),
            };

            let entry = draft
                .finish(files, fetch_warnings)
                .with_suppression_warnings(suppression_warnings);
            slot.put(entry)?;
            slot.get().ok_or_else(|| VersioningError::NoPendingStaging(package.clone()))
        })?;

        let preview = self.preview(&entry)?;
        info!(
            package = %package,
            target = %preview.target_version,
            summary = %preview.summary,
            warnings = preview.fetch_warnings.len() + preview.suppression_warnings.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "staging sync complete"
        );
        Ok(preview)
    }

    /// Stage every configured package. Failures are collected, not fatal.
    pub fn sync_all_to_staging(&self) -> SyncAllOutcome {
        let mut outcome = SyncAllOutcome::default();
        for id in self.packages.keys() {
            match self.sync_to_staging(id) {
                Ok(preview) => outcome.previews.push(preview),
                Err(e) => {
                    error!(package = %id, error = %e, "staging sync failed");
                    outcome.failures.push((id.clone(), e));
                }
            }
        }
        outcome
    }

    /// Commit the pending tree of `package`.
    ///
    /// Snapshots the current live tree into history, replaces the live tree
    /// with the staged one, clears the pending entry, then reloads every
    /// registered component. A failure before the live tree is replaced puts
    /// the pending entry back; a reload failure is reported in the outcome
    /// and leaves the commit in place.
    ///
    /// # Errors
    ///
    /// [`VersioningError::NoPendingStaging`] when nothing is staged.
    pub fn approve_pending(&self, package: &PackageId) -> VersioningResult<ApprovalOutcome> {
        let definition = self.package(package)?;

        let version = self.staging.with_slot(package, |slot| -> VersioningResult<AssetVersion> {
            let live = self.live.location(package)?;
            let entry = slot.take()?;
            let staged = entry.tree_dir();

            let request = SnapshotRequest {
                package,
                display_name: definition.display_name(),
                before: live,
                after: &staged,
            };
            let version = match self.history.snapshot(&request) {
                Ok(version) => version,
                Err(e) => {
                    warn!(package = %package, error = %e, "snapshot failed; pending staging kept");
                    slot.restore(entry)?;
                    return Err(e.into());
                }
            };

            if let Err(e) = self.live.replace(package, &staged) {
                // The version is recorded; a retry snapshots the unchanged
                // live tree under the next id.
                error!(package = %package, version = %version.id, error = %e, "live tree replacement failed");
                slot.restore(entry)?;
                return Err(e.into());
            }
            Ok(version)
        })?;

        info!(package = %package, version = %version.id, summary = %version.summary, "pending staging approved");
        // Queued rather than refused: a reload already running may have read
        // this package's live tree before the swap.
        let reload = self.coordinator.reload_queued();
        Ok(ApprovalOutcome { version, reload })
    }

    /// Discard the pending tree of `package`.
    pub fn reject_pending(&self, package: &PackageId) -> VersioningResult<()> {
        self.package(package)?;
        let entry = self.staging.take(package)?;
        info!(package = %package, summary = %entry.summary(), "pending staging rejected");
        Ok(())
    }

    // ---- History ----

    /// Versions of one package, or of all, newest first.
    pub fn list_versions(&self, package: Option<&PackageId>) -> VersioningResult<Vec<AssetVersion>> {
        if let Some(id) = package {
            self.package(id)?;
        }
        Ok(self.history.list(package)?)
    }

    pub fn get_version(&self, id: &VersionId) -> VersioningResult<AssetVersion> {
        Ok(self.history.get(id)?)
    }

    pub fn get_version_diff(&self, id: &VersionId) -> VersioningResult<Vec<FileDiffSummary>> {
        Ok(self.history.diff(id)?)
    }

    pub fn get_file_diff(&self, id: &VersionId, path: &str) -> VersioningResult<FileDiffDetail> {
        Ok(self.history.file_diff(id, path)?)
    }

    // ---- Pending ----

    pub fn get_pending_preview(&self, package: &PackageId) -> VersioningResult<SyncPreview> {
        self.package(package)?;
        let entry = self
            .staging
            .get(package)
            .ok_or_else(|| VersioningError::NoPendingStaging(package.clone()))?;
        self.preview(&entry)
    }

    /// Previews of every pending entry, by package id.
    pub fn get_all_pending_previews(&self) -> VersioningResult<Vec<SyncPreview>> {
        self.staging.all().iter().map(|entry| self.preview(entry)).collect()
    }

    pub fn get_pending_file_diff(&self, package: &PackageId, path: &str) -> VersioningResult<FileDiffDetail> {
        self.package(package)?;
        let entry = self
            .staging
            .get(package)
            .ok_or_else(|| VersioningError::NoPendingStaging(package.clone()))?;
        Ok(entry.file_diff(path, &self.options)?)
    }

    fn preview(&self, entry: &StagingEntry) -> VersioningResult<SyncPreview> {
        let package = entry.package();
        let display_name = self
            .packages
            .get(package)
            .map(|p| p.display_name().to_string())
            .unwrap_or_else(|| package.to_string());
        Ok(SyncPreview {
            package: package.clone(),
            display_name,
            target_version: self.history.next_version(package)?,
            staged_at: entry.staged_at(),
            summary: entry.summary(),
            files: entry.files().to_vec(),
            fetch_warnings: entry.fetch_warnings().to_vec(),
            suppression_warnings: entry.suppression_warnings().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Mutex, OnceLock};
    use std::thread;
    use std::time::{Duration, Instant};

    use rulebook_history::FsVersionStore;
    use rulebook_profile::InMemoryProfileSource;
    use rulebook_profile::ProfileDocument;
    use rulebook_reload::{ReloadResult, ReloadStatus, Reloadable};
    use rulebook_store::FsLiveTrees;
    use rulebook_types::{FileChangeStatus, ImpactKind};

    use super::*;
    use crate::error::FetchError;
    use crate::fetch::DirectoryFetcher;

    fn pkg(name: &str) -> PackageId {
        PackageId::new(name).unwrap()
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Replace the whole upstream tree of a package.
    fn publish(root: &Path, files: &[(&str, &str)]) {
        if root.exists() {
            fs::remove_dir_all(root).unwrap();
        }
        fs::create_dir_all(root).unwrap();
        for (rel, content) in files {
            write(root, rel, content);
        }
    }

    fn read_tree(root: &Path) -> BTreeMap<String, String> {
        let tree = AssetTree::scan(root).unwrap();
        tree.paths()
            .map(|p| (p.to_string(), fs::read_to_string(root.join(p)).unwrap()))
            .collect()
    }

    /// Counts reloads; fails while `broken` is set.
    #[derive(Default)]
    struct Counter {
        runs: AtomicUsize,
        broken: AtomicBool,
    }

    impl Reloadable for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn reload(&self) -> ReloadResult {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.broken.load(Ordering::SeqCst) {
                ReloadResult::failed("counter", Duration::ZERO, "cache rebuild failed")
            } else {
                ReloadResult::ok("counter", 1, Duration::ZERO)
            }
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        counter: Arc<Counter>,
        service: AssetVersioningService,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with(Arc::new(DirectoryFetcher), None)
        }

        fn with(fetcher: Arc<dyn PackageFetcher>, profiles: Option<Arc<ProfileRegistry>>) -> Self {
            Self::build(fetcher, profiles, Vec::new())
        }

        /// Registers `extra` after the counter.
        fn build(
            fetcher: Arc<dyn PackageFetcher>,
            profiles: Option<Arc<ProfileRegistry>>,
            extra: Vec<Arc<dyn Reloadable>>,
        ) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path();
            let packages = ["efatura", "edefter"].map(|name| {
                PackageConfig::new(pkg(name))
                    .with_display_name(name.to_uppercase())
                    .with_source(root.join("upstream").join(name))
            });
            let live = FsLiveTrees::new()
                .with(pkg("efatura"), root.join("live/efatura"))
                .with(pkg("edefter"), root.join("live/edefter"));
            let history = FsVersionStore::open(root.join("history"), DiffOptions::default()).unwrap();
            let staging = StagingArea::open(root.join("staging")).unwrap();
            let counter = Arc::new(Counter::default());
            let mut coordinator = ReloadCoordinator::new().with(counter.clone());
            for component in extra {
                coordinator.register(component);
            }
            let coordinator = Arc::new(coordinator);

            let mut service = AssetVersioningService::new(
                packages,
                fetcher,
                Arc::new(live),
                Arc::new(history),
                staging,
                coordinator,
            );
            if let Some(profiles) = profiles {
                service = service.with_profiles(profiles);
            }
            Self { dir, counter, service }
        }

        fn upstream(&self, name: &str) -> PathBuf {
            self.dir.path().join("upstream").join(name)
        }

        fn live(&self, name: &str) -> PathBuf {
            self.dir.path().join("live").join(name)
        }

        fn history(&self) -> PathBuf {
            self.dir.path().join("history")
        }
    }

    #[test]
    fn approve_and_reject_without_pending_are_invalid_state() {
        let fx = Fixture::new();
        for name in ["efatura", "edefter"] {
            let err = fx.service.approve_pending(&pkg(name)).unwrap_err();
            assert!(err.is_invalid_state(), "{err}");
            let err = fx.service.reject_pending(&pkg(name)).unwrap_err();
            assert!(err.is_invalid_state(), "{err}");
            assert!(fx.service.get_pending_preview(&pkg(name)).unwrap_err().is_invalid_state());
        }
        assert_eq!(fx.counter.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_package_is_not_found() {
        let fx = Fixture::new();
        let ghost = pkg("ghost");
        assert!(matches!(
            fx.service.sync_to_staging(&ghost),
            Err(VersioningError::UnknownPackage(_))
        ));
        assert!(fx.service.approve_pending(&ghost).unwrap_err().is_not_found());
        assert!(fx.service.list_versions(Some(&ghost)).unwrap_err().is_not_found());
    }

    #[test]
    fn second_sync_replaces_first() {
        let fx = Fixture::new();
        let efatura = pkg("efatura");

        publish(&fx.upstream("efatura"), &[("xsd/first.xsd", "1")]);
        let first = fx.service.sync_to_staging(&efatura).unwrap();
        assert_eq!(first.summary.added, 1);

        publish(&fx.upstream("efatura"), &[("xsd/second.xsd", "2"), ("sch/main.sch", "s")]);
        let second = fx.service.sync_to_staging(&efatura).unwrap();

        let paths: Vec<&str> = second.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["sch/main.sch", "xsd/second.xsd"]);
        assert_eq!(second.summary.added, 2);
        assert_eq!(fx.service.get_all_pending_previews().unwrap().len(), 1);

        let outcome = fx.service.approve_pending(&efatura).unwrap();
        assert_eq!(
            read_tree(&fx.live("efatura")),
            BTreeMap::from([
                ("sch/main.sch".to_string(), "s".to_string()),
                ("xsd/second.xsd".to_string(), "2".to_string()),
            ])
        );
        assert_eq!(outcome.version.summary.added, 2);
    }

    #[test]
    fn approval_snapshots_previous_live_tree() {
        let fx = Fixture::new();
        let efatura = pkg("efatura");
        publish(&fx.live("efatura"), &[("sch/main.sch", "old rules"), ("xsd/common.xsd", "same")]);
        publish(&fx.upstream("efatura"), &[("sch/main.sch", "new rules"), ("xsd/common.xsd", "same")]);

        let preview = fx.service.sync_to_staging(&efatura).unwrap();
        assert_eq!(preview.target_version.to_string(), "efatura/v1");
        assert_eq!(preview.display_name, "EFATURA");
        assert_eq!(preview.summary.modified, 1);
        assert_eq!(preview.summary.unchanged, 1);

        let before = read_tree(&fx.live("efatura"));
        let outcome = fx.service.approve_pending(&efatura).unwrap();

        assert_eq!(outcome.version.id, preview.target_version);
        assert!(outcome.reload.is_ok());
        assert_eq!(fx.counter.runs.load(Ordering::SeqCst), 1);

        let snapshot = fx.history().join(&outcome.version.snapshot);
        assert_eq!(read_tree(&snapshot), before);
        assert_eq!(read_tree(&fx.live("efatura")), read_tree(&fx.upstream("efatura")));

        assert!(fx.service.get_pending_preview(&efatura).unwrap_err().is_invalid_state());
        assert_eq!(fx.service.list_versions(None).unwrap().len(), 1);

        let diff = fx.service.get_version_diff(&outcome.version.id).unwrap();
        let modified: Vec<&str> = diff
            .iter()
            .filter(|f| f.status == FileChangeStatus::Modified)
            .map(|f| f.path.as_str())
            .collect();
        assert_eq!(modified, vec!["sch/main.sch"]);

        let detail = fx.service.get_file_diff(&outcome.version.id, "sch/main.sch").unwrap();
        let text = detail.unified_diff.unwrap();
        assert!(text.contains("-old rules"));
        assert!(text.contains("+new rules"));
    }

    #[test]
    fn version_ids_increase_per_package() {
        let fx = Fixture::new();
        let efatura = pkg("efatura");
        let edefter = pkg("edefter");

        for (round, content) in ["a", "b", "c"].iter().enumerate() {
            publish(&fx.upstream("efatura"), &[("rules.sch", content)]);
            fx.service.sync_to_staging(&efatura).unwrap();
            let outcome = fx.service.approve_pending(&efatura).unwrap();
            assert_eq!(outcome.version.id.number(), round as u64 + 1);
        }

        publish(&fx.upstream("edefter"), &[("defter.xsd", "d")]);
        fx.service.sync_to_staging(&edefter).unwrap();
        assert_eq!(fx.service.approve_pending(&edefter).unwrap().version.id.to_string(), "edefter/v1");

        let ids: Vec<String> = fx
            .service
            .list_versions(Some(&efatura))
            .unwrap()
            .iter()
            .map(|v| v.id.to_string())
            .collect();
        assert_eq!(ids, vec!["efatura/v3", "efatura/v2", "efatura/v1"]);
        assert_eq!(fx.service.list_versions(None).unwrap().len(), 4);
    }

    #[test]
    fn failed_snapshot_keeps_pending_and_consumes_no_id() {
        let fx = Fixture::new();
        let efatura = pkg("efatura");
        publish(&fx.live("efatura"), &[("rules.sch", "old")]);
        publish(&fx.upstream("efatura"), &[("rules.sch", "new")]);
        fx.service.sync_to_staging(&efatura).unwrap();

        let blocker = fx.history().join("efatura");
        fs::write(&blocker, "not a directory").unwrap();
        assert!(fx.service.approve_pending(&efatura).is_err());

        assert!(fx.service.get_pending_preview(&efatura).is_ok());
        assert_eq!(read_tree(&fx.live("efatura"))["rules.sch"], "old");
        assert!(fx.service.list_versions(None).unwrap().is_empty());
        assert_eq!(fx.counter.runs.load(Ordering::SeqCst), 0);

        fs::remove_file(&blocker).unwrap();
        let outcome = fx.service.approve_pending(&efatura).unwrap();
        assert_eq!(outcome.version.id.number(), 1);
        assert_eq!(read_tree(&fx.live("efatura"))["rules.sch"], "new");
    }

    #[test]
    fn reload_failure_does_not_roll_back() {
        let fx = Fixture::new();
        let efatura = pkg("efatura");
        publish(&fx.upstream("efatura"), &[("rules.sch", "new")]);
        fx.service.sync_to_staging(&efatura).unwrap();

        fx.counter.broken.store(true, Ordering::SeqCst);
        let outcome = fx.service.approve_pending(&efatura).unwrap();
        assert_eq!(outcome.reload.status, ReloadStatus::Failed);
        assert_eq!(outcome.reload.components[0].errors, vec!["cache rebuild failed"]);
        assert_eq!(read_tree(&fx.live("efatura"))["rules.sch"], "new");
        assert_eq!(fx.service.list_versions(None).unwrap().len(), 1);

        fx.counter.broken.store(false, Ordering::SeqCst);
        assert!(fx.service.coordinator().reload().is_ok());
    }

    #[test]
    fn reject_leaves_live_and_history_untouched() {
        let fx = Fixture::new();
        let efatura = pkg("efatura");
        publish(&fx.live("efatura"), &[("rules.sch", "old")]);
        publish(&fx.upstream("efatura"), &[("rules.sch", "new")]);
        fx.service.sync_to_staging(&efatura).unwrap();

        fx.service.reject_pending(&efatura).unwrap();
        assert!(fx.service.reject_pending(&efatura).unwrap_err().is_invalid_state());
        assert_eq!(read_tree(&fx.live("efatura"))["rules.sch"], "old");
        assert!(fx.service.list_versions(None).unwrap().is_empty());
        assert_eq!(fx.counter.runs.load(Ordering::SeqCst), 0);

        // Rejection does not use up a version number.
        fx.service.sync_to_staging(&efatura).unwrap();
        assert_eq!(fx.service.approve_pending(&efatura).unwrap().version.id.number(), 1);
    }

    #[test]
    fn pending_file_diff() {
        let fx = Fixture::new();
        let efatura = pkg("efatura");
        publish(&fx.live("efatura"), &[("a.sch", "one\ntwo\n")]);
        publish(&fx.upstream("efatura"), &[("a.sch", "one\nthree\n"), ("b.xsd", "new")]);
        fx.service.sync_to_staging(&efatura).unwrap();

        let detail = fx.service.get_pending_file_diff(&efatura, "a.sch").unwrap();
        assert_eq!(detail.status, FileChangeStatus::Modified);
        assert_eq!((detail.additions, detail.deletions), (1, 1));

        let added = fx.service.get_pending_file_diff(&efatura, "b.xsd").unwrap();
        assert_eq!(added.status, FileChangeStatus::Added);

        let err = fx.service.get_pending_file_diff(&efatura, "missing.xsd").unwrap_err();
        assert!(matches!(err, VersioningError::FileNotFound { .. }));
        assert!(fx
            .service
            .get_pending_file_diff(&pkg("edefter"), "a.sch")
            .unwrap_err()
            .is_invalid_state());
    }

    #[test]
    fn pending_diff_survives_live_changes() {
        let fx = Fixture::new();
        let efatura = pkg("efatura");
        publish(&fx.live("efatura"), &[("a.sch", "base\n")]);
        publish(&fx.upstream("efatura"), &[("a.sch", "staged\n")]);
        fx.service.sync_to_staging(&efatura).unwrap();

        // Out-of-band edits to the live tree do not affect the staged diff.
        publish(&fx.live("efatura"), &[("a.sch", "tampered\n")]);
        let detail = fx.service.get_pending_file_diff(&efatura, "a.sch").unwrap();
        assert_eq!(detail.old_content.as_deref(), Some("base\n"));
    }

    struct Failing;

    impl PackageFetcher for Failing {
        fn fetch(&self, package: &PackageConfig, dest: &Path) -> Result<Vec<String>, FetchError> {
            if package.id.as_str() == "edefter" {
                Err(FetchError::Other("connection reset".into()))
            } else {
                DirectoryFetcher.fetch(package, dest)
            }
        }
    }

    #[test]
    fn sync_all_collects_failures() {
        let fx = Fixture::with(Arc::new(Failing), None);
        publish(&fx.upstream("efatura"), &[("a.xsd", "a")]);

        let outcome = fx.service.sync_all_to_staging();
        assert!(!outcome.is_complete());
        assert_eq!(outcome.previews.len(), 1);
        assert_eq!(outcome.previews[0].package, pkg("efatura"));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, pkg("edefter"));
        assert!(matches!(outcome.failures[0].1, VersioningError::Fetch { .. }));
    }

    #[test]
    fn failed_fetch_keeps_previous_entry() {
        let fx = Fixture::new();
        let efatura = pkg("efatura");
        publish(&fx.upstream("efatura"), &[("a.xsd", "a")]);
        fx.service.sync_to_staging(&efatura).unwrap();

        fs::remove_dir_all(fx.upstream("efatura")).unwrap();
        assert!(matches!(
            fx.service.sync_to_staging(&efatura),
            Err(VersioningError::Fetch { .. })
        ));
        let preview = fx.service.get_pending_preview(&efatura).unwrap();
        assert_eq!(preview.files[0].path, "a.xsd");
    }

    #[test]
    fn staged_schematron_change_warns_about_suppressions() {
        let document = ProfileDocument::from_yaml(
            "profiles:\n  unsigned:\n    suppressions:\n      - match: ruleIdEquals\n        pattern: TR-SIG-01\n",
        )
        .unwrap();
        let profiles = Arc::new(ProfileRegistry::new(Arc::new(InMemoryProfileSource::new(document))));
        assert!(profiles.reload().is_ok());

        let fx = Fixture::with(Arc::new(DirectoryFetcher), Some(profiles));
        let efatura = pkg("efatura");
        publish(&fx.live("efatura"), &[("sch/main.sch", "<sch:assert id=\"TR-SIG-01\" test=\"x\"/>")]);
        publish(&fx.upstream("efatura"), &[("sch/main.sch", "<sch:assert id=\"TR-SIG-001\" test=\"x\"/>")]);

        let preview = fx.service.sync_to_staging(&efatura).unwrap();
        assert_eq!(preview.suppression_warnings.len(), 1);
        let warning = &preview.suppression_warnings[0];
        assert_eq!(warning.kind, ImpactKind::PossiblyRenamed);
        assert_eq!(warning.profile.as_deref(), Some("unsigned"));
        assert_eq!(warning.suggested_rule_id.as_deref(), Some("TR-SIG-001"));
    }

    /// Counts the files of one live tree on every reload. The first reload
    /// blocks after counting until released.
    struct Watcher {
        dir: OnceLock<PathBuf>,
        seen: Mutex<Vec<usize>>,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Reloadable for Watcher {
        fn name(&self) -> &str {
            "watcher"
        }

        fn reload(&self) -> ReloadResult {
            let dir = self.dir.get().unwrap();
            let count = AssetTree::scan(dir).unwrap().paths().count();
            self.seen.lock().unwrap().push(count);
            if let Some(tx) = self.entered.lock().unwrap().take() {
                tx.send(()).unwrap();
                self.release.lock().unwrap().recv().unwrap();
            }
            ReloadResult::ok("watcher", count, Duration::ZERO)
        }
    }

    fn wait_for(path: &Path) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !path.exists() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", path.display());
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn concurrent_approvals_both_reach_the_caches() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let watcher = Arc::new(Watcher {
            dir: OnceLock::new(),
            seen: Mutex::new(Vec::new()),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        });
        let fx = Fixture::build(Arc::new(DirectoryFetcher), None, vec![watcher.clone() as Arc<dyn Reloadable>]);
        watcher.dir.set(fx.live("edefter")).unwrap();

        let (efatura, edefter) = (pkg("efatura"), pkg("edefter"));
        publish(&fx.upstream("efatura"), &[("sch/main.sch", "e")]);
        publish(&fx.upstream("edefter"), &[("xsd/defter.xsd", "d"), ("sch/defter.sch", "s")]);
        fx.service.sync_to_staging(&efatura).unwrap();
        fx.service.sync_to_staging(&edefter).unwrap();

        let (first, second) = thread::scope(|s| {
            let first = s.spawn(|| fx.service.approve_pending(&efatura));
            // The efatura reload has counted edefter's old tree and is parked.
            entered_rx.recv().unwrap();

            let second = s.spawn(|| fx.service.approve_pending(&edefter));
            // edefter commits while the efatura reload is still running.
            wait_for(&fx.live("edefter").join("xsd/defter.xsd"));
            thread::sleep(Duration::from_millis(20));
            release_tx.send(()).unwrap();

            (first.join().unwrap().unwrap(), second.join().unwrap().unwrap())
        });

        assert!(first.reload.is_ok());
        assert!(second.reload.is_ok(), "{:?}", second.reload);
        assert_eq!(fx.counter.runs.load(Ordering::SeqCst), 2);
        assert_eq!(*watcher.seen.lock().unwrap(), vec![0, 2]);
    }

    #[test]
    fn sync_and_approve_of_one_package_serialize() {
        for _ in 0..4 {
            let fx = Fixture::new();
            let efatura = pkg("efatura");
            publish(&fx.upstream("efatura"), &[("rules.sch", "a")]);
            fx.service.sync_to_staging(&efatura).unwrap();
            publish(&fx.upstream("efatura"), &[("rules.sch", "b")]);

            thread::scope(|s| {
                let approve = s.spawn(|| fx.service.approve_pending(&efatura));
                let sync = s.spawn(|| fx.service.sync_to_staging(&efatura));
                approve.join().unwrap().unwrap();
                sync.join().unwrap().unwrap();
            });

            let versions = fx.service.list_versions(Some(&efatura)).unwrap();
            assert_eq!(versions.len(), 1);
            assert_eq!(versions[0].summary.added, 1);
            match fx.service.get_pending_preview(&efatura) {
                // Approval went first: "a" is live and "b" is staged on top of it.
                Ok(preview) => {
                    assert_eq!(read_tree(&fx.live("efatura"))["rules.sch"], "a");
                    assert_eq!(preview.summary.modified, 1);
                    assert_eq!(preview.target_version.number(), 2);
                    let detail = fx.service.get_pending_file_diff(&efatura, "rules.sch").unwrap();
                    assert_eq!(detail.old_content.as_deref(), Some("a"));
                }
                // Sync went first and its tree was the one approved.
                Err(e) => {
                    assert!(e.is_invalid_state(), "{e}");
                    assert_eq!(read_tree(&fx.live("efatura"))["rules.sch"], "b");
                }
            }
        }
    }
}
