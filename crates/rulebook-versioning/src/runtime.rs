use std::sync::Arc;

use rulebook_history::FsVersionStore;
use rulebook_profile::{FileProfileSource, ProfileRegistry};
use rulebook_reload::{AssetCatalog, ReloadCoordinator, ReloadReport, Reloadable};
use rulebook_staging::StagingArea;
use rulebook_store::{FsLiveTrees, LiveTrees};
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::error::VersioningResult;
use crate::fetch::{DirectoryFetcher, PackageFetcher};
use crate::service::AssetVersioningService;

/// A running rulebook instance built from a [`ServiceConfig`].
///
/// Catalogs are registered with the coordinator before the profile registry,
/// so an approval reloads schemas and rules ahead of the profiles that refer
/// to them.
pub struct Rulebook {
    pub service: AssetVersioningService,
    pub profiles: Arc<ProfileRegistry>,
    pub catalogs: Vec<Arc<AssetCatalog>>,
    pub coordinator: Arc<ReloadCoordinator>,
    startup: ReloadReport,
}

impl Rulebook {
    /// Open with packages fetched from their configured source directories.
    pub fn open(config: &ServiceConfig) -> VersioningResult<Self> {
        Self::open_with(config, Arc::new(DirectoryFetcher))
    }

    /// Open with a custom fetcher, then load every component once.
    pub fn open_with(config: &ServiceConfig, fetcher: Arc<dyn PackageFetcher>) -> VersioningResult<Self> {
        config.validate()?;

        let mut live = FsLiveTrees::new();
        for package in &config.packages {
            live = live.with(package.id.clone(), config.live_dir(package));
        }
        let live: Arc<dyn LiveTrees> = Arc::new(live);
        let history = FsVersionStore::open(config.history_dir(), config.diff)?;
        let staging = StagingArea::open(config.staging_dir())?;

        let catalogs: Vec<Arc<AssetCatalog>> = config
            .catalogs
            .iter()
            .map(|c| Arc::new(AssetCatalog::new(&c.name, &c.extensions).with_live(live.clone())))
            .collect();
        let profiles = Arc::new(ProfileRegistry::new(Arc::new(FileProfileSource::new(
            config.profiles_file(),
        ))));

        let mut coordinator = ReloadCoordinator::new();
        for catalog in &catalogs {
            coordinator.register(catalog.clone());
        }
        coordinator.register(profiles.clone());
        let coordinator = Arc::new(coordinator);

        let service = AssetVersioningService::new(
            config.packages.iter().cloned(),
            fetcher,
            live,
            Arc::new(history),
            staging,
            coordinator.clone(),
        )
        .with_profiles(profiles.clone())
        .with_diff_options(config.diff);

        let startup = coordinator.reload();
        if startup.is_ok() {
            info!(
                packages = config.packages.len(),
                components = coordinator.component_names().len(),
                loaded = startup.loaded_count(),
                "rulebook started"
            );
        } else {
            for failure in startup.failures() {
                warn!(component = %failure.component, errors = ?failure.errors, "component failed to load at startup");
            }
        }

        Ok(Self {
            service,
            profiles,
            catalogs,
            coordinator,
            startup,
        })
    }

    /// The initial load performed by [`Rulebook::open`].
    pub fn startup_report(&self) -> &ReloadReport {
        &self.startup
    }

    pub fn catalog(&self, name: &str) -> Option<&Arc<AssetCatalog>> {
        self.catalogs.iter().find(|c| c.name() == name)
    }
}
