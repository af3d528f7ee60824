use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Instant;

use tracing::{error, info, warn};

use crate::result::{ReloadReport, ReloadResult, ReloadStatus};

/// Name reported when a reload is refused because another is running.
const COORDINATOR: &str = "reload-coordinator";

// ---------------------------------------------------------------------------
// Reloadable
// ---------------------------------------------------------------------------

/// A component that caches state derived from the asset trees.
///
/// `reload` must build the replacement state completely before publishing
/// it. On failure the component keeps serving its previous generation and
/// reports `Failed`; it must not leave a half-updated cache behind.
pub trait Reloadable: Send + Sync {
    /// Human-readable component name.
    fn name(&self) -> &str;

    /// Rebuild from current assets.
    fn reload(&self) -> ReloadResult;
}

// ---------------------------------------------------------------------------
// ReloadCoordinator
// ---------------------------------------------------------------------------

/// Reloads registered components in registration order.
///
/// Order is significant: a component may read state published by an earlier
/// one, so register shared lookups (schemas) before their consumers
/// (profiles). Every component is attempted even when an earlier one fails.
pub struct ReloadCoordinator {
    components: Vec<Arc<dyn Reloadable>>,
    running: Mutex<()>,
}

impl ReloadCoordinator {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            running: Mutex::new(()),
        }
    }

    /// Append a component to the reload order.
    pub fn register(&mut self, component: Arc<dyn Reloadable>) {
        info!(component = component.name(), position = self.components.len(), "registered reloadable");
        self.components.push(component);
    }

    /// Builder form of [`Self::register`].
    pub fn with(mut self, component: Arc<dyn Reloadable>) -> Self {
        self.register(component);
        self
    }

    /// Registered component names in reload order.
    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Reload every component and aggregate the outcomes.
    ///
    /// Only one reload runs at a time; a call made while another is in
    /// progress returns immediately with a `Failed` report. Use
    /// [`Self::reload_queued`] when the caller has just changed the assets
    /// and the reload must not be skipped.
    pub fn reload(&self) -> ReloadReport {
        let start = Instant::now();
        let _running = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                warn!("reload requested while another reload is in progress");
                return ReloadReport::from_results(
                    vec![ReloadResult::failed(
                        COORDINATOR,
                        start.elapsed(),
                        "reload already in progress",
                    )],
                    start.elapsed(),
                );
            }
        };
        self.run(start)
    }

    /// Reload every component, waiting for a reload in progress to finish
    /// first.
    ///
    /// The reload that runs here starts after the call was made, so it sees
    /// every asset change committed before the call.
    pub fn reload_queued(&self) -> ReloadReport {
        let start = Instant::now();
        let _running = self
            .running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if start.elapsed().as_millis() > 0 {
            info!(waited_ms = start.elapsed().as_millis() as u64, "queued reload starting");
        }
        self.run(start)
    }

    /// Reload in registration order. Caller holds `running`.
    fn run(&self, start: Instant) -> ReloadReport {
        info!(components = self.components.len(), "reloading components");
        let results: Vec<ReloadResult> = self.components.iter().map(|c| reload_one(c.as_ref())).collect();
        let report = ReloadReport::from_results(results, start.elapsed());

        match report.status {
            ReloadStatus::Ok => info!(
                duration_ms = report.duration_ms,
                loaded = report.loaded_count(),
                "reload complete"
            ),
            status => warn!(
                %status,
                duration_ms = report.duration_ms,
                failed = report.failures().count(),
                "reload finished with failures"
            ),
        }
        report
    }
}

impl Default for ReloadCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one component's reload, converting a panic into a `Failed` result.
fn reload_one(component: &dyn Reloadable) -> ReloadResult {
    let start = Instant::now();
    match panic::catch_unwind(AssertUnwindSafe(|| component.reload())) {
        Ok(result) => {
            match result.status {
                ReloadStatus::Ok => info!(
                    component = %result.component,
                    loaded = result.loaded_count,
                    duration_ms = result.duration_ms,
                    "component reloaded"
                ),
                status => warn!(
                    component = %result.component,
                    %status,
                    errors = ?result.errors,
                    "component reload incomplete"
                ),
            }
            result
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(component = component.name(), %message, "component reload panicked");
            ReloadResult::failed(component.name(), start.elapsed(), format!("panicked: {message}"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
