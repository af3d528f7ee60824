use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome class of a reload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReloadStatus {
    /// Everything loaded.
    Ok,
    /// Some items failed; the rest were published.
    Partial,
    /// Nothing was published; the previous generation is still served.
    Failed,
}

impl fmt::Display for ReloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ok => "OK",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Outcome of reloading one component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadResult {
    pub component: String,
    pub status: ReloadStatus,
    /// Items in the component's published generation.
    pub loaded_count: usize,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

impl ReloadResult {
    pub fn ok(component: impl Into<String>, loaded_count: usize, elapsed: Duration) -> Self {
        Self {
            component: component.into(),
            status: ReloadStatus::Ok,
            loaded_count,
            duration_ms: millis(elapsed),
            errors: Vec::new(),
        }
    }

    pub fn partial(
        component: impl Into<String>,
        loaded_count: usize,
        elapsed: Duration,
        errors: Vec<String>,
    ) -> Self {
        Self {
            component: component.into(),
            status: ReloadStatus::Partial,
            loaded_count,
            duration_ms: millis(elapsed),
            errors,
        }
    }

    pub fn failed(component: impl Into<String>, elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: ReloadStatus::Failed,
            loaded_count: 0,
            duration_ms: millis(elapsed),
            errors: vec![error.into()],
        }
    }

    /// `Ok` when `errors` is empty, `Partial` otherwise.
    pub fn from_errors(
        component: impl Into<String>,
        loaded_count: usize,
        elapsed: Duration,
        errors: Vec<String>,
    ) -> Self {
        if errors.is_empty() {
            Self::ok(component, loaded_count, elapsed)
        } else {
            Self::partial(component, loaded_count, elapsed, errors)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReloadStatus::Ok
    }
}

/// Aggregate outcome of a coordinator reload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadReport {
    pub status: ReloadStatus,
    /// Per-component results in registration order.
    pub components: Vec<ReloadResult>,
    pub duration_ms: u64,
}

impl ReloadReport {
    /// Aggregate component results.
    ///
    /// `Ok` when every component is `Ok` (including when there are none),
    /// `Failed` when every component failed, `Partial` otherwise.
    pub fn from_results(components: Vec<ReloadResult>, elapsed: Duration) -> Self {
        let status = if components.iter().all(ReloadResult::is_ok) {
            ReloadStatus::Ok
        } else if components.iter().all(|c| c.status == ReloadStatus::Failed) {
            ReloadStatus::Failed
        } else {
            ReloadStatus::Partial
        };
        Self {
            status,
            components,
            duration_ms: millis(elapsed),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReloadStatus::Ok
    }

    /// Components that did not report `Ok`.
    pub fn failures(&self) -> impl Iterator<Item = &ReloadResult> {
        self.components.iter().filter(|c| !c.is_ok())
    }

    pub fn loaded_count(&self) -> usize {
        self.components.iter().map(|c| c.loaded_count).sum()
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
