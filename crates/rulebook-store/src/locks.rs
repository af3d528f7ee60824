use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rulebook_types::PackageId;

/// One mutex per package, created on first use.
///
/// Operations on different packages never contend; operations on the same
/// package are serialized by whoever holds that package's mutex.
#[derive(Debug, Default)]
pub struct PackageLocks {
    locks: Mutex<HashMap<PackageId, Arc<Mutex<()>>>>,
}

impl PackageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex guarding `package`.
    pub fn get(&self, package: &PackageId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("package lock table poisoned");
        locks.entry(package.clone()).or_default().clone()
    }

    /// Run `f` while holding `package`'s mutex.
    ///
    /// A poisoned package mutex is recovered: it guards no data of its own.
    pub fn with<T>(&self, package: &PackageId, f: impl FnOnce() -> T) -> T {
        let lock = self.get(package);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f()
    }
}
