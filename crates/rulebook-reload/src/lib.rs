//! Reload coordination for rulebook.
//!
//! Components that derive in-memory state from the asset trees implement
//! [`Reloadable`]. After an approval, the [`ReloadCoordinator`] asks each of
//! them, in registration order, to rebuild. A component builds its new state
//! completely before publishing it through a [`SwapCell`], so readers see the
//! old generation or the new one and never a mixture.
//!
//! # Key Types
//!
//! - [`Reloadable`] -- A cache that can rebuild itself from current assets
//! - [`ReloadCoordinator`] -- Ordered registration list, aggregate reporting
//! - [`ReloadResult`] / [`ReloadReport`] -- Per-component and aggregate outcomes
//! - [`SwapCell`] -- Atomically replaceable shared value
//! - [`AssetCatalog`] -- Reloadable index of live asset files by extension

pub mod catalog;
pub mod coordinator;
pub mod result;
pub mod swap;

pub use catalog::{AssetCatalog, CatalogSnapshot};
pub use coordinator::{ReloadCoordinator, Reloadable};
pub use result::{ReloadReport, ReloadResult, ReloadStatus};
pub use swap::SwapCell;
