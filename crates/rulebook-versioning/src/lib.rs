//! Rule-set package lifecycle for rulebook.
//!
//! A package (the GIB e-Fatura or e-Defter rule set, for instance) moves
//! through a small state machine: fetching it lands a pending copy in
//! staging next to a diff against the live tree; an operator then either
//! approves it, which snapshots the live tree into history, swaps the staged
//! tree in and reloads every cache built from the assets, or rejects it,
//! which leaves everything as it was.
//!
//! # Key Types
//!
//! - [`AssetVersioningService`] -- Sync, approve, reject, and history/pending queries
//! - [`Rulebook`] -- Everything wired together from a [`ServiceConfig`]
//! - [`PackageFetcher`] -- Where staged trees come from
//! - [`ServiceConfig`] -- TOML service configuration

pub mod config;
pub mod error;
pub mod fetch;
pub mod runtime;
pub mod service;

pub use config::{CatalogConfig, PackageConfig, ServiceConfig};
pub use error::{ConfigError, FetchError, VersioningError, VersioningResult};
pub use fetch::{DirectoryFetcher, PackageFetcher};
pub use runtime::Rulebook;
pub use service::{ApprovalOutcome, AssetVersioningService, SyncAllOutcome};
