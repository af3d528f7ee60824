//! Staging area for rulebook.
//!
//! A freshly fetched package waits here for an operator to approve or
//! reject it. Each package has at most one pending [`StagingEntry`]; staging
//! again replaces it. Entries own private copies of both the fetched tree and
//! the live tree it was compared against, so previews and file diffs never
//! read a directory that is being replaced.
//!
//! # Key Types
//!
//! - [`StagingArea`] -- Per-package slots with exclusive put/take and lock-free reads
//! - [`StagingDraft`] -- Working directory a fetch writes into before it is staged
//! - [`StagingEntry`] -- A pending tree with its precomputed diff and warnings
//! - [`Slot`] -- Handle to one package's slot while its lock is held

pub mod area;
pub mod entry;
pub mod error;

pub use area::{Slot, StagingArea};
pub use entry::{StagingDraft, StagingEntry};
pub use error::{StagingError, StagingResult};
