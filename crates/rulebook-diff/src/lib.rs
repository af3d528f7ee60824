//! Diff engine for rulebook.
//!
//! Compares two asset trees and produces structured change sets: a per-file
//! classification for the whole tree, a unified diff for a single file, and
//! the set of Schematron rule ids a file gained or lost.
//!
//! # Key Types
//!
//! - [`diff_trees`] -- Tree-level classification (added/removed/modified/unchanged), path-sorted
//! - [`diff_file`] / [`DiffOptions`] -- Unified diff for one file, with binary and size guards
//! - [`RuleIdDiff`] -- Schematron rule ids removed, added, and retained between two files

pub mod error;
pub mod file_diff;
pub mod rule_ids;
pub mod tree_diff;

pub use error::{DiffError, DiffResult};
pub use file_diff::{diff_file, DiffOptions};
pub use rule_ids::{extract_rule_ids, is_schematron_path, RuleIdDiff};
pub use tree_diff::diff_trees;
