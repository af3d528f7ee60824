//! Package fetchers.

use std::path::Path;

use rulebook_store::copy_tree;
use tracing::debug;

use crate::config::PackageConfig;
use crate::error::FetchError;

/// Produces the current upstream tree of a package.
///
/// Network access, archive extraction and their timeouts belong to the
/// implementation; the service only sees the finished tree or an error.
pub trait PackageFetcher: Send + Sync {
    /// Write the package's tree into `dest`, an existing empty directory.
    /// Returns warnings worth showing to the operator.
    fn fetch(&self, package: &PackageConfig, dest: &Path) -> Result<Vec<String>, FetchError>;
}

/// Copies the package's configured `source` directory.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectoryFetcher;

impl PackageFetcher for DirectoryFetcher {
    fn fetch(&self, package: &PackageConfig, dest: &Path) -> Result<Vec<String>, FetchError> {
        let source = package.source.as_deref().ok_or(FetchError::NoSource)?;
        if !source.is_dir() {
            return Err(FetchError::SourceMissing(source.to_path_buf()));
        }

        let copied = copy_tree(source, dest)?;
        debug!(package = %package.id, source = %source.display(), files = copied, "fetched package");

        let mut warnings = Vec::new();
        if copied == 0 {
            warnings.push(format!("source {} contains no files", source.display()));
        }
        Ok(warnings)
    }
}
