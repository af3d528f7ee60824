//! Service configuration.
//!
//! ```toml
//! assets_root = "/var/lib/rulebook"
//!
//! [diff]
//! max_file_size = 10485760
//! context_lines = 3
//!
//! [[packages]]
//! id = "efatura"
//! display_name = "e-Fatura"
//! live_dir = "efatura"
//! source = "/srv/gib/efatura"
//!
//! [[catalogs]]
//! name = "XSD Schemas"
//! extensions = ["xsd"]
//! ```
//!
//! Relative paths in a loaded file are resolved against the file's directory.
//! Package live directories are resolved against `assets_root`.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use rulebook_diff::DiffOptions;
use rulebook_types::PackageId;
use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;

const DEFAULT_ASSETS_ROOT: &str = "assets";
const STAGING_DIR: &str = "staging";
const HISTORY_DIR: &str = "history";
const PROFILES_FILE: &str = "validation-profiles.yml";

/// Top-level service configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub assets_root: PathBuf,
    /// Defaults to `<assets_root>/staging`.
    pub staging_dir: Option<PathBuf>,
    /// Defaults to `<assets_root>/history`.
    pub history_dir: Option<PathBuf>,
    /// Defaults to `<assets_root>/validation-profiles.yml`.
    pub profiles_file: Option<PathBuf>,
    pub diff: DiffOptions,
    pub packages: Vec<PackageConfig>,
    /// Reloadable indexes over the live trees, in reload order.
    pub catalogs: Vec<CatalogConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            assets_root: PathBuf::from(DEFAULT_ASSETS_ROOT),
            staging_dir: None,
            history_dir: None,
            profiles_file: None,
            diff: DiffOptions::default(),
            packages: Vec::new(),
            catalogs: vec![
                CatalogConfig::new("XSD Schemas", ["xsd"]),
                CatalogConfig::new("Schematron Rules", ["sch", "xml"]),
                CatalogConfig::new("XSLT Stylesheets", ["xsl", "xslt"]),
            ],
        }
    }
}

impl ServiceConfig {
    /// Load, rebase and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            config.rebase(dir);
        }
        Ok(config)
    }

    /// Parse and validate TOML text. Relative paths stay relative.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.assets_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("assets_root must not be empty".into()));
        }
        if self.diff.context_lines > 1000 {
            return Err(ConfigError::Invalid("diff.context_lines must be at most 1000".into()));
        }

        let mut ids = BTreeSet::new();
        let mut live_dirs = BTreeSet::new();
        for package in &self.packages {
            if !ids.insert(&package.id) {
                return Err(ConfigError::Invalid(format!("duplicate package id: {}", package.id)));
            }
            let live = package.live_dir();
            if !is_plain_relative(live) {
                return Err(ConfigError::Invalid(format!(
                    "package {}: live_dir must be a relative path without '..'",
                    package.id
                )));
            }
            if !live_dirs.insert(live.to_path_buf()) {
                return Err(ConfigError::Invalid(format!(
                    "package {}: live_dir {} is used by another package",
                    package.id,
                    live.display()
                )));
            }
        }
        if self.packages.is_empty() {
            warn!("no packages configured");
        }

        for catalog in &self.catalogs {
            if catalog.name.trim().is_empty() {
                return Err(ConfigError::Invalid("catalog name must not be empty".into()));
            }
            if catalog.extensions.iter().all(|e| e.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!("catalog {} lists no extensions", catalog.name)));
            }
        }
        Ok(())
    }

    /// Resolve relative paths against `base`.
    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.assets_root);
        for p in [&mut self.staging_dir, &mut self.history_dir, &mut self.profiles_file]
            .into_iter()
            .flatten()
        {
            join(p);
        }
        for package in &mut self.packages {
            if let Some(source) = &mut package.source {
                join(source);
            }
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(|| self.assets_root.join(STAGING_DIR))
    }

    pub fn history_dir(&self) -> PathBuf {
        self.history_dir.clone().unwrap_or_else(|| self.assets_root.join(HISTORY_DIR))
    }

    pub fn profiles_file(&self) -> PathBuf {
        self.profiles_file.clone().unwrap_or_else(|| self.assets_root.join(PROFILES_FILE))
    }

    /// Absolute (or assets-root relative) live directory of `package`.
    pub fn live_dir(&self, package: &PackageConfig) -> PathBuf {
        self.assets_root.join(package.live_dir())
    }

    pub fn package(&self, id: &PackageId) -> Option<&PackageConfig> {
        self.packages.iter().find(|p| &p.id == id)
    }
}

fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

// ---------------------------------------------------------------------------
// PackageConfig / CatalogConfig
// ---------------------------------------------------------------------------

/// One externally published package.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    pub id: PackageId,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Relative to `assets_root`; defaults to the package id.
    #[serde(default)]
    live_dir: Option<PathBuf>,
    /// Directory the built-in fetcher copies from.
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PackageConfig {
    pub fn new(id: PackageId) -> Self {
        Self {
            id,
            display_name: None,
            live_dir: None,
            source: None,
            description: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_live_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.live_dir = Some(dir.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The configured display name, or the id.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(self.id.as_str())
    }

    /// Live directory relative to the assets root.
    pub fn live_dir(&self) -> &Path {
        self.live_dir.as_deref().unwrap_or(Path::new(self.id.as_str()))
    }
}

/// A reloadable index of live files with the given extensions.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    pub name: String,
    pub extensions: Vec<String>,
}

impl CatalogConfig {
    pub fn new<I, S>(name: impl Into<String>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }
}
