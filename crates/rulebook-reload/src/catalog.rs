//! Reloadable index of live asset files.
//!
//! A catalog stands in front of an engine cache (compiled XSD schemas,
//! compiled Schematron rules): it records which files of the selected kinds
//! are live and their content hashes, and republishes that view on reload.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rulebook_store::{AssetTree, LiveTrees, StoreResult};
use rulebook_types::{ContentHash, PackageId};

use crate::coordinator::Reloadable;
use crate::result::ReloadResult;
use crate::swap::SwapCell;

/// One published generation of a catalog.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    /// `<root label>/<relative path>` to content hash.
    pub files: BTreeMap<String, ContentHash>,
}

impl CatalogSnapshot {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ContentHash> {
        self.files.get(key)
    }
}

/// Where a catalog root is read from.
enum Root {
    Dir(PathBuf),
    /// Read through [`LiveTrees`], so a reload never scans a package while
    /// its live tree is being replaced.
    Live(Arc<dyn LiveTrees>, PackageId),
}

impl Root {
    fn scan(&self) -> StoreResult<AssetTree> {
        match self {
            Root::Dir(path) => AssetTree::scan(path),
            Root::Live(live, package) => live.scan(package),
        }
    }
}

/// Files with the given extensions below a set of labelled roots.
pub struct AssetCatalog {
    name: String,
    extensions: Vec<String>,
    roots: Vec<(String, Root)>,
    current: SwapCell<CatalogSnapshot>,
}

impl AssetCatalog {
    /// A catalog of files whose extension is one of `extensions`
    /// (case-insensitive, without the dot).
    pub fn new<I, S>(name: impl Into<String>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            roots: Vec::new(),
            current: SwapCell::default(),
        }
    }

    /// Include the tree at `root`, keyed under `label`.
    pub fn with_root(mut self, label: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.roots.push((label.into(), Root::Dir(root.into())));
        self
    }

    /// Include every package of `live`, each keyed under its id.
    pub fn with_live(mut self, live: Arc<dyn LiveTrees>) -> Self {
        for package in live.packages() {
            self.roots
                .push((package.to_string(), Root::Live(live.clone(), package)));
        }
        self
    }

    /// The currently published generation.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.load()
    }

    pub fn generation(&self) -> u64 {
        self.current.generation()
    }

    fn wants(&self, path: &str) -> bool {
        path.rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }
}

impl Reloadable for AssetCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn reload(&self) -> ReloadResult {
        let start = Instant::now();
        let mut files = BTreeMap::new();
        let mut errors = Vec::new();

        for (label, root) in &self.roots {
            match root.scan() {
                Ok(tree) => {
                    for (path, entry) in tree.iter().filter(|(p, _)| self.wants(p)) {
                        files.insert(format!("{label}/{path}"), entry.hash);
                    }
                }
                Err(e) => errors.push(format!("{label}: {e}")),
            }
        }

        if !errors.is_empty() && files.is_empty() {
            return ReloadResult::failed(&self.name, start.elapsed(), errors.join("; "));
        }

        let loaded = files.len();
        self.current.store(CatalogSnapshot { files });
        ReloadResult::from_errors(&self.name, loaded, start.elapsed(), errors)
    }
}
