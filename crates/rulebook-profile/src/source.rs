//! Where the profile document lives.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use rulebook_store::StoreError;
use tracing::debug;

use crate::error::ProfileResult;
use crate::model::ProfileDocument;

/// Reads and writes the whole profile document.
pub trait ProfileSource: Send + Sync {
    /// The current document. A source with nothing stored yet returns an
    /// empty document.
    fn load(&self) -> ProfileResult<ProfileDocument>;

    /// Replace the stored document.
    fn store(&self, document: &ProfileDocument) -> ProfileResult<()>;

    /// Where the document lives, for log and error messages.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// FileProfileSource
// ---------------------------------------------------------------------------

/// A YAML file on disk.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the original, so a reader never sees a half-written document.
#[derive(Clone, Debug)]
pub struct FileProfileSource {
    path: PathBuf,
}

impl FileProfileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProfileSource for FileProfileSource {
    fn load(&self) -> ProfileResult<ProfileDocument> {
        match fs::read_to_string(&self.path) {
            Ok(text) => ProfileDocument::from_yaml(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no profile document yet");
                Ok(ProfileDocument::default())
            }
            Err(e) => Err(StoreError::io(&self.path)(e).into()),
        }
    }

    fn store(&self, document: &ProfileDocument) -> ProfileResult<()> {
        let yaml = document.to_yaml()?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(StoreError::io(&dir))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(StoreError::io(&dir))?;
        tmp.write_all(yaml.as_bytes()).map_err(StoreError::io(tmp.path()))?;
        tmp.as_file().sync_all().map_err(StoreError::io(tmp.path()))?;
        tmp.persist(&self.path).map_err(|e| StoreError::io(&self.path)(e.error))?;

        debug!(path = %self.path.display(), profiles = document.profiles.len(), "profile document written");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// InMemoryProfileSource
// ---------------------------------------------------------------------------

/// A document held in memory.
#[derive(Debug, Default)]
pub struct InMemoryProfileSource {
    document: RwLock<ProfileDocument>,
}

impl InMemoryProfileSource {
    pub fn new(document: ProfileDocument) -> Self {
        Self {
            document: RwLock::new(document),
        }
    }

    /// Replace the document without going through a registry.
    pub fn set(&self, document: ProfileDocument) {
        *self.document.write().expect("profile source lock poisoned") = document;
    }
}

impl ProfileSource for InMemoryProfileSource {
    fn load(&self) -> ProfileResult<ProfileDocument> {
        Ok(self.document.read().expect("profile source lock poisoned").clone())
    }

    fn store(&self, document: &ProfileDocument) -> ProfileResult<()> {
        self.set(document.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
