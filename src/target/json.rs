//! File-backed target.
use std::path::{Path, PathBuf};

use super::{MemoryTarget, Target, TargetDocument, stable_id};
use crate::error::TargetError;
use crate::template::Entry;

/// A target persisted as a JSON [`TargetDocument`].
///
/// Reads and writes go to memory; [`save`](Self::save) writes the document
/// back to disk.
#[derive(Debug)]
pub struct JsonTarget {
    path: PathBuf,
    inner: MemoryTarget,
}

impl JsonTarget {
    /// Open an existing target document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn open(path: &Path) -> Result<Self, TargetError> {
        let content = std::fs::read_to_string(path).map_err(|source| TargetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let doc: TargetDocument =
            serde_json::from_str(&content).map_err(|source| TargetError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            inner: MemoryTarget::from_document(doc),
        })
    }

    /// Open the document at `path`, or start an empty target for `url` if
    /// the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn open_or_init(path: &Path, url: &str, title: &str) -> Result<Self, TargetError> {
        if path.exists() {
            return Self::open(path);
        }
        tracing::debug!(path = %path.display(), url, "initializing empty target");
        let url = url.trim_end_matches('/');
        Ok(Self {
            path: path.to_path_buf(),
            inner: MemoryTarget::from_document(TargetDocument {
                url: url.to_string(),
                id: stable_id(&[url]),
                title: title.to_string(),
                sections: std::collections::BTreeMap::new(),
            }),
        })
    }

    /// Path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of writes since the target was opened.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.inner.writes()
    }

    /// An in-memory copy of the current state; writes to it never reach
    /// this target.
    #[must_use]
    pub fn snapshot(&self) -> MemoryTarget {
        MemoryTarget::from_document(self.inner.to_document())
    }

    /// Write the current state back to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized or written.
    pub fn save(&self) -> Result<(), TargetError> {
        let io_err = |source| TargetError::Io {
            path: self.path.display().to_string(),
            source,
        };
        let mut json = serde_json::to_string_pretty(&self.inner.to_document()).map_err(|source| {
            TargetError::Parse {
                path: self.path.display().to_string(),
                source,
            }
        })?;
        json.push('\n');
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&self.path, json).map_err(io_err)
    }
}

impl Target for JsonTarget {
    fn url(&self) -> &str {
        self.inner.url()
    }

    fn id(&self) -> &str {
        self.inner.id()
    }

    fn title(&self) -> &str {
        self.inner.title()
    }

    fn entries(&self, category: &str) -> Result<Vec<Entry>, TargetError> {
        self.inner.entries(category)
    }

    fn find(&self, category: &str, key: &str) -> Result<Option<Entry>, TargetError> {
        self.inner.find(category, key)
    }

    fn create(&self, category: &str, entry: &Entry) -> Result<String, TargetError> {
        self.inner.create(category, entry)
    }

    fn update(&self, category: &str, key: &str, entry: &Entry) -> Result<String, TargetError> {
        self.inner.update(category, key, entry)
    }
}
