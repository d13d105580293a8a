//! The authoritative ontology document.
//!
//! Loaded once per run and shared read-only by every worker. Its rules take
//! precedence over any task instruction that contradicts them.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use super::event_store::hash_content;
use super::safety::SafetyLimits;
use crate::error::CrewError;

/// Read-only handle to the ontology document
#[derive(Debug)]
pub struct OntologyStore {
    path: PathBuf,
    content: Arc<str>,
    content_hash: String,
    reads: AtomicUsize,
}

impl OntologyStore {
    /// Load the document from disk.
    ///
    /// A missing file is `CrewError::NotFound`; callers treat it as fatal.
    pub async fn load(path: &Path, limits: &SafetyLimits) -> Result<Self, CrewError> {
        limits.validate_ontology_path(path)?;

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CrewError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => {
                return Err(CrewError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        limits.validate_ontology(&content)?;
        if content.trim().is_empty() {
            return Err(CrewError::InvalidConfig(format!(
                "Ontology document is empty: {}",
                path.display()
            )));
        }

        let store = Self::from_text(path, content);
        info!(
            path = %store.path.display(),
            bytes = store.content.len(),
            hash = %store.content_hash,
            "Ontology loaded"
        );
        Ok(store)
    }

    /// Build a store from text already in memory
    pub fn from_text(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let content: String = content.into();
        let content_hash = hash_content(&content);
        Self {
            path: path.into(),
            content: Arc::from(content),
            content_hash,
            reads: AtomicUsize::new(0),
        }
    }

    /// Full text of the document
    pub fn contents(&self) -> Arc<str> {
        let n = self.reads.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(reads = n, "Ontology read");
        Arc::clone(&self.content)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Number of times `contents()` has been called
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}
