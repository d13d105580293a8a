//! Artifact persistence for a single run.
//!
//! Artifacts land in the output directory under their declared file names.
//! Each file is written atomically (temp file + rename) and at most once per
//! run. The directory is locked for the lifetime of the store so two runs
//! cannot interleave writes.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::domain::Artifact;
use crate::error::CrewError;

const LOCK_FILE: &str = ".kgcrew.lock";

/// Write-once artifact store bound to one run
pub struct ArtifactStore {
    output_dir: PathBuf,
    written: Vec<String>,
    lock: File,
}

impl ArtifactStore {
    /// Create the output directory if needed and lock it for this run
    pub fn open(output_dir: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create output directory: {}", output_dir.display())
        })?;

        let lock_path = output_dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        lock.try_lock_exclusive().with_context(|| {
            format!(
                "Output directory {} is in use by another run",
                output_dir.display()
            )
        })?;

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            written: Vec::new(),
            lock,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path an artifact file name resolves to
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// Whether this run has already written `file_name`
    pub fn contains(&self, file_name: &str) -> bool {
        self.written.iter().any(|f| f == file_name)
    }

    /// File names written so far, in write order
    pub fn written(&self) -> &[String] {
        &self.written
    }

    /// Persist an artifact. Fails if the file was already written this run.
    pub fn write(&mut self, artifact: &Artifact) -> Result<PathBuf, CrewError> {
        let path = self.path_for(&artifact.file_name);
        let write_error = |reason: String| CrewError::TaskOutputWrite {
            task: artifact.task_name.clone(),
            path: path.clone(),
            reason,
        };

        if self.contains(&artifact.file_name) {
            return Err(write_error("already written in this run".to_string()));
        }

        let mut tmp = NamedTempFile::new_in(&self.output_dir)
            .map_err(|e| write_error(format!("cannot create temp file: {}", e)))?;
        tmp.write_all(artifact.content.as_bytes())
            .and_then(|_| tmp.flush())
            .map_err(|e| write_error(e.to_string()))?;
        tmp.persist(&path)
            .map_err(|e| write_error(e.error.to_string()))?;

        debug!(path = %path.display(), bytes = artifact.size_bytes, "Artifact written");
        self.written.push(artifact.file_name.clone());
        Ok(path)
    }

    /// Delete files left by an earlier run that this run has not rewritten.
    /// Returns the names of the files removed.
    pub fn remove_unwritten<'a>(&self, file_names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut removed = Vec::new();

        for name in file_names {
            let path = self.path_for(name);
            if self.contains(name) || !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed.push(name.to_string()),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale artifact"),
            }
        }

        removed
    }
}

impl Drop for ArtifactStore {
    fn drop(&mut self) {
        let _ = self.lock.unlock();
    }
}
