//! Append-only event store with file-based persistence.
//!
//! Events are stored as newline-delimited JSON (JSONL) for simplicity
//! and easy debugging/inspection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{Event, EventType};

/// File-based event store using JSONL format
pub struct EventStore {
    /// Directory containing the run
    run_dir: PathBuf,

    /// Path to the events.jsonl file
    events_path: PathBuf,
}

impl EventStore {
    /// Create or open the event store for a run under `base_dir`
    pub async fn open_in(base_dir: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = base_dir.join(run_id.to_string());

        fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        let events_path = run_dir.join("events.jsonl");

        Ok(Self {
            run_dir,
            events_path,
        })
    }

    /// Open the event store of an existing run without creating anything
    pub fn find_in(base_dir: &Path, run_id: Uuid) -> Option<Self> {
        let run_dir = base_dir.join(run_id.to_string());
        let events_path = run_dir.join("events.jsonl");

        events_path.is_file().then_some(Self {
            run_dir,
            events_path,
        })
    }

    /// Get the path to the events file
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Get the run directory
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open events file: {}",
                    self.events_path.display()
                )
            })?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Find events matching a predicate
    pub async fn find_events<F>(&self, predicate: F) -> Result<Vec<Event>>
    where
        F: Fn(&Event) -> bool,
    {
        let events = self.replay().await?;
        Ok(events.into_iter().filter(predicate).collect())
    }

    /// Get the last event of a specific type
    pub async fn last_event_of_type(&self, event_type: EventType) -> Result<Option<Event>> {
        let events = self.replay().await?;
        Ok(events.into_iter().rev().find(|e| e.event_type == event_type))
    }

    /// List all run IDs under `base_dir`
    pub async fn list_runs_in(base_dir: &Path) -> Result<Vec<Uuid>> {
        if !base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        runs.push(uuid);
                    }
                }
            }
        }

        Ok(runs)
    }
}

/// Hash content (first 16 hex chars of SHA256)
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_event_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let store = EventStore::open_in(temp.path(), run_id).await.unwrap();

        let started = Event::new(
            run_id,
            EventType::RunStarted,
            "Run started".to_string(),
            TaskStatus::Running,
        );
        let task = Event::new(
            run_id,
            EventType::TaskStarted,
            "Task started".to_string(),
            TaskStatus::Running,
        )
        .for_task(0, "Ontology_Alignment");

        store.append(&started).await.unwrap();
        store.append(&task).await.unwrap();

        let events = store.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::RunStarted);
        assert_eq!(events[1].task.as_deref(), Some("Ontology_Alignment"));

        let last = store
            .last_event_of_type(EventType::TaskStarted)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.task_index, Some(0));
    }

    #[tokio::test]
    async fn test_replay_empty_store() {
        let temp = TempDir::new().unwrap();
        let store = EventStore::open_in(temp.path(), Uuid::new_v4()).await.unwrap();

        assert!(store.replay().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_does_not_create_run_dir() {
        let temp = TempDir::new().unwrap();
        let missing = Uuid::new_v4();

        assert!(EventStore::find_in(temp.path(), missing).is_none());
        assert!(!temp.path().join(missing.to_string()).exists());

        let run_id = Uuid::new_v4();
        let store = EventStore::open_in(temp.path(), run_id).await.unwrap();
        assert!(EventStore::find_in(temp.path(), run_id).is_none());

        let event = Event::new(run_id, EventType::RunStarted, "Run started".to_string(), TaskStatus::Running);
        store.append(&event).await.unwrap();
        assert!(EventStore::find_in(temp.path(), run_id).is_some());
    }

    #[tokio::test]
    async fn test_list_runs_ignores_other_entries() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        EventStore::open_in(temp.path(), run_id).await.unwrap();
        std::fs::create_dir_all(temp.path().join("not-a-run")).unwrap();

        let runs = EventStore::list_runs_in(temp.path()).await.unwrap();
        assert_eq!(runs, vec![run_id]);
    }

    #[test]
    fn test_hash_consistency() {
        let hash1 = hash_content("Person isA Entity.");
        let hash2 = hash_content("Person isA Entity.");
        let hash3 = hash_content("Person isA Agent.");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 16);
    }
}
