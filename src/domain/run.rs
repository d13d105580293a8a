//! Run state and reconstruction from events.
//!
//! A Run represents a single execution of a crew.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::Artifact;
use super::events::{Event, EventType, TaskStatus};
use crate::error::FailureKind;

/// A crew execution run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Name of the crew being executed
    pub crew_name: String,

    /// Current state of the run
    pub state: RunState,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,

    /// SHA256 prefix of the ontology the run used
    pub ontology_hash: Option<String>,

    /// Artifacts produced by completed tasks, in creation order
    #[serde(default)]
    pub artifacts: Vec<Artifact>,

    /// Artifact file names in write order (survives replay)
    #[serde(default)]
    pub written_files: Vec<String>,

    /// Status of each task (task name -> status)
    pub task_statuses: HashMap<String, TaskStatus>,
}

impl Run {
    /// Create a run that has not started yet
    pub fn new(id: Uuid, crew_name: String) -> Self {
        Self {
            id,
            crew_name,
            state: RunState::NotStarted,
            started_at: Utc::now(),
            completed_at: None,
            ontology_hash: None,
            artifacts: Vec::new(),
            written_files: Vec::new(),
            task_statuses: HashMap::new(),
        }
    }

    /// Reconstruct run state from a sequence of events.
    ///
    /// Artifact bodies are not part of the log, so only `written_files` is
    /// restored; `artifacts` stays empty.
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let first_event = events.first()?;

        let mut run = Self::new(first_event.run_id, String::new());
        run.started_at = first_event.timestamp;

        for event in events {
            run.apply_event(event);
        }

        Some(run)
    }

    /// Apply a single event to update run state
    pub fn apply_event(&mut self, event: &Event) {
        match event.event_type {
            EventType::RunStarted => {
                self.started_at = event.timestamp;
                if let Some(ref crew) = event.crew {
                    self.crew_name = crew.clone();
                }
            }
            EventType::OntologyLoaded => {
                self.ontology_hash = event.content_hash.clone();
            }
            EventType::TaskStarted | EventType::ReasoningRetry => {
                if let (Some(index), Some(task)) = (event.task_index, &event.task) {
                    self.state = RunState::Running { task_index: index };
                    self.task_statuses.insert(task.clone(), TaskStatus::Running);
                }
            }
            EventType::ArtifactWritten => {
                if let Some(ref task) = event.task {
                    // Summary carries the file name for artifact events
                    let file = event.summary.clone();
                    if !self.written_files.contains(&file) {
                        self.written_files.push(file);
                    }
                    self.task_statuses.insert(task.clone(), TaskStatus::Running);
                }
            }
            EventType::TaskCompleted => {
                if let Some(ref task) = event.task {
                    self.task_statuses.insert(task.clone(), TaskStatus::Completed);
                }
            }
            EventType::TaskFailed => {
                if let Some(ref task) = event.task {
                    self.task_statuses.insert(task.clone(), TaskStatus::Failed);
                }
            }
            EventType::RunCompleted => {
                self.state = RunState::Completed;
                self.completed_at = Some(event.timestamp);
            }
            EventType::RunFailed => {
                self.state = RunState::Failed {
                    task_index: event.task_index,
                    task: event.task.clone(),
                    kind: event.failure_kind.unwrap_or(FailureKind::Internal),
                    error: event.error.clone().unwrap_or_default(),
                };
                self.completed_at = Some(event.timestamp);
            }
        }
    }

    /// Check if the run reached a terminal state
    pub fn is_finished(&self) -> bool {
        matches!(self.state, RunState::Completed | RunState::Failed { .. })
    }

    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Check if a specific task is completed
    pub fn is_task_completed(&self, task: &str) -> bool {
        self.task_statuses
            .get(task)
            .map(|s| *s == TaskStatus::Completed)
            .unwrap_or(false)
    }

    /// Artifact produced by a task during this run
    pub fn artifact(&self, task: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.task_name == task)
    }

    /// Artifact of the last task, i.e. the validated graph fragment
    pub fn final_artifact(&self) -> Option<&Artifact> {
        self.artifacts.last()
    }
}

/// State of a crew run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Created, no task has started
    #[default]
    NotStarted,

    /// Executing the task at `task_index`
    Running { task_index: usize },

    /// All tasks completed
    Completed,

    /// Aborted. `task_index` is `None` when the run failed before its first task.
    Failed {
        task_index: Option<usize>,
        task: Option<String>,
        kind: FailureKind,
        error: String,
    },
}

impl RunState {
    /// Short label for listings
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::Running { .. } => "running",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}
