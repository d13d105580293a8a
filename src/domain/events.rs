//! Event types for the run log.
//!
//! All state changes are recorded as immutable events in an append-only log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FailureKind;

/// A single event in the append-only event log.
///
/// The state of any run can be reconstructed by replaying its events in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Crew name (run_started only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crew: Option<String>,

    /// Task name (if applicable)
    pub task: Option<String>,

    /// Position of the task in the crew (if applicable)
    pub task_index: Option<usize>,

    /// Type of event
    pub event_type: EventType,

    /// Human-readable summary (NO prompt or artifact bodies)
    pub summary: String,

    /// Current status of the task/run
    pub status: TaskStatus,

    /// Reasoning attempt number (1-indexed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,

    /// Time taken in milliseconds (for completed tasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Content hash of the ontology or artifact this event refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// Error message if failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Failure classification (run_failed only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(run_id: Uuid, event_type: EventType, summary: String, status: TaskStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            crew: None,
            task: None,
            task_index: None,
            event_type,
            summary,
            status,
            attempt: None,
            duration_ms: None,
            content_hash: None,
            error: None,
            failure_kind: None,
        }
    }

    pub fn with_crew(mut self, crew: impl Into<String>) -> Self {
        self.crew = Some(crew.into());
        self
    }

    /// Attach the task this event refers to
    pub fn for_task(mut self, task_index: usize, task: impl Into<String>) -> Self {
        self.task_index = Some(task_index);
        self.task = Some(task.into());
        self
    }

    /// Attach a reasoning attempt number
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Create an event with duration information
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_hash(mut self, content_hash: impl Into<String>) -> Self {
        self.content_hash = Some(content_hash.into());
        self
    }

    /// Create an event with error information
    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_failure(mut self, kind: FailureKind) -> Self {
        self.failure_kind = Some(kind);
        self
    }
}

/// Types of events that can occur during a crew run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new run has started
    RunStarted,

    /// The ontology document was loaded
    OntologyLoaded,

    /// A run completed successfully
    RunCompleted,

    /// A run failed
    RunFailed,

    /// A task has started execution
    TaskStarted,

    /// A worker attempt failed and will be retried
    ReasoningRetry,

    /// A task's artifact was persisted
    ArtifactWritten,

    /// A task completed successfully
    TaskCompleted,

    /// A task failed permanently
    TaskFailed,
}

/// Status of a task or run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet started
    #[default]
    Pending,

    /// Currently executing
    Running,

    /// Completed successfully
    Completed,

    /// Failed (with error)
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::new(
            Uuid::new_v4(),
            EventType::TaskStarted,
            "Starting Ontology_Alignment".to_string(),
            TaskStatus::Running,
        )
        .for_task(0, "Ontology_Alignment");

        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("duration_ms"));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type, EventType::TaskStarted);
        assert_eq!(parsed.status, TaskStatus::Running);
        assert_eq!(parsed.task_index, Some(0));
    }

    #[test]
    fn test_event_builders() {
        let event = Event::new(
            Uuid::new_v4(),
            EventType::RunFailed,
            "Run failed".to_string(),
            TaskStatus::Failed,
        )
        .with_attempt(3)
        .with_duration(1500)
        .with_error("Connection timeout".to_string())
        .with_failure(FailureKind::ReasoningExhausted);

        assert_eq!(event.attempt, Some(3));
        assert_eq!(event.duration_ms, Some(1500));
        assert_eq!(event.error, Some("Connection timeout".to_string()));
        assert_eq!(event.failure_kind, Some(FailureKind::ReasoningExhausted));
    }
}
