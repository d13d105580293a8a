//! Error taxonomy for crew runs.
//!
//! Every error that can stop a run maps to a [`FailureKind`], which is what
//! gets recorded in the run state and the event log.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::crew::Process;
use crate::core::safety::SafetyViolation;

/// Errors raised while building or running a crew
#[derive(Debug, Error)]
pub enum CrewError {
    /// The ontology document is absent
    #[error("Ontology document not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A worker could not produce valid output within its retry bound
    #[error("Task '{task}' ({role}) exhausted {attempts} reasoning attempts: {last_error}")]
    ReasoningExhausted {
        task: String,
        role: String,
        attempts: u32,
        last_error: String,
    },

    /// An artifact could not be persisted
    #[error("Failed to write output of task '{task}' to {}: {reason}", path.display())]
    TaskOutputWrite {
        task: String,
        path: PathBuf,
        reason: String,
    },

    /// The crew definition failed validation
    #[error("Invalid crew configuration: {0}")]
    InvalidConfig(String),

    /// The configured process mode cannot be executed
    #[error("Process mode '{0:?}' is not supported")]
    UnsupportedProcess(Process),

    /// A task's input artifact does not exist yet
    #[error("Task '{task}' depends on missing artifact from '{dependency}'")]
    MissingDependency { task: String, dependency: String },

    /// A worker asked for a tool it did not declare
    #[error("Tool '{tool}' is not available to '{role}'")]
    ToolUnavailable { role: String, tool: String },

    /// A safety limit was violated
    #[error(transparent)]
    Safety(#[from] SafetyViolation),

    /// Reading the ontology failed for a reason other than absence
    #[error("Failed to read ontology {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CrewError {
    /// Classify this error for the run record
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::ReasoningExhausted { .. } => FailureKind::ReasoningExhausted,
            Self::TaskOutputWrite { .. } => FailureKind::TaskOutputWrite,
            Self::InvalidConfig(_) | Self::UnsupportedProcess(_) => FailureKind::InvalidConfig,
            Self::MissingDependency { .. } => FailureKind::MissingDependency,
            Self::ToolUnavailable { .. } => FailureKind::ToolUnavailable,
            Self::Safety(_) => FailureKind::SafetyViolation,
            Self::Io { .. } => FailureKind::Io,
        }
    }
}

/// Serializable classification of a run failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    ReasoningExhausted,
    TaskOutputWrite,
    InvalidConfig,
    MissingDependency,
    ToolUnavailable,
    SafetyViolation,
    Io,
    /// Failure outside the crew taxonomy (event log, lock file)
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = CrewError::NotFound {
            path: PathBuf::from("rules.txt"),
        };
        assert_eq!(err.kind(), FailureKind::NotFound);
        assert!(err.to_string().contains("rules.txt"));

        let err = CrewError::ReasoningExhausted {
            task: "Ontology_Alignment".to_string(),
            role: "SchemaMapper".to_string(),
            attempts: 3,
            last_error: "not JSON".to_string(),
        };
        assert_eq!(err.kind(), FailureKind::ReasoningExhausted);
        assert!(err.to_string().contains("exhausted 3 reasoning attempts"));
    }

    #[test]
    fn test_failure_kind_serialization() {
        let json = serde_json::to_string(&FailureKind::ReasoningExhausted).unwrap();
        assert_eq!(json, "\"reasoning_exhausted\"");
    }
}
