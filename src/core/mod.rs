//! Core orchestration logic.
//!
//! This module contains:
//! - Crew: agent and task definitions and loading
//! - Ontology: the shared ontology document and its read tool
//! - Worker: the per-role reasoning loop
//! - EventStore / ArtifactStore: run log and output files
//! - Safety: size limits, timeouts and the path denylist
//! - Orchestrator: sequential execution engine

pub mod artifact_store;
pub mod crew;
pub mod event_store;
pub mod ontology;
pub mod orchestrator;
pub mod safety;
pub mod tools;
pub mod worker;

// Re-export commonly used types
pub use artifact_store::ArtifactStore;
pub use crew::{AgentConfig, CrewDefinition, Process, RetryPolicy, TaskConfig};
pub use event_store::{hash_content, EventStore};
pub use ontology::OntologyStore;
pub use orchestrator::Orchestrator;
pub use safety::{SafetyLimits, SafetyViolation};
pub use tools::{Capability, Tool, ToolFactory, ToolSet};
pub use worker::{build_workers, normalize_output, Worker};
