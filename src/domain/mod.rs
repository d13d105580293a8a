//! Domain types for the kgcrew orchestrator.
//!
//! This module contains the core data structures:
//! - Events: Immutable records of state changes
//! - Run: Crew execution state
//! - RunContext: Append-only memory threaded through tasks
//! - Artifact: Task outputs

pub mod artifact;
pub mod context;
pub mod events;
pub mod run;

// Re-export commonly used types
pub use artifact::Artifact;
pub use context::{MemoryEntry, RunContext};
pub use events::{Event, EventType, TaskStatus};
pub use run::{Run, RunState};
