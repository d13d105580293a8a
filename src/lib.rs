//! kgcrew - Sequential agent crew for knowledge graph construction
//!
//! Four workers run in a fixed order, each grounded in a shared ontology
//! document, each persisting one JSON artifact before the next begins:
//! ontology alignment, attribute extraction, relationship linking and
//! validation.
//!
//! # Architecture
//!
//! - Every run is recorded as an append-only JSONL event log
//! - Run state is derived by replaying events
//! - Workers retry malformed output up to their reasoning bound; any other
//!   failure stops the run at the failing task
//!
//! # Modules
//!
//! - `adapters`: Agent executors (command, HTTP, heuristic)
//! - `core`: Crew definition, ontology store, workers, orchestrator
//! - `domain`: Data structures (Event, Run, Artifact, RunContext)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in crew over a document
//! kgcrew run --input paper.txt --ontology knowledge/rules_for_ontology.txt
//!
//! # Check run status
//! kgcrew status <run-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;

// Re-export main types at crate root for convenience
pub use adapters::{Executor, ExecutorConfig, HeuristicExecutor};
pub use core::{CrewDefinition, Orchestrator};
pub use domain::{Artifact, Event, EventType, Run, RunState};
pub use error::{CrewError, FailureKind};
