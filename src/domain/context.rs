//! Run context threaded through every task invocation.
//!
//! Holds the run's shared memory as an append-only history of worker
//! outputs. Only the orchestrator appends; workers borrow it read-only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One remembered worker output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Task that produced the output
    pub task: String,

    /// Role of the worker that produced it
    pub role: String,

    /// Artifact file the output was written to
    pub file_name: String,

    /// Normalized output
    pub output: String,
}

/// Explicit per-run context
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Template inputs (e.g. `source_text`) interpolated into task descriptions
    inputs: BTreeMap<String, String>,

    history: Vec<MemoryEntry>,
}

impl RunContext {
    pub fn new(inputs: BTreeMap<String, String>) -> Self {
        Self {
            inputs,
            history: Vec::new(),
        }
    }

    pub fn inputs(&self) -> &BTreeMap<String, String> {
        &self.inputs
    }

    /// Append a worker output to the history
    pub fn remember(&mut self, entry: MemoryEntry) {
        self.history.push(entry);
    }

    /// History in the order outputs were produced
    pub fn history(&self) -> &[MemoryEntry] {
        &self.history
    }

    /// Most recent output of a task, if it ran
    pub fn output_of(&self, task: &str) -> Option<&MemoryEntry> {
        self.history.iter().rev().find(|e| e.task == task)
    }

    /// Replace `{key}` placeholders with inputs in one pass over the
    /// template. Unknown keys are left as-is; substituted values are never
    /// rescanned.
    pub fn interpolate(&self, template: &str) -> String {
        let mut rendered = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let value = after
                .find('}')
                .and_then(|end| self.inputs.get(&after[..end]).map(|v| (end, v)));

            match value {
                Some((end, value)) => {
                    rendered.push_str(value);
                    rest = &after[end + 1..];
                }
                None => {
                    rendered.push('{');
                    rest = after;
                }
            }
        }

        rendered.push_str(rest);
        rendered
    }

    /// Render the history for inclusion in a prompt
    pub fn render_history(&self) -> String {
        self.history
            .iter()
            .map(|e| format!("[{} by {} -> {}]\n{}", e.task, e.role, e.file_name, e.output.trim_end()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
