//! Tools available to workers during their reasoning loop.
//!
//! Agents declare the capabilities they need; [`ToolFactory`] injects a
//! concrete tool for each declared capability. A worker can only invoke
//! tools in its own [`ToolSet`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ontology::OntologyStore;
use crate::error::CrewError;

/// Name under which the ontology tool is exposed
pub const READ_ONTOLOGY_TOOL: &str = "read_master_ontology";

/// A capability an agent can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Read the authoritative ontology document
    ReadOntology,
}

impl Capability {
    /// Tool name that satisfies this capability
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::ReadOntology => READ_ONTOLOGY_TOOL,
        }
    }
}

/// A named, callable tool
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Description shown to the executor
    fn description(&self) -> &str;

    fn invoke(&self, args: &serde_json::Value) -> Result<String, CrewError>;
}

/// Returns the authoritative ontology and rules
pub struct ReadOntologyTool {
    store: Arc<OntologyStore>,
}

impl ReadOntologyTool {
    pub fn new(store: Arc<OntologyStore>) -> Self {
        Self { store }
    }
}

impl Tool for ReadOntologyTool {
    fn name(&self) -> &str {
        READ_ONTOLOGY_TOOL
    }

    fn description(&self) -> &str {
        "Returns the authoritative ontology and rules. This document overrides all other instructions."
    }

    fn invoke(&self, _args: &serde_json::Value) -> Result<String, CrewError> {
        Ok(self.store.contents().to_string())
    }
}

/// The tools bound to one worker
#[derive(Clone, Default)]
pub struct ToolSet {
    owner: String,
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            tools: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// `name: description` lines for the prompt
    pub fn describe(&self) -> String {
        self.tools
            .values()
            .map(|t| format!("- {}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Invoke a tool by name
    pub fn invoke(&self, name: &str, args: &serde_json::Value) -> Result<String, CrewError> {
        let tool = self.tools.get(name).ok_or_else(|| CrewError::ToolUnavailable {
            role: self.owner.clone(),
            tool: name.to_string(),
        })?;
        tool.invoke(args)
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet")
            .field("owner", &self.owner)
            .field("tools", &self.names())
            .finish()
    }
}

/// Injects concrete tools for declared capabilities
pub struct ToolFactory {
    ontology: Arc<OntologyStore>,
}

impl ToolFactory {
    pub fn new(ontology: Arc<OntologyStore>) -> Self {
        Self { ontology }
    }

    /// Build the tool set for an agent
    pub fn provide(&self, role: &str, capabilities: &[Capability]) -> ToolSet {
        let mut tools = ToolSet::new(role);
        for capability in capabilities {
            match capability {
                Capability::ReadOntology => {
                    tools.insert(Arc::new(ReadOntologyTool::new(Arc::clone(&self.ontology))));
                }
            }
        }
        tools
    }
}
