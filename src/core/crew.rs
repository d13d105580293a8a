//! Crew definitions and loading.
//!
//! A crew is a table of agents (role -> instructions, retry bound,
//! capabilities) and an ordered list of tasks (task -> agent, output file).
//! The built-in knowledge-graph crew is enumerated in code; a crew directory
//! with `agents.yaml` and `tasks.yaml` (plus an optional `crew.yaml`)
//! replaces it.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::safety::SafetyLimits;
use super::tools::Capability;
use crate::error::CrewError;

/// Default system template shared by every worker
pub const SYSTEM_TEMPLATE: &str = "You are an expert knowledge graph construction agent. \
You build and refine knowledge graphs from the data and instructions you are given, \
using the tools available to you to read files and extract information. \
Always follow the authoritative ontology and rules returned by the read_master_ontology tool. \
Where a task instruction conflicts with the ontology, the ontology wins. \
Respond with a single JSON document and nothing else.";

/// A complete crew definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewDefinition {
    /// Crew name (recorded on each run)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// How tasks are scheduled
    #[serde(default)]
    pub process: Process,

    /// Include earlier outputs in later prompts
    #[serde(default = "default_memory")]
    pub memory: bool,

    /// Log at debug level while running
    #[serde(default)]
    pub verbose: bool,

    /// System template prepended to every prompt
    #[serde(default = "default_system_template")]
    pub system_template: String,

    /// Safety limits for this crew
    #[serde(default)]
    pub safety_limits: SafetyLimits,

    /// Agents keyed by role name
    pub agents: BTreeMap<String, AgentConfig>,

    /// Tasks in execution order
    pub tasks: Vec<TaskConfig>,
}

fn default_memory() -> bool {
    true
}

fn default_system_template() -> String {
    SYSTEM_TEMPLATE.to_string()
}

/// Crew-level settings read from an optional `crew.yaml`
#[derive(Debug, Clone, Deserialize)]
struct CrewSettings {
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    process: Process,
    #[serde(default = "default_memory")]
    memory: bool,
    #[serde(default)]
    verbose: bool,
    #[serde(default = "default_system_template")]
    system_template: String,
    #[serde(default)]
    safety_limits: SafetyLimits,
}

/// Task fields as written in `tasks.yaml` (the name is the mapping key)
#[derive(Debug, Clone, Deserialize)]
struct TaskEntry {
    agent: String,
    description: String,
    #[serde(default)]
    expected_output: String,
    output_file: String,
    #[serde(default)]
    context: Option<Vec<String>>,
}

impl CrewDefinition {
    /// The built-in knowledge-graph crew
    pub fn knowledge_graph() -> Self {
        let agents = [
            AgentConfig::new(
                "SchemaMapper",
                "Align the concepts found in the source material with the classes and properties of the authoritative ontology.",
                "You are an ontology engineer. You map every concept to exactly one ontology class, \
                 record its parent class, and never invent classes the ontology does not define.",
            ),
            AgentConfig::new(
                "EvidenceExtractor",
                "Extract attributes of each aligned class from the source material, with the evidence that supports them.",
                "You are a meticulous analyst. Every attribute you report is backed by a verbatim \
                 quote from the source and is attached to a class from the aligned ontology.",
            ),
            AgentConfig::new(
                "GraphLinker",
                "Establish typed relationships between the extracted entities using only relation types the ontology allows.",
                "You are a graph modeller. You connect entities with directed, typed edges and keep \
                 the evidence for each edge.",
            ),
            AgentConfig::new(
                "VerificationCritic",
                "Validate the extracted attributes and relationships against the ontology and reject anything unsupported.",
                "You are a strict reviewer. You accept a statement only if it conforms to the ontology \
                 and is supported by evidence, and you explain every rejection.",
            ),
        ]
        .into_iter()
        .map(|a| (a.role.clone(), a))
        .collect();

        let tasks = vec![
            TaskConfig::new(
                "Ontology_Alignment",
                "SchemaMapper",
                "Read the master ontology and align it with the source material:\n{source_text}\n\
                 List every class with its parent and identify the top-level classes.",
                "JSON object with `classes` (name, parent), `top_level_classes` and `relations`.",
                "aligned_ontology.json",
            ),
            TaskConfig::new(
                "Attribute_Extraction",
                "EvidenceExtractor",
                "Using the aligned ontology, extract the attributes of each class mentioned in the \
                 source material:\n{source_text}",
                "JSON object with `attributes` (class, attribute, value, evidence).",
                "extracted_attributes.json",
            ),
            TaskConfig::new(
                "Relationship_Establishment",
                "GraphLinker",
                "Link the extracted entities with relationships permitted by the ontology.",
                "JSON object with `relationships` (subject, predicate, object, evidence).",
                "established_relationships.json",
            ),
            TaskConfig::new(
                "Quality_Validation",
                "VerificationCritic",
                "Validate the established relationships and extracted attributes against the ontology.",
                "JSON object with `validated`, `rejected` and `summary`.",
                "validated_attributes.json",
            ),
        ];

        Self {
            name: "knowledge_graph".to_string(),
            description: "Builds a validated knowledge graph fragment from source documents".to_string(),
            process: Process::Sequential,
            memory: true,
            verbose: true,
            system_template: default_system_template(),
            safety_limits: SafetyLimits::default(),
            agents,
            tasks,
        }
    }

    /// Load a crew from a single YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read crew file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse a crew from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut crew: Self = serde_yaml::from_str(content).context("Failed to parse crew YAML")?;
        crew.fill_role_defaults();
        Ok(crew)
    }

    /// Give every agent without a role its table key
    fn fill_role_defaults(&mut self) {
        for (key, agent) in self.agents.iter_mut() {
            if agent.role.trim().is_empty() {
                agent.role = key.clone();
            }
        }
    }

    /// Load a crew from a directory holding `agents.yaml`, `tasks.yaml` and
    /// optionally `crew.yaml`
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let agents_path = dir.join("agents.yaml");
        let agents_yaml = std::fs::read_to_string(&agents_path)
            .with_context(|| format!("Failed to read agents file: {}", agents_path.display()))?;

        let tasks_path = dir.join("tasks.yaml");
        let tasks_yaml = std::fs::read_to_string(&tasks_path)
            .with_context(|| format!("Failed to read tasks file: {}", tasks_path.display()))?;

        let crew_path = dir.join("crew.yaml");
        let settings_yaml = if crew_path.exists() {
            Some(
                std::fs::read_to_string(&crew_path)
                    .with_context(|| format!("Failed to read crew file: {}", crew_path.display()))?,
            )
        } else {
            None
        };

        let fallback_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "crew".to_string());

        Self::from_tables(&agents_yaml, &tasks_yaml, settings_yaml.as_deref(), &fallback_name)
    }

    /// Assemble a crew from the two YAML tables
    pub fn from_tables(
        agents_yaml: &str,
        tasks_yaml: &str,
        settings_yaml: Option<&str>,
        fallback_name: &str,
    ) -> Result<Self> {
        let agents: BTreeMap<String, AgentConfig> =
            serde_yaml::from_str(agents_yaml).context("Failed to parse agents YAML")?;

        // Mapping keeps document order, which is the execution order
        let raw_tasks: serde_yaml::Mapping =
            serde_yaml::from_str(tasks_yaml).context("Failed to parse tasks YAML")?;
        let mut tasks = Vec::with_capacity(raw_tasks.len());
        for (key, value) in raw_tasks {
            let name = key
                .as_str()
                .map(str::to_string)
                .context("Task names in tasks YAML must be strings")?;
            let entry: TaskEntry = serde_yaml::from_value(value)
                .with_context(|| format!("Failed to parse task '{}'", name))?;
            tasks.push(TaskConfig {
                name,
                agent: entry.agent,
                description: entry.description,
                expected_output: entry.expected_output,
                output_file: entry.output_file,
                context: entry.context,
            });
        }

        let settings: Option<CrewSettings> = settings_yaml
            .map(|s| serde_yaml::from_str(s).context("Failed to parse crew settings YAML"))
            .transpose()?;

        let mut crew = match settings {
            Some(s) => Self {
                name: s.name.unwrap_or_else(|| fallback_name.to_string()),
                description: s.description,
                process: s.process,
                memory: s.memory,
                verbose: s.verbose,
                system_template: s.system_template,
                safety_limits: s.safety_limits,
                agents,
                tasks,
            },
            None => Self {
                name: fallback_name.to_string(),
                description: String::new(),
                process: Process::Sequential,
                memory: default_memory(),
                verbose: false,
                system_template: default_system_template(),
                safety_limits: SafetyLimits::default(),
                agents,
                tasks,
            },
        };
        crew.fill_role_defaults();

        Ok(crew)
    }

    /// Validate the crew definition before any run starts
    pub fn validate(&self) -> Result<(), CrewError> {
        let invalid = |msg: String| -> Result<(), CrewError> { Err(CrewError::InvalidConfig(msg)) };

        if self.name.trim().is_empty() {
            return invalid("Crew name cannot be empty".to_string());
        }

        if self.process != Process::Sequential {
            return Err(CrewError::UnsupportedProcess(self.process));
        }

        if self.system_template.trim().is_empty() {
            return invalid("System template cannot be empty".to_string());
        }

        if self.agents.is_empty() {
            return invalid("Crew must define at least one agent".to_string());
        }

        if self.tasks.is_empty() {
            return invalid("Crew must have at least one task".to_string());
        }

        for (key, agent) in &self.agents {
            if agent.role.trim().is_empty() {
                return invalid(format!("Agent '{}' has an empty role", key));
            }
            if agent.reasoning.max_attempts == 0 {
                return invalid(format!(
                    "Agent '{}' must allow at least one reasoning attempt",
                    key
                ));
            }
        }

        let mut task_names = HashSet::new();
        let mut output_files = HashSet::new();

        for (i, task) in self.tasks.iter().enumerate() {
            if task.name.trim().is_empty() {
                return invalid(format!("Task {} has an empty name", i));
            }
            if !task_names.insert(task.name.as_str()) {
                return invalid(format!("Duplicate task name '{}'", task.name));
            }
            if task.description.trim().is_empty() {
                return invalid(format!("Task '{}' has an empty description", task.name));
            }
            if !self.agents.contains_key(&task.agent) {
                return invalid(format!(
                    "Task '{}' is bound to unknown agent '{}'",
                    task.name, task.agent
                ));
            }
            if !is_plain_file_name(&task.output_file) {
                return invalid(format!(
                    "Task '{}' output file '{}' must be a plain file name",
                    task.name, task.output_file
                ));
            }
            if !output_files.insert(task.output_file.as_str()) {
                return invalid(format!(
                    "Output file '{}' is declared by more than one task",
                    task.output_file
                ));
            }

            // Context may only reference earlier tasks
            for dep in task.context.iter().flatten() {
                match self.task_index(dep) {
                    Some(idx) if idx >= i => {
                        return invalid(format!(
                            "Task '{}' references later task '{}' (forward references not allowed)",
                            task.name, dep
                        ));
                    }
                    None => {
                        return invalid(format!(
                            "Task '{}' references non-existent task '{}'",
                            task.name, dep
                        ));
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    /// Get a task by name
    pub fn get_task(&self, name: &str) -> Option<&TaskConfig> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Get the index of a task by name
    pub fn task_index(&self, name: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.name == name)
    }

    /// Tasks whose artifacts feed the task at `index`.
    ///
    /// Without an explicit `context`, that is the previous task.
    pub fn dependencies(&self, index: usize) -> Vec<&TaskConfig> {
        let Some(task) = self.tasks.get(index) else {
            return Vec::new();
        };

        match &task.context {
            Some(names) => names.iter().filter_map(|n| self.get_task(n)).collect(),
            None if index > 0 => vec![&self.tasks[index - 1]],
            None => Vec::new(),
        }
    }

    /// Roles that no task is bound to
    pub fn unused_agents(&self) -> Vec<&str> {
        self.agents
            .keys()
            .filter(|k| !self.tasks.iter().any(|t| &t.agent == *k))
            .map(String::as_str)
            .collect()
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

/// How the crew schedules its tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Process {
    /// Tasks run one after another in declared order
    #[default]
    Sequential,

    /// A manager agent delegates tasks. Parsed but not executable.
    Hierarchical,
}

/// Configuration of one agent (worker role)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Role name (defaults to the table key)
    #[serde(default)]
    pub role: String,

    /// What the agent is trying to achieve
    pub goal: String,

    /// Role-specific instructions
    #[serde(default)]
    pub backstory: String,

    /// Reasoning retry policy
    #[serde(flatten)]
    pub reasoning: RetryPolicy,

    /// Capabilities the agent requires
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<Capability>,
}

fn default_capabilities() -> Vec<Capability> {
    vec![Capability::ReadOntology]
}

impl AgentConfig {
    pub fn new(role: &str, goal: &str, backstory: &str) -> Self {
        Self {
            role: role.to_string(),
            goal: goal.to_string(),
            backstory: backstory.to_string(),
            reasoning: RetryPolicy::default(),
            capabilities: default_capabilities(),
        }
    }
}

/// A single task in a crew
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task name (unique within crew)
    pub name: String,

    /// Role of the agent that performs it
    pub agent: String,

    /// What to do; `{key}` placeholders are filled from run inputs
    pub description: String,

    /// Shape of the expected output
    #[serde(default)]
    pub expected_output: String,

    /// Artifact file name
    pub output_file: String,

    /// Earlier tasks whose artifacts are passed in (default: previous task)
    #[serde(default)]
    pub context: Option<Vec<String>>,
}

impl TaskConfig {
    pub fn new(
        name: &str,
        agent: &str,
        description: &str,
        expected_output: &str,
        output_file: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            agent: agent.to_string(),
            description: description.to_string(),
            expected_output: expected_output.to_string(),
            output_file: output_file.to_string(),
            context: None,
        }
    }
}

/// Bounded retry policy for a worker's reasoning loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts", alias = "max_reasoning_attempts")]
    pub max_attempts: u32,

    /// Initial delay between attempts in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between attempts in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    0
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Calculate delay after a failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms);
        }

        let delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if another attempt is allowed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
