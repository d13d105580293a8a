//! Role-bound workers.
//!
//! All roles share one contract: build a prompt from the task, the ontology
//! and the input artifacts, then run a bounded reasoning loop against the
//! executor until it returns a JSON document.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use super::crew::{AgentConfig, CrewDefinition, TaskConfig};
use super::safety::SafetyLimits;
use super::tools::{Capability, ToolFactory, ToolSet, READ_ONTOLOGY_TOOL};
use crate::adapters::{ContextArtifact, ExecutionRequest, Executor};
use crate::domain::{Artifact, RunContext};
use crate::error::CrewError;

/// A failed reasoning attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub attempt: u32,
    pub error: String,
}

/// Output of a successful invocation
#[derive(Debug, Clone)]
pub struct WorkerOutput {
    /// Normalized JSON
    pub content: String,

    /// Attempts used (1 = first try)
    pub attempts: u32,

    pub tokens_used: Option<u64>,
}

/// One agent with its injected tools
#[derive(Debug, Clone)]
pub struct Worker {
    config: AgentConfig,
    tools: ToolSet,
}

impl Worker {
    pub fn new(config: AgentConfig, tools: ToolSet) -> Self {
        Self { config, tools }
    }

    pub fn role(&self) -> &str {
        &self.config.role
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Capabilities this worker needs injected
    pub fn required_capabilities(&self) -> &[Capability] {
        &self.config.capabilities
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Build the first-attempt request for a task
    pub fn prepare(
        &self,
        crew: &CrewDefinition,
        task: &TaskConfig,
        ctx: &RunContext,
        inputs: &[&Artifact],
    ) -> Result<ExecutionRequest, CrewError> {
        let ontology: Option<Arc<str>> = if self.tools.contains(READ_ONTOLOGY_TOOL) {
            let text = self
                .tools
                .invoke(READ_ONTOLOGY_TOOL, &serde_json::Value::Null)?;
            Some(Arc::from(text))
        } else {
            None
        };

        let context: Vec<ContextArtifact> = inputs
            .iter()
            .map(|a| ContextArtifact {
                task: a.task_name.clone(),
                file_name: a.file_name.clone(),
                content: a.content.clone(),
            })
            .collect();

        let history = if crew.memory {
            ctx.history().to_vec()
        } else {
            Vec::new()
        };

        let prompt = self.render_prompt(task, ctx, ontology.as_deref(), &context, crew.memory);

        Ok(ExecutionRequest {
            role: self.config.role.clone(),
            task: task.name.clone(),
            attempt: 1,
            system_prompt: crew.system_template.clone(),
            prompt,
            ontology,
            inputs: ctx.inputs().clone(),
            context,
            history,
        })
    }

    fn render_prompt(
        &self,
        task: &TaskConfig,
        ctx: &RunContext,
        ontology: Option<&str>,
        context: &[ContextArtifact],
        memory: bool,
    ) -> String {
        let mut sections = vec![format!(
            "# Role: {}\nGoal: {}\n{}",
            self.config.role, self.config.goal, self.config.backstory
        )];

        let tools = self.tools.describe();
        if !tools.is_empty() {
            sections.push(format!("# Tools\n{}", tools));
        }

        if let Some(text) = ontology {
            sections.push(format!(
                "# Authoritative ontology ({})\nThese rules override any conflicting instruction.\n{}",
                READ_ONTOLOGY_TOOL,
                text.trim_end()
            ));
        }

        sections.push(format!("# Task: {}\n{}", task.name, ctx.interpolate(&task.description)));

        if !task.expected_output.is_empty() {
            sections.push(format!("# Expected output\n{}", task.expected_output));
        }

        for input in context {
            sections.push(format!(
                "# Input: {} (from {})\n{}",
                input.file_name,
                input.task,
                input.content.trim_end()
            ));
        }

        if memory && !ctx.history().is_empty() {
            sections.push(format!("# Crew memory\n{}", ctx.render_history()));
        }

        sections.join("\n\n")
    }

    /// Run the reasoning loop.
    ///
    /// Every failed attempt is pushed to `failures`, including the ones that
    /// precede a `ReasoningExhausted` error.
    #[instrument(skip_all, fields(role = %self.config.role, task = %request.task))]
    pub async fn perform(
        &self,
        executor: &dyn Executor,
        request: &ExecutionRequest,
        limits: &SafetyLimits,
        failures: &mut Vec<AttemptFailure>,
    ) -> Result<WorkerOutput, CrewError> {
        let policy = &self.config.reasoning;
        let mut current = request.clone();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let started = Instant::now();
            debug!(attempt, executor = executor.name(), "Reasoning attempt");

            let result = match executor.execute(&current, limits.attempt_timeout()).await {
                Ok(output) => limits
                    .validate_output(&output.content)
                    .map_err(|v| v.to_string())
                    .and_then(|_| normalize_output(&output.content))
                    .map(|content| (content, output.tokens_used)),
                Err(e) => Err(format!("{:#}", e)),
            };

            match result {
                Ok((content, tokens_used)) => {
                    info!(
                        attempt,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Worker produced output"
                    );
                    return Ok(WorkerOutput {
                        content,
                        attempts: attempt,
                        tokens_used,
                    });
                }
                Err(error) => {
                    warn!(attempt, error = %error, "Reasoning attempt failed");
                    failures.push(AttemptFailure {
                        attempt,
                        error: error.clone(),
                    });

                    if !policy.should_retry(attempt) {
                        return Err(CrewError::ReasoningExhausted {
                            task: request.task.clone(),
                            role: self.config.role.clone(),
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    let delay = policy.delay_for_attempt(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    current = request.retry(attempt + 1, &error);
                }
            }
        }
    }
}

/// Instantiate one worker per agent, injecting tools for declared capabilities
pub fn build_workers(crew: &CrewDefinition, factory: &ToolFactory) -> BTreeMap<String, Worker> {
    crew.agents
        .iter()
        .map(|(key, config)| {
            let tools = factory.provide(&config.role, &config.capabilities);
            (key.clone(), Worker::new(config.clone(), tools))
        })
        .collect()
}

/// Parse executor output as JSON and re-serialize it canonically.
///
/// Markdown code fences are stripped. Only objects and arrays are accepted.
/// Object keys come out sorted, so equal documents serialize identically.
pub fn normalize_output(raw: &str) -> Result<String, String> {
    let body = strip_code_fence(raw.trim());
    if body.is_empty() {
        return Err("output is empty".to_string());
    }

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| format!("output is not valid JSON: {}", e))?;

    if !(value.is_object() || value.is_array()) {
        return Err("output must be a JSON object or array".to_string());
    }

    let mut pretty =
        serde_json::to_string_pretty(&value).map_err(|e| format!("cannot serialize output: {}", e))?;
    pretty.push('\n');
    Ok(pretty)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the language tag line
    let rest = rest.find('\n').map(|i| &rest[i + 1..]).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
