//! Agent executors.
//!
//! An executor is the black box that turns a worker's prompt into output.
//! Three are provided:
//! - `command`: pipes the prompt to an LLM CLI over stdin
//! - `http`: OpenAI-compatible chat completions endpoint
//! - `heuristic`: deterministic rule-based output, for offline runs and tests

pub mod command;
pub mod heuristic;
pub mod http;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::MemoryEntry;

pub use command::CommandExecutor;
pub use heuristic::HeuristicExecutor;
pub use http::HttpExecutor;

/// An input artifact handed to a worker
#[derive(Debug, Clone)]
pub struct ContextArtifact {
    pub task: String,
    pub file_name: String,
    pub content: String,
}

/// Everything an executor needs for one reasoning attempt
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Worker role
    pub role: String,

    /// Task name
    pub task: String,

    /// Attempt number (1-indexed)
    pub attempt: u32,

    /// System template
    pub system_prompt: String,

    /// Fully rendered user prompt
    pub prompt: String,

    /// Ontology text, when the worker holds the ontology tool
    pub ontology: Option<Arc<str>>,

    /// Run inputs (e.g. `source_text`)
    pub inputs: BTreeMap<String, String>,

    /// Artifacts of the tasks this one depends on
    pub context: Vec<ContextArtifact>,

    /// Earlier outputs of this run (empty when memory is off)
    pub history: Vec<MemoryEntry>,
}

impl ExecutionRequest {
    /// Copy of this request for a retry, with the previous failure fed back
    pub fn retry(&self, attempt: u32, feedback: &str) -> Self {
        let mut next = self.clone();
        next.attempt = attempt;
        next.prompt = format!(
            "{}\n\n# Previous attempt rejected\n{}\nReturn only a valid JSON document.",
            self.prompt, feedback
        );
        next
    }

    /// Input by key, empty if absent
    pub fn input(&self, key: &str) -> &str {
        self.inputs.get(key).map(String::as_str).unwrap_or("")
    }
}

/// Output from an executor
#[derive(Debug, Clone)]
pub struct ExecutorOutput {
    /// Raw content returned by the executor
    pub content: String,

    /// Tokens used (if available)
    pub tokens_used: Option<u64>,
}

impl ExecutorOutput {
    /// Create a new output with just content
    pub fn new(content: String) -> Self {
        Self {
            content,
            tokens_used: None,
        }
    }
}

/// Trait for agent executors
#[async_trait]
pub trait Executor: Send + Sync {
    /// Human-readable executor name
    fn name(&self) -> &str;

    /// Run one reasoning attempt
    async fn execute(&self, request: &ExecutionRequest, timeout: Duration)
        -> Result<ExecutorOutput>;

    /// Check that the backend is reachable
    async fn health_check(&self) -> Result<()>;
}

/// Executor selection, as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutorConfig {
    /// Deterministic rule-based executor
    Heuristic,

    /// Subprocess that reads the prompt on stdin
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },

    /// OpenAI-compatible HTTP API
    Http {
        base_url: String,
        model: String,
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
        #[serde(default)]
        temperature: f32,
    },
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::Heuristic
    }
}

/// Build the executor described by `config`
pub fn build_executor(config: &ExecutorConfig) -> Result<Arc<dyn Executor>> {
    let executor: Arc<dyn Executor> = match config {
        ExecutorConfig::Heuristic => Arc::new(HeuristicExecutor::new()),
        ExecutorConfig::Command { program, args } => {
            Arc::new(CommandExecutor::new(program.clone(), args.clone()))
        }
        ExecutorConfig::Http {
            base_url,
            model,
            api_key_env,
            temperature,
        } => {
            let api_key = std::env::var(api_key_env).ok();
            Arc::new(HttpExecutor::new(base_url.clone(), model.clone(), api_key).with_temperature(*temperature))
        }
    };
    Ok(executor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_config_parsing() {
        let config: ExecutorConfig = serde_yaml::from_str("kind: heuristic").unwrap();
        assert_eq!(config, ExecutorConfig::Heuristic);

        let config: ExecutorConfig =
            serde_yaml::from_str("kind: command\nprogram: ollama\nargs: [run, llama3]").unwrap();
        assert_eq!(
            config,
            ExecutorConfig::Command {
                program: "ollama".to_string(),
                args: vec!["run".to_string(), "llama3".to_string()],
            }
        );

        let config: ExecutorConfig =
            serde_yaml::from_str("kind: http\nbase_url: http://localhost:8080/v1\nmodel: m").unwrap();
        assert!(matches!(
            config,
            ExecutorConfig::Http { ref api_key_env, .. } if api_key_env == "OPENAI_API_KEY"
        ));
    }

    #[test]
    fn test_build_executor_names() {
        assert_eq!(build_executor(&ExecutorConfig::Heuristic).unwrap().name(), "heuristic");
        let command = ExecutorConfig::Command {
            program: "llm".to_string(),
            args: vec![],
        };
        assert_eq!(build_executor(&command).unwrap().name(), "command");
    }

    #[test]
    fn test_retry_request_carries_feedback() {
        let request = ExecutionRequest {
            role: "SchemaMapper".to_string(),
            task: "Ontology_Alignment".to_string(),
            attempt: 1,
            system_prompt: String::new(),
            prompt: "Align.".to_string(),
            ontology: None,
            inputs: BTreeMap::new(),
            context: Vec::new(),
            history: Vec::new(),
        };

        let retry = request.retry(2, "output is not JSON");
        assert_eq!(retry.attempt, 2);
        assert!(retry.prompt.starts_with("Align."));
        assert!(retry.prompt.contains("output is not JSON"));
        assert_eq!(retry.input("source_text"), "");
    }
}
