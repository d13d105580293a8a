//! Subprocess executor.
//!
//! Spawns a configured LLM CLI (e.g. `ollama run llama3`, `llm -m gpt-4o`),
//! pipes the system template and prompt to stdin and collects stdout.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::{ExecutionRequest, Executor, ExecutorOutput};

/// Executor backed by an external command
pub struct CommandExecutor {
    /// Program to run
    program: String,

    /// Arguments passed on every call
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Run the command once with `input` on stdin
    async fn execute_subprocess(&self, input: &str, attempt_timeout: Duration) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn executor command '{}'", self.program))?;

        // Feed stdin while collecting output so a child that stops reading
        // cannot stall the attempt past its timeout
        let stdin = child.stdin.take();
        let prompt = input.as_bytes().to_vec();
        let write_prompt = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&prompt).await?;
                // Drop stdin to signal EOF
            }
            Ok::<(), std::io::Error>(())
        };

        let (written, output) = timeout(attempt_timeout, async {
            tokio::join!(write_prompt, child.wait_with_output())
        })
        .await
        .with_context(|| {
            format!(
                "Executor command '{}' timed out after {:?}",
                self.program, attempt_timeout
            )
        })?;
        let output =
            output.with_context(|| format!("Failed to wait for executor command '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "Executor command '{}' failed with exit code {}: {}",
                self.program,
                exit_code,
                stderr.trim()
            );
        }

        written.context("Failed to write prompt to executor stdin")?;

        String::from_utf8(output.stdout).context("Executor output is not valid UTF-8")
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    fn name(&self) -> &str {
        "command"
    }

    async fn execute(
        &self,
        request: &ExecutionRequest,
        timeout: Duration,
    ) -> Result<ExecutorOutput> {
        let input = format!("{}\n\n{}", request.system_prompt, request.prompt);
        let content = self.execute_subprocess(&input, timeout).await?;
        Ok(ExecutorOutput::new(content))
    }

    async fn health_check(&self) -> Result<()> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("Failed to run '{} --version'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Executor health check failed: {}", stderr.trim());
        }

        Ok(())
    }
}
