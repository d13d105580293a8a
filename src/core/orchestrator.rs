//! Main orchestrator for crew execution.
//!
//! Runs tasks strictly in declared order, persists each artifact before the
//! next task starts, threads the run context through every invocation, and
//! stops at the first failure.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::Executor;
use crate::domain::{
    Artifact, Event, EventType, MemoryEntry, Run, RunContext, RunState, TaskStatus,
};
use crate::error::{CrewError, FailureKind};

use super::artifact_store::ArtifactStore;
use super::crew::{CrewDefinition, TaskConfig};
use super::event_store::EventStore;
use super::ontology::OntologyStore;
use super::tools::ToolFactory;
use super::worker::{build_workers, AttemptFailure, Worker};

/// Main crew orchestrator
pub struct Orchestrator {
    /// Agent executor shared by all workers
    executor: Arc<dyn Executor>,

    /// Directory holding one event log per run
    runs_dir: PathBuf,

    /// Path of the ontology document
    ontology_path: PathBuf,

    /// Directory artifacts are written to
    output_dir: PathBuf,
}

impl Orchestrator {
    /// Create an orchestrator
    pub fn new(
        executor: Arc<dyn Executor>,
        runs_dir: impl Into<PathBuf>,
        ontology_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executor,
            runs_dir: runs_dir.into(),
            ontology_path: ontology_path.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Create an orchestrator from the resolved configuration
    pub fn from_config(executor: Arc<dyn Executor>) -> Result<Self> {
        let config = crate::config::config()?;
        Ok(Self::new(
            executor,
            config.runs_dir(),
            config.ontology.clone(),
            config.output_dir.clone(),
        ))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn ontology_path(&self) -> &Path {
        &self.ontology_path
    }

    /// Execute a crew with the given template inputs.
    ///
    /// Crew failures (missing ontology, exhausted worker, unwritable
    /// artifact) come back as `Ok(run)` in `RunState::Failed`; `Err` is
    /// reserved for event log failures.
    #[instrument(skip(self, crew, inputs), fields(crew = %crew.name))]
    pub async fn run_crew(&self, crew: &CrewDefinition, inputs: BTreeMap<String, String>) -> Result<Run> {
        let run_id = Uuid::new_v4();
        info!(%run_id, executor = self.executor.name(), "Starting crew run");

        let store = EventStore::open_in(&self.runs_dir, run_id).await?;
        let mut run = Run::new(run_id, crew.name.clone());

        let start_event = Event::new(
            run_id,
            EventType::RunStarted,
            format!("Crew '{}' started", crew.name),
            TaskStatus::Running,
        )
        .with_crew(crew.name.clone());
        store.append(&start_event).await?;

        if let Err(e) = crew.validate() {
            return self.handle_run_failure(&store, &mut run, None, e.into()).await;
        }

        // Missing ontology aborts before any task or artifact exists
        let ontology = match OntologyStore::load(&self.ontology_path, &crew.safety_limits).await {
            Ok(ontology) => Arc::new(ontology),
            Err(e) => return self.handle_run_failure(&store, &mut run, None, e.into()).await,
        };
        run.ontology_hash = Some(ontology.content_hash().to_string());

        let loaded_event = Event::new(
            run_id,
            EventType::OntologyLoaded,
            format!(
                "Ontology {} loaded ({} bytes)",
                ontology.path().display(),
                ontology.len()
            ),
            TaskStatus::Running,
        )
        .with_hash(ontology.content_hash());
        store.append(&loaded_event).await?;

        let mut artifacts = match ArtifactStore::open(&self.output_dir) {
            Ok(artifacts) => artifacts,
            Err(e) => return self.handle_run_failure(&store, &mut run, None, e).await,
        };

        let workers = build_workers(crew, &ToolFactory::new(Arc::clone(&ontology)));
        let mut ctx = RunContext::new(inputs);

        for (task_idx, task) in crew.tasks.iter().enumerate() {
            run.state = RunState::Running { task_index: task_idx };

            let result = match workers.get(&task.agent) {
                Some(worker) => {
                    self.execute_task(
                        &store,
                        &mut run,
                        &mut artifacts,
                        &ctx,
                        crew,
                        task_idx,
                        task,
                        worker,
                    )
                    .await
                }
                None => Err(CrewError::InvalidConfig(format!(
                    "Task '{}' is bound to unknown agent '{}'",
                    task.name, task.agent
                ))
                .into()),
            };

            match result {
                Ok(artifact) => {
                    ctx.remember(MemoryEntry {
                        task: task.name.clone(),
                        role: workers
                            .get(&task.agent)
                            .map(|w| w.role().to_string())
                            .unwrap_or_default(),
                        file_name: artifact.file_name.clone(),
                        output: artifact.content.clone(),
                    });
                    run.artifacts.push(artifact);
                }
                Err(e) => {
                    // Outputs of this and later tasks would otherwise mix
                    // with an earlier run's files
                    let stale = artifacts.remove_unwritten(
                        crew.tasks[task_idx..].iter().map(|t| t.output_file.as_str()),
                    );
                    if !stale.is_empty() {
                        warn!(files = ?stale, "Removed artifacts left by an earlier run");
                    }
                    return self
                        .handle_run_failure(&store, &mut run, Some((task_idx, task)), e)
                        .await;
                }
            }
        }

        info!(
            ontology_reads = ontology.reads(),
            artifacts = run.artifacts.len(),
            "All tasks finished"
        );
        self.complete_run(&store, &mut run).await
    }

    /// Run one task: gather inputs, invoke the worker, persist the artifact
    #[allow(clippy::too_many_arguments)]
    async fn execute_task(
        &self,
        store: &EventStore,
        run: &mut Run,
        artifacts: &mut ArtifactStore,
        ctx: &RunContext,
        crew: &CrewDefinition,
        task_idx: usize,
        task: &TaskConfig,
        worker: &Worker,
    ) -> Result<Artifact> {
        let task_start = Instant::now();

        let start_event = Event::new(
            run.id,
            EventType::TaskStarted,
            format!("Task '{}' started by {}", task.name, worker.role()),
            TaskStatus::Running,
        )
        .for_task(task_idx, task.name.clone());
        store.append(&start_event).await?;
        run.task_statuses.insert(task.name.clone(), TaskStatus::Running);

        // Every upstream artifact must already be on disk
        let mut inputs = Vec::new();
        for dep in crew.dependencies(task_idx) {
            let artifact = run
                .artifact(&dep.name)
                .filter(|_| artifacts.contains(&dep.output_file))
                .ok_or_else(|| CrewError::MissingDependency {
                    task: task.name.clone(),
                    dependency: dep.name.clone(),
                })?;
            inputs.push(artifact);
        }

        let request = worker.prepare(crew, task, ctx, &inputs)?;

        let mut failures: Vec<AttemptFailure> = Vec::new();
        let outcome = worker
            .perform(
                self.executor.as_ref(),
                &request,
                &crew.safety_limits,
                &mut failures,
            )
            .await;

        for failure in &failures {
            let retry_event = Event::new(
                run.id,
                EventType::ReasoningRetry,
                format!("Task '{}' attempt {} rejected", task.name, failure.attempt),
                TaskStatus::Running,
            )
            .for_task(task_idx, task.name.clone())
            .with_attempt(failure.attempt)
            .with_error(failure.error.clone());
            store.append(&retry_event).await?;
        }

        let output = outcome?;

        let artifact = Artifact::new(task.name.clone(), task.output_file.clone(), output.content);
        let path = artifacts.write(&artifact)?;

        let written_event = Event::new(
            run.id,
            EventType::ArtifactWritten,
            artifact.file_name.clone(),
            TaskStatus::Running,
        )
        .for_task(task_idx, task.name.clone())
        .with_hash(artifact.content_hash.clone());
        store.append(&written_event).await?;
        run.written_files.push(artifact.file_name.clone());

        let duration_ms = task_start.elapsed().as_millis() as u64;
        let complete_event = Event::new(
            run.id,
            EventType::TaskCompleted,
            format!(
                "Task '{}' completed in {}ms after {} attempt(s)",
                task.name, duration_ms, output.attempts
            ),
            TaskStatus::Completed,
        )
        .for_task(task_idx, task.name.clone())
        .with_attempt(output.attempts)
        .with_duration(duration_ms);
        store.append(&complete_event).await?;
        run.task_statuses.insert(task.name.clone(), TaskStatus::Completed);

        info!(
            task = %task.name,
            path = %path.display(),
            attempts = output.attempts,
            tokens = output.tokens_used,
            duration_ms,
            "Task completed"
        );

        Ok(artifact)
    }

    /// Record a failure and move the run to its terminal state
    async fn handle_run_failure(
        &self,
        store: &EventStore,
        run: &mut Run,
        task: Option<(usize, &TaskConfig)>,
        error: anyhow::Error,
    ) -> Result<Run> {
        let kind = error
            .downcast_ref::<CrewError>()
            .map(CrewError::kind)
            .unwrap_or(FailureKind::Internal);
        let error_msg = format!("{:#}", error);
        error!(?kind, %error_msg, "Run failed");

        let mut event = Event::new(
            run.id,
            EventType::RunFailed,
            format!("Run failed: {}", error_msg),
            TaskStatus::Failed,
        )
        .with_error(error_msg.clone())
        .with_failure(kind);

        if let Some((task_idx, task)) = task {
            run.task_statuses.insert(task.name.clone(), TaskStatus::Failed);
            let task_event = Event::new(
                run.id,
                EventType::TaskFailed,
                format!("Task '{}' failed", task.name),
                TaskStatus::Failed,
            )
            .for_task(task_idx, task.name.clone())
            .with_error(error_msg.clone());
            store.append(&task_event).await?;
            event = event.for_task(task_idx, task.name.clone());
        }

        run.state = RunState::Failed {
            task_index: task.map(|(idx, _)| idx),
            task: task.map(|(_, t)| t.name.clone()),
            kind,
            error: error_msg,
        };
        run.completed_at = Some(chrono::Utc::now());
        store.append(&event).await?;

        Ok(run.clone())
    }

    /// Complete a successful run
    async fn complete_run(&self, store: &EventStore, run: &mut Run) -> Result<Run> {
        info!(run_id = %run.id, "Run completed successfully");

        run.state = RunState::Completed;
        run.completed_at = Some(chrono::Utc::now());

        let event = Event::new(
            run.id,
            EventType::RunCompleted,
            format!("Crew '{}' completed", run.crew_name),
            TaskStatus::Completed,
        );
        store.append(&event).await?;

        Ok(run.clone())
    }

    /// Get status of a run by ID
    pub async fn get_run_status(&self, run_id: Uuid) -> Result<Run> {
        let store = EventStore::find_in(&self.runs_dir, run_id)
            .with_context(|| format!("Run {} not found", run_id))?;
        let events = store.replay().await?;

        if events.is_empty() {
            anyhow::bail!("Run {} not found", run_id);
        }

        Run::from_events(&events).context("Failed to reconstruct run state")
    }

    /// List recent runs
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<Run>> {
        let run_ids = EventStore::list_runs_in(&self.runs_dir).await?;
        let mut runs = Vec::new();

        for run_id in run_ids {
            if let Ok(run) = self.get_run_status(run_id).await {
                runs.push(run);
            }
        }

        // Most recent first
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);

        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::HeuristicExecutor;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_invalid_crew_fails_before_tasks() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            Arc::new(HeuristicExecutor::new()),
            temp.path().join("runs"),
            temp.path().join("rules.txt"),
            temp.path().join("out"),
        );
        let mut crew = CrewDefinition::knowledge_graph();
        crew.tasks.clear();

        let run = orchestrator.run_crew(&crew, BTreeMap::new()).await.unwrap();

        assert!(matches!(
            run.state,
            RunState::Failed {
                task_index: None,
                kind: FailureKind::InvalidConfig,
                ..
            }
        ));
        assert!(!temp.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_status_of_unknown_run() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            Arc::new(HeuristicExecutor::new()),
            temp.path().join("runs"),
            temp.path().join("rules.txt"),
            temp.path().join("out"),
        );

        let run_id = Uuid::new_v4();
        assert!(orchestrator.get_run_status(run_id).await.is_err());
        assert!(!temp.path().join("runs").join(run_id.to_string()).exists());
    }
}
