//! Command-line interface for kgcrew.
//!
//! Provides commands for running a crew, validating a crew definition,
//! checking run status, listing runs and showing the resolved configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use uuid::Uuid;

use crate::adapters::{build_executor, Executor, HeuristicExecutor};
use crate::config::{self, ResolvedConfig};
use crate::core::{CrewDefinition, OntologyStore, Orchestrator};
use crate::domain::RunState;

/// Input key the `--input` file is bound to
pub const SOURCE_TEXT_INPUT: &str = "source_text";

/// kgcrew - Sequential agent crew for knowledge graph construction
#[derive(Parser, Debug)]
#[command(name = "kgcrew")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the crew
    Run {
        #[command(flatten)]
        crew: CrewArgs,

        /// Ontology rules document
        #[arg(long, env = "KGCREW_ONTOLOGY")]
        ontology: Option<PathBuf>,

        /// Directory artifacts are written to
        #[arg(short, long, env = "KGCREW_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Source document, bound to the `source_text` input
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Extra template input (key=value), may be repeated
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Use the offline heuristic executor regardless of configuration
        #[arg(long)]
        heuristic: bool,
    },

    /// Validate the crew definition and ontology without running
    Validate {
        #[command(flatten)]
        crew: CrewArgs,

        /// Ontology rules document
        #[arg(long, env = "KGCREW_ONTOLOGY")]
        ontology: Option<PathBuf>,
    },

    /// Check the status of a run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Where the crew definition comes from
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CrewArgs {
    /// Crew directory (agents.yaml + tasks.yaml) or single crew YAML file
    #[arg(short, long)]
    pub crew: Option<PathBuf>,
}

/// Parse a `key=value` pair
fn parse_var(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

impl Cli {
    /// Default log filter: debug for `--verbose` or a verbose crew
    pub fn log_level(&self) -> &'static str {
        let crew_verbose = match &self.command {
            Commands::Run { crew, .. } => config::config()
                .ok()
                .and_then(|cfg| load_crew(crew, cfg).ok())
                .map_or(false, |c| c.verbose),
            _ => false,
        };

        if self.verbose || crew_verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                crew,
                ontology,
                output_dir,
                input,
                vars,
                heuristic,
            } => {
                run_crew(crew, ontology, output_dir, input, vars, heuristic).await
            }
            Commands::Validate { crew, ontology } => {
                validate_crew(crew, ontology).await
            }
            Commands::Status { run_id } => {
                show_status(&run_id).await
            }
            Commands::Runs { limit } => {
                list_runs(limit).await
            }
            Commands::Config => {
                show_config().await
            }
        }
    }
}

/// Load the crew from `--crew`, the configured crew directory, or the built-in definition
pub fn load_crew(args: &CrewArgs, cfg: &ResolvedConfig) -> Result<CrewDefinition> {
    let mut crew = match args.crew.as_deref().or(cfg.crew_dir.as_deref()) {
        Some(path) if path.is_file() => CrewDefinition::from_file(path)?,
        Some(path) => CrewDefinition::from_dir(path)?,
        None => CrewDefinition::knowledge_graph(),
    };

    if let Some(ref safety) = cfg.safety {
        safety.apply(&mut crew.safety_limits);
    }

    Ok(crew)
}

/// Assemble the run inputs from `--input` and `--var`
fn collect_inputs(input: Option<&Path>, vars: Vec<(String, String)>) -> Result<BTreeMap<String, String>> {
    let mut inputs: BTreeMap<String, String> = vars.into_iter().collect();

    if let Some(path) = input {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?;
        if text.trim().is_empty() {
            anyhow::bail!("Input file is empty: {}", path.display());
        }
        inputs.insert(SOURCE_TEXT_INPUT.to_string(), text);
    }

    Ok(inputs)
}

/// Run the crew and print the final artifact
async fn run_crew(
    crew_args: CrewArgs,
    ontology: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    input: Option<PathBuf>,
    vars: Vec<(String, String)>,
    heuristic: bool,
) -> Result<()> {
    let cfg = config::config()?;
    let crew = load_crew(&crew_args, cfg)?;

    let inputs = collect_inputs(input.as_deref(), vars)?;
    if !inputs.contains_key(SOURCE_TEXT_INPUT) {
        warn!("No --input given; '{}' will be empty", SOURCE_TEXT_INPUT);
    }

    let executor: Arc<dyn Executor> = if heuristic {
        Arc::new(HeuristicExecutor::new())
    } else {
        build_executor(&cfg.executor)?
    };
    if let Err(e) = executor.health_check().await {
        warn!(executor = executor.name(), "Executor health check failed: {:#}", e);
    }

    let orchestrator = Orchestrator::new(
        executor,
        cfg.runs_dir(),
        ontology.unwrap_or_else(|| cfg.ontology.clone()),
        output_dir.unwrap_or_else(|| cfg.output_dir.clone()),
    );
    let run = orchestrator.run_crew(&crew, inputs).await?;

    // Print results
    match &run.state {
        RunState::Completed => {
            if let Some(artifact) = run.final_artifact() {
                println!("{}", artifact.content.trim_end());
            }
            eprintln!();
            for file in &run.written_files {
                eprintln!("  wrote {}", orchestrator.output_dir().join(file).display());
            }
            eprintln!("[Run {} completed successfully]", run.id);
        }
        RunState::Failed { task, kind, error, .. } => {
            let at = task
                .as_deref()
                .map(|t| format!(" at task '{}'", t))
                .unwrap_or_default();
            eprintln!("\n[Run {} failed{} ({:?}): {}]", run.id, at, kind, error);
            std::process::exit(1);
        }
        _ => {
            eprintln!("\n[Run {} in state: {:?}]", run.id, run.state);
        }
    }

    Ok(())
}

/// Validate the crew and check the ontology is readable
async fn validate_crew(crew_args: CrewArgs, ontology: Option<PathBuf>) -> Result<()> {
    let cfg = config::config()?;
    let crew = load_crew(&crew_args, cfg)?;
    crew.validate()?;

    let ontology_path = ontology.unwrap_or_else(|| cfg.ontology.clone());
    let store = OntologyStore::load(&ontology_path, &crew.safety_limits).await?;

    println!("Crew '{}' is valid", crew.name);
    println!("  Process: {:?}", crew.process);
    println!("  Memory:  {}", crew.memory);
    println!(
        "  Ontology: {} ({} bytes, {})",
        store.path().display(),
        store.len(),
        store.content_hash()
    );
    println!("\nTasks:");
    for (idx, task) in crew.tasks.iter().enumerate() {
        println!("  {}. {} [{}] -> {}", idx + 1, task.name, task.agent, task.output_file);
    }

    let unused = crew.unused_agents();
    if !unused.is_empty() {
        println!("\nAgents without tasks: {}", unused.join(", "));
    }

    Ok(())
}

/// Orchestrator for read-only commands
fn status_orchestrator() -> Result<Orchestrator> {
    Orchestrator::from_config(Arc::new(HeuristicExecutor::new()))
}

/// Show the status of a run
async fn show_status(run_id_str: &str) -> Result<()> {
    let run_id = Uuid::parse_str(run_id_str)
        .with_context(|| format!("Invalid run ID: {}", run_id_str))?;

    let orchestrator = status_orchestrator()?;
    let run = orchestrator.get_run_status(run_id).await?;

    println!("Run ID: {}", run.id);
    println!("Crew: {}", run.crew_name);
    println!("State: {}", run.state.label());
    if let RunState::Failed { task, kind, error, .. } = &run.state {
        println!("Failure: {:?} in {}", kind, task.as_deref().unwrap_or("(before first task)"));
        println!("Error: {}", error);
    }
    println!("Started: {}", run.started_at);
    if let Some(completed) = run.completed_at {
        println!("Completed: {}", completed);
    }
    if let Some(ref hash) = run.ontology_hash {
        println!("Ontology: {}", hash);
    }

    println!("\nArtifacts:");
    if run.written_files.is_empty() {
        println!("  (none)");
    }
    for file in &run.written_files {
        println!("  {}", file);
    }

    let mut statuses: Vec<_> = run.task_statuses.iter().collect();
    statuses.sort_by(|a, b| a.0.cmp(b.0));
    println!("\nTask statuses:");
    for (task, status) in statuses {
        println!("  {}: {:?}", task, status);
    }

    Ok(())
}

/// List recent runs
async fn list_runs(limit: usize) -> Result<()> {
    let orchestrator = status_orchestrator()?;
    let runs = orchestrator.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("{:<38} {:<20} {:<12} {:<10}", "RUN ID", "CREW", "STATE", "ARTIFACTS");
    println!("{}", "-".repeat(82));

    for run in runs {
        println!(
            "{:<38} {:<20} {:<12} {:<10}",
            run.id,
            run.crew_name,
            run.state.label(),
            run.written_files.len()
        );
    }

    Ok(())
}

/// Show the resolved configuration (for debugging)
async fn show_config() -> Result<()> {
    let cfg = config::config()?;
    let limits = cfg.safety_limits();

    println!("kgcrew configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:       {}", cfg.home.display());
    println!("  Runs:       {}", cfg.runs_dir().display());
    println!("  Ontology:   {}", cfg.ontology.display());
    println!("  Output dir: {}", cfg.output_dir.display());
    println!(
        "  Crew:       {}",
        cfg.crew_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(built-in knowledge graph crew)".to_string())
    );
    println!();
    println!("Executor: {}", serde_yaml::to_string(&cfg.executor)?.trim_end().replace('\n', ", "));
    println!();
    println!("Safety limits:");
    println!("  Max ontology bytes: {}", limits.max_ontology_bytes);
    println!("  Max output bytes:   {}", limits.max_output_bytes);
    println!("  Attempt timeout:    {}s", limits.attempt_timeout_seconds);
    println!("  Denylist:           {}", limits.denylist_patterns.join(", "));

    Ok(())
}
