//! Crew Configuration Integration Tests
//!
//! Loads the crew, ontology and source document shipped in the repository.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use kgcrew::adapters::HeuristicExecutor;
use kgcrew::core::{CrewDefinition, Orchestrator, Process};
use tempfile::TempDir;

fn repo_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

#[test]
fn test_shipped_crew_matches_builtin() {
    let shipped = CrewDefinition::from_dir(&repo_path("config")).unwrap();
    let builtin = CrewDefinition::knowledge_graph();

    shipped.validate().unwrap();
    assert_eq!(shipped.name, builtin.name);
    assert_eq!(shipped.process, Process::Sequential);
    assert!(shipped.memory);

    let shipped_tasks: Vec<(&str, &str, &str)> = shipped
        .tasks
        .iter()
        .map(|t| (t.name.as_str(), t.agent.as_str(), t.output_file.as_str()))
        .collect();
    let builtin_tasks: Vec<(&str, &str, &str)> = builtin
        .tasks
        .iter()
        .map(|t| (t.name.as_str(), t.agent.as_str(), t.output_file.as_str()))
        .collect();
    assert_eq!(shipped_tasks, builtin_tasks);

    for (key, agent) in &shipped.agents {
        assert_eq!(&agent.role, key);
        assert_eq!(agent.reasoning.max_attempts, 3);
        assert!(!agent.goal.trim().is_empty());
    }
    assert!(shipped.unused_agents().is_empty());
}

#[tokio::test]
async fn test_shipped_example_runs_end_to_end() {
    let temp = TempDir::new().unwrap();
    let crew = CrewDefinition::from_dir(&repo_path("config")).unwrap();
    let source = std::fs::read_to_string(repo_path("demos/source.txt")).unwrap();

    let orchestrator = Orchestrator::new(
        Arc::new(HeuristicExecutor::new()),
        temp.path().join("runs"),
        repo_path("knowledge/rules_for_ontology.txt"),
        temp.path().join("out"),
    );
    let inputs: BTreeMap<String, String> = [("source_text".to_string(), source)].into_iter().collect();

    let run = orchestrator.run_crew(&crew, inputs).await.unwrap();
    assert!(run.is_completed(), "run failed: {:?}", run.state);

    let aligned = run.artifact("Ontology_Alignment").unwrap().json().unwrap();
    assert_eq!(aligned["top_level_classes"], serde_json::json!(["Entity"]));

    let validated = run.final_artifact().unwrap().json().unwrap();
    assert_eq!(validated["summary"]["entities"], 4);
    assert_eq!(validated["summary"]["attributes"], 4);
    assert_eq!(validated["summary"]["relationships"], 3);
    assert_eq!(validated["summary"]["rejected"], 1);
    assert_eq!(validated["rejected"][0]["kind"], "relationship");
}
