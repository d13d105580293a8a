//! Timeout and Retry Integration Tests
//!
//! Tests for per-attempt timeouts and the reasoning retry policy.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use kgcrew::adapters::{CommandExecutor, ExecutionRequest, Executor};
use kgcrew::core::{CrewDefinition, RetryPolicy};

fn request() -> ExecutionRequest {
    request_with_prompt("{}")
}

fn request_with_prompt(prompt: &str) -> ExecutionRequest {
    ExecutionRequest {
        role: "SchemaMapper".to_string(),
        task: "Ontology_Alignment".to_string(),
        attempt: 1,
        system_prompt: String::new(),
        prompt: prompt.to_string(),
        ontology: None,
        inputs: BTreeMap::new(),
        context: Vec::new(),
        history: Vec::new(),
    }
}

#[test]
fn test_attempt_timeout_configuration() {
    let yaml = r#"
name: timeout_test
safety_limits:
  attempt_timeout_seconds: 5
agents:
  SchemaMapper:
    goal: Align concepts
tasks:
  - name: Ontology_Alignment
    agent: SchemaMapper
    description: Align the ontology
    output_file: aligned_ontology.json
"#;

    let crew = CrewDefinition::from_yaml(yaml).unwrap();
    assert_eq!(crew.safety_limits.attempt_timeout(), Duration::from_secs(5));
}

#[test]
fn test_reasoning_bound_from_yaml() {
    let yaml = r#"
name: retry_test
agents:
  SchemaMapper:
    goal: Align concepts
    max_reasoning_attempts: 5
    initial_delay_ms: 100
tasks:
  - name: Ontology_Alignment
    agent: SchemaMapper
    description: Align the ontology
    output_file: aligned_ontology.json
"#;

    let crew = CrewDefinition::from_yaml(yaml).unwrap();
    let policy = &crew.agents["SchemaMapper"].reasoning;

    assert_eq!(policy.max_attempts, 5);
    assert!(policy.should_retry(4));
    assert!(!policy.should_retry(5));
    assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
}

#[test]
fn test_default_reasoning_bound_is_three() {
    let policy = RetryPolicy::default();

    assert_eq!(policy.max_attempts, 3);
    assert!(policy.should_retry(1));
    assert!(policy.should_retry(2));
    assert!(!policy.should_retry(3));
}

#[test]
fn test_backoff_is_capped() {
    let policy = RetryPolicy {
        max_attempts: 10,
        initial_delay_ms: 1000,
        max_delay_ms: 5000,
        backoff_multiplier: 2.0,
    };

    assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
    assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
    assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
    assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(5000));
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_executor_times_out() {
    let executor = CommandExecutor::new("sleep", vec!["5".to_string()]);

    let start = Instant::now();
    let result = executor.execute(&request(), Duration::from_millis(200)).await;

    assert!(result.is_err());
    assert!(format!("{:#}", result.unwrap_err()).contains("timed out"));
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[cfg(unix)]
#[tokio::test]
async fn test_timeout_covers_unread_stdin() {
    // Larger than any pipe buffer; `sleep` never reads it
    let prompt = "x".repeat(1024 * 1024);
    let executor = CommandExecutor::new("sleep", vec!["5".to_string()]);

    let start = Instant::now();
    let result = executor
        .execute(&request_with_prompt(&prompt), Duration::from_millis(200))
        .await;

    assert!(format!("{:#}", result.unwrap_err()).contains("timed out"));
    assert!(start.elapsed() < Duration::from_secs(4));
}
