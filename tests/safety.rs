//! Safety Limits Integration Tests
//!
//! Tests for size limits, denylist patterns and ontology loading guards.

use std::path::Path;

use kgcrew::core::{CrewDefinition, OntologyStore, SafetyLimits, SafetyViolation};
use kgcrew::error::{CrewError, FailureKind};
use tempfile::TempDir;

#[test]
fn test_max_ontology_bytes() {
    let limits = SafetyLimits {
        max_ontology_bytes: 100,
        ..Default::default()
    };

    assert!(limits.validate_ontology(&"x".repeat(50)).is_ok());
    assert!(limits.validate_ontology(&"x".repeat(100)).is_ok());

    match limits.validate_ontology(&"x".repeat(200)) {
        Err(SafetyViolation::MaxOntologyBytes { actual, limit }) => {
            assert_eq!(actual, 200);
            assert_eq!(limit, 100);
        }
        other => panic!("Expected MaxOntologyBytes violation, got {:?}", other),
    }
}

#[test]
fn test_max_output_bytes() {
    let limits = SafetyLimits {
        max_output_bytes: 100,
        ..Default::default()
    };

    assert!(limits.validate_output(&"y".repeat(50)).is_ok());

    match limits.validate_output(&"y".repeat(200)) {
        Err(SafetyViolation::MaxOutputBytes { actual, limit }) => {
            assert_eq!(actual, 200);
            assert_eq!(limit, 100);
        }
        other => panic!("Expected MaxOutputBytes violation, got {:?}", other),
    }
}

#[test]
fn test_denylist_blocks_secret_files() {
    let limits = SafetyLimits::default();

    assert!(limits.is_denylisted(".env"));
    assert!(limits.is_denylisted("config/.env.production"));
    assert!(limits.is_denylisted("secrets.yaml"));
    assert!(limits.is_denylisted("user_credentials.txt"));
    assert!(limits.is_denylisted("certs/ca.pem"));
    assert!(limits.is_denylisted("ssl/domain.key"));
}

#[test]
fn test_denylist_allows_ontology_files() {
    let limits = SafetyLimits::default();

    assert!(!limits.is_denylisted("knowledge/rules_for_ontology.txt"));
    assert!(!limits.is_denylisted("ontology.ttl"));
    assert!(!limits.is_denylisted("README.md"));

    assert!(limits
        .validate_ontology_path(Path::new("knowledge/rules_for_ontology.txt"))
        .is_ok());
}

#[test]
fn test_denylisted_ontology_path_rejected() {
    let limits = SafetyLimits::default();

    match limits.validate_ontology_path(Path::new(".env.local")) {
        Err(SafetyViolation::DenylistMatch { path }) => assert!(path.contains(".env.local")),
        other => panic!("Expected DenylistMatch violation, got {:?}", other),
    }
}

#[test]
fn test_custom_denylist_patterns() {
    let limits = SafetyLimits {
        denylist_patterns: vec!["**/*.secret".to_string(), "**/private/*".to_string()],
        ..Default::default()
    };

    assert!(limits.is_denylisted("config.secret"));
    assert!(limits.is_denylisted("data/file.secret"));

    // Default patterns are replaced, not extended
    assert!(!limits.is_denylisted(".env"));
}

#[tokio::test]
async fn test_missing_ontology_is_not_found() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("rules_for_ontology.txt");

    let err = OntologyStore::load(&path, &SafetyLimits::default())
        .await
        .unwrap_err();

    assert!(matches!(err, CrewError::NotFound { ref path } if path.ends_with("rules_for_ontology.txt")));
    assert_eq!(err.kind(), FailureKind::NotFound);
}

#[tokio::test]
async fn test_oversized_ontology_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("rules.txt");
    std::fs::write(&path, "Person isA Entity.\n".repeat(20)).unwrap();

    let limits = SafetyLimits {
        max_ontology_bytes: 64,
        ..Default::default()
    };
    let err = OntologyStore::load(&path, &limits).await.unwrap_err();

    assert_eq!(err.kind(), FailureKind::SafetyViolation);
}

#[tokio::test]
async fn test_empty_ontology_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("rules.txt");
    std::fs::write(&path, "\n  \n").unwrap();

    let err = OntologyStore::load(&path, &SafetyLimits::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::InvalidConfig);
}

#[test]
fn test_safety_limits_yaml_parsing() {
    let yaml = r#"
name: safety_test
safety_limits:
  max_ontology_bytes: 2048
  max_output_bytes: 4096
  attempt_timeout_seconds: 30
  denylist_patterns:
    - "**/*.password"
agents:
  SchemaMapper:
    goal: Align concepts
    backstory: Ontology engineer
tasks:
  - name: Ontology_Alignment
    agent: SchemaMapper
    description: Align the ontology
    output_file: aligned_ontology.json
"#;

    let crew = CrewDefinition::from_yaml(yaml).unwrap();

    assert_eq!(crew.safety_limits.max_ontology_bytes, 2048);
    assert_eq!(crew.safety_limits.max_output_bytes, 4096);
    assert_eq!(crew.safety_limits.attempt_timeout_seconds, 30);
    assert!(crew.safety_limits.is_denylisted("db.password"));
    assert!(!crew.safety_limits.is_denylisted(".env"));
}
