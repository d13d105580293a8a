//! Safety limits for crew execution.
//!
//! Guards the run against:
//! - Oversized ontology documents and worker outputs
//! - Reading the ontology from secret-looking paths
//! - Hung executor calls (per-attempt timeout)

use std::path::Path;
use std::time::Duration;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Safety limits for a crew run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Maximum ontology document size in bytes (default: 1MB)
    #[serde(default = "default_max_ontology_bytes")]
    pub max_ontology_bytes: u64,

    /// Maximum size of one worker output in bytes (default: 10MB)
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: u64,

    /// Timeout for a single reasoning attempt in seconds (default: 300 = 5 min)
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_seconds: u64,

    /// Glob patterns the ontology path must not match
    #[serde(default = "default_denylist")]
    pub denylist_patterns: Vec<String>,
}

fn default_max_ontology_bytes() -> u64 {
    1024 * 1024
}
fn default_max_output_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_attempt_timeout() -> u64 {
    300
}

fn default_denylist() -> Vec<String> {
    vec![
        "**/.env*".to_string(),
        "**/secrets*".to_string(),
        "**/*credential*".to_string(),
        "**/*.pem".to_string(),
        "**/*.key".to_string(),
    ]
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_ontology_bytes: default_max_ontology_bytes(),
            max_output_bytes: default_max_output_bytes(),
            attempt_timeout_seconds: default_attempt_timeout(),
            denylist_patterns: default_denylist(),
        }
    }
}

impl SafetyLimits {
    /// Check if a path matches any denylist pattern
    pub fn is_denylisted(&self, path: &str) -> bool {
        self.denylist_patterns
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .any(|pattern| pattern.matches(path))
    }

    /// Validate the ontology path against the denylist
    pub fn validate_ontology_path(&self, path: &Path) -> Result<(), SafetyViolation> {
        let path_str = path.to_string_lossy();
        // Relative paths are matched as if rooted so `**/` patterns apply
        let rooted = if path.is_absolute() {
            path_str.to_string()
        } else {
            format!("./{}", path_str)
        };
        if self.is_denylisted(&path_str) || self.is_denylisted(&rooted) {
            return Err(SafetyViolation::DenylistMatch {
                path: path_str.to_string(),
            });
        }
        Ok(())
    }

    /// Validate ontology size
    pub fn validate_ontology(&self, content: &str) -> Result<(), SafetyViolation> {
        let size = content.len() as u64;
        if size > self.max_ontology_bytes {
            return Err(SafetyViolation::MaxOntologyBytes {
                actual: size,
                limit: self.max_ontology_bytes,
            });
        }
        Ok(())
    }

    /// Validate worker output against size limits
    pub fn validate_output(&self, output: &str) -> Result<(), SafetyViolation> {
        let size = output.len() as u64;
        if size > self.max_output_bytes {
            return Err(SafetyViolation::MaxOutputBytes {
                actual: size,
                limit: self.max_output_bytes,
            });
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_seconds)
    }
}

/// Safety violation errors
#[derive(Debug, Clone, Error)]
pub enum SafetyViolation {
    #[error("Ontology exceeds maximum size: {actual} > {limit} bytes")]
    MaxOntologyBytes { actual: u64, limit: u64 },

    #[error("Maximum output bytes exceeded: {actual} > {limit}")]
    MaxOutputBytes { actual: u64, limit: u64 },

    #[error("Path matches denylist pattern: {path}")]
    DenylistMatch { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = SafetyLimits::default();
        assert_eq!(limits.max_ontology_bytes, 1024 * 1024);
        assert_eq!(limits.max_output_bytes, 10 * 1024 * 1024);
        assert_eq!(limits.attempt_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_denylist_matching() {
        let limits = SafetyLimits::default();

        assert!(limits.is_denylisted(".env"));
        assert!(limits.is_denylisted(".env.local"));
        assert!(limits.is_denylisted("config/secrets.json"));
        assert!(limits.is_denylisted("keys/server.key"));

        assert!(!limits.is_denylisted("knowledge/rules_for_ontology.txt"));
    }

    #[test]
    fn test_ontology_path_validation() {
        let limits = SafetyLimits::default();

        assert!(limits
            .validate_ontology_path(Path::new("knowledge/rules_for_ontology.txt"))
            .is_ok());
        assert!(matches!(
            limits.validate_ontology_path(Path::new("certs/server.pem")),
            Err(SafetyViolation::DenylistMatch { .. })
        ));
    }

    #[test]
    fn test_output_validation() {
        let limits = SafetyLimits {
            max_output_bytes: 10,
            ..Default::default()
        };

        assert!(limits.validate_output("{}").is_ok());
        assert!(matches!(
            limits.validate_output(&"x".repeat(20)),
            Err(SafetyViolation::MaxOutputBytes { .. })
        ));
    }
}
