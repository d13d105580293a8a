//! Artifacts produced by crew tasks.
//!
//! Each task writes exactly one artifact per run. The next task reads it as input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::hash_content;

/// An artifact produced by a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Name of the task that produced this artifact
    pub task_name: String,

    /// Declared output file name (e.g. `aligned_ontology.json`)
    pub file_name: String,

    /// Normalized JSON content
    pub content: String,

    /// First 16 hex chars of the content's SHA256
    pub content_hash: String,

    /// When the artifact was created
    pub created_at: DateTime<Utc>,

    /// Size in bytes (for tracking)
    pub size_bytes: u64,
}

impl Artifact {
    /// Create a new artifact
    pub fn new(task_name: String, file_name: String, content: String) -> Self {
        let size_bytes = content.len() as u64;
        let content_hash = hash_content(&content);
        Self {
            task_name,
            file_name,
            content,
            content_hash,
            created_at: Utc::now(),
            size_bytes,
        }
    }

    /// Parse the content back into JSON
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_creation() {
        let artifact = Artifact::new(
            "Ontology_Alignment".to_string(),
            "aligned_ontology.json".to_string(),
            "{\"classes\": []}\n".to_string(),
        );

        assert_eq!(artifact.task_name, "Ontology_Alignment");
        assert_eq!(artifact.size_bytes, 16);
        assert_eq!(artifact.content_hash.len(), 16);
        assert!(artifact.json().unwrap()["classes"].is_array());
    }
}
