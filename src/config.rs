//! Configuration for kgcrew paths, executor and safety limits.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (KGCREW_HOME, KGCREW_ONTOLOGY, KGCREW_OUTPUT_DIR)
//! 2. Config file (.kgcrew/config.yaml)
//! 3. Defaults (~/.kgcrew, knowledge/rules_for_ontology.txt, current directory)
//!
//! Config file discovery:
//! - Searches current directory and parents for .kgcrew/config.yaml
//! - `home` is relative to the .kgcrew/ directory, other paths to the project root

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::ExecutorConfig;
use crate::core::SafetyLimits;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Default ontology location, relative to the project root
pub const DEFAULT_ONTOLOGY: &str = "knowledge/rules_for_ontology.txt";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub safety: Option<SafetyConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .kgcrew/)
    pub home: Option<String>,
    /// Crew directory with agents.yaml and tasks.yaml
    pub crew_dir: Option<String>,
    /// Ontology rules document
    pub ontology: Option<String>,
    /// Artifact output directory
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SafetyConfig {
    pub max_ontology_bytes: Option<u64>,
    pub max_output_bytes: Option<u64>,
    pub attempt_timeout_seconds: Option<u64>,
    pub denylist_patterns: Option<Vec<String>>,
}

impl SafetyConfig {
    /// Overlay these settings on `limits`
    pub fn apply(&self, limits: &mut SafetyLimits) {
        if let Some(v) = self.max_ontology_bytes {
            limits.max_ontology_bytes = v;
        }
        if let Some(v) = self.max_output_bytes {
            limits.max_output_bytes = v;
        }
        if let Some(v) = self.attempt_timeout_seconds {
            limits.attempt_timeout_seconds = v;
        }
        if let Some(ref v) = self.denylist_patterns {
            limits.denylist_patterns = v.clone();
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// kgcrew home (event logs)
    pub home: PathBuf,
    /// Crew directory, when one is configured
    pub crew_dir: Option<PathBuf>,
    /// Ontology document
    pub ontology: PathBuf,
    /// Artifact output directory
    pub output_dir: PathBuf,
    /// Executor selection
    pub executor: ExecutorConfig,
    /// Safety overrides from the config file
    pub safety: Option<SafetyConfig>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Directory holding one event log per run
    pub fn runs_dir(&self) -> PathBuf {
        self.home.join("runs")
    }

    /// Default safety limits with the config file overrides applied
    pub fn safety_limits(&self) -> SafetyLimits {
        let mut limits = SafetyLimits::default();
        if let Some(ref safety) = self.safety {
            safety.apply(&mut limits);
        }
        limits
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".kgcrew").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".kgcrew");

    match find_config_file(&cwd) {
        Some(config_path) => {
            let config = load_config_file(&config_path)?;
            Ok(resolve(config, Some(config_path), &cwd, default_home))
        }
        None => {
            let config = ConfigFile {
                version: "1.0".to_string(),
                paths: PathsConfig::default(),
                executor: ExecutorConfig::default(),
                safety: None,
            };
            Ok(resolve(config, None, &cwd, default_home))
        }
    }
}

/// Apply the env > file > default layering to a parsed config file
fn resolve(
    config: ConfigFile,
    config_file: Option<PathBuf>,
    cwd: &Path,
    default_home: PathBuf,
) -> ResolvedConfig {
    // Base directory is the parent of .kgcrew/ (i.e., grandparent of config.yaml)
    let kgcrew_dir = config_file.as_deref().and_then(Path::parent);
    let base_dir = kgcrew_dir.and_then(Path::parent).unwrap_or(cwd);

    let home = env_path("KGCREW_HOME").unwrap_or_else(|| match (&config.paths.home, kgcrew_dir) {
        (Some(home), Some(dir)) => resolve_path(dir, home),
        _ => default_home,
    });

    let ontology = env_path("KGCREW_ONTOLOGY").unwrap_or_else(|| {
        let path = config.paths.ontology.as_deref().unwrap_or(DEFAULT_ONTOLOGY);
        resolve_path(base_dir, path)
    });

    let output_dir = env_path("KGCREW_OUTPUT_DIR").unwrap_or_else(|| match &config.paths.output_dir {
        Some(dir) => resolve_path(base_dir, dir),
        None => base_dir.to_path_buf(),
    });

    let crew_dir = config
        .paths
        .crew_dir
        .as_deref()
        .map(|dir| resolve_path(base_dir, dir));

    ResolvedConfig {
        home,
        crew_dir,
        ontology,
        output_dir,
        executor: config.executor,
        safety: config.safety,
        config_file,
    }
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let kgcrew_dir = temp.path().join(".kgcrew");
        std::fs::create_dir_all(&kgcrew_dir).unwrap();

        let config_path = kgcrew_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./state
  crew_dir: config
  ontology: knowledge/rules.txt
  output_dir: out
executor:
  kind: command
  program: ollama
  args: [run, llama3]
safety:
  attempt_timeout_seconds: 60
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.home, Some("./state".to_string()));
        assert_eq!(config.paths.crew_dir, Some("config".to_string()));
        assert!(matches!(config.executor, ExecutorConfig::Command { ref program, .. } if program == "ollama"));
        assert_eq!(config.safety.unwrap().attempt_timeout_seconds, Some(60));
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config: ConfigFile = serde_yaml::from_str("version: \"1.0\"").unwrap();
        assert_eq!(config.executor, ExecutorConfig::Heuristic);
        assert!(config.paths.ontology.is_none());
        assert!(config.safety.is_none());
    }

    #[test]
    fn test_find_config_walks_up() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".kgcrew")).unwrap();
        std::fs::write(temp.path().join(".kgcrew/config.yaml"), "version: \"1.0\"\n").unwrap();
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, temp.path().join(".kgcrew/config.yaml"));
    }

    #[test]
    fn test_paths_resolve_against_project_root() {
        let config: ConfigFile = serde_yaml::from_str(
            "version: \"1.0\"\npaths:\n  home: /abs/home\n  ontology: /abs/rules.txt\n  output_dir: /abs/out\n",
        )
        .unwrap();
        let config_file = PathBuf::from("/project/.kgcrew/config.yaml");

        // Skip when the environment overrides these
        if env_path("KGCREW_HOME").is_some()
            || env_path("KGCREW_ONTOLOGY").is_some()
            || env_path("KGCREW_OUTPUT_DIR").is_some()
        {
            return;
        }

        let resolved = resolve(
            config,
            Some(config_file),
            Path::new("/elsewhere"),
            PathBuf::from("/default/.kgcrew"),
        );
        assert_eq!(resolved.home, PathBuf::from("/abs/home"));
        assert_eq!(resolved.ontology, PathBuf::from("/abs/rules.txt"));
        assert_eq!(resolved.output_dir, PathBuf::from("/abs/out"));
        assert_eq!(resolved.runs_dir(), PathBuf::from("/abs/home/runs"));
        assert!(resolved.crew_dir.is_none());
    }

    #[test]
    fn test_safety_overrides() {
        let safety = SafetyConfig {
            max_ontology_bytes: Some(10),
            max_output_bytes: None,
            attempt_timeout_seconds: Some(5),
            denylist_patterns: None,
        };
        let mut limits = SafetyLimits::default();
        safety.apply(&mut limits);

        assert_eq!(limits.max_ontology_bytes, 10);
        assert_eq!(limits.attempt_timeout_seconds, 5);
        assert_eq!(limits.max_output_bytes, SafetyLimits::default().max_output_bytes);
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
