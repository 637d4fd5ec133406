//! Run configuration
//!
//! Layered lowest to highest: built-in defaults, an optional JSON file,
//! `FORKTREE_*` environment variables, then command-line flags (applied by
//! the binary). Read once by the root before anything is spawned.

use crate::core::models::SpawnLimits;
use crate::error::{ForkTreeError, ForkTreeResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maximum number of total processes
pub const DEFAULT_MAX_PROCESSES: u64 = 20;
/// Min. number that can be spawned by one process
pub const DEFAULT_MIN_SPAWN: u64 = 1;
/// Max. number that can be spawned by one process
pub const DEFAULT_MAX_SPAWN: u64 = 3;
pub const DEFAULT_LOG_FILE: &str = "out.txt";

pub const MAX_PROCESSES_ENV: &str = "FORKTREE_MAX_PROCESSES";
pub const MIN_SPAWN_ENV: &str = "FORKTREE_MIN_SPAWN";
pub const MAX_SPAWN_ENV: &str = "FORKTREE_MAX_SPAWN";
pub const LOG_FILE_ENV: &str = "FORKTREE_LOG_FILE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_processes: u64,
    pub min_spawn: u64,
    pub max_spawn: u64,
    /// Spawn log location, truncated at the start of every run
    pub log_file: PathBuf,
    /// Remove the spawn log once the tree has been printed
    pub cleanup_log: bool,
    /// tracing filter directive; `None` defers to `RUST_LOG`
    pub log_level: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_processes: DEFAULT_MAX_PROCESSES,
            min_spawn: DEFAULT_MIN_SPAWN,
            max_spawn: DEFAULT_MAX_SPAWN,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            cleanup_log: false,
            log_level: None,
        }
    }
}

impl RunConfig {
    /// Defaults, overlaid with `config_file` when given, then the environment.
    pub fn load(config_file: Option<&Path>) -> ForkTreeResult<Self> {
        let base = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env_overrides(|name| std::env::var(name).ok())
    }

    pub fn from_file(path: &Path) -> ForkTreeResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| ForkTreeError::io("read config file", path, err))?;
        serde_json::from_str(&content).map_err(|err| ForkTreeError::Config {
            message: format!("invalid JSON in {}: {}", path.display(), err),
            field: None,
        })
    }

    /// Apply `FORKTREE_*` overrides using `lookup` to read variables.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> ForkTreeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(MAX_PROCESSES_ENV) {
            self.max_processes = parse_count(MAX_PROCESSES_ENV, &value)?;
        }
        if let Some(value) = lookup(MIN_SPAWN_ENV) {
            self.min_spawn = parse_count(MIN_SPAWN_ENV, &value)?;
        }
        if let Some(value) = lookup(MAX_SPAWN_ENV) {
            self.max_spawn = parse_count(MAX_SPAWN_ENV, &value)?;
        }
        if let Some(value) = lookup(LOG_FILE_ENV) {
            if !value.trim().is_empty() {
                self.log_file = PathBuf::from(value.trim());
            }
        }
        Ok(self)
    }

    pub fn validate(&self) -> ForkTreeResult<()> {
        if self.max_processes < 1 {
            return Err(ForkTreeError::config(
                "max_processes",
                "the population ceiling must admit at least the root process",
            ));
        }
        if self.max_spawn < 1 {
            return Err(ForkTreeError::config(
                "max_spawn",
                "must allow at least one child per process",
            ));
        }
        if self.min_spawn > self.max_spawn {
            return Err(ForkTreeError::config(
                "min_spawn",
                format!(
                    "min_spawn ({}) is greater than max_spawn ({})",
                    self.min_spawn, self.max_spawn
                ),
            ));
        }
        if self.log_file.as_os_str().is_empty() {
            return Err(ForkTreeError::config("log_file", "spawn log path is empty"));
        }
        Ok(())
    }

    pub fn limits(&self) -> SpawnLimits {
        SpawnLimits {
            max_processes: self.max_processes,
            min_spawn: self.min_spawn,
            max_spawn: self.max_spawn,
        }
    }
}

fn parse_count(name: &str, value: &str) -> ForkTreeResult<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|err| ForkTreeError::config(name, format!("'{}' is not a count: {}", value, err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_match_original_constants() {
        let config = RunConfig::default();
        assert_eq!(config.max_processes, 20);
        assert_eq!(config.min_spawn, 1);
        assert_eq!(config.max_spawn, 3);
        assert_eq!(config.log_file, PathBuf::from("out.txt"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_replace_defaults() {
        let vars = env(&[(MAX_PROCESSES_ENV, "7"), (MAX_SPAWN_ENV, " 5 ")]);
        let config = RunConfig::default()
            .with_env_overrides(|name| vars.get(name).cloned())
            .unwrap();
        assert_eq!(config.max_processes, 7);
        assert_eq!(config.max_spawn, 5);
        assert_eq!(config.min_spawn, DEFAULT_MIN_SPAWN);
    }

    #[test]
    fn non_numeric_env_value_is_a_config_error() {
        let vars = env(&[(MIN_SPAWN_ENV, "two")]);
        let err = RunConfig::default()
            .with_env_overrides(|name| vars.get(name).cloned())
            .unwrap_err();
        assert!(matches!(err, ForkTreeError::Config { .. }));
    }

    #[test]
    fn validation_rejects_inverted_spawn_range() {
        let config = RunConfig {
            min_spawn: 4,
            max_spawn: 2,
            ..RunConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_spawn"));
    }

    #[test]
    fn validation_rejects_zero_ceiling() {
        let config = RunConfig {
            max_processes: 0,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("forktree.json");
        std::fs::write(&path, r#"{ "max_processes": 5, "cleanup_log": true }"#).unwrap();

        let config = RunConfig::from_file(&path).unwrap();
        assert_eq!(config.max_processes, 5);
        assert!(config.cleanup_log);
        assert_eq!(config.max_spawn, DEFAULT_MAX_SPAWN);
    }

    #[test]
    fn invalid_json_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ max_processes: ").unwrap();

        assert!(matches!(
            RunConfig::from_file(&path),
            Err(ForkTreeError::Config { .. })
        ));
    }
}
