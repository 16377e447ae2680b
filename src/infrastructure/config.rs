//! Hierarchical configuration loading for the engine (§6.1's `SwarmConfig`, plus
//! the worker pool and logging settings the core's ambient stack needs).
//!
//! Grounded on the teacher's `infrastructure/config/loader.rs`: a `Figment` layering
//! of programmatic defaults, a project YAML file, a project-local override file, and
//! `ENGINE_`-prefixed environment variables, followed by explicit post-load
//! validation with a dedicated `thiserror` enum (the teacher's `ConfigError` shape).

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::models::SwarmConfig;
use crate::infrastructure::logging::LogConfig;

/// `(tier name, slot count)` pairs handed to [`crate::services::worker_pool::WorkerPool::new`].
pub type TierCounts = Vec<(String, usize)>;

/// Top-level engine configuration: the swarm tunables (§4.C.1), the worker pool
/// shape (§4.D), and ambient logging (not part of the spec's core, carried
/// regardless per the ambient-stack rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Task Queue / Wave Scheduler tunables (§4.C.1).
    pub swarm: SwarmConfig,
    /// Worker pool tier sizing, e.g. `[("small", 3), ("large", 1)]` (§4.D).
    pub worker_tiers: TierCounts,
    /// Logging configuration.
    pub logging: LogConfig,
    /// Whether to persist checkpoints to disk at `checkpoint_interval_ms` (§4.E).
    pub checkpoint_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            swarm: SwarmConfig::default(),
            worker_tiers: vec![("small".to_string(), 2), ("large".to_string(), 1)],
            logging: LogConfig::default(),
            checkpoint_path: Some(".swarm-engine/checkpoint.json".to_string()),
        }
    }
}

/// Errors raised validating a loaded [`EngineConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `partial_dependency_threshold` outside `[0, 1]` (§4.C.1).
    #[error("invalid partial_dependency_threshold: {0}. Must be between 0.0 and 1.0")]
    InvalidPartialDependencyThreshold(f64),

    /// A worker pool declared with zero total slots.
    #[error("worker_tiers must declare at least one slot")]
    EmptyWorkerPool,

    /// A tier entry with an empty name.
    #[error("worker tier name cannot be empty")]
    EmptyTierName,

    /// `stale_after_ms` of zero would make every dispatched task immediately stale.
    #[error("invalid stale_after_ms: {0}. Must be positive")]
    InvalidStaleAfter(u64),
}

/// Loads [`EngineConfig`] with the teacher's hierarchical-merge precedence.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.swarm-engine/config.yaml` (project config)
    /// 3. `.swarm-engine/local.yaml` (project-local overrides, optional)
    /// 4. `ENGINE_*` environment variables (highest priority)
    pub fn load() -> anyhow::Result<EngineConfig> {
        let config: EngineConfig = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::file(".swarm-engine/config.yaml"))
            .merge(Yaml::file(".swarm-engine/local.yaml"))
            .merge(Env::prefixed("ENGINE_").split("__"))
            .extract()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific YAML file, skipping the project-local
    /// layering (useful for tests and one-off runs).
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<EngineConfig> {
        let config: EngineConfig = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate a loaded configuration (§4.C.1's parameter ranges).
    pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
        let threshold = config.swarm.partial_dependency_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidPartialDependencyThreshold(threshold));
        }
        if config.worker_tiers.iter().map(|(_, n)| n).sum::<usize>() == 0 {
            return Err(ConfigError::EmptyWorkerPool);
        }
        if config.worker_tiers.iter().any(|(name, _)| name.is_empty()) {
            return Err(ConfigError::EmptyTierName);
        }
        if config.swarm.stale_after_ms == 0 {
            return Err(ConfigError::InvalidStaleAfter(0));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        ConfigLoader::validate(&config).expect("default config should validate");
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = EngineConfig::default();
        config.swarm.partial_dependency_threshold = 1.5;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidPartialDependencyThreshold(_))
        ));
    }

    #[test]
    fn rejects_empty_worker_pool() {
        let mut config = EngineConfig::default();
        config.worker_tiers = vec![];
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::EmptyWorkerPool)));
    }

    #[test]
    fn yaml_layer_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "swarm:\n  max_retries: 5\nworker_tiers:\n  - [small, 4]\n").unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.swarm.max_retries, 5);
        assert_eq!(config.worker_tiers, vec![("small".to_string(), 4)]);
    }
}
