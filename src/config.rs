//! Configuration (spec.md §4.11, new in the expanded spec). Defaults are
//! layered with `nebula.toml`'s `[execution]` table and then `QUASAR_*`
//! environment variables, in the same nested-config-struct shape as the
//! teacher's `services::config::Config`, but loaded through `figment`
//! instead of hand-rolled env-var parsing.

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),
    #[error("invalid configuration: {field}: {reason}")]
    Invalid { field: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_workers: usize,
    pub default_model: String,
    pub default_max_review_cycles: u32,
    pub default_max_budget_usd: f64,
    pub max_retries: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            default_model: "claude-sonnet".to_string(),
            default_max_review_cycles: 2,
            default_max_budget_usd: 5.0,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    pub database_path: String,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self { database_path: ".nebula/fabric.db".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string(), directory: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotReloadConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NebulaConfig {
    pub execution: ExecutionConfig,
    pub fabric: FabricConfig,
    pub logging: LoggingConfig,
    pub hot_reload: HotReloadConfig,
}

impl Default for NebulaConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionConfig::default(),
            fabric: FabricConfig::default(),
            logging: LoggingConfig::default(),
            hot_reload: HotReloadConfig { enabled: false, poll_interval_ms: 500 },
        }
    }
}

/// Layers defaults, `nebula.toml`, and `QUASAR_*` environment variables,
/// in that precedence order (later layers win).
pub struct ConfigLoader {
    figment: Figment,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { figment: Figment::from(Serialized::defaults(NebulaConfig::default())) }
    }

    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.figment = self.figment.merge(Toml::file(path.as_ref()));
        self
    }

    /// Merges `nebula.toml` from the nebula directory if it exists;
    /// silent no-op otherwise (spec.md's config file is optional).
    pub fn with_nebula_dir(self, nebula_dir: impl AsRef<Path>) -> Self {
        self.with_file(nebula_dir.as_ref().join("nebula.toml"))
    }

    pub fn with_env(mut self) -> Self {
        self.figment = self.figment.merge(Env::prefixed("QUASAR_").split("__"));
        self
    }

    pub fn load(self) -> ConfigResult<NebulaConfig> {
        let config: NebulaConfig = self.figment.extract().map_err(|e| ConfigError::Load(e.to_string()))?;
        validate(&config)?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(config: &NebulaConfig) -> ConfigResult<()> {
    if config.execution.max_workers == 0 {
        return Err(ConfigError::Invalid {
            field: "execution.max_workers".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    if config.execution.default_max_budget_usd < 0.0 {
        return Err(ConfigError::Invalid {
            field: "execution.default_max_budget_usd".to_string(),
            reason: "must not be negative".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.execution.max_workers, 4);
    }

    #[test]
    fn env_overrides_defaults() {
        std::env::set_var("QUASAR_EXECUTION__MAX_WORKERS", "9");
        let config = ConfigLoader::new().with_env().load().unwrap();
        assert_eq!(config.execution.max_workers, 9);
        std::env::remove_var("QUASAR_EXECUTION__MAX_WORKERS");
    }

    #[test]
    fn rejects_zero_workers() {
        std::env::set_var("QUASAR_EXECUTION__MAX_WORKERS", "0");
        let err = ConfigLoader::new().with_env().load().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        std::env::remove_var("QUASAR_EXECUTION__MAX_WORKERS");
    }
}
