//! Configuration management.
//!
//! flowexpr configuration can come from:
//! - Environment variables (FLOWEXPR_*)
//! - Config file (~/.config/flowexpr/config.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// flowexpr configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Sandboxed evaluator limits
    #[serde(default)]
    pub evaluator: EvaluatorConfig,

    /// Schedule engine settings
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Sandboxed evaluator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Wall-clock ceiling for a single expression (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Longest expression text accepted by validation
    #[serde(default = "default_max_expression_length")]
    pub max_expression_length: usize,

    /// Largest array or object the evaluator will build
    #[serde(default = "default_max_collection_len")]
    pub max_collection_len: usize,

    /// Largest string the evaluator will build (bytes)
    #[serde(default = "default_max_string_len")]
    pub max_string_len: usize,

    /// Deepest nesting the parser and evaluator will follow
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Allocation budget for one evaluation: array and object elements plus
    /// string bytes, summed over everything the expression builds
    #[serde(default = "default_max_total_elements")]
    pub max_total_elements: usize,
}

impl EvaluatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Same limits with a different wall-clock ceiling.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_expression_length: default_max_expression_length(),
            max_collection_len: default_max_collection_len(),
            max_string_len: default_max_string_len(),
            max_depth: default_max_depth(),
            max_total_elements: default_max_total_elements(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_expression_length() -> usize {
    10_000
}

fn default_max_collection_len() -> usize {
    100_000
}

fn default_max_string_len() -> usize {
    1024 * 1024
}

fn default_max_depth() -> usize {
    64
}

fn default_max_total_elements() -> usize {
    4_000_000
}

/// Schedule engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Number of upcoming executions computed when the caller gives none
    #[serde(default = "default_count")]
    pub default_count: usize,

    /// Minutes simulated per requested execution before giving up
    #[serde(default = "default_iteration_factor")]
    pub iteration_factor: usize,

    /// Parsed cron expressions kept in memory
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Cron used when cron mode carries no expression at all
    #[serde(default = "default_cron")]
    pub default_cron: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            default_count: default_count(),
            iteration_factor: default_iteration_factor(),
            cache_capacity: default_cache_capacity(),
            default_cron: default_cron(),
        }
    }
}

fn default_count() -> usize {
    10
}

fn default_iteration_factor() -> usize {
    1000
}

fn default_cache_capacity() -> u64 {
    512
}

pub(crate) fn default_cron() -> String {
    "0 * * * *".to_string()
}

impl Config {
    /// Load configuration from default locations.
    pub fn load() -> Self {
        let mut config = Self::default();

        let primary_path = Self::config_dir().join("config.toml");
        if let Ok(partial) = Self::load_partial_from_path(&primary_path) {
            config.apply_partial(partial);
        }

        config.apply_env_overrides();
        config
    }

    /// Load configuration from an explicit file, then apply env overrides.
    ///
    /// Unlike [`Config::load`], a missing or malformed file is an error.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let partial: PartialConfig = toml::from_str(&content)?;
        let mut config = Self::default();
        config.apply_partial(partial);
        config.apply_env_overrides();
        config.check()?;
        Ok(config)
    }

    /// Get the config directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("flowexpr"))
            .unwrap_or_else(|| PathBuf::from(".flowexpr"))
    }

    fn check(&self) -> Result<()> {
        if self.evaluator.timeout_ms == 0 {
            return Err(Error::Config("evaluator.timeout_ms must be positive".into()));
        }
        if self.schedule.iteration_factor == 0 {
            return Err(Error::Config(
                "schedule.iteration_factor must be positive".into(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(timeout) = std::env::var("FLOWEXPR_EVALUATOR_TIMEOUT_MS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                if parsed > 0 {
                    self.evaluator.timeout_ms = parsed;
                }
            }
        }
        if let Ok(len) = std::env::var("FLOWEXPR_MAX_EXPRESSION_LENGTH") {
            if let Ok(parsed) = len.parse::<usize>() {
                self.evaluator.max_expression_length = parsed;
            }
        }
        if let Ok(count) = std::env::var("FLOWEXPR_SCHEDULE_DEFAULT_COUNT") {
            if let Ok(parsed) = count.parse::<usize>() {
                self.schedule.default_count = parsed;
            }
        }
        if let Ok(factor) = std::env::var("FLOWEXPR_SCHEDULE_ITERATION_FACTOR") {
            if let Ok(parsed) = factor.parse::<usize>() {
                if parsed > 0 {
                    self.schedule.iteration_factor = parsed;
                }
            }
        }
    }

    fn load_partial_from_path(path: &Path) -> std::result::Result<PartialConfig, ()> {
        let content = std::fs::read_to_string(path).map_err(|_| ())?;
        toml::from_str(&content).map_err(|_| ())
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(evaluator) = partial.evaluator {
            self.evaluator = evaluator;
        }
        if let Some(schedule) = partial.schedule {
            self.schedule = schedule;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    evaluator: Option<EvaluatorConfig>,
    schedule: Option<ScheduleConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.evaluator.timeout_ms, 5000);
        assert_eq!(config.evaluator.max_expression_length, 10_000);
        assert_eq!(config.schedule.default_count, 10);
        assert_eq!(config.schedule.iteration_factor, 1000);
        assert_eq!(config.schedule.default_cron, "0 * * * *");
    }

    #[test]
    fn test_from_path_partial_tables() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[evaluator]\ntimeout_ms = 250\n").unwrap();

        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.evaluator.timeout_ms, 250);
        // Unspecified fields inside a present table fall back to defaults
        assert_eq!(config.evaluator.max_expression_length, 10_000);
        // Absent tables keep defaults
        assert_eq!(config.schedule.default_count, 10);
    }

    #[test]
    fn test_from_path_rejects_zero_timeout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[evaluator]\ntimeout_ms = 0\n").unwrap();

        let err = Config::from_path(file.path()).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_from_path_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[evaluator\ntimeout_ms = ").unwrap();

        let err = Config::from_path(file.path()).unwrap_err();
        assert_eq!(err.code(), "TOML_ERROR");
    }

    #[test]
    fn test_timeout_duration() {
        let config = EvaluatorConfig::default().with_timeout_ms(42);
        assert_eq!(config.timeout(), Duration::from_millis(42));
    }
}
