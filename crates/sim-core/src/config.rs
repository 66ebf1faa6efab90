//! Configuration System
//!
//! Loads run, session, persistence and logging settings from TOML. Every
//! section is optional and falls back to its defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use feeds::{EmbeddingConfig, FeedsConfig, SimilarityConfig};
use sim_records::{FeedStrategy, RunConfig, DEFAULT_FEED_SIZE};

/// Default config file path
pub const DEFAULT_CONFIG_PATH: &str = "feed_sim.toml";

/// Top-level configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
}

/// Run shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub num_agents: usize,
    pub num_turns: u32,
    pub feed_strategies: BTreeSet<FeedStrategy>,
    pub feed_size_k: usize,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            num_agents: 4,
            num_turns: 3,
            feed_strategies: BTreeSet::from([FeedStrategy::Chronological]),
            feed_size_k: DEFAULT_FEED_SIZE,
        }
    }
}

/// Agent session limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound on one agent's session, in milliseconds
    pub timeout_ms: u64,
    /// Sessions run concurrently within a turn, up to this many
    pub max_concurrent_agents: usize,
    /// Ask the reasoner for a belief update after each session
    pub update_beliefs: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_concurrent_agents: 4,
            update_beliefs: true,
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where and how records are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub output_dir: PathBuf,
    /// Attempts per write, including the first
    pub max_write_attempts: u32,
    /// Delay before the first retry; doubles on each further retry
    pub retry_backoff_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            max_write_attempts: 3,
            retry_backoff_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SimConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Loads `path` if it exists, otherwise returns defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parses configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// The run shape as a record-level configuration.
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            num_agents: self.run.num_agents,
            num_turns: self.run.num_turns,
            feed_strategies: self.run.feed_strategies.clone(),
            feed_size_k: self.run.feed_size_k,
        }
    }

    /// Ranking settings for the feeds crate.
    pub fn feeds_config(&self) -> FeedsConfig {
        FeedsConfig {
            embedding: self.embedding.clone(),
            similarity: self.similarity.clone(),
        }
    }

    /// Rejects settings that cannot start a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.run_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.session.max_concurrent_agents == 0 {
            return Err(ConfigError::Invalid(
                "session.max_concurrent_agents must be greater than 0".into(),
            ));
        }
        if self.session.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.timeout_ms must be greater than 0".into(),
            ));
        }
        if self.persistence.max_write_attempts == 0 {
            return Err(ConfigError::Invalid(
                "persistence.max_write_attempts must be greater than 0".into(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid(
                "embedding.dimensions must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Returns the default configuration rendered as TOML.
pub fn default_config_toml() -> Result<String, toml::ser::Error> {
    SimConfig::default().to_toml()
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = SimConfig::from_str("").unwrap();
        assert_eq!(config, SimConfig::default());
        assert_eq!(config.run.feed_size_k, 20);
        assert_eq!(config.persistence.max_write_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sections() {
        let toml = r#"
            [run]
            num_agents = 2
            num_turns = 5
            feed_strategies = ["chronological", "similarity_rag"]
            feed_size_k = 3

            [session]
            timeout_ms = 500

            [logging]
            level = "debug"
        "#;
        let config = SimConfig::from_str(toml).unwrap();
        assert_eq!(config.run.num_turns, 5);
        assert_eq!(config.run.feed_strategies.len(), 2);
        assert_eq!(config.session.timeout(), Duration::from_millis(500));
        assert_eq!(config.session.max_concurrent_agents, 4);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.run_config().feed_size_k, 3);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = SimConfig::default();
        config.run.feed_size_k = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SimConfig::default();
        config.run.num_turns = 0;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.session.max_concurrent_agents = 0;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.run.feed_strategies.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_strategy_is_parse_error() {
        let toml = "[run]\nfeed_strategies = [\"popular\"]\n";
        assert!(matches!(SimConfig::from_str(toml), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_default_toml_round_trips() {
        let text = default_config_toml().unwrap();
        assert_eq!(SimConfig::from_str(&text).unwrap(), SimConfig::default());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = SimConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SimConfig::default());
    }
}
