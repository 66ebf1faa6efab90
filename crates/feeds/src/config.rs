//! Configuration for feed ranking.
//!
//! Loaded from TOML, either standalone or as sections of the simulation
//! config.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete feed ranking configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedsConfig {
    /// Embedding provider settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Similarity ranking settings
    #[serde(default)]
    pub similarity: SimilarityConfig,
}

impl FeedsConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Settings for the built-in hashing embedder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Number of hash buckets per vector
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dimensions: 64 }
    }
}

/// Similarity ranking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Embed the agent's bio when it has neither a profile embedding nor
    /// authored posts
    pub bio_fallback: bool,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self { bio_fallback: true }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
