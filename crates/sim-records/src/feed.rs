//! Generated Feed Types
//!
//! A generated feed is the ordered list of post URIs shown to one agent in
//! one turn under one ranking strategy. Feeds are written once and never
//! modified; the union of an agent's earlier feeds is what it has "seen".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{require_non_empty, RecordError};

/// Ranking strategy used to build a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStrategy {
    /// Newest first
    Chronological,
    /// Closest to the agent's interests first
    SimilarityRag,
}

impl FeedStrategy {
    /// Returns all strategy variants.
    pub fn all() -> &'static [FeedStrategy] {
        &[FeedStrategy::Chronological, FeedStrategy::SimilarityRag]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedStrategy::Chronological => "chronological",
            FeedStrategy::SimilarityRag => "similarity_rag",
        }
    }
}

impl fmt::Display for FeedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedStrategy {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chronological" => Ok(FeedStrategy::Chronological),
            "similarity_rag" | "rag" => Ok(FeedStrategy::SimilarityRag),
            _ => Err(RecordError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Uniqueness key of a generated feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedKey {
    pub run_id: String,
    pub turn_number: u32,
    pub agent_handle: String,
    pub strategy: FeedStrategy,
}

impl FeedKey {
    pub fn new(
        run_id: impl Into<String>,
        turn_number: u32,
        agent_handle: impl Into<String>,
        strategy: FeedStrategy,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            turn_number,
            agent_handle: agent_handle.into(),
            strategy,
        }
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/turn_{}/{}/{}",
            self.run_id, self.turn_number, self.agent_handle, self.strategy
        )
    }
}

/// A feed generated for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFeed {
    pub feed_id: String,
    pub run_id: String,
    pub turn_number: u32,
    pub agent_handle: String,
    pub strategy: FeedStrategy,
    /// Post URIs in display order
    pub post_uris: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl GeneratedFeed {
    /// Creates a feed for `key` with a fresh id and the current time.
    pub fn new(key: &FeedKey, post_uris: Vec<String>) -> Self {
        Self {
            feed_id: generate_feed_id(),
            run_id: key.run_id.clone(),
            turn_number: key.turn_number,
            agent_handle: key.agent_handle.clone(),
            strategy: key.strategy,
            post_uris,
            created_at: crate::now(),
        }
    }

    /// Returns the uniqueness key of this feed.
    pub fn key(&self) -> FeedKey {
        FeedKey::new(
            self.run_id.clone(),
            self.turn_number,
            self.agent_handle.clone(),
            self.strategy,
        )
    }

    pub fn len(&self) -> usize {
        self.post_uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.post_uris.is_empty()
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        require_non_empty(&self.run_id, "run_id")?;
        require_non_empty(&self.agent_handle, "agent_handle")
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_jsonl(line: &str) -> Result<Self, RecordError> {
        let feed: GeneratedFeed = serde_json::from_str(line)?;
        feed.validate()?;
        Ok(feed)
    }
}

/// Generates a unique feed id.
pub fn generate_feed_id() -> String {
    format!("feed_{}", uuid::Uuid::new_v4())
}
