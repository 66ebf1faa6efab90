//! Post and Profile Types
//!
//! Posts are immutable once ingested. Profiles describe the agents that read
//! them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{require_non_empty, RecordError};

/// Where a post came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostOrigin {
    /// Ground-truth corpus entry
    #[default]
    Original,
    /// Synthetically injected during a run
    Generated,
}

/// A single post in the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Unique identifier of the post
    pub uri: String,
    /// Handle of the account that wrote it
    pub author_handle: String,
    #[serde(default)]
    pub author_display_name: String,
    pub text: String,
    /// Pre-computed embedding, if the corpus ships one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub origin: PostOrigin,
}

impl Post {
    /// Creates an original post without an embedding.
    pub fn new(
        uri: impl Into<String>,
        author_handle: impl Into<String>,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uri: uri.into(),
            author_handle: author_handle.into(),
            author_display_name: String::new(),
            text: text.into(),
            embedding: None,
            created_at,
            origin: PostOrigin::Original,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_origin(mut self, origin: PostOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.author_display_name = name.into();
        self
    }

    /// Returns true if `handle` wrote this post.
    pub fn is_authored_by(&self, handle: &str) -> bool {
        self.author_handle == handle
    }

    /// Checks that identifying fields are present.
    pub fn validate(&self) -> Result<(), RecordError> {
        require_non_empty(&self.uri, "uri")?;
        require_non_empty(&self.author_handle, "author_handle")
    }

    /// Serializes the post as a single JSON line.
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses and validates a post from a JSON line.
    pub fn from_jsonl(line: &str) -> Result<Self, RecordError> {
        let post: Post = serde_json::from_str(line)?;
        post.validate()?;
        Ok(post)
    }
}

/// An agent taking part in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub handle: String,
    #[serde(default)]
    pub display_name: String,
    /// Free-form description of the agent's interests and beliefs
    #[serde(default)]
    pub bio: String,
    /// Configured interest vector; overrides the mean of authored posts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_embedding: Option<Vec<f32>>,
}

impl AgentProfile {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            display_name: String::new(),
            bio: String::new(),
            profile_embedding: None,
        }
    }

    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = bio.into();
        self
    }

    pub fn with_profile_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.profile_embedding = Some(embedding);
        self
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        require_non_empty(&self.handle, "handle")
    }

    /// Parses and validates a profile from a JSON line.
    pub fn from_jsonl(line: &str) -> Result<Self, RecordError> {
        let profile: AgentProfile = serde_json::from_str(line)?;
        profile.validate()?;
        Ok(profile)
    }
}
