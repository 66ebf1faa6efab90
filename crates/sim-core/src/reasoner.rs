//! Agent reasoning interface.
//!
//! Deciding why an agent engages with a post is delegated to an
//! [`AgentReasoner`]. It answers with engagement intents, which the session
//! validates before anything is recorded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use sim_records::{AgentAction, AgentProfile, Post};

/// A proposed engagement with a post, pending validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EngagementIntent {
    Like,
    /// Comment with the given text
    Comment(String),
    /// Follow the given handle
    Follow(String),
}

/// An intent together with the reasoner's explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub intent: EngagementIntent,
    #[serde(default)]
    pub reasoning: String,
}

impl Engagement {
    pub fn like(reasoning: impl Into<String>) -> Self {
        Self {
            intent: EngagementIntent::Like,
            reasoning: reasoning.into(),
        }
    }

    pub fn comment(text: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            intent: EngagementIntent::Comment(text.into()),
            reasoning: reasoning.into(),
        }
    }

    pub fn follow(target: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            intent: EngagementIntent::Follow(target.into()),
            reasoning: reasoning.into(),
        }
    }
}

/// What the agent knows about itself, carried between turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeliefState {
    /// One summary per completed turn, oldest first
    pub notes: Vec<String>,
}

impl BeliefState {
    pub fn apply(&mut self, delta: BeliefDelta) {
        if !delta.summary.trim().is_empty() {
            self.notes.push(delta.summary);
        }
    }

    pub fn latest(&self) -> Option<&str> {
        self.notes.last().map(String::as_str)
    }
}

/// Change to an agent's beliefs after one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeliefDelta {
    pub summary: String,
}

/// Per-post input to the reasoner.
#[derive(Debug, Clone, Copy)]
pub struct PostContext<'a> {
    pub post: &'a Post,
    /// Whether following the post's author is on offer
    pub can_follow_author: bool,
}

/// What happened during an agent's turn, for the belief update.
#[derive(Debug, Clone, Copy)]
pub struct TurnObservations<'a> {
    pub turn_number: u32,
    pub posts: &'a [Post],
    pub actions: &'a [AgentAction],
}

/// Errors from the reasoning capability.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReasoningError {
    #[error("reasoning timed out after {0:?}")]
    Timeout(Duration),
    #[error("reasoning failed: {0}")]
    Failure(String),
}

/// Decides how an agent reacts to posts.
#[async_trait]
pub trait AgentReasoner: Send + Sync {
    /// Returns zero or more intents for one post.
    async fn evaluate(
        &self,
        agent: &AgentProfile,
        beliefs: &BeliefState,
        context: PostContext<'_>,
    ) -> Result<Vec<Engagement>, ReasoningError>;

    /// Summarises the turn into a belief change.
    async fn update_beliefs(
        &self,
        agent: &AgentProfile,
        beliefs: &BeliefState,
        observations: TurnObservations<'_>,
    ) -> Result<BeliefDelta, ReasoningError>;
}
