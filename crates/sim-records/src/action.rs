//! Agent Action Types
//!
//! One row per validated engagement. Actions are append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{require_non_empty, RecordError};

/// Kinds of engagement an agent can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Like,
    Comment,
    Follow,
}

impl ActionType {
    /// Returns all action type variants.
    pub fn all() -> &'static [ActionType] {
        &[ActionType::Like, ActionType::Comment, ActionType::Follow]
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::Like => write!(f, "like"),
            ActionType::Comment => write!(f, "comment"),
            ActionType::Follow => write!(f, "follow"),
        }
    }
}

/// Per-type action totals.
pub type ActionCounts = BTreeMap<ActionType, usize>;

/// A validated engagement recorded for an agent in a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub action_id: String,
    pub run_id: String,
    pub turn_number: u32,
    pub agent_handle: String,
    pub action_type: ActionType,
    /// Post the action refers to (like, comment, and the post that prompted a follow)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_post_uri: Option<String>,
    /// Account followed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    /// Comment body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_text: Option<String>,
    /// Why the agent acted, as reported by the reasoner
    #[serde(default)]
    pub reasoning: String,
    pub created_at: DateTime<Utc>,
}

impl AgentAction {
    fn base(
        run_id: &str,
        turn_number: u32,
        agent_handle: &str,
        action_type: ActionType,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            action_id: generate_action_id(),
            run_id: run_id.to_string(),
            turn_number,
            agent_handle: agent_handle.to_string(),
            action_type,
            target_post_uri: None,
            target_handle: None,
            comment_text: None,
            reasoning: reasoning.into(),
            created_at: crate::now(),
        }
    }

    /// Creates a like on `post_uri`.
    pub fn like(
        run_id: &str,
        turn_number: u32,
        agent_handle: &str,
        post_uri: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        let mut action = Self::base(run_id, turn_number, agent_handle, ActionType::Like, reasoning);
        action.target_post_uri = Some(post_uri.into());
        action
    }

    /// Creates a comment on `post_uri`.
    pub fn comment(
        run_id: &str,
        turn_number: u32,
        agent_handle: &str,
        post_uri: impl Into<String>,
        text: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        let mut action =
            Self::base(run_id, turn_number, agent_handle, ActionType::Comment, reasoning);
        action.target_post_uri = Some(post_uri.into());
        action.comment_text = Some(text.into());
        action
    }

    /// Creates a follow of `target_handle`, prompted by `post_uri`.
    pub fn follow(
        run_id: &str,
        turn_number: u32,
        agent_handle: &str,
        target_handle: impl Into<String>,
        post_uri: Option<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        let mut action =
            Self::base(run_id, turn_number, agent_handle, ActionType::Follow, reasoning);
        action.target_handle = Some(target_handle.into());
        action.target_post_uri = post_uri;
        action
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        require_non_empty(&self.run_id, "run_id")?;
        require_non_empty(&self.agent_handle, "agent_handle")?;
        match self.action_type {
            ActionType::Like | ActionType::Comment => match &self.target_post_uri {
                Some(uri) => require_non_empty(uri, "target_post_uri"),
                None => Err(RecordError::EmptyField("target_post_uri")),
            },
            ActionType::Follow => match &self.target_handle {
                Some(handle) => require_non_empty(handle, "target_handle"),
                None => Err(RecordError::EmptyField("target_handle")),
            },
        }
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_jsonl(line: &str) -> Result<Self, RecordError> {
        let action: AgentAction = serde_json::from_str(line)?;
        action.validate()?;
        Ok(action)
    }
}

/// Totals actions by type. Every type is present, zero if unused.
pub fn count_actions<'a>(actions: impl IntoIterator<Item = &'a AgentAction>) -> ActionCounts {
    let mut counts: ActionCounts = ActionType::all().iter().map(|t| (*t, 0)).collect();
    for action in actions {
        *counts.entry(action.action_type).or_insert(0) += 1;
    }
    counts
}

/// Generates a unique action id.
pub fn generate_action_id() -> String {
    format!("act_{}", uuid::Uuid::new_v4())
}
