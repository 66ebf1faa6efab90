//! Shared record types and serialization for the feed simulation.
//!
//! This crate contains pure data structures with no simulation logic.
//! It is a dependency for all other crates in the workspace.

pub mod action;
pub mod feed;
pub mod post;
pub mod run;
pub mod timestamp;

#[cfg(feature = "test-fixtures")]
pub mod fixtures;

// Re-export timestamp helpers
pub use timestamp::{format_run_timestamp, now, RUN_TIMESTAMP_FORMAT};

// Re-export post types
pub use post::{AgentProfile, Post, PostOrigin};

// Re-export feed types
pub use feed::{generate_feed_id, FeedKey, FeedStrategy, GeneratedFeed};

// Re-export action types
pub use action::{count_actions, generate_action_id, ActionCounts, ActionType, AgentAction};

// Re-export run types
pub use run::{
    generate_run_id, Run, RunConfig, RunStatus, TurnMetadata, TurnResult, DEFAULT_FEED_SIZE,
};

/// Errors raised when a record fails validation or parsing.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// A required string field was empty or whitespace.
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),
    /// A run status change that the lifecycle does not allow.
    #[error("invalid status transition for run '{run_id}': {from} -> {to}")]
    InvalidTransition {
        run_id: String,
        from: RunStatus,
        to: RunStatus,
    },
    /// A run configuration that can never produce a valid run.
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),
    /// A strategy name that does not match any known strategy.
    #[error("unknown feed strategy '{0}'")]
    UnknownStrategy(String),
    /// A malformed JSON line.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fails with [`RecordError::EmptyField`] when `value` is blank.
pub(crate) fn require_non_empty(value: &str, field: &'static str) -> Result<(), RecordError> {
    if value.trim().is_empty() {
        return Err(RecordError::EmptyField(field));
    }
    Ok(())
}
