//! Run and Turn Types
//!
//! A run is created once with its configuration and only its status changes
//! afterwards. Turn records summarise each completed turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::action::ActionCounts;
use crate::feed::FeedStrategy;
use crate::{format_run_timestamp, require_non_empty, RecordError};

/// Default number of posts per feed.
pub const DEFAULT_FEED_SIZE: usize = 20;

/// Parameters fixed at run creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub num_agents: usize,
    pub num_turns: u32,
    pub feed_strategies: BTreeSet<FeedStrategy>,
    pub feed_size_k: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            num_agents: 1,
            num_turns: 1,
            feed_strategies: BTreeSet::from([FeedStrategy::Chronological]),
            feed_size_k: DEFAULT_FEED_SIZE,
        }
    }
}

impl RunConfig {
    pub fn new(num_agents: usize, num_turns: u32, feed_size_k: usize) -> Self {
        Self {
            num_agents,
            num_turns,
            feed_size_k,
            ..Self::default()
        }
    }

    pub fn with_strategies(mut self, strategies: impl IntoIterator<Item = FeedStrategy>) -> Self {
        self.feed_strategies = strategies.into_iter().collect();
        self
    }

    /// Rejects configurations that can never produce a valid run.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.num_agents == 0 {
            return Err(RecordError::InvalidConfig("num_agents must be greater than 0".into()));
        }
        if self.num_turns == 0 {
            return Err(RecordError::InvalidConfig("num_turns must be greater than 0".into()));
        }
        if self.feed_size_k == 0 {
            return Err(RecordError::InvalidConfig("feed_size_k must be greater than 0".into()));
        }
        if self.feed_strategies.is_empty() {
            return Err(RecordError::InvalidConfig(
                "at least one feed strategy is required".into(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle state of a run.
///
/// `Running` moves to `Completed` or `Failed`; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Statuses reachable from this one.
    pub fn valid_transitions(&self) -> &'static [RunStatus] {
        match self {
            RunStatus::Running => &[RunStatus::Completed, RunStatus::Failed],
            RunStatus::Completed | RunStatus::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One full simulation execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub num_agents: usize,
    pub num_turns: u32,
    pub feed_size_k: usize,
    pub strategies: BTreeSet<FeedStrategy>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Starts a new run from a validated configuration.
    pub fn start(config: &RunConfig) -> Result<Self, RecordError> {
        config.validate()?;
        let ts = crate::now();
        Ok(Self {
            run_id: generate_run_id(&ts),
            created_at: ts,
            started_at: ts,
            num_agents: config.num_agents,
            num_turns: config.num_turns,
            feed_size_k: config.feed_size_k,
            strategies: config.feed_strategies.clone(),
            status: RunStatus::Running,
            completed_at: None,
        })
    }

    /// The configuration this run was created with.
    pub fn config(&self) -> RunConfig {
        RunConfig {
            num_agents: self.num_agents,
            num_turns: self.num_turns,
            feed_strategies: self.strategies.clone(),
            feed_size_k: self.feed_size_k,
        }
    }

    /// Moves the run to `next`. Re-applying the current status is a no-op.
    pub fn transition(&mut self, next: RunStatus) -> Result<(), RecordError> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(RecordError::InvalidTransition {
                run_id: self.run_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next == RunStatus::Completed {
            self.completed_at = Some(crate::now());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        require_non_empty(&self.run_id, "run_id")?;
        self.config().validate()
    }
}

/// Generates a run id embedding the start time.
pub fn generate_run_id(started_at: &DateTime<Utc>) -> String {
    format!(
        "run_{}_{}",
        format_run_timestamp(started_at),
        uuid::Uuid::new_v4()
    )
}

/// Persisted summary of a completed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub run_id: String,
    pub turn_number: u32,
    pub total_actions: ActionCounts,
    pub created_at: DateTime<Utc>,
}

impl TurnMetadata {
    pub fn new(run_id: impl Into<String>, turn_number: u32, total_actions: ActionCounts) -> Self {
        Self {
            run_id: run_id.into(),
            turn_number,
            total_actions,
            created_at: crate::now(),
        }
    }
}

/// Outcome of executing one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub turn_number: u32,
    pub total_actions: ActionCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    /// Agents whose session failed and recorded nothing this turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_agents: Vec<String>,
}

impl TurnResult {
    /// Total number of actions across all types.
    pub fn action_total(&self) -> usize {
        self.total_actions.values().sum()
    }
}
