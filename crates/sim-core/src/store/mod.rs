//! Persistence
//!
//! Durable record of runs, feeds, actions, turn summaries and follow graphs.
//! Feed and turn writes are at-most-once: a second write for the same key is
//! rejected rather than overwriting.

mod jsonl;
mod memory;
mod retry;

pub use jsonl::JsonlStore;
pub use memory::InMemoryStore;
pub use retry::RetryPolicy;

use sim_records::{
    AgentAction, FeedKey, GeneratedFeed, RecordError, Run, RunStatus, TurnMetadata,
};
use std::path::PathBuf;

use crate::follow_graph::FollowGraph;

/// Errors raised by a persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A feed already exists for this key.
    #[error("duplicate feed for {0}")]
    DuplicateFeed(FeedKey),
    #[error("run '{0}' already exists")]
    DuplicateRun(String),
    #[error("turn {turn} of run '{run_id}' already has metadata")]
    DuplicateTurn { run_id: String, turn: u32 },
    /// An action with this id is already stored.
    #[error("duplicate action '{0}'")]
    DuplicateAction(String),
    /// The agent's actions for this turn were already written.
    #[error("actions of {agent} for turn {turn} of run '{run_id}' already recorded")]
    DuplicateActionBatch {
        run_id: String,
        turn: u32,
        agent: String,
    },
    /// An action in a batch belongs to another run, turn or agent.
    #[error("action '{action_id}' does not belong to {agent} in turn {turn} of run '{run_id}'")]
    MisplacedAction {
        action_id: String,
        run_id: String,
        turn: u32,
        agent: String,
    },
    #[error("run '{0}' not found")]
    RunNotFound(String),
    #[error("invalid status transition for run '{run_id}': {from} -> {to}")]
    InvalidTransition {
        run_id: String,
        from: RunStatus,
        to: RunStatus,
    },
    /// A persisted line failed to parse or validate.
    #[error("corrupt record in {} line {line}: {source}", file.display())]
    Corrupt {
        file: PathBuf,
        line: usize,
        source: RecordError,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// The backend is temporarily unable to serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Unavailable(_))
    }
}

impl From<RecordError> for StoreError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::InvalidTransition { run_id, from, to } => {
                StoreError::InvalidTransition { run_id, from, to }
            }
            other => StoreError::Corrupt {
                file: PathBuf::new(),
                line: 0,
                source: other,
            },
        }
    }
}

/// Storage boundary used by the orchestrator.
///
/// Implementations must be safe to share between the workers of a turn.
pub trait PersistenceStore: Send + Sync {
    /// Records a new run. Fails if the id is taken.
    fn create_run(&self, run: &Run) -> Result<(), StoreError>;

    /// Moves a run to `status`, returning the updated run.
    fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<Run, StoreError>;

    fn get_run(&self, run_id: &str) -> Result<Option<Run>, StoreError>;

    /// All runs, newest first.
    fn list_runs(&self) -> Result<Vec<Run>, StoreError>;

    /// Writes a feed. Fails with [`StoreError::DuplicateFeed`] if one
    /// already exists for the same key.
    fn save_feed(&self, feed: &GeneratedFeed) -> Result<(), StoreError>;

    /// Every feed of `run_id` with `turn_number < turn_lt`.
    fn load_feeds(&self, run_id: &str, turn_lt: u32) -> Result<Vec<GeneratedFeed>, StoreError>;

    /// Every feed of one turn.
    fn load_turn_feeds(&self, run_id: &str, turn: u32) -> Result<Vec<GeneratedFeed>, StoreError>;

    /// Writes every action of `agent` in `turn` as one unit: either the whole
    /// batch is stored or none of it is. Fails with
    /// [`StoreError::DuplicateActionBatch`] if the agent already has actions
    /// for the turn, and with [`StoreError::DuplicateAction`] if an action id
    /// is already stored. An empty batch records nothing.
    fn save_actions(
        &self,
        run_id: &str,
        turn: u32,
        agent: &str,
        actions: &[AgentAction],
    ) -> Result<(), StoreError>;

    /// Actions of one turn, in write order.
    fn load_actions(&self, run_id: &str, turn: u32) -> Result<Vec<AgentAction>, StoreError>;

    /// The run's follow graph, empty if none was saved.
    fn load_follow_graph(&self, run_id: &str) -> Result<FollowGraph, StoreError>;

    fn save_follow_graph(&self, run_id: &str, graph: &FollowGraph) -> Result<(), StoreError>;

    /// Writes a turn summary. Fails with [`StoreError::DuplicateTurn`] if
    /// the turn already has one.
    fn save_turn_metadata(&self, metadata: &TurnMetadata) -> Result<(), StoreError>;

    fn load_turn_metadata(&self, run_id: &str, turn: u32)
        -> Result<Option<TurnMetadata>, StoreError>;

    /// Turn summaries of a run, by turn number.
    fn list_turn_metadata(&self, run_id: &str) -> Result<Vec<TurnMetadata>, StoreError>;
}
