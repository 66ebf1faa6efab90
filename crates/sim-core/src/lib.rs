//! Turn engine for the feed simulation: persistence, seen tracking, agent
//! sessions and the run orchestrator.

pub mod config;
pub mod follow_graph;
pub mod heuristic;
pub mod logging;
pub mod orchestrator;
pub mod reasoner;
pub mod roster;
pub mod seen;
pub mod session;
pub mod store;

pub use config::{ConfigError, SimConfig};
pub use follow_graph::FollowGraph;
pub use heuristic::HeuristicReasoner;
pub use orchestrator::{HydratedFeed, RunOrchestrator, RunPhase, RunSummary, TurnData};
pub use reasoner::{
    AgentReasoner, BeliefDelta, BeliefState, Engagement, EngagementIntent, PostContext,
    ReasoningError, TurnObservations,
};
pub use roster::{build_roster, load_profiles};
pub use seen::{build_seen_index, SeenIndex, SeenPostsTracker};
pub use session::{AgentSession, DroppedIntent, InvalidIntent, SessionOutput};
pub use store::{InMemoryStore, JsonlStore, PersistenceStore, RetryPolicy, StoreError};

use feeds::{CorpusError, FeedError};
use sim_records::{RecordError, RunStatus};

/// Errors raised while setting up or executing a run.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Settings that can never produce a valid run.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not enough agent profiles: requested {requested}, available {available}")]
    InsufficientAgents { requested: usize, available: usize },
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A persisted feed references a post the corpus does not have.
    #[error("feed '{feed_id}' for '{agent}' references unknown post '{uri}' at position {index}")]
    MissingPost {
        agent: String,
        feed_id: String,
        index: usize,
        uri: String,
    },
    #[error("turn {turn} of run '{run_id}' failed: {source}")]
    TurnFailed {
        run_id: String,
        turn: u32,
        #[source]
        source: Box<SimError>,
    },
    #[error("run '{run_id}' cannot be resumed: status is {status}")]
    NotResumable { run_id: String, status: RunStatus },
}

impl SimError {
    /// The error that caused a turn failure, or `self`.
    pub fn root(&self) -> &SimError {
        match self {
            SimError::TurnFailed { source, .. } => source.root(),
            other => other,
        }
    }
}
