//! Shared helpers for orchestrator integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feeds::{build_selectors, FeedsConfig, HashingEmbedder, InMemoryCorpus};
use sim_core::config::SessionConfig;
use sim_core::{
    AgentReasoner, BeliefDelta, BeliefState, Engagement, FollowGraph, InMemoryStore,
    PersistenceStore, PostContext, ReasoningError, RetryPolicy, RunOrchestrator, StoreError,
    TurnObservations,
};
use sim_records::{
    AgentAction, AgentProfile, FeedKey, FeedStrategy, GeneratedFeed, Post, Run, RunStatus,
    TurnMetadata,
};

/// Never engages.
pub struct Passive;

#[async_trait]
impl AgentReasoner for Passive {
    async fn evaluate(
        &self,
        _agent: &AgentProfile,
        _beliefs: &BeliefState,
        _context: PostContext<'_>,
    ) -> Result<Vec<Engagement>, ReasoningError> {
        Ok(Vec::new())
    }

    async fn update_beliefs(
        &self,
        _agent: &AgentProfile,
        _beliefs: &BeliefState,
        _observations: TurnObservations<'_>,
    ) -> Result<BeliefDelta, ReasoningError> {
        Ok(BeliefDelta::default())
    }
}

/// Likes every post and always asks to follow its author, offered or not.
/// Agents listed in `failing` error out; agents in `slow` stall.
#[derive(Default)]
pub struct Eager {
    pub failing: HashSet<String>,
    pub slow: HashSet<String>,
}

#[async_trait]
impl AgentReasoner for Eager {
    async fn evaluate(
        &self,
        agent: &AgentProfile,
        _beliefs: &BeliefState,
        context: PostContext<'_>,
    ) -> Result<Vec<Engagement>, ReasoningError> {
        if self.failing.contains(&agent.handle) {
            return Err(ReasoningError::Failure("model unavailable".into()));
        }
        if self.slow.contains(&agent.handle) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(vec![
            Engagement::like("always likes"),
            Engagement::follow(context.post.author_handle.clone(), "always follows"),
        ])
    }

    async fn update_beliefs(
        &self,
        _agent: &AgentProfile,
        _beliefs: &BeliefState,
        observations: TurnObservations<'_>,
    ) -> Result<BeliefDelta, ReasoningError> {
        Ok(BeliefDelta {
            summary: format!("turn {}", observations.turn_number),
        })
    }
}

/// Delegates to an in-memory store with switchable faults.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: InMemoryStore,
    /// Reject feeds for this (turn, agent) as duplicates
    pub duplicate_feed_for: Option<(u32, String)>,
    /// Fail every turn-metadata write for this turn while set
    pub fail_metadata_turn: Option<u32>,
    /// Fail every action batch after this many have been written
    pub fail_action_after: Option<usize>,
    /// Store the next N action batches but report them as failed
    pub lost_action_acks: AtomicUsize,
    /// Fail every follow-graph write
    pub fail_follow_graph: bool,
    pub faults_enabled: AtomicBool,
    action_batches: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            faults_enabled: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn heal(&self) {
        self.faults_enabled.store(false, Ordering::SeqCst);
    }

    fn faulty(&self) -> bool {
        self.faults_enabled.load(Ordering::SeqCst)
    }
}

impl PersistenceStore for FaultyStore {
    fn create_run(&self, run: &Run) -> Result<(), StoreError> {
        self.inner.create_run(run)
    }

    fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<Run, StoreError> {
        self.inner.update_run_status(run_id, status)
    }

    fn get_run(&self, run_id: &str) -> Result<Option<Run>, StoreError> {
        self.inner.get_run(run_id)
    }

    fn list_runs(&self) -> Result<Vec<Run>, StoreError> {
        self.inner.list_runs()
    }

    fn save_feed(&self, feed: &GeneratedFeed) -> Result<(), StoreError> {
        if let Some((turn, agent)) = &self.duplicate_feed_for {
            if self.faulty() && feed.turn_number == *turn && &feed.agent_handle == agent {
                return Err(StoreError::DuplicateFeed(feed.key()));
            }
        }
        self.inner.save_feed(feed)
    }

    fn load_feeds(&self, run_id: &str, turn_lt: u32) -> Result<Vec<GeneratedFeed>, StoreError> {
        self.inner.load_feeds(run_id, turn_lt)
    }

    fn load_turn_feeds(&self, run_id: &str, turn: u32) -> Result<Vec<GeneratedFeed>, StoreError> {
        self.inner.load_turn_feeds(run_id, turn)
    }

    fn save_actions(
        &self,
        run_id: &str,
        turn: u32,
        agent: &str,
        actions: &[AgentAction],
    ) -> Result<(), StoreError> {
        if let Some(limit) = self.fail_action_after {
            if self.faulty() && self.action_batches.load(Ordering::SeqCst) >= limit {
                return Err(StoreError::Unavailable("disk".into()));
            }
        }
        self.inner.save_actions(run_id, turn, agent, actions)?;
        self.action_batches.fetch_add(1, Ordering::SeqCst);
        let lose_ack = self
            .lost_action_acks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if self.faulty() && lose_ack {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        Ok(())
    }

    fn load_actions(&self, run_id: &str, turn: u32) -> Result<Vec<AgentAction>, StoreError> {
        self.inner.load_actions(run_id, turn)
    }

    fn load_follow_graph(&self, run_id: &str) -> Result<FollowGraph, StoreError> {
        self.inner.load_follow_graph(run_id)
    }

    fn save_follow_graph(&self, run_id: &str, graph: &FollowGraph) -> Result<(), StoreError> {
        if self.faulty() && self.fail_follow_graph {
            return Err(StoreError::Unavailable("disk".into()));
        }
        self.inner.save_follow_graph(run_id, graph)
    }

    fn save_turn_metadata(&self, metadata: &TurnMetadata) -> Result<(), StoreError> {
        if self.faulty() && self.fail_metadata_turn == Some(metadata.turn_number) {
            return Err(StoreError::Unavailable("disk full".into()));
        }
        self.inner.save_turn_metadata(metadata)
    }

    fn load_turn_metadata(
        &self,
        run_id: &str,
        turn: u32,
    ) -> Result<Option<TurnMetadata>, StoreError> {
        self.inner.load_turn_metadata(run_id, turn)
    }

    fn list_turn_metadata(&self, run_id: &str) -> Result<Vec<TurnMetadata>, StoreError> {
        self.inner.list_turn_metadata(run_id)
    }
}

/// An orchestrator over `posts` with every strategy available.
pub fn orchestrator(
    store: Arc<dyn PersistenceStore>,
    posts: Vec<Post>,
    reasoner: Arc<dyn AgentReasoner>,
) -> RunOrchestrator {
    let selectors = build_selectors(
        FeedStrategy::all(),
        Arc::new(HashingEmbedder::default()),
        &posts,
        &FeedsConfig::default(),
    )
    .unwrap();
    let corpus = Arc::new(InMemoryCorpus::new(posts).unwrap());
    RunOrchestrator::new(store, corpus, selectors, reasoner)
        .with_session_config(SessionConfig {
            timeout_ms: 200,
            max_concurrent_agents: 2,
            update_beliefs: true,
        })
        .with_retry(RetryPolicy::new(2, Duration::from_millis(1)))
}

pub fn profiles(handles: &[&str]) -> Vec<AgentProfile> {
    handles.iter().map(|h| AgentProfile::new(*h)).collect()
}

/// URIs of the feed for `key`, if one was saved.
pub fn feed_uris(store: &dyn PersistenceStore, key: &FeedKey) -> Option<Vec<String>> {
    store
        .load_turn_feeds(&key.run_id, key.turn_number)
        .unwrap()
        .into_iter()
        .find(|f| &f.key() == key)
        .map(|f| f.post_uris)
}
