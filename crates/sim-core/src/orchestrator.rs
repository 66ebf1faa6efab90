//! Run Orchestrator
//!
//! Drives a run turn by turn. Each turn:
//!
//! 1. loads one seen index from the feeds of earlier turns
//! 2. builds and persists every agent's feeds, in roster order
//! 3. runs the agents' sessions on a bounded pool, each under a timeout
//! 4. persists actions and follow edges in roster order, then the turn
//!    summary
//!
//! A turn only starts once the previous one is fully recorded. A failed or
//! timed-out session records nothing for that agent and the turn carries on.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use feeds::{FeedSelector, PostCorpusProvider, SelectorSet};
use sim_records::{
    count_actions, AgentAction, AgentProfile, FeedKey, FeedStrategy, GeneratedFeed, Post, Run,
    RunConfig, RunStatus, TurnMetadata, TurnResult,
};

use crate::config::SessionConfig;
use crate::follow_graph::FollowGraph;
use crate::reasoner::{AgentReasoner, BeliefState, ReasoningError};
use crate::roster::build_roster;
use crate::seen::{SeenIndex, SeenPostsTracker};
use crate::session::{AgentSession, SessionOutput};
use crate::store::{PersistenceStore, RetryPolicy, StoreError};
use crate::SimError;

/// Where the orchestrator is in its current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Initialized,
    TurnInProgress(u32),
    TurnComplete(u32),
    RunComplete,
}

/// Outcome of a run driven to completion.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run: Run,
    /// Results of the turns executed by this call
    pub turns: Vec<TurnResult>,
}

/// A persisted feed with its posts.
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedFeed {
    pub feed: GeneratedFeed,
    pub posts: Vec<Post>,
}

/// Everything recorded for one completed turn.
#[derive(Debug, Clone)]
pub struct TurnData {
    pub metadata: TurnMetadata,
    /// Agent handle -> feeds, in strategy order
    pub feeds: BTreeMap<String, Vec<HydratedFeed>>,
    /// Agent handle -> actions, in write order
    pub actions: BTreeMap<String, Vec<AgentAction>>,
}

/// One agent's work for the session phase.
struct PendingSession {
    handle: String,
    session: AgentSession,
    posts: Vec<Post>,
}

pub struct RunOrchestrator {
    store: Arc<dyn PersistenceStore>,
    corpus: Arc<dyn PostCorpusProvider>,
    selectors: SelectorSet,
    reasoner: Arc<dyn AgentReasoner>,
    session: SessionConfig,
    retry: RetryPolicy,
    phase: RunPhase,
    beliefs: HashMap<String, BeliefState>,
}

impl RunOrchestrator {
    pub fn new(
        store: Arc<dyn PersistenceStore>,
        corpus: Arc<dyn PostCorpusProvider>,
        selectors: SelectorSet,
        reasoner: Arc<dyn AgentReasoner>,
    ) -> Self {
        Self {
            store,
            corpus,
            selectors,
            reasoner,
            session: SessionConfig::default(),
            retry: RetryPolicy::default(),
            phase: RunPhase::Initialized,
            beliefs: HashMap::new(),
        }
    }

    pub fn with_session_config(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn store(&self) -> &Arc<dyn PersistenceStore> {
        &self.store
    }

    /// Beliefs accumulated for `agent` during the current run.
    pub fn beliefs(&self, agent: &str) -> Option<&BeliefState> {
        self.beliefs.get(agent)
    }

    /// Creates a run and executes all of its turns.
    pub async fn execute_run(
        &mut self,
        config: &RunConfig,
        profiles: &[AgentProfile],
    ) -> Result<RunSummary, SimError> {
        self.check_config(config)?;
        let roster = build_roster(profiles, config.num_agents)?;
        let run = Run::start(config)?;
        self.retry
            .run("create_run", || self.store.create_run(&run))
            .await?;

        self.phase = RunPhase::Initialized;
        self.beliefs.clear();
        tracing::info!(
            run_id = %run.run_id,
            agents = roster.len(),
            turns = run.num_turns,
            k = run.feed_size_k,
            "run started"
        );
        self.drive(run, &roster, 0, FollowGraph::new()).await
    }

    /// Continues a running run from its first unrecorded turn.
    pub async fn resume(
        &mut self,
        run_id: &str,
        profiles: &[AgentProfile],
    ) -> Result<RunSummary, SimError> {
        let run = self
            .store
            .get_run(run_id)?
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        if run.status != RunStatus::Running {
            return Err(SimError::NotResumable {
                run_id: run.run_id,
                status: run.status,
            });
        }
        self.check_config(&run.config())?;
        let roster = build_roster(profiles, run.num_agents)?;

        let done: BTreeSet<u32> = self
            .store
            .list_turn_metadata(run_id)?
            .into_iter()
            .map(|m| m.turn_number)
            .collect();
        let first = (0..run.num_turns)
            .find(|t| !done.contains(t))
            .unwrap_or(run.num_turns);
        let graph = self.store.load_follow_graph(run_id)?;

        self.phase = match first {
            0 => RunPhase::Initialized,
            t => RunPhase::TurnComplete(t - 1),
        };
        self.beliefs.clear();
        tracing::info!(run_id, from_turn = first, "resuming run");
        self.drive(run, &roster, first, graph).await
    }

    /// Runs turns `first..num_turns`, then marks the run completed.
    async fn drive(
        &mut self,
        run: Run,
        roster: &[AgentProfile],
        first: u32,
        mut graph: FollowGraph,
    ) -> Result<RunSummary, SimError> {
        let mut turns = Vec::new();
        for turn in first..run.num_turns {
            match self.run_turn(&run, roster, turn, &mut graph).await {
                Ok(result) => turns.push(result),
                Err(e) => return Err(self.fail_turn(&run, turn, e).await),
            }
        }

        let run_id = run.run_id.as_str();
        let run = self
            .retry
            .run("update_run_status", || {
                self.store.update_run_status(run_id, RunStatus::Completed)
            })
            .await?;
        self.phase = RunPhase::RunComplete;
        tracing::info!(run_id = %run.run_id, turns = turns.len(), "run completed");
        Ok(RunSummary { run, turns })
    }

    /// Wraps a turn error. A duplicate feed marks the run failed; other
    /// errors leave it running so it can be resumed.
    async fn fail_turn(&self, run: &Run, turn: u32, error: SimError) -> SimError {
        let run_id = run.run_id.as_str();
        if matches!(error, SimError::Store(StoreError::DuplicateFeed(_))) {
            tracing::error!(run_id, turn, error = %error, "consistency violation; failing run");
            if let Err(e) = self
                .retry
                .run("update_run_status", || {
                    self.store.update_run_status(run_id, RunStatus::Failed)
                })
                .await
            {
                tracing::error!(run_id, error = %e, "could not mark run failed");
            }
        } else {
            tracing::error!(run_id, turn, error = %error, "turn failed; run can be resumed");
        }
        SimError::TurnFailed {
            run_id: run.run_id.clone(),
            turn,
            source: Box::new(error),
        }
    }

    /// Executes one turn of `run`, updating `graph` with new follows.
    pub async fn run_turn(
        &mut self,
        run: &Run,
        roster: &[AgentProfile],
        turn: u32,
        graph: &mut FollowGraph,
    ) -> Result<TurnResult, SimError> {
        let started = Instant::now();
        let run_id = run.run_id.as_str();
        self.phase = RunPhase::TurnInProgress(turn);
        tracing::info!(run_id, turn, agents = roster.len(), "turn started");

        let store = self.store.as_ref();
        let seen = self
            .retry
            .run("load_seen", || SeenPostsTracker::new(store).load(run_id, turn))
            .await?;
        let existing: HashMap<FeedKey, GeneratedFeed> = self
            .retry
            .run("load_turn_feeds", || store.load_turn_feeds(run_id, turn))
            .await?
            .into_iter()
            .map(|f| (f.key(), f))
            .collect();
        let recorded = self
            .retry
            .run("load_actions", || store.load_actions(run_id, turn))
            .await?;

        // Actions are written per agent in one batch, so an agent with
        // recorded actions finished this turn before an interruption
        let mut acted = HashSet::new();
        for action in &recorded {
            acted.insert(action.agent_handle.clone());
            if let Some(target) = &action.target_handle {
                graph.follow(&action.agent_handle, target);
            }
        }

        let mut duplicate = None;
        let mut pending = Vec::with_capacity(roster.len());
        for agent in roster {
            if acted.contains(&agent.handle) {
                tracing::info!(run_id, turn, agent = %agent.handle, "actions already recorded; skipping agent");
                continue;
            }
            match self.prepare_feeds(run, turn, agent, &seen, &existing).await {
                Ok(posts) => {
                    let session = AgentSession::new(
                        run_id,
                        turn,
                        agent.clone(),
                        graph.following(&agent.handle),
                    )
                    .with_beliefs(self.beliefs.get(&agent.handle).cloned().unwrap_or_default())
                    .with_belief_update(self.session.update_beliefs);
                    pending.push(PendingSession {
                        handle: agent.handle.clone(),
                        session,
                        posts,
                    });
                }
                Err(SimError::Store(StoreError::DuplicateFeed(key))) => {
                    tracing::error!(run_id, turn, agent = %agent.handle, %key, "feed already exists; halting agent for this turn");
                    duplicate.get_or_insert(StoreError::DuplicateFeed(key));
                }
                Err(e) => return Err(e),
            }
        }

        let handles: Vec<String> = pending.iter().map(|p| p.handle.clone()).collect();
        let mut outcomes = self.run_sessions(pending).await;

        let mut failed_agents = Vec::new();
        for handle in handles {
            match outcomes.remove(&handle) {
                Some(Ok(output)) => self.record_output(run_id, turn, &handle, output, graph).await?,
                Some(Err(e)) => {
                    tracing::error!(run_id, turn, agent = %handle, error = %e, "agent session failed; recording no actions");
                    failed_agents.push(handle);
                }
                None => {
                    tracing::error!(run_id, turn, agent = %handle, "agent session aborted; recording no actions");
                    failed_agents.push(handle);
                }
            }
        }

        let snapshot: &FollowGraph = graph;
        self.retry
            .run("save_follow_graph", || {
                self.store.save_follow_graph(run_id, snapshot)
            })
            .await?;

        if let Some(e) = duplicate {
            return Err(e.into());
        }

        let actions = self
            .retry
            .run("load_actions", || self.store.load_actions(run_id, turn))
            .await?;
        let total_actions = count_actions(&actions);
        let metadata = TurnMetadata::new(run_id, turn, total_actions.clone());
        self.retry
            .run("save_turn_metadata", || self.store.save_turn_metadata(&metadata))
            .await?;

        self.phase = RunPhase::TurnComplete(turn);
        let result = TurnResult {
            turn_number: turn,
            total_actions,
            execution_time_ms: Some(started.elapsed().as_millis() as u64),
            failed_agents,
        };
        tracing::info!(
            run_id,
            turn,
            actions = result.action_total(),
            failed = result.failed_agents.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "turn complete"
        );
        Ok(result)
    }

    /// Builds and persists one feed per strategy for `agent`, reusing feeds
    /// already persisted for this turn. Returns the union of the feeds'
    /// posts in strategy order, without repeats.
    async fn prepare_feeds(
        &self,
        run: &Run,
        turn: u32,
        agent: &AgentProfile,
        seen: &SeenIndex,
        existing: &HashMap<FeedKey, GeneratedFeed>,
    ) -> Result<Vec<Post>, SimError> {
        let empty = HashSet::new();
        let exclude = seen.get(&agent.handle).unwrap_or(&empty);
        let candidates = self.corpus.get_candidates(&agent.handle)?;

        let mut posts = Vec::new();
        let mut included = HashSet::new();
        for strategy in &run.strategies {
            let key = FeedKey::new(run.run_id.clone(), turn, agent.handle.clone(), *strategy);
            let feed_posts = match existing.get(&key) {
                Some(feed) => {
                    tracing::debug!(%key, "reusing persisted feed");
                    self.hydrate(feed)?
                }
                None => {
                    let selector = self.selector(*strategy)?;
                    let selected =
                        selector.select(&candidates, agent, exclude, run.feed_size_k)?;
                    let feed = GeneratedFeed::new(
                        &key,
                        selected.iter().map(|p| p.uri.clone()).collect(),
                    );
                    self.retry
                        .run("save_feed", || self.store.save_feed(&feed))
                        .await?;
                    tracing::debug!(
                        run_id = %run.run_id,
                        turn,
                        agent = %agent.handle,
                        strategy = %strategy,
                        size = feed.len(),
                        excluded = exclude.len(),
                        "feed saved"
                    );
                    selected
                }
            };
            for post in feed_posts {
                if included.insert(post.uri.clone()) {
                    posts.push(post);
                }
            }
        }
        Ok(posts)
    }

    /// Runs sessions concurrently, at most `max_concurrent_agents` at once.
    /// Tasks that panic have no entry in the result.
    async fn run_sessions(
        &self,
        pending: Vec<PendingSession>,
    ) -> HashMap<String, Result<SessionOutput, ReasoningError>> {
        let semaphore = Arc::new(Semaphore::new(self.session.max_concurrent_agents.max(1)));
        let timeout = self.session.timeout();
        let mut tasks = JoinSet::new();

        for PendingSession {
            handle,
            session,
            posts,
        } in pending
        {
            let reasoner = Arc::clone(&self.reasoner);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        match tokio::time::timeout(timeout, session.run(&posts, reasoner.as_ref()))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(ReasoningError::Timeout(timeout)),
                        }
                    }
                    Err(_) => Err(ReasoningError::Failure("session pool closed".into())),
                };
                (handle, outcome)
            });
        }

        let mut outcomes = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((handle, outcome)) => {
                    outcomes.insert(handle, outcome);
                }
                Err(e) => tracing::error!(error = %e, "agent session task panicked"),
            }
        }
        outcomes
    }

    /// Persists a session's actions as one batch and applies its follows.
    async fn record_output(
        &mut self,
        run_id: &str,
        turn: u32,
        handle: &str,
        output: SessionOutput,
        graph: &mut FollowGraph,
    ) -> Result<(), SimError> {
        let saved = self
            .retry
            .run("save_actions", || {
                self.store.save_actions(run_id, turn, handle, &output.actions)
            })
            .await;
        match saved {
            Ok(()) => {}
            // A write whose acknowledgement was lost and then retried
            Err(StoreError::DuplicateAction(_) | StoreError::DuplicateActionBatch { .. })
                if self.batch_recorded(run_id, turn, handle, &output.actions)? =>
            {
                tracing::warn!(run_id, turn, agent = handle, "actions already recorded by an earlier attempt");
            }
            Err(e) => return Err(e.into()),
        }
        for target in output.follows() {
            if !graph.follow(handle, target) {
                tracing::warn!(run_id, turn, agent = handle, followed = target, "follow already present");
            }
        }
        tracing::info!(
            run_id,
            turn,
            agent = handle,
            actions = output.actions.len(),
            dropped = output.dropped.len(),
            "agent session complete"
        );
        if let Some(delta) = output.belief_delta {
            self.beliefs.entry(handle.to_string()).or_default().apply(delta);
        }
        Ok(())
    }

    /// Whether the store holds exactly `actions` for `handle` in `turn`.
    fn batch_recorded(
        &self,
        run_id: &str,
        turn: u32,
        handle: &str,
        actions: &[AgentAction],
    ) -> Result<bool, SimError> {
        let stored: HashSet<String> = self
            .store
            .load_actions(run_id, turn)?
            .into_iter()
            .filter(|a| a.agent_handle == handle)
            .map(|a| a.action_id)
            .collect();
        Ok(stored.len() == actions.len() && actions.iter().all(|a| stored.contains(&a.action_id)))
    }

    fn selector(&self, strategy: FeedStrategy) -> Result<&dyn FeedSelector, SimError> {
        self.selectors
            .get(&strategy)
            .map(|s| s.as_ref())
            .ok_or_else(|| SimError::Configuration(format!("no selector for strategy '{}'", strategy)))
    }

    fn check_config(&self, config: &RunConfig) -> Result<(), SimError> {
        config
            .validate()
            .map_err(|e| SimError::Configuration(e.to_string()))?;
        for strategy in &config.feed_strategies {
            self.selector(*strategy)?;
        }
        Ok(())
    }

    /// Resolves a feed's URIs against the corpus, in feed order.
    pub fn hydrate(&self, feed: &GeneratedFeed) -> Result<Vec<Post>, SimError> {
        feed.post_uris
            .iter()
            .enumerate()
            .map(|(index, uri)| {
                self.corpus
                    .get_post(uri)?
                    .ok_or_else(|| SimError::MissingPost {
                        agent: feed.agent_handle.clone(),
                        feed_id: feed.feed_id.clone(),
                        index,
                        uri: uri.clone(),
                    })
            })
            .collect()
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<Run>, SimError> {
        Ok(self.store.get_run(run_id)?)
    }

    pub fn list_runs(&self) -> Result<Vec<Run>, SimError> {
        Ok(self.store.list_runs()?)
    }

    /// Feeds and actions of a recorded turn, or `None` if the turn has no
    /// summary.
    pub fn get_turn_data(&self, run_id: &str, turn: u32) -> Result<Option<TurnData>, SimError> {
        let Some(metadata) = self.store.load_turn_metadata(run_id, turn)? else {
            return Ok(None);
        };

        let mut feeds: BTreeMap<String, Vec<HydratedFeed>> = BTreeMap::new();
        for feed in self.store.load_turn_feeds(run_id, turn)? {
            let posts = self.hydrate(&feed)?;
            feeds
                .entry(feed.agent_handle.clone())
                .or_default()
                .push(HydratedFeed { feed, posts });
        }
        for list in feeds.values_mut() {
            list.sort_by_key(|h| h.feed.strategy);
        }

        let mut actions: BTreeMap<String, Vec<AgentAction>> = BTreeMap::new();
        for action in self.store.load_actions(run_id, turn)? {
            actions
                .entry(action.agent_handle.clone())
                .or_default()
                .push(action);
        }

        Ok(Some(TurnData {
            metadata,
            feeds,
            actions,
        }))
    }
}
