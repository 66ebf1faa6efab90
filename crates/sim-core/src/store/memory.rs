//! In-memory persistence backend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use sim_records::{AgentAction, FeedKey, GeneratedFeed, Run, RunStatus, TurnMetadata};

use super::{PersistenceStore, StoreError};
use crate::follow_graph::FollowGraph;

/// Store held in memory behind read-write locks.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    runs: RwLock<BTreeMap<String, Run>>,
    feeds: RwLock<BTreeMap<FeedKey, GeneratedFeed>>,
    actions: RwLock<ActionLog>,
    graphs: RwLock<HashMap<String, FollowGraph>>,
    turns: RwLock<BTreeMap<(String, u32), TurnMetadata>>,
}

/// Actions in write order, with the keys that must stay unique.
#[derive(Debug, Default)]
struct ActionLog {
    records: Vec<AgentAction>,
    ids: HashSet<String>,
    /// (run, turn, agent) of every batch written
    batches: HashSet<(String, u32, String)>,
}

impl ActionLog {
    fn check(
        &self,
        run_id: &str,
        turn: u32,
        agent: &str,
        actions: &[AgentAction],
    ) -> Result<(), StoreError> {
        let mut batch_ids = HashSet::new();
        for action in actions {
            if action.run_id != run_id || action.turn_number != turn || action.agent_handle != agent
            {
                return Err(StoreError::MisplacedAction {
                    action_id: action.action_id.clone(),
                    run_id: run_id.to_string(),
                    turn,
                    agent: agent.to_string(),
                });
            }
            if self.ids.contains(&action.action_id) || !batch_ids.insert(&action.action_id) {
                return Err(StoreError::DuplicateAction(action.action_id.clone()));
            }
        }
        if !actions.is_empty()
            && self
                .batches
                .contains(&(run_id.to_string(), turn, agent.to_string()))
        {
            return Err(StoreError::DuplicateActionBatch {
                run_id: run_id.to_string(),
                turn,
                agent: agent.to_string(),
            });
        }
        Ok(())
    }

    /// Adds an action without checks. Returns false if its id is known.
    fn insert(&mut self, action: &AgentAction) -> bool {
        if !self.ids.insert(action.action_id.clone()) {
            return false;
        }
        self.batches.insert((
            action.run_id.clone(),
            action.turn_number,
            action.agent_handle.clone(),
        ));
        self.records.push(action.clone());
        true
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a feed exists for `key`.
    pub fn has_feed(&self, key: &FeedKey) -> Result<bool, StoreError> {
        Ok(read(&self.feeds)?.contains_key(key))
    }

    /// Inserts a record already known to be valid, replacing any run with
    /// the same id. Used when replaying a log where the last record wins.
    pub(crate) fn put_run(&self, run: Run) -> Result<(), StoreError> {
        write(&self.runs)?.insert(run.run_id.clone(), run);
        Ok(())
    }

    /// Checks that `actions` could be saved as a batch, without saving it.
    pub(crate) fn check_actions(
        &self,
        run_id: &str,
        turn: u32,
        agent: &str,
        actions: &[AgentAction],
    ) -> Result<(), StoreError> {
        read(&self.actions)?.check(run_id, turn, agent, actions)
    }

    /// Inserts a replayed action. Returns false, storing nothing, if an
    /// action with the same id is already known.
    pub(crate) fn put_action(&self, action: &AgentAction) -> Result<bool, StoreError> {
        Ok(write(&self.actions)?.insert(action))
    }

    /// All actions of a run across turns.
    pub fn all_actions(&self, run_id: &str) -> Result<Vec<AgentAction>, StoreError> {
        Ok(read(&self.actions)?
            .records
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect())
    }
}

impl PersistenceStore for InMemoryStore {
    fn create_run(&self, run: &Run) -> Result<(), StoreError> {
        let mut runs = write(&self.runs)?;
        if runs.contains_key(&run.run_id) {
            return Err(StoreError::DuplicateRun(run.run_id.clone()));
        }
        runs.insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<Run, StoreError> {
        let mut runs = write(&self.runs)?;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        run.transition(status)?;
        Ok(run.clone())
    }

    fn get_run(&self, run_id: &str) -> Result<Option<Run>, StoreError> {
        Ok(read(&self.runs)?.get(run_id).cloned())
    }

    fn list_runs(&self) -> Result<Vec<Run>, StoreError> {
        let mut runs: Vec<Run> = read(&self.runs)?.values().cloned().collect();
        runs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        Ok(runs)
    }

    fn save_feed(&self, feed: &GeneratedFeed) -> Result<(), StoreError> {
        let key = feed.key();
        let mut feeds = write(&self.feeds)?;
        if feeds.contains_key(&key) {
            return Err(StoreError::DuplicateFeed(key));
        }
        feeds.insert(key, feed.clone());
        Ok(())
    }

    fn load_feeds(&self, run_id: &str, turn_lt: u32) -> Result<Vec<GeneratedFeed>, StoreError> {
        Ok(read(&self.feeds)?
            .values()
            .filter(|f| f.run_id == run_id && f.turn_number < turn_lt)
            .cloned()
            .collect())
    }

    fn load_turn_feeds(&self, run_id: &str, turn: u32) -> Result<Vec<GeneratedFeed>, StoreError> {
        Ok(read(&self.feeds)?
            .values()
            .filter(|f| f.run_id == run_id && f.turn_number == turn)
            .cloned()
            .collect())
    }

    fn save_actions(
        &self,
        run_id: &str,
        turn: u32,
        agent: &str,
        actions: &[AgentAction],
    ) -> Result<(), StoreError> {
        let mut log = write(&self.actions)?;
        log.check(run_id, turn, agent, actions)?;
        for action in actions {
            log.insert(action);
        }
        Ok(())
    }

    fn load_actions(&self, run_id: &str, turn: u32) -> Result<Vec<AgentAction>, StoreError> {
        Ok(read(&self.actions)?
            .records
            .iter()
            .filter(|a| a.run_id == run_id && a.turn_number == turn)
            .cloned()
            .collect())
    }

    fn load_follow_graph(&self, run_id: &str) -> Result<FollowGraph, StoreError> {
        Ok(read(&self.graphs)?.get(run_id).cloned().unwrap_or_default())
    }

    fn save_follow_graph(&self, run_id: &str, graph: &FollowGraph) -> Result<(), StoreError> {
        write(&self.graphs)?.insert(run_id.to_string(), graph.clone());
        Ok(())
    }

    fn save_turn_metadata(&self, metadata: &TurnMetadata) -> Result<(), StoreError> {
        let key = (metadata.run_id.clone(), metadata.turn_number);
        let mut turns = write(&self.turns)?;
        if turns.contains_key(&key) {
            return Err(StoreError::DuplicateTurn {
                run_id: metadata.run_id.clone(),
                turn: metadata.turn_number,
            });
        }
        turns.insert(key, metadata.clone());
        Ok(())
    }

    fn load_turn_metadata(
        &self,
        run_id: &str,
        turn: u32,
    ) -> Result<Option<TurnMetadata>, StoreError> {
        Ok(read(&self.turns)?.get(&(run_id.to_string(), turn)).cloned())
    }

    fn list_turn_metadata(&self, run_id: &str) -> Result<Vec<TurnMetadata>, StoreError> {
        Ok(read(&self.turns)?
            .values()
            .filter(|m| m.run_id == run_id)
            .cloned()
            .collect())
    }
}
