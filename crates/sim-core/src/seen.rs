//! Seen Posts
//!
//! What each agent has already been shown in a run is derived from the
//! persisted feed log rather than kept as mutable state. The index for turn
//! `t` is the union of every feed of that run with turn number below `t`.
//!
//! The index is loaded once per turn and shared by every agent in the turn,
//! so two agents in the same turn may both be shown a post. Repeats are only
//! prevented across turns for the same agent.

use std::collections::{HashMap, HashSet};

use sim_records::GeneratedFeed;

use crate::store::{PersistenceStore, StoreError};

/// Agent handle -> URIs shown to that agent in earlier turns.
pub type SeenIndex = HashMap<String, HashSet<String>>;

/// Unions the post URIs of `feeds` with `turn_number < before_turn`, per agent.
pub fn build_seen_index<'a>(
    feeds: impl IntoIterator<Item = &'a GeneratedFeed>,
    before_turn: u32,
) -> SeenIndex {
    let mut index = SeenIndex::new();
    for feed in feeds {
        if feed.turn_number >= before_turn {
            continue;
        }
        index
            .entry(feed.agent_handle.clone())
            .or_default()
            .extend(feed.post_uris.iter().cloned());
    }
    index
}

/// Loads seen indexes from a store.
pub struct SeenPostsTracker<'a> {
    store: &'a dyn PersistenceStore,
}

impl<'a> SeenPostsTracker<'a> {
    pub fn new(store: &'a dyn PersistenceStore) -> Self {
        Self { store }
    }

    /// The seen index at the start of `turn_number`. Reads only.
    pub fn load(&self, run_id: &str, turn_number: u32) -> Result<SeenIndex, StoreError> {
        let feeds = self.store.load_feeds(run_id, turn_number)?;
        let index = build_seen_index(&feeds, turn_number);
        tracing::debug!(
            run_id,
            turn = turn_number,
            feeds = feeds.len(),
            agents = index.len(),
            "loaded seen index"
        );
        Ok(index)
    }
}
