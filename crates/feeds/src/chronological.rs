//! Newest-first ranking.

use std::collections::HashSet;

use sim_records::{AgentProfile, FeedStrategy, Post};

use crate::selector::{check_k, eligible_candidates, newest_first, top_k_by};
use crate::{FeedError, FeedSelector};

/// Sorts eligible posts by `created_at` descending, ties by URI ascending.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chronological;

impl Chronological {
    pub fn new() -> Self {
        Self
    }
}

impl FeedSelector for Chronological {
    fn strategy(&self) -> FeedStrategy {
        FeedStrategy::Chronological
    }

    fn select(
        &self,
        candidates: &[Post],
        agent: &AgentProfile,
        exclude: &HashSet<String>,
        k: usize,
    ) -> Result<Vec<Post>, FeedError> {
        check_k(k)?;
        let eligible = eligible_candidates(candidates, agent, exclude);
        let top = top_k_by(eligible, k, |a, b| newest_first(a, b));
        tracing::debug!(
            agent = %agent.handle,
            selected = top.len(),
            "chronological feed built"
        );
        Ok(top.into_iter().cloned().collect())
    }
}
