//! The feed selection contract shared by all ranking strategies.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use sim_records::{AgentProfile, FeedStrategy, Post};

use crate::config::FeedsConfig;
use crate::embedding::EmbeddingProvider;
use crate::{Chronological, FeedError, SimilarityRag};

/// A ranking strategy producing an ordered feed from a candidate pool.
///
/// Implementations must:
/// - fail with [`FeedError::Configuration`] when `k == 0`
/// - never return a post written by `agent`
/// - never return a post whose URI is in `exclude`
/// - return at most `k` posts, and an empty feed (not an error) when nothing
///   is eligible
pub trait FeedSelector: Send + Sync {
    fn strategy(&self) -> FeedStrategy;

    fn select(
        &self,
        candidates: &[Post],
        agent: &AgentProfile,
        exclude: &HashSet<String>,
        k: usize,
    ) -> Result<Vec<Post>, FeedError>;
}

/// Selectors keyed by strategy, iterated in strategy order.
pub type SelectorSet = BTreeMap<FeedStrategy, Arc<dyn FeedSelector>>;

/// Builds one selector per requested strategy.
///
/// `corpus` is the full post list; the similarity strategy derives each
/// author's interest vector from it.
pub fn build_selectors<'a>(
    strategies: impl IntoIterator<Item = &'a FeedStrategy>,
    embedder: Arc<dyn EmbeddingProvider>,
    corpus: &[Post],
    config: &FeedsConfig,
) -> Result<SelectorSet, FeedError> {
    let mut set = SelectorSet::new();
    for strategy in strategies {
        let selector: Arc<dyn FeedSelector> = match strategy {
            FeedStrategy::Chronological => Arc::new(Chronological::new()),
            FeedStrategy::SimilarityRag => Arc::new(
                SimilarityRag::from_corpus(embedder.clone(), corpus)?
                    .with_config(config.similarity.clone()),
            ),
        };
        set.insert(*strategy, selector);
    }
    Ok(set)
}

/// Candidates not written by `agent` and not in `exclude`.
pub fn eligible_candidates<'a>(
    candidates: &'a [Post],
    agent: &AgentProfile,
    exclude: &HashSet<String>,
) -> Vec<&'a Post> {
    candidates
        .iter()
        .filter(|p| !p.is_authored_by(&agent.handle) && !exclude.contains(&p.uri))
        .collect()
}

/// Rejects a zero feed size.
pub(crate) fn check_k(k: usize) -> Result<(), FeedError> {
    if k == 0 {
        return Err(FeedError::Configuration(k));
    }
    Ok(())
}

/// Keeps the first `k` items under `cmp`, sorted.
///
/// `cmp` must be a total order for the result to be exact.
pub(crate) fn top_k_by<T, F>(mut items: Vec<T>, k: usize, mut cmp: F) -> Vec<T>
where
    F: FnMut(&T, &T) -> Ordering,
{
    if items.len() > k {
        items.select_nth_unstable_by(k - 1, &mut cmp);
        items.truncate(k);
    }
    items.sort_by(cmp);
    items
}

/// Newest first, then URI ascending.
pub(crate) fn newest_first(a: &Post, b: &Post) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.uri.cmp(&b.uri))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashingEmbedder;
    use sim_records::fixtures;

    #[test]
    fn test_eligible_filters_author_and_excluded() {
        let mut posts = fixtures::posts_by("c", 3);
        posts.extend(fixtures::posts_by("a", 1).into_iter().map(|mut p| {
            p.uri = "own".into();
            p
        }));
        let agent = AgentProfile::new("a");
        let exclude: HashSet<String> = ["p2".to_string()].into();

        let eligible = eligible_candidates(&posts, &agent, &exclude);
        let uris: Vec<&str> = eligible.iter().map(|p| p.uri.as_str()).collect();
        assert_eq!(uris, vec!["p1", "p3"]);
    }

    #[test]
    fn test_top_k_matches_full_sort() {
        let items: Vec<i32> = vec![5, 3, 9, 1, 7, 2, 8];
        let top = top_k_by(items.clone(), 3, |a, b| b.cmp(a));
        assert_eq!(top, vec![9, 8, 7]);

        let all = top_k_by(items, 10, |a, b| a.cmp(b));
        assert_eq!(all, vec![1, 2, 3, 5, 7, 8, 9]);
    }

    #[test]
    fn test_check_k() {
        assert!(matches!(check_k(0), Err(FeedError::Configuration(0))));
        assert!(check_k(1).is_ok());
    }

    #[test]
    fn test_build_selectors_covers_requested_strategies() {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::default());
        let posts = fixtures::sample_posts();
        let set = build_selectors(
            FeedStrategy::all(),
            embedder,
            &posts,
            &FeedsConfig::default(),
        )
        .unwrap();
        assert_eq!(set.len(), 2);
        for (strategy, selector) in &set {
            assert_eq!(selector.strategy(), *strategy);
        }
    }
}
