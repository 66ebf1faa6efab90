//! Interest-similarity ranking.
//!
//! Each agent gets a query vector: its configured profile embedding if it has
//! one, otherwise the mean embedding of the posts it authored, otherwise
//! (when enabled) the embedding of its bio. Eligible candidates are scored by
//! cosine similarity to that vector and the exact top `k` are kept.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use sim_records::{AgentProfile, FeedStrategy, Post};

use crate::config::SimilarityConfig;
use crate::embedding::{cosine_similarity, mean_vector, post_embedding, EmbeddingProvider};
use crate::selector::{check_k, eligible_candidates, newest_first, top_k_by};
use crate::{FeedError, FeedSelector};

/// A candidate with its similarity to the agent's query vector.
#[derive(Debug, Clone)]
struct ScoredPost<'a> {
    post: &'a Post,
    score: f32,
}

/// Ranks by similarity descending, then `created_at` descending, then URI.
pub struct SimilarityRag {
    embedder: Arc<dyn EmbeddingProvider>,
    /// Mean embedding of each author's posts
    authored: HashMap<String, Vec<f32>>,
    config: SimilarityConfig,
}

impl std::fmt::Debug for SimilarityRag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityRag")
            .field("authors", &self.authored.len())
            .field("config", &self.config)
            .finish()
    }
}

impl SimilarityRag {
    /// Creates a selector with no authored-post vectors.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            authored: HashMap::new(),
            config: SimilarityConfig::default(),
        }
    }

    /// Creates a selector that knows every author's mean post embedding.
    pub fn from_corpus(
        embedder: Arc<dyn EmbeddingProvider>,
        posts: &[Post],
    ) -> Result<Self, FeedError> {
        let mut by_author: BTreeMap<&str, Vec<Vec<f32>>> = BTreeMap::new();
        for post in posts {
            let vector = post_embedding(embedder.as_ref(), post)?;
            by_author
                .entry(post.author_handle.as_str())
                .or_default()
                .push(vector);
        }

        let mut authored = HashMap::with_capacity(by_author.len());
        for (author, vectors) in by_author {
            match mean_vector(vectors.iter().map(Vec::as_slice)) {
                Some(mean) => {
                    authored.insert(author.to_string(), mean);
                }
                None => tracing::warn!(
                    author,
                    "skipping author interest vector: mixed embedding dimensions"
                ),
            }
        }

        Ok(Self {
            embedder,
            authored,
            config: SimilarityConfig::default(),
        })
    }

    pub fn with_config(mut self, config: SimilarityConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolves the interest vector for `agent`, if any source is available.
    pub fn query_vector(&self, agent: &AgentProfile) -> Result<Option<Vec<f32>>, FeedError> {
        if let Some(v) = &agent.profile_embedding {
            return Ok(Some(v.clone()));
        }
        if let Some(v) = self.authored.get(&agent.handle) {
            return Ok(Some(v.clone()));
        }
        if self.config.bio_fallback && !agent.bio.trim().is_empty() {
            return Ok(Some(self.embedder.embed(&agent.bio)?));
        }
        Ok(None)
    }

    fn score<'a>(
        &self,
        query: Option<&[f32]>,
        post: &'a Post,
    ) -> Result<ScoredPost<'a>, FeedError> {
        let Some(query) = query else {
            return Ok(ScoredPost { post, score: 0.0 });
        };
        let vector = post_embedding(self.embedder.as_ref(), post)?;
        if vector.len() != query.len() {
            return Err(FeedError::DimensionMismatch {
                uri: post.uri.clone(),
                expected: query.len(),
                actual: vector.len(),
            });
        }
        Ok(ScoredPost {
            post,
            score: cosine_similarity(query, &vector),
        })
    }
}

impl FeedSelector for SimilarityRag {
    fn strategy(&self) -> FeedStrategy {
        FeedStrategy::SimilarityRag
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
        if eligible.is_empty() {
            return Ok(Vec::new());
        }

        let query = self.query_vector(agent)?;
        if query.is_none() {
            tracing::debug!(
                agent = %agent.handle,
                "no interest vector; similarity feed falls back to recency"
            );
        }

        let scored = eligible
            .into_iter()
            .map(|post| self.score(query.as_deref(), post))
            .collect::<Result<Vec<_>, _>>()?;

        let top = top_k_by(scored, k, |a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| newest_first(a.post, b.post))
        });

        tracing::debug!(
            agent = %agent.handle,
            selected = top.len(),
            best = top.first().map(|s| s.score).unwrap_or(0.0),
            "similarity feed built"
        );
        Ok(top.into_iter().map(|s| s.post.clone()).collect())
    }
}
