//! Feed selection: candidate pools and ranking strategies.
//!
//! Given a pool of candidate posts, an agent and the set of URIs that agent
//! has already been shown, a [`FeedSelector`] returns at most `k` posts in
//! display order. Selection is a pure function of its inputs; persistence and
//! turn sequencing live in `sim-core`.
//!
//! # Modules
//!
//! - [`corpus`]: read-only post sources
//! - [`embedding`]: embedding providers and vector math
//! - [`selector`]: the [`FeedSelector`] trait, eligibility filter and exact top-k
//! - [`chronological`]: newest-first ranking
//! - [`similarity`]: interest-similarity ranking
//! - [`config`]: TOML settings for embeddings and similarity ranking

pub mod chronological;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod selector;
pub mod similarity;

pub use chronological::Chronological;
pub use config::{EmbeddingConfig, FeedsConfig, SimilarityConfig};
pub use config::ConfigError as FeedsConfigError;
pub use corpus::{CorpusError, InMemoryCorpus, PostCorpusProvider};
pub use embedding::{
    cosine_similarity, mean_vector, post_embedding, EmbeddingError, EmbeddingProvider,
    HashingEmbedder,
};
pub use selector::{build_selectors, eligible_candidates, FeedSelector, SelectorSet};
pub use similarity::SimilarityRag;

/// Errors raised while building a feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Feed size must be at least one.
    #[error("configuration error: feed size k must be greater than 0 (got {0})")]
    Configuration(usize),
    /// The embedding provider could not produce a vector.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Query and candidate vectors disagree on dimensionality.
    #[error("embedding dimension mismatch for '{uri}': expected {expected}, got {actual}")]
    DimensionMismatch {
        uri: String,
        expected: usize,
        actual: usize,
    },
}
