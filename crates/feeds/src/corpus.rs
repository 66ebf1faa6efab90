//! Post corpus providers.
//!
//! The corpus is read-only during a run. Providers hand out candidate pools
//! with the requesting agent's own posts already removed.

use std::collections::HashMap;
use std::path::Path;

use sim_records::{Post, RecordError};

/// Errors raised while loading or reading a corpus.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A line of a JSONL corpus could not be parsed.
    #[error("invalid post on line {line}: {source}")]
    InvalidPost { line: usize, source: RecordError },
    /// Two posts share the same URI.
    #[error("duplicate post uri '{0}'")]
    DuplicateUri(String),
}

/// Read-only source of candidate posts.
pub trait PostCorpusProvider: Send + Sync {
    /// Returns every post not written by `exclude_author`.
    fn get_candidates(&self, exclude_author: &str) -> Result<Vec<Post>, CorpusError>;

    /// Looks up a single post.
    fn get_post(&self, uri: &str) -> Result<Option<Post>, CorpusError>;

    /// Returns the whole corpus.
    fn all_posts(&self) -> Result<Vec<Post>, CorpusError>;
}

/// Corpus held entirely in memory, in load order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    posts: Vec<Post>,
    by_uri: HashMap<String, usize>,
}

impl InMemoryCorpus {
    /// Builds a corpus, rejecting duplicate URIs.
    pub fn new(posts: Vec<Post>) -> Result<Self, CorpusError> {
        let mut by_uri = HashMap::with_capacity(posts.len());
        for (idx, post) in posts.iter().enumerate() {
            if by_uri.insert(post.uri.clone(), idx).is_some() {
                return Err(CorpusError::DuplicateUri(post.uri.clone()));
            }
        }
        Ok(Self { posts, by_uri })
    }

    /// Parses one post per non-empty line.
    pub fn from_jsonl_str(content: &str) -> Result<Self, CorpusError> {
        let mut posts = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let post = Post::from_jsonl(line)
                .map_err(|source| CorpusError::InvalidPost { line: idx + 1, source })?;
            posts.push(post);
        }
        Self::new(posts)
    }

    /// Loads a JSONL corpus file.
    pub fn from_jsonl_file(path: &Path) -> Result<Self, CorpusError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_jsonl_str(&content)
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }
}

impl PostCorpusProvider for InMemoryCorpus {
    fn get_candidates(&self, exclude_author: &str) -> Result<Vec<Post>, CorpusError> {
        Ok(self
            .posts
            .iter()
            .filter(|p| !p.is_authored_by(exclude_author))
            .cloned()
            .collect())
    }

    fn get_post(&self, uri: &str) -> Result<Option<Post>, CorpusError> {
        Ok(self.by_uri.get(uri).map(|&idx| self.posts[idx].clone()))
    }

    fn all_posts(&self) -> Result<Vec<Post>, CorpusError> {
        Ok(self.posts.clone())
    }
}
