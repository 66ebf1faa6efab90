//! Embedding providers and vector math.
//!
//! Embeddings are consumed, not trained, here. Posts may arrive with a
//! pre-computed vector; anything else is embedded on demand.

use sim_records::Post;

/// Errors raised by an embedding provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),
    #[error("cannot embed empty text")]
    EmptyText,
}

/// Supplies vectors for post text and agent interest queries.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Returns the post's cached embedding, or embeds its text.
pub fn post_embedding(
    provider: &dyn EmbeddingProvider,
    post: &Post,
) -> Result<Vec<f32>, EmbeddingError> {
    match &post.embedding {
        Some(v) => Ok(v.clone()),
        None => provider.embed(&post.text),
    }
}

/// Cosine similarity of two equal-length vectors.
///
/// Zero-norm vectors and non-finite results score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if sim.is_finite() {
        sim
    } else {
        0.0
    }
}

/// Element-wise mean. `None` for an empty input or mixed dimensions.
pub fn mean_vector<'a>(vectors: impl IntoIterator<Item = &'a [f32]>) -> Option<Vec<f32>> {
    let mut iter = vectors.into_iter();
    let first = iter.next()?;
    let mut sum: Vec<f32> = first.to_vec();
    let mut count = 1usize;
    for v in iter {
        if v.len() != sum.len() {
            return None;
        }
        for (s, x) in sum.iter_mut().zip(v) {
            *s += x;
        }
        count += 1;
    }
    let n = count as f32;
    sum.iter_mut().for_each(|s| *s /= n);
    Some(sum)
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it",
    "of", "on", "or", "that", "the", "this", "to", "was", "who", "with",
];

/// Deterministic bag-of-words embedder.
///
/// Lowercased alphanumeric tokens are hashed (FNV-1a) into a fixed number of
/// buckets and the counts are L2-normalised. Text with no usable tokens
/// embeds to the zero vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.dimensions as u64) as usize
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() || STOPWORDS.contains(&token) {
                continue;
            }
            vector[self.bucket(token)] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }
}
