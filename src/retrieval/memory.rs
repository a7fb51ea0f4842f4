//! In-process vector index and a deterministic offline embedder.
//!
//! Used for tests and for running the tool layer without a hosted index.
//! The index does an exact linear scan with cosine similarity.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use crate::core::record::fold_label;
use crate::error::RetrievalError;
use crate::retrieval::{Embedder, ScoredMatch, VectorIndex};

/// Dimensions produced by [`HashEmbedder::default`].
pub const DEFAULT_HASH_DIMENSIONS: usize = 256;

/// Cosine similarity of two vectors; zero when either has no magnitude or
/// the lengths differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Bag-of-words feature-hashing embedder.
///
/// Tokens are accent-folded and lowercased, so "Educação" and "educacao"
/// land in the same bucket. Not semantic; good enough for exact-ish lookups.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_HASH_DIMENSIONS,
        }
    }
}

impl HashEmbedder {
    /// Creates an embedder with the given output width (at least 1).
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embeds synchronously.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        let folded = fold_label(text);
        for token in folded
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(self.vectorize(text))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    text: String,
    reference: Option<String>,
    vector: Vec<f32>,
}

/// Exact-search index held in memory. Read-only once built.
#[derive(Debug, Clone)]
pub struct InMemoryIndex {
    name: String,
    entries: Vec<Entry>,
}

impl InMemoryIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Builds an index from plain passages, ids assigned as `{name}-{n}`.
    #[must_use]
    pub fn from_texts(name: impl Into<String>, embedder: &HashEmbedder, texts: &[&str]) -> Self {
        let mut index = Self::new(name);
        for (i, text) in texts.iter().enumerate() {
            let id = format!("{}-{}", index.name, i + 1);
            index.insert(id, *text, None, embedder.vectorize(text));
        }
        index
    }

    /// Adds a passage.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        text: impl Into<String>,
        reference: Option<String>,
        vector: Vec<f32>,
    ) {
        self.entries.push(Entry {
            id: id.into(),
            text: text.into(),
            reference,
            vector,
        });
    }

    /// Number of stored passages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredMatch>, RetrievalError> {
        let mut scored: Vec<ScoredMatch> = self
            .entries
            .iter()
            .map(|e| ScoredMatch {
                id: e.id.clone(),
                score: cosine_similarity(vector, &e.vector),
                text: e.text.clone(),
                reference: e.reference.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}
