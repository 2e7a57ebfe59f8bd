//! Embedding backend trait and vector utilities.
//!
//! Defines the [`EmbeddingBackend`] trait that all embedding providers
//! implement, plus pure helpers for similarity computation.
//!
//! Concrete backends (OpenAI-compatible, Ollama) live in the `vigil` app
//! crate. The knowledge base only ever sees the trait.

use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// Trait for embedding backends.
///
/// Implementations are created by the application and injected into
/// [`KnowledgeBase::build_index`](crate::knowledge::KnowledgeBase::build_index).
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality, or `0` if unknown.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
///
/// Convenience wrapper around [`EmbeddingBackend::embed`] for queries.
pub async fn embed_query(backend: &dyn EmbeddingBackend, text: &str) -> Result<Vec<f32>> {
    let results = backend.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
