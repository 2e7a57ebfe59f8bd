//! In-memory similarity index over a knowledge corpus.
//!
//! Vector search is brute-force cosine similarity over every document
//! vector. The index remembers the corpus version it was built from so the
//! knowledge base can ignore it once the corpus changes.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::embedding::{cosine_similarity, embed_query, EmbeddingBackend};
use crate::models::KnowledgeDocument;

struct IndexEntry {
    document: KnowledgeDocument,
    vector: Vec<f32>,
}

/// Embedding vectors for a corpus snapshot plus the backend that produced
/// them (needed to embed queries in the same space).
pub struct KnowledgeIndex {
    backend: Arc<dyn EmbeddingBackend>,
    entries: Vec<IndexEntry>,
    corpus_version: u64,
}

impl KnowledgeIndex {
    /// Embed every document and build the index.
    ///
    /// # Errors
    ///
    /// Fails if the corpus is empty, the backend errors, or the backend
    /// returns the wrong number or shape of vectors.
    pub async fn build(
        backend: Arc<dyn EmbeddingBackend>,
        documents: Vec<KnowledgeDocument>,
        corpus_version: u64,
    ) -> Result<Self> {
        if documents.is_empty() {
            bail!("cannot index an empty corpus");
        }

        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = backend.embed(&texts).await?;

        if vectors.len() != documents.len() {
            bail!(
                "embedding backend '{}' returned {} vectors for {} documents",
                backend.model_name(),
                vectors.len(),
                documents.len()
            );
        }

        let dims = backend.dims();
        if dims > 0 {
            if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
                bail!(
                    "embedding backend '{}' returned a {}-dim vector, expected {}",
                    backend.model_name(),
                    bad.len(),
                    dims
                );
            }
        }

        let entries = documents
            .into_iter()
            .zip(vectors)
            .map(|(document, vector)| IndexEntry { document, vector })
            .collect();

        Ok(Self {
            backend,
            entries,
            corpus_version,
        })
    }

    pub fn corpus_version(&self) -> u64 {
        self.corpus_version
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `k` documents nearest to `query_vec`, most similar first.
    /// Ties keep corpus order.
    pub fn nearest(&self, query_vec: &[f32], k: usize) -> Vec<KnowledgeDocument> {
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(query_vec, &e.vector), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(_, e)| e.document.clone())
            .collect()
    }

    /// Embed `query` with the index's backend and return its neighbours.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<KnowledgeDocument>> {
        let query_vec = embed_query(self.backend.as_ref(), query).await?;
        Ok(self.nearest(&query_vec, k))
    }
}
