//! Knowledge base: security-advice corpus with similarity and keyword search.
//!
//! The [`KnowledgeBase`] owns a list of [`KnowledgeDocument`]s and an
//! optional [`KnowledgeIndex`] built with an injected
//! [`EmbeddingBackend`]. Any change to the corpus bumps its version and
//! invalidates the index.
//!
//! # Search Routing
//!
//! | Index state | Route |
//! |-------------|-------|
//! | built for the current corpus version | cosine similarity via the backend |
//! | missing, stale, or backend error | deterministic keyword fallback |
//!
//! # Keyword Fallback Scoring
//!
//! ```text
//! score = Σ [term ⊂ content]            (lowercased whitespace terms)
//!       + 2 · [category ⊂ query]
//!       + Σ [tag ⊂ query]
//! ```
//!
//! Documents are stable-sorted by score (desc) and the top `k` returned,
//! including zero-score documents.

pub mod corpus;
pub mod index;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::EmbeddingBackend;
use crate::models::{DocumentSeverity, KnowledgeDocument};

pub use corpus::{
    baseline_documents, corpus_fingerprint, default_documents, parse_corpus, to_corpus_json,
};
pub use index::KnowledgeIndex;

/// Source of knowledge documents for prompt assembly.
///
/// [`KnowledgeBase`] never fails; other implementations may, and callers
/// must treat a failure as "no knowledge context".
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<KnowledgeDocument>>;
}

struct Corpus {
    documents: Vec<KnowledgeDocument>,
    version: u64,
}

/// In-memory security knowledge corpus with an optional similarity index.
pub struct KnowledgeBase {
    corpus: RwLock<Corpus>,
    index: RwLock<Option<Arc<KnowledgeIndex>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl KnowledgeBase {
    /// Create an empty knowledge base.
    pub fn new() -> Self {
        Self {
            corpus: RwLock::new(Corpus {
                documents: Vec::new(),
                version: 0,
            }),
            index: RwLock::new(None),
        }
    }

    /// Create a knowledge base seeded with `documents`, or with the
    /// built-in default corpus if `documents` is empty.
    pub fn with_documents_or_default(documents: Vec<KnowledgeDocument>) -> Self {
        let kb = Self::new();
        if documents.is_empty() {
            kb.load(default_documents());
        } else {
            kb.load(documents);
        }
        kb
    }

    /// Append documents to the corpus.
    pub fn load(&self, documents: Vec<KnowledgeDocument>) {
        self.add(documents);
    }

    /// Append documents to the corpus and invalidate the index.
    pub fn add(&self, documents: Vec<KnowledgeDocument>) {
        let mut corpus = write(&self.corpus);
        corpus.documents.extend(documents);
        corpus.version += 1;
        *write(&self.index) = None;
    }

    /// Remove every document and invalidate the index.
    pub fn clear(&self) {
        let mut corpus = write(&self.corpus);
        corpus.documents.clear();
        corpus.version += 1;
        *write(&self.index) = None;
    }

    /// Forget the similarity index without touching the documents.
    ///
    /// Bumps the corpus version, so a build still running for the old
    /// backend is discarded instead of swapped in.
    pub fn drop_index(&self) {
        let mut corpus = write(&self.corpus);
        corpus.version += 1;
        *write(&self.index) = None;
    }

    pub fn len(&self) -> usize {
        read(&self.corpus).documents.len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.corpus).documents.is_empty()
    }

    pub fn corpus_version(&self) -> u64 {
        read(&self.corpus).version
    }

    /// Content fingerprint of the current corpus (see [`corpus_fingerprint`]).
    pub fn fingerprint(&self) -> String {
        corpus_fingerprint(&read(&self.corpus).documents)
    }

    /// Snapshot of the corpus in insertion order.
    pub fn documents(&self) -> Vec<KnowledgeDocument> {
        read(&self.corpus).documents.clone()
    }

    /// Whether a similarity index matching the current corpus is available.
    pub fn is_indexed(&self) -> bool {
        self.current_index().is_some()
    }

    /// Build a similarity index over the current corpus.
    ///
    /// Returns `false` (and logs) on any failure, including the corpus
    /// changing while the backend was embedding. Never errors; concurrent
    /// searches keep using the previous state until the swap.
    pub async fn build_index(&self, backend: Arc<dyn EmbeddingBackend>) -> bool {
        let (documents, version) = {
            let corpus = read(&self.corpus);
            (corpus.documents.clone(), corpus.version)
        };

        let model = backend.model_name().to_string();
        let built = match KnowledgeIndex::build(backend, documents, version).await {
            Ok(index) => index,
            Err(e) => {
                log::warn!("knowledge index build with '{}' failed: {:#}", model, e);
                return false;
            }
        };

        let corpus = read(&self.corpus);
        if corpus.version != version {
            log::warn!(
                "discarding knowledge index built for corpus version {} (now {})",
                version,
                corpus.version
            );
            return false;
        }
        log::debug!(
            "knowledge index ready: {} documents via '{}' (corpus {})",
            built.len(),
            model,
            &corpus_fingerprint(&corpus.documents)[..12]
        );
        *write(&self.index) = Some(Arc::new(built));
        true
    }

    fn current_index(&self) -> Option<Arc<KnowledgeIndex>> {
        let version = read(&self.corpus).version;
        read(&self.index)
            .as_ref()
            .filter(|idx| idx.corpus_version() == version)
            .cloned()
    }

    /// Find the `k` documents most relevant to `query`.
    ///
    /// Uses the similarity index when available and falls back to
    /// [`keyword_search`](Self::keyword_search) otherwise. Never fails.
    pub async fn search(&self, query: &str, k: usize) -> Vec<KnowledgeDocument> {
        if k == 0 {
            return Vec::new();
        }

        if let Some(index) = self.current_index() {
            match index.search(query, k).await {
                Ok(docs) if !docs.is_empty() => return docs,
                Ok(_) => log::debug!("similarity search returned nothing; using keyword fallback"),
                Err(e) => log::warn!("similarity search failed, using keyword fallback: {:#}", e),
            }
        }

        self.keyword_search(query, k)
    }

    /// Deterministic keyword-overlap ranking (see module docs).
    pub fn keyword_search(&self, query: &str, k: usize) -> Vec<KnowledgeDocument> {
        let corpus = read(&self.corpus);
        rank_by_keywords(&corpus.documents, query)
            .into_iter()
            .take(k)
            .map(|(_, doc)| doc.clone())
            .collect()
    }

    pub fn by_category(&self, category: &str) -> Vec<KnowledgeDocument> {
        self.filter(|d| d.metadata.category == category)
    }

    pub fn by_severity(&self, severity: DocumentSeverity) -> Vec<KnowledgeDocument> {
        self.filter(|d| d.metadata.severity == severity)
    }

    pub fn by_tag(&self, tag: &str) -> Vec<KnowledgeDocument> {
        self.filter(|d| d.has_tag(tag))
    }

    fn filter<F>(&self, predicate: F) -> Vec<KnowledgeDocument>
    where
        F: Fn(&KnowledgeDocument) -> bool,
    {
        read(&self.corpus)
            .documents
            .iter()
            .filter(|d| predicate(d))
            .cloned()
            .collect()
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Retriever for KnowledgeBase {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<KnowledgeDocument>> {
        Ok(self.search(query, k).await)
    }
}

/// Keyword score of one document against a lowercased query.
pub fn keyword_score(doc: &KnowledgeDocument, query_lower: &str, terms: &[&str]) -> usize {
    let content = doc.content.to_lowercase();
    let term_hits = terms.iter().filter(|t| content.contains(*t)).count();

    let category = doc.metadata.category.to_lowercase();
    let category_hit = if query_lower.contains(&category) { 2 } else { 0 };

    let tag_hits = doc
        .tags()
        .iter()
        .filter(|t| query_lower.contains(&t.to_lowercase()))
        .count();

    term_hits + category_hit + tag_hits
}

/// Score every document and stable-sort by score, highest first.
pub fn rank_by_keywords<'a>(
    documents: &'a [KnowledgeDocument],
    query: &str,
) -> Vec<(usize, &'a KnowledgeDocument)> {
    let query_lower = query.to_lowercase();
    let terms: Vec<&str> = query_lower.split_whitespace().collect();

    let mut scored: Vec<(usize, &KnowledgeDocument)> = documents
        .iter()
        .map(|d| (keyword_score(d, &query_lower, &terms), d))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
}
