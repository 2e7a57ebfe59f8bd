//! Per-document findings store.
//!
//! Each document's findings are an immutable `Arc<Vec<_>>` replaced
//! wholesale on [`FindingsStore::publish`]; readers never observe a
//! partially updated list. Every publish also broadcasts an
//! [`AnalysisComplete`] event so consumers can refresh when a pass
//! finishes instead of polling.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use vigil_core::aggregate::{group_by_severity, health_score};
use vigil_core::models::{FindingSeverity, SecurityFinding};

const EVENT_CAPACITY: usize = 64;

/// Emitted after a document's findings have been replaced.
#[derive(Debug, Clone)]
pub struct AnalysisComplete {
    pub uri: String,
    pub findings: Arc<Vec<SecurityFinding>>,
}

pub struct FindingsStore {
    documents: RwLock<HashMap<String, Arc<Vec<SecurityFinding>>>>,
    events: broadcast::Sender<AnalysisComplete>,
}

impl FindingsStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            documents: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisComplete> {
        self.events.subscribe()
    }

    /// Replace the findings for `uri` and notify subscribers.
    pub fn publish(&self, uri: &str, findings: Vec<SecurityFinding>) -> Arc<Vec<SecurityFinding>> {
        let findings = Arc::new(findings);
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.to_string(), findings.clone());

        // No subscribers is fine.
        let _ = self.events.send(AnalysisComplete {
            uri: uri.to_string(),
            findings: findings.clone(),
        });
        findings
    }

    /// Current findings for `uri` (empty if never published).
    pub fn snapshot(&self, uri: &str) -> Arc<Vec<SecurityFinding>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
            .unwrap_or_default()
    }

    pub fn grouped(&self, uri: &str) -> BTreeMap<FindingSeverity, Vec<SecurityFinding>> {
        group_by_severity(&self.snapshot(uri))
    }

    pub fn score(&self, uri: &str) -> u8 {
        health_score(&self.snapshot(uri))
    }

    /// Published documents, sorted.
    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        uris.sort();
        uris
    }

    /// Every finding across all documents.
    pub fn all_findings(&self) -> Vec<SecurityFinding> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        let mut uris: Vec<&String> = documents.keys().collect();
        uris.sort();
        uris.into_iter()
            .flat_map(|u| documents[u].iter().cloned())
            .collect()
    }
}

impl Default for FindingsStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for the next completed analysis of `uri`.
pub async fn wait_for(
    events: &mut broadcast::Receiver<AnalysisComplete>,
    uri: &str,
) -> Option<AnalysisComplete> {
    loop {
        match events.recv().await {
            Ok(event) if event.uri == uri => return Some(event),
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::debug!("findings listener lagged by {} events", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
