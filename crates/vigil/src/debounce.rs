//! Completion debouncing.
//!
//! Each completion request takes a ticket. A newer request for the same
//! document supersedes every older ticket, and a ticket only counts as
//! current while the document's cursor is still where it was requested.
//! Responses for stale tickets are dropped instead of shown.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use vigil_core::text::Position;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionTicket {
    uri: String,
    generation: u64,
    position: Position,
}

impl CompletionTicket {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn position(&self) -> Position {
        self.position
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Latest {
    generation: u64,
    cursor: Position,
}

/// Latest request generation and cursor per document.
#[derive(Default)]
pub struct CompletionDebouncer {
    documents: Mutex<HashMap<String, Latest>>,
}

impl CompletionDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    fn documents(&self) -> MutexGuard<'_, HashMap<String, Latest>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a request, superseding all earlier tickets for `uri`.
    pub fn begin(&self, uri: &str, position: Position) -> CompletionTicket {
        let mut documents = self.documents();
        let latest = documents.entry(uri.to_string()).or_default();
        latest.generation += 1;
        latest.cursor = position;
        CompletionTicket {
            uri: uri.to_string(),
            generation: latest.generation,
            position,
        }
    }

    /// Record a cursor move that did not start a request.
    pub fn cursor_moved(&self, uri: &str, position: Position) {
        self.documents().entry(uri.to_string()).or_default().cursor = position;
    }

    /// Whether `ticket` is the newest for its document and the cursor is
    /// still at the requested position.
    pub fn is_current(&self, ticket: &CompletionTicket) -> bool {
        self.documents()
            .get(&ticket.uri)
            .is_some_and(|l| l.generation == ticket.generation && l.cursor == ticket.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_ticket_supersedes() {
        let d = CompletionDebouncer::new();
        let pos = Position::new(3, 7);
        let first = d.begin("a.js", pos);
        assert!(d.is_current(&first));

        let second = d.begin("a.js", pos);
        assert!(!d.is_current(&first));
        assert!(d.is_current(&second));
    }

    #[test]
    fn test_moved_cursor_is_stale() {
        let d = CompletionDebouncer::new();
        let ticket = d.begin("a.js", Position::new(1, 4));
        d.cursor_moved("a.js", Position::new(1, 5));
        assert!(!d.is_current(&ticket));

        d.cursor_moved("a.js", Position::new(1, 4));
        assert!(d.is_current(&ticket));
    }

    #[test]
    fn test_documents_are_independent() {
        let d = CompletionDebouncer::new();
        let pos = Position::new(0, 0);
        let a = d.begin("a.js", pos);
        let _b = d.begin("b.js", Position::new(5, 5));
        assert!(d.is_current(&a));
    }
}
