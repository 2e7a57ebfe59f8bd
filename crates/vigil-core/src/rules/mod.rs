//! Rule engine.
//!
//! A [`RuleEngine`] holds a keyed set of [`Rule`]s and runs every rule
//! against a text buffer, producing positioned [`SecurityFinding`]s.
//!
//! # Execution
//!
//! 1. Rules run in registration order.
//! 2. Each rule scans the full text independently.
//! 3. A rule whose [`check`](Rule::check) fails is logged and skipped; the
//!    remaining rules still run.
//! 4. Findings from different rules are never deduplicated here, even when
//!    spans overlap. Merging happens in [`crate::aggregate`].
//!
//! # Usage
//!
//! ```rust
//! use vigil_core::rules::RuleEngine;
//!
//! let engine = RuleEngine::with_builtin_rules().unwrap();
//! let findings = engine.run_rules("element.innerHTML = userInput;");
//! assert_eq!(findings.len(), 1);
//! assert_eq!(findings[0].rule_id, "xss");
//! ```

pub mod builtin;

use anyhow::Result;

use crate::models::{FindingSeverity, SecurityFinding, PRIMARY_SOURCE};
use crate::text::{Range, SourceDocument, TextDocument};

pub use builtin::{builtin_rules, PatternRule};

/// A match reported by a single rule, in byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub start: usize,
    pub end: usize,
    pub message: String,
}

/// A named detector that maps text to matches.
///
/// Implementations only need to scan text; positioning, severity, and
/// source tagging are applied by the engine. Regex-based rules live in
/// [`builtin`]; other detectors can be registered alongside them.
pub trait Rule: Send + Sync {
    /// Unique rule identifier (e.g. `"sql-injection"`).
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// One-line description for listings.
    fn description(&self) -> &str;

    /// Severity stamped on every finding this rule produces.
    fn severity(&self) -> FindingSeverity;

    /// Scan `text` and return every match.
    fn check(&self, text: &str) -> Result<Vec<RuleMatch>>;
}

/// Registry of rules keyed by id.
///
/// Re-registering an id replaces the earlier rule in place, keeping its
/// position in the execution order.
pub struct RuleEngine {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create an engine with the built-in SQL injection, XSS, and
    /// sensitive-data rules.
    pub fn with_builtin_rules() -> Result<Self> {
        let mut engine = Self::new();
        for rule in builtin_rules()? {
            engine.register(rule);
        }
        Ok(engine)
    }

    /// Register a rule. Last write wins for duplicate ids.
    pub fn register(&mut self, rule: Box<dyn Rule>) {
        match self.rules.iter_mut().find(|r| r.id() == rule.id()) {
            Some(slot) => *slot = rule,
            None => self.rules.push(rule),
        }
    }

    /// Look up a rule by id.
    pub fn get(&self, id: &str) -> Option<&dyn Rule> {
        self.rules.iter().find(|r| r.id() == id).map(|r| r.as_ref())
    }

    /// All rules in execution order.
    pub fn list(&self) -> Vec<&dyn Rule> {
        self.rules.iter().map(|r| r.as_ref()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule against a bare text buffer.
    pub fn run_rules(&self, text: &str) -> Vec<SecurityFinding> {
        let doc = SourceDocument::new("untitled", text);
        self.run_on(&doc)
    }

    /// Run every rule against a document, positioning findings with the
    /// document's offset model.
    pub fn run_on(&self, doc: &dyn TextDocument) -> Vec<SecurityFinding> {
        let text = doc.text();
        let mut findings = Vec::new();

        for rule in &self.rules {
            let matches = match rule.check(text) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("rule '{}' failed on {}: {:#}", rule.id(), doc.uri(), e);
                    continue;
                }
            };

            for m in matches {
                findings.push(SecurityFinding {
                    rule_id: rule.id().to_string(),
                    message: m.message,
                    severity: rule.severity(),
                    start_offset: m.start,
                    end_offset: m.end,
                    range: Range::new(doc.position_at(m.start), doc.position_at(m.end)),
                    source: Some(PRIMARY_SOURCE.to_string()),
                });
            }
        }

        findings
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}
