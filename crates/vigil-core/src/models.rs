//! Core data models used throughout Vigil.
//!
//! These types represent the knowledge documents, findings, and transport
//! shapes that flow between the rule engine, the knowledge base, and the
//! prompt assembly layer.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::text::Range;

/// Source tag for findings produced by the rule engine.
pub const PRIMARY_SOURCE: &str = "vigil";

/// Source tag for findings classified by a language model.
pub const MODEL_SOURCE: &str = "llm";

// ═══════════════════════════════════════════════════════════════════════
// Knowledge Documents
// ═══════════════════════════════════════════════════════════════════════

/// Severity of the topic a knowledge document covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSeverity {
    High,
    Medium,
    Low,
}

impl DocumentSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSeverity::High => "high",
            DocumentSeverity::Medium => "medium",
            DocumentSeverity::Low => "low",
        }
    }
}

impl fmt::Display for DocumentSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to a [`KnowledgeDocument`].
///
/// Unknown keys in the persisted corpus are kept in `extra` so that a
/// load → save cycle reproduces the original record. An explicit
/// `"id": null` or `"tags": null` also stays in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMetadata")]
pub struct DocumentMetadata {
    pub category: String,
    pub severity: DocumentSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawMetadata {
    category: String,
    severity: DocumentSeverity,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl TryFrom<RawMetadata> for DocumentMetadata {
    type Error = String;

    fn try_from(raw: RawMetadata) -> Result<Self, Self::Error> {
        let mut extra = raw.rest;
        let id = take_non_null(&mut extra, "id")?;
        let tags = take_non_null(&mut extra, "tags")?;
        Ok(Self {
            category: raw.category,
            severity: raw.severity,
            id,
            tags,
            extra,
        })
    }
}

/// Remove and decode `key`. Absent keys and explicit nulls yield `None`;
/// a null is left in `map`.
fn take_non_null<T: DeserializeOwned>(
    map: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<T>, String> {
    match map.remove(key) {
        None => Ok(None),
        Some(Value::Null) => {
            map.insert(key.to_string(), Value::Null);
            Ok(None)
        }
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| format!("invalid metadata.{}: {}", key, e)),
    }
}

/// A short security-advice document held by the knowledge base.
///
/// Serialized as `{ "pageContent": ..., "metadata": { ... } }`, the
/// format of the knowledge corpus file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    #[serde(rename = "pageContent")]
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl KnowledgeDocument {
    pub fn new(
        content: impl Into<String>,
        category: impl Into<String>,
        severity: DocumentSeverity,
    ) -> Self {
        Self {
            content: content.into(),
            metadata: DocumentMetadata {
                category: category.into(),
                severity,
                id: None,
                tags: None,
                extra: Map::new(),
            },
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.id = Some(id.into());
        self.metadata.extra.remove("id");
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.tags = Some(tags.into_iter().map(Into::into).collect());
        self.metadata.extra.remove("tags");
        self
    }

    pub fn category(&self) -> &str {
        &self.metadata.category
    }

    pub fn tags(&self) -> &[String] {
        self.metadata.tags.as_deref().unwrap_or(&[])
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Findings
// ═══════════════════════════════════════════════════════════════════════

/// Severity of a single finding. Ordered most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl FindingSeverity {
    /// Score deduction applied by [`health_score`](crate::aggregate::health_score).
    pub fn weight(&self) -> u32 {
        match self {
            FindingSeverity::Critical => 10,
            FindingSeverity::High => 5,
            FindingSeverity::Medium => 2,
            FindingSeverity::Low => 1,
        }
    }

    /// Editor diagnostic level for this severity.
    pub fn diagnostic_level(&self) -> DiagnosticLevel {
        match self {
            FindingSeverity::Critical => DiagnosticLevel::Error,
            FindingSeverity::High => DiagnosticLevel::Warning,
            FindingSeverity::Medium => DiagnosticLevel::Information,
            FindingSeverity::Low => DiagnosticLevel::Hint,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingSeverity::Critical => "critical",
            FindingSeverity::High => "high",
            FindingSeverity::Medium => "medium",
            FindingSeverity::Low => "low",
        }
    }

    /// Lenient parse used for model output (`"error"` and `"warning"` are
    /// accepted as aliases).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" | "error" => Some(FindingSeverity::Critical),
            "high" | "warning" => Some(FindingSeverity::High),
            "medium" | "information" | "info" => Some(FindingSeverity::Medium),
            "low" | "hint" => Some(FindingSeverity::Low),
            _ => None,
        }
    }
}

impl fmt::Display for FindingSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flagged location with a severity and explanatory message.
///
/// Offsets are byte offsets into the analysed text; `range` is the same
/// span in line/character coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFinding {
    pub rule_id: String,
    pub message: String,
    pub severity: FindingSeverity,
    pub start_offset: usize,
    pub end_offset: usize,
    pub range: Range,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl SecurityFinding {
    /// The source tag, defaulting to the primary detector.
    pub fn source_tag(&self) -> &str {
        self.source.as_deref().unwrap_or(PRIMARY_SOURCE)
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            severity: self.severity.diagnostic_level(),
            range: self.range,
            message: self.message.clone(),
            source: self.source_tag().to_string(),
            rule_id: self.rule_id.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Transport Shapes
// ═══════════════════════════════════════════════════════════════════════

/// Editor diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Information,
    Hint,
}

/// Diagnostic as published to an editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: DiagnosticLevel,
    pub range: Range,
    pub message: String,
    pub source: String,
    pub rule_id: String,
}

/// A single inline completion offered to the editor.
///
/// `detail` carries the detected-risk label; candidates are never
/// filtered by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionCandidate {
    pub label: String,
    pub insert_text: String,
    pub detail: String,
    pub documentation: String,
    pub rank: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_weights_are_ordered() {
        assert!(FindingSeverity::Critical.weight() > FindingSeverity::High.weight());
        assert!(FindingSeverity::High.weight() > FindingSeverity::Medium.weight());
        assert!(FindingSeverity::Medium.weight() > FindingSeverity::Low.weight());
    }

    #[test]
    fn test_parse_accepts_diagnostic_aliases() {
        assert_eq!(FindingSeverity::parse("error"), Some(FindingSeverity::Critical));
        assert_eq!(FindingSeverity::parse(" Warning "), Some(FindingSeverity::High));
        assert_eq!(FindingSeverity::parse("bogus"), None);
    }

    #[test]
    fn test_document_serializes_page_content() {
        let doc = KnowledgeDocument::new("Use placeholders.", "sql-injection", DocumentSeverity::High)
            .with_tags(["sql"]);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["pageContent"], "Use placeholders.");
        assert_eq!(json["metadata"]["category"], "sql-injection");
        assert_eq!(json["metadata"]["severity"], "high");
        assert!(json["metadata"].get("id").is_none());
    }

    #[test]
    fn test_explicit_nulls_survive_round_trip() {
        let record = serde_json::json!({
            "pageContent": "Escape output.",
            "metadata": {"category": "xss", "severity": "medium", "id": null, "tags": null, "owner": "web"}
        });
        let doc: KnowledgeDocument = serde_json::from_value(record.clone()).unwrap();
        assert_eq!(doc.metadata.id, None);
        assert!(doc.tags().is_empty());
        assert_eq!(serde_json::to_value(&doc).unwrap(), record);

        let tagged = doc.with_tags(["html"]);
        let json = serde_json::to_value(&tagged).unwrap();
        assert_eq!(json["metadata"]["tags"], serde_json::json!(["html"]));
        assert_eq!(json["metadata"].get("id"), Some(&Value::Null));
    }

    #[test]
    fn test_non_string_id_is_rejected() {
        let record = r#"{"pageContent": "x", "metadata": {"category": "xss", "severity": "low", "id": 7}}"#;
        assert!(serde_json::from_str::<KnowledgeDocument>(record).is_err());
    }

    #[test]
    fn test_has_tag_is_case_insensitive() {
        let doc = KnowledgeDocument::new("x", "xss", DocumentSeverity::Medium).with_tags(["HTML"]);
        assert!(doc.has_tag("html"));
        assert!(!doc.has_tag("sql"));
    }
}
