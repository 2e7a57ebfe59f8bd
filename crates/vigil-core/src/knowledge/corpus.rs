//! Knowledge corpus format and the built-in default corpus.
//!
//! The persisted corpus is a JSON array of
//! `{ "pageContent": string, "metadata": { "category", "severity", "id"?, "tags"? } }`
//! records. Parsing never fails: malformed input yields an empty set and a
//! warning, and callers fall back to [`default_documents`].

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::models::{DocumentSeverity, KnowledgeDocument};

/// Parse a corpus JSON string. Malformed input yields an empty list.
pub fn parse_corpus(json: &str) -> Vec<KnowledgeDocument> {
    match serde_json::from_str::<Vec<KnowledgeDocument>>(json) {
        Ok(docs) => docs,
        Err(e) => {
            log::warn!("ignoring malformed knowledge corpus: {}", e);
            Vec::new()
        }
    }
}

/// Serialize documents in the corpus file format.
pub fn to_corpus_json(documents: &[KnowledgeDocument]) -> Result<String> {
    Ok(serde_json::to_string_pretty(documents)?)
}

/// SHA-256 fingerprint of a corpus snapshot.
///
/// Covers content and metadata in order, so any edit, reorder, or
/// addition changes the result.
pub fn corpus_fingerprint(documents: &[KnowledgeDocument]) -> String {
    let mut hasher = Sha256::new();
    for doc in documents {
        hasher.update(doc.content.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.metadata.category.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.metadata.severity.as_str().as_bytes());
        hasher.update([0u8]);
        for tag in doc.tags() {
            hasher.update(tag.as_bytes());
            hasher.update([1u8]);
        }
        hasher.update([0xffu8]);
    }
    format!("{:x}", hasher.finalize())
}

/// The three baseline topics: SQL injection, XSS, and hardcoded secrets.
pub fn baseline_documents() -> Vec<KnowledgeDocument> {
    default_documents().into_iter().take(3).collect()
}

/// Canonical security topics used when no corpus file can be loaded.
pub fn default_documents() -> Vec<KnowledgeDocument> {
    vec![
        KnowledgeDocument::new(
            "SQL injection occurs when untrusted input is concatenated into a SQL query string. \
             Use parameterized queries or prepared statements with placeholders and pass user \
             values as a separate parameter list. Never build queries with string concatenation \
             or template interpolation, and run the database account with least privilege.",
            "sql-injection",
            DocumentSeverity::High,
        )
        .with_id("kb-sql-injection")
        .with_tags(["sql", "injection", "database"]),
        KnowledgeDocument::new(
            "Cross-site scripting (XSS) lets attackers run scripts in a victim's browser when \
             untrusted data is written into the page as HTML. Assign text with textContent \
             instead of innerHTML, escape output for its context, sanitize any HTML you must \
             render, and apply a Content Security Policy.",
            "xss",
            DocumentSeverity::High,
        )
        .with_id("kb-xss")
        .with_tags(["xss", "html", "browser"]),
        KnowledgeDocument::new(
            "Hardcoded secrets such as passwords, API keys, and tokens in source code leak \
             through version control and logs. Load credentials from environment variables or \
             a secrets manager, rotate anything that was committed, and never write secrets to \
             log output.",
            "sensitive-data",
            DocumentSeverity::High,
        )
        .with_id("kb-sensitive-data")
        .with_tags(["secrets", "credentials", "configuration"]),
        KnowledgeDocument::new(
            "Unsafe deserialization of attacker-controlled data (pickle, Java object streams, \
             YAML load) can execute code. Accept only simple data formats like JSON, validate \
             types after parsing, and never deserialize objects from untrusted sources.",
            "insecure-deserialization",
            DocumentSeverity::High,
        )
        .with_id("kb-insecure-deserialization")
        .with_tags(["deserialization", "pickle", "yaml"]),
        KnowledgeDocument::new(
            "Unrestricted file upload allows attackers to store executable content on the \
             server. Validate file type by content, enforce size limits, generate server-side \
             file names, and store uploads outside the web root.",
            "file-upload",
            DocumentSeverity::Medium,
        )
        .with_id("kb-file-upload")
        .with_tags(["upload", "files"]),
        KnowledgeDocument::new(
            "Command injection happens when user input reaches a shell. Avoid invoking a shell, \
             pass arguments as an array to the process API, and validate input against an \
             allow-list.",
            "command-injection",
            DocumentSeverity::High,
        )
        .with_id("kb-command-injection")
        .with_tags(["command", "shell", "injection"]),
        KnowledgeDocument::new(
            "Insecure direct object reference (IDOR) exposes records by guessable identifiers. \
             Check on every request that the authenticated user owns or may access the \
             referenced object.",
            "idor",
            DocumentSeverity::Medium,
        )
        .with_id("kb-idor")
        .with_tags(["authorization", "access-control"]),
        KnowledgeDocument::new(
            "Cross-site request forgery (CSRF) tricks a logged-in browser into sending unwanted \
             requests. Require anti-forgery tokens on state-changing requests, set SameSite \
             cookies, and never change state on GET.",
            "csrf",
            DocumentSeverity::Medium,
        )
        .with_id("kb-csrf")
        .with_tags(["csrf", "cookies", "forms"]),
        KnowledgeDocument::new(
            "Weak password storage (plain text, MD5, SHA-1) lets stolen databases be cracked \
             quickly. Hash passwords with a slow salted algorithm such as bcrypt, scrypt, or \
             Argon2.",
            "password-storage",
            DocumentSeverity::Medium,
        )
        .with_id("kb-password-storage")
        .with_tags(["password", "hashing", "bcrypt"]),
        KnowledgeDocument::new(
            "XML external entity (XXE) processing lets crafted XML read local files or reach \
             internal services. Disable DTDs and external entity resolution in the XML parser.",
            "xxe",
            DocumentSeverity::Medium,
        )
        .with_id("kb-xxe")
        .with_tags(["xml", "xxe", "parser"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_roundtrip_preserves_records() {
        let input = r#"[
            {"pageContent": "Escape output.", "metadata": {"category": "xss", "severity": "high", "id": "x1", "tags": ["html", "dom"], "source": "owasp"}},
            {"pageContent": "Rotate keys.", "metadata": {"category": "sensitive-data", "severity": "low"}}
        ]"#;
        let docs = parse_corpus(input);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].metadata.extra["source"], "owasp");

        let original: serde_json::Value = serde_json::from_str(input).unwrap();
        let reserialized: serde_json::Value =
            serde_json::from_str(&to_corpus_json(&docs).unwrap()).unwrap();
        assert_eq!(original, reserialized);
    }

    #[test]
    fn test_malformed_corpus_is_empty() {
        assert!(parse_corpus("{not json").is_empty());
        assert!(parse_corpus(r#"[{"pageContent": "x"}]"#).is_empty());
        assert!(parse_corpus(r#"[{"pageContent": "x", "metadata": {"category": "c", "severity": "extreme"}}]"#).is_empty());
    }

    #[test]
    fn test_default_corpus_topics() {
        let docs = default_documents();
        assert_eq!(docs.len(), 10);
        let baseline = baseline_documents();
        let categories: Vec<&str> = baseline.iter().map(|d| d.category()).collect();
        assert_eq!(categories, vec!["sql-injection", "xss", "sensitive-data"]);
        assert!(docs.iter().all(|d| d.metadata.id.is_some()));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let docs = default_documents();
        let fp = corpus_fingerprint(&docs);
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, corpus_fingerprint(&default_documents()));
        assert_ne!(fp, corpus_fingerprint(&docs[1..]));

        let mut reversed = docs.clone();
        reversed.reverse();
        assert_ne!(fp, corpus_fingerprint(&reversed));
    }
}
