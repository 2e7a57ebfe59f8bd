//! Knowledge corpus file handling and the `vigil knowledge` / `vigil search`
//! commands.
//!
//! The corpus lives in the JSON file named by `knowledge.corpus_path`.
//! A missing, unreadable, or malformed file falls back to the built-in
//! corpus, so retrieval always has something to work with.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::session::Session;
use vigil_core::knowledge::{
    default_documents, parse_corpus, rank_by_keywords, to_corpus_json, KnowledgeBase,
};
use vigil_core::models::{DocumentSeverity, KnowledgeDocument};
use vigil_core::rules::RuleEngine;

/// Documents from a corpus file. Missing or malformed files yield an
/// empty list (and a warning).
pub fn load_corpus_file(path: &Path) -> Vec<KnowledgeDocument> {
    match std::fs::read_to_string(path) {
        Ok(json) => parse_corpus(&json),
        Err(e) => {
            log::warn!("cannot read knowledge corpus {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// The configured corpus, or the built-in one when it is unset or empty.
pub fn knowledge_base_from_config(config: &Config) -> KnowledgeBase {
    let documents = config
        .knowledge
        .corpus_path
        .as_deref()
        .map(load_corpus_file)
        .unwrap_or_default();
    KnowledgeBase::with_documents_or_default(documents)
}

pub fn parse_severity(s: &str) -> Result<DocumentSeverity> {
    match s.trim().to_ascii_lowercase().as_str() {
        "high" => Ok(DocumentSeverity::High),
        "medium" => Ok(DocumentSeverity::Medium),
        "low" => Ok(DocumentSeverity::Low),
        other => bail!("Unknown severity: '{}'. Use high, medium, or low.", other),
    }
}

// ============ CLI commands ============

/// Search the knowledge base.
///
/// Keyword ranking by default. With `semantic`, the session is
/// initialized first so the similarity index is built with the current
/// provider's embedding model; any failure falls back to keywords.
pub async fn run_search(config: &Config, query: &str, limit: usize, semantic: bool) -> Result<()> {
    if query.trim().is_empty() || limit == 0 {
        println!("No results.");
        return Ok(());
    }

    let kb = Arc::new(knowledge_base_from_config(config));

    if semantic {
        let session = Session::new(
            config,
            kb.clone(),
            Arc::new(RuleEngine::with_builtin_rules()?),
        );
        if let Err(e) = session.initialize().await {
            eprintln!("Semantic search unavailable ({:#}); using keyword ranking.", e);
        } else if !kb.is_indexed() {
            eprintln!("No embedding index for this provider; using keyword ranking.");
        }
        let results = kb.search(query, limit).await;
        print_documents(&results, |_| None);
        return Ok(());
    }

    let documents = kb.documents();
    let ranked: Vec<(usize, KnowledgeDocument)> = rank_by_keywords(&documents, query)
        .into_iter()
        .take(limit)
        .map(|(score, doc)| (score, doc.clone()))
        .collect();
    let results: Vec<KnowledgeDocument> = ranked.iter().map(|(_, d)| d.clone()).collect();
    print_documents(&results, |i| Some(ranked[i].0));
    Ok(())
}

fn print_documents<F>(documents: &[KnowledgeDocument], score: F)
where
    F: Fn(usize) -> Option<usize>,
{
    if documents.is_empty() {
        println!("No results.");
        return;
    }

    for (i, doc) in documents.iter().enumerate() {
        let score = score(i).map(|s| format!("[{}] ", s)).unwrap_or_default();
        println!(
            "{}. {}{} ({})",
            i + 1,
            score,
            doc.category(),
            doc.metadata.severity
        );
        if let Some(id) = &doc.metadata.id {
            println!("    id: {}", id);
        }
        if !doc.tags().is_empty() {
            println!("    tags: {}", doc.tags().join(", "));
        }
        println!("    excerpt: \"{}\"", excerpt(&doc.content, 160));
        println!();
    }
}

fn excerpt(content: &str, max_chars: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

/// Append the documents in `file` to the configured corpus file.
///
/// If the corpus file does not exist yet, it starts from the built-in
/// corpus. Import files that parse to nothing are rejected, and so is an
/// existing corpus file that cannot be parsed, which is left untouched.
pub fn run_import(config: &Config, file: &Path) -> Result<()> {
    let Some(corpus_path) = config.knowledge.corpus_path.as_deref() else {
        bail!("knowledge.corpus_path is not set; configure it before importing");
    };

    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let incoming = parse_corpus(&json);
    if incoming.is_empty() {
        bail!("No knowledge documents found in {}", file.display());
    }

    let mut documents = if corpus_path.exists() {
        let existing = std::fs::read_to_string(corpus_path)
            .with_context(|| format!("Failed to read {}", corpus_path.display()))?;
        let documents = parse_corpus(&existing);
        if documents.is_empty() && !is_empty_corpus(&existing) {
            bail!(
                "Existing corpus {} is malformed; fix or remove it before importing",
                corpus_path.display()
            );
        }
        documents
    } else {
        default_documents()
    };
    let added = incoming.len();
    documents.extend(incoming);

    if let Some(parent) = corpus_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(corpus_path, to_corpus_json(&documents)?)
        .with_context(|| format!("Failed to write {}", corpus_path.display()))?;

    println!(
        "Imported {} documents into {} ({} total)",
        added,
        corpus_path.display(),
        documents.len()
    );
    Ok(())
}

fn is_empty_corpus(json: &str) -> bool {
    json.trim().is_empty()
        || serde_json::from_str::<Vec<serde_json::Value>>(json).is_ok_and(|v| v.is_empty())
}

/// Write the effective corpus as JSON to `output`, or stdout.
pub fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let kb = knowledge_base_from_config(config);
    let json = to_corpus_json(&kb.documents())?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &json)?;
            eprintln!("Exported {} documents to {}", kb.len(), path.display());
        }
        None => {
            println!("{}", json);
        }
    }
    Ok(())
}

/// List corpus documents, optionally filtered. Filters combine with AND.
pub fn run_list(
    config: &Config,
    category: Option<&str>,
    severity: Option<&str>,
    tag: Option<&str>,
) -> Result<()> {
    let severity = severity.map(parse_severity).transpose()?;
    let kb = knowledge_base_from_config(config);

    let mut documents = kb.documents();
    if let Some(c) = category {
        documents = intersect(documents, &kb.by_category(c));
    }
    if let Some(s) = severity {
        documents = intersect(documents, &kb.by_severity(s));
    }
    if let Some(t) = tag {
        documents = intersect(documents, &kb.by_tag(t));
    }

    if documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for doc in &documents {
        println!(
            "{:<28} {:<26} {:<7} {}",
            doc.metadata.id.as_deref().unwrap_or("-"),
            doc.category(),
            doc.metadata.severity,
            doc.tags().join(",")
        );
    }
    println!("{} documents", documents.len());
    Ok(())
}

fn intersect(
    documents: Vec<KnowledgeDocument>,
    keep: &[KnowledgeDocument],
) -> Vec<KnowledgeDocument> {
    documents.into_iter().filter(|d| keep.contains(d)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config_with_corpus(path: PathBuf) -> Config {
        let mut config = Config::default();
        config.knowledge.corpus_path = Some(path);
        config
    }

    #[test]
    fn test_missing_corpus_uses_default() {
        let tmp = TempDir::new().unwrap();
        let config = config_with_corpus(tmp.path().join("missing.json"));
        assert_eq!(knowledge_base_from_config(&config).len(), 10);
        assert_eq!(knowledge_base_from_config(&Config::default()).len(), 10);
    }

    #[test]
    fn test_malformed_corpus_uses_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(load_corpus_file(&path).is_empty());
        assert_eq!(knowledge_base_from_config(&config_with_corpus(path)).len(), 10);
    }

    #[test]
    fn test_import_seeds_from_default_then_appends() {
        let tmp = TempDir::new().unwrap();
        let corpus = tmp.path().join("data/kb.json");
        let config = config_with_corpus(corpus.clone());

        let import = tmp.path().join("extra.json");
        std::fs::write(
            &import,
            r#"[{"pageContent": "Validate redirects against an allow-list.", "metadata": {"category": "open-redirect", "severity": "low", "tags": ["redirect"]}}]"#,
        )
        .unwrap();

        run_import(&config, &import).unwrap();
        assert_eq!(load_corpus_file(&corpus).len(), 11);

        run_import(&config, &import).unwrap();
        let kb = knowledge_base_from_config(&config);
        assert_eq!(kb.len(), 12);
        assert_eq!(kb.by_category("open-redirect").len(), 2);
    }

    #[test]
    fn test_import_keeps_malformed_corpus_file() {
        let tmp = TempDir::new().unwrap();
        let corpus = tmp.path().join("kb.json");
        let original = r#"[{"pageContent": "Mine.", "metadata": {"category": "custom", "severity": "HIGH"}}]"#;
        std::fs::write(&corpus, original).unwrap();
        let config = config_with_corpus(corpus.clone());

        let import = tmp.path().join("extra.json");
        std::fs::write(
            &import,
            r#"[{"pageContent": "Other.", "metadata": {"category": "misc", "severity": "low"}}]"#,
        )
        .unwrap();

        let err = run_import(&config, &import).unwrap_err();
        assert!(err.to_string().contains("malformed"));
        assert_eq!(std::fs::read_to_string(&corpus).unwrap(), original);
    }

    #[test]
    fn test_import_into_empty_corpus_file() {
        let tmp = TempDir::new().unwrap();
        let corpus = tmp.path().join("kb.json");
        std::fs::write(&corpus, "[]").unwrap();
        let config = config_with_corpus(corpus.clone());

        let import = tmp.path().join("extra.json");
        std::fs::write(
            &import,
            r#"[{"pageContent": "Other.", "metadata": {"category": "misc", "severity": "low"}}]"#,
        )
        .unwrap();

        run_import(&config, &import).unwrap();
        assert_eq!(load_corpus_file(&corpus).len(), 1);
    }

    #[test]
    fn test_import_requires_corpus_path_and_documents() {
        let tmp = TempDir::new().unwrap();
        let import = tmp.path().join("empty.json");
        std::fs::write(&import, "[]").unwrap();

        assert!(run_import(&Config::default(), &import).is_err());
        let config = config_with_corpus(tmp.path().join("kb.json"));
        assert!(run_import(&config, &import).is_err());
    }

    #[test]
    fn test_export_writes_corpus_format() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out/kb.json");
        run_export(&Config::default(), Some(&out)).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        let records = json.as_array().unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(records[0]["metadata"]["category"], "sql-injection");
        assert!(records[0]["pageContent"].is_string());
    }

    #[test]
    fn test_parse_severity() {
        assert_eq!(parse_severity(" High").unwrap(), DocumentSeverity::High);
        assert!(parse_severity("critical").is_err());
    }

    #[test]
    fn test_excerpt_truncates_on_chars() {
        assert_eq!(excerpt("a  b\nc", 10), "a b c");
        assert_eq!(excerpt("ééééé", 3), "ééé...");
    }
}
