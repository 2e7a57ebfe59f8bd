//! Workspace scanning.
//!
//! Walks a directory (or takes a single file), runs the rule engine on
//! every matching source file, and reports findings with per-file and
//! overall health scores. `--deep` additionally asks the model to
//! classify each file and merges its findings with the rule findings;
//! if the session cannot be initialized the scan stays rule-only.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::config::{Config, ScanConfig};
use crate::findings::FindingsStore;
use crate::knowledge::knowledge_base_from_config;
use crate::session::Session;
use vigil_core::aggregate::{health_score, merge_findings, SecurityLevel};
use vigil_core::models::{Diagnostic, DiagnosticLevel, SecurityFinding};
use vigil_core::rules::RuleEngine;
use vigil_core::text::{Range, SourceDocument, TextDocument};

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub path: String,
    pub score: u8,
    pub level: SecurityLevel,
    pub findings: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub root: String,
    pub generated_at: DateTime<Utc>,
    pub files: Vec<FileReport>,
    pub total_findings: usize,
    pub overall_score: u8,
    pub level: SecurityLevel,
}

/// A source file selected for scanning.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanTarget {
    pub path: PathBuf,
    /// Path relative to the scan root, used as the document uri.
    pub relative: String,
}

/// Files under `root` matching the include globs and none of the
/// excludes. A file path is taken as-is, without glob filtering.
pub fn collect_targets(root: &Path, scan: &ScanConfig) -> Result<Vec<ScanTarget>> {
    if !root.exists() {
        bail!("Scan path does not exist: {}", root.display());
    }

    if root.is_file() {
        let relative = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root.display().to_string());
        return Ok(vec![ScanTarget {
            path: root.to_path_buf(),
            relative,
        }]);
    }

    let include_set = build_globset(&scan.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(scan.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut targets = Vec::new();

    let walker = WalkDir::new(root).follow_links(scan.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size > scan.max_file_bytes {
            log::info!("skipping {} ({} bytes)", rel_str, size);
            continue;
        }

        targets.push(ScanTarget {
            path: path.to_path_buf(),
            relative: rel_str,
        });
    }

    targets.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(targets)
}

/// Scan `targets`, publishing each file's findings to `store`.
///
/// With a ready `session`, each file is also classified by the model and
/// the results merged with the rule findings.
pub async fn scan_targets(
    root: &str,
    targets: &[ScanTarget],
    rules: &RuleEngine,
    session: Option<&Session>,
    store: &FindingsStore,
) -> ScanReport {
    let mut files = Vec::with_capacity(targets.len());

    for target in targets {
        let text = match std::fs::read_to_string(&target.path) {
            Ok(text) => text,
            Err(e) => {
                log::debug!("skipping unreadable {}: {}", target.relative, e);
                continue;
            }
        };
        let doc = SourceDocument::new(target.relative.as_str(), text);

        let mut findings = rules.run_on(&doc);
        if let Some(session) = session {
            findings = merge_findings(findings, classify_whole(session, &doc).await);
        }
        let findings = store.publish(doc.uri(), findings);

        let score = health_score(&findings);
        files.push(FileReport {
            path: target.relative.clone(),
            score,
            level: SecurityLevel::from_score(score),
            findings: findings.iter().map(SecurityFinding::to_diagnostic).collect(),
        });
    }

    let all = store.all_findings();
    let overall_score = health_score(&all);
    ScanReport {
        root: root.to_string(),
        generated_at: Utc::now(),
        files,
        total_findings: all.len(),
        overall_score,
        level: SecurityLevel::from_score(overall_score),
    }
}

async fn classify_whole(session: &Session, doc: &SourceDocument) -> Vec<SecurityFinding> {
    let last = doc.line_count().saturating_sub(1) as u32;
    match session.classify_region(doc, Range::lines(0, last)).await {
        Ok(findings) => findings,
        Err(e) => {
            log::warn!("deep scan of {} skipped: {}", doc.uri(), e);
            Vec::new()
        }
    }
}

// ============ CLI command ============

pub async fn run_scan(config: &Config, path: &Path, deep: bool, json: bool) -> Result<()> {
    let targets = collect_targets(path, &config.scan)?;
    let rules = Arc::new(RuleEngine::with_builtin_rules()?);
    let store = FindingsStore::new();

    let session = if deep {
        let session = Session::new(config, Arc::new(knowledge_base_from_config(config)), rules.clone());
        match session.initialize().await {
            Ok(state) => {
                log::info!("deep scan with provider '{}' ({:?})", session.provider_id(), state);
                Some(session)
            }
            Err(e) => {
                eprintln!("Deep scan unavailable ({:#}); reporting rule findings only.", e);
                None
            }
        }
    } else {
        None
    };

    let report = scan_targets(
        &path.display().to_string(),
        &targets,
        &rules,
        session.as_ref(),
        &store,
    )
    .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &ScanReport) {
    for file in &report.files {
        if file.findings.is_empty() {
            continue;
        }
        println!("{}  score {} ({})", file.path, file.score, file.level);
        for d in &file.findings {
            println!(
                "  {}:{}  {}  {}  {}",
                d.range.start.line + 1,
                d.range.start.character + 1,
                level_label(d.severity),
                d.rule_id,
                d.message
            );
        }
        println!();
    }

    println!(
        "Scanned {} files: {} findings, overall score {} ({})",
        report.files.len(),
        report.total_findings,
        report.overall_score,
        report.level
    );
}

fn level_label(level: DiagnosticLevel) -> &'static str {
    match level {
        DiagnosticLevel::Error => "error",
        DiagnosticLevel::Warning => "warning",
        DiagnosticLevel::Information => "info",
        DiagnosticLevel::Hint => "hint",
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vigil_core::models::FindingSeverity;

    fn workspace() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::write(
            root.join("src/db.js"),
            "const q = \"SELECT * FROM users WHERE id = \" + userId;\n",
        )
        .unwrap();
        std::fs::write(root.join("src/clean.py"), "def add(a, b):\n    return a + b\n").unwrap();
        std::fs::write(root.join("src/notes.md"), "innerHTML = x").unwrap();
        std::fs::write(
            root.join("node_modules/pkg/index.js"),
            "document.write(payload);\n",
        )
        .unwrap();
        tmp
    }

    #[test]
    fn test_collect_respects_globs() {
        let tmp = workspace();
        let targets = collect_targets(tmp.path(), &ScanConfig::default()).unwrap();
        let names: Vec<&str> = targets.iter().map(|t| t.relative.as_str()).collect();
        assert_eq!(names, vec!["src/clean.py", "src/db.js"]);
    }

    #[test]
    fn test_collect_skips_large_files() {
        let tmp = workspace();
        let scan = ScanConfig {
            max_file_bytes: 10,
            ..ScanConfig::default()
        };
        let targets = collect_targets(tmp.path(), &scan).unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn test_single_file_bypasses_globs() {
        let tmp = workspace();
        let targets = collect_targets(&tmp.path().join("src/notes.md"), &ScanConfig::default())
            .unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].relative, "notes.md");
    }

    #[test]
    fn test_missing_root_errors() {
        let tmp = TempDir::new().unwrap();
        assert!(collect_targets(&tmp.path().join("nope"), &ScanConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_scan_scores_and_publishes() {
        let tmp = workspace();
        let targets = collect_targets(tmp.path(), &ScanConfig::default()).unwrap();
        let rules = RuleEngine::with_builtin_rules().unwrap();
        let store = FindingsStore::new();

        let report = scan_targets("ws", &targets, &rules, None, &store).await;

        assert_eq!(report.files.len(), 2);
        let db = report.files.iter().find(|f| f.path == "src/db.js").unwrap();
        assert_eq!(db.findings[0].rule_id, "sql-injection");
        assert!(db.score < 100);
        let clean = report.files.iter().find(|f| f.path == "src/clean.py").unwrap();
        assert_eq!(clean.score, 100);
        assert_eq!(clean.level, SecurityLevel::Safe);

        assert_eq!(report.total_findings, store.all_findings().len());
        assert_eq!(store.grouped("src/db.js")[&FindingSeverity::Critical].len(), db.findings.len());
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let tmp = workspace();
        let targets = collect_targets(tmp.path(), &ScanConfig::default()).unwrap();
        let rules = RuleEngine::with_builtin_rules().unwrap();
        let report = scan_targets("ws", &targets, &rules, None, &FindingsStore::new()).await;

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["root"], "ws");
        assert!(json["generated_at"].is_string());
        assert_eq!(json["files"][1]["findings"][0]["ruleId"], "sql-injection");
        assert_eq!(json["files"][1]["findings"][0]["severity"], "error");
    }
}
