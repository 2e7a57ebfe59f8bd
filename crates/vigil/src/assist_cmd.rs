//! `vigil advise | complete | analyze | fix`.
//!
//! Each command reads a file, brings the session up with the configured
//! provider, and runs one assistant operation. A session that cannot be
//! initialized (unknown provider, missing API key) is reported as a
//! warning; the operation itself then fails with "service not
//! initialized".

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::knowledge::knowledge_base_from_config;
use crate::session::Session;
use vigil_core::autofix::draft_fix;
use vigil_core::prompt::detect_language;
use vigil_core::rules::RuleEngine;
use vigil_core::text::{Position, Range, SourceDocument, TextDocument};

async fn ready_session(config: &Config) -> Result<Session> {
    let session = Session::new(
        config,
        Arc::new(knowledge_base_from_config(config)),
        Arc::new(RuleEngine::with_builtin_rules()?),
    );
    if let Err(e) = session.initialize().await {
        log::warn!(
            "could not initialize provider '{}': {:#}",
            session.provider_id(),
            e
        );
    }
    Ok(session)
}

fn read_document(file: &Path) -> Result<SourceDocument> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    Ok(SourceDocument::new(file.display().to_string(), text))
}

/// Zero-based range for 1-based inclusive CLI line numbers. Missing
/// bounds default to the first and last line.
pub fn region(doc: &SourceDocument, start_line: Option<u32>, end_line: Option<u32>) -> Range {
    let last = doc.line_count().saturating_sub(1) as u32;
    let start = start_line.map(|l| l.saturating_sub(1)).unwrap_or(0).min(last);
    let end = end_line
        .map(|l| l.saturating_sub(1))
        .unwrap_or(last)
        .clamp(start, last);
    Range::lines(start, end)
}

pub async fn run_advise(config: &Config, file: &Path) -> Result<()> {
    let doc = read_document(file)?;
    let session = ready_session(config).await?;
    let language = detect_language(doc.uri());
    let context = format!("file {} ({})", doc.uri(), language.as_str());

    let advice = session.get_advice(doc.text(), &context).await?;
    println!("{}", advice);
    Ok(())
}

pub async fn run_complete(config: &Config, file: &Path, line: u32, character: u32) -> Result<()> {
    let doc = read_document(file)?;
    let session = ready_session(config).await?;

    let position = Position::new(line.saturating_sub(1), character.saturating_sub(1));
    let candidates = session.complete(&doc, position).await?;
    if candidates.is_empty() {
        println!("No completions.");
        return Ok(());
    }
    for c in &candidates {
        println!("{}. [{}] {}", c.rank + 1, c.detail, c.insert_text);
    }
    Ok(())
}

pub async fn run_analyze(
    config: &Config,
    file: &Path,
    start_line: Option<u32>,
    end_line: Option<u32>,
) -> Result<()> {
    let doc = read_document(file)?;
    let session = ready_session(config).await?;

    let report = session
        .analyze_region(&doc, region(&doc, start_line, end_line))
        .await?;
    println!("{}", report);
    Ok(())
}

/// Analyze the region, then print a draft rewrite derived from the report.
pub async fn run_fix(
    config: &Config,
    file: &Path,
    start_line: Option<u32>,
    end_line: Option<u32>,
) -> Result<()> {
    let doc = read_document(file)?;
    let session = ready_session(config).await?;

    let range = region(&doc, start_line, end_line);
    let report = session.analyze_region(&doc, range).await?;
    let code = doc.text_in(range);

    match draft_fix(&code, &report, detect_language(doc.uri())) {
        Some(fix) => {
            println!("{}", fix.description);
            println!();
            println!("--- original");
            println!("{}", fix.original.trim_end());
            println!("+++ draft");
            println!("{}", fix.replacement.trim_end());
        }
        None => {
            println!("No automatic fix available. Analysis:");
            println!();
            println!("{}", report);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_defaults_to_whole_file() {
        let doc = SourceDocument::new("a.js", "one\ntwo\nthree\n");
        assert_eq!(doc.text_in(region(&doc, None, None)), "one\ntwo\nthree\n");
    }

    #[test]
    fn test_region_is_one_based_and_clamped() {
        let doc = SourceDocument::new("a.js", "one\ntwo\nthree");
        assert_eq!(doc.text_in(region(&doc, Some(2), Some(2))), "two");
        assert_eq!(doc.text_in(region(&doc, Some(3), Some(99))), "three");
        assert_eq!(doc.text_in(region(&doc, Some(3), Some(1))), "three");
        assert_eq!(doc.text_in(region(&doc, Some(1), Some(2))), "one\ntwo");
    }
}
