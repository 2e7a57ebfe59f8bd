//! Draft auto-fix.
//!
//! Turns an analysis report into a mechanical rewrite of the analysed
//! code. Which rewrites apply is decided by sniffing the report for
//! issue keywords (English and Chinese, since the model answers in the
//! user's language). The result is always a draft: it is pattern-based,
//! knows nothing about the surrounding program, and must be reviewed
//! before it is applied.
//!
//! | Issue keywords | Rewrite |
//! |----------------|---------|
//! | sql injection, SQL注入 | `"... " + var` → `"... ?"` plus a bind-parameter note |
//! | xss, cross-site, 跨站, innerHTML | `.innerHTML =` / `.outerHTML =` → `.textContent =` |
//! | hardcoded, secret, credential, 硬编码, 敏感 | secret literal → environment read |

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::prompt::LanguageFamily;

const SQL_CONCAT_SOURCES: &[&str] = &[
    r#""([^"\n]*\b(?i:select|insert|update|delete|drop)\b[^"\n]*)"\s*\+\s*([A-Za-z_$][\w$.]*)(?:\s*\+\s*"([^"\n]*)")?"#,
    r#"'([^'\n]*\b(?i:select|insert|update|delete|drop)\b[^'\n]*)'\s*\+\s*([A-Za-z_$][\w$.]*)(?:\s*\+\s*'([^'\n]*)')?"#,
];

lazy_static! {
    static ref SQL_CONCAT: Vec<Regex> =
        SQL_CONCAT_SOURCES.iter().filter_map(|p| compile(p)).collect();

    static ref HTML_SINK: Option<Regex> = compile(r"\.(?:innerHTML|outerHTML)(\s*\+?=)");

    static ref SECRET_LITERAL: Option<Regex> = compile(
        r#"(?i)\b([\w$]*(?:password|passwd|pwd|api[_-]?key|secret|token|credential)[\w$]*)(["']?\s*[:=]\s*)["'][^"'\n]+["']"#
    );
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            log::error!("fix pattern {:?} does not compile: {}", pattern, e);
            None
        }
    }
}

const SQL_KEYWORDS: &[&str] = &["sql injection", "sql-injection", "sql注入"];
const XSS_KEYWORDS: &[&str] = &["xss", "cross-site scripting", "跨站", "innerhtml"];
const SECRET_KEYWORDS: &[&str] = &[
    "hardcoded",
    "hard-coded",
    "secret",
    "credential",
    "硬编码",
    "敏感",
];

/// A proposed rewrite of a code region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftFix {
    pub original: String,
    pub replacement: String,
    pub description: String,
    /// Always `true`; drafts are never applied without review.
    pub requires_review: bool,
}

/// Build a draft fix for `code` from an analysis report.
///
/// Returns `None` when the report names no known issue or none of the
/// matching rewrites changes the code.
pub fn draft_fix(code: &str, analysis: &str, language: LanguageFamily) -> Option<DraftFix> {
    let report = analysis.to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|k| report.contains(k));

    let mut replacement = code.to_string();
    let mut applied = Vec::new();

    if mentions(SQL_KEYWORDS) {
        if let Some(fixed) = parameterize_sql(&replacement, language) {
            replacement = fixed;
            applied.push("replaced string-built SQL with ? placeholders");
        }
    }
    if mentions(XSS_KEYWORDS) {
        if let Some(fixed) = use_text_content(&replacement) {
            replacement = fixed;
            applied.push("assigned text through textContent instead of HTML");
        }
    }
    if mentions(SECRET_KEYWORDS) {
        if let Some(fixed) = read_secrets_from_env(&replacement, language) {
            replacement = fixed;
            applied.push("moved hardcoded secrets to environment variables");
        }
    }

    if applied.is_empty() {
        return None;
    }

    Some(DraftFix {
        original: code.to_string(),
        replacement,
        description: format!("Draft fix (review before applying): {}.", applied.join("; ")),
        requires_review: true,
    })
}

fn comment_prefix(language: LanguageFamily) -> &'static str {
    match language {
        LanguageFamily::Python | LanguageFamily::Ruby => "#",
        _ => "//",
    }
}

fn parameterize_sql(code: &str, language: LanguageFamily) -> Option<String> {
    let mut params: Vec<String> = Vec::new();
    let mut out = code.to_string();

    for re in SQL_CONCAT.iter() {
        out = re
            .replace_all(&out, |caps: &Captures| {
                let quote = &caps[0][..1];
                let head = caps[1].trim_end_matches(['\'', '"']);
                let tail = caps
                    .get(3)
                    .map(|m| m.as_str().trim_start_matches(['\'', '"']))
                    .unwrap_or("");
                params.push(caps[2].to_string());
                format!("{quote}{head}?{tail}{quote}")
            })
            .into_owned();
    }

    if params.is_empty() {
        return None;
    }
    Some(format!(
        "{}\n{} bind parameters in order: [{}]",
        out,
        comment_prefix(language),
        params.join(", ")
    ))
}

fn use_text_content(code: &str) -> Option<String> {
    let re = HTML_SINK.as_ref()?;
    if !re.is_match(code) {
        return None;
    }
    Some(re.replace_all(code, ".textContent$1").into_owned())
}

fn read_secrets_from_env(code: &str, language: LanguageFamily) -> Option<String> {
    let re = SECRET_LITERAL.as_ref()?;
    if !re.is_match(code) {
        return None;
    }
    let out = re.replace_all(code, |caps: &Captures| {
        let var = env_var_name(&caps[1]);
        let read = match language {
            LanguageFamily::JavaScript => format!("process.env.{}", var),
            LanguageFamily::Python => format!("os.environ[\"{}\"]", var),
            LanguageFamily::Java => format!("System.getenv(\"{}\")", var),
            LanguageFamily::Php => format!("getenv('{}')", var),
            LanguageFamily::Ruby => format!("ENV[\"{}\"]", var),
            LanguageFamily::Unknown => format!("getenv(\"{}\")", var),
        };
        format!("{}{}{}", &caps[1], &caps[2], read)
    });
    Some(out.into_owned())
}

/// `apiKey` → `API_KEY`, `db-password` → `DB_PASSWORD`.
fn env_var_name(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    let mut prev_lower = false;
    for c in ident.chars() {
        if c == '-' || c == '$' {
            out.push('_');
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        out.extend(c.to_uppercase());
    }
    out
}
