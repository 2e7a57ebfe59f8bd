//! Built-in regex rules.
//!
//! | Rule | Severity | Detects |
//! |------|----------|---------|
//! | `sql-injection` | critical | SQL keywords in strings built by concatenation or interpolation; `execute`-like calls with concatenated arguments |
//! | `xss` | critical | `innerHTML`/`outerHTML` assignment from a variable, `document.write`, jQuery `.html(var)` |
//! | `sensitive-data` | high | Secret-like names assigned string literals; logging calls that mention secrets |
//!
//! Detection is pattern-based and line-oriented where possible. Queries with
//! `?` placeholders and a separate parameter list, `textContent` assignment,
//! and environment-variable reads never match.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;

use super::{Rule, RuleMatch};
use crate::models::FindingSeverity;

lazy_static! {
    /// SQL built from untrusted input.
    pub static ref SQL_INJECTION_PATTERNS: Vec<(&'static str, &'static str)> = vec![
        (
            r#"(?i)["'`][^\n;]*?\b(?:SELECT|INSERT|UPDATE|DELETE|DROP)\b[^\n;]*?["'`]\s*\+\s*[A-Za-z_$][\w$.]*"#,
            "SQL query built by string concatenation with a variable",
        ),
        (
            r"(?i)`[^`]*?\b(?:SELECT|INSERT|UPDATE|DELETE|DROP)\b[^`]*?\$\{[^}`]*\}[^`]*`",
            "SQL query built with template interpolation",
        ),
        (
            r#"(?i)\bf["'][^"'\n]*\b(?:SELECT|INSERT|UPDATE|DELETE|DROP)\b[^"'\n]*\{[^}\n]+\}"#,
            "SQL query built with an f-string",
        ),
        (
            r#"(?i)["'][^"'\n]*\b(?:SELECT|INSERT|UPDATE|DELETE|DROP)\b[^"'\n]*["']\s*(?:%\s*[A-Za-z_(]|\.format\s*\()"#,
            "SQL query built with string formatting",
        ),
        (
            r#"\b(?:execute|exec|query|raw|executeQuery|executeUpdate)\s*\(\s*(?:[A-Za-z_$][\w$.]*\s*\+|["'`][^"'`\n]*["'`]\s*\+\s*[A-Za-z_$])"#,
            "Query execution with a concatenated argument",
        ),
    ];

    /// Untrusted data written into the DOM as HTML.
    pub static ref XSS_PATTERNS: Vec<(&'static str, &'static str)> = vec![
        (
            r#"\.(?:innerHTML|outerHTML)\s*\+?=\s*(?:[A-Za-z_$][\w$.\[\]]*|["'][^"'\n]*["']\s*\+\s*[A-Za-z_$][\w$.]*|`[^`]*\$\{[^}`]*\}[^`]*`)"#,
            "HTML property assigned from a variable",
        ),
        (
            r#"\bdocument\.write(?:ln)?\s*\(\s*(?:[A-Za-z_$][\w$.]*|["'`][^"'`\n]*["'`]\s*\+)"#,
            "document.write with dynamic content",
        ),
        (
            r"\.html\s*\(\s*[A-Za-z_$][\w$.]*\s*\)",
            "jQuery .html() called with a variable",
        ),
    ];

    /// Hardcoded or logged secrets.
    pub static ref SENSITIVE_DATA_PATTERNS: Vec<(&'static str, &'static str)> = vec![
        (
            r#"(?i)\b[\w$]*(?:password|passwd|pwd|api[_-]?key|secret|token|credential)[\w$]*["']?\s*[:=]\s*["'][^"'\n]+["']"#,
            "Hardcoded secret assigned to a variable",
        ),
        (
            r"(?i)\b(?:console\.(?:log|info|warn|error|debug)|print|println!|logger\.\w+|logging\.\w+|log\.\w+|System\.out\.println)\s*\([^)\n]*(?:password|api_?key|secret|token)",
            "Sensitive value written to logs",
        ),
    ];
}

/// A rule backed by a list of compiled regex patterns.
///
/// Every non-overlapping occurrence of every pattern yields one match.
pub struct PatternRule {
    id: String,
    name: String,
    description: String,
    severity: FindingSeverity,
    patterns: Vec<(Regex, String)>,
}

impl PatternRule {
    /// Compile a pattern rule.
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending pattern if any fails to compile.
    pub fn new(
        id: &str,
        name: &str,
        description: &str,
        severity: FindingSeverity,
        patterns: &[(&str, &str)],
    ) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|(pattern, message)| {
                Regex::new(pattern)
                    .with_context(|| format!("invalid pattern for rule '{}': {}", id, pattern))
                    .map(|re| (re, message.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            severity,
            patterns,
        })
    }
}

impl Rule for PatternRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn severity(&self) -> FindingSeverity {
        self.severity
    }

    fn check(&self, text: &str) -> Result<Vec<RuleMatch>> {
        let mut matches = Vec::new();
        for (re, message) in &self.patterns {
            for m in re.find_iter(text) {
                matches.push(RuleMatch {
                    start: m.start(),
                    end: m.end(),
                    message: message.clone(),
                });
            }
        }
        matches.sort_by_key(|m| m.start);
        Ok(matches)
    }
}

pub fn sql_injection_rule() -> Result<PatternRule> {
    PatternRule::new(
        "sql-injection",
        "SQL Injection",
        "SQL queries assembled from untrusted input",
        FindingSeverity::Critical,
        &SQL_INJECTION_PATTERNS,
    )
}

pub fn xss_rule() -> Result<PatternRule> {
    PatternRule::new(
        "xss",
        "Cross-Site Scripting",
        "Untrusted data rendered as HTML",
        FindingSeverity::Critical,
        &XSS_PATTERNS,
    )
}

pub fn sensitive_data_rule() -> Result<PatternRule> {
    PatternRule::new(
        "sensitive-data",
        "Sensitive Data Exposure",
        "Hardcoded credentials and secrets in logs",
        FindingSeverity::High,
        &SENSITIVE_DATA_PATTERNS,
    )
}

/// All built-in rules in their default execution order.
pub fn builtin_rules() -> Result<Vec<Box<dyn Rule>>> {
    Ok(vec![
        Box::new(sql_injection_rule()?),
        Box::new(xss_rule()?),
        Box::new(sensitive_data_rule()?),
    ])
}
