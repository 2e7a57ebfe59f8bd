//! Prompt assembly and model-output post-processing.
//!
//! Every prompt follows the same shape: task instructions, retrieved
//! knowledge, rule findings, then the code under discussion. Parsing is
//! deliberately forgiving since the model's formatting is never
//! guaranteed.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{CompletionCandidate, KnowledgeDocument, SecurityFinding};
use crate::text::{Position, TextDocument};

/// Returned by advice requests when the model call fails.
pub const ADVICE_FALLBACK: &str =
    "Security advice is unavailable right now. Review the flagged code manually and try again.";

/// Returned by region analysis when the model call fails.
pub const ANALYSIS_FALLBACK: &str =
    "Security analysis failed. Check the model provider settings and try again.";

/// Risk label used when a completion matches no risk pattern.
pub const SAFE_SUGGESTION: &str = "safe suggestion";

/// Number of candidates requested from, and kept from, the model.
pub const COMPLETION_COUNT: usize = 3;

const NO_KNOWLEDGE: &str = "(no relevant security knowledge found)";
const NO_FINDINGS: &str = "(no rule findings)";

/// Ordered risk patterns for completion tagging. First match wins.
const RISK_PATTERN_SOURCES: &[(&str, &str)] = &[
    (r"\b(?:eval|execSync|spawn|system|popen|Function)\s*\(|child_process|subprocess\.|os\.system", "code-injection"),
    (r"innerHTML|outerHTML|document\.write|dangerouslySetInnerHTML|\.html\s*\(", "xss"),
    (r"(?i)\b(?:select|insert|update|delete|drop)\b.*\b(?:from|into|set|table|where)\b|\.(?:query|execute|raw)\s*\(", "sql-injection"),
    (r"(?i)password|passwd|secret|api[_-]?key|token|credential", "secret-handling"),
    (r"\b(?:fetch|axios|XMLHttpRequest|WebSocket|urlopen)\b|\bhttps?\.(?:get|request)\s*\(|\brequests\.(?:get|post|put|delete)\s*\(", "network"),
    (r"\.replace(?:All)?\s*\(|\bre\.sub\s*\(", "string-replace"),
    (r"\bnew\s+RegExp\s*\(|\bre\.(?:compile|match|search|fullmatch)\s*\(|\bRegex::new\s*\(", "regex"),
    (r"JSON\.parse\s*\(|json\.loads?\s*\(|serde_json::from_str", "json-parse"),
    (r"(?:encode|decode)URI(?:Component)?\s*\(|urllib\.parse\.(?:un)?quote|URLEncoder|URLDecoder", "url-encoding"),
    (r"\.to(?:Upper|Lower)Case\s*\(|\.(?:upper|lower|casefold)\s*\(\s*\)|\.to_(?:upper|lower)case\s*\(", "string-case"),
    (r"\b(?:try|catch|except|finally|throw|raise)\b", "error-handling"),
];

lazy_static! {
    static ref RISK_PATTERNS: Vec<(Regex, &'static str)> = RISK_PATTERN_SOURCES
        .iter()
        .filter_map(|(pattern, label)| match Regex::new(pattern) {
            Ok(re) => Some((re, *label)),
            Err(e) => {
                log::error!("risk pattern '{}' does not compile: {}", label, e);
                None
            }
        })
        .collect();
}

/// Coarse language family inferred from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageFamily {
    JavaScript,
    Python,
    Java,
    Php,
    Ruby,
    Unknown,
}

impl LanguageFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageFamily::JavaScript => "javascript/typescript",
            LanguageFamily::Python => "python",
            LanguageFamily::Java => "java",
            LanguageFamily::Php => "php",
            LanguageFamily::Ruby => "ruby",
            LanguageFamily::Unknown => "unknown",
        }
    }
}

/// Detect the language family from the extension of `uri`.
pub fn detect_language(uri: &str) -> LanguageFamily {
    let name = uri.rsplit(['/', '\\']).next().unwrap_or(uri);
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return LanguageFamily::Unknown,
    };
    match ext.as_str() {
        "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "mts" | "cts" => LanguageFamily::JavaScript,
        "py" | "pyw" => LanguageFamily::Python,
        "java" => LanguageFamily::Java,
        "php" => LanguageFamily::Php,
        "rb" | "erb" => LanguageFamily::Ruby,
        _ => LanguageFamily::Unknown,
    }
}

/// Code surrounding a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionContext {
    /// Up to `context_lines` whole lines before the cursor line.
    pub preceding: String,
    /// Current line up to the cursor.
    pub prefix: String,
}

impl CompletionContext {
    pub fn extract(doc: &dyn TextDocument, position: Position, context_lines: u32) -> Self {
        let first = position.line.saturating_sub(context_lines);
        let line_start = doc.offset_at(Position::new(position.line, 0));
        let context_start = doc.offset_at(Position::new(first, 0));
        let cursor = doc.offset_at(position).max(line_start);
        let text = doc.text();
        Self {
            preceding: text[context_start..line_start].to_string(),
            prefix: text[line_start..cursor].to_string(),
        }
    }

    /// Whether the prefix carries enough signal to be worth a model call.
    pub fn is_actionable(&self, min_prefix_chars: usize) -> bool {
        self.prefix.trim().chars().count() >= min_prefix_chars
    }
}

/// Join retrieved document contents for inclusion in a prompt.
pub fn format_knowledge(documents: &[KnowledgeDocument]) -> String {
    if documents.is_empty() {
        return NO_KNOWLEDGE.to_string();
    }
    documents
        .iter()
        .map(|d| format!("[{}] {}", d.metadata.category, d.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One line per finding: `- [severity] rule-id (line N): message`.
pub fn format_findings(findings: &[SecurityFinding]) -> String {
    if findings.is_empty() {
        return NO_FINDINGS.to_string();
    }
    findings
        .iter()
        .map(|f| {
            format!(
                "- [{}] {} (line {}): {}",
                f.severity,
                f.rule_id,
                f.range.start.line + 1,
                f.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn advice_prompt(
    code: &str,
    context: &str,
    knowledge: &[KnowledgeDocument],
    findings: &[SecurityFinding],
) -> String {
    let context = if context.trim().is_empty() {
        "(none)"
    } else {
        context
    };
    format!(
        "You are a senior application security engineer reviewing code.\n\n\
         Relevant security knowledge:\n{knowledge}\n\n\
         Static analysis findings:\n{findings}\n\n\
         Additional context:\n{context}\n\n\
         Code:\n```\n{code}\n```\n\n\
         Answer with these sections:\n\
         1. Potential issues\n\
         2. Risk impact\n\
         3. Fix suggestions\n\
         4. Best practices\n",
        knowledge = format_knowledge(knowledge),
        findings = format_findings(findings),
        context = context,
        code = code,
    )
}

pub fn completion_prompt(ctx: &CompletionContext, knowledge: &[KnowledgeDocument]) -> String {
    format!(
        "You are a security-aware code completion engine.\n\n\
         Relevant security knowledge:\n{knowledge}\n\n\
         Preceding code:\n```\n{preceding}```\n\n\
         Complete this line:\n```\n{prefix}\n```\n\n\
         Return exactly {count} alternative completions of the last line, one per line, \
         with no numbering, commentary, or code fences. Prefer parameterized queries over \
         string concatenation, escape or encode output before rendering it, and never \
         hardcode secrets.\n",
        knowledge = format_knowledge(knowledge),
        preceding = ctx.preceding,
        prefix = ctx.prefix,
        count = COMPLETION_COUNT,
    )
}

pub fn analysis_prompt(
    code: &str,
    language: LanguageFamily,
    knowledge: &[KnowledgeDocument],
    findings: &[SecurityFinding],
) -> String {
    format!(
        "You are a senior application security engineer. Analyze the following {lang} code.\n\n\
         Relevant security knowledge:\n{knowledge}\n\n\
         Static analysis findings:\n{findings}\n\n\
         Code:\n```\n{code}\n```\n\n\
         Produce a structured report:\n\
         ## Risk summary\n\
         ## Risk details (one subsection per risk explaining how it can be exploited)\n\
         ## Fix (concrete corrected code)\n\
         ## Best practices\n",
        lang = language.as_str(),
        knowledge = format_knowledge(knowledge),
        findings = format_findings(findings),
        code = code,
    )
}

/// Prompt asking for findings as a JSON array, for merging with rule output.
pub fn classification_prompt(
    code: &str,
    language: LanguageFamily,
    knowledge: &[KnowledgeDocument],
) -> String {
    format!(
        "You are a static security analyzer for {lang} code.\n\n\
         Relevant security knowledge:\n{knowledge}\n\n\
         Code:\n```\n{code}\n```\n\n\
         Report every security issue as a JSON array of objects with the keys \
         \"ruleId\" (kebab-case category), \"message\", \"severity\" \
         (critical, high, medium or low), \"startOffset\" and \"endOffset\" \
         (byte offsets into the code above). Return [] if there are no issues. \
         Output only the JSON array.\n",
        lang = language.as_str(),
        knowledge = format_knowledge(knowledge),
        code = code,
    )
}

/// First matching risk label for a completion, or [`SAFE_SUGGESTION`].
pub fn tag_completion(text: &str) -> &'static str {
    RISK_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, label)| *label)
        .unwrap_or(SAFE_SUGGESTION)
}

/// Split model output into at most [`COMPLETION_COUNT`] ranked candidates.
///
/// Blank lines and code-fence markers are dropped; candidates are never
/// filtered by their risk label.
pub fn parse_completions(output: &str) -> Vec<CompletionCandidate> {
    output
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with("```"))
        .take(COMPLETION_COUNT)
        .enumerate()
        .map(|(rank, line)| {
            let risk = tag_completion(line);
            CompletionCandidate {
                label: line.trim().to_string(),
                insert_text: line.to_string(),
                detail: risk.to_string(),
                documentation: if risk == SAFE_SUGGESTION {
                    "Security-aware suggestion.".to_string()
                } else {
                    format!("Touches {} sensitive code; review before accepting.", risk)
                },
                rank: rank as u32,
            }
        })
        .collect()
}
