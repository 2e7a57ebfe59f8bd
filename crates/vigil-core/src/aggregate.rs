//! Finding aggregation and health scoring.
//!
//! Merges findings from the rule engine (primary detector) with findings
//! classified by a language model, and reduces a finding list to a
//! severity-weighted score.
//!
//! # Scoring
//!
//! ```text
//! score = 100 − min(100, Σ weight(severity))
//!
//! weight: critical 10 · high 5 · medium 2 · low 1
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{FindingSeverity, SecurityFinding, MODEL_SOURCE, PRIMARY_SOURCE};
use crate::text::{Range, TextDocument};

/// Severity-weighted health score in `0..=100`. An empty list scores 100.
pub fn health_score(findings: &[SecurityFinding]) -> u8 {
    let deduction: u32 = findings.iter().map(|f| f.severity.weight()).sum();
    (100 - deduction.min(100)) as u8
}

/// Coarse risk band for a health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Safe,
    Low,
    Medium,
    High,
}

impl SecurityLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => SecurityLevel::Safe,
            70..=89 => SecurityLevel::Low,
            50..=69 => SecurityLevel::Medium,
            _ => SecurityLevel::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Safe => "safe",
            SecurityLevel::Low => "low",
            SecurityLevel::Medium => "medium",
            SecurityLevel::High => "high",
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merge primary and model findings.
///
/// Untagged findings are attributed to the primary detector. Duplicates by
/// `(rule_id, start_offset)` are dropped, keeping the first occurrence, so
/// a rule finding wins over a model finding at the same spot.
pub fn merge_findings(
    primary: Vec<SecurityFinding>,
    model: Vec<SecurityFinding>,
) -> Vec<SecurityFinding> {
    let mut seen: HashSet<(String, usize)> = HashSet::new();
    let mut merged = Vec::with_capacity(primary.len() + model.len());

    for mut finding in primary.into_iter().chain(model) {
        if finding.source.is_none() {
            finding.source = Some(PRIMARY_SOURCE.to_string());
        }
        if seen.insert((finding.rule_id.clone(), finding.start_offset)) {
            merged.push(finding);
        }
    }

    merged
}

/// Group findings by severity, most severe first.
pub fn group_by_severity(
    findings: &[SecurityFinding],
) -> BTreeMap<FindingSeverity, Vec<SecurityFinding>> {
    let mut groups: BTreeMap<FindingSeverity, Vec<SecurityFinding>> = BTreeMap::new();
    for finding in findings {
        groups.entry(finding.severity).or_default().push(finding.clone());
    }
    groups
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelFinding {
    rule_id: String,
    message: String,
    severity: String,
    #[serde(default)]
    start_offset: usize,
    #[serde(default)]
    end_offset: usize,
}

/// Parse a model-produced JSON findings array.
///
/// The array may be wrapped in prose or a code fence. Offsets are relative
/// to the analysed region and are shifted by `base_offset` into document
/// coordinates, then clamped to the document. Entries with an unknown
/// severity are skipped. Malformed output yields an empty list.
pub fn findings_from_model_json(
    output: &str,
    doc: &dyn TextDocument,
    base_offset: usize,
) -> Vec<SecurityFinding> {
    let Some(json) = extract_json_array(output) else {
        log::debug!("model output contained no JSON array");
        return Vec::new();
    };

    let raw: Vec<ModelFinding> = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("ignoring malformed model findings: {}", e);
            return Vec::new();
        }
    };

    let len = doc.text().len();
    raw.into_iter()
        .filter_map(|f| {
            let severity = FindingSeverity::parse(&f.severity)?;
            let start = base_offset.saturating_add(f.start_offset).min(len);
            let end = base_offset.saturating_add(f.end_offset).clamp(start, len);
            Some(SecurityFinding {
                rule_id: f.rule_id,
                message: f.message,
                severity,
                start_offset: start,
                end_offset: end,
                range: Range::new(doc.position_at(start), doc.position_at(end)),
                source: Some(MODEL_SOURCE.to_string()),
            })
        })
        .collect()
}

fn extract_json_array(output: &str) -> Option<&str> {
    let start = output.find('[')?;
    let end = output.rfind(']')?;
    (end > start).then(|| &output[start..=end])
}
