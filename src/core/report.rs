//! The consolidated analysis report and its constituent findings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Minimum trimmed length of [`Risk::clause`].
pub const MIN_CLAUSE_LEN: usize = 10;
/// Minimum trimmed length of [`Risk::description`].
pub const MIN_DESCRIPTION_LEN: usize = 30;

/// Severity of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    // Ord derives low < medium < high; callers sort `Reverse` or compare
    // against `Ord::cmp` reversed to get high-first ordering.
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Parses a level string, case-insensitively; `None` if not recognized.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Coerces an unrecognized level to `Low`, per the map-phase validation
    /// rule.
    #[must_use]
    pub fn parse_or_low(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::Low)
    }

    /// Lowercase wire/display form (`"low"`, `"medium"`, `"high"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Overall report risk banding (distinct scale from [`RiskLevel`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportRiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ReportRiskLevel {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Derives the band from a 0-100 score: ≥80 low, ≥60 medium, ≥40 high,
    /// else critical.
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        if score >= 80 {
            Self::Low
        } else if score >= 60 {
            Self::Medium
        } else if score >= 40 {
            Self::High
        } else {
            Self::Critical
        }
    }
}

/// A single per-clause finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    pub level: RiskLevel,
    pub title: String,
    /// Verbatim quotation from the source text, 10-150 characters.
    pub clause: String,
    /// Risk explanation, at least 30 characters.
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal_basis: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "other".to_string()
}

impl Risk {
    /// `true` iff `clause`/`description` both meet the minimum trimmed
    /// length invariants.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.clause.trim().chars().count() >= MIN_CLAUSE_LEN
            && self.description.trim().chars().count() >= MIN_DESCRIPTION_LEN
    }

    /// Deduplication key: `(title, clause[:50])`.
    #[must_use]
    pub fn dedup_key(&self) -> (String, String) {
        let clause_prefix: String = self.clause.chars().take(50).collect();
        (self.title.clone(), clause_prefix)
    }
}

/// A scored analysis dimension (e.g. "payment terms", "termination").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: String,
    pub score: u8,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// A clause or provision the contract appears to be missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingItem {
    pub item: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub why_important: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Status of a single compliance checklist topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceStatus {
    Ok,
    Risk,
    Missing,
    Na,
}

/// One line of the compliance checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceItem {
    pub topic: String,
    pub status: ComplianceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Placeholder used for a `ContractProfile` field the model could not
/// determine.
pub const UNKNOWN_FIELD: &str = "未明确";

/// Typed snapshot of the contract's identifying facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractProfile {
    pub contract_type: String,
    #[serde(default)]
    pub parties: Vec<String>,
    pub term: String,
    pub subject_matter: String,
    pub payment: String,
    pub delivery_and_acceptance: String,
    pub dispute_resolution: String,
}

impl Default for ContractProfile {
    fn default() -> Self {
        Self {
            contract_type: UNKNOWN_FIELD.to_string(),
            parties: Vec::new(),
            term: UNKNOWN_FIELD.to_string(),
            subject_matter: UNKNOWN_FIELD.to_string(),
            payment: UNKNOWN_FIELD.to_string(),
            delivery_and_acceptance: UNKNOWN_FIELD.to_string(),
            dispute_resolution: UNKNOWN_FIELD.to_string(),
        }
    }
}

/// The recommended next action on the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignRecommendation {
    #[serde(rename = "可签署")]
    Sign,
    #[serde(rename = "修改后签署")]
    SignAfterRevision,
    #[serde(rename = "暂缓签署")]
    Defer,
    #[serde(rename = "建议拒绝")]
    Reject,
    #[serde(rename = "需人工复核")]
    NeedsManualReview,
}

impl SignRecommendation {
    /// Derives a recommendation from the overall score when the model
    /// omitted one: ≥70 manual-review-then-sign, ≥50 revise-then-sign, else
    /// defer.
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        if score >= 70 {
            Self::NeedsManualReview
        } else if score >= 50 {
            Self::SignAfterRevision
        } else {
            Self::Defer
        }
    }
}

/// The consolidated analysis output for one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub score: u8,
    pub risk_level: ReportRiskLevel,
    pub summary: String,
    #[serde(default)]
    pub contract_profile: ContractProfile,
    /// category -> distinct risk titles in that category.
    #[serde(default)]
    pub risk_categories: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub dimension_scores: Vec<DimensionScore>,
    #[serde(default)]
    pub missing_items: Vec<MissingItem>,
    #[serde(default)]
    pub compliance_checklist: Vec<ComplianceItem>,
    #[serde(default)]
    pub risks: Vec<Risk>,
    #[serde(default)]
    pub overall_suggestions: Vec<String>,
    #[serde(default)]
    pub key_facts_to_confirm: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    pub sign_recommendation: SignRecommendation,
}

impl Report {
    /// Sorts `risks` high→medium→low, preserving first-occurrence order
    /// within a level, and removes later duplicates sharing a dedup key.
    pub fn dedup_and_sort_risks(&mut self) {
        dedup_and_sort_risks(&mut self.risks);
    }

    /// Groups `risks` by category into `risk_categories`, mapping each
    /// category to its distinct titles in first-occurrence order.
    pub fn derive_risk_categories(&mut self) {
        self.risk_categories = group_risk_categories(&self.risks);
    }
}

/// Sorts `risks` high→medium→low (stable within a level) and drops later
/// entries that repeat an earlier `(title, clause[:50])` key.
pub fn dedup_and_sort_risks(risks: &mut Vec<Risk>) {
    let mut indexed: Vec<(usize, Risk)> = std::mem::take(risks).into_iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| b.level.cmp(&a.level).then(ia.cmp(ib)));

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(indexed.len());
    for (_, risk) in indexed {
        if seen.insert(risk.dedup_key()) {
            out.push(risk);
        }
    }
    *risks = out;
}

/// Groups risks by `category` (default "other"), mapping to the list of
/// distinct titles seen for that category, in first-occurrence order.
#[must_use]
pub fn group_risk_categories(risks: &[Risk]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for risk in risks {
        let titles = grouped.entry(risk.category.clone()).or_default();
        if !titles.contains(&risk.title) {
            titles.push(risk.title.clone());
        }
    }
    grouped
}

/// A source-linked annotation: a risk tied to its exact position in the
/// original contract text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub clause: String,
    pub risk: Risk,
    /// 0-based char offset into the source text where `clause` begins.
    pub position: usize,
}

impl Annotation {
    /// `true` iff `source_text[position..position+clause.len()] == clause`
    /// (compared on char boundaries, not raw bytes, since `position` is a
    /// char offset).
    #[must_use]
    pub fn is_consistent_with(&self, source_text: &str) -> bool {
        let slice: String = source_text
            .chars()
            .skip(self.position)
            .take(self.clause.chars().count())
            .collect();
        slice == self.clause
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn risk(level: RiskLevel, title: &str, clause: &str) -> Risk {
        Risk {
            level,
            title: title.to_string(),
            clause: clause.to_string(),
            description: "a".repeat(40),
            recommendation: None,
            legal_basis: None,
            category: "other".to_string(),
        }
    }

    #[test]
    fn test_risk_is_valid() {
        let valid = risk(RiskLevel::High, "t", "this is long enough");
        assert!(valid.is_valid());

        let mut too_short_clause = valid.clone();
        too_short_clause.clause = "太短".to_string();
        assert!(!too_short_clause.is_valid());

        let mut too_short_desc = valid.clone();
        too_short_desc.description = "short".to_string();
        assert!(!too_short_desc.is_valid());
    }

    #[test]
    fn test_report_risk_level_from_score() {
        assert_eq!(ReportRiskLevel::from_score(85), ReportRiskLevel::Low);
        assert_eq!(ReportRiskLevel::from_score(80), ReportRiskLevel::Low);
        assert_eq!(ReportRiskLevel::from_score(65), ReportRiskLevel::Medium);
        assert_eq!(ReportRiskLevel::from_score(45), ReportRiskLevel::High);
        assert_eq!(ReportRiskLevel::from_score(10), ReportRiskLevel::Critical);
    }

    #[test]
    fn test_sign_recommendation_from_score() {
        assert_eq!(SignRecommendation::from_score(75), SignRecommendation::NeedsManualReview);
        assert_eq!(SignRecommendation::from_score(55), SignRecommendation::SignAfterRevision);
        assert_eq!(SignRecommendation::from_score(10), SignRecommendation::Defer);
    }

    #[test]
    fn test_dedup_and_sort_risks_orders_by_level_then_first_seen() {
        let mut risks = vec![
            risk(RiskLevel::Low, "a", "clause aaaaaaaaaa"),
            risk(RiskLevel::High, "b", "clause bbbbbbbbbb"),
            risk(RiskLevel::Medium, "c", "clause cccccccccc"),
            risk(RiskLevel::High, "d", "clause dddddddddd"),
        ];
        dedup_and_sort_risks(&mut risks);
        let titles: Vec<&str> = risks.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn test_dedup_and_sort_risks_drops_duplicates_keeping_most_severe() {
        let mut risks = vec![
            risk(RiskLevel::Low, "same", "clause identical text"),
            risk(RiskLevel::High, "same", "clause identical text"),
        ];
        dedup_and_sort_risks(&mut risks);
        assert_eq!(risks.len(), 1);
        assert_eq!(risks[0].level, RiskLevel::High);
    }

    #[test]
    fn test_group_risk_categories() {
        let mut a = risk(RiskLevel::High, "late fee", "clause one here");
        a.category = "payment".to_string();
        let mut b = risk(RiskLevel::Low, "termination notice", "clause two here");
        b.category = "payment".to_string();
        let mut c = risk(RiskLevel::Medium, "venue", "clause three here");
        c.category = "dispute".to_string();

        let grouped = group_risk_categories(&[a, b, c]);
        assert_eq!(grouped["payment"], vec!["late fee", "termination notice"]);
        assert_eq!(grouped["dispute"], vec!["venue"]);
    }

    #[test]
    fn test_annotation_consistency() {
        let source = "Hello 世界 contract text here";
        let annotation = Annotation {
            id: "1".to_string(),
            clause: "世界".to_string(),
            risk: risk(RiskLevel::Low, "t", "clause text long enough"),
            position: 6,
        };
        assert!(annotation.is_consistent_with(source));

        let mismatched = Annotation { position: 0, ..annotation };
        assert!(!mismatched.is_consistent_with(source));
    }
}
