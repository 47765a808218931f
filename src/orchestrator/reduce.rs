//! Reduce phase: consolidating per-chunk findings into a single report.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Deserialize;

use crate::core::{
    dedup_and_sort_risks, ComplianceItem, ContractProfile, DimensionScore, MissingItem, Report,
    ReportRiskLevel, Risk, SignRecommendation,
};
use crate::llm::prompts::consolidation_system_prompt;
use crate::llm::{ChatRequest, LlmClient};
use crate::orchestrator::map::ChunkResult;

/// Risks above this count are truncated (most severe kept) before being
/// handed to the consolidation call, so the reducer prompt stays bounded.
pub const MAX_RISKS_FOR_REDUCER: usize = 80;

/// Character budget for the reducer's user-turn content.
pub const MAX_REDUCER_CHARS: usize = 8_000;

/// Per-line character budget for a risk's clause excerpt.
const MAX_CLAUSE_LINE_CHARS: usize = 120;
/// Per-line character budget for a risk's description.
const MAX_DESCRIPTION_LINE_CHARS: usize = 200;

/// Truncates `s` to at most `max_chars` chars (counting chars, not bytes,
/// so multi-byte Chinese text isn't split mid-character), appending `…`
/// when truncation actually happened.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    let mut truncated: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        truncated.push('…');
    }
    truncated
}

/// Renders `risks` as one line each — level, title, truncated clause,
/// truncated description, legal basis — so the reducer prompt stays
/// scannable and bounded regardless of how verbose individual findings are.
fn render_risks_line_oriented(risks: &[Risk]) -> String {
    let mut out = String::new();
    for risk in risks {
        let clause = truncate_chars(&risk.clause, MAX_CLAUSE_LINE_CHARS);
        let description = truncate_chars(&risk.description, MAX_DESCRIPTION_LINE_CHARS);
        let legal_basis = risk.legal_basis.as_deref().unwrap_or("无");
        let _ = writeln!(
            out,
            "- [{}] {} | 条款：{} | 说明：{} | 法律依据：{}",
            risk.level.as_str(),
            risk.title,
            clause,
            description,
            legal_basis,
        );
    }
    out
}

/// Renders each chunk's one-line summary, numbered by chunk position.
fn render_chunk_summaries(chunk_results: &[ChunkResult]) -> String {
    let mut out = String::new();
    for (index, chunk) in chunk_results.iter().enumerate() {
        if chunk.summary.trim().is_empty() {
            continue;
        }
        let _ = writeln!(out, "- 第 {} 段：{}", index + 1, chunk.summary);
    }
    out
}

/// Flattens every chunk's suggestions into a single deduplicated list,
/// preserving first-seen order.
fn flatten_chunk_suggestions(chunk_results: &[ChunkResult]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut suggestions = Vec::new();
    for chunk in chunk_results {
        for suggestion in &chunk.suggestions {
            if seen.insert(suggestion.clone()) {
                suggestions.push(suggestion.clone());
            }
        }
    }
    suggestions
}

#[derive(Debug, Default, Deserialize)]
struct ReducerOutput {
    score: Option<u8>,
    risk_level: Option<String>,
    summary: Option<String>,
    contract_profile: Option<ContractProfile>,
    #[serde(default)]
    dimension_scores: Vec<DimensionScore>,
    #[serde(default)]
    missing_items: Vec<MissingItem>,
    #[serde(default)]
    compliance_checklist: Vec<ComplianceItem>,
    #[serde(default)]
    risks: Vec<Risk>,
    #[serde(default)]
    overall_suggestions: Vec<String>,
    #[serde(default)]
    key_facts_to_confirm: Vec<String>,
    #[serde(default)]
    next_steps: Vec<String>,
    sign_recommendation: Option<String>,
}

fn parse_sign_recommendation(s: &str) -> Option<SignRecommendation> {
    match s {
        "可签署" => Some(SignRecommendation::Sign),
        "修改后签署" => Some(SignRecommendation::SignAfterRevision),
        "暂缓签署" => Some(SignRecommendation::Defer),
        "建议拒绝" => Some(SignRecommendation::Reject),
        "需人工复核" => Some(SignRecommendation::NeedsManualReview),
        _ => None,
    }
}

/// Keeps the reducer's risk list bounded: dedup/sort first (most severe,
/// first-seen order), then truncate to [`MAX_RISKS_FOR_REDUCER`].
#[must_use]
pub fn prepare_reducer_risks(mut risks: Vec<Risk>) -> Vec<Risk> {
    dedup_and_sort_risks(&mut risks);
    risks.truncate(MAX_RISKS_FOR_REDUCER);
    risks
}

/// Runs the consolidation call and normalizes its output into a [`Report`].
///
/// Falls back field-by-field when the model omits a value (score defaults
/// to 50, risk level/sign recommendation derive from the score, an empty
/// risk list falls back to the chunk-level union). Returns `Err` only when
/// the call fails outright or the JSON cannot be parsed at all — the caller
/// is expected to fall back to [`super::map::degraded_report`] in that case.
///
/// # Errors
///
/// Returns [`crate::error::Error`] if the chat call fails or its response
/// cannot be parsed as JSON.
pub async fn consolidate(
    llm: &dyn LlmClient,
    chunk_results: Vec<ChunkResult>,
    chunk_count: usize,
) -> crate::error::Result<Report> {
    let chunk_risks: Vec<Risk> = chunk_results.iter().flat_map(|c| c.risks.clone()).collect();
    let reducer_risks = prepare_reducer_risks(chunk_risks.clone());
    let risk_lines = render_risks_line_oriented(&reducer_risks);
    let chunk_summaries = render_chunk_summaries(&chunk_results);
    let suggestions = flatten_chunk_suggestions(&chunk_results);
    let suggestions_list =
        if suggestions.is_empty() { "无".to_string() } else { suggestions.iter().map(|s| format!("- {s}")).collect::<Vec<_>>().join("\n") };

    let user = format!(
        "各分段概括：\n{chunk_summaries}\n\
         识别到的风险（每行一条）：\n{risk_lines}\n\
         各分段的修改建议：\n{suggestions_list}\n\n\
         请输出汇总后的完整 JSON 报告。"
    );

    let request = ChatRequest::new(consolidation_system_prompt(chunk_count), user)
        .json_mode(true)
        .max_retries(2)
        .max_content_chars(MAX_REDUCER_CHARS)
        .timeout(Duration::from_secs(90));

    let output = llm.chat(request).await?;
    let json = output.json.ok_or(crate::error::LlmError::JsonParseFailed)?;
    let parsed: ReducerOutput =
        serde_json::from_value(json).map_err(|_| crate::error::LlmError::JsonParseFailed)?;

    let score = parsed.score.unwrap_or(50);
    let risk_level = parsed
        .risk_level
        .as_deref()
        .and_then(ReportRiskLevel::parse)
        .unwrap_or_else(|| ReportRiskLevel::from_score(score));
    let sign_recommendation = parsed
        .sign_recommendation
        .as_deref()
        .and_then(parse_sign_recommendation)
        .unwrap_or_else(|| SignRecommendation::from_score(score));

    let risks = if parsed.risks.is_empty() { chunk_risks } else { parsed.risks };

    let mut report = Report {
        score,
        risk_level,
        summary: parsed.summary.unwrap_or_default(),
        contract_profile: parsed.contract_profile.unwrap_or_default(),
        risk_categories: std::collections::BTreeMap::new(),
        dimension_scores: parsed.dimension_scores,
        missing_items: parsed.missing_items,
        compliance_checklist: parsed.compliance_checklist,
        risks,
        overall_suggestions: parsed.overall_suggestions,
        key_facts_to_confirm: parsed.key_facts_to_confirm,
        next_steps: parsed.next_steps,
        sign_recommendation,
    };
    report.dedup_and_sort_risks();
    report.derive_risk_categories();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RiskLevel;
    use crate::llm::{ChatOutput, ScriptedLlmClient};

    fn sample_risk(title: &str) -> Risk {
        Risk {
            level: RiskLevel::High,
            title: title.to_string(),
            clause: "这是一个足够长的条款原文片段内容".to_string(),
            description: "这是一个足够长的风险说明文字，用来满足最短长度校验规则".to_string(),
            recommendation: None,
            legal_basis: None,
            category: "other".to_string(),
        }
    }

    fn sample_chunk_result(title: &str) -> ChunkResult {
        ChunkResult {
            risks: vec![sample_risk(title)],
            score: Some(70),
            summary: format!("{title} 分段概括"),
            key_terms: vec![],
            suggestions: vec!["补充相关条款".to_string()],
        }
    }

    #[test]
    fn test_render_risks_line_oriented_truncates_long_fields() {
        let mut risk = sample_risk("长条款");
        risk.clause = "很长".repeat(100);
        risk.description = "说明".repeat(150);
        let rendered = render_risks_line_oriented(&[risk]);
        let line = rendered.lines().next().unwrap();
        assert!(line.contains('…'));
    }

    #[test]
    fn test_prepare_reducer_risks_truncates_and_sorts() {
        let risks: Vec<Risk> = (0..100).map(|i| sample_risk(&format!("risk-{i}"))).collect();
        let prepared = prepare_reducer_risks(risks);
        assert_eq!(prepared.len(), MAX_RISKS_FOR_REDUCER);
    }

    #[tokio::test]
    async fn test_consolidate_fills_defaults_when_model_omits_fields() {
        let json = serde_json::json!({"summary": "合同整体风险可控。"});
        let llm = ScriptedLlmClient::new().with_response(ChatOutput {
            text: json.to_string(),
            json: Some(json),
        });

        let report = consolidate(&llm, vec![sample_chunk_result("a")], 3).await.unwrap();
        assert_eq!(report.score, 50);
        assert_eq!(report.risk_level, ReportRiskLevel::from_score(50));
        assert_eq!(report.risks.len(), 1);
        assert_eq!(report.sign_recommendation, SignRecommendation::from_score(50));
    }

    #[tokio::test]
    async fn test_consolidate_prefers_model_risks_when_present() {
        let model_risks = vec![sample_risk("model-found")];
        let json = serde_json::json!({"score": 80, "risks": model_risks});
        let llm = ScriptedLlmClient::new().with_response(ChatOutput {
            text: json.to_string(),
            json: Some(json),
        });

        let report = consolidate(&llm, vec![sample_chunk_result("chunk-found")], 1).await.unwrap();
        assert_eq!(report.risks.len(), 1);
        assert_eq!(report.risks[0].title, "model-found");
    }

    #[tokio::test]
    async fn test_consolidate_errors_when_chat_fails() {
        let llm = ScriptedLlmClient::new();
        let result = consolidate(&llm, vec![], 0).await;
        assert!(result.is_err());
    }
}
