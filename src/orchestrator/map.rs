//! Map phase: per-chunk risk extraction with bounded concurrency.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Deserialize;

use crate::core::{Chunk, Report, Risk};
use crate::llm::prompts::chunk_system_prompt;
use crate::llm::{ChatRequest, LlmClient};

/// Number of chunks analyzed concurrently.
pub const MAP_CONCURRENCY: usize = 4;

/// Mirrors [`Risk`] but keeps `level` as a raw string so an unrecognized
/// value can be repaired (coerced to `low`) instead of failing the whole
/// chunk's parse.
#[derive(Debug, Deserialize)]
struct RawRisk {
    #[serde(default)]
    level: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    clause: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    recommendation: Option<String>,
    #[serde(default)]
    legal_basis: Option<String>,
    #[serde(default = "default_category")]
    category: String,
}

fn default_category() -> String {
    "other".to_string()
}

impl From<RawRisk> for Risk {
    fn from(raw: RawRisk) -> Self {
        Self {
            level: crate::core::RiskLevel::parse_or_low(&raw.level),
            title: raw.title,
            clause: raw.clause,
            description: raw.description,
            recommendation: raw.recommendation,
            legal_basis: raw.legal_basis,
            category: raw.category,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChunkExtraction {
    #[serde(default)]
    risks: Vec<RawRisk>,
    score: Option<u8>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    key_terms: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

/// A single chunk's full extraction result: its risks plus the
/// lighter-weight signals (`score`, `summary`, `key_terms`, `suggestions`)
/// the reduce phase folds into the final report.
#[derive(Debug, Clone, Default)]
pub struct ChunkResult {
    pub risks: Vec<Risk>,
    pub score: Option<u8>,
    pub summary: String,
    pub key_terms: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Builds the advisory line describing a chunk's position and structure,
/// passed to the model so chunk-level severity judgments stay calibrated
/// without seeing the rest of the contract.
fn chunk_context(index: usize, total: usize, chunk: &Chunk) -> String {
    let segments: Vec<&str> = chunk
        .segments
        .iter()
        .map(|s| match s {
            crate::core::SegmentType::Article => "条款标题",
            crate::core::SegmentType::Clause => "子条款",
            crate::core::SegmentType::Header => "章节标题",
            crate::core::SegmentType::Signature => "签署信息",
            crate::core::SegmentType::Content => "正文",
        })
        .collect();
    format!(
        "这是合同的第 {}/{} 段，重要性：{:?}，包含结构：{}。",
        index + 1,
        total,
        chunk.importance,
        if segments.is_empty() { "无".to_string() } else { segments.join("、") }
    )
}

/// Extracts a single chunk's full result. Returns a default (empty risks,
/// no score) — a placeholder, not a pipeline failure — if the call or its
/// JSON cannot be used, so one bad chunk doesn't abort the whole analysis.
async fn extract_chunk_risks(llm: &dyn LlmClient, index: usize, total: usize, chunk: &Chunk) -> ChunkResult {
    let request = ChatRequest::new(chunk_system_prompt(&chunk_context(index, total, chunk)), chunk.content.clone())
        .json_mode(true)
        .max_retries(2)
        .timeout(std::time::Duration::from_secs(90));

    let output = match llm.chat(request).await {
        Ok(output) => output,
        Err(_) => return ChunkResult::default(),
    };

    let Some(json) = output.json else {
        return ChunkResult::default();
    };

    let extraction: ChunkExtraction = match serde_json::from_value(json) {
        Ok(extraction) => extraction,
        Err(_) => return ChunkResult::default(),
    };

    ChunkResult {
        risks: extraction.risks.into_iter().map(Risk::from).filter(Risk::is_valid).collect(),
        score: extraction.score,
        summary: extraction.summary,
        key_terms: extraction.key_terms,
        suggestions: extraction.suggestions,
    }
}

/// Runs chunk-level extraction across all chunks with at most `concurrency`
/// requests in flight at once.
pub async fn extract_all(llm: &Arc<dyn LlmClient>, chunks: &[Chunk], concurrency: usize) -> Vec<ChunkResult> {
    let total = chunks.len();
    stream::iter(chunks.iter().cloned().enumerate().collect::<Vec<_>>())
        .map(|(index, chunk)| {
            let llm = Arc::clone(llm);
            async move { extract_chunk_risks(llm.as_ref(), index, total, &chunk).await }
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await
}

/// Builds a fully degraded report directly from the chunk-level findings,
/// used when the reduce phase's consolidation call fails entirely. The
/// score is the mean of the chunks that returned one; chunks whose call
/// failed outright don't drag the average down.
#[must_use]
pub fn degraded_report(chunk_results: Vec<ChunkResult>) -> Report {
    let scores: Vec<u8> = chunk_results.iter().filter_map(|c| c.score).collect();
    #[allow(clippy::cast_possible_truncation)]
    let score = if scores.is_empty() {
        50
    } else {
        (scores.iter().map(|&s| u32::from(s)).sum::<u32>() / scores.len() as u32) as u8
    };
    let all_risks: Vec<Risk> = chunk_results.into_iter().flat_map(|c| c.risks).collect();

    let mut report = Report {
        score,
        risk_level: crate::core::ReportRiskLevel::from_score(score),
        summary: "未能完成模型汇总，以下风险为各分段独立识别结果的合并。".to_string(),
        contract_profile: crate::core::ContractProfile::default(),
        risk_categories: std::collections::BTreeMap::new(),
        dimension_scores: Vec::new(),
        missing_items: Vec::new(),
        compliance_checklist: Vec::new(),
        risks: all_risks,
        overall_suggestions: Vec::new(),
        key_facts_to_confirm: Vec::new(),
        next_steps: Vec::new(),
        sign_recommendation: crate::core::SignRecommendation::from_score(score),
    };
    report.dedup_and_sort_risks();
    report.derive_risk_categories();
    report
}
