//! Renders a [`Report`] into a flat text document for export.
//!
//! The client converts this text into a `.docx` file; the engine's job is
//! only to produce well-structured, complete plain text.

use std::fmt::Write as _;

use crate::core::{Annotation, Report};

/// Renders `report` (plus the original `content` and any source-linked
/// `annotations`) as a single formatted text document.
#[must_use]
pub fn render_report(report: &Report, content: &str, annotations: &[Annotation]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "合同审查报告");
    let _ = writeln!(out, "总体评分：{} / 100", report.score);
    let _ = writeln!(out, "风险等级：{:?}", report.risk_level);
    let _ = writeln!(out, "签署建议：{:?}", report.sign_recommendation);
    let _ = writeln!(out, "\n概述\n{}", report.summary);

    let profile = &report.contract_profile;
    let _ = writeln!(out, "\n合同概况");
    let _ = writeln!(out, "类型：{}", profile.contract_type);
    let _ = writeln!(out, "当事人：{}", profile.parties.join("、"));
    let _ = writeln!(out, "期限：{}", profile.term);
    let _ = writeln!(out, "标的：{}", profile.subject_matter);
    let _ = writeln!(out, "付款：{}", profile.payment);
    let _ = writeln!(out, "交付与验收：{}", profile.delivery_and_acceptance);
    let _ = writeln!(out, "争议解决：{}", profile.dispute_resolution);

    if !report.dimension_scores.is_empty() {
        let _ = writeln!(out, "\n维度评分");
        for dim in &report.dimension_scores {
            let _ = writeln!(out, "- {}：{} 分", dim.dimension, dim.score);
            for finding in &dim.findings {
                let _ = writeln!(out, "  发现：{finding}");
            }
            for rec in &dim.recommendations {
                let _ = writeln!(out, "  建议：{rec}");
            }
        }
    }

    if !report.risks.is_empty() {
        let _ = writeln!(out, "\n风险清单（共 {} 项）", report.risks.len());
        for (i, risk) in report.risks.iter().enumerate() {
            let _ = writeln!(out, "{}. [{:?}] {}", i + 1, risk.level, risk.title);
            let _ = writeln!(out, "   条款：{}", risk.clause);
            let _ = writeln!(out, "   说明：{}", risk.description);
            if let Some(rec) = &risk.recommendation {
                let _ = writeln!(out, "   建议：{rec}");
            }
            if let Some(basis) = &risk.legal_basis {
                let _ = writeln!(out, "   法律依据：{basis}");
            }
        }
    }

    if !report.missing_items.is_empty() {
        let _ = writeln!(out, "\n缺失条款");
        for item in &report.missing_items {
            let _ = writeln!(out, "- {}", item.item);
        }
    }

    if !report.compliance_checklist.is_empty() {
        let _ = writeln!(out, "\n合规检查");
        for item in &report.compliance_checklist {
            let _ = writeln!(out, "- {}：{:?}", item.topic, item.status);
        }
    }

    if !report.overall_suggestions.is_empty() {
        let _ = writeln!(out, "\n总体建议");
        for s in &report.overall_suggestions {
            let _ = writeln!(out, "- {s}");
        }
    }

    if !report.key_facts_to_confirm.is_empty() {
        let _ = writeln!(out, "\n待确认事项");
        for s in &report.key_facts_to_confirm {
            let _ = writeln!(out, "- {s}");
        }
    }

    if !report.next_steps.is_empty() {
        let _ = writeln!(out, "\n后续步骤");
        for s in &report.next_steps {
            let _ = writeln!(out, "- {s}");
        }
    }

    if !annotations.is_empty() {
        let _ = writeln!(out, "\n原文标注（共 {} 处，对照原文见下）", annotations.len());
        for annotation in annotations {
            let consistent = annotation.is_consistent_with(content);
            let _ = writeln!(
                out,
                "- 位置 {}：{}{}",
                annotation.position,
                annotation.clause,
                if consistent { "" } else { "（与原文不一致，位置可能已过期）" }
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ContractProfile, ReportRiskLevel, Risk, RiskLevel, SignRecommendation};
    use std::collections::BTreeMap;

    fn sample_report() -> Report {
        Report {
            score: 72,
            risk_level: ReportRiskLevel::Medium,
            summary: "总体风险可控。".to_string(),
            contract_profile: ContractProfile::default(),
            risk_categories: BTreeMap::new(),
            dimension_scores: Vec::new(),
            missing_items: Vec::new(),
            compliance_checklist: Vec::new(),
            risks: vec![Risk {
                level: RiskLevel::High,
                title: "付款条款模糊".to_string(),
                clause: "甲方应及时支付款项".to_string(),
                description: "未约定具体付款期限，存在拖延付款的风险。".to_string(),
                recommendation: Some("明确付款期限与违约金比例。".to_string()),
                legal_basis: None,
                category: "payment".to_string(),
            }],
            overall_suggestions: vec!["建议补充付款期限条款。".to_string()],
            key_facts_to_confirm: Vec::new(),
            next_steps: Vec::new(),
            sign_recommendation: SignRecommendation::SignAfterRevision,
        }
    }

    #[test]
    fn test_render_report_includes_score_and_risks() {
        let report = sample_report();
        let text = render_report(&report, "合同正文", &[]);
        assert!(text.contains("72"));
        assert!(text.contains("付款条款模糊"));
        assert!(text.contains("建议补充付款期限条款。"));
    }

    #[test]
    fn test_render_report_flags_inconsistent_annotation() {
        let report = sample_report();
        let annotation = Annotation {
            id: "a1".to_string(),
            clause: "不存在的条款原文".to_string(),
            risk: report.risks[0].clone(),
            position: 0,
        };
        let text = render_report(&report, "合同正文", std::slice::from_ref(&annotation));
        assert!(text.contains("与原文不一致"));
    }
}
