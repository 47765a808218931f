//! System prompt templates for the LLM call sites: per-chunk extraction,
//! reduce-phase consolidation, grounded Q&A, and one-shot drafting assists.

use serde::Deserialize;

/// System prompt for a single chunk's risk extraction (map phase).
///
/// `chunk_context` is an advisory line describing the chunk's position
/// (e.g. "第 2/5 段，含甲方义务条款") so the model can calibrate severity
/// without seeing the rest of the contract.
#[must_use]
pub fn chunk_system_prompt(chunk_context: &str) -> String {
    format!(
        "你是一名合同审查助手，专注于识别合同文本中的风险条款。\n\
         {chunk_context}\n\n\
         仅依据给定文本识别风险，不要假设未出现的条款。输出必须是严格的 JSON 对象，\n\
         包含字段：risks（数组，每项含 level、title、clause、description、\n\
         recommendation、legal_basis、category，如未发现风险则为空数组）、\n\
         score（0-100 整数，仅针对本段文本的风险程度打分，分数越低风险越高）、\n\
         summary（字符串，本段内容的一句话概括）、key_terms（字符串数组，本段出现的\n\
         关键术语或定义）、suggestions（字符串数组，针对本段风险的修改建议）。\n\
         level 取值为 \"low\"、\"medium\" 或 \"high\"。不要输出 JSON 以外的任何文字。"
    )
}

/// System prompt for the reduce phase: consolidating per-chunk findings
/// into a single report. `chunk_count` lets the model reason about
/// cross-chunk duplication.
#[must_use]
pub fn consolidation_system_prompt(chunk_count: usize) -> String {
    format!(
        "你是一名合同审查助手，正在汇总来自 {chunk_count} 个文本片段的风险提取结果。\n\n\
         任务：去重合并重复风险，补全缺失条款评估，给出总体评分与签署建议。\n\
         输出必须是严格的 JSON 对象，包含字段：\n\
         score（0-100 整数）、risk_level（\"low\"/\"medium\"/\"high\"/\"critical\"）、\n\
         summary（字符串）、risks（数组，字段 level、title、clause、description、\n\
         recommendation、legal_basis、category）、dimension_scores（数组，字段\n\
         dimension、score、findings、recommendations）、missing_items（数组，字段\n\
         item、why_important、suggestion）、compliance_checklist（数组，字段 topic、\n\
         status、notes，status 取值 \"ok\"/\"risk\"/\"missing\"/\"na\"）、\n\
         contract_profile（对象，字段 contract_type、parties、term、subject_matter、\n\
         payment、delivery_and_acceptance、dispute_resolution）、\n\
         overall_suggestions（字符串数组）、key_facts_to_confirm（字符串数组）、\n\
         next_steps（字符串数组）、sign_recommendation（五选一的中文短语：可签署、\n\
         修改后签署、暂缓签署、建议拒绝、需人工复核）。不要输出 JSON 以外的任何文字。"
    )
}

/// System prompt for retrieval-grounded question answering.
///
/// The model must answer only from the supplied context and decline when
/// the context doesn't support an answer, citing the clauses it used.
#[must_use]
pub fn rag_system_prompt() -> String {
    "你是一名合同问答助手。只能依据下方提供的合同片段回答问题，不得使用片段之外的知识。\n\
     回答时须引用所依据的具体条款原文。如果提供的片段不足以回答问题，明确说明无法从\n\
     合同中找到依据，不要编造内容。回答使用中文，语气客观、简明。"
        .to_string()
}

/// Wraps an already-assembled RAG context (each retrieved chunk prefixed by
/// its similarity, in relevance order) into the user-turn content.
#[must_use]
pub fn rag_user_prompt(question: &str, context: &str) -> String {
    format!("合同片段：{context}\n\n问题：{question}")
}

/// A one-shot drafting assist requested alongside a contract excerpt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistAction {
    /// Plain-language summary of the excerpt.
    Summary,
    /// Pulls out defined terms and their definitions.
    ExtractTerms,
    /// Translates the excerpt (Chinese contracts to English and vice versa).
    Translate,
    /// Compares the excerpt against a standard-form version of the same clause.
    ClauseCompare,
}

/// System prompt for a single-shot [`AssistAction`] over `text`, given as
/// the user turn.
#[must_use]
pub fn assist_system_prompt(action: AssistAction) -> String {
    match action {
        AssistAction::Summary => {
            "你是一名合同审查助手。请用简明的中文概括下方合同片段的核心内容，\
             突出双方的主要权利义务，不超过 200 字。只输出概括内容，不要输出其他说明。"
                .to_string()
        }
        AssistAction::ExtractTerms => {
            "你是一名合同审查助手。请从下方合同片段中提取所有自定义术语及其定义，\
             以「术语：定义」的形式逐行列出。如果没有自定义术语，输出「未发现自定义术语」。\
             只输出列表内容，不要输出其他说明。"
                .to_string()
        }
        AssistAction::Translate => {
            "你是一名合同审查助手。请将下方合同片段翻译为另一种语言：中文原文译为英文，\
             英文原文译为中文。保持法律用语的准确性，不要省略条款内容。只输出译文，\
             不要输出原文或其他说明。"
                .to_string()
        }
        AssistAction::ClauseCompare => {
            "你是一名合同审查助手。请将下方合同片段与同类条款的行业通行写法进行比较，\
             指出偏离通行写法之处及其对各方的影响。只输出比较结果，不要输出其他说明。"
                .to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_system_prompt_includes_context() {
        let prompt = chunk_system_prompt("第 1/3 段");
        assert!(prompt.contains("第 1/3 段"));
        assert!(prompt.contains("JSON"));
        assert!(prompt.contains("score"));
        assert!(prompt.contains("key_terms"));
    }

    #[test]
    fn test_consolidation_system_prompt_includes_chunk_count() {
        let prompt = consolidation_system_prompt(7);
        assert!(prompt.contains('7'));
        assert!(prompt.contains("sign_recommendation"));
    }

    #[test]
    fn test_rag_system_prompt_forbids_outside_knowledge() {
        let prompt = rag_system_prompt();
        assert!(prompt.contains("片段之外"));
    }

    #[test]
    fn test_rag_user_prompt_includes_context_and_question() {
        let context = "\n\n---\n[相关度: 87.0%]\n条款一";
        let prompt = rag_user_prompt("违约责任是什么？", context);
        assert!(prompt.contains("[相关度: 87.0%]"));
        assert!(prompt.contains("违约责任是什么？"));
    }

    #[test]
    fn test_assist_system_prompt_varies_by_action() {
        let summary = assist_system_prompt(AssistAction::Summary);
        let terms = assist_system_prompt(AssistAction::ExtractTerms);
        let translate = assist_system_prompt(AssistAction::Translate);
        let compare = assist_system_prompt(AssistAction::ClauseCompare);
        assert_ne!(summary, terms);
        assert_ne!(translate, compare);
        assert!(terms.contains("术语"));
        assert!(translate.contains("翻译"));
    }
}
