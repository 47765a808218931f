//! Language-aware structural chunker for legal contract text.
//!
//! Recognizes articles, numbered/lettered clauses, section headers, and
//! signature blocks in both Chinese and English contracts, packs them into
//! token-bounded chunks, and carries an overlap tail across chunk
//! boundaries so downstream per-chunk analysis retains local context.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::{
    estimate_tokens, Chunk, ChunkBuilder, Importance, Language, SegmentType, OVERLAP_MARKER,
};
use crate::error::Result;

use super::traits::{Chunker, ChunkerConfig};

struct Segment {
    content: String,
    segment_type: SegmentType,
    importance: Importance,
}

// --- Chinese structural patterns -------------------------------------------------

static ZH_ARTICLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^第[一二三四五六七八九十百千万\d]+[条章节款项]").unwrap());
static ZH_NUMBERED_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[（(]?[一二三四五六七八九十\d]+[、．.）)]").unwrap());
static ZH_SUB_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([①②③④⑤⑥⑦⑧⑨⑩]|\d[.)、])").unwrap());
static ZH_SIGNATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(甲方|乙方|丙方|签章|签字|盖章|日期|地址)").unwrap());

const ZH_BRACKET_PAIRS: &[(char, char)] = &[('【', '】'), ('《', '》'), ('〔', '〕')];

fn match_zh_line(line: &str) -> Option<(SegmentType, Importance)> {
    let trimmed = line.trim_start();
    if ZH_ARTICLE.is_match(trimmed) {
        return Some((SegmentType::Article, Importance::High));
    }
    let trimmed_full = line.trim();
    if let Some(first) = trimmed_full.chars().next() {
        if let Some(&(open, close)) = ZH_BRACKET_PAIRS.iter().find(|(o, _)| *o == first) {
            if trimmed_full.ends_with(close) {
                return Some((SegmentType::Header, Importance::High));
            }
        }
    }
    if ZH_SIGNATURE.is_match(trimmed) {
        return Some((SegmentType::Signature, Importance::Low));
    }
    if ZH_NUMBERED_CLAUSE.is_match(trimmed) {
        return Some((SegmentType::Clause, Importance::High));
    }
    if ZH_SUB_CLAUSE.is_match(line) {
        return Some((SegmentType::Clause, Importance::High));
    }
    None
}

// --- English structural patterns -------------------------------------------------

static EN_ARTICLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(article|section)\s*[\d.]+").unwrap());
static EN_NUMBERED_CLAUSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s+").unwrap());
// Matches both bracketed "(a)" and bare "a)" lettered sub-clause markers.
static EN_SUB_CLAUSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\(?[a-z]\)\s*").unwrap());
static EN_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(in witness whereof|executed|signature|date|address)").unwrap()
});

fn is_all_uppercase_header(line: &str) -> bool {
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
}

fn match_en_line(line: &str) -> Option<(SegmentType, Importance)> {
    let trimmed = line.trim();
    if EN_ARTICLE.is_match(trimmed) {
        return Some((SegmentType::Article, Importance::High));
    }
    if is_all_uppercase_header(trimmed) {
        return Some((SegmentType::Header, Importance::High));
    }
    if EN_SIGNATURE.is_match(trimmed) {
        return Some((SegmentType::Signature, Importance::Low));
    }
    if EN_NUMBERED_CLAUSE.is_match(trimmed) {
        return Some((SegmentType::Clause, Importance::High));
    }
    if EN_SUB_CLAUSE.is_match(trimmed) {
        return Some((SegmentType::Clause, Importance::High));
    }
    None
}

fn match_line(line: &str, language: Language) -> Option<(SegmentType, Importance)> {
    match language {
        Language::Zh => match_zh_line(line),
        Language::En => match_en_line(line),
    }
}

/// Splits `text` into sentences, keeping the terminating punctuation on the
/// preceding sentence.
fn split_sentences(text: &str, language: Language) -> Vec<String> {
    match language {
        Language::Zh => split_sentences_zh(text),
        Language::En => split_sentences_en(text),
    }
}

fn split_sentences_zh(text: &str) -> Vec<String> {
    const TERMINATORS: &[char] = &['。', '！', '？', '；', ';', '!', '?'];
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if TERMINATORS.contains(&c) {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
}

static EN_SENTENCE_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?;]\s+").unwrap());

fn split_sentences_en(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last = 0;
    for m in EN_SENTENCE_BOUNDARY.find_iter(text) {
        // Keep the terminating punctuation (the match's first byte) attached
        // to the sentence that precedes it; drop the whitespace that follows.
        let punct_end = m.start() + 1;
        sentences.push(text[last..punct_end].to_string());
        last = m.end();
    }
    if last < text.len() {
        sentences.push(text[last..].to_string());
    }
    sentences.into_iter().filter(|s| !s.trim().is_empty()).collect()
}

/// Walks non-empty lines, starting a new segment at each structural match
/// and extending the current segment with everything else. Blank lines
/// insert a blank line into the current segment's content.
fn build_segments(text: &str, language: Language) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut current: Option<(Vec<String>, SegmentType, Importance)> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            if let Some((lines, ..)) = current.as_mut() {
                lines.push(String::new());
            }
            continue;
        }

        if let Some((segment_type, importance)) = match_line(line, language) {
            if let Some((lines, segment_type, importance)) = current.take() {
                segments.push(Segment {
                    content: lines.join("\n"),
                    segment_type,
                    importance,
                });
            }
            current = Some((vec![line.to_string()], segment_type, importance));
        } else {
            match current.as_mut() {
                Some((lines, ..)) => lines.push(line.to_string()),
                None => current = Some((vec![line.to_string()], SegmentType::Content, Importance::Normal)),
            }
        }
    }

    if let Some((lines, segment_type, importance)) = current.take() {
        segments.push(Segment {
            content: lines.join("\n"),
            segment_type,
            importance,
        });
    }

    segments
}

/// Builds the overlap tail from the end of `prev`: repeatedly prepends
/// sentences until the accumulated token estimate reaches
/// `config.overlap_tokens`.
fn build_overlap_tail(prev: &Chunk, config: &ChunkerConfig, language: Language) -> Option<String> {
    let sentences = split_sentences(&prev.content, language);
    if sentences.is_empty() {
        return None;
    }

    let mut tail: Vec<&str> = Vec::new();
    let mut tail_tokens = 0;
    for sentence in sentences.iter().rev() {
        tail.insert(0, sentence.as_str());
        tail_tokens += estimate_tokens(sentence);
        if tail_tokens >= config.overlap_tokens {
            break;
        }
    }

    let joined: String = tail.concat();
    if joined.trim().is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn start_chunk(
    prev: Option<&Chunk>,
    chunk_index: usize,
    config: &ChunkerConfig,
    language: Language,
) -> ChunkBuilder {
    let mut builder = ChunkBuilder::new().chunk_index(chunk_index);
    if let Some(prev_chunk) = prev {
        if let Some(tail) = build_overlap_tail(prev_chunk, config, language) {
            builder = builder
                .append(&format!("{OVERLAP_MARKER}{tail}"))
                .has_overlap(true);
        }
    }
    builder
}

/// Greedily packs an oversize segment's sentences into sub-chunks of at
/// most `config.max_chunk_tokens` tokens each.
fn pack_oversize_segment(
    segment: &Segment,
    chunks: &mut Vec<Chunk>,
    next_index: &mut usize,
    config: &ChunkerConfig,
    language: Language,
) {
    let sentences = split_sentences(&segment.content, language);
    let mut builder = ChunkBuilder::new().chunk_index(*next_index);

    for sentence in sentences {
        let candidate = if builder.is_empty() {
            estimate_tokens(&sentence)
        } else {
            estimate_tokens(&format!("{}\n\n{sentence}", builder.content()))
        };
        if !builder.is_empty() && candidate > config.max_chunk_tokens {
            let finished = builder
                .with_segment(segment.segment_type)
                .promote_importance(segment.importance)
                .build();
            chunks.push(finished);
            *next_index += 1;
            builder = ChunkBuilder::new().chunk_index(*next_index);
        }
        builder = builder.append(&sentence);
    }

    if !builder.is_empty() {
        let finished = builder
            .with_segment(segment.segment_type)
            .promote_importance(segment.importance)
            .build();
        chunks.push(finished);
        *next_index += 1;
    }
}

/// Language-aware structural chunker: the C2 component of the analysis
/// pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralChunker {
    config: ChunkerConfig,
}

impl StructuralChunker {
    #[must_use]
    pub const fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }
}

impl Chunker for StructuralChunker {
    fn chunk(&self, text: &str) -> Result<Vec<Chunk>> {
        let config = self.config;
        let language = crate::core::detect_language(text);
        let segments = build_segments(text, language);

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut next_index = 0usize;
        let mut builder = ChunkBuilder::new().chunk_index(next_index);

        for segment in &segments {
            let segment_tokens = estimate_tokens(&segment.content);

            if segment_tokens > config.max_chunk_tokens {
                if !builder.is_empty() {
                    chunks.push(builder.chunk_index(next_index).build());
                    next_index += 1;
                }
                pack_oversize_segment(segment, &mut chunks, &mut next_index, &config, language);
                builder = start_chunk(chunks.last(), next_index, &config, language);
                continue;
            }

            let fits = if builder.is_empty() {
                true
            } else {
                estimate_tokens(&format!("{}\n\n{}", builder.content(), segment.content))
                    <= config.max_chunk_tokens
            };

            if fits {
                builder = builder
                    .append(&segment.content)
                    .with_segment(segment.segment_type)
                    .promote_importance(segment.importance);
            } else {
                chunks.push(builder.chunk_index(next_index).build());
                next_index += 1;
                builder = start_chunk(chunks.last(), next_index, &config, language)
                    .append(&segment.content)
                    .with_segment(segment.segment_type)
                    .promote_importance(segment.importance);
            }
        }

        if !builder.is_empty() {
            if builder.token_estimate() >= config.min_chunk_tokens || chunks.is_empty() {
                chunks.push(builder.chunk_index(next_index).build());
            } else if let Some(last) = chunks.last_mut() {
                last.merge_residual(builder);
            } else {
                chunks.push(builder.chunk_index(next_index).build());
            }
        }

        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "structural"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zh_article_detected() {
        assert_eq!(
            match_zh_line("第一条 保密义务"),
            Some((SegmentType::Article, Importance::High))
        );
        assert_eq!(
            match_zh_line("第12章 违约责任"),
            Some((SegmentType::Article, Importance::High))
        );
    }

    #[test]
    fn test_zh_numbered_clause_detected() {
        assert_eq!(
            match_zh_line("一、甲方的义务如下"),
            Some((SegmentType::Clause, Importance::High))
        );
        assert_eq!(
            match_zh_line("（1）付款方式"),
            Some((SegmentType::Clause, Importance::High))
        );
    }

    #[test]
    fn test_zh_signature_detected() {
        assert_eq!(
            match_zh_line("甲方：张三"),
            Some((SegmentType::Signature, Importance::Low))
        );
    }

    #[test]
    fn test_zh_section_header_brackets() {
        assert_eq!(
            match_zh_line("【总则】"),
            Some((SegmentType::Header, Importance::High))
        );
    }

    #[test]
    fn test_en_article_detected() {
        assert_eq!(
            match_en_line("Article 1. Definitions"),
            Some((SegmentType::Article, Importance::High))
        );
        assert_eq!(
            match_en_line("section 2.1"),
            Some((SegmentType::Article, Importance::High))
        );
    }

    #[test]
    fn test_en_numbered_and_lettered_clause() {
        assert_eq!(
            match_en_line("1. The parties agree"),
            Some((SegmentType::Clause, Importance::High))
        );
        assert_eq!(
            match_en_line("(a) Payment terms"),
            Some((SegmentType::Clause, Importance::High))
        );
        assert_eq!(
            match_en_line("a) Payment terms"),
            Some((SegmentType::Clause, Importance::High))
        );
    }

    #[test]
    fn test_en_all_caps_header() {
        assert_eq!(
            match_en_line("TERMINATION AND SURVIVAL"),
            Some((SegmentType::Header, Importance::High))
        );
        assert_eq!(match_en_line("Termination and survival"), None);
    }

    #[test]
    fn test_en_signature_detected() {
        assert_eq!(
            match_en_line("IN WITNESS WHEREOF, the parties have executed."),
            Some((SegmentType::Signature, Importance::Low))
        );
        assert_eq!(
            match_en_line("Date: January 1, 2026"),
            Some((SegmentType::Signature, Importance::Low))
        );
    }

    #[test]
    fn test_split_sentences_zh_keeps_terminator() {
        let sentences = split_sentences_zh("这是第一句。这是第二句！这是第三句？");
        assert_eq!(sentences, vec!["这是第一句。", "这是第二句！", "这是第三句？"]);
    }

    #[test]
    fn test_split_sentences_en_keeps_terminator_drops_space() {
        let sentences = split_sentences_en("First sentence. Second sentence! Third one?");
        assert_eq!(
            sentences,
            vec!["First sentence.", "Second sentence!", "Third one?"]
        );
    }

    fn zh_contract_with_two_articles() -> String {
        let mut text = String::from("第一条 保密义务\n");
        for i in 0..50 {
            text.push_str(&format!("这是保密条款的正文内容第{i}句，双方应当共同遵守本协议约定的保密要求。\n"));
        }
        text.push_str("第二条 违约责任\n");
        for i in 0..50 {
            text.push_str(&format!("这是违约责任的正文内容第{i}句，任何一方违约应当承担相应的法律责任。\n"));
        }
        text
    }

    #[test]
    fn test_chinese_article_header_produces_high_importance_chunk() {
        let text = zh_contract_with_two_articles();
        let chunker = StructuralChunker::default();
        let chunks = chunker.chunk(&text).unwrap();

        assert!(chunks.len() >= 2, "expected at least two chunks, got {}", chunks.len());
        assert!(chunks[0].has_segment(SegmentType::Article));
        assert_eq!(chunks[0].importance, Importance::High);
    }

    #[test]
    fn test_invariant_max_tokens_respected() {
        let text = zh_contract_with_two_articles();
        let config = ChunkerConfig::new(300, 50, 40);
        let chunker = StructuralChunker::new(config);
        let chunks = chunker.chunk(&text).unwrap();
        for chunk in &chunks {
            assert!(
                chunk.token_estimate <= config.max_chunk_tokens,
                "chunk {} exceeded max tokens: {}",
                chunk.chunk_index,
                chunk.token_estimate
            );
        }
    }

    #[test]
    fn test_oversize_segment_carries_overlap_marker_into_next_chunk() {
        // A single segment whose estimated tokens land just above max (6000).
        // Chinese chars cost 0.7 tokens each, so ~8715 chars clears 6100.
        let sentence = "本条款描述了双方在合同履行过程中应当承担的各项权利与义务，并约定了相应的违约责任。";
        let mut text = String::new();
        while estimate_tokens(&text) < 6100 {
            text.push_str(sentence);
        }

        let chunker = StructuralChunker::default();
        let chunks = chunker.chunk(&text).unwrap();
        assert!(chunks.len() >= 2);
        assert!(chunks[1].has_overlap);
        let tail = chunks[1].overlap_tail().expect("overlap tail present");
        assert!(chunks[0].content.ends_with(tail));
    }

    #[test]
    fn test_final_flush_merges_small_residual() {
        // First chunk large enough to stand alone, final segment too small
        // to meet min_chunk_tokens on its own.
        let mut text = String::from("第一条 保密义务\n");
        for i in 0..80 {
            text.push_str(&format!("这是保密条款正文第{i}句，双方应共同遵守本协议规定的各项保密义务与限制。\n"));
        }
        text.push_str("第二条 简短\n");
        text.push_str("简短结尾。\n");

        let config = ChunkerConfig::default();
        let chunker = StructuralChunker::new(config);
        let chunks = chunker.chunk(&text).unwrap();
        // The short final article should have been merged into the prior chunk
        // rather than standing alone under min_chunk_tokens.
        assert!(chunks.last().unwrap().content.contains("简短结尾"));
    }

    #[test]
    fn test_determinism() {
        let text = zh_contract_with_two_articles();
        let chunker = StructuralChunker::default();
        let first = chunker.chunk(&text).unwrap();
        let second = chunker.chunk(&text).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_chunk_index_is_sequential() {
        let text = zh_contract_with_two_articles();
        let chunker = StructuralChunker::default();
        let chunks = chunker.chunk(&text).unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
        }
    }

    #[test]
    fn test_non_empty_text_produces_non_empty_chunks() {
        let chunker = StructuralChunker::default();
        let chunks = chunker.chunk("Article 1. A single short clause.").unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(!chunk.content.is_empty());
        }
    }
}
