//! Markdown fallback chunking and shared text-splitting helpers.
//!
//! Used as tier 3 when a document has no structured content, and by the
//! structured tier to break up oversized non-paragraf blocks.

use lazy_static::lazy_static;
use regex::Regex;

use crate::tokens::estimate_tokens;
use crate::types::{Chunk, ChunkBudget, ContentRole, Document};

use super::base_metadata;

lazy_static! {
    static ref BLANK_LINES: Regex = Regex::new(r"\n\n+").unwrap();
    static ref MD_HEADING: Regex = Regex::new(r"^#{1,6}\s").unwrap();
}

/// Chunk a document from its markdown (or plain-text) representation.
///
/// Paragraph-merge strategy: split on blank lines, merge small adjacent
/// paragraphs up to the target, split anything over the cap.
pub fn chunk_from_markdown(doc: &Document, budget: &ChunkBudget) -> Vec<Chunk> {
    let text = doc
        .markdown_content
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            doc.plain_text_content
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
        });
    let Some(text) = text else {
        return Vec::new();
    };

    let header = format!(
        "{} ({})",
        doc.title,
        doc.document_number.as_deref().unwrap_or("")
    );
    let metadata = base_metadata(doc);
    let merged = merge_paragraphs(text, budget.merge_target_tokens);

    let mut chunks = Vec::new();
    let mut index = 1;
    for block in merged {
        if block.chars().count() < budget.min_chunk_chars {
            continue;
        }
        let blocks = if estimate_tokens(&block) > budget.cap_tokens {
            split_oversized(&block, budget.cap_tokens)
        } else {
            vec![block]
        };
        for sub in blocks {
            let sub = sub.trim().to_string();
            if sub.chars().count() < budget.min_chunk_chars {
                continue;
            }
            let token_count = estimate_tokens(&sub);
            chunks.push(Chunk {
                source_id: doc.id.clone(),
                path: format!("md.chunk{index}"),
                contextual_header: header.clone(),
                content: sub,
                content_role: ContentRole::MarkdownChunk,
                token_count,
                metadata: metadata.clone(),
            });
            index += 1;
        }
    }
    chunks
}

/// Merge small adjacent paragraphs until reaching the target token count.
/// Never merges across markdown headings.
pub(crate) fn merge_paragraphs(text: &str, target_tokens: usize) -> Vec<String> {
    let mut result = Vec::new();
    let mut buffer = String::new();

    for para in BLANK_LINES.split(text) {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let is_heading = MD_HEADING.is_match(trimmed);

        if is_heading && !buffer.is_empty() {
            result.push(std::mem::take(&mut buffer));
        }

        if buffer.is_empty() {
            buffer = trimmed.to_string();
        } else {
            let combined = format!("{buffer}\n\n{trimmed}");
            if estimate_tokens(&combined) <= target_tokens && !is_heading {
                buffer = combined;
            } else {
                result.push(std::mem::replace(&mut buffer, trimmed.to_string()));
            }
        }
    }

    if !buffer.is_empty() {
        result.push(buffer);
    }
    result
}

/// Split oversized non-paragraf content (preamble, appendices) using
/// paragraph-merge with the denser non-paragraf target.
pub(crate) fn split_non_para(text: &str, budget: &ChunkBudget) -> Vec<String> {
    let merged = merge_paragraphs(text, budget.non_para_merge_target_tokens);

    let mut result = Vec::new();
    for block in merged {
        let trimmed = block.trim();
        if trimmed.is_empty() {
            continue;
        }
        if estimate_tokens(trimmed) > budget.cap_tokens {
            result.extend(split_oversized(trimmed, budget.cap_tokens));
        } else {
            result.push(trimmed.to_string());
        }
    }
    result
}

/// Split an oversized block at sentence boundaries, falling back to
/// single newlines, then re-merge parts up to the cap.
pub(crate) fn split_oversized(text: &str, cap_tokens: usize) -> Vec<String> {
    let sentence_parts = split_at_sentences(text);
    if sentence_parts.len() > 1 {
        return remerge_to_target(&sentence_parts, cap_tokens);
    }

    let line_parts: Vec<&str> = text.split('\n').collect();
    if line_parts.len() > 1 {
        return remerge_to_target(&line_parts, cap_tokens);
    }

    vec![text.to_string()]
}

/// Split at ". " boundaries followed by an uppercase letter (including
/// Å, Ä, Ö). The terminator stays with the preceding part.
fn split_at_sentences(text: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut parts = Vec::new();
    let mut start = 0;
    for w in chars.windows(3) {
        let [(_, a), (_, b), (i, c)] = w else {
            continue;
        };
        if *a == '.'
            && b.is_whitespace()
            && (c.is_ascii_uppercase() || matches!(*c, 'Å' | 'Ä' | 'Ö'))
        {
            parts.push(&text[start..*i]);
            start = *i;
        }
    }
    parts.push(&text[start..]);
    parts
}

fn remerge_to_target(parts: &[&str], cap_tokens: usize) -> Vec<String> {
    let mut result = Vec::new();
    let mut buffer = String::new();

    for part in parts {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        if buffer.is_empty() {
            buffer = trimmed.to_string();
        } else {
            let combined = format!("{buffer} {trimmed}");
            if estimate_tokens(&combined) <= cap_tokens {
                buffer = combined;
            } else {
                result.push(std::mem::replace(&mut buffer, trimmed.to_string()));
            }
        }
    }

    if !buffer.is_empty() {
        result.push(buffer);
    }
    result
}
