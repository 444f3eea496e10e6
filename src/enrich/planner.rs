//! Prompt-budget planning for context enrichment.
//!
//! One model call covers a whole document when it fits the prompt budget.
//! Oversized documents split at division (avdelning) boundaries, then at
//! chapter boundaries, then into contiguous chunk batches over the same
//! markdown slice. Planning is pure so the online and batch paths
//! partition identically.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::tokens::estimate_tokens;
use crate::types::{chapter_number_of, ContextBudget};

lazy_static! {
    static ref DIVISION_HEADING: Regex =
        Regex::new(r"(?mi)^#{1,3}\s+(?:Avdelning|AVD\.?)\s+(\d+|[IVXLC]+)[.:]*\s*(.*)$").unwrap();
    static ref CHAPTER_HEADING: Regex =
        Regex::new(r"(?mi)^#{1,4}\s+(?:Kap(?:itel)?\.?\s*)?(\d+)\s*(?:kap\.?)?").unwrap();
}

/// The chunk fields the enricher needs.
#[derive(Debug, Clone)]
pub struct ChunkForContext {
    pub path: String,
    pub content: String,
}

/// Document fields quoted in enrichment prompts.
#[derive(Debug, Clone)]
pub struct DocumentForContext {
    pub source_id: String,
    pub title: String,
    pub document_number: String,
    pub markdown: String,
}

/// One planned model call: a markdown slice plus the chunks it covers.
#[derive(Debug, Clone)]
pub struct EnrichmentCall {
    /// Stable id, usable as a batch-API custom id.
    pub custom_id: String,
    pub markdown: String,
    pub chunks: Vec<ChunkForContext>,
}

impl EnrichmentCall {
    pub fn chunk_paths(&self) -> Vec<&str> {
        self.chunks.iter().map(|c| c.path.as_str()).collect()
    }
}

/// Partition a document's chunks into model calls that each fit the
/// prompt budget.
///
/// Every input chunk appears in exactly one call. Chunks without a
/// chapter path component ride with the first partition.
pub fn plan_enrichment(
    doc: &DocumentForContext,
    chunks: &[ChunkForContext],
    budget: &ContextBudget,
) -> Vec<EnrichmentCall> {
    let mut planner = Planner {
        doc,
        budget,
        calls: Vec::new(),
    };
    planner.plan(chunks);
    planner.calls
}

struct Planner<'a> {
    doc: &'a DocumentForContext,
    budget: &'a ContextBudget,
    calls: Vec<EnrichmentCall>,
}

impl Planner<'_> {
    fn plan(&mut self, chunks: &[ChunkForContext]) {
        if chunks.is_empty() {
            return;
        }
        let markdown = self.doc.markdown.as_str();
        if self.fits(estimate_tokens(markdown), chunks.len()) {
            self.push_call(markdown.to_string(), chunks.to_vec());
            return;
        }

        let divisions = split_by_divisions(markdown);
        if divisions.len() > 1 {
            let mut groups: Vec<Vec<ChunkForContext>> = vec![Vec::new(); divisions.len()];
            for chunk in chunks {
                let idx = chapter_number_of(&chunk.path)
                    .and_then(|chap| {
                        divisions
                            .iter()
                            .position(|d| d.chapter_numbers.iter().any(|n| n == chap))
                    })
                    .unwrap_or(0);
                groups[idx].push(chunk.clone());
            }
            for (division, group) in divisions.iter().zip(groups) {
                if group.is_empty() {
                    continue;
                }
                if self.fits(estimate_tokens(&division.markdown), group.len()) {
                    self.push_call(division.markdown.clone(), group);
                } else {
                    self.plan_by_chapter(&division.markdown, &group);
                }
            }
        } else {
            self.plan_by_chapter(markdown, chunks);
        }
    }

    /// Chapter-level splitting, with contiguous sub-batches when a single
    /// chapter's chunks still blow the budget.
    fn plan_by_chapter(&mut self, markdown: &str, chunks: &[ChunkForContext]) {
        let sections = split_by_chapters(markdown);

        // Group chunks by chapter key in first-seen order.
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<ChunkForContext>> = HashMap::new();
        for chunk in chunks {
            let key = chapter_number_of(&chunk.path).unwrap_or("other").to_string();
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(chunk.clone());
        }

        for key in order {
            let group = match groups.remove(&key) {
                Some(g) => g,
                None => continue,
            };
            let section_md = sections.get(&key).map(String::as_str).unwrap_or(markdown);
            self.plan_group(section_md, group);
        }
    }

    fn plan_group(&mut self, markdown: &str, group: Vec<ChunkForContext>) {
        let mut md = markdown.to_string();
        let mut md_tokens = estimate_tokens(&md);

        if self.fits(md_tokens, group.len()) {
            self.push_call(md, group);
            return;
        }

        let mut capacity = self.chunk_capacity(md_tokens);
        if capacity == 0 {
            // Markdown alone exceeds the budget: truncate so at least one
            // chunk fits per call.
            let ceiling = self.budget.max_slice_chars(self.budget.markdown_budget(1));
            md = truncate_chars(&md, ceiling);
            md_tokens = estimate_tokens(&md);
            capacity = self.chunk_capacity(md_tokens).max(1);
        }
        for batch in group.chunks(capacity) {
            self.push_call(md.clone(), batch.to_vec());
        }
    }

    fn fits(&self, markdown_tokens: usize, chunk_count: usize) -> bool {
        markdown_tokens
            + chunk_count * self.budget.per_chunk_overhead
            + self.budget.fixed_prompt_overhead
            <= self.budget.max_prompt_tokens
    }

    fn chunk_capacity(&self, markdown_tokens: usize) -> usize {
        self.budget
            .max_prompt_tokens
            .saturating_sub(self.budget.fixed_prompt_overhead)
            .saturating_sub(markdown_tokens)
            / self.budget.per_chunk_overhead
    }

    fn push_call(&mut self, markdown: String, chunks: Vec<ChunkForContext>) {
        let custom_id = format!("{}-ctx{}", self.doc.source_id, self.calls.len());
        self.calls.push(EnrichmentCall {
            custom_id,
            markdown,
            chunks,
        });
    }
}

struct DivisionSection {
    markdown: String,
    chapter_numbers: Vec<String>,
}

/// Split markdown at division headings (`# Avdelning N`, `## AVD. II`).
/// Returns empty when fewer than two divisions are found.
fn split_by_divisions(markdown: &str) -> Vec<DivisionSection> {
    let starts: Vec<usize> = DIVISION_HEADING
        .find_iter(markdown)
        .map(|m| m.start())
        .collect();
    if starts.len() <= 1 {
        return Vec::new();
    }

    let mut sections = Vec::new();
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(markdown.len());
        let section = &markdown[start..end];
        let chapter_numbers = CHAPTER_HEADING
            .captures_iter(section)
            .map(|c| c[1].to_string())
            .collect();
        sections.push(DivisionSection {
            markdown: section.to_string(),
            chapter_numbers,
        });
    }
    sections
}

/// Split markdown at chapter headings. Content before the first chapter
/// lands under the key `other`.
fn split_by_chapters(markdown: &str) -> HashMap<String, String> {
    let matches: Vec<(usize, String)> = CHAPTER_HEADING
        .captures_iter(markdown)
        .filter_map(|c| c.get(0).map(|m| (m.start(), c[1].to_string())))
        .collect();

    let mut result = HashMap::new();
    if matches.is_empty() {
        result.insert("other".to_string(), markdown.to_string());
        return result;
    }
    if matches[0].0 > 0 {
        result.insert("other".to_string(), markdown[..matches[0].0].to_string());
    }
    for (i, (start, number)) in matches.iter().enumerate() {
        let end = matches.get(i + 1).map(|(s, _)| *s).unwrap_or(markdown.len());
        result.insert(number.clone(), markdown[*start..end].to_string());
    }
    result
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
